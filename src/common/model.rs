// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! A fixed-capacity table of named models.

use crate::common::bsp::{BspError, BspErrorKind, BspModel};

use cgmath::Vector3;

/// Default number of model slots in a registry.
pub const MAX_MOD_KNOWN: usize = 512;

/// Index of a model slot in a `ModelRegistry`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ModelHandle(usize);

impl ModelHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub enum ModelKind {
    /// A claimed slot with nothing loaded into it.
    None,
    Brush(BspModel),
}

#[derive(Debug)]
pub struct Model {
    name: String,
    kind: ModelKind,
}

impl Model {
    fn named<S>(name: S) -> Model
    where
        S: AsRef<str>,
    {
        Model {
            name: name.as_ref().to_owned(),
            kind: ModelKind::None,
        }
    }

    /// Return the name of this model.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn set_kind(&mut self, kind: ModelKind) {
        self.kind = kind;
    }

    pub fn is_loaded(&self) -> bool {
        match self.kind {
            ModelKind::None => false,
            _ => true,
        }
    }

    pub fn brush(&self) -> Option<&BspModel> {
        match self.kind {
            ModelKind::Brush(ref bmodel) => Some(bmodel),
            ModelKind::None => None,
        }
    }

    /// Return the minimum extent of this model, if it is loaded.
    pub fn min(&self) -> Option<Vector3<f32>> {
        self.brush().map(|b| b.min())
    }

    /// Return the maximum extent of this model, if it is loaded.
    pub fn max(&self) -> Option<Vector3<f32>> {
        self.brush().map(|b| b.max())
    }

    /// Releases whatever is loaded in this slot, keeping the name.
    ///
    /// Dropping a brush model releases every polygon chain of its map once the last model
    /// sharing the map is gone.
    pub fn clear(&mut self) {
        self.kind = ModelKind::None;
    }
}

/// Models in the order their names were first requested.
#[derive(Debug)]
pub struct ModelRegistry {
    models: Vec<Model>,
    capacity: usize,
}

impl ModelRegistry {
    pub fn new() -> ModelRegistry {
        ModelRegistry::with_capacity(MAX_MOD_KNOWN)
    }

    pub fn with_capacity(capacity: usize) -> ModelRegistry {
        ModelRegistry {
            models: Vec::new(),
            capacity,
        }
    }

    /// Returns the slot named `name`, claiming an empty one if no slot has that name yet.
    pub fn get_or_insert<S>(&mut self, name: S) -> Result<ModelHandle, BspError>
    where
        S: AsRef<str>,
    {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(BspErrorKind::EmptyModelName.into());
        }

        if let Some(handle) = self.find(name) {
            return Ok(handle);
        }

        if self.models.len() >= self.capacity {
            return Err(BspErrorKind::RegistryFull {
                capacity: self.capacity,
            }
            .into());
        }

        self.models.push(Model::named(name));
        Ok(ModelHandle(self.models.len() - 1))
    }

    pub fn find<S>(&self, name: S) -> Option<ModelHandle>
    where
        S: AsRef<str>,
    {
        let name = name.as_ref();
        self.models
            .iter()
            .position(|m| m.name == name)
            .map(ModelHandle)
    }

    pub fn get(&self, handle: ModelHandle) -> &Model {
        &self.models[handle.0]
    }

    pub fn get_mut(&mut self, handle: ModelHandle) -> &mut Model {
        &mut self.models[handle.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unloads every model and releases every slot.
    pub fn clear(&mut self) {
        self.models.clear();
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        ModelRegistry::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_or_insert_reuses_slot() {
        let mut registry = ModelRegistry::new();
        let a = registry.get_or_insert("maps/a.bsp").unwrap();
        let b = registry.get_or_insert("*1").unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.get_or_insert("maps/a.bsp").unwrap(), a);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(b).name(), "*1");
        assert!(!registry.get(a).is_loaded());
        assert_eq!(registry.get(a).min(), None);
    }

    #[test]
    fn test_registry_full() {
        let mut registry = ModelRegistry::with_capacity(2);
        registry.get_or_insert("a").unwrap();
        registry.get_or_insert("b").unwrap();

        let err = registry.get_or_insert("c").unwrap_err();
        assert_eq!(err.kind(), &BspErrorKind::RegistryFull { capacity: 2 });

        // existing names can still be looked up
        assert!(registry.get_or_insert("b").is_ok());
    }

    #[test]
    fn test_empty_name() {
        let mut registry = ModelRegistry::new();
        let err = registry.get_or_insert("").unwrap_err();
        assert_eq!(err.kind(), &BspErrorKind::EmptyModelName);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut registry = ModelRegistry::new();
        let a = registry.get_or_insert("a").unwrap();
        registry.get_mut(a).clear();
        assert_eq!(registry.find("a"), Some(a));

        registry.clear();
        assert_eq!(registry.find("a"), None);
        assert_eq!(registry.len(), 0);
    }
}
