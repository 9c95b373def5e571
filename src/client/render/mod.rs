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

//! The upload interface between map loading and a rendering context.
//!
//! Map loading does not draw anything. It hands decoded textures and polygon vertex data to a
//! [`RenderBackend`] and stores the handles it gets back.

pub mod palette;

pub use self::palette::Palette;

use crate::common::bsp::PolyVertex;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub fn new(id: u32) -> TextureHandle {
        TextureHandle(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VertexBufferHandle(u32);

impl VertexBufferHandle {
    pub fn new(id: u32) -> VertexBufferHandle {
        VertexBufferHandle(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

/// The resource-creation side of a rendering context.
///
/// Implementations are called from the thread that owns the context, once per texture and once
/// per polygon while a map loads.
pub trait RenderBackend {
    /// Creates a texture from tightly packed RGBA8 pixels.
    fn upload_texture(&mut self, name: &str, width: u32, height: u32, rgba: &[u8])
        -> TextureHandle;

    /// Creates a vertex buffer holding one polygon.
    fn upload_vertex_buffer(&mut self, vertices: &[PolyVertex]) -> VertexBufferHandle;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadedTexture {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// A backend with no GPU behind it.
///
/// Hands out sequential handles and records what was uploaded.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    textures: Vec<UploadedTexture>,
    vertex_buffers: Vec<usize>,
}

impl HeadlessBackend {
    pub fn new() -> HeadlessBackend {
        HeadlessBackend::default()
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&UploadedTexture> {
        self.textures.get(handle.id() as usize)
    }

    pub fn textures(&self) -> &[UploadedTexture] {
        &self.textures
    }

    pub fn vertex_buffer_count(&self) -> usize {
        self.vertex_buffers.len()
    }

    /// Total number of vertices across all uploaded buffers.
    pub fn vertex_count(&self) -> usize {
        self.vertex_buffers.iter().sum()
    }
}

impl RenderBackend for HeadlessBackend {
    fn upload_texture(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> TextureHandle {
        debug_assert_eq!(rgba.len(), (width * height * 4) as usize);
        self.textures.push(UploadedTexture {
            name: name.to_owned(),
            width,
            height,
        });
        TextureHandle::new(self.textures.len() as u32 - 1)
    }

    fn upload_vertex_buffer(&mut self, vertices: &[PolyVertex]) -> VertexBufferHandle {
        self.vertex_buffers.push(vertices.len());
        VertexBufferHandle::new(self.vertex_buffers.len() as u32 - 1)
    }
}
