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

#![deny(unused_must_use)]

//! Loading and geometric reconstruction of GoldSrc (BSP version 30) maps.
//!
//! The entry point is [`common::bsp::load_brush_model`], which decodes a map into a
//! [`common::model::ModelRegistry`], resolving external textures through a
//! [`common::wad::TextureArchives`] implementation and uploading textures and polygons through a
//! [`client::render::RenderBackend`].

#[macro_use]
extern crate bitflags;
extern crate byteorder;
extern crate cgmath;
extern crate chrono;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
extern crate nom;
#[macro_use]
extern crate num_derive;
extern crate num_traits;
extern crate strum;
#[macro_use]
extern crate strum_macros;

pub mod client;
pub mod common;
