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

//! GoldSrc BSP file and data structure handling.
//!
//! # Data Structure
//!
//! The binary space partitioning tree, or BSP, is the central data structure used for collision
//! detection and rendering level geometry. At its core, the BSP tree is a binary search tree with
//! each node representing a subspace of the map. The tree is navigated using the planes stored in
//! each node; each child represents one side of the plane.
//!
//! All cross-references between the arrays of a map (surfaces to planes, leaves to surfaces,
//! nodes to children) are stored as indices, validated once while the map is decoded.
//!
//! # File Format
//!
//! The BSP file header consists of the file format version number, stored as an `i32`, which must
//! be 30.
//!
//! This is followed by 15 "lumps", which act as a directory into the BSP file data. Each lump
//! consists of a 32-bit offset (into the file data) and a 32-bit size (in bytes). All values are
//! little-endian.
//!
//! ## Entities
//!
//! Lump 0 points to the level entity data, a sequence of brace-delimited blocks of quoted
//! key-value pairs stored as a null-terminated string:
//!
//! ```text
//! {
//! "classname" "worldspawn"
//! "wad" "\half-life\valve\halflife.wad;\half-life\valve\decals.wad"
//! }
//! ```
//!
//! The `wad` key of the first entity lists the texture archives the map draws its textures from.
//!
//! ## Planes
//!
//! Lump 1 points to the planes used to partition the map, stored in point-normal form as 4 IEEE 754
//! single-precision floats followed by a 32-bit type tag. The sign bits used for box-plane tests
//! are not stored and are derived from the normal on load.
//!
//! ## Textures
//!
//! The textures are preceded by a 32-bit integer count and a list of 32-bit integer offsets. The
//! offsets are given in bytes from the beginning of the texture lump; an offset of -1 marks a
//! missing texture.
//!
//! The textures themselves consist of a 16-byte name field, a 32-bit integer width, a 32-bit
//! integer height, and 4 32-bit mipmap offsets, given in bytes from the beginning of the texture.
//! Each mipmap has its dimensions halved from the previous one. Each byte represents one pixel
//! and contains an index into the texture's own palette, which follows the last mipmap as a
//! 16-bit entry count and 256 RGB triplets.
//!
//! If all four mipmap offsets are zero, the texture's pixel data is not stored in the map and must
//! be looked up by name in the map's texture archives.
//!
//! ### Texture sequencing
//!
//! Animated textures are stored as individual frames with no guarantee of being in the correct
//! order, so they are sequenced when the map is loaded. Frames of animated textures have names
//! beginning with `+`. A following digit `0`-`9` gives the frame's index in the primary
//! animation; a letter `A`-`J` (either case) gives its index in the alternate animation.
//!
//! ## Nodes
//!
//! Nodes are stored with a 32-bit integer plane ID denoting which plane splits the node. This is
//! followed by two 16-bit integers which point to the children in front and back of the plane. A
//! non-negative value is a node index; a negative value `v` refers to leaf `-(v + 1)`.
//!
//! ## Edges
//!
//! The edges are stored as a pair of 16-bit integer vertex IDs. Faces refer to their edges
//! through the surface edge list, whose signed entries give an edge index and the direction the
//! edge is walked in.

mod error;
mod load;
mod lump;
mod surface;
mod texture;
mod tree;
mod warp;

#[cfg(test)]
pub(crate) mod test_map;

use std::{collections::VecDeque, fmt::Write, rc::Rc};

use crate::{
    client::render::{TextureHandle, VertexBufferHandle},
    common::math::Hyperplane,
};

use cgmath::Vector3;
use chrono::Duration;
use num_traits::FromPrimitive;

pub use self::{
    error::{BspError, BspErrorKind},
    load::{
        build_models, load, load_brush_model, LoadContext, LoadOptions, DEFAULT_SUBDIVIDE_SIZE,
    },
    lump::{LumpId, MAX_LIGHTMAPS, MAX_MAP_HULLS, MIPLEVELS, NUM_AMBIENTS, VERSION},
    surface::{BLOCK_HEIGHT, BLOCK_WIDTH, MAX_SURFACE_EXTENT},
    warp::{subdivide, MAX_SUBDIVIDE_VERTS},
};

#[derive(Copy, Clone, Debug, FromPrimitive)]
pub enum BspTextureMipmap {
    Full = 0,
    Half = 1,
    Quarter = 2,
    Eighth = 3,
}

#[derive(Debug)]
pub struct BspTextureAnimation {
    pub sequence_duration: Duration,
    pub time_start: Duration,
    pub time_end: Duration,
    pub next: usize,

    /// The first frame of the other animation of this texture, if it has one.
    pub alternate: Option<usize>,
}

#[derive(Debug)]
pub struct BspTexture {
    name: String,
    width: u32,
    height: u32,
    mipmaps: [Box<[u8]>; MIPLEVELS],
    palette: Option<Box<[u8]>>,
    animation: Option<BspTextureAnimation>,
    handle: TextureHandle,
}

impl BspTexture {
    /// Returns the name of the texture.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns a tuple containing the width and height of the texture.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the texture's mipmap of the specified level.
    pub fn mipmap(&self, mipmap: BspTextureMipmap) -> &[u8] {
        &self.mipmaps[mipmap as usize]
    }

    /// The texture's RGB palette, if it carries one.
    pub fn palette(&self) -> Option<&[u8]> {
        self.palette.as_deref()
    }

    /// Returns this texture's animation data, if any.
    pub fn animation(&self) -> Option<&BspTextureAnimation> {
        self.animation.as_ref()
    }

    /// The handle returned by the render backend when this texture was uploaded.
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }
}

/// A texture info's reference to its texture.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextureId {
    /// Index into the map's texture table.
    Slot(usize),

    /// The placeholder used when a texture is absent or could not be resolved.
    Missing,
}

bitflags! {
    pub struct TexInfoFlags: i32 {
        const SPECIAL = 0x1;
    }
}

#[derive(Debug)]
pub struct BspTexInfo {
    pub s_vector: Vector3<f32>,
    pub s_offset: f32,
    pub t_vector: Vector3<f32>,
    pub t_offset: f32,
    pub texture: TextureId,
    pub flags: TexInfoFlags,

    /// Mip level bias derived from the scale of the texture axes.
    pub mip_adjust: u8,
}

impl BspTexInfo {
    /// Projects `point` onto the texture axes.
    pub fn project(&self, point: Vector3<f32>) -> [f32; 2] {
        use cgmath::InnerSpace;

        [
            point.dot(self.s_vector) + self.s_offset,
            point.dot(self.t_vector) + self.t_offset,
        ]
    }

    pub fn is_special(&self) -> bool {
        self.flags.contains(TexInfoFlags::SPECIAL)
    }
}

bitflags! {
    pub struct SurfaceFlags: u32 {
        const PLANE_BACK = 0x02;
        const DRAW_SKY = 0x04;
        const DRAW_TURB = 0x10;
        const DRAW_TILED = 0x20;
        const UNDERWATER = 0x80;
    }
}

/// One vertex of a surface polygon, laid out for direct upload.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PolyVertex {
    pub position: [f32; 3],
    pub diffuse_texcoord: [f32; 2],
    pub lightmap_texcoord: [f32; 2],
}

/// A convex polygon in a surface's polygon chain.
#[derive(Debug)]
pub struct Polygon {
    next: Option<Box<Polygon>>,
    vertices: Vec<PolyVertex>,
    vertex_buffer: Option<VertexBufferHandle>,
}

impl Polygon {
    pub fn vertices(&self) -> &[PolyVertex] {
        &self.vertices
    }

    /// The handle of this polygon's uploaded vertex buffer.
    pub fn vertex_buffer(&self) -> Option<VertexBufferHandle> {
        self.vertex_buffer
    }

    pub fn next(&self) -> Option<&Polygon> {
        self.next.as_deref()
    }
}

impl Drop for Polygon {
    fn drop(&mut self) {
        // unlink the chain one node at a time so long chains don't recurse
        let mut next = self.next.take();
        while let Some(mut poly) = next {
            next = poly.next.take();
        }
    }
}

pub struct Polygons<'a> {
    next: Option<&'a Polygon>,
}

impl<'a> Iterator for Polygons<'a> {
    type Item = &'a Polygon;

    fn next(&mut self) -> Option<Self::Item> {
        let poly = self.next?;
        self.next = poly.next.as_deref();
        Some(poly)
    }
}

/// Position of a surface's lightmap within the lightmap atlas.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LightmapBlock {
    /// Index of the atlas block.
    pub texture: usize,
    pub s: u32,
    pub t: u32,
}

#[derive(Debug)]
pub struct Surface {
    pub plane_id: usize,
    pub flags: SurfaceFlags,
    pub first_edge: usize,
    pub edge_count: usize,
    pub texinfo_id: usize,

    /// Lowest texture coordinates of the surface, snapped to 16-unit blocks.
    pub texture_mins: [i32; 2],

    /// Size of the surface in texture space, snapped to 16-unit blocks.
    pub extents: [i32; 2],

    pub light_styles: [u8; MAX_LIGHTMAPS],

    /// Byte offset of this surface's samples in the lighting lump.
    pub light_offset: Option<usize>,
    pub lightmap: Option<LightmapBlock>,

    polys: Option<Box<Polygon>>,
}

impl Surface {
    /// Iterates over the surface's polygon chain.
    pub fn polygons(&self) -> Polygons {
        Polygons {
            next: self.polys.as_deref(),
        }
    }

    pub fn has_polygons(&self) -> bool {
        self.polys.is_some()
    }

    /// Adds `poly` to the front of the polygon chain.
    fn push_polygon(&mut self, mut poly: Polygon) {
        poly.next = self.polys.take();
        self.polys = Some(Box::new(poly));
    }

    /// Releases every polygon in the chain.
    pub fn clear_polygons(&mut self) {
        self.polys = None;
    }
}

/// A child slot of a draw tree node.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Child {
    Node(usize),
    Leaf(usize),
}

impl Child {
    /// Decodes a stored child reference: non-negative values are node indices, a negative value
    /// `v` refers to leaf `-(v + 1)`.
    pub fn from_raw(raw: i16) -> Child {
        match raw {
            n if n >= 0 => Child::Node(n as usize),
            l => Child::Leaf((-(l as i32 + 1)) as usize),
        }
    }
}

#[derive(Debug)]
pub struct BspNode {
    pub plane_id: usize,
    pub children: [Child; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_surface: usize,
    pub surface_count: usize,
    pub parent: Option<usize>,
}

/// The contents of a leaf in the BSP tree, specifying how it should look and behave.
#[derive(Copy, Clone, Debug, Eq, FromPrimitive, PartialEq)]
pub enum BspLeafContents {
    /// The leaf has nothing in it. Vision is unobstructed and movement is unimpeded.
    Empty = -1,

    /// The leaf is solid. Physics objects will collide with its surface and may not move inside it.
    Solid = -2,

    /// The leaf is full of water.
    Water = -3,

    /// The leaf is full of acidic slime.
    Slime = -4,

    /// The leaf is full of lava.
    Lava = -5,

    Sky = -6,

    /// Removed during map compilation.
    Origin = -7,

    /// Blocks movement but not vision.
    Clip = -8,

    /// Water that pushes entities in the positive x-direction.
    Current0 = -9,

    /// Water that pushes entities in the positive y-direction.
    Current90 = -10,

    /// Water that pushes entities in the negative x-direction.
    Current180 = -11,

    /// Water that pushes entities in the negative y-direction.
    Current270 = -12,

    /// Water that pushes entities up.
    CurrentUp = -13,

    /// Water that pushes entities down.
    CurrentDown = -14,

    Translucent = -15,
}

impl BspLeafContents {
    pub fn from_raw(value: i32) -> Result<BspLeafContents, BspError> {
        BspLeafContents::from_i32(value).ok_or_else(|| BspErrorKind::InvalidContents { value }.into())
    }

    /// Whether surfaces seen from a leaf with these contents are seen through a liquid or
    /// other non-air volume.
    pub fn is_underwater(&self) -> bool {
        match *self {
            BspLeafContents::Empty | BspLeafContents::Solid => false,
            _ => true,
        }
    }
}

#[derive(Debug)]
pub struct BspLeaf {
    pub contents: BspLeafContents,
    pub vis_offset: Option<usize>,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_mark_surface: usize,
    pub mark_surface_count: usize,
    pub ambient_levels: [u8; NUM_AMBIENTS],
    pub parent: Option<usize>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClipChild {
    Node(usize),
    Contents(BspLeafContents),
}

#[derive(Debug)]
pub struct ClipNode {
    pub plane_id: usize,
    pub children: [ClipChild; 2],
}

/// Storage for a collision hull's nodes.
#[derive(Debug)]
pub enum HullNodes {
    Owned(Box<[ClipNode]>),

    /// Uses the nodes owned by another hull, by hull index.
    SharedWith(usize),

    Unused,
}

#[derive(Debug)]
pub struct Hull {
    pub nodes: HullNodes,
    pub mins: Vector3<f32>,
    pub maxs: Vector3<f32>,
}

/// A collision hull resolved against the map's shared node storage.
#[derive(Debug)]
pub struct HullView<'a> {
    planes: &'a [Hyperplane],
    nodes: &'a [ClipNode],
    first_node: usize,
    mins: Vector3<f32>,
    maxs: Vector3<f32>,
}

impl<'a> HullView<'a> {
    pub fn nodes(&self) -> &'a [ClipNode] {
        self.nodes
    }

    pub fn min(&self) -> Vector3<f32> {
        self.mins
    }

    pub fn max(&self) -> Vector3<f32> {
        self.maxs
    }

    /// Returns the contents at the given point in this hull.
    ///
    /// A descent that revisits a node reports `Solid`.
    pub fn contents_at_point(&self, point: Vector3<f32>) -> BspLeafContents {
        if self.nodes.is_empty() {
            return BspLeafContents::Empty;
        }

        // an acyclic descent visits each node at most once
        let mut current = &self.nodes[self.first_node];
        for _ in 0..self.nodes.len() {
            let plane = &self.planes[current.plane_id];
            match current.children[plane.point_side(point) as usize] {
                ClipChild::Contents(c) => return c,
                ClipChild::Node(n) => current = &self.nodes[n],
            }
        }

        warn!("Clip node cycle below node {}", self.first_node);
        BspLeafContents::Solid
    }
}

/// A sub-model record: one brush entity's slice of the map.
#[derive(Debug)]
pub struct BspSubmodel {
    pub mins: Vector3<f32>,
    pub maxs: Vector3<f32>,
    pub origin: Vector3<f32>,
    pub head_nodes: [usize; MAX_MAP_HULLS],
    pub vis_leaf_count: usize,
    pub first_face: usize,
    pub face_count: usize,
}

#[derive(Debug)]
pub struct BspLightmap<'a> {
    width: u32,
    height: u32,
    data: &'a [u8],
}

impl<'a> BspLightmap<'a> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        self.data
    }
}

#[derive(Debug)]
pub struct BspData {
    pub(crate) entities: String,
    pub(crate) planes: Vec<Hyperplane>,
    pub(crate) textures: Box<[Option<BspTexture>]>,
    pub(crate) missing_texture: BspTexture,
    pub(crate) vertices: Box<[Vector3<f32>]>,
    pub(crate) visibility: Box<[u8]>,
    pub(crate) nodes: Box<[BspNode]>,
    pub(crate) texinfo: Box<[BspTexInfo]>,
    pub(crate) surfaces: Box<[Surface]>,
    pub(crate) lighting: Box<[u8]>,
    pub(crate) leaves: Box<[BspLeaf]>,
    pub(crate) mark_surfaces: Box<[usize]>,
    pub(crate) edges: Box<[[u16; 2]]>,
    pub(crate) surf_edges: Box<[i32]>,
    pub(crate) hulls: [Hull; MAX_MAP_HULLS],
    pub(crate) submodels: Box<[BspSubmodel]>,
    pub(crate) lightmap_count: usize,
}

impl BspData {
    pub fn entities(&self) -> &str {
        &self.entities
    }

    pub fn planes(&self) -> &[Hyperplane] {
        &self.planes
    }

    /// The map's texture table. Slots are `None` for absent or unresolved textures.
    pub fn textures(&self) -> &[Option<BspTexture>] {
        &self.textures
    }

    /// Returns the texture for `id`, falling back to the placeholder.
    pub fn texture(&self, id: TextureId) -> &BspTexture {
        match id {
            TextureId::Slot(i) => self
                .textures
                .get(i)
                .and_then(|t| t.as_ref())
                .unwrap_or(&self.missing_texture),
            TextureId::Missing => &self.missing_texture,
        }
    }

    pub fn missing_texture(&self) -> &BspTexture {
        &self.missing_texture
    }

    pub fn vertices(&self) -> &[Vector3<f32>] {
        &self.vertices
    }

    pub fn visibility(&self) -> &[u8] {
        &self.visibility
    }

    pub fn nodes(&self) -> &[BspNode] {
        &self.nodes
    }

    pub fn texinfo(&self) -> &[BspTexInfo] {
        &self.texinfo
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn surface(&self, surface_id: usize) -> &Surface {
        &self.surfaces[surface_id]
    }

    pub fn surface_texinfo(&self, surface_id: usize) -> &BspTexInfo {
        &self.texinfo[self.surfaces[surface_id].texinfo_id]
    }

    pub fn surface_texture(&self, surface_id: usize) -> &BspTexture {
        self.texture(self.surface_texinfo(surface_id).texture)
    }

    /// Iterates over the vertices of a surface's boundary loop, in winding order.
    pub fn surface_iter_vertices(
        &self,
        surface_id: usize,
    ) -> impl Iterator<Item = Vector3<f32>> + '_ {
        let surface = &self.surfaces[surface_id];
        self.surf_edges[surface.first_edge..surface.first_edge + surface.edge_count]
            .iter()
            .map(move |e| self.vertices[surface::edge_vertex(&self.edges, *e)])
    }

    /// Returns the lightmaps of a surface, one per active light style.
    ///
    /// Surfaces without a lightmap atlas block have none.
    pub fn surface_lightmaps(&self, surface_id: usize) -> Vec<BspLightmap> {
        let surface = &self.surfaces[surface_id];
        match surface.light_offset {
            Some(offset) if surface.lightmap.is_some() => {
                let lightmap_w = (surface.extents[0] >> 4) as u32 + 1;
                let lightmap_h = (surface.extents[1] >> 4) as u32 + 1;
                let lightmap_size = (lightmap_w * lightmap_h * 3) as usize;

                surface
                    .light_styles
                    .iter()
                    .take_while(|style| **style != 255)
                    .enumerate()
                    .filter_map(|(i, _)| {
                        let start = offset + lightmap_size * i;
                        self.lighting
                            .get(start..start + lightmap_size)
                            .map(|data| BspLightmap {
                                width: lightmap_w,
                                height: lightmap_h,
                                data,
                            })
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn lighting(&self) -> &[u8] {
        &self.lighting
    }

    /// Number of lightmap atlas blocks used by the map's surfaces.
    pub fn lightmap_count(&self) -> usize {
        self.lightmap_count
    }

    pub fn leaves(&self) -> &[BspLeaf] {
        &self.leaves
    }

    /// Surfaces visible from within `leaf_id`.
    pub fn leaf_surfaces(&self, leaf_id: usize) -> &[usize] {
        let leaf = &self.leaves[leaf_id];
        &self.mark_surfaces[leaf.first_mark_surface..leaf.first_mark_surface + leaf.mark_surface_count]
    }

    pub fn mark_surfaces(&self) -> &[usize] {
        &self.mark_surfaces
    }

    pub fn edges(&self) -> &[[u16; 2]] {
        &self.edges
    }

    pub fn surf_edges(&self) -> &[i32] {
        &self.surf_edges
    }

    pub fn submodels(&self) -> &[BspSubmodel] {
        &self.submodels
    }

    pub fn hulls(&self) -> &[Hull] {
        &self.hulls
    }

    /// Resolves hull `hull_id`, starting at `first_node`.
    ///
    /// Returns `None` for unused hulls.
    pub fn hull_view(&self, hull_id: usize, first_node: usize) -> Option<HullView> {
        let hull = self.hulls.get(hull_id)?;
        let nodes = match hull.nodes {
            HullNodes::Owned(ref nodes) => nodes,
            HullNodes::SharedWith(owner) => match self.hulls.get(owner)?.nodes {
                HullNodes::Owned(ref nodes) => nodes,
                _ => return None,
            },
            HullNodes::Unused => return None,
        };

        Some(HullView {
            planes: &self.planes,
            nodes,
            first_node,
            mins: hull.mins,
            maxs: hull.maxs,
        })
    }

    /// Find the index of the appropriate frame of the texture with index `first`.
    ///
    /// If the texture is not animated, immediately returns `first`.
    pub fn texture_frame_for_time(&self, first: usize, time: Duration) -> usize {
        let animation = |id: usize| {
            self.textures
                .get(id)
                .and_then(|t| t.as_ref())
                .and_then(|t| t.animation.as_ref())
        };

        let frame_time_ms = match animation(first) {
            Some(a) => {
                let sequence_ms = a.sequence_duration.num_milliseconds();
                if sequence_ms <= 0 {
                    return first;
                }
                time.num_milliseconds() % sequence_ms
            }
            None => return first,
        };

        let mut frame_id = first;
        loop {
            let a = match animation(frame_id) {
                Some(a) => a,
                None => return first,
            };

            if frame_time_ms >= a.time_start.num_milliseconds()
                && frame_time_ms < a.time_end.num_milliseconds()
            {
                return frame_id;
            }

            frame_id = a.next;

            // if we get in an infinite cycle, just return the first texture.
            if frame_id == first {
                return first;
            }
        }
    }

    /// Locates the leaf containing the given position vector and returns its index.
    ///
    /// A descent that revisits a node ends in leaf 0.
    pub fn find_leaf<V>(&self, pos: V) -> usize
    where
        V: Into<Vector3<f32>>,
    {
        let pos_vec = pos.into();

        let mut node = match self.nodes.first() {
            Some(n) => n,
            None => return 0,
        };

        for _ in 0..self.nodes.len() {
            let plane = &self.planes[node.plane_id];
            match node.children[plane.point_side(pos_vec) as usize] {
                Child::Node(node_id) => node = &self.nodes[node_id],
                Child::Leaf(leaf_id) => return leaf_id,
            }
        }

        // only a cyclic tree gets here; leaf 0 is the shared solid leaf
        warn!("Node cycle while locating {:?}", pos_vec);
        0
    }

    /// Expands the run-length-encoded visibility row of `leaf_id` into a bit set over
    /// `leaf_count` leaves.
    ///
    /// Bit `i` of the result corresponds to leaf `i + 1`. Leaves without visibility data can see
    /// everything.
    pub fn decompress_vis(&self, leaf_id: usize, leaf_count: usize) -> Vec<u8> {
        let row = (leaf_count + 7) >> 3;

        let offset = match self.leaves.get(leaf_id).and_then(|l| l.vis_offset) {
            Some(o) => o,
            None => return vec![0xFF; row],
        };

        let mut out = Vec::with_capacity(row);
        let mut input = self.visibility[offset..].iter();
        while out.len() < row {
            match input.next() {
                Some(0) => {
                    // a zero byte is followed by a count of zero bytes
                    let count = input.next().map_or(0, |c| *c as usize);
                    let count = count.min(row - out.len());
                    out.extend(std::iter::repeat(0).take(count));
                }
                Some(b) => out.push(*b),
                None => break,
            }
        }

        out.resize(row, 0);
        out
    }

    /// Produces a Graphviz description of the draw tree.
    pub fn gen_dot_graph(&self) -> String {
        let mut dot = String::new();
        dot += "digraph bsp {\n";
        dot += "    rankdir=LR\n";

        if self.nodes.is_empty() {
            dot += "}";
            return dot;
        }

        let mut ranks: Vec<Vec<usize>> = Vec::new();
        let mut queue = VecDeque::new();
        let mut visited = vec![false; self.nodes.len()];
        queue.push_back((0, 0));
        visited[0] = true;

        while let Some((node_id, rank)) = queue.pop_front() {
            if rank >= ranks.len() {
                ranks.push(Vec::new());
            }
            ranks[rank].push(node_id);

            for child in self.nodes[node_id].children.iter() {
                match *child {
                    Child::Node(n) => {
                        let _ = writeln!(dot, "    n{} -> n{}", node_id, n);
                        if !visited[n] {
                            visited[n] = true;
                            queue.push_back((n, rank + 1));
                        }
                    }
                    Child::Leaf(l) => {
                        let _ = writeln!(dot, "    n{} -> l{}", node_id, l);
                    }
                }
            }
        }

        for rank in ranks {
            let names: Vec<String> = rank.iter().map(|n| format!("n{}", n)).collect();
            let _ = writeln!(dot, "    {{rank=same;{}}}", names.join(","));
        }

        dot += "}";
        dot
    }
}

/// The collision bounds and node range of one hull of a brush model.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HullRange {
    pub first_node: usize,
    pub last_node: usize,
}

/// One brush model of a map: the world or one of its numbered sub-models.
///
/// Every brush model of a map shares the same decoded map data.
#[derive(Debug)]
pub struct BspModel {
    pub(crate) bsp_data: Rc<BspData>,
    pub(crate) submodel_id: usize,
    pub(crate) mins: Vector3<f32>,
    pub(crate) maxs: Vector3<f32>,
    pub(crate) origin: Vector3<f32>,
    pub(crate) radius: f32,
    pub(crate) hulls: [HullRange; MAX_MAP_HULLS],
    pub(crate) first_surface: usize,
    pub(crate) surface_count: usize,
    pub(crate) leaf_count: usize,
}

impl BspModel {
    pub fn bsp_data(&self) -> &Rc<BspData> {
        &self.bsp_data
    }

    pub fn submodel_id(&self) -> usize {
        self.submodel_id
    }

    /// Returns the minimum extent of this BSP model.
    pub fn min(&self) -> Vector3<f32> {
        self.mins
    }

    /// Returns the maximum extent of this BSP model.
    pub fn max(&self) -> Vector3<f32> {
        self.maxs
    }

    /// Returns the origin of this BSP model.
    pub fn origin(&self) -> Vector3<f32> {
        self.origin
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn hull_range(&self, hull_id: usize) -> HullRange {
        self.hulls[hull_id]
    }

    /// Resolves this model's hull `hull_id`, or `None` if the hull is unused.
    pub fn hull(&self, hull_id: usize) -> Option<HullView> {
        let range = self.hulls.get(hull_id)?;
        self.bsp_data.hull_view(hull_id, range.first_node)
    }

    pub fn first_surface(&self) -> usize {
        self.first_surface
    }

    pub fn surface_count(&self) -> usize {
        self.surface_count
    }

    /// The surfaces belonging to this model.
    pub fn surfaces(&self) -> &[Surface] {
        &self.bsp_data.surfaces[self.first_surface..self.first_surface + self.surface_count]
    }

    /// Number of leaves visible from this model, not counting the shared solid leaf.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Returns the contents of hull 0 at `point`.
    pub fn contents_at_point(&self, point: Vector3<f32>) -> BspLeafContents {
        match self.hull(0) {
            Some(hull) => hull.contents_at_point(point),
            None => BspLeafContents::Empty,
        }
    }
}
