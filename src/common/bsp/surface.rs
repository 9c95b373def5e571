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

//! Surface assembly: texture extents, lightmap allocation and polygon construction.

use crate::{
    client::render::RenderBackend,
    common::{
        bsp::{
            error::out_of_range, warp, BspError, BspErrorKind, BspTexInfo, BspTexture,
            LightmapBlock, LoadOptions, PolyVertex, Polygon, Surface, SurfaceFlags, TextureId,
        },
        math,
    },
};

use cgmath::Vector3;

/// Width of a lightmap atlas block, in luxels.
pub const BLOCK_WIDTH: usize = 128;

/// Height of a lightmap atlas block, in luxels.
pub const BLOCK_HEIGHT: usize = 128;

/// The largest number of lightmap atlas blocks a map may use.
pub const MAX_LIGHTMAP_BLOCKS: usize = 64;

/// The largest texture-space extent allowed for a surface without the special flag.
pub const MAX_SURFACE_EXTENT: i32 = 512;

/// Texture-space bounds given to liquid surfaces, which are never lightmapped.
const TURB_EXTENT: i32 = 16384;

/// Returns the vertex index at the start of surface edge `surf_edge`.
///
/// A positive entry walks edge `e` forward; a negative entry walks edge `-e` backward.
pub(crate) fn edge_vertex(edges: &[[u16; 2]], surf_edge: i32) -> usize {
    if surf_edge >= 0 {
        edges[surf_edge as usize][0] as usize
    } else {
        edges[-(surf_edge as i64) as usize][1] as usize
    }
}

/// Like `edge_vertex`, but checks the edge and vertex indices.
pub(crate) fn checked_edge_vertex(
    edges: &[[u16; 2]],
    vertex_count: usize,
    surf_edge: i32,
) -> Result<usize, BspError> {
    let edge_id = (surf_edge as i64).abs();
    if edge_id as usize >= edges.len() {
        return Err(out_of_range("edge", edge_id, edges.len()));
    }

    let vertex_id = edge_vertex(edges, surf_edge);
    if vertex_id >= vertex_count {
        return Err(out_of_range("vertex", vertex_id as i64, vertex_count));
    }

    Ok(vertex_id)
}

/// Surface flags implied by a texture name.
pub fn classify(texture_name: &str) -> SurfaceFlags {
    if texture_name.len() >= 3 && texture_name[..3].eq_ignore_ascii_case("sky") {
        SurfaceFlags::DRAW_SKY | SurfaceFlags::DRAW_TILED
    } else if texture_name.starts_with('*') {
        SurfaceFlags::DRAW_TURB | SurfaceFlags::DRAW_TILED
    } else {
        SurfaceFlags::empty()
    }
}

/// Computes the texture-space bounds of a surface, snapped outward to 16-unit blocks.
///
/// Returns `(texture_mins, extents)`. Fails with `ExtentsTooLarge` if the surface is not special
/// and either extent exceeds `max_extent`.
pub fn calc_extents(
    surface_id: usize,
    verts: &[Vector3<f32>],
    texinfo: &BspTexInfo,
    special: bool,
    max_extent: i32,
) -> Result<([i32; 2], [i32; 2]), BspError> {
    let mut mins = [std::f32::INFINITY; 2];
    let mut maxs = [std::f32::NEG_INFINITY; 2];

    for v in verts.iter() {
        let st = texinfo.project(*v);
        for i in 0..2 {
            mins[i] = mins[i].min(st[i]);
            maxs[i] = maxs[i].max(st[i]);
        }
    }

    let mut texture_mins = [0; 2];
    let mut extents = [0; 2];
    for i in 0..2 {
        let bmin = (mins[i] / 16.0).floor() as i32;
        let bmax = (maxs[i] / 16.0).ceil() as i32;

        texture_mins[i] = bmin * 16;
        extents[i] = (bmax - bmin) * 16;

        if !special && extents[i] > max_extent {
            return Err(BspErrorKind::ExtentsTooLarge {
                surface: surface_id,
                extents: extents[i],
            }
            .into());
        }
    }

    Ok((texture_mins, extents))
}

/// Sets flags, extents and, for sky and liquid surfaces, the subdivided polygon chain of a newly
/// decoded surface.
pub fn prepare_surface(
    surface_id: usize,
    surface: &mut Surface,
    verts: &[Vector3<f32>],
    texinfo: &BspTexInfo,
    texture: Option<&BspTexture>,
    options: &LoadOptions,
) -> Result<(), BspError> {
    let kind = texture.map_or(SurfaceFlags::empty(), |t| classify(t.name()));
    surface.flags |= kind;

    let special = texinfo.is_special() || !kind.is_empty();
    let (texture_mins, extents) =
        calc_extents(surface_id, verts, texinfo, special, options.max_surface_extent)?;
    surface.texture_mins = texture_mins;
    surface.extents = extents;

    if kind.contains(SurfaceFlags::DRAW_TURB) {
        surface.texture_mins = [-TURB_EXTENT / 2; 2];
        surface.extents = [TURB_EXTENT; 2];
    }

    if !kind.is_empty() {
        let dims = texture.map_or((1, 1), |t| t.dimensions());
        for poly in warp::subdivide(verts, options.subdivide_size)? {
            let vertices = poly
                .into_iter()
                .map(|p| {
                    let st = texinfo.project(p);
                    PolyVertex {
                        position: p.into(),
                        diffuse_texcoord: [st[0] / dims.0 as f32, st[1] / dims.1 as f32],
                        lightmap_texcoord: [0.0, 0.0],
                    }
                })
                .collect();

            surface.push_polygon(Polygon {
                next: None,
                vertices,
                vertex_buffer: None,
            });
        }
    }

    Ok(())
}

/// Packs surface lightmaps into fixed-size atlas blocks.
///
/// Each block keeps a skyline: the lowest free row in every column.
#[derive(Debug, Default)]
pub struct LightmapAtlas {
    blocks: Vec<[usize; BLOCK_WIDTH]>,
}

impl LightmapAtlas {
    pub fn new() -> LightmapAtlas {
        LightmapAtlas::default()
    }

    /// Number of blocks in use.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Reserves a `width` by `height` region, opening a new block if none of the current ones
    /// have room.
    pub fn alloc(&mut self, width: usize, height: usize) -> Result<LightmapBlock, BspError> {
        if width > BLOCK_WIDTH || height > BLOCK_HEIGHT {
            return Err(BspErrorKind::LightmapAtlasFull.into());
        }

        for (texture, columns) in self.blocks.iter_mut().enumerate() {
            if let Some((s, t)) = Self::fit(columns, width, height) {
                return Ok(LightmapBlock {
                    texture,
                    s: s as u32,
                    t: t as u32,
                });
            }
        }

        if self.blocks.len() >= MAX_LIGHTMAP_BLOCKS {
            return Err(BspErrorKind::LightmapAtlasFull.into());
        }

        self.blocks.push([0; BLOCK_WIDTH]);
        let texture = self.blocks.len() - 1;
        match Self::fit(&mut self.blocks[texture], width, height) {
            Some((s, t)) => Ok(LightmapBlock {
                texture,
                s: s as u32,
                t: t as u32,
            }),
            None => Err(BspErrorKind::LightmapAtlasFull.into()),
        }
    }

    fn fit(columns: &mut [usize; BLOCK_WIDTH], width: usize, height: usize) -> Option<(usize, usize)> {
        let mut best = BLOCK_HEIGHT;
        let mut best_x = 0;

        for x in 0..=BLOCK_WIDTH - width {
            let mut top = 0;
            let mut fits = true;
            for col in columns[x..x + width].iter() {
                if *col >= best {
                    fits = false;
                    break;
                }
                top = top.max(*col);
            }

            if fits {
                best_x = x;
                best = top;
            }
        }

        if best + height > BLOCK_HEIGHT {
            return None;
        }

        for col in columns[best_x..best_x + width].iter_mut() {
            *col = best + height;
        }

        Some((best_x, best))
    }
}

/// Builds the polygon of a non-subdivided surface from its boundary loop.
///
/// Colinear vertices are dropped unless the surface is underwater or `keep_tjunctions` is set.
pub fn build_polygon(
    surface: &Surface,
    verts: &[Vector3<f32>],
    texinfo: &BspTexInfo,
    texture: &BspTexture,
    keep_tjunctions: bool,
) -> Vec<PolyVertex> {
    let (width, height) = texture.dimensions();
    let mut poly: Vec<PolyVertex> = verts
        .iter()
        .map(|v| {
            let st = texinfo.project(*v);

            let lightmap_st = |i: usize, light_pos: u32| {
                (st[i] - surface.texture_mins[i] as f32 + light_pos as f32 * 16.0 + 8.0)
                    / (BLOCK_WIDTH * 16) as f32
            };

            let lightmap_texcoord = match surface.lightmap {
                Some(light) => [lightmap_st(0, light.s), lightmap_st(1, light.t)],
                None => [0.0, 0.0],
            };

            PolyVertex {
                position: (*v).into(),
                diffuse_texcoord: [st[0] / width as f32, st[1] / height as f32],
                lightmap_texcoord,
            }
        })
        .collect();

    if !keep_tjunctions && !surface.flags.contains(SurfaceFlags::UNDERWATER) {
        let before = poly.len();
        math::remove_collinear(&mut poly, |v| Vector3::from(v.position));
        if poly.len() != before {
            trace!("Removed {} colinear vertices", before - poly.len());
        }
    }

    poly
}

/// Allocates lightmaps and builds the polygon chains of every surface, uploading each polygon
/// that has no vertex buffer yet.
///
/// Surfaces that already have polygons are not rebuilt.
pub fn build_display_lists(
    surfaces: &mut [Surface],
    surface_verts: impl Fn(&Surface) -> Vec<Vector3<f32>>,
    texinfo: &[BspTexInfo],
    textures: &[Option<BspTexture>],
    missing_texture: &BspTexture,
    keep_tjunctions: bool,
    renderer: &mut dyn RenderBackend,
) -> Result<usize, BspError> {
    let mut atlas = LightmapAtlas::new();

    for surface in surfaces.iter_mut() {
        let tex = &texinfo[surface.texinfo_id];

        // special surfaces are never lightmapped
        let lit = !surface.flags.contains(SurfaceFlags::DRAW_TILED) && !tex.is_special();
        if lit && surface.lightmap.is_none() {
            let w = (surface.extents[0] >> 4) as usize + 1;
            let h = (surface.extents[1] >> 4) as usize + 1;
            surface.lightmap = Some(atlas.alloc(w, h)?);
        }

        if !surface.has_polygons() {
            let verts = surface_verts(surface);
            if verts.len() < 3 {
                warn!("Skipping degenerate surface with {} vertices", verts.len());
                continue;
            }

            let texture = match tex.texture {
                TextureId::Slot(i) => textures
                    .get(i)
                    .and_then(|t| t.as_ref())
                    .unwrap_or(missing_texture),
                TextureId::Missing => missing_texture,
            };

            let vertices = build_polygon(surface, &verts, tex, texture, keep_tjunctions);
            surface.push_polygon(Polygon {
                next: None,
                vertices,
                vertex_buffer: None,
            });
        }

        let mut next = surface.polys.as_deref_mut();
        while let Some(poly) = next {
            if poly.vertex_buffer.is_none() {
                poly.vertex_buffer = Some(renderer.upload_vertex_buffer(&poly.vertices));
            }
            next = poly.next.as_deref_mut();
        }
    }

    Ok(atlas.block_count())
}
