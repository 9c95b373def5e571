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

//! Map decoding, in the fixed lump order, followed by tree and surface post-processing.

use std::rc::Rc;

use crate::{
    client::render::RenderBackend,
    common::{
        bsp::{
            error::out_of_range,
            lump::{
                read_records, DiskClipNode, DiskEdge, DiskFace, DiskLeaf, DiskMarkSurface,
                DiskModel, DiskNode, DiskPlane, DiskSurfEdge, DiskTexInfo, DiskVertex, Header,
                LumpId,
            },
            surface, texture, tree, BspData, BspError, BspErrorKind, BspLeaf, BspLeafContents,
            BspModel, BspSubmodel, BspTexInfo, BspTexture, HullNodes, HullRange, Surface,
            SurfaceFlags, TexInfoFlags, TextureId, MAX_MAP_HULLS,
        },
        math::{self, Hyperplane},
        model::{ModelHandle, ModelKind, ModelRegistry},
        wad::TextureArchives,
    },
};

use cgmath::{InnerSpace, Vector3};

/// Grid spacing used to subdivide sky and liquid surfaces.
pub const DEFAULT_SUBDIVIDE_SIZE: f32 = 128.0;

#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub subdivide_size: f32,

    /// Keep colinear polygon vertices instead of removing them.
    pub keep_tjunctions: bool,

    pub max_surface_extent: i32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            subdivide_size: DEFAULT_SUBDIVIDE_SIZE,
            keep_tjunctions: false,
            max_surface_extent: surface::MAX_SURFACE_EXTENT,
        }
    }
}

/// The collaborators a map load needs: texture archives to resolve external textures against
/// and a render backend to upload textures and polygons to.
pub struct LoadContext<'a> {
    pub archives: &'a mut dyn TextureArchives,
    pub renderer: &'a mut dyn RenderBackend,
    pub options: LoadOptions,
}

impl<'a> LoadContext<'a> {
    pub fn new(
        archives: &'a mut dyn TextureArchives,
        renderer: &'a mut dyn RenderBackend,
    ) -> LoadContext<'a> {
        LoadContext {
            archives,
            renderer,
            options: LoadOptions::default(),
        }
    }
}

fn load_entities(lump: &[u8]) -> String {
    String::from_utf8_lossy(lump)
        .trim_end_matches('\0')
        .to_owned()
}

fn load_planes(disk: Vec<DiskPlane>) -> Vec<Hyperplane> {
    // twice the decoded count is reserved; only the first half is populated
    let mut planes = Vec::with_capacity(disk.len() * 2);
    planes.extend(
        disk.into_iter()
            .map(|p| Hyperplane::new(Vector3::from(p.normal), p.dist)),
    );
    planes
}

fn mip_adjust(s_vector: Vector3<f32>, t_vector: Vector3<f32>) -> u8 {
    let len = (s_vector.magnitude() + t_vector.magnitude()) / 2.0;
    if len < 0.32 {
        4
    } else if len < 0.49 {
        3
    } else if len < 0.99 {
        2
    } else {
        1
    }
}

fn load_texinfo(
    disk: Vec<DiskTexInfo>,
    textures: &[Option<BspTexture>],
) -> Vec<BspTexInfo> {
    disk.into_iter()
        .map(|d| {
            let s_vector = Vector3::new(d.vecs[0][0], d.vecs[0][1], d.vecs[0][2]);
            let t_vector = Vector3::new(d.vecs[1][0], d.vecs[1][1], d.vecs[1][2]);

            let texture = match d.texture_id {
                id if id >= 0
                    && (id as usize) < textures.len()
                    && textures[id as usize].is_some() =>
                {
                    TextureId::Slot(id as usize)
                }
                _ => TextureId::Missing,
            };

            let flags = match texture {
                TextureId::Slot(_) => TexInfoFlags::from_bits_truncate(d.flags),
                TextureId::Missing => TexInfoFlags::empty(),
            };

            BspTexInfo {
                s_vector,
                s_offset: d.vecs[0][3],
                t_vector,
                t_offset: d.vecs[1][3],
                texture,
                flags,
                mip_adjust: mip_adjust(s_vector, t_vector),
            }
        })
        .collect()
}

struct Geometry<'a> {
    vertices: &'a [Vector3<f32>],
    edges: &'a [[u16; 2]],
    surf_edges: &'a [i32],
}

impl<'a> Geometry<'a> {
    fn surface_vertices(&self, first_edge: usize, edge_count: usize) -> Vec<Vector3<f32>> {
        self.surf_edges[first_edge..first_edge + edge_count]
            .iter()
            .map(|e| self.vertices[surface::edge_vertex(self.edges, *e)])
            .collect()
    }
}

fn load_faces(
    disk: Vec<DiskFace>,
    geometry: &Geometry,
    plane_count: usize,
    texinfo: &[BspTexInfo],
    textures: &[Option<BspTexture>],
    lighting_len: usize,
    options: &LoadOptions,
) -> Result<Vec<Surface>, BspError> {
    let mut surfaces = Vec::with_capacity(disk.len());

    for (surface_id, face) in disk.into_iter().enumerate() {
        if face.plane_id < 0 || face.plane_id as usize >= plane_count {
            return Err(out_of_range("plane", face.plane_id as i64, plane_count));
        }

        if face.texinfo_id < 0 || face.texinfo_id as usize >= texinfo.len() {
            return Err(out_of_range(
                "texinfo",
                face.texinfo_id as i64,
                texinfo.len(),
            ));
        }

        let first_edge = face.first_edge.max(0) as usize;
        let edge_count = face.edge_count.max(0) as usize;
        let surf_edge_count = geometry.surf_edges.len();
        if face.first_edge < 0 || first_edge + edge_count > surf_edge_count {
            return Err(out_of_range(
                "surface edge",
                face.first_edge as i64 + edge_count as i64,
                surf_edge_count,
            ));
        }

        for e in geometry.surf_edges[first_edge..first_edge + edge_count].iter() {
            surface::checked_edge_vertex(geometry.edges, geometry.vertices.len(), *e)?;
        }

        let light_offset = match face.light_offset {
            -1 => None,
            o if o < 0 || o as usize >= lighting_len => {
                return Err(out_of_range("lightmap offset", o as i64, lighting_len));
            }
            o => Some(o as usize),
        };

        let mut flags = SurfaceFlags::empty();
        if face.side != 0 {
            flags |= SurfaceFlags::PLANE_BACK;
        }

        let mut surface = Surface {
            plane_id: face.plane_id as usize,
            flags,
            first_edge,
            edge_count,
            texinfo_id: face.texinfo_id as usize,
            texture_mins: [0; 2],
            extents: [0; 2],
            light_styles: face.light_styles,
            light_offset,
            lightmap: None,
            polys: None,
        };

        let verts = geometry.surface_vertices(first_edge, edge_count);
        if verts.len() < 3 {
            warn!("Surface {} has only {} vertices", surface_id, verts.len());
            surfaces.push(surface);
            continue;
        }

        let tex = &texinfo[surface.texinfo_id];
        let texture = match tex.texture {
            TextureId::Slot(i) => textures[i].as_ref(),
            TextureId::Missing => None,
        };
        surface::prepare_surface(surface_id, &mut surface, &verts, tex, texture, options)?;

        surfaces.push(surface);
    }

    Ok(surfaces)
}

fn load_mark_surfaces(
    disk: Vec<DiskMarkSurface>,
    surface_count: usize,
) -> Result<Vec<usize>, BspError> {
    disk.into_iter()
        .map(|DiskMarkSurface(s)| {
            if s as usize >= surface_count {
                Err(out_of_range("surface", s as i64, surface_count))
            } else {
                Ok(s as usize)
            }
        })
        .collect()
}

fn load_leaves(
    disk: Vec<DiskLeaf>,
    mark_surfaces: &[usize],
    surfaces: &mut [Surface],
    vis_len: usize,
) -> Result<Vec<BspLeaf>, BspError> {
    let mut leaves = Vec::with_capacity(disk.len());

    for (leaf_id, d) in disk.into_iter().enumerate() {
        let contents = BspLeafContents::from_raw(d.contents)?;

        let vis_offset = match d.vis_offset {
            -1 => None,
            o if o < 0 || o as usize >= vis_len => {
                return Err(out_of_range("visibility offset", o as i64, vis_len));
            }
            o => Some(o as usize),
        };

        let first_mark_surface = d.first_mark_surface as usize;
        let mark_surface_count = d.mark_surface_count as usize;
        if first_mark_surface + mark_surface_count > mark_surfaces.len() {
            return Err(out_of_range(
                "mark surface",
                (first_mark_surface + mark_surface_count) as i64,
                mark_surfaces.len(),
            ));
        }

        // leaf 0 is the shared solid leaf
        if leaf_id != 0 && contents.is_underwater() {
            let marks = &mark_surfaces[first_mark_surface..first_mark_surface + mark_surface_count];
            for s in marks.iter() {
                surfaces[*s].flags |= SurfaceFlags::UNDERWATER;
            }
        }

        leaves.push(BspLeaf {
            contents,
            vis_offset,
            mins: d.mins,
            maxs: d.maxs,
            first_mark_surface,
            mark_surface_count,
            ambient_levels: d.ambient_levels,
            parent: None,
        });
    }

    Ok(leaves)
}

fn load_submodels(
    disk: Vec<DiskModel>,
    node_count: usize,
    clip_node_count: usize,
    surface_count: usize,
) -> Result<Vec<BspSubmodel>, BspError> {
    if disk.is_empty() {
        return Err(BspErrorKind::MissingRequiredLump {
            lump: LumpId::Models,
        }
        .into());
    }

    let mut submodels = Vec::with_capacity(disk.len());
    for d in disk.into_iter() {
        let mut head_nodes = [0; MAX_MAP_HULLS];
        for (hull, head) in d.head_nodes.iter().enumerate() {
            let count = if hull == 0 { node_count } else { clip_node_count };
            if *head < 0 || (count > 0 && *head as usize >= count) {
                return Err(out_of_range("head node", *head as i64, count));
            }
            head_nodes[hull] = *head as usize;
        }

        if d.first_face < 0
            || d.face_count < 0
            || d.first_face as usize + d.face_count as usize > surface_count
        {
            return Err(out_of_range(
                "surface",
                d.first_face as i64 + d.face_count as i64,
                surface_count,
            ));
        }

        let one = Vector3::new(1.0, 1.0, 1.0);
        submodels.push(BspSubmodel {
            mins: Vector3::from(d.mins) - one,
            maxs: Vector3::from(d.maxs) + one,
            origin: Vector3::from(d.origin),
            head_nodes,
            vis_leaf_count: d.vis_leaf_count.max(0) as usize,
            first_face: d.first_face as usize,
            face_count: d.face_count as usize,
        });
    }

    Ok(submodels)
}

/// Decodes a map and builds its draw tree, collision hulls and surface polygons.
pub fn load(data: &[u8], ctx: &mut LoadContext) -> Result<BspData, BspError> {
    let header = Header::read(data)?;

    let vertices: Vec<Vector3<f32>> = read_records::<DiskVertex>(&header, data)?
        .into_iter()
        .map(|v| Vector3::from(v.position))
        .collect();
    debug!("Vertex count = {}", vertices.len());

    let edges: Vec<[u16; 2]> = read_records::<DiskEdge>(&header, data)?
        .into_iter()
        .map(|e| e.vertices)
        .collect();

    let surf_edges: Vec<i32> = read_records::<DiskSurfEdge>(&header, data)?
        .into_iter()
        .map(|DiskSurfEdge(e)| e)
        .collect();

    let entities = load_entities(header.lump_data(data, LumpId::Entities));

    let textures = texture::load_textures(
        header.lump_data(data, LumpId::Textures),
        &entities,
        ctx.archives,
        ctx.renderer,
    )?;
    let missing_texture = texture::missing_texture(ctx.renderer);

    let lighting = header.lump_data(data, LumpId::Lighting).to_vec();

    let planes = load_planes(read_records::<DiskPlane>(&header, data)?);
    debug!("Plane count = {}", planes.len());

    let texinfo = load_texinfo(read_records::<DiskTexInfo>(&header, data)?, &textures);

    let geometry = Geometry {
        vertices: &vertices,
        edges: &edges,
        surf_edges: &surf_edges,
    };
    let mut surfaces = load_faces(
        read_records::<DiskFace>(&header, data)?,
        &geometry,
        planes.len(),
        &texinfo,
        &textures,
        lighting.len(),
        &ctx.options,
    )?;
    debug!("Surface count = {}", surfaces.len());

    let mark_surfaces =
        load_mark_surfaces(read_records::<DiskMarkSurface>(&header, data)?, surfaces.len())?;

    let visibility = header.lump_data(data, LumpId::Visibility).to_vec();

    let mut leaves = load_leaves(
        read_records::<DiskLeaf>(&header, data)?,
        &mark_surfaces,
        &mut surfaces,
        visibility.len(),
    )?;
    debug!("Leaf count = {}", leaves.len());

    let mut nodes = tree::load_nodes(
        &read_records::<DiskNode>(&header, data)?,
        planes.len(),
        leaves.len(),
        surfaces.len(),
    )?;
    tree::set_parents(&mut nodes, &mut leaves);
    debug!("Node count = {}", nodes.len());

    let clip_nodes =
        tree::load_clip_nodes(&read_records::<DiskClipNode>(&header, data)?, planes.len())?;
    debug!("Clip node count = {}", clip_nodes.len());

    let submodels = load_submodels(
        read_records::<DiskModel>(&header, data)?,
        nodes.len(),
        clip_nodes.len(),
        surfaces.len(),
    )?;

    let hull0 = tree::make_hull0(&nodes, &leaves);
    let hulls = tree::make_hulls(hull0, clip_nodes);

    let lightmap_count = surface::build_display_lists(
        &mut surfaces,
        |s| geometry.surface_vertices(s.first_edge, s.edge_count),
        &texinfo,
        &textures,
        &missing_texture,
        ctx.options.keep_tjunctions,
        ctx.renderer,
    )?;
    debug!("Lightmap block count = {}", lightmap_count);

    Ok(BspData {
        entities,
        planes,
        textures: textures.into_boxed_slice(),
        missing_texture,
        vertices: vertices.into_boxed_slice(),
        visibility: visibility.into_boxed_slice(),
        nodes: nodes.into_boxed_slice(),
        texinfo: texinfo.into_boxed_slice(),
        surfaces: surfaces.into_boxed_slice(),
        lighting: lighting.into_boxed_slice(),
        leaves: leaves.into_boxed_slice(),
        mark_surfaces: mark_surfaces.into_boxed_slice(),
        edges: edges.into_boxed_slice(),
        surf_edges: surf_edges.into_boxed_slice(),
        hulls,
        submodels: submodels.into_boxed_slice(),
        lightmap_count,
    })
}

/// Builds one brush model per sub-model record, all sharing `bsp_data`.
pub fn build_models(bsp_data: Rc<BspData>) -> Vec<BspModel> {
    let last_node = bsp_data.nodes.len().saturating_sub(1);
    let last_clip_node = match bsp_data.hulls[1].nodes {
        HullNodes::Owned(ref nodes) => nodes.len().saturating_sub(1),
        _ => 0,
    };

    bsp_data
        .submodels
        .iter()
        .enumerate()
        .map(|(submodel_id, submodel)| {
            let mut hulls = [HullRange::default(); MAX_MAP_HULLS];
            for (hull, range) in hulls.iter_mut().enumerate() {
                *range = HullRange {
                    first_node: submodel.head_nodes[hull],
                    last_node: if hull == 0 { last_node } else { last_clip_node },
                };
            }

            BspModel {
                bsp_data: bsp_data.clone(),
                submodel_id,
                mins: submodel.mins,
                maxs: submodel.maxs,
                origin: submodel.origin,
                radius: math::radius_from_bounds(submodel.mins, submodel.maxs),
                hulls,
                first_surface: submodel.first_face,
                surface_count: submodel.face_count,
                leaf_count: submodel.vis_leaf_count,
            }
        })
        .collect()
}

/// Loads the map in `data` into `registry` under `name`.
///
/// The world model is stored under `name` and each further sub-model `i` under `*i`. If `name`
/// is already loaded, its handle is returned without decoding `data`. On failure the slot for
/// `name` is left unloaded.
pub fn load_brush_model<S>(
    registry: &mut ModelRegistry,
    name: S,
    data: &[u8],
    ctx: &mut LoadContext,
) -> Result<ModelHandle, BspError>
where
    S: AsRef<str>,
{
    let name = name.as_ref();
    let handle = registry.get_or_insert(name)?;
    if registry.get(handle).is_loaded() {
        debug!("{} is already loaded", name);
        return Ok(handle);
    }

    info!("Loading map {}", name);
    let bsp_data = Rc::new(load(data, ctx)?);

    for (i, model) in build_models(bsp_data).into_iter().enumerate() {
        let target = match i {
            0 => handle,
            _ => registry.get_or_insert(format!("*{}", i))?,
        };

        registry.get_mut(target).set_kind(ModelKind::Brush(model));
    }

    Ok(handle)
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{
        client::render::HeadlessBackend,
        common::bsp::{
            test_map::{MapBuilder, MockArchives},
            Child, ClipChild,
        },
    };

    use chrono::Duration;

    fn load_map(
        map: &MapBuilder,
        archives: &mut MockArchives,
        backend: &mut HeadlessBackend,
    ) -> Result<BspData, BspError> {
        let mut ctx = LoadContext::new(archives, backend);
        load(&map.build(), &mut ctx)
    }

    #[test]
    fn test_load_version_mismatch() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.version = 29;

        let err = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::VersionMismatch {
                found: 29,
                expected: 30,
            }
        );
    }

    #[test]
    fn test_load_single_face() {
        let map = MapBuilder::single_face("wall", 64.0);
        let mut backend = HeadlessBackend::new();
        let bsp = load_map(&map, &mut MockArchives::default(), &mut backend).unwrap();

        assert_eq!(bsp.planes().len(), 1);
        assert!(bsp.planes.capacity() >= 2);
        assert_eq!(bsp.vertices().len(), 4);
        assert_eq!(bsp.surfaces().len(), 1);
        assert_eq!(bsp.leaves().len(), 2);
        assert_eq!(bsp.nodes()[0].children, [Child::Leaf(1), Child::Leaf(0)]);
        assert_eq!(bsp.leaves()[1].parent, Some(0));

        let surface = bsp.surface(0);
        assert_eq!(surface.texture_mins, [0, 0]);
        assert_eq!(surface.extents, [64, 64]);
        assert_eq!(surface.polygons().count(), 1);

        let poly = surface.polygons().next().unwrap();
        assert_eq!(poly.vertices().len(), 4);
        assert!(poly.vertex_buffer().is_some());
        assert_eq!(bsp.surface_texture(0).name(), "wall");
        assert_eq!(bsp.lightmap_count(), 1);

        // the wall texture and the placeholder
        assert_eq!(backend.textures().len(), 2);
        assert_eq!(backend.vertex_buffer_count(), 1);
    }

    #[test]
    fn test_surface_lightmaps_per_style() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.faces[0].light_styles = [0, 10, 255, 255];
        map.lighting = (0..150).map(|i| i as u8).collect();

        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();
        let lightmaps = bsp.surface_lightmaps(0);

        // 64 units is 5 luxels per axis, 3 bytes per luxel
        assert_eq!(lightmaps.len(), 2);
        assert_eq!((lightmaps[0].width(), lightmaps[0].height()), (5, 5));
        assert_eq!(lightmaps[0].data().len(), 75);
        assert_eq!(lightmaps[1].data()[0], 75);
    }

    #[test]
    fn test_load_sky_face_subdivided() {
        let map = MapBuilder::single_face("sky", 512.0);
        let mut backend = HeadlessBackend::new();
        let bsp = load_map(&map, &mut MockArchives::default(), &mut backend).unwrap();

        let surface = bsp.surface(0);
        assert!(surface.flags.contains(SurfaceFlags::DRAW_SKY));
        assert!(surface.polygons().count() > 1);
        for poly in surface.polygons() {
            assert!(poly.vertices().len() <= 64);
            assert!(poly.vertex_buffer().is_some());
        }
        assert_eq!(surface.lightmap, None);
        assert_eq!(backend.vertex_buffer_count(), surface.polygons().count());
    }

    #[test]
    fn test_load_extents_too_large() {
        let map = MapBuilder::single_face("wall", 1024.0);
        let err = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::ExtentsTooLarge {
                surface: 0,
                extents: 1024,
            }
        );

        let mut map = MapBuilder::single_face("wall", 1024.0);
        map.texinfo[0].flags = TexInfoFlags::SPECIAL.bits();
        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new());
        assert!(bsp.is_ok());
    }

    #[test]
    fn test_load_special_surface_not_lightmapped() {
        // wider than a whole lightmap block
        let mut map = MapBuilder::single_face("wall", 4096.0);
        map.texinfo[0].flags = TexInfoFlags::SPECIAL.bits();

        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();
        let surface = bsp.surface(0);
        assert_eq!(surface.extents, [4096, 4096]);
        assert_eq!(surface.lightmap, None);
        assert_eq!(bsp.lightmap_count(), 0);
        assert!(bsp.surface_lightmaps(0).is_empty());

        let poly = surface.polygons().next().unwrap();
        assert!(poly
            .vertices()
            .iter()
            .all(|v| v.lightmap_texcoord == [0.0, 0.0]));
    }

    #[test]
    fn test_load_underwater_keeps_colinear_vertices() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.split_first_edge();

        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();
        assert_eq!(bsp.surface(0).polygons().next().unwrap().vertices().len(), 4);

        map.leaves[1].contents = BspLeafContents::Water as i32;
        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();
        let surface = bsp.surface(0);
        assert!(surface.flags.contains(SurfaceFlags::UNDERWATER));
        assert_eq!(surface.polygons().next().unwrap().vertices().len(), 5);
    }

    #[test]
    fn test_load_archive_names_from_entities() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.make_texture_external();
        map.entities =
            "{\n\"classname\" \"worldspawn\"\n\"wad\" \"archive1.wad;ARCHIVE2.WAD\"\n}\n".to_owned();

        let mut archives = MockArchives::default();
        let bsp = load_map(&map, &mut archives, &mut HeadlessBackend::new()).unwrap();

        assert_eq!(archives.added, vec!["archive1", "archive2"]);

        // not in any archive: the texinfo falls back to the placeholder
        assert!(bsp.textures()[0].is_none());
        assert_eq!(bsp.texinfo()[0].texture, TextureId::Missing);
        assert_eq!(bsp.surface_texture(0).name(), texture::MISSING_TEXTURE_NAME);
    }

    #[test]
    fn test_load_texinfo_out_of_range_uses_placeholder() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.texinfo[0].texture_id = 7;
        map.texinfo[0].flags = TexInfoFlags::SPECIAL.bits();

        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();
        assert_eq!(bsp.texinfo()[0].texture, TextureId::Missing);
        assert_eq!(bsp.texinfo()[0].flags, TexInfoFlags::empty());
    }

    #[test]
    fn test_load_bad_indices() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.faces[0].texinfo_id = 3;
        let err = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::IndexOutOfRange {
                what: "texinfo",
                index: 3,
                count: 1,
            }
        );

        let mut map = MapBuilder::single_face("wall", 64.0);
        map.mark_surfaces[0] = 4;
        let err = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::IndexOutOfRange {
                what: "surface",
                index: 4,
                count: 1,
            }
        );

        let mut map = MapBuilder::single_face("wall", 64.0);
        map.nodes[0].children[0] = -3;
        let err = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::IndexOutOfRange {
                what: "leaf",
                index: 2,
                count: 2,
            }
        );
    }

    #[test]
    fn test_load_misaligned_lump() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.trailing_bytes = vec![(LumpId::Faces, 3)];
        let err = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::MisalignedLump {
                lump: LumpId::Faces,
                length: 23,
                record_size: 20,
            }
        );
    }

    #[test]
    fn test_load_hulls() {
        let map = MapBuilder::single_face("wall", 64.0);
        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();

        match bsp.hulls()[0].nodes {
            HullNodes::Owned(ref nodes) => assert_eq!(
                nodes[0].children,
                [
                    ClipChild::Contents(BspLeafContents::Empty),
                    ClipChild::Contents(BspLeafContents::Solid),
                ]
            ),
            ref other => panic!("hull 0 should own its nodes, got {:?}", other),
        }

        let hull2 = bsp.hull_view(2, 0).unwrap();
        assert_eq!(hull2.nodes().len(), 1);
        assert_eq!(hull2.max(), Vector3::new(32.0, 32.0, 64.0));
        assert!(bsp.hull_view(3, 0).is_none());

        // the face lies in the plane z = 0 with its normal pointing up
        assert_eq!(
            hull2.contents_at_point(Vector3::new(8.0, 8.0, 16.0)),
            BspLeafContents::Empty
        );
        assert_eq!(
            hull2.contents_at_point(Vector3::new(8.0, 8.0, -16.0)),
            BspLeafContents::Solid
        );
    }

    #[test]
    fn test_find_leaf_and_vis() {
        let map = MapBuilder::single_face("wall", 64.0);
        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();

        assert_eq!(bsp.find_leaf(Vector3::new(1.0, 1.0, 1.0)), 1);
        assert_eq!(bsp.find_leaf(Vector3::new(1.0, 1.0, -1.0)), 0);

        assert_eq!(bsp.decompress_vis(1, 1), vec![0x01]);

        // no visibility data: everything is visible
        assert_eq!(bsp.decompress_vis(0, 9), vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_queries_terminate_on_cyclic_trees() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        let node = map.nodes[0];
        map.nodes = vec![
            DiskNode {
                children: [1, -2],
                ..node
            },
            DiskNode {
                children: [0, -1],
                ..node
            },
        ];
        map.clip_nodes = vec![
            DiskClipNode {
                plane_id: 0,
                children: [1, -1],
            },
            DiskClipNode {
                plane_id: 0,
                children: [0, -2],
            },
        ];

        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();

        // both descents take the front child forever
        let above = Vector3::new(1.0, 1.0, 1.0);
        assert_eq!(bsp.find_leaf(above), 0);
        assert_eq!(
            bsp.hull_view(1, 0).unwrap().contents_at_point(above),
            BspLeafContents::Solid
        );
        assert_eq!(
            bsp.hull_view(0, 0).unwrap().contents_at_point(above),
            BspLeafContents::Solid
        );

        // the back side still resolves
        let below = Vector3::new(1.0, 1.0, -1.0);
        assert_eq!(bsp.find_leaf(below), 1);
        assert_eq!(
            bsp.hull_view(1, 0).unwrap().contents_at_point(below),
            BspLeafContents::Empty
        );
    }

    #[test]
    fn test_decompress_vis_runs() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        // two visible bytes, a run of three zero bytes, then one more
        map.visibility = vec![0x81, 0x02, 0x00, 0x03, 0x40];

        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();
        assert_eq!(
            bsp.decompress_vis(1, 48),
            vec![0x81, 0x02, 0x00, 0x00, 0x00, 0x40]
        );
    }

    #[test]
    fn test_texture_frame_for_time() {
        let mut map = MapBuilder::single_face("+0lava", 64.0);
        map.add_texture("+1lava", 16, 16);

        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();
        assert_eq!(bsp.texture_frame_for_time(0, Duration::milliseconds(100)), 0);
        assert_eq!(bsp.texture_frame_for_time(0, Duration::milliseconds(300)), 1);
        assert_eq!(bsp.texture_frame_for_time(0, Duration::milliseconds(450)), 0);
        assert_eq!(bsp.texture_frame_for_time(1, Duration::milliseconds(300)), 1);
    }

    #[test]
    fn test_gen_dot_graph() {
        let map = MapBuilder::single_face("wall", 64.0);
        let bsp = load_map(&map, &mut MockArchives::default(), &mut HeadlessBackend::new())
            .unwrap();

        let dot = bsp.gen_dot_graph();
        assert!(dot.starts_with("digraph bsp {"));
        assert!(dot.contains("n0 -> l1"));
        assert!(dot.contains("n0 -> l0"));
        assert!(dot.ends_with('}'));
    }

    #[test]
    fn test_load_brush_model_registers_submodels() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.duplicate_model();

        let mut registry = ModelRegistry::new();
        let mut archives = MockArchives::default();
        let mut backend = HeadlessBackend::new();
        let mut ctx = LoadContext::new(&mut archives, &mut backend);

        let data = map.build();
        let world = load_brush_model(&mut registry, "maps/test.bsp", &data, &mut ctx).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find("maps/test.bsp"), Some(world));

        let sub = registry.find("*1").unwrap();
        let brush = registry.get(sub).brush().unwrap();
        assert_eq!(brush.submodel_id(), 1);
        assert_eq!(brush.min(), Vector3::new(-1.0, -1.0, -1.0));
        assert_eq!(brush.max(), Vector3::new(65.0, 65.0, 1.0));
        assert_eq!(brush.surfaces().len(), 1);

        let world_model = registry.get(world).brush().unwrap();
        assert!(Rc::ptr_eq(world_model.bsp_data(), brush.bsp_data()));
        assert_eq!(world_model.leaf_count(), 1);
        assert_eq!(world_model.hull_range(0).last_node, 0);

        // already loaded: the data is not decoded again
        let again = load_brush_model(&mut registry, "maps/test.bsp", &[], &mut ctx).unwrap();
        assert_eq!(again, world);
    }

    #[test]
    fn test_failed_load_leaves_slot_unloaded() {
        let mut map = MapBuilder::single_face("wall", 64.0);
        map.version = 29;

        let mut registry = ModelRegistry::new();
        let mut archives = MockArchives::default();
        let mut backend = HeadlessBackend::new();
        let mut ctx = LoadContext::new(&mut archives, &mut backend);

        assert!(load_brush_model(&mut registry, "bad", &map.build(), &mut ctx).is_err());

        let handle = registry.find("bad").unwrap();
        assert!(!registry.get(handle).is_loaded());
        registry.get_mut(handle).clear();
    }
}
