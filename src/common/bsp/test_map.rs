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

//! Hand-built map data for tests.

use byteorder::{LittleEndian, WriteBytesExt};
use strum::IntoEnumIterator;

use crate::{
    client::render::TextureHandle,
    common::{
        bsp::{
            lump::{
                DiskClipNode, DiskEdge, DiskFace, DiskLeaf, DiskModel, DiskNode, DiskPlane,
                DiskTexInfo, DiskVertex, Header, Lump, LumpId, Record, TextureDirectory,
                HEADER_SIZE, LUMP_COUNT,
            },
            BspTexture, Surface, SurfaceFlags, VERSION,
        },
        wad::{test_util, TextureArchives, WadError},
    },
};

pub fn bare_surface() -> Surface {
    Surface {
        plane_id: 0,
        flags: SurfaceFlags::empty(),
        first_edge: 0,
        edge_count: 0,
        texinfo_id: 0,
        texture_mins: [0; 2],
        extents: [0; 2],
        light_styles: [0, 255, 255, 255],
        light_offset: None,
        lightmap: None,
        polys: None,
    }
}

pub fn bare_texture(name: &str, width: u32, height: u32) -> BspTexture {
    let mut mipmaps: [Box<[u8]>; 4] = Default::default();
    for (level, mip) in mipmaps.iter_mut().enumerate() {
        *mip = vec![0; ((width >> level) * (height >> level)) as usize].into_boxed_slice();
    }

    BspTexture {
        name: name.to_owned(),
        width,
        height,
        mipmaps,
        palette: None,
        animation: None,
        handle: TextureHandle::new(0),
    }
}

/// Lays out a texture lump: the directory followed by each present record.
pub fn texture_lump(records: &[Option<Vec<u8>>]) -> Vec<u8> {
    let mut offsets = Vec::with_capacity(records.len());
    let mut ofs = 4 + 4 * records.len();
    for record in records.iter() {
        match record {
            Some(r) => {
                offsets.push(ofs as i32);
                ofs += r.len();
            }
            None => offsets.push(-1),
        }
    }

    let mut lump = Vec::new();
    TextureDirectory { offsets }.write(&mut lump).unwrap();
    for record in records.iter().flatten() {
        lump.extend_from_slice(record);
    }

    lump
}

/// In-memory texture archives that record which archives were requested.
#[derive(Debug, Default)]
pub struct MockArchives {
    pub added: Vec<String>,
    pub records: Vec<(String, Vec<u8>)>,
}

impl TextureArchives for MockArchives {
    fn add_archive(&mut self, name: &str) -> Result<(), WadError> {
        self.added.push(name.to_owned());
        Ok(())
    }

    fn find_miptex(&self, name: &str) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, r)| r.as_slice())
    }
}

/// The contents of every lump of a map, written out by `build`.
#[derive(Clone, Debug)]
pub struct MapBuilder {
    pub version: i32,
    pub entities: String,
    pub planes: Vec<DiskPlane>,
    pub textures: Vec<Option<Vec<u8>>>,
    pub vertices: Vec<DiskVertex>,
    pub visibility: Vec<u8>,
    pub nodes: Vec<DiskNode>,
    pub texinfo: Vec<DiskTexInfo>,
    pub faces: Vec<DiskFace>,
    pub lighting: Vec<u8>,
    pub clip_nodes: Vec<DiskClipNode>,
    pub leaves: Vec<DiskLeaf>,
    pub mark_surfaces: Vec<u16>,
    pub edges: Vec<DiskEdge>,
    pub surf_edges: Vec<i32>,
    pub models: Vec<DiskModel>,

    /// Extra zero bytes appended to the given lumps.
    pub trailing_bytes: Vec<(LumpId, usize)>,
}

impl MapBuilder {
    pub fn new() -> MapBuilder {
        MapBuilder {
            version: VERSION,
            entities: "{\n\"classname\" \"worldspawn\"\n}\n".to_owned(),
            planes: Vec::new(),
            textures: Vec::new(),
            vertices: Vec::new(),
            visibility: Vec::new(),
            nodes: Vec::new(),
            texinfo: Vec::new(),
            faces: Vec::new(),
            lighting: Vec::new(),
            clip_nodes: Vec::new(),
            leaves: Vec::new(),
            mark_surfaces: Vec::new(),
            edges: Vec::new(),
            surf_edges: Vec::new(),
            models: Vec::new(),
            trailing_bytes: Vec::new(),
        }
    }

    /// A map holding one `size`-unit square face in the plane z = 0, facing up.
    ///
    /// Node 0 splits on that plane: leaf 1 (empty) is in front and leaf 0 (solid) behind. The
    /// face uses texture 0, named `texture_name`, and is marked by leaf 1.
    pub fn single_face(texture_name: &str, size: f32) -> MapBuilder {
        let mut map = MapBuilder::new();

        map.vertices = vec![
            DiskVertex {
                position: [0.0, 0.0, 0.0],
            },
            DiskVertex {
                position: [size, 0.0, 0.0],
            },
            DiskVertex {
                position: [size, size, 0.0],
            },
            DiskVertex {
                position: [0.0, size, 0.0],
            },
        ];

        // edge 0 is never referenced
        map.edges = [[0, 0], [0, 1], [1, 2], [2, 3], [3, 0]]
            .iter()
            .map(|v| DiskEdge { vertices: *v })
            .collect();
        map.surf_edges = vec![1, 2, 3, 4];

        map.planes = vec![DiskPlane {
            normal: [0.0, 0.0, 1.0],
            dist: 0.0,
            kind: 2,
        }];

        map.add_texture(texture_name, 16, 16);
        map.texinfo = vec![DiskTexInfo {
            vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
            texture_id: 0,
            flags: 0,
        }];

        map.faces = vec![DiskFace {
            plane_id: 0,
            side: 0,
            first_edge: 0,
            edge_count: 4,
            texinfo_id: 0,
            light_styles: [0, 255, 255, 255],
            light_offset: 0,
        }];
        map.lighting = vec![0x80; 5 * 5 * 3];

        map.leaves = vec![
            DiskLeaf {
                contents: -2,
                vis_offset: -1,
                mins: [0; 3],
                maxs: [0; 3],
                first_mark_surface: 0,
                mark_surface_count: 0,
                ambient_levels: [0; 4],
            },
            DiskLeaf {
                contents: -1,
                vis_offset: 0,
                mins: [0, 0, 0],
                maxs: [size as i16, size as i16, 0],
                first_mark_surface: 0,
                mark_surface_count: 1,
                ambient_levels: [0; 4],
            },
        ];
        map.mark_surfaces = vec![0];
        map.visibility = vec![0x01];

        map.nodes = vec![DiskNode {
            plane_id: 0,
            children: [-2, -1],
            mins: [0, 0, 0],
            maxs: [size as i16, size as i16, 0],
            first_face: 0,
            face_count: 1,
        }];
        map.clip_nodes = vec![DiskClipNode {
            plane_id: 0,
            children: [-1, -2],
        }];

        map.models = vec![DiskModel {
            mins: [0.0, 0.0, 0.0],
            maxs: [size, size, 0.0],
            origin: [0.0; 3],
            head_nodes: [0; 4],
            vis_leaf_count: 1,
            first_face: 0,
            face_count: 1,
        }];

        map
    }

    /// Appends an embedded texture record.
    pub fn add_texture(&mut self, name: &str, width: u32, height: u32) {
        self.textures
            .push(Some(test_util::build_miptex(name, width, height, 1, true)));
    }

    /// Replaces texture 0 with a record that must be resolved from an archive.
    pub fn make_texture_external(&mut self) {
        self.textures[0] = Some(test_util::build_external_miptex("wall", 16, 16));
    }

    /// Inserts a vertex halfway along the first edge of face 0.
    pub fn split_first_edge(&mut self) {
        let a = self.vertices[0].position;
        let b = self.vertices[1].position;
        let mid = self.vertices.len() as u16;
        self.vertices.push(DiskVertex {
            position: [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0, (a[2] + b[2]) / 2.0],
        });

        let [start, end] = self.edges[1].vertices;
        self.edges[1].vertices = [start, mid];
        self.edges.push(DiskEdge {
            vertices: [mid, end],
        });

        let new_edge = self.edges.len() as i32 - 1;
        self.surf_edges.insert(1, new_edge);
        self.faces[0].edge_count += 1;
    }

    /// Adds a sub-model identical to model 0.
    pub fn duplicate_model(&mut self) {
        let model = self.models[0];
        self.models.push(model);
    }

    fn records<T>(records: &[T]) -> Vec<u8>
    where
        T: Record,
    {
        let mut data = Vec::new();
        for r in records.iter() {
            r.write(&mut data).unwrap();
        }
        data
    }

    fn lump_bytes(&self, id: LumpId) -> Vec<u8> {
        let mut data = match id {
            LumpId::Entities => {
                let mut text = self.entities.clone().into_bytes();
                text.push(0);
                text
            }
            LumpId::Planes => Self::records(&self.planes),
            LumpId::Textures if self.textures.is_empty() => Vec::new(),
            LumpId::Textures => texture_lump(&self.textures),
            LumpId::Vertices => Self::records(&self.vertices),
            LumpId::Visibility => self.visibility.clone(),
            LumpId::Nodes => Self::records(&self.nodes),
            LumpId::TexInfo => Self::records(&self.texinfo),
            LumpId::Faces => Self::records(&self.faces),
            LumpId::Lighting => self.lighting.clone(),
            LumpId::ClipNodes => Self::records(&self.clip_nodes),
            LumpId::Leaves => Self::records(&self.leaves),
            LumpId::MarkSurfaces => {
                let mut data = Vec::new();
                for m in self.mark_surfaces.iter() {
                    data.write_u16::<LittleEndian>(*m).unwrap();
                }
                data
            }
            LumpId::Edges => Self::records(&self.edges),
            LumpId::SurfEdges => {
                let mut data = Vec::new();
                for e in self.surf_edges.iter() {
                    data.write_i32::<LittleEndian>(*e).unwrap();
                }
                data
            }
            LumpId::Models => Self::records(&self.models),
        };

        for (_, count) in self.trailing_bytes.iter().filter(|(l, _)| *l == id) {
            data.extend(std::iter::repeat(0).take(*count));
        }

        data
    }

    /// Writes the header followed by every lump in lump order.
    pub fn build(&self) -> Vec<u8> {
        let mut lumps = [Lump::default(); LUMP_COUNT];
        let mut body = Vec::new();
        for id in LumpId::iter() {
            let bytes = self.lump_bytes(id);
            lumps[id as usize] = Lump {
                offset: HEADER_SIZE + body.len(),
                size: bytes.len(),
            };
            body.extend_from_slice(&bytes);

            // keep every lump 4-byte aligned
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }

        let mut data = Vec::with_capacity(HEADER_SIZE + body.len());
        Header::write(&mut data, self.version, &lumps).unwrap();
        data.extend_from_slice(&body);
        data
    }
}
