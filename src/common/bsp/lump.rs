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

//! Map header decoding and on-disk record types.
//!
//! Every multi-byte value in a map file is little-endian. Records are decoded field by field
//! with `byteorder`, which converts each value to host order as it is read and leaves byte and
//! character arrays untouched. The input buffer itself is never modified.

use std::io::{self, Cursor};

use crate::common::{
    bsp::error::{BspError, BspErrorKind},
    util,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use strum::IntoEnumIterator;

/// The only supported map version.
pub const VERSION: i32 = 30;

pub const LUMP_COUNT: usize = 15;

/// Size of the file header: the version followed by an (offset, length) pair for every lump.
pub const HEADER_SIZE: usize = 4 + LUMP_COUNT * 8;

pub const MAX_MAP_HULLS: usize = 4;
pub const MAX_LIGHTMAPS: usize = 4;
pub const NUM_AMBIENTS: usize = 4;
pub const MIPLEVELS: usize = 4;

pub const MAX_MAP_MODELS: usize = 400;
pub const MAX_MAP_PLANES: usize = 32767;
pub const MAX_MAP_NODES: usize = 32767;
pub const MAX_MAP_CLIPNODES: usize = 32767;
pub const MAX_MAP_LEAFS: usize = 8192;
pub const MAX_MAP_VERTS: usize = 65535;
pub const MAX_MAP_FACES: usize = 65535;
pub const MAX_MAP_MARKSURFACES: usize = 65535;
pub const MAX_MAP_TEXINFO: usize = 8192;
pub const MAX_MAP_EDGES: usize = 256000;
pub const MAX_MAP_SURFEDGES: usize = 512000;
pub const MAX_MAP_TEXTURES: usize = 512;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, FromPrimitive, EnumIter)]
pub enum LumpId {
    Entities = 0,
    Planes = 1,
    Textures = 2,
    Vertices = 3,
    Visibility = 4,
    Nodes = 5,
    TexInfo = 6,
    Faces = 7,
    Lighting = 8,
    ClipNodes = 9,
    Leaves = 10,
    MarkSurfaces = 11,
    Edges = 12,
    SurfEdges = 13,
    Models = 14,
}

/// A byte range within the map file.
///
/// The offset is relative to the start of the file, not to any other lump.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Lump {
    pub offset: usize,
    pub size: usize,
}

#[derive(Clone, Debug)]
pub struct Header {
    lumps: [Lump; LUMP_COUNT],
}

impl Header {
    /// Decodes the header at the start of `data`.
    ///
    /// The version is checked before any lump descriptor is read, and every lump range is
    /// checked against the length of `data`.
    pub fn read(data: &[u8]) -> Result<Header, BspError> {
        let mut reader = Cursor::new(data);

        let version = reader.read_i32::<LittleEndian>()?;
        if version != VERSION {
            return Err(BspErrorKind::VersionMismatch {
                found: version,
                expected: VERSION,
            }
            .into());
        }

        let mut lumps = [Lump::default(); LUMP_COUNT];
        for id in LumpId::iter() {
            let offset = reader.read_i32::<LittleEndian>()?;
            let length = reader.read_i32::<LittleEndian>()?;

            let in_bounds = offset >= 0
                && length >= 0
                && (offset as usize)
                    .checked_add(length as usize)
                    .map_or(false, |end| end <= data.len());
            if !in_bounds {
                return Err(BspErrorKind::LumpOutOfBounds {
                    lump: id,
                    offset,
                    length,
                }
                .into());
            }

            debug!(
                "{: <14} Offset = 0x{:>08x} | Size = 0x{:>08x}",
                format!("{:?}", id),
                offset,
                length
            );

            lumps[id as usize] = Lump {
                offset: offset as usize,
                size: length as usize,
            };
        }

        Ok(Header { lumps })
    }

    pub fn lump(&self, id: LumpId) -> Lump {
        self.lumps[id as usize]
    }

    /// Returns the bytes of lump `id` within the file buffer `data`.
    pub fn lump_data<'a>(&self, data: &'a [u8], id: LumpId) -> &'a [u8] {
        let lump = self.lump(id);
        &data[lump.offset..lump.offset + lump.size]
    }

    /// Writes a header describing `lumps` with the given version.
    pub fn write<W>(writer: &mut W, version: i32, lumps: &[Lump; LUMP_COUNT]) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_i32::<LittleEndian>(version)?;
        for lump in lumps.iter() {
            writer.write_i32::<LittleEndian>(lump.offset as i32)?;
            writer.write_i32::<LittleEndian>(lump.size as i32)?;
        }
        Ok(())
    }
}

/// A fixed-size on-disk record stored in its own lump.
pub trait Record: Sized {
    /// Size of one record on disk, in bytes.
    const SIZE: usize;

    /// The lump holding records of this type.
    const LUMP: LumpId;

    /// The largest number of records the format allows in the lump.
    const MAX: usize;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt;

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt;
}

/// Decodes every record in the lump for `T`.
///
/// Fails with `MisalignedLump` if the lump length is not an exact multiple of `T::SIZE`.
pub fn read_records<T>(header: &Header, data: &[u8]) -> Result<Vec<T>, BspError>
where
    T: Record,
{
    let mut bytes = header.lump_data(data, T::LUMP);

    if bytes.len() % T::SIZE != 0 {
        return Err(BspErrorKind::MisalignedLump {
            lump: T::LUMP,
            length: bytes.len(),
            record_size: T::SIZE,
        }
        .into());
    }

    let count = bytes.len() / T::SIZE;
    if count > T::MAX {
        return Err(BspErrorKind::LumpTooLarge {
            lump: T::LUMP,
            count,
            max: T::MAX,
        }
        .into());
    }

    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(T::read(&mut bytes)?);
    }

    Ok(records)
}

fn read_f32_3<R>(reader: &mut R) -> io::Result<[f32; 3]>
where
    R: ReadBytesExt,
{
    let mut v = [0.0; 3];
    reader.read_f32_into::<LittleEndian>(&mut v)?;
    Ok(v)
}

fn write_f32_3<W>(writer: &mut W, v: &[f32; 3]) -> io::Result<()>
where
    W: WriteBytesExt,
{
    for c in v.iter() {
        writer.write_f32::<LittleEndian>(*c)?;
    }
    Ok(())
}

fn read_i16_3<R>(reader: &mut R) -> io::Result<[i16; 3]>
where
    R: ReadBytesExt,
{
    let mut v = [0; 3];
    reader.read_i16_into::<LittleEndian>(&mut v)?;
    Ok(v)
}

fn write_i16_3<W>(writer: &mut W, v: &[i16; 3]) -> io::Result<()>
where
    W: WriteBytesExt,
{
    for c in v.iter() {
        writer.write_i16::<LittleEndian>(*c)?;
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DiskPlane {
    pub normal: [f32; 3],
    pub dist: f32,
    pub kind: i32,
}

impl Record for DiskPlane {
    const SIZE: usize = 20;
    const LUMP: LumpId = LumpId::Planes;
    const MAX: usize = MAX_MAP_PLANES;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        Ok(DiskPlane {
            normal: read_f32_3(reader)?,
            dist: reader.read_f32::<LittleEndian>()?,
            kind: reader.read_i32::<LittleEndian>()?,
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        write_f32_3(writer, &self.normal)?;
        writer.write_f32::<LittleEndian>(self.dist)?;
        writer.write_i32::<LittleEndian>(self.kind)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DiskVertex {
    pub position: [f32; 3],
}

impl Record for DiskVertex {
    const SIZE: usize = 12;
    const LUMP: LumpId = LumpId::Vertices;
    const MAX: usize = MAX_MAP_VERTS;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        Ok(DiskVertex {
            position: read_f32_3(reader)?,
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        write_f32_3(writer, &self.position)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskEdge {
    pub vertices: [u16; 2],
}

impl Record for DiskEdge {
    const SIZE: usize = 4;
    const LUMP: LumpId = LumpId::Edges;
    const MAX: usize = MAX_MAP_EDGES;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        Ok(DiskEdge {
            vertices: [
                reader.read_u16::<LittleEndian>()?,
                reader.read_u16::<LittleEndian>()?,
            ],
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_u16::<LittleEndian>(self.vertices[0])?;
        writer.write_u16::<LittleEndian>(self.vertices[1])
    }
}

/// A signed edge index. The sign gives the direction the edge is walked in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskSurfEdge(pub i32);

impl Record for DiskSurfEdge {
    const SIZE: usize = 4;
    const LUMP: LumpId = LumpId::SurfEdges;
    const MAX: usize = MAX_MAP_SURFEDGES;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        Ok(DiskSurfEdge(reader.read_i32::<LittleEndian>()?))
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_i32::<LittleEndian>(self.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskFace {
    pub plane_id: i16,
    pub side: i16,
    pub first_edge: i32,
    pub edge_count: i16,
    pub texinfo_id: i16,
    pub light_styles: [u8; MAX_LIGHTMAPS],
    pub light_offset: i32,
}

impl Record for DiskFace {
    const SIZE: usize = 20;
    const LUMP: LumpId = LumpId::Faces;
    const MAX: usize = MAX_MAP_FACES;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        let plane_id = reader.read_i16::<LittleEndian>()?;
        let side = reader.read_i16::<LittleEndian>()?;
        let first_edge = reader.read_i32::<LittleEndian>()?;
        let edge_count = reader.read_i16::<LittleEndian>()?;
        let texinfo_id = reader.read_i16::<LittleEndian>()?;
        let mut light_styles = [0; MAX_LIGHTMAPS];
        reader.read_exact(&mut light_styles)?;
        let light_offset = reader.read_i32::<LittleEndian>()?;

        Ok(DiskFace {
            plane_id,
            side,
            first_edge,
            edge_count,
            texinfo_id,
            light_styles,
            light_offset,
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_i16::<LittleEndian>(self.plane_id)?;
        writer.write_i16::<LittleEndian>(self.side)?;
        writer.write_i32::<LittleEndian>(self.first_edge)?;
        writer.write_i16::<LittleEndian>(self.edge_count)?;
        writer.write_i16::<LittleEndian>(self.texinfo_id)?;
        writer.write_all(&self.light_styles)?;
        writer.write_i32::<LittleEndian>(self.light_offset)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskLeaf {
    pub contents: i32,
    pub vis_offset: i32,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_mark_surface: u16,
    pub mark_surface_count: u16,
    pub ambient_levels: [u8; NUM_AMBIENTS],
}

impl Record for DiskLeaf {
    const SIZE: usize = 28;
    const LUMP: LumpId = LumpId::Leaves;
    const MAX: usize = MAX_MAP_LEAFS;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        let contents = reader.read_i32::<LittleEndian>()?;
        let vis_offset = reader.read_i32::<LittleEndian>()?;
        let mins = read_i16_3(reader)?;
        let maxs = read_i16_3(reader)?;
        let first_mark_surface = reader.read_u16::<LittleEndian>()?;
        let mark_surface_count = reader.read_u16::<LittleEndian>()?;
        let mut ambient_levels = [0; NUM_AMBIENTS];
        reader.read_exact(&mut ambient_levels)?;

        Ok(DiskLeaf {
            contents,
            vis_offset,
            mins,
            maxs,
            first_mark_surface,
            mark_surface_count,
            ambient_levels,
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_i32::<LittleEndian>(self.contents)?;
        writer.write_i32::<LittleEndian>(self.vis_offset)?;
        write_i16_3(writer, &self.mins)?;
        write_i16_3(writer, &self.maxs)?;
        writer.write_u16::<LittleEndian>(self.first_mark_surface)?;
        writer.write_u16::<LittleEndian>(self.mark_surface_count)?;
        writer.write_all(&self.ambient_levels)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskNode {
    pub plane_id: i32,
    pub children: [i16; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_face: u16,
    pub face_count: u16,
}

impl Record for DiskNode {
    const SIZE: usize = 24;
    const LUMP: LumpId = LumpId::Nodes;
    const MAX: usize = MAX_MAP_NODES;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        Ok(DiskNode {
            plane_id: reader.read_i32::<LittleEndian>()?,
            children: [
                reader.read_i16::<LittleEndian>()?,
                reader.read_i16::<LittleEndian>()?,
            ],
            mins: read_i16_3(reader)?,
            maxs: read_i16_3(reader)?,
            first_face: reader.read_u16::<LittleEndian>()?,
            face_count: reader.read_u16::<LittleEndian>()?,
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_i32::<LittleEndian>(self.plane_id)?;
        writer.write_i16::<LittleEndian>(self.children[0])?;
        writer.write_i16::<LittleEndian>(self.children[1])?;
        write_i16_3(writer, &self.mins)?;
        write_i16_3(writer, &self.maxs)?;
        writer.write_u16::<LittleEndian>(self.first_face)?;
        writer.write_u16::<LittleEndian>(self.face_count)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskClipNode {
    pub plane_id: i32,
    pub children: [i16; 2],
}

impl Record for DiskClipNode {
    const SIZE: usize = 8;
    const LUMP: LumpId = LumpId::ClipNodes;
    const MAX: usize = MAX_MAP_CLIPNODES;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        Ok(DiskClipNode {
            plane_id: reader.read_i32::<LittleEndian>()?,
            children: [
                reader.read_i16::<LittleEndian>()?,
                reader.read_i16::<LittleEndian>()?,
            ],
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_i32::<LittleEndian>(self.plane_id)?;
        writer.write_i16::<LittleEndian>(self.children[0])?;
        writer.write_i16::<LittleEndian>(self.children[1])
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DiskTexInfo {
    /// `[s, t]` axes, each as `[x, y, z, offset]`.
    pub vecs: [[f32; 4]; 2],
    pub texture_id: i32,
    pub flags: i32,
}

impl Record for DiskTexInfo {
    const SIZE: usize = 40;
    const LUMP: LumpId = LumpId::TexInfo;
    const MAX: usize = MAX_MAP_TEXINFO;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        let mut vecs = [[0.0; 4]; 2];
        for v in vecs.iter_mut() {
            reader.read_f32_into::<LittleEndian>(v)?;
        }

        Ok(DiskTexInfo {
            vecs,
            texture_id: reader.read_i32::<LittleEndian>()?,
            flags: reader.read_i32::<LittleEndian>()?,
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        for v in self.vecs.iter() {
            for c in v.iter() {
                writer.write_f32::<LittleEndian>(*c)?;
            }
        }
        writer.write_i32::<LittleEndian>(self.texture_id)?;
        writer.write_i32::<LittleEndian>(self.flags)
    }
}

/// A surface index in a leaf's visible surface list.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DiskMarkSurface(pub u16);

impl Record for DiskMarkSurface {
    const SIZE: usize = 2;
    const LUMP: LumpId = LumpId::MarkSurfaces;
    const MAX: usize = MAX_MAP_MARKSURFACES;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        Ok(DiskMarkSurface(reader.read_u16::<LittleEndian>()?))
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_u16::<LittleEndian>(self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DiskModel {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub origin: [f32; 3],
    pub head_nodes: [i32; MAX_MAP_HULLS],
    pub vis_leaf_count: i32,
    pub first_face: i32,
    pub face_count: i32,
}

impl Record for DiskModel {
    const SIZE: usize = 64;
    const LUMP: LumpId = LumpId::Models;
    const MAX: usize = MAX_MAP_MODELS;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt,
    {
        let mins = read_f32_3(reader)?;
        let maxs = read_f32_3(reader)?;
        let origin = read_f32_3(reader)?;
        let mut head_nodes = [0; MAX_MAP_HULLS];
        reader.read_i32_into::<LittleEndian>(&mut head_nodes)?;

        Ok(DiskModel {
            mins,
            maxs,
            origin,
            head_nodes,
            vis_leaf_count: reader.read_i32::<LittleEndian>()?,
            first_face: reader.read_i32::<LittleEndian>()?,
            face_count: reader.read_i32::<LittleEndian>()?,
        })
    }

    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        write_f32_3(writer, &self.mins)?;
        write_f32_3(writer, &self.maxs)?;
        write_f32_3(writer, &self.origin)?;
        for h in self.head_nodes.iter() {
            writer.write_i32::<LittleEndian>(*h)?;
        }
        writer.write_i32::<LittleEndian>(self.vis_leaf_count)?;
        writer.write_i32::<LittleEndian>(self.first_face)?;
        writer.write_i32::<LittleEndian>(self.face_count)
    }
}

/// The header of a texture lump: a count followed by that many record offsets.
///
/// Offsets are relative to the start of the lump; `-1` marks an absent texture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TextureDirectory {
    pub offsets: Vec<i32>,
}

impl TextureDirectory {
    /// Decodes the texture count, then uses it to size the offset table.
    pub fn read(lump: &[u8]) -> Result<TextureDirectory, BspError> {
        let mut reader = lump;
        let count = reader.read_i32::<LittleEndian>()?;

        if count < 0 || count as usize > MAX_MAP_TEXTURES {
            return Err(BspErrorKind::LumpTooLarge {
                lump: LumpId::Textures,
                count: count.max(0) as usize,
                max: MAX_MAP_TEXTURES,
            }
            .into());
        }

        let mut offsets = vec![0; count as usize];
        reader.read_i32_into::<LittleEndian>(&mut offsets)?;

        Ok(TextureDirectory { offsets })
    }

    pub fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: WriteBytesExt,
    {
        writer.write_i32::<LittleEndian>(self.offsets.len() as i32)?;
        for ofs in self.offsets.iter() {
            writer.write_i32::<LittleEndian>(*ofs)?;
        }
        Ok(())
    }
}

/// Reads a zero-padded texture name field.
pub fn read_texture_name<R>(reader: &mut R) -> io::Result<String>
where
    R: ReadBytesExt,
{
    util::read_fixed_name(reader, util::NAME_LEN)
}
