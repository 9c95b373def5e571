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

//! Texture archives (WAD2 and WAD3 files).
//!
//! An archive is a flat directory of named lumps. Maps that do not embed their textures list the
//! archives they use in the `wad` key of the worldspawn entity; those archives are resolved
//! through the [`TextureArchives`] trait while the texture lump is decoded.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader, Cursor, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use crate::common::util;

use byteorder::{LittleEndian, ReadBytesExt};
use num_traits::FromPrimitive;

const LUMPINFO_SIZE: usize = 32;
const MAGIC_WAD2: u32 = 'W' as u32 | ('A' as u32) << 8 | ('D' as u32) << 16 | ('2' as u32) << 24;
const MAGIC_WAD3: u32 = 'W' as u32 | ('A' as u32) << 8 | ('D' as u32) << 16 | ('3' as u32) << 24;

/// Size of a texture record header: name, width, height and four mip offsets.
pub const MIPTEX_HEADER_SIZE: usize = 40;

/// Number of entries in a texture palette.
pub const PALETTE_ENTRIES: usize = 256;

#[derive(Debug, Fail)]
pub enum WadError {
    #[fail(display = "I/O error: {}", _0)]
    Io(#[cause] io::Error),
    #[fail(display = "Bad magic number for WAD: 0x{:08x}", _0)]
    BadMagic(u32),
    #[fail(display = "Lump {} is compressed", _0)]
    Compressed(String),
    #[fail(display = "Invalid lump {}: {}", name, reason)]
    InvalidLump { name: String, reason: &'static str },
}

impl From<io::Error> for WadError {
    fn from(error: io::Error) -> Self {
        WadError::Io(error)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WadVersion {
    Wad2,
    Wad3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
pub enum WadLumpKind {
    Palette = 64,
    ColorMap = 65,
    QPic = 66,
    MipTex = 67,
    Raw = 68,
    ColorMap2 = 69,
    Font = 70,
}

struct LumpInfo {
    offset: u32,
    disk_size: u32,
    kind: u8,
    compression: u8,
    name: String,
}

#[derive(Debug)]
pub struct WadLump {
    kind: Option<WadLumpKind>,
    data: Box<[u8]>,
}

impl WadLump {
    /// The lump type, or `None` if the type byte is not recognized.
    pub fn kind(&self) -> Option<WadLumpKind> {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Archive lump names are stored and compared in upper case.
fn clean_name(name: &str) -> String {
    name.to_ascii_uppercase()
}

#[derive(Debug)]
pub struct Wad {
    version: WadVersion,
    lumps: HashMap<String, WadLump>,
}

impl Wad {
    pub fn load<R>(data: R) -> Result<Wad, WadError>
    where
        R: Read + Seek,
    {
        let mut reader = BufReader::new(data);

        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let version = match reader.read_u32::<LittleEndian>()? {
            MAGIC_WAD2 => WadVersion::Wad2,
            MAGIC_WAD3 => WadVersion::Wad3,
            m => return Err(WadError::BadMagic(m)),
        };

        let lump_count = reader.read_u32::<LittleEndian>()?;
        let lumpinfo_ofs = reader.read_u32::<LittleEndian>()?;

        if lumpinfo_ofs as u64 + lump_count as u64 * LUMPINFO_SIZE as u64 > file_len {
            return Err(WadError::InvalidLump {
                name: String::from("<directory>"),
                reason: "lump directory extends past end of file",
            });
        }

        reader.seek(SeekFrom::Start(lumpinfo_ofs as u64))?;

        let mut lump_infos = Vec::with_capacity(lump_count as usize);
        for _ in 0..lump_count {
            let offset = reader.read_u32::<LittleEndian>()?;
            let disk_size = reader.read_u32::<LittleEndian>()?;
            let _size = reader.read_u32::<LittleEndian>()?;
            let kind = reader.read_u8()?;
            let compression = reader.read_u8()?;
            let _pad = reader.read_u16::<LittleEndian>()?;
            let name = clean_name(&util::read_fixed_name(&mut reader, util::NAME_LEN)?);

            lump_infos.push(LumpInfo {
                offset,
                disk_size,
                kind,
                compression,
                name,
            });
        }

        let mut lumps = HashMap::with_capacity(lump_infos.len());
        for info in lump_infos {
            if info.compression != 0 {
                return Err(WadError::Compressed(info.name));
            }

            if info.offset as u64 + info.disk_size as u64 > file_len {
                return Err(WadError::InvalidLump {
                    name: info.name,
                    reason: "lump extends past end of file",
                });
            }

            let mut data = Vec::with_capacity(info.disk_size as usize);
            reader.seek(SeekFrom::Start(info.offset as u64))?;
            (&mut reader)
                .take(info.disk_size as u64)
                .read_to_end(&mut data)?;

            let kind = WadLumpKind::from_u8(info.kind);
            if kind.is_none() {
                debug!("Unknown lump type {} for {}", info.kind, info.name);
            }

            lumps.insert(
                info.name,
                WadLump {
                    kind,
                    data: data.into_boxed_slice(),
                },
            );
        }

        Ok(Wad { version, lumps })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Wad, WadError> {
        Wad::load(Cursor::new(bytes))
    }

    pub fn version(&self) -> WadVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.lumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lumps.is_empty()
    }

    /// Looks up a lump by name, ignoring case.
    pub fn lump<S>(&self, name: S) -> Option<&WadLump>
    where
        S: AsRef<str>,
    {
        self.lumps.get(&clean_name(name.as_ref()))
    }

    /// Looks up a texture record by name, ignoring case.
    pub fn miptex<S>(&self, name: S) -> Option<&[u8]>
    where
        S: AsRef<str>,
    {
        self.lump(name)
            .filter(|l| l.kind == Some(WadLumpKind::MipTex))
            .map(|l| l.data())
    }
}

/// The fixed-size header at the start of every texture record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MipTexHeader {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Offsets of the four mip levels, relative to the start of the record.
    pub offsets: [u32; 4],
}

impl MipTexHeader {
    pub fn read<R>(reader: &mut R) -> io::Result<MipTexHeader>
    where
        R: Read,
    {
        let name = util::read_fixed_name(reader, util::NAME_LEN)?;
        let width = reader.read_u32::<LittleEndian>()?;
        let height = reader.read_u32::<LittleEndian>()?;
        let mut offsets = [0; 4];
        reader.read_u32_into::<LittleEndian>(&mut offsets)?;

        Ok(MipTexHeader {
            name,
            width,
            height,
            offsets,
        })
    }

    /// A record with no pixel data; the texture must be looked up in an archive by name.
    pub fn is_external(&self) -> bool {
        self.offsets.iter().all(|o| *o == 0)
    }
}

/// A decoded, palette-indexed texture with four mip levels.
#[derive(Clone, Debug)]
pub struct MipTex {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub mipmaps: [Box<[u8]>; 4],

    /// 256 RGB triplets, absent in records that rely on a global palette.
    pub palette: Option<Box<[u8]>>,
}

impl MipTex {
    /// Decodes a texture record with embedded pixel data.
    ///
    /// The palette follows the smallest mip level and is prefixed by a 16-bit entry count.
    pub fn decode(record: &[u8]) -> Result<MipTex, WadError> {
        let header = MipTexHeader::read(&mut Cursor::new(record))?;
        let invalid = |reason| WadError::InvalidLump {
            name: header.name.clone(),
            reason,
        };

        if header.width == 0 || header.height == 0 {
            return Err(invalid("zero-sized texture"));
        }

        if header.is_external() {
            return Err(invalid("record has no pixel data"));
        }

        let pixels = (header.width as usize)
            .checked_mul(header.height as usize)
            .filter(|p| *p <= record.len())
            .ok_or_else(|| invalid("dimensions exceed record size"))?;

        let mut mipmaps: [Box<[u8]>; 4] = Default::default();
        for (level, mip) in mipmaps.iter_mut().enumerate() {
            let start = header.offsets[level] as usize;
            let len = (header.width as usize >> level) * (header.height as usize >> level);
            let mip_data = start
                .checked_add(len)
                .and_then(|end| record.get(start..end))
                .ok_or_else(|| invalid("mip level extends past end of record"))?;
            *mip = mip_data.to_vec().into_boxed_slice();
        }

        let palette_ofs = header.offsets[0] as usize + pixels / 64 * 85;
        let palette = match record.get(palette_ofs..palette_ofs + 2) {
            None => None,
            Some(mut count_bytes) => {
                let count = count_bytes.read_i16::<LittleEndian>()?;
                if count as usize != PALETTE_ENTRIES {
                    warn!("Texture {} has {} palette entries", header.name, count);
                }

                let start = palette_ofs + 2;
                match record.get(start..start + PALETTE_ENTRIES * 3) {
                    Some(p) => Some(p.to_vec().into_boxed_slice()),
                    None => {
                        warn!("Texture {} has a truncated palette", header.name);
                        None
                    }
                }
            }
        };

        Ok(MipTex {
            name: header.name.clone(),
            width: header.width,
            height: header.height,
            mipmaps,
            palette,
        })
    }
}

/// A set of texture archives that texture records can be resolved against.
pub trait TextureArchives {
    /// Makes the archive `name` (no directory, no extension) available for lookups.
    ///
    /// Adding an archive that is already present does nothing.
    fn add_archive(&mut self, name: &str) -> Result<(), WadError>;

    /// Returns the raw texture record `name` from the first archive that contains it.
    fn find_miptex(&self, name: &str) -> Option<&[u8]>;
}

/// Texture archives loaded from `<base_dir>/<name>.wad`, searched in the order they were added.
pub struct WadSet {
    base_dir: PathBuf,
    archives: Vec<(String, Wad)>,
}

impl WadSet {
    pub fn new<P>(base_dir: P) -> WadSet
    where
        P: AsRef<Path>,
    {
        WadSet {
            base_dir: base_dir.as_ref().to_owned(),
            archives: Vec::new(),
        }
    }

    /// Adds an already-loaded archive under `name`.
    pub fn insert<S>(&mut self, name: S, wad: Wad)
    where
        S: AsRef<str>,
    {
        let name = name.as_ref().to_ascii_lowercase();
        if !self.contains(&name) {
            self.archives.push((name, wad));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archives
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.archives.iter().map(|(n, _)| n.as_str())
    }
}

impl TextureArchives for WadSet {
    fn add_archive(&mut self, name: &str) -> Result<(), WadError> {
        if self.contains(name) {
            return Ok(());
        }

        let path = self.base_dir.join(format!("{}.wad", name));
        let wad = Wad::load(File::open(&path)?)?;
        info!(
            "Loaded texture archive {} ({} lumps)",
            path.display(),
            wad.len()
        );
        self.insert(name, wad);

        Ok(())
    }

    fn find_miptex(&self, name: &str) -> Option<&[u8]> {
        self.archives.iter().find_map(|(_, wad)| wad.miptex(name))
    }
}
