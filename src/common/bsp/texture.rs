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

//! Texture lump decoding, archive resolution and animation sequencing.

use std::io::Cursor;

use crate::{
    client::render::{Palette, RenderBackend},
    common::{
        bsp::{
            error::out_of_range,
            lump::{LumpId, TextureDirectory},
            BspError, BspErrorKind, BspTexture, BspTextureAnimation,
        },
        parse,
        wad::{MipTex, MipTexHeader, TextureArchives},
    },
};

use chrono::Duration;

const MAX_TEXTURE_FRAMES: usize = 10;
const TEXTURE_FRAME_LEN_MS: i64 = 200;

/// Name and size of the placeholder texture.
pub const MISSING_TEXTURE_NAME: &str = "notexture";
const MISSING_TEXTURE_SIZE: u32 = 16;

/// Decodes the texture lump.
///
/// Textures without embedded pixel data are resolved by name against the archives listed in the
/// `wad` key of the first entity. Archives that fail to load and textures that cannot be found
/// are logged and skipped; the corresponding slots are left empty.
pub fn load_textures(
    lump: &[u8],
    entities: &str,
    archives: &mut dyn TextureArchives,
    renderer: &mut dyn RenderBackend,
) -> Result<Vec<Option<BspTexture>>, BspError> {
    if lump.is_empty() {
        debug!("Map has no textures");
        return Ok(Vec::new());
    }

    let directory = TextureDirectory::read(lump)?;
    debug!("Texture count = {}", directory.offsets.len());

    let mut records = Vec::with_capacity(directory.offsets.len());
    for ofs in directory.offsets.iter() {
        let record = match *ofs {
            -1 => None,
            o if o < 0 || o as usize >= lump.len() => {
                return Err(out_of_range("texture offset", o as i64, lump.len()));
            }
            o => {
                let record = &lump[o as usize..];
                let header = MipTexHeader::read(&mut Cursor::new(record))?;

                if header.width % 16 != 0 || header.height % 16 != 0 {
                    return Err(BspErrorKind::InvalidTexture {
                        name: header.name.clone(),
                        reason: format!(
                            "dimensions {}x{} are not multiples of 16",
                            header.width, header.height
                        ),
                    }
                    .into());
                }

                Some((header, record))
            }
        };

        records.push(record);
    }

    if records.iter().flatten().any(|(h, _)| h.is_external()) {
        add_listed_archives(entities, archives)?;
    }

    let mut textures = Vec::with_capacity(records.len());
    for (id, record) in records.into_iter().enumerate() {
        let (header, record) = match record {
            Some(r) => r,
            None => {
                textures.push(None);
                continue;
            }
        };

        let record = if header.is_external() {
            match archives.find_miptex(&header.name) {
                Some(r) => r,
                None => {
                    warn!(
                        "{}",
                        BspErrorKind::TextureNotFound {
                            name: header.name.clone(),
                        }
                    );
                    textures.push(None);
                    continue;
                }
            }
        } else {
            record
        };

        let miptex = MipTex::decode(record).map_err(|e| BspErrorKind::InvalidTexture {
            name: header.name.clone(),
            reason: e.to_string(),
        })?;

        debug!(
            "Texture {:>3}: {} ({}x{})",
            id, miptex.name, miptex.width, miptex.height
        );
        textures.push(Some(upload(miptex, renderer)));
    }

    debug!("Sequencing textures");
    sequence_animations(&mut textures)?;

    Ok(textures)
}

fn add_listed_archives(
    entities: &str,
    archives: &mut dyn TextureArchives,
) -> Result<(), BspError> {
    if entities.trim_end_matches('\0').is_empty() {
        return Err(BspErrorKind::MissingRequiredLump {
            lump: LumpId::Entities,
        }
        .into());
    }

    let wad_list = match parse::first_entity_value(entities, "wad") {
        Some(w) => w,
        None => return Err(BspErrorKind::MissingArchiveList.into()),
    };

    for name in parse::archive_names(&wad_list) {
        if let Err(e) = archives.add_archive(&name) {
            warn!("Couldn't load texture archive {}: {}", name, e);
        }
    }

    Ok(())
}

fn upload(miptex: MipTex, renderer: &mut dyn RenderBackend) -> BspTexture {
    let palette = match miptex.palette.as_deref().and_then(Palette::new) {
        Some(p) => p,
        None => {
            warn!("Texture {} has no palette, using grayscale", miptex.name);
            Palette::grayscale()
        }
    };

    let (width, height, rgba) =
        palette.translate_resampled(&miptex.mipmaps[0], miptex.width, miptex.height);
    let handle = renderer.upload_texture(&miptex.name, width, height, &rgba);

    BspTexture {
        name: miptex.name,
        width: miptex.width,
        height: miptex.height,
        mipmaps: miptex.mipmaps,
        palette: miptex.palette,
        animation: None,
        handle,
    }
}

/// Builds and uploads the checkerboard placeholder used for unresolved textures.
pub fn missing_texture(renderer: &mut dyn RenderBackend) -> BspTexture {
    let mut mipmaps: [Box<[u8]>; 4] = Default::default();
    for (level, mip) in mipmaps.iter_mut().enumerate() {
        let size = MISSING_TEXTURE_SIZE >> level;
        let half = size / 2;
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                pixels.push(if (y < half) ^ (x < half) { 0 } else { 0xFF });
            }
        }
        *mip = pixels.into_boxed_slice();
    }

    let (width, height, rgba) = Palette::grayscale().translate_resampled(
        &mipmaps[0],
        MISSING_TEXTURE_SIZE,
        MISSING_TEXTURE_SIZE,
    );
    let handle = renderer.upload_texture(MISSING_TEXTURE_NAME, width, height, &rgba);

    BspTexture {
        name: MISSING_TEXTURE_NAME.to_owned(),
        width: MISSING_TEXTURE_SIZE,
        height: MISSING_TEXTURE_SIZE,
        mipmaps,
        palette: None,
        animation: None,
        handle,
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Frame {
    Primary(usize),
    Alternate(usize),
}

fn frame_of(name: &str) -> Result<Frame, BspError> {
    let invalid = || -> BspError {
        BspErrorKind::InvalidTexture {
            name: name.to_owned(),
            reason: "bad animating texture".to_owned(),
        }
        .into()
    };

    match name.chars().nth(1) {
        Some(c @ '0'..='9') => Ok(Frame::Primary(c as usize - '0' as usize)),
        Some(c @ 'A'..='J') => Ok(Frame::Alternate(c as usize - 'A' as usize)),
        Some(c @ 'a'..='j') => Ok(Frame::Alternate(c as usize - 'a' as usize)),
        _ => Err(invalid()),
    }
}

fn same_base(a: &str, b: &str) -> bool {
    match (a.get(2..), b.get(2..)) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Collects the frame slots `0..len` of one animation, failing on any gap.
fn collect_frames(
    base: &str,
    frames: &[Option<usize>; MAX_TEXTURE_FRAMES],
    len: usize,
) -> Result<Vec<usize>, BspError> {
    frames[..len]
        .iter()
        .enumerate()
        .map(|(i, f)| {
            f.ok_or_else(|| {
                BspErrorKind::InvalidTexture {
                    name: base.to_owned(),
                    reason: format!("missing frame {}", i),
                }
                .into()
            })
        })
        .collect()
}

/// Links the frames of every animated texture.
///
/// Frames are grouped by the name following the `+` and frame character. Each frame is given
/// its time window within the cycle, the index of the next frame, and the first frame of the
/// other animation of the same texture if there is one.
pub fn sequence_animations(textures: &mut [Option<BspTexture>]) -> Result<(), BspError> {
    for t in 0..textures.len() {
        let name = match textures[t] {
            Some(ref tex) if tex.name.starts_with('+') && tex.animation.is_none() => {
                tex.name.clone()
            }
            _ => continue,
        };

        debug!("Sequencing texture {}", name);

        let mut primary = [None; MAX_TEXTURE_FRAMES];
        let mut alternate = [None; MAX_TEXTURE_FRAMES];
        let mut primary_len = 0;
        let mut alternate_len = 0;

        for (t2, tex) in textures.iter().enumerate().skip(t) {
            let tex = match tex {
                Some(tex) if t2 == t => tex,
                Some(tex) if tex.name.starts_with('+') && same_base(&name, &tex.name) => tex,
                _ => continue,
            };

            match frame_of(&tex.name)? {
                Frame::Primary(n) => {
                    primary[n] = Some(t2);
                    primary_len = primary_len.max(n + 1);
                }
                Frame::Alternate(n) => {
                    alternate[n] = Some(t2);
                    alternate_len = alternate_len.max(n + 1);
                }
            }
        }

        let primary = collect_frames(&name, &primary, primary_len)?;
        let alternate = collect_frames(&name, &alternate, alternate_len)?;

        link_frames(textures, &primary, alternate.first().cloned());
        link_frames(textures, &alternate, primary.first().cloned());
    }

    Ok(())
}

fn link_frames(textures: &mut [Option<BspTexture>], frames: &[usize], alternate: Option<usize>) {
    let len = frames.len() as i64;
    for (frame, id) in frames.iter().enumerate() {
        if let Some(tex) = textures[*id].as_mut() {
            tex.animation = Some(BspTextureAnimation {
                sequence_duration: Duration::milliseconds(TEXTURE_FRAME_LEN_MS * len),
                time_start: Duration::milliseconds(TEXTURE_FRAME_LEN_MS * frame as i64),
                time_end: Duration::milliseconds(TEXTURE_FRAME_LEN_MS * (frame as i64 + 1)),
                next: frames[(frame + 1) % frames.len()],
                alternate,
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{
        client::render::HeadlessBackend,
        common::{
            bsp::{
                test_map::{self, MockArchives},
                BspTextureMipmap,
            },
            wad::{test_util, WadSet},
        },
    };

    fn load(
        records: &[Option<Vec<u8>>],
        entities: &str,
        archives: &mut dyn TextureArchives,
    ) -> Result<Vec<Option<BspTexture>>, BspError> {
        let lump = test_map::texture_lump(records);
        let mut backend = HeadlessBackend::new();
        load_textures(&lump, entities, archives, &mut backend)
    }

    #[test]
    fn test_embedded_textures() {
        let records = vec![
            Some(test_util::build_miptex("wall", 32, 16, 7, true)),
            None,
        ];

        let mut archives = MockArchives::default();
        let mut backend = HeadlessBackend::new();
        let textures =
            load_textures(&test_map::texture_lump(&records), "", &mut archives, &mut backend)
                .unwrap();

        assert_eq!(textures.len(), 2);
        let wall = textures[0].as_ref().unwrap();
        assert_eq!(wall.name(), "wall");
        assert_eq!(wall.dimensions(), (32, 16));
        assert_eq!(wall.palette().unwrap().len(), 768);
        assert!(textures[1].is_none());

        // embedded textures need no archives
        assert!(archives.added.is_empty());
        assert_eq!(backend.texture(wall.handle()).unwrap().name, "wall");
    }

    #[test]
    fn test_external_texture_resolved() {
        let records = vec![Some(test_util::build_external_miptex("BRICK", 16, 16))];
        let mut archives = MockArchives::default();
        archives
            .records
            .push(("brick".to_owned(), test_util::build_miptex("BRICK", 16, 16, 3, true)));

        let textures = load(
            &records,
            "{\n\"classname\" \"worldspawn\"\n\"wad\" \"\\half-life\\valve\\archive1.wad;archive2.wad\"\n}\n",
            &mut archives,
        )
        .unwrap();

        assert_eq!(archives.added, vec!["archive1", "archive2"]);

        let brick = textures[0].as_ref().unwrap();
        assert_eq!(brick.mipmap(BspTextureMipmap::Full)[0], 3);
    }

    #[test]
    fn test_external_texture_not_found() {
        let records = vec![Some(test_util::build_external_miptex("gone", 16, 16))];
        let mut archives = MockArchives::default();

        let textures = load(&records, "{\n\"wad\" \"archive1.wad\"\n}\n", &mut archives).unwrap();
        assert!(textures[0].is_none());
    }

    #[test]
    fn test_unloadable_archive_is_not_fatal() {
        let records = vec![Some(test_util::build_external_miptex("gone", 16, 16))];
        let mut archives = WadSet::new("/nonexistent/wad/dir");

        let textures = load(&records, "{\n\"wad\" \"missing.wad\"\n}\n", &mut archives).unwrap();
        assert!(textures[0].is_none());
        assert_eq!(archives.names().count(), 0);
    }

    #[test]
    fn test_archive_list_required() {
        let records = vec![Some(test_util::build_external_miptex("brick", 16, 16))];

        let err = load(&records, "", &mut MockArchives::default()).unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::MissingRequiredLump {
                lump: LumpId::Entities
            }
        );

        let err = load(
            &records,
            "{\n\"classname\" \"worldspawn\"\n}\n",
            &mut MockArchives::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), &BspErrorKind::MissingArchiveList);
    }

    #[test]
    fn test_unaligned_dimensions() {
        let records = vec![Some(test_util::build_miptex("odd", 24, 16, 0, true))];

        let err = load(&records, "", &mut MockArchives::default()).unwrap_err();
        match err.kind() {
            BspErrorKind::InvalidTexture { name, .. } => assert_eq!(name, "odd"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_bad_texture_offset() {
        let records = [Some(test_util::build_miptex("a", 16, 16, 0, true))];
        let mut lump = test_map::texture_lump(&records);
        let len = lump.len();
        // point the first offset past the end of the lump
        lump[4..8].copy_from_slice(&(len as i32 + 4).to_le_bytes());

        let mut backend = HeadlessBackend::new();
        let err =
            load_textures(&lump, "", &mut MockArchives::default(), &mut backend).unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::IndexOutOfRange {
                what: "texture offset",
                index: len as i64 + 4,
                count: len,
            }
        );
    }

    #[test]
    fn test_sequence_animations() {
        let records = vec![
            Some(test_util::build_miptex("+1lab", 16, 16, 1, true)),
            Some(test_util::build_miptex("+0lab", 16, 16, 0, true)),
            Some(test_util::build_miptex("+alab", 16, 16, 2, true)),
            Some(test_util::build_miptex("+0other", 16, 16, 0, true)),
        ];

        let textures = load(&records, "", &mut MockArchives::default()).unwrap();
        let anim = |i: usize| textures[i].as_ref().unwrap().animation().unwrap();

        assert_eq!(anim(1).next, 0);
        assert_eq!(anim(0).next, 1);
        assert_eq!(anim(1).time_start, Duration::zero());
        assert_eq!(anim(0).time_start, Duration::milliseconds(200));
        assert_eq!(anim(0).sequence_duration, Duration::milliseconds(400));
        assert_eq!(anim(0).alternate, Some(2));

        assert_eq!(anim(2).next, 2);
        assert_eq!(anim(2).alternate, Some(1));

        assert_eq!(anim(3).next, 3);
        assert_eq!(anim(3).alternate, None);
    }

    #[test]
    fn test_sequence_missing_frame() {
        let records = vec![
            Some(test_util::build_miptex("+0lab", 16, 16, 0, true)),
            Some(test_util::build_miptex("+2lab", 16, 16, 2, true)),
        ];

        let err = load(&records, "", &mut MockArchives::default()).unwrap_err();
        assert_eq!(
            err.kind(),
            &BspErrorKind::InvalidTexture {
                name: "+0lab".to_owned(),
                reason: "missing frame 1".to_owned(),
            }
        );
    }

    #[test]
    fn test_missing_texture_checkerboard() {
        let mut backend = HeadlessBackend::new();
        let tex = missing_texture(&mut backend);

        assert_eq!(tex.name(), MISSING_TEXTURE_NAME);
        assert_eq!(tex.dimensions(), (16, 16));
        let full = tex.mipmap(BspTextureMipmap::Full);
        assert_eq!(full[0], 0xFF);
        assert_eq!(full[8], 0);
        assert_eq!(full[8 * 16], 0);
        assert_eq!(full[8 * 16 + 8], 0xFF);
        assert_eq!(backend.textures().len(), 1);
    }
}
