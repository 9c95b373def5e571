use crate::common::bsp::lump::LumpId;
use failure::{Backtrace, Context, Fail};
use std::{
    convert::From,
    fmt::{self, Display},
    io,
};

#[derive(Debug)]
pub struct BspError {
    inner: Context<BspErrorKind>,
}

impl BspError {
    pub fn kind(&self) -> &BspErrorKind {
        self.inner.get_context()
    }
}

impl From<BspErrorKind> for BspError {
    fn from(kind: BspErrorKind) -> Self {
        BspError {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<BspErrorKind>> for BspError {
    fn from(inner: Context<BspErrorKind>) -> Self {
        BspError { inner }
    }
}

impl From<io::Error> for BspError {
    fn from(io_error: io::Error) -> Self {
        io_error.context(BspErrorKind::Io).into()
    }
}

impl Fail for BspError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for BspError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum BspErrorKind {
    #[fail(display = "I/O error while reading map data")]
    Io,
    #[fail(display = "Bad version number (found {}, should be {})", found, expected)]
    VersionMismatch { found: i32, expected: i32 },
    #[fail(
        display = "Lump {:?} (offset {}, length {}) lies outside the file",
        lump, offset, length
    )]
    LumpOutOfBounds {
        lump: LumpId,
        offset: i32,
        length: i32,
    },
    #[fail(
        display = "Lump {:?} has length {}, not a multiple of record size {}",
        lump, length, record_size
    )]
    MisalignedLump {
        lump: LumpId,
        length: usize,
        record_size: usize,
    },
    #[fail(display = "Lump {:?} holds {} records (max {})", lump, count, max)]
    LumpTooLarge {
        lump: LumpId,
        count: usize,
        max: usize,
    },
    #[fail(display = "{} index {} out of range (count {})", what, index, count)]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        count: usize,
    },
    #[fail(display = "Surface {} has extents {} on a non-special texture", surface, extents)]
    ExtentsTooLarge { surface: usize, extents: i32 },
    #[fail(display = "Required lump {:?} is empty", lump)]
    MissingRequiredLump { lump: LumpId },
    #[fail(display = "Entity text has no texture archive list")]
    MissingArchiveList,
    #[fail(display = "Texture {} not found in any archive", name)]
    TextureNotFound { name: String },
    #[fail(display = "Invalid texture {}: {}", name, reason)]
    InvalidTexture { name: String, reason: String },
    #[fail(display = "Invalid contents value {}", value)]
    InvalidContents { value: i32 },
    #[fail(display = "Polygon with {} vertices exceeds subdivision limit", count)]
    SubdivisionOverflow { count: usize },
    #[fail(display = "No room left in lightmap atlas")]
    LightmapAtlasFull,
    #[fail(display = "Model registry is full ({} models)", capacity)]
    RegistryFull { capacity: usize },
    #[fail(display = "Model name is empty")]
    EmptyModelName,
}

/// Builds an `IndexOutOfRange` error for `index` into an array of `count` elements.
pub fn out_of_range(what: &'static str, index: i64, count: usize) -> BspError {
    BspErrorKind::IndexOutOfRange { what, index, count }.into()
}
