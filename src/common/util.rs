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

use std::io::{self, Read, Write};

/// The length of the fixed-size name fields used by texture records and archive directories.
pub const NAME_LEN: usize = 16;

/// Read a fixed-length, zero-padded name and convert it into a `String`.
///
/// All `len` bytes are consumed. The name ends at the first zero byte; anything after it is
/// padding and is discarded.
pub fn read_fixed_name<R>(src: &mut R, len: usize) -> io::Result<String>
where
    R: Read,
{
    let mut bytes = vec![0; len];
    src.read_exact(&mut bytes)?;

    if let Some(nul) = bytes.iter().position(|b| *b == 0) {
        bytes.truncate(nul);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write `name` as a fixed-length, zero-padded field.
///
/// Names longer than `len - 1` bytes are truncated so the field always holds a terminator.
pub fn write_fixed_name<W>(dst: &mut W, name: &str, len: usize) -> io::Result<()>
where
    W: Write,
{
    let mut bytes = vec![0; len];
    let count = name.len().min(len - 1);
    bytes[..count].copy_from_slice(&name.as_bytes()[..count]);
    dst.write_all(&bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn test_read_fixed_name_stops_at_nul() {
        let mut src = Cursor::new(b"sky\0garbage\0\0\0\0\0tail".to_vec());
        assert_eq!(read_fixed_name(&mut src, NAME_LEN).unwrap(), "sky");
        assert_eq!(src.position(), NAME_LEN as u64);
    }

    #[test]
    fn test_write_fixed_name_truncates() {
        let mut dst = Vec::new();
        write_fixed_name(&mut dst, "a_very_long_texture_name", NAME_LEN).unwrap();
        assert_eq!(dst.len(), NAME_LEN);
        assert_eq!(dst[NAME_LEN - 1], 0);

        let name = read_fixed_name(&mut Cursor::new(dst), NAME_LEN).unwrap();
        assert_eq!(name, "a_very_long_tex");
    }
}
