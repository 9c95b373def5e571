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

use crate::common::wad::PALETTE_ENTRIES;

/// Largest texture dimension produced by [`Palette::translate_resampled`].
pub const MAX_TEXTURE_DIMS: u32 = 512;

pub struct Palette {
    rgba: [[u8; 4]; PALETTE_ENTRIES],
}

impl Palette {
    /// Builds a palette from 256 RGB triplets. Every entry is fully opaque.
    pub fn new(data: &[u8]) -> Option<Palette> {
        if data.len() < PALETTE_ENTRIES * 3 {
            return None;
        }

        let mut rgba = [[0; 4]; PALETTE_ENTRIES];
        for (color, entry) in rgba.iter_mut().enumerate() {
            for component in 0..3 {
                entry[component] = data[color * 3 + component];
            }
            entry[3] = 0xFF;
        }

        Some(Palette { rgba })
    }

    /// A grey ramp, used for textures that carry no palette of their own.
    pub fn grayscale() -> Palette {
        let mut rgba = [[0; 4]; PALETTE_ENTRIES];
        for (color, entry) in rgba.iter_mut().enumerate() {
            *entry = [color as u8, color as u8, color as u8, 0xFF];
        }

        Palette { rgba }
    }

    pub fn rgba(&self, index: u8) -> [u8; 4] {
        self.rgba[index as usize]
    }

    /// Translates a `width` by `height` image of indices into RGBA.
    ///
    /// The result is resampled to power-of-two dimensions no larger than `MAX_TEXTURE_DIMS`,
    /// each output pixel averaging four samples of the source. Returns the output dimensions
    /// along with the pixels.
    pub fn translate_resampled(
        &self,
        indices: &[u8],
        width: u32,
        height: u32,
    ) -> (u32, u32, Vec<u8>) {
        let (out_width, out_height) = power_of_two_dims(width, height);

        let x_scale = width as f32 / out_width as f32;
        let y_scale = height as f32 / out_height as f32;

        let sample_cols = |i: u32| {
            (
                ((i as f32 + 0.25) * x_scale) as usize,
                ((i as f32 + 0.75) * x_scale) as usize,
            )
        };
        let sample_rows = |i: u32| {
            (
                ((i as f32 + 0.25) * y_scale) as usize * width as usize,
                ((i as f32 + 0.75) * y_scale) as usize * width as usize,
            )
        };

        let mut out = Vec::with_capacity((out_width * out_height * 4) as usize);
        for i in 0..out_height {
            let (row1, row2) = sample_rows(i);
            for j in 0..out_width {
                let (col1, col2) = sample_cols(j);

                let samples = [
                    self.rgba(indices[row1 + col1]),
                    self.rgba(indices[row1 + col2]),
                    self.rgba(indices[row2 + col1]),
                    self.rgba(indices[row2 + col2]),
                ];

                for c in 0..4 {
                    let sum: u32 = samples.iter().map(|s| s[c] as u32).sum();
                    out.push((sum >> 2) as u8);
                }
            }
        }

        (out_width, out_height, out)
    }
}

/// Rounds each dimension up to a power of two, clamped to `MAX_TEXTURE_DIMS`.
pub fn power_of_two_dims(width: u32, height: u32) -> (u32, u32) {
    (
        width.next_power_of_two().min(MAX_TEXTURE_DIMS),
        height.next_power_of_two().min(MAX_TEXTURE_DIMS),
    )
}
