//! PPM frame decoding
//!
//! Each frame starts with a header byte: bit 7 marks a keyframe, bits 5-6
//! flag a whole-frame translation, bits 1-4 hold the two layer pen colors and
//! bit 0 the paper color. Two tables of 192 two-bit line codes follow, then
//! the line data for both layers.

use super::{PpmDecoder, PPM_HEIGHT, PPM_LAYER_COUNT, PPM_WIDTH};
use crate::stream::ByteStream;
use crate::Result;

/// Number of line-encoding bytes per layer (four 2-bit codes each)
pub(crate) const LINE_TABLE_BYTES: usize = PPM_HEIGHT / 4;

/// Fixed back-to-front draw order: layer 2 sits below layer 1
pub(crate) const PPM_LAYER_ORDER: [usize; PPM_LAYER_COUNT] = [1, 0];

/// How a single line of a layer is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEncoding {
    /// Line is blank
    Skip,
    /// 32-bit chunk mask, set chunks carry one byte of pixels
    Coded,
    /// As `Coded`, but the line starts filled with ink
    InvertedCoded,
    /// One byte per 8 pixels, no mask
    Raw,
}

impl LineEncoding {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => LineEncoding::Skip,
            1 => LineEncoding::Coded,
            2 => LineEncoding::InvertedCoded,
            _ => LineEncoding::Raw,
        }
    }
}

/// Unpack one layer's 192 line codes, four per byte, low bits first
fn read_line_encodings(stream: &mut ByteStream) -> Result<[LineEncoding; PPM_HEIGHT]> {
    let mut encodings = [LineEncoding::Skip; PPM_HEIGHT];
    let bytes = stream.read_bytes(LINE_TABLE_BYTES)?;
    for (chunk, &byte) in encodings.chunks_exact_mut(4).zip(bytes) {
        if byte == 0 {
            continue;
        }
        for (shift, encoding) in chunk.iter_mut().enumerate() {
            *encoding = LineEncoding::from_bits(byte >> (shift * 2));
        }
    }
    Ok(encodings)
}

/// Write 8 pixels from `chunk`, least significant bit first
#[inline]
fn unpack_chunk(chunk: u8, out: &mut [u8]) {
    for (bit, pixel) in out.iter_mut().enumerate() {
        *pixel = (chunk >> bit) & 0x1;
    }
}

/// Decode one layer's lines into `bitmap`, which must already be blank
fn decode_layer(
    stream: &mut ByteStream,
    encodings: &[LineEncoding; PPM_HEIGHT],
    bitmap: &mut [u8],
) -> Result<()> {
    for (line, row) in bitmap.chunks_exact_mut(PPM_WIDTH).enumerate() {
        match encodings[line] {
            LineEncoding::Skip => {}
            encoding @ (LineEncoding::Coded | LineEncoding::InvertedCoded) => {
                let mut line_header = stream.read_u32_be()?;
                if encoding == LineEncoding::InvertedCoded {
                    row.fill(1);
                }
                let mut x = 0;
                while line_header != 0 {
                    if line_header & 0x8000_0000 != 0 {
                        let chunk = stream.read_u8()?;
                        unpack_chunk(chunk, &mut row[x..x + 8]);
                    }
                    x += 8;
                    line_header <<= 1;
                }
            }
            LineEncoding::Raw => {
                let chunks = stream.read_bytes(PPM_WIDTH / 8)?;
                for (&chunk, out) in chunks.iter().zip(row.chunks_exact_mut(8)) {
                    unpack_chunk(chunk, out);
                }
            }
        }
    }
    Ok(())
}

/// XOR `layer` with `prev` shifted by `(dx, dy)`; pixels whose source lies
/// outside the previous frame keep their decoded value
fn merge_translated(layer: &mut [u8], prev: &[u8], dx: i32, dy: i32) {
    for y in 0..PPM_HEIGHT as i32 {
        let src_y = y - dy;
        if !(0..PPM_HEIGHT as i32).contains(&src_y) {
            continue;
        }
        for x in 0..PPM_WIDTH as i32 {
            let src_x = x - dx;
            if !(0..PPM_WIDTH as i32).contains(&src_x) {
                continue;
            }
            let dst = (y as usize) * PPM_WIDTH + x as usize;
            let src = (src_y as usize) * PPM_WIDTH + src_x as usize;
            layer[dst] ^= prev[src];
        }
    }
}

impl PpmDecoder {
    fn frame_header(&self, index: usize) -> Result<u8> {
        self.check_frame_index(index)?;
        Ok(self.stream.slice(self.frame_offsets[index], 1)?[0])
    }

    /// Whether frame `index` is fully specified rather than a diff
    pub fn is_key_frame(&self, index: usize) -> Result<bool> {
        Ok(self.frame_header(index)? & 0x80 != 0)
    }

    /// Palette indices into [`PPM_PALETTE`](super::PPM_PALETTE): paper, layer 1 pen, layer 2 pen
    pub fn frame_palette_indices(&self, index: usize) -> Result<Vec<usize>> {
        let header = self.frame_header(index)?;
        let inverted = header & 0x1 != 1;
        let paper = if inverted { 1 } else { 0 };
        let pens = [1 - paper, 1 - paper, 2, 3];
        Ok(vec![
            paper,
            pens[((header >> 1) & 0x3) as usize],
            pens[((header >> 3) & 0x3) as usize],
        ])
    }

    /// Back-to-front draw order; the same for every frame
    pub fn frame_layer_order(&self, index: usize) -> Result<Vec<usize>> {
        self.check_frame_index(index)?;
        Ok(PPM_LAYER_ORDER.to_vec())
    }

    /// Decode frame `index` and return both layer bitmaps (values 0 or 1)
    ///
    /// Sequential calls are O(1) per frame. Jumping to a diff frame replays
    /// from the nearest earlier keyframe.
    pub fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]> {
        self.check_frame_index(index)?;
        if self.last_decoded == Some(index) {
            return Ok(&self.layers);
        }

        let mut start = index;
        while start > 0 && self.last_decoded != Some(start - 1) && !self.is_key_frame(start)? {
            start -= 1;
        }
        log::trace!("PPM: decoding frames {start}..={index}");

        self.last_decoded = None;
        for frame in start..=index {
            self.decode_single_frame(frame)?;
        }
        self.last_decoded = Some(index);
        Ok(&self.layers)
    }

    /// Decode one frame on top of whatever the layer buffers currently hold
    fn decode_single_frame(&mut self, index: usize) -> Result<()> {
        std::mem::swap(&mut self.layers, &mut self.prev_layers);
        for layer in self.layers.iter_mut() {
            layer.fill(0);
        }

        self.stream.seek_to(self.frame_offsets[index])?;
        let header = self.stream.read_u8()?;
        let is_key_frame = header & 0x80 != 0 || index == 0;
        let is_translated = (header >> 5) & 0x3 != 0;
        let (dx, dy) = if is_translated {
            (
                self.stream.read_i8()? as i32,
                self.stream.read_i8()? as i32,
            )
        } else {
            (0, 0)
        };

        let encodings = [
            read_line_encodings(&mut self.stream)?,
            read_line_encodings(&mut self.stream)?,
        ];
        for (layer, encoding) in self.layers.iter_mut().zip(&encodings) {
            decode_layer(&mut self.stream, encoding, layer)?;
        }

        if !is_key_frame {
            for (layer, prev) in self.layers.iter_mut().zip(&self.prev_layers) {
                if dx == 0 && dy == 0 {
                    layer.iter_mut().zip(prev).for_each(|(p, q)| *p ^= q);
                } else {
                    merge_translated(layer, prev, dx, dy);
                }
            }
        }
        Ok(())
    }
}
