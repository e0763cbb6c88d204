//! KWZ frame metadata and tile decoding
//!
//! Each `KMI` entry describes one frame:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0x00 | 4 | flags: paper color, diff bits, six layer ink colors |
//! | 0x04 | 6 | byte size of layers A, B and C in `KMC` |
//! | 0x0A | 10 | author ID |
//! | 0x14 | 3 | layer depths |
//! | 0x17 | 1 | sound effect flags |
//! | 0x1A | 2 | camera flags |
//!
//! Layer pixel data is a bit-packed stream of 8x8 minitiles grouped into
//! 128x128 macrotiles, see [`decode_tiles`].

use super::bits::BitReader;
use super::meta::{format_fsid, FSID_SIZE};
use super::tables::{Line, LINE_COUNT, LINE_TABLES};
use super::{
    KwzDecoder, KMI_ENTRY_SIZE, KWZ_HEIGHT, KWZ_LAYER_COUNT, KWZ_PALETTE, KWZ_WIDTH,
    UNCHANGED_LAYER_SIZE,
};
use crate::common::ensure_input;
use crate::stream::ByteStream;
use crate::{FlipnoteError, Result};

/// Edge length of a macrotile
const MACROTILE_SIZE: usize = 128;

/// Edge length of a minitile
const MINITILE_SIZE: usize = 8;

/// Offset of the first frame's pixel data from the start of `KMC`
const KMC_DATA_OFFSET: usize = 12;

/// Mask selecting all three layers
pub const ALL_LAYERS: u8 = 0b111;

/// Which of `a` (0) or `b` (1) each row of a type 7 tile copies
const TILE_ROW_PATTERNS: [[u8; MINITILE_SIZE]; 4] = [
    [0, 1, 0, 1, 0, 1, 0, 1],
    [0, 0, 1, 0, 0, 1, 0, 0],
    [0, 1, 0, 0, 1, 0, 0, 1],
    [0, 1, 1, 0, 1, 1, 0, 1],
];

fn read_common_line(stream: &mut ByteStream, bits: &mut BitReader) -> Result<usize> {
    Ok(bits.read_bits(stream, 5)? as usize)
}

fn read_line(stream: &mut ByteStream, bits: &mut BitReader) -> Result<usize> {
    let index = bits.read_bits(stream, 13)? as usize;
    ensure_input!(index < LINE_COUNT, "line index {index} out of range");
    Ok(index)
}

#[inline]
fn put_row(pixels: &mut [u8], tile_offset: usize, row: usize, line: &Line) {
    let start = tile_offset + row * KWZ_WIDTH;
    pixels[start..start + MINITILE_SIZE].copy_from_slice(line);
}

/// Decode one layer's tile stream into `pixels`
///
/// Macrotiles are visited left to right, then top to bottom; minitiles
/// within a macrotile the same way. Minitiles falling outside the frame are
/// not coded. A skip run (type 5) leaves the covered minitiles untouched and
/// may carry over into the next macrotile.
pub fn decode_tiles(stream: &mut ByteStream, bits: &mut BitReader, pixels: &mut [u8]) -> Result<()> {
    let tables = &*LINE_TABLES;
    let mut skip = 0u32;

    for tile_y in (0..KWZ_HEIGHT).step_by(MACROTILE_SIZE) {
        for tile_x in (0..KWZ_WIDTH).step_by(MACROTILE_SIZE) {
            for sub_y in (0..MACROTILE_SIZE).step_by(MINITILE_SIZE) {
                let y = tile_y + sub_y;
                if y >= KWZ_HEIGHT {
                    break;
                }
                for sub_x in (0..MACROTILE_SIZE).step_by(MINITILE_SIZE) {
                    let x = tile_x + sub_x;
                    if x >= KWZ_WIDTH {
                        break;
                    }
                    if skip > 0 {
                        skip -= 1;
                        continue;
                    }

                    let offset = y * KWZ_WIDTH + x;
                    match bits.read_bits(stream, 3)? {
                        0 => {
                            let line = &tables.common[read_common_line(stream, bits)?];
                            for row in 0..MINITILE_SIZE {
                                put_row(pixels, offset, row, line);
                            }
                        }
                        1 => {
                            let line = &tables.lines[read_line(stream, bits)?];
                            for row in 0..MINITILE_SIZE {
                                put_row(pixels, offset, row, line);
                            }
                        }
                        2 => {
                            let index = read_common_line(stream, bits)?;
                            let (a, b) = (&tables.common[index], &tables.common_shifted[index]);
                            for row in 0..MINITILE_SIZE {
                                put_row(pixels, offset, row, if row % 2 == 0 { a } else { b });
                            }
                        }
                        3 => {
                            let index = read_line(stream, bits)?;
                            let (a, b) = (&tables.lines[index], &tables.shifted[index]);
                            for row in 0..MINITILE_SIZE {
                                put_row(pixels, offset, row, if row % 2 == 0 { a } else { b });
                            }
                        }
                        4 => {
                            let mask = bits.read_bits(stream, 8)?;
                            for row in 0..MINITILE_SIZE {
                                let line = if mask & (1 << row) != 0 {
                                    &tables.common[read_common_line(stream, bits)?]
                                } else {
                                    &tables.lines[read_line(stream, bits)?]
                                };
                                put_row(pixels, offset, row, line);
                            }
                        }
                        5 => {
                            skip = bits.read_bits(stream, 5)?;
                        }
                        7 => {
                            let mut pattern = bits.read_bits(stream, 2)? as usize;
                            let use_common = bits.read_bits(stream, 1)? == 1;
                            let (a, b) = if use_common {
                                pattern += 1;
                                (
                                    &tables.common[read_common_line(stream, bits)?],
                                    &tables.common[read_common_line(stream, bits)?],
                                )
                            } else {
                                (
                                    &tables.lines[read_line(stream, bits)?],
                                    &tables.lines[read_line(stream, bits)?],
                                )
                            };
                            for (row, &pick) in TILE_ROW_PATTERNS[pattern % 4].iter().enumerate() {
                                put_row(pixels, offset, row, if pick == 0 { a } else { b });
                            }
                        }
                        tile_type => {
                            return Err(FlipnoteError::MalformedInput(format!(
                                "invalid tile type {tile_type} at ({x}, {y})"
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

impl KwzDecoder {
    /// Build the per-frame metadata and pixel data offset tables from `KMI`
    pub(super) fn read_frame_offsets(&mut self) -> Result<()> {
        let kmi = self.sections.require(b"KMI")?;
        let kmc = self.sections.require(b"KMC")?;
        ensure_input!(
            self.frame_count * KMI_ENTRY_SIZE <= kmi.length,
            "KMI holds {} bytes, too short for {} frames",
            kmi.length,
            self.frame_count
        );

        let mut meta_offset = kmi.payload_offset();
        let mut data_offset = kmc.offset + KMC_DATA_OFFSET;
        self.frame_meta_offsets = Vec::with_capacity(self.frame_count);
        self.frame_data_offsets = Vec::with_capacity(self.frame_count);
        self.frame_layer_sizes = Vec::with_capacity(self.frame_count);

        for _ in 0..self.frame_count {
            self.stream.seek_to(meta_offset + 4)?;
            let sizes = [
                self.stream.read_u16()? as usize,
                self.stream.read_u16()? as usize,
                self.stream.read_u16()? as usize,
            ];
            self.frame_meta_offsets.push(meta_offset);
            self.frame_data_offsets.push(data_offset);
            self.frame_layer_sizes.push(sizes);
            meta_offset += KMI_ENTRY_SIZE;
            data_offset += sizes.iter().sum::<usize>();
        }
        ensure_input!(
            data_offset <= kmc.end(),
            "frame data ends at {data_offset:#x}, past the end of KMC at {:#x}",
            kmc.end()
        );
        Ok(())
    }

    fn frame_meta(&self, index: usize) -> Result<&[u8]> {
        self.check_frame_index(index)?;
        self.stream
            .slice(self.frame_meta_offsets[index], KMI_ENTRY_SIZE)
    }

    fn frame_flags(&self, index: usize) -> Result<u32> {
        let meta = self.frame_meta(index)?;
        Ok(u32::from_le_bytes([meta[0], meta[1], meta[2], meta[3]]))
    }

    /// Raw diff bits of frame `index`; a set bit means that layer is coded
    /// from scratch instead of on top of the previous frame
    pub fn frame_diffing_flag(&self, index: usize) -> Result<u8> {
        Ok(((self.frame_flags(index)? >> 4) & 0x7) as u8)
    }

    /// Stored byte size of each layer
    pub fn frame_layer_sizes(&self, index: usize) -> Result<[usize; KWZ_LAYER_COUNT]> {
        self.check_frame_index(index)?;
        Ok(self.frame_layer_sizes[index])
    }

    /// Depth of each layer; deeper layers are drawn first
    pub fn frame_layer_depths(&self, index: usize) -> Result<[u8; KWZ_LAYER_COUNT]> {
        let meta = self.frame_meta(index)?;
        Ok([meta[0x14], meta[0x15], meta[0x16]])
    }

    /// Author ID of whoever drew frame `index`
    pub fn frame_author(&self, index: usize) -> Result<String> {
        let meta = self.frame_meta(index)?;
        Ok(format_fsid(
            &meta[0xA..0xA + FSID_SIZE],
            self.is_dsi_library_note,
        ))
    }

    /// Which of SE1..SE4 start on frame `index`
    pub fn frame_sound_effect_flags(&self, index: usize) -> Result<[bool; 4]> {
        let flags = self.frame_meta(index)?[0x17];
        Ok(std::array::from_fn(|se| flags & (1 << se) != 0))
    }

    /// Camera layer flags of frame `index`
    pub fn frame_camera_flags(&self, index: usize) -> Result<[bool; 3]> {
        let flags = self.frame_meta(index)?[0x1A];
        Ok(std::array::from_fn(|layer| flags & (1 << layer) != 0))
    }

    /// Indices into [`KWZ_PALETTE`]: paper, then two ink colors per layer
    pub fn frame_palette_indices(&self, index: usize) -> Result<Vec<usize>> {
        let flags = self.frame_flags(index)?;
        let indices = vec![
            (flags & 0xF) as usize,
            ((flags >> 8) & 0xF) as usize,
            ((flags >> 12) & 0xF) as usize,
            ((flags >> 16) & 0xF) as usize,
            ((flags >> 20) & 0xF) as usize,
            ((flags >> 24) & 0xF) as usize,
            ((flags >> 28) & 0xF) as usize,
        ];
        if let Some(&bad) = indices.iter().find(|&&i| i >= KWZ_PALETTE.len()) {
            return Err(FlipnoteError::MalformedInput(format!(
                "frame {index} uses palette index {bad}"
            )));
        }
        Ok(indices)
    }

    /// Back-to-front draw order: `[2, 1, 0]` stably sorted by descending depth
    pub fn frame_layer_order(&self, index: usize) -> Result<Vec<usize>> {
        let depths = self.frame_layer_depths(index)?;
        let mut order = vec![2, 1, 0];
        order.sort_by(|&a, &b| depths[b].cmp(&depths[a]));
        Ok(order)
    }

    /// Layers of frame `index` coded without reference to the previous frame
    fn independent_layers(&self, index: usize) -> Result<u8> {
        if index == 0 {
            return Ok(ALL_LAYERS);
        }
        let diff = self.frame_diffing_flag(index)?;
        let sizes = self.frame_layer_sizes[index];
        let mut mask = 0;
        for (layer, &size) in sizes.iter().enumerate() {
            if diff & (1 << layer) != 0 && size != UNCHANGED_LAYER_SIZE {
                mask |= 1 << layer;
            }
        }
        Ok(mask)
    }

    /// Decode frame `index` and return the three layer bitmaps (values 0, 1 or 2)
    ///
    /// Only the layers a frame actually depends on are replayed when jumping
    /// backward: walking back from `index`, each earlier frame is decoded for
    /// the layers that every later frame in the chain still needs.
    pub fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]> {
        self.check_frame_index(index)?;
        if self.last_decoded == Some(index) {
            return Ok(&self.layers);
        }

        let plan = self.frame_decode_plan(index)?;
        if let (Some(first), Some(last)) = (plan.first(), plan.last()) {
            log::trace!("KWZ: decoding frames {}..={}", first.0, last.0);
        }

        self.last_decoded = None;
        for &(frame, mask) in &plan {
            self.decode_layers(frame, mask)?;
        }
        self.last_decoded = Some(index);
        Ok(&self.layers)
    }

    /// Frames and layer masks that decoding frame `index` would replay, oldest first
    ///
    /// Starts from the most recently decoded frame when it directly precedes
    /// `index`. Layer C is left out of the walk for DSi Library notes, which
    /// never decode it.
    pub fn frame_decode_plan(&self, index: usize) -> Result<Vec<(usize, u8)>> {
        self.check_frame_index(index)?;
        let wanted = if self.is_dsi_library_note {
            ALL_LAYERS & !(1 << 2)
        } else {
            ALL_LAYERS
        };

        let mut plan = vec![(index, wanted)];
        let mut frame = index;
        let mut mask = wanted;
        while frame > 0 && self.last_decoded != Some(frame - 1) {
            mask &= !self.independent_layers(frame)?;
            if mask == 0 {
                break;
            }
            frame -= 1;
            plan.push((frame, mask));
        }
        plan.reverse();
        Ok(plan)
    }

    fn decode_layers(&mut self, index: usize, mask: u8) -> Result<()> {
        let sizes = self.frame_layer_sizes[index];
        let independent = self.independent_layers(index)?;
        let mut offset = self.frame_data_offsets[index];

        for (layer, &size) in sizes.iter().enumerate() {
            let start = offset;
            offset += size;
            // converted DSi notes only ever use two layers
            if self.is_dsi_library_note && layer == 2 {
                continue;
            }
            if mask & (1 << layer) == 0 {
                continue;
            }
            if independent & (1 << layer) != 0 {
                self.layers[layer].fill(0);
            }
            if size == UNCHANGED_LAYER_SIZE {
                continue;
            }
            self.stream.seek_to(start)?;
            self.bits.reset();
            decode_tiles(&mut self.stream, &mut self.bits, &mut self.layers[layer])?;
        }
        Ok(())
    }
}
