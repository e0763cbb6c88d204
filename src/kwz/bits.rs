//! Sub-byte reads for the KWZ tile codec
//!
//! Tile data is consumed least significant bit first out of little-endian
//! 16-bit words.

use crate::stream::ByteStream;
use crate::Result;

/// `(1 << n) - 1` for `n` in `0..=16`
pub const BIT_MASKS: [u32; 17] = [
    0x0000, 0x0001, 0x0003, 0x0007, 0x000F, 0x001F, 0x003F, 0x007F, 0x00FF, 0x01FF, 0x03FF,
    0x07FF, 0x0FFF, 0x1FFF, 0x3FFF, 0x7FFF, 0xFFFF,
];

/// Bit accumulator over a [`ByteStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitReader {
    // 16 minus the number of buffered bits; negative while more than 16 are held
    bit_index: i32,
    bit_value: u32,
}

impl Default for BitReader {
    fn default() -> Self {
        Self::new()
    }
}

impl BitReader {
    /// A reader with no buffered bits
    pub fn new() -> Self {
        Self {
            bit_index: 16,
            bit_value: 0,
        }
    }

    /// Drop any buffered bits
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read `count` bits (`count <= 16`), refilling from `stream` as needed
    #[inline]
    pub fn read_bits(&mut self, stream: &mut ByteStream, count: u32) -> Result<u32> {
        debug_assert!(count <= 16);
        if self.bit_index + count as i32 > 16 {
            let next = stream.read_u16()? as u32;
            self.bit_value |= next << (16 - self.bit_index);
            self.bit_index -= 16;
        }
        let result = self.bit_value & BIT_MASKS[count as usize];
        self.bit_value >>= count;
        self.bit_index += count as i32;
        Ok(result)
    }
}
