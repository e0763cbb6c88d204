//! Precomputed KWZ line tables
//!
//! A KWZ tile row is 8 pixels, each a trit (0 = no ink, 1 or 2 = ink slot),
//! so there are `3^8 = 6561` possible rows. Rows are addressed by a 13-bit
//! index into [`LineTables::lines`], or by a 5-bit index into a 32-entry
//! subset of frequent rows. Each row also has a "shifted" twin, the same
//! trits rotated left by one pixel, used by the alternating tile types.

use lazy_static::lazy_static;

/// Number of distinct 8-pixel rows
pub const LINE_COUNT: usize = 6561;

/// Number of entries in the common-row tables
pub const COMMON_LINE_COUNT: usize = 32;

/// One decoded 8-pixel row
pub type Line = [u8; 8];

/// Indices into [`LineTables::lines`] of the 32 common rows
pub const COMMON_LINE_INDEX_TABLE: [u16; COMMON_LINE_COUNT] = [
    0x0000, 0x0CD0, 0x19A0, 0x02D9, 0x088B, 0x0051, 0x00F3, 0x0009, 0x001B, 0x0001, 0x0003,
    0x05B2, 0x1116, 0x00A2, 0x01E6, 0x0012, 0x0036, 0x0002, 0x0006, 0x0B64, 0x08DC, 0x0144,
    0x00FC, 0x0024, 0x001C, 0x0004, 0x0334, 0x099C, 0x0668, 0x1338, 0x1004, 0x166C,
];

/// Indices into [`LineTables::lines`] of the shifted common rows
pub const COMMON_SHIFT_INDEX_TABLE: [u16; COMMON_LINE_COUNT] = [
    0x0000, 0x0CD0, 0x19A0, 0x0003, 0x02D9, 0x088B, 0x0051, 0x00F3, 0x0009, 0x001B, 0x0001,
    0x0006, 0x05B2, 0x1116, 0x00A2, 0x01E6, 0x0012, 0x0036, 0x0002, 0x02DC, 0x0B64, 0x08DC,
    0x0144, 0x00FC, 0x0024, 0x001C, 0x099C, 0x0334, 0x1338, 0x0668, 0x166C, 0x1004,
];

/// All row lookup tables, built once
#[derive(Debug)]
pub struct LineTables {
    /// Every row, indexed by its 13-bit code
    pub lines: Vec<Line>,
    /// Every row rotated left by one pixel
    pub shifted: Vec<Line>,
    /// Common rows, indexed by a 5-bit code
    pub common: [Line; COMMON_LINE_COUNT],
    /// Common rows, rotated
    pub common_shifted: [Line; COMMON_LINE_COUNT],
}

lazy_static! {
    /// Shared line tables
    pub static ref LINE_TABLES: LineTables = LineTables::build();
}

impl LineTables {
    fn build() -> Self {
        let mut lines = Vec::with_capacity(LINE_COUNT);
        let mut shifted = Vec::with_capacity(LINE_COUNT);

        // index = a*3^7 + b*3^6 + ... + h; the stored pixel order swaps each pair
        for index in 0..LINE_COUNT {
            let mut trits = [0u8; 8];
            let mut rest = index;
            for trit in trits.iter_mut().rev() {
                *trit = (rest % 3) as u8;
                rest /= 3;
            }
            let [a, b, c, d, e, f, g, h] = trits;
            lines.push([b, a, d, c, f, e, h, g]);
            shifted.push([a, d, c, f, e, h, g, b]);
        }

        let common = COMMON_LINE_INDEX_TABLE.map(|i| lines[i as usize]);
        let common_shifted = COMMON_LINE_INDEX_TABLE.map(|i| shifted[i as usize]);

        LineTables {
            lines,
            shifted,
            common,
            common_shifted,
        }
    }
}
