//! Synthetic PPM and KWZ files for the integration tests
//!
//! There are no sample notes in the repository, so these builders write the
//! documented layouts byte for byte.

#![allow(dead_code)]

pub const PPM_WIDTH: usize = 256;
pub const PPM_HEIGHT: usize = 192;
pub const KWZ_WIDTH: usize = 320;
pub const KWZ_HEIGHT: usize = 240;

pub const CURRENT_FSID: &str = "5A7B3C400E1F2A3B";
pub const PARENT_FSID: &str = "9123456701234567";
pub const ROOT_FSID: &str = "1123456701234567";

fn put_u16(out: &mut [u8], offset: usize, value: u16) {
    out[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_wide(out: &mut [u8], offset: usize, text: &str, units: usize) {
    for (i, unit) in text.encode_utf16().take(units).enumerate() {
        put_u16(out, offset + i * 2, unit);
    }
}

// ---------------------------------------------------------------------------
// PPM

/// How a PPM layer's inked lines are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpmLineMode {
    /// Chunk-mask coded lines
    Coded,
    /// Chunk-mask coded lines over an inked background
    Inverted,
    /// Uncompressed lines
    Raw,
}

/// Encode a 256x192 bitmap of 0/1 pixels as a PPM line table and line data
pub fn encode_ppm_layer(bitmap: &[u8], mode: PpmLineMode) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(bitmap.len(), PPM_WIDTH * PPM_HEIGHT);
    let mut table = vec![0u8; PPM_HEIGHT / 4];
    let mut data = Vec::new();

    for (line, row) in bitmap.chunks_exact(PPM_WIDTH).enumerate() {
        if row.iter().all(|&p| p == 0) {
            continue;
        }
        let chunks: Vec<u8> = row
            .chunks_exact(8)
            .map(|c| c.iter().enumerate().fold(0u8, |acc, (bit, &p)| acc | (p << bit)))
            .collect();
        let code = match mode {
            PpmLineMode::Coded => 1,
            PpmLineMode::Inverted => 2,
            PpmLineMode::Raw => 3,
        };
        table[line / 4] |= code << ((line % 4) * 2);
        if mode == PpmLineMode::Raw {
            data.extend_from_slice(&chunks);
            continue;
        }
        let filler = if mode == PpmLineMode::Inverted { 0xFF } else { 0x00 };
        let mut mask = 0u32;
        let mut coded = Vec::new();
        for (i, &chunk) in chunks.iter().enumerate() {
            if chunk != filler {
                mask |= 0x8000_0000 >> i;
                coded.push(chunk);
            }
        }
        data.extend_from_slice(&mask.to_be_bytes());
        data.extend(coded);
    }
    (table, data)
}

/// One PPM frame ready to be laid out
#[derive(Debug, Clone)]
pub struct PpmFrame {
    /// Header byte: keyframe bit, translation bits, pen colors, paper color
    pub header: u8,
    /// Whole-frame translation, written when header bits 5-6 are set
    pub translate: (i8, i8),
    /// Both layers' bitmaps
    pub layers: [Vec<u8>; 2],
    /// Line storage used for both layers
    pub mode: PpmLineMode,
}

impl PpmFrame {
    /// A keyframe on white paper with black and red pens
    pub fn key(layers: [Vec<u8>; 2]) -> Self {
        PpmFrame {
            header: 0x80 | 0b0_10_01_1,
            translate: (0, 0),
            layers,
            mode: PpmLineMode::Coded,
        }
    }

    /// A diff frame with the same colors as [`PpmFrame::key`]
    pub fn diff(layers: [Vec<u8>; 2]) -> Self {
        PpmFrame {
            header: 0b0_10_01_1,
            ..Self::key(layers)
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.header];
        if (self.header >> 5) & 0x3 != 0 {
            out.push(self.translate.0 as u8);
            out.push(self.translate.1 as u8);
        }
        let encoded: Vec<_> = self
            .layers
            .iter()
            .map(|layer| encode_ppm_layer(layer, self.mode))
            .collect();
        for (table, _) in &encoded {
            out.extend_from_slice(table);
        }
        for (_, data) in &encoded {
            out.extend_from_slice(data);
        }
        out
    }
}

/// Blank PPM layer
pub fn ppm_blank() -> Vec<u8> {
    vec![0; PPM_WIDTH * PPM_HEIGHT]
}

/// PPM layer with the given pixels inked
pub fn ppm_layer(points: &[(usize, usize)]) -> Vec<u8> {
    let mut layer = ppm_blank();
    for &(x, y) in points {
        layer[y * PPM_WIDTH + x] = 1;
    }
    layer
}

/// Builder for a complete PPM file
#[derive(Debug, Clone)]
pub struct PpmBuilder {
    pub version: u16,
    pub frames: Vec<PpmFrame>,
    pub se_flags: Vec<u8>,
    pub tracks: [Vec<u8>; 4],
    /// App-level frame speed, 1..=8
    pub frame_speed: u8,
    pub bgm_speed: u8,
    pub lock: bool,
    pub thumb_index: u16,
    pub playback_flags: u16,
    pub names: [String; 3],
    pub fsids: [String; 3],
    pub timestamp: u32,
}

impl Default for PpmBuilder {
    fn default() -> Self {
        PpmBuilder {
            version: 0x24,
            frames: vec![PpmFrame::key([ppm_blank(), ppm_blank()])],
            se_flags: Vec::new(),
            tracks: Default::default(),
            frame_speed: 8,
            bgm_speed: 8,
            lock: false,
            thumb_index: 0,
            playback_flags: 0,
            names: ["root".into(), "parent".into(), "current".into()],
            fsids: [ROOT_FSID.into(), PARENT_FSID.into(), CURRENT_FSID.into()],
            timestamp: 0,
        }
    }
}

/// Write a 16-digit hex author ID the way PPM stores it, byte-reversed
fn put_ppm_fsid(out: &mut [u8], offset: usize, fsid: &str) {
    let mut bytes = hex::decode(fsid).expect("test ids are valid hex");
    bytes.reverse();
    out[offset..offset + 8].copy_from_slice(&bytes);
}

fn put_packed_filename(out: &mut [u8], offset: usize, random: &[u8; 13], edits: u16) {
    out[offset..offset + 3].copy_from_slice(&[0xF7, 0x8A, 0x3C]);
    out[offset + 3..offset + 16].copy_from_slice(random);
    put_u16(out, offset + 16, edits);
}

impl PpmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the sound header in the built file
    pub fn sound_header_offset(&self) -> usize {
        let frame_bytes: usize = self.frames.iter().map(|f| f.encode().len()).sum();
        let frame_data_length = 8 + 4 * self.frames.len() + frame_bytes;
        (0x6A0 + frame_data_length + self.frames.len()).next_multiple_of(4)
    }

    pub fn build(&self) -> Vec<u8> {
        let frame_count = self.frames.len();
        let encoded: Vec<Vec<u8>> = self.frames.iter().map(PpmFrame::encode).collect();
        let table_length = 4 * frame_count;
        let frame_data_length = 8 + table_length + encoded.iter().map(Vec::len).sum::<usize>();
        let sound_data_length: usize = self.tracks.iter().map(Vec::len).sum();

        let mut out = vec![0u8; 0x6A0];
        out[0..4].copy_from_slice(b"PARA");
        put_u32(&mut out, 0x4, frame_data_length as u32);
        put_u32(&mut out, 0x8, sound_data_length as u32);
        put_u16(&mut out, 0xC, (frame_count - 1) as u16);
        put_u16(&mut out, 0xE, self.version);

        put_u16(&mut out, 0x10, u16::from(self.lock));
        put_u16(&mut out, 0x12, self.thumb_index);
        for (i, name) in self.names.iter().enumerate() {
            put_wide(&mut out, 0x14 + i * 22, name, 11);
        }
        put_ppm_fsid(&mut out, 0x56, &self.fsids[1]);
        put_ppm_fsid(&mut out, 0x5E, &self.fsids[2]);
        put_packed_filename(&mut out, 0x66, b"PARENTFILE000", 1);
        put_packed_filename(&mut out, 0x78, b"CURRENTFILE00", 2);
        put_ppm_fsid(&mut out, 0x8A, &self.fsids[0]);
        put_u32(&mut out, 0x9A, self.timestamp);

        // animation header
        let mut anim = vec![0u8; 8];
        put_u16(&mut anim, 0, table_length as u16);
        put_u16(&mut anim, 6, self.playback_flags);
        out.extend(anim);
        let mut offset = 0u32;
        for frame in &encoded {
            out.extend_from_slice(&offset.to_le_bytes());
            offset += frame.len() as u32;
        }
        for frame in &encoded {
            out.extend_from_slice(frame);
        }
        assert_eq!(out.len(), 0x6A0 + frame_data_length);

        let mut flags = self.se_flags.clone();
        flags.resize(frame_count, 0);
        out.extend(flags);
        out.resize(out.len().next_multiple_of(4), 0);

        let mut sound_header = vec![0u8; 32];
        for (i, track) in self.tracks.iter().enumerate() {
            put_u32(&mut sound_header, i * 4, track.len() as u32);
        }
        sound_header[16] = 8 - self.frame_speed;
        sound_header[17] = 8 - self.bgm_speed;
        out.extend(sound_header);
        for track in &self.tracks {
            out.extend_from_slice(track);
        }
        out.extend_from_slice(&[0x5A; 0x80]);
        out
    }
}

// ---------------------------------------------------------------------------
// KWZ

/// LSB-first bit packer producing little-endian 16-bit words
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    acc: u32,
    len: u32,
}

impl BitWriter {
    pub fn push(&mut self, value: u32, count: u32) -> &mut Self {
        self.acc |= value << self.len;
        self.len += count;
        while self.len >= 16 {
            self.bytes.extend_from_slice(&(self.acc as u16).to_le_bytes());
            self.acc >>= 16;
            self.len -= 16;
        }
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.len > 0 {
            self.bytes.extend_from_slice(&(self.acc as u16).to_le_bytes());
        }
        self.bytes
    }
}

/// 13-bit line table index of an 8-pixel row
pub fn kwz_line_index(row: &[u8]) -> u32 {
    // rows store each pair of trits swapped
    let trits = [row[1], row[0], row[3], row[2], row[5], row[4], row[7], row[6]];
    trits.iter().fold(0u32, |acc, &t| acc * 3 + t as u32)
}

/// Minitile origins in coded order
pub fn kwz_tile_origins() -> Vec<(usize, usize)> {
    let mut origins = Vec::new();
    for tile_y in (0..KWZ_HEIGHT).step_by(128) {
        for tile_x in (0..KWZ_WIDTH).step_by(128) {
            for y in (tile_y..tile_y + 128).step_by(8) {
                for x in (tile_x..tile_x + 128).step_by(8) {
                    if y < KWZ_HEIGHT && x < KWZ_WIDTH {
                        origins.push((x, y));
                    }
                }
            }
        }
    }
    origins
}

/// Encode a 320x240 layer of 0/1/2 pixels
///
/// With `skip_blank`, blank minitiles become skip runs, which leave the
/// previous frame's pixels in place when the layer is a diff.
pub fn encode_kwz_layer(pixels: &[u8], skip_blank: bool) -> Vec<u8> {
    assert_eq!(pixels.len(), KWZ_WIDTH * KWZ_HEIGHT);
    let mut bits = BitWriter::default();
    let origins = kwz_tile_origins();
    let mut i = 0;
    while i < origins.len() {
        let (x, y) = origins[i];
        let rows: Vec<&[u8]> = (0..8)
            .map(|r| &pixels[(y + r) * KWZ_WIDTH + x..(y + r) * KWZ_WIDTH + x + 8])
            .collect();
        let blank = rows.iter().all(|row| row.iter().all(|&p| p == 0));

        if blank && skip_blank {
            let mut run = 0;
            while run < 31
                && i + run + 1 < origins.len()
                && is_blank_tile(pixels, origins[i + run + 1])
            {
                run += 1;
            }
            bits.push(5, 3).push(run as u32, 5);
            i += run + 1;
            continue;
        }

        if rows.iter().all(|row| row == &rows[0]) {
            bits.push(1, 3).push(kwz_line_index(rows[0]), 13);
        } else {
            bits.push(4, 3).push(0, 8);
            for row in &rows {
                bits.push(kwz_line_index(row), 13);
            }
        }
        i += 1;
    }
    bits.finish()
}

fn is_blank_tile(pixels: &[u8], (x, y): (usize, usize)) -> bool {
    (0..8).all(|r| {
        pixels[(y + r) * KWZ_WIDTH + x..(y + r) * KWZ_WIDTH + x + 8]
            .iter()
            .all(|&p| p == 0)
    })
}

/// Blank KWZ layer
pub fn kwz_blank() -> Vec<u8> {
    vec![0; KWZ_WIDTH * KWZ_HEIGHT]
}

/// KWZ layer with the given pixels set to the given ink slot
pub fn kwz_layer(points: &[(usize, usize, u8)]) -> Vec<u8> {
    let mut layer = kwz_blank();
    for &(x, y, v) in points {
        layer[y * KWZ_WIDTH + x] = v;
    }
    layer
}

/// One KWZ frame ready to be laid out
#[derive(Debug, Clone)]
pub struct KwzFrame {
    /// Flags word: paper color (bits 0-3), diff bits (4-6), ink colors (8-31)
    pub flags: u32,
    /// Encoded tile streams; a 38-byte entry marks an unchanged layer
    pub layers: [Vec<u8>; 3],
    pub depths: [u8; 3],
    pub se_flags: u8,
    pub camera_flags: u8,
    pub author: [u8; 10],
}

/// Paper 0, layer inks (1,2) (3,4) (5,6)
pub const KWZ_DEFAULT_COLORS: u32 = 0x6543_2100;

impl KwzFrame {
    /// Frame with every layer coded from scratch
    pub fn full(layers: [Vec<u8>; 3]) -> Self {
        KwzFrame {
            flags: KWZ_DEFAULT_COLORS | 0x70,
            layers: layers.map(|l| encode_kwz_layer(&l, false)),
            depths: [0, 1, 2],
            se_flags: 0,
            camera_flags: 0,
            author: [0; 10],
        }
    }

    /// Frame whose layers are diffs over the previous frame
    pub fn diff(layers: [Vec<u8>; 3]) -> Self {
        KwzFrame {
            flags: KWZ_DEFAULT_COLORS,
            layers: layers.map(|l| encode_kwz_layer(&l, true)),
            ..Self::full([kwz_blank(), kwz_blank(), kwz_blank()])
        }
    }

    /// Mark `layer` as unchanged from the previous frame
    pub fn unchanged(mut self, layer: usize) -> Self {
        self.layers[layer] = vec![0; 38];
        self
    }

    fn meta_entry(&self) -> Vec<u8> {
        let mut entry = vec![0u8; 28];
        put_u32(&mut entry, 0, self.flags);
        for (i, layer) in self.layers.iter().enumerate() {
            put_u16(&mut entry, 4 + i * 2, layer.len() as u16);
        }
        entry[0xA..0x14].copy_from_slice(&self.author);
        entry[0x14..0x17].copy_from_slice(&self.depths);
        entry[0x17] = self.se_flags;
        entry[0x1A] = self.camera_flags;
        entry
    }
}

fn section(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Builder for a complete KWZ file
#[derive(Debug, Clone)]
pub struct KwzBuilder {
    pub frames: Vec<KwzFrame>,
    /// Write a `KFH` section; without it the note is a comment
    pub with_header: bool,
    /// Lead with a `KIC` section, making the note a folder icon
    pub folder_icon: bool,
    pub frame_speed: u8,
    pub thumb_index: u16,
    pub flags: u16,
    pub layer_flags: u8,
    pub creation_timestamp: u32,
    pub modified_timestamp: u32,
    pub fsids: [[u8; 10]; 3],
    pub names: [String; 3],
    pub filenames: [Vec<u8>; 3],
    pub bgm_speed: u32,
    /// BGM and SE1..SE4 ADPCM; `None` leaves out the `KSN` section
    pub tracks: Option<[Vec<u8>; 5]>,
}

pub const KWZ_NATIVE_FSID: [u8; 10] = [0x10, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x00];

impl Default for KwzBuilder {
    fn default() -> Self {
        KwzBuilder {
            frames: vec![KwzFrame::full([kwz_blank(), kwz_blank(), kwz_blank()])],
            with_header: true,
            folder_icon: false,
            frame_speed: 7,
            thumb_index: 0,
            flags: 0,
            layer_flags: 0,
            creation_timestamp: 100,
            modified_timestamp: 200,
            fsids: [KWZ_NATIVE_FSID; 3],
            names: ["root".into(), "parent".into(), "current".into()],
            filenames: [
                b"0123456789abcdef0123456789ab".to_vec(),
                b"0123456789abcdef0123456789ab".to_vec(),
                b"0123456789abcdef0123456789ab".to_vec(),
            ],
            bgm_speed: 7,
            tracks: None,
        }
    }
}

impl KwzBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn header_payload(&self) -> Vec<u8> {
        // offsets below are relative to the section start, payload starts 8 bytes in
        let mut kfh = vec![0u8; 0xCC - 8];
        let rel = |offset: usize| offset - 8;
        put_u32(&mut kfh, rel(12), self.creation_timestamp);
        put_u32(&mut kfh, rel(16), self.modified_timestamp);
        put_u32(&mut kfh, rel(20), 0x0003_0000);
        for (i, fsid) in self.fsids.iter().enumerate() {
            kfh[rel(24 + i * 10)..rel(34 + i * 10)].copy_from_slice(fsid);
        }
        for (i, name) in self.names.iter().enumerate() {
            put_wide(&mut kfh, rel(54 + i * 22), name, 11);
        }
        for (i, filename) in self.filenames.iter().enumerate() {
            let start = rel(120 + i * 28);
            kfh[start..start + filename.len().min(28)]
                .copy_from_slice(&filename[..filename.len().min(28)]);
        }
        let mut playback = vec![0u8; 8];
        put_u16(&mut playback, 0, self.frames.len() as u16);
        put_u16(&mut playback, 2, self.thumb_index);
        put_u16(&mut playback, 4, self.flags);
        playback[6] = self.frame_speed;
        playback[7] = self.layer_flags;
        kfh.extend(playback);
        kfh
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.folder_icon {
            out.extend(section(b"KIC\x00", &[0; 4]));
        } else if self.with_header {
            out.extend(section(b"KFH\x14", &self.header_payload()));
        }

        if let Some(tracks) = &self.tracks {
            let mut ksn = self.bgm_speed.to_le_bytes().to_vec();
            for track in tracks {
                ksn.extend_from_slice(&(track.len() as u32).to_le_bytes());
            }
            ksn.extend_from_slice(&[0; 4]);
            for track in tracks {
                ksn.extend_from_slice(track);
            }
            out.extend(section(b"KSN\x01", &ksn));
        }

        let mut kmc = vec![0u8; 4];
        for frame in &self.frames {
            for layer in &frame.layers {
                kmc.extend_from_slice(layer);
            }
        }
        out.extend(section(b"KMC\x02", &kmc));

        let kmi: Vec<u8> = self.frames.iter().flat_map(KwzFrame::meta_entry).collect();
        out.extend(section(b"KMI\x05", &kmi));

        out.extend_from_slice(&[0xA5; 256]);
        out
    }
}
