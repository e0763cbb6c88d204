//! Flipnote Studio 3D KWZ decoder
//!
//! A KWZ file is a chain of sections, each a 4-byte tag (first three
//! characters significant), a little-endian `u32` payload length and the
//! payload:
//!
//! - `KFH`: file header and author metadata (absent in comments)
//! - `KTN`: thumbnail JPEG
//! - `KMC`: per-frame pixel data
//! - `KMI`: per-frame metadata, 28 bytes per frame
//! - `KSN`: audio (absent in silent comments and icons)
//! - `KIC`: marks a folder icon
//!
//! followed by a 256-byte RSA signature.

mod audio;
mod bits;
mod frame;
mod meta;
mod sections;
pub mod tables;

pub use audio::{decode_kwz_adpcm, guess_initial_step_index, DSI_STEP_INDEX_SEARCH_MAX};
pub use bits::BitReader;
pub use frame::{decode_tiles, ALL_LAYERS};
pub use meta::{kwz_fsid_region, looks_like_dsi_library_note};
pub use sections::{KwzSection, SectionMap, MAX_SECTIONS};

use crate::common::{note_duration, AudioTrackInfo, DecoderSettings, NoteMeta};
use crate::stream::ByteStream;
use crate::{FlipnoteError, Result};

/// Native frame width
pub const KWZ_WIDTH: usize = 320;

/// Native frame height
pub const KWZ_HEIGHT: usize = 240;

/// Number of drawing layers
pub const KWZ_LAYER_COUNT: usize = 3;

/// Ink colors available to each layer
pub const KWZ_COLORS_PER_LAYER: usize = 2;

/// Edge length of the square crop used by folder icons
pub const KWZ_ICON_SIZE: usize = 24;

/// Frames per second, indexed by frame speed (0..=10)
pub const KWZ_FRAMERATES: [f64; 11] = [0.2, 0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 12.0, 20.0, 24.0, 30.0];

/// Global RGBA palette: white, black, red, yellow, green, blue, transparent
pub const KWZ_PALETTE: [[u8; 4]; 7] = [
    [0xff, 0xff, 0xff, 0xff],
    [0x10, 0x10, 0x10, 0xff],
    [0xff, 0x10, 0x10, 0xff],
    [0xff, 0xe7, 0x00, 0xff],
    [0x00, 0x86, 0x31, 0xff],
    [0x00, 0x38, 0xce, 0xff],
    [0xff, 0xff, 0xff, 0x00],
];

/// Sample rate the audio tracks were recorded at
pub const KWZ_RAW_SAMPLE_RATE: u32 = 16364;

/// Default output sample rate
pub const KWZ_SAMPLE_RATE: u32 = 32768;

/// Number of audio tracks: BGM and SE1..SE4
pub const KWZ_AUDIO_TRACKS: usize = 5;

/// Size of the trailing signature
pub const KWZ_SIGNATURE_SIZE: usize = 256;

/// Size of one `KMI` frame metadata entry
pub const KMI_ENTRY_SIZE: usize = 28;

/// Stored size of a layer that is unchanged from the previous frame
pub const UNCHANGED_LAYER_SIZE: usize = 38;

/// Decoder for one KWZ file
///
/// Layer buffers are owned scratch space reused across [`decode_frame`]
/// calls: decoding frame N overwrites frame N-1's pixels, so copy them out
/// before asking for another frame.
///
/// [`decode_frame`]: KwzDecoder::decode_frame
#[derive(Debug)]
pub struct KwzDecoder {
    stream: ByteStream,
    settings: DecoderSettings,
    sections: SectionMap,
    is_comment: bool,
    is_folder_icon: bool,
    is_dsi_library_note: bool,
    frame_count: usize,
    frame_speed: u8,
    bgm_speed: u8,
    framerate: f64,
    bgm_framerate: f64,
    thumb_frame_index: usize,
    layer_visibility: [bool; KWZ_LAYER_COUNT],
    meta: NoteMeta,
    sound_meta: [AudioTrackInfo; KWZ_AUDIO_TRACKS],
    image_width: usize,
    image_height: usize,
    frame_meta_offsets: Vec<usize>,
    frame_data_offsets: Vec<usize>,
    frame_layer_sizes: Vec<[usize; KWZ_LAYER_COUNT]>,
    layers: [Vec<u8>; KWZ_LAYER_COUNT],
    bits: BitReader,
    last_decoded: Option<usize>,
}

impl KwzDecoder {
    /// Parse a KWZ file held in memory with default settings
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        Self::with_settings(bytes, DecoderSettings::default())
    }

    /// Parse a KWZ file held in memory
    pub fn with_settings(bytes: Vec<u8>, settings: DecoderSettings) -> Result<Self> {
        let stream = ByteStream::new(bytes);
        let sections = SectionMap::discover(stream.as_bytes())?;
        let is_dsi_library_note = settings.dsi_library_note;

        let mut decoder = Self {
            stream,
            settings,
            is_comment: !sections.contains(b"KFH"),
            is_folder_icon: sections.contains(b"KIC"),
            sections,
            is_dsi_library_note,
            frame_count: 0,
            frame_speed: 0,
            bgm_speed: 0,
            framerate: KWZ_FRAMERATES[0],
            bgm_framerate: KWZ_FRAMERATES[0],
            thumb_frame_index: 0,
            layer_visibility: [true; KWZ_LAYER_COUNT],
            meta: NoteMeta::default(),
            sound_meta: [AudioTrackInfo::default(); KWZ_AUDIO_TRACKS],
            image_width: KWZ_WIDTH,
            image_height: KWZ_HEIGHT,
            frame_meta_offsets: Vec::new(),
            frame_data_offsets: Vec::new(),
            frame_layer_sizes: Vec::new(),
            layers: std::array::from_fn(|_| vec![0; KWZ_WIDTH * KWZ_HEIGHT]),
            bits: BitReader::new(),
            last_decoded: None,
        };

        if decoder.is_folder_icon {
            decoder.frame_count = 1;
            decoder.image_width = KWZ_ICON_SIZE;
            decoder.image_height = KWZ_ICON_SIZE;
        } else if decoder.is_comment {
            let kmi = decoder.sections.require(b"KMI")?;
            decoder.frame_count = (kmi.length / KMI_ENTRY_SIZE).max(1);
        } else if decoder.settings.quick_meta {
            decoder.read_meta_quick()?;
        } else {
            decoder.read_meta()?;
        }

        decoder.read_frame_offsets()?;
        if decoder.sections.contains(b"KSN") {
            decoder.read_sound_header()?;
        }

        decoder.meta.frame_count = decoder.frame_count;
        decoder.meta.frame_speed = decoder.frame_speed;
        decoder.meta.framerate = decoder.framerate;
        decoder.meta.duration = decoder.duration();

        log::debug!(
            "KWZ: {} frames at speed {} ({} fps), comment: {}, icon: {}, DSi library: {}",
            decoder.frame_count,
            decoder.frame_speed,
            decoder.framerate,
            decoder.is_comment,
            decoder.is_folder_icon,
            decoder.is_dsi_library_note
        );
        Ok(decoder)
    }

    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Raw app-level frame speed (0..=10)
    pub fn frame_speed(&self) -> u8 {
        self.frame_speed
    }

    /// Raw app-level speed the BGM was recorded at
    pub fn bgm_speed(&self) -> u8 {
        self.bgm_speed
    }

    /// Playback frames per second
    pub fn framerate(&self) -> f64 {
        self.framerate
    }

    /// Frames per second at the time the BGM was recorded
    pub fn bgm_framerate(&self) -> f64 {
        self.bgm_framerate
    }

    /// Playback duration in seconds
    pub fn duration(&self) -> f64 {
        note_duration(self.frame_count, self.framerate)
    }

    /// Index of the thumbnail frame
    pub fn thumb_frame_index(&self) -> usize {
        self.thumb_frame_index
    }

    /// Per-layer visibility flags
    pub fn layer_visibility(&self) -> &[bool] {
        &self.layer_visibility
    }

    /// Document metadata
    pub fn meta(&self) -> &NoteMeta {
        &self.meta
    }

    /// Track locations for BGM and SE1..SE4
    pub fn sound_meta(&self) -> &[AudioTrackInfo] {
        &self.sound_meta
    }

    /// Discovered sections
    pub fn sections(&self) -> &SectionMap {
        &self.sections
    }

    /// The settings this decoder was built with
    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    /// Note has no `KFH` section (a comment)
    pub fn is_comment(&self) -> bool {
        self.is_comment
    }

    /// Note is a 24x24 folder icon
    pub fn is_folder_icon(&self) -> bool {
        self.is_folder_icon
    }

    /// Note is a PPM converted by the DSi Library service
    pub fn is_dsi_library_note(&self) -> bool {
        self.is_dsi_library_note
    }

    /// Width and height of the extracted image
    pub fn image_size(&self) -> (usize, usize) {
        (self.image_width, self.image_height)
    }

    /// The raw file bytes
    pub fn bytes(&self) -> &[u8] {
        self.stream.as_bytes()
    }

    /// Bytes covered by the file signature: every discovered section
    pub fn body(&self) -> Result<&[u8]> {
        self.stream.slice(0, self.sections.body_end())
    }

    /// The 256-byte RSA-SHA256 signature following the body
    pub fn signature(&self) -> Result<&[u8]> {
        self.stream
            .slice(self.sections.body_end(), KWZ_SIGNATURE_SIZE)
    }

    pub(crate) fn check_frame_index(&self, index: usize) -> Result<()> {
        if index >= self.frame_count {
            return Err(FlipnoteError::FrameOutOfRange {
                index,
                count: self.frame_count,
            });
        }
        Ok(())
    }
}
