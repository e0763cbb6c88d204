//! Flipnote Studio (DSi) PPM decoder
//!
//! A PPM file is a fixed 0x6A0-byte header/meta block, an animation header
//! with a per-frame offset table, the frame data, one sound-effect flag byte
//! per frame, a 32-byte sound header, the ADPCM audio tracks and finally a
//! 128-byte RSA signature.

mod audio;
mod frame;
pub(crate) mod header;

pub use header::{is_ppm_fsid, ppm_fsid_region, PPM_FSID_SPECIAL_CASE};

use crate::common::{note_duration, AudioTrackInfo, NoteMeta};
use crate::stream::ByteStream;
use crate::{FlipnoteError, Result};

/// Magic bytes at the start of every PPM file
pub const PPM_MAGIC: [u8; 4] = *b"PARA";

/// Native frame width
pub const PPM_WIDTH: usize = 256;

/// Native frame height
pub const PPM_HEIGHT: usize = 192;

/// Number of drawing layers
pub const PPM_LAYER_COUNT: usize = 2;

/// Ink colors available to each layer
pub const PPM_COLORS_PER_LAYER: usize = 1;

/// Frames per second, indexed by frame speed (1..=8)
pub const PPM_FRAMERATES: [f64; 9] = [0.5, 0.5, 1.0, 2.0, 4.0, 6.0, 12.0, 20.0, 30.0];

/// Global RGBA palette: white, black, red, blue
pub const PPM_PALETTE: [[u8; 4]; 4] = [
    [0xff, 0xff, 0xff, 0xff],
    [0x0e, 0x0e, 0x0e, 0xff],
    [0xff, 0x2a, 0x2a, 0xff],
    [0x0a, 0x39, 0xff, 0xff],
];

/// Sample rate the audio tracks were recorded at
pub const PPM_RAW_SAMPLE_RATE: u32 = 8192;

/// Default output sample rate
pub const PPM_SAMPLE_RATE: u32 = 32768;

/// Audio tracks a PPM may carry, in storage order
pub const PPM_AUDIO_TRACKS: usize = 4;

// File layout
const HEADER_FRAME_DATA_LENGTH: usize = 0x4;
const META_OFFSET: usize = 0x10;
const TIMESTAMP_OFFSET: usize = 0x9A;
const ANIMATION_HEADER_OFFSET: usize = 0x6A0;
const PLAYBACK_FLAGS_OFFSET: usize = 0x6A6;
const FRAME_OFFSET_TABLE_OFFSET: usize = 0x6A8;
const SOUND_HEADER_SIZE: usize = 32;
const SIGNATURE_SIZE: usize = 0x80;

/// Decoder for one PPM file
///
/// Layer buffers are owned scratch space reused across [`decode_frame`]
/// calls: decoding frame N overwrites frame N-1's pixels, so copy them out
/// before asking for another frame.
///
/// [`decode_frame`]: PpmDecoder::decode_frame
#[derive(Debug)]
pub struct PpmDecoder {
    stream: ByteStream,
    frame_data_length: usize,
    sound_data_length: usize,
    frame_count: usize,
    version: u16,
    frame_speed: u8,
    bgm_speed: u8,
    framerate: f64,
    bgm_framerate: f64,
    thumb_frame_index: usize,
    layer_visibility: [bool; PPM_LAYER_COUNT],
    meta: NoteMeta,
    sound_header_offset: usize,
    sound_meta: [AudioTrackInfo; PPM_AUDIO_TRACKS],
    frame_offsets: Vec<usize>,
    layers: [Vec<u8>; PPM_LAYER_COUNT],
    prev_layers: [Vec<u8>; PPM_LAYER_COUNT],
    last_decoded: Option<usize>,
}

impl PpmDecoder {
    /// Parse a PPM file held in memory
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        let mut decoder = Self {
            stream: ByteStream::new(bytes),
            frame_data_length: 0,
            sound_data_length: 0,
            frame_count: 0,
            version: 0,
            frame_speed: 0,
            bgm_speed: 0,
            framerate: 0.0,
            bgm_framerate: 0.0,
            thumb_frame_index: 0,
            layer_visibility: [true; PPM_LAYER_COUNT],
            meta: NoteMeta::default(),
            sound_header_offset: 0,
            sound_meta: [AudioTrackInfo::default(); PPM_AUDIO_TRACKS],
            frame_offsets: Vec::new(),
            layers: std::array::from_fn(|_| vec![0; PPM_WIDTH * PPM_HEIGHT]),
            prev_layers: std::array::from_fn(|_| vec![0; PPM_WIDTH * PPM_HEIGHT]),
            last_decoded: None,
        };

        decoder.read_header()?;
        decoder.read_animation_header()?;
        decoder.read_sound_header()?;
        if decoder.version >> 4 & 0xF != 0 || decoder.version & 0xF != 0 {
            decoder.read_meta()?;
        }
        decoder.meta.frame_count = decoder.frame_count;
        decoder.meta.frame_speed = decoder.frame_speed;
        decoder.meta.framerate = decoder.framerate;
        decoder.meta.duration = decoder.duration();

        log::debug!(
            "PPM: {} frames at speed {} ({} fps), {} bytes of frame data, {} bytes of audio",
            decoder.frame_count,
            decoder.frame_speed,
            decoder.framerate,
            decoder.frame_data_length,
            decoder.sound_data_length
        );
        Ok(decoder)
    }

    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Format version word from the header
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Raw app-level frame speed (1..=8)
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

    /// Track locations for BGM and SE1..SE3
    pub fn sound_meta(&self) -> &[AudioTrackInfo] {
        &self.sound_meta
    }

    /// Absolute offsets of each frame's data
    pub fn frame_offsets(&self) -> &[usize] {
        &self.frame_offsets
    }

    /// The raw file bytes
    pub fn bytes(&self) -> &[u8] {
        self.stream.as_bytes()
    }

    /// Bytes covered by the file signature (everything before it)
    pub fn body(&self) -> Result<&[u8]> {
        self.stream.slice(0, self.body_end())
    }

    /// The 128-byte RSA-SHA1 signature following the body
    pub fn signature(&self) -> Result<&[u8]> {
        self.stream.slice(self.body_end(), SIGNATURE_SIZE)
    }

    fn body_end(&self) -> usize {
        self.sound_header_offset + SOUND_HEADER_SIZE + self.sound_data_length
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
