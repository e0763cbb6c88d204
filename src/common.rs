//! Common types and constants shared by the PPM and KWZ decoders
//!
//! This module defines the error type, the document-level metadata records,
//! audio track identifiers and the decoder settings used by both formats.

use std::fmt;
use thiserror::Error;

/// Seconds between the Unix epoch and 2000-01-01 00:00:00 UTC, the epoch
/// both formats store their timestamps against.
pub const NINTENDO_EPOCH_OFFSET: i64 = 946_684_800;

/// Container format of a loaded note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    /// Flipnote Studio (DSi) animation
    Ppm,
    /// Flipnote Studio 3D animation
    Kwz,
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatTag::Ppm => f.write_str("PPM"),
            FormatTag::Kwz => f.write_str("KWZ"),
        }
    }
}

/// Console region an author ID was registered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlipnoteRegion {
    /// Japan
    Jpn,
    /// Americas
    Usa,
    /// Europe and Oceania
    Eur,
    /// Region could not be determined
    Unknown,
}

/// Audio tracks a note may carry
///
/// PPM notes have `Bgm` and `Se1`..`Se3`; KWZ notes add `Se4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AudioTrack {
    /// Background music
    Bgm = 0,
    /// Sound effect 1
    Se1 = 1,
    /// Sound effect 2
    Se2 = 2,
    /// Sound effect 3
    Se3 = 3,
    /// Sound effect 4 (KWZ only)
    Se4 = 4,
}

impl AudioTrack {
    /// All track ids in storage order
    pub const ALL: [AudioTrack; 5] = [
        AudioTrack::Bgm,
        AudioTrack::Se1,
        AudioTrack::Se2,
        AudioTrack::Se3,
        AudioTrack::Se4,
    ];

    /// Sound effect tracks in storage order
    pub const SOUND_EFFECTS: [AudioTrack; 4] = [
        AudioTrack::Se1,
        AudioTrack::Se2,
        AudioTrack::Se3,
        AudioTrack::Se4,
    ];

    /// Zero-based index into per-track tables
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioTrack::Bgm => "BGM",
            AudioTrack::Se1 => "SE1",
            AudioTrack::Se2 => "SE2",
            AudioTrack::Se3 => "SE3",
            AudioTrack::Se4 => "SE4",
        };
        f.write_str(name)
    }
}

/// Location of one compressed audio track inside the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioTrackInfo {
    /// Absolute byte offset of the track data
    pub offset: usize,
    /// Track length in bytes
    pub length: usize,
}

/// One author record (root, parent or current)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorInfo {
    /// Display name
    pub username: String,
    /// Flipnote Studio ID, formatted per-format
    pub fsid: String,
    /// Filename the author saved the note under, if recorded
    pub filename: Option<String>,
    /// Region derived from the author ID
    pub region: Option<FlipnoteRegion>,
}

/// Document-level metadata
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoteMeta {
    /// Note is locked against editing
    pub lock: bool,
    /// Playback loops
    pub is_loop: bool,
    /// Note was derived from someone else's note
    pub is_spinoff: bool,
    /// Number of frames
    pub frame_count: usize,
    /// Raw app-level speed index
    pub frame_speed: u8,
    /// Frames per second derived from the speed index
    pub framerate: f64,
    /// Playback duration in seconds
    pub duration: f64,
    /// Index of the thumbnail frame
    pub thumb_index: usize,
    /// Last modification time, seconds since 2000-01-01
    pub timestamp: u32,
    /// Creation time, seconds since 2000-01-01 (KWZ only)
    pub creation_timestamp: Option<u32>,
    /// Original author
    pub root: AuthorInfo,
    /// Author of the note this one was derived from
    pub parent: AuthorInfo,
    /// Most recent author
    pub current: AuthorInfo,
}

impl NoteMeta {
    /// Modification time as seconds since the Unix epoch
    pub fn unix_timestamp(&self) -> i64 {
        self.timestamp as i64 + NINTENDO_EPOCH_OFFSET
    }
}

/// Settings that tune how a decoder reads a note
///
/// Only KWZ consults these today; PPM decoders accept and ignore them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoderSettings {
    /// Skip author and timestamp parsing and read only the playback fields
    pub quick_meta: bool,
    /// Treat the note as a PPM converted by the DSi Library service
    pub dsi_library_note: bool,
    /// Initial ADPCM predictor for the BGM track
    pub initial_bgm_predictor: Option<i32>,
    /// Initial ADPCM step index for the BGM track; disables the RMS search
    pub initial_bgm_step_index: Option<i32>,
    /// Initial ADPCM predictors for SE1..SE4
    pub initial_se_predictors: [Option<i32>; 4],
    /// Initial ADPCM step indices for SE1..SE4
    pub initial_se_step_indices: [Option<i32>; 4],
}

impl DecoderSettings {
    /// Create settings with every option at its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Read only the playback fields of the KWZ meta section
    pub fn with_quick_meta(mut self, quick: bool) -> Self {
        self.quick_meta = quick;
        self
    }

    /// Turn DSi Library note handling on or off
    pub fn with_dsi_library_note(mut self, is_dsi_library_note: bool) -> Self {
        self.dsi_library_note = is_dsi_library_note;
        self
    }

    /// Override the initial BGM decoder state
    pub fn with_initial_bgm_state(mut self, predictor: i32, step_index: i32) -> Self {
        self.initial_bgm_predictor = Some(predictor);
        self.initial_bgm_step_index = Some(step_index);
        self
    }

    /// Override the initial decoder state of one sound effect track
    pub fn with_initial_se_state(
        mut self,
        track: AudioTrack,
        predictor: i32,
        step_index: i32,
    ) -> Result<Self> {
        let slot = match track {
            AudioTrack::Bgm => return Err(FlipnoteError::UnknownAudioTrack(track)),
            se => se.index() - 1,
        };
        self.initial_se_predictors[slot] = Some(predictor);
        self.initial_se_step_indices[slot] = Some(step_index);
        Ok(self)
    }
}

/// Error type for Flipnote decoding
#[derive(Debug, Error)]
pub enum FlipnoteError {
    /// A read ran past the end of the buffer
    #[error("Unexpected end of input: wanted {wanted} bytes at offset {offset:#x}, buffer is {len} bytes")]
    UnexpectedEof {
        /// Offset the read started at
        offset: usize,
        /// Number of bytes requested
        wanted: usize,
        /// Total buffer length
        len: usize,
    },

    /// File structure is inconsistent
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Requested audio track does not exist in this note or format
    #[error("Unknown audio track: {0}")]
    UnknownAudioTrack(AudioTrack),

    /// Frame index outside `[0, count)`
    #[error("Frame index {index} out of range (frame count is {count})")]
    FrameOutOfRange {
        /// Requested index
        index: usize,
        /// Number of frames
        count: usize,
    },

    /// Layer index outside `[0, count)`
    #[error("Layer index {index} out of range (layer count is {count})")]
    LayerOutOfRange {
        /// Requested index
        index: usize,
        /// Number of layers
        count: usize,
    },

    /// Operation is not provided by this crate
    #[error("Unsupported: {0}")]
    UnsupportedVariant(String),

    /// Leading bytes match no known format
    #[error("Unrecognized format (leading bytes {0:02x?})")]
    UnrecognizedFormat([u8; 4]),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlipnoteError {
    /// Whether this error means the input file itself is broken
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            FlipnoteError::UnexpectedEof { .. }
                | FlipnoteError::MalformedInput(_)
                | FlipnoteError::UnknownAudioTrack(_)
        )
    }

    /// Whether this error is a caller-side index mistake
    pub fn is_range_violation(&self) -> bool {
        matches!(
            self,
            FlipnoteError::FrameOutOfRange { .. } | FlipnoteError::LayerOutOfRange { .. }
        )
    }
}

/// Result type alias for Flipnote operations
pub type Result<T> = std::result::Result<T, FlipnoteError>;

/// Bail out with a `MalformedInput` error unless `cond` holds
macro_rules! ensure_input {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::common::FlipnoteError::MalformedInput(format!($($arg)+)));
        }
    };
}
pub(crate) use ensure_input;

/// Playback duration in seconds for `frame_count` frames at `framerate`
pub fn note_duration(frame_count: usize, framerate: f64) -> f64 {
    frame_count as f64 / framerate
}
