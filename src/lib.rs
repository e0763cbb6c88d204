//! Flipnote - Rust decoder for Flipnote Studio animation files
//!
//! This crate reads the two animation formats written by Nintendo's Flipnote
//! Studio apps: PPM from the DSi version and KWZ from the 3DS version. Both
//! decoders expose metadata, per-frame layer bitmaps with palettes and
//! compositing, and ADPCM audio decoded to signed 16-bit PCM.
//!
//! # Features
//!
//! - **PPM** - header and author metadata, keyframe/diff frame decode with
//!   line encodings, 4-bit IMA ADPCM audio
//! - **KWZ** - section discovery, full or quick metadata, the tile-based
//!   frame codec, adaptive 2/4-bit ADPCM audio including DSi Library notes
//! - Format detection and a shared [`FlipnoteDecoder`] trait
//! - Palette-indexed and RGBA frame extraction with layer ordering
//! - Master audio mix with sound effects placed per frame
//! - Async batch inspection of many files (`async` feature)
//!
//! # Example - Frames
//!
//! ```no_run
//! use flipnote::{Flipnote, FlipnoteDecoder};
//!
//! let mut note = Flipnote::open("note.kwz")?;
//! println!("{} frames at {} fps", note.frame_count(), note.framerate());
//!
//! // Palette-indexed pixels plus the palette for this frame
//! let pixels = note.frame_pixels(0)?;
//! let palette = note.frame_palette(0)?;
//!
//! // Or packed 0xRRGGBBAA colors
//! let rgba = note.frame_pixels_rgba(note.thumb_frame_index())?;
//! # let _ = (pixels, palette, rgba);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Example - Audio
//!
//! ```no_run
//! use flipnote::{parse_bytes, AudioTrack, FlipnoteDecoder};
//!
//! let note = parse_bytes(std::fs::read("note.ppm")?)?;
//! let rate = note.sample_rate();
//!
//! // Background music alone, resampled to the output rate
//! if note.has_audio_track(AudioTrack::Bgm) {
//!     let bgm = note.audio_track_pcm(AudioTrack::Bgm, rate)?;
//!     # let _ = bgm;
//! }
//!
//! // Everything mixed, exactly as long as the animation
//! let master = note.audio_master_pcm(rate)?;
//! # let _ = master;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

// Public modules
pub mod audio;
pub mod common;
pub mod error;
pub mod kwz;
pub mod parser;
pub mod ppm;
pub mod stream;

// Async modules (only available with async feature)
#[cfg(feature = "async")]
pub mod async_batch;

// Re-export commonly used types
pub use common::{
    AudioTrack, AudioTrackInfo, AuthorInfo, DecoderSettings, FlipnoteError, FlipnoteRegion,
    FormatTag, NoteMeta, Result,
};
pub use kwz::KwzDecoder;
pub use parser::{detect_format, Flipnote, FlipnoteDecoder, ImageLayout, NoteSummary};
pub use ppm::PpmDecoder;
pub use stream::{ByteStream, SeekOrigin};

// Re-export async types when async feature is enabled
#[cfg(feature = "async")]
pub use async_batch::AsyncBatchProcessor;

// Convenience functions

/// Parse a note of either format from memory
///
/// # Arguments
/// * `bytes` - The complete file contents
///
/// # Returns
/// A [`Flipnote`] wrapping the matching decoder
pub fn parse_bytes(bytes: Vec<u8>) -> Result<Flipnote> {
    Flipnote::from_bytes(bytes)
}

/// Read and parse a note of either format from disk
///
/// # Arguments
/// * `path` - Path to a `.ppm` or `.kwz` file
///
/// # Returns
/// A [`Flipnote`] wrapping the matching decoder
pub fn parse_file<P: AsRef<std::path::Path>>(path: P) -> Result<Flipnote> {
    Flipnote::open(path)
}
