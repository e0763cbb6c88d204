//! Error handling for Flipnote decoding
//!
//! This module re-exports the error type used throughout the crate. The
//! variants follow a fixed taxonomy: malformed input (`UnexpectedEof`,
//! `MalformedInput`, `UnknownAudioTrack`), caller range violations
//! (`FrameOutOfRange`, `LayerOutOfRange`), capability gaps
//! (`UnsupportedVariant`) and the dispatcher's `UnrecognizedFormat`.

pub use crate::common::FlipnoteError;
pub use crate::common::Result;
