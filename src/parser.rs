//! Format detection and the shared decoder interface
//!
//! [`FlipnoteDecoder`] is implemented by both [`PpmDecoder`] and
//! [`KwzDecoder`], and by the [`Flipnote`] enum that picks one of them from
//! the leading bytes of a file. Pixel and palette extraction is written once
//! here against the trait.

use std::path::Path;

use crate::common::{AudioTrack, AudioTrackInfo, DecoderSettings, FormatTag, NoteMeta};
use crate::kwz::{self, KwzDecoder};
use crate::ppm::{self, PpmDecoder};
use crate::{FlipnoteError, Result};

/// Native decode size and the crop applied when extracting pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    /// Width of the decoded layer buffers
    pub src_width: usize,
    /// Height of the decoded layer buffers
    pub src_height: usize,
    /// Left edge of the crop
    pub offset_x: usize,
    /// Top edge of the crop
    pub offset_y: usize,
    /// Width of extracted images
    pub width: usize,
    /// Height of extracted images
    pub height: usize,
    /// Number of drawing layers
    pub layer_count: usize,
    /// Ink colors per layer
    pub colors_per_layer: usize,
}

/// Pack an RGBA tuple as `0xRRGGBBAA`
#[inline]
pub fn pack_rgba(color: [u8; 4]) -> u32 {
    u32::from_be_bytes(color)
}

/// Operations shared by the PPM and KWZ decoders
pub trait FlipnoteDecoder {
    /// Container format
    fn format(&self) -> FormatTag;

    /// Number of frames, at least 1
    fn frame_count(&self) -> usize;

    /// Raw app-level frame speed
    fn frame_speed(&self) -> u8;

    /// Playback frames per second
    fn framerate(&self) -> f64;

    /// Playback duration in seconds
    fn duration(&self) -> f64;

    /// Index of the thumbnail frame
    fn thumb_frame_index(&self) -> usize;

    /// Per-layer visibility flags
    fn layer_visibility(&self) -> &[bool];

    /// Document metadata
    fn meta(&self) -> &NoteMeta;

    /// Byte ranges of the stored audio tracks
    fn sound_meta(&self) -> &[AudioTrackInfo];

    /// Decode size and crop
    fn image_layout(&self) -> ImageLayout;

    /// The format's fixed RGBA palette
    fn global_palette(&self) -> &'static [[u8; 4]];

    /// Default output sample rate for PCM
    fn sample_rate(&self) -> u32;

    /// Decode frame `index` into the decoder's layer buffers
    ///
    /// The returned buffers are overwritten by the next decode.
    fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]>;

    /// Indices into [`global_palette`](Self::global_palette): paper, then
    /// each layer's ink colors
    fn frame_palette_indices(&self, index: usize) -> Result<Vec<usize>>;

    /// Back-to-front layer draw order
    fn frame_layer_order(&self, index: usize) -> Result<Vec<usize>>;

    /// Whether the note carries data for `track`
    fn has_audio_track(&self, track: AudioTrack) -> bool;

    /// Decode a track at its raw sample rate
    fn decode_audio_track(&self, track: AudioTrack) -> Result<Vec<i16>>;

    /// Decode a track resampled to `dst_rate`
    fn audio_track_pcm(&self, track: AudioTrack, dst_rate: u32) -> Result<Vec<i16>>;

    /// All tracks mixed into `ceil(duration * dst_rate)` samples
    fn audio_master_pcm(&self, dst_rate: u32) -> Result<Vec<i16>>;

    /// Bytes covered by the signature
    fn body(&self) -> Result<&[u8]>;

    /// The RSA signature stored after the body
    fn signature(&self) -> Result<&[u8]>;

    /// Verify the signature against Nintendo's public key
    ///
    /// Not provided by this crate: hash [`body`](Self::body) and check it
    /// against [`signature`](Self::signature) with an RSA implementation.
    fn verify_signature(&self) -> Result<bool> {
        Err(FlipnoteError::UnsupportedVariant(format!(
            "{} signature verification",
            self.format()
        )))
    }

    /// RGBA colors of frame `index`, in palette index order
    fn frame_palette(&self, index: usize) -> Result<Vec<[u8; 4]>> {
        let palette = self.global_palette();
        Ok(self
            .frame_palette_indices(index)?
            .into_iter()
            .map(|i| palette[i])
            .collect())
    }

    /// Composite the visible layers of frame `index` into one cropped image
    ///
    /// Values index into [`frame_palette`](Self::frame_palette): 0 is paper
    /// and ink slot `c` of layer `l` is `1 + l * colors_per_layer + (c - 1)`.
    fn frame_pixels(&mut self, index: usize) -> Result<Vec<u8>> {
        let layout = self.image_layout();
        let order = self.frame_layer_order(index)?;
        let visibility = self.layer_visibility().to_vec();
        let layers = self.decode_frame(index)?;

        let mut pixels = vec![0u8; layout.width * layout.height];
        for &layer in &order {
            if !visibility.get(layer).copied().unwrap_or(true) {
                continue;
            }
            draw_layer(&layout, layer, &layers[layer], &mut pixels, false);
        }
        Ok(pixels)
    }

    /// [`frame_pixels`](Self::frame_pixels) resolved to `0xRRGGBBAA` colors
    fn frame_pixels_rgba(&mut self, index: usize) -> Result<Vec<u32>> {
        let palette: Vec<u32> = self.frame_palette(index)?.into_iter().map(pack_rgba).collect();
        Ok(self
            .frame_pixels(index)?
            .into_iter()
            .map(|p| palette[p as usize])
            .collect())
    }

    /// One cropped layer of frame `index`; 0 is uninked, other values index
    /// into the frame palette as in [`frame_pixels`](Self::frame_pixels)
    fn layer_pixels(&mut self, index: usize, layer: usize) -> Result<Vec<u8>> {
        let layout = self.image_layout();
        if layer >= layout.layer_count {
            return Err(FlipnoteError::LayerOutOfRange {
                index: layer,
                count: layout.layer_count,
            });
        }
        let layers = self.decode_frame(index)?;
        let mut pixels = vec![0u8; layout.width * layout.height];
        draw_layer(&layout, layer, &layers[layer], &mut pixels, true);
        Ok(pixels)
    }

    /// [`layer_pixels`](Self::layer_pixels) resolved to `0xRRGGBBAA`;
    /// uninked pixels are transparent `0x00000000`
    fn layer_pixels_rgba(&mut self, index: usize, layer: usize) -> Result<Vec<u32>> {
        let palette: Vec<u32> = self.frame_palette(index)?.into_iter().map(pack_rgba).collect();
        Ok(self
            .layer_pixels(index, layer)?
            .into_iter()
            .map(|p| if p == 0 { 0 } else { palette[p as usize] })
            .collect())
    }
}

/// Copy the inked pixels of one layer buffer into a cropped output image
fn draw_layer(layout: &ImageLayout, layer: usize, src: &[u8], dst: &mut [u8], overwrite: bool) {
    let base = 1 + layer * layout.colors_per_layer;
    for (y, row) in dst.chunks_exact_mut(layout.width).enumerate() {
        let start = (y + layout.offset_y) * layout.src_width + layout.offset_x;
        for (out, &p) in row.iter_mut().zip(&src[start..start + layout.width]) {
            if p != 0 {
                *out = (base + p as usize - 1) as u8;
            } else if overwrite {
                *out = 0;
            }
        }
    }
}

impl FlipnoteDecoder for PpmDecoder {
    fn format(&self) -> FormatTag {
        FormatTag::Ppm
    }

    fn frame_count(&self) -> usize {
        PpmDecoder::frame_count(self)
    }

    fn frame_speed(&self) -> u8 {
        PpmDecoder::frame_speed(self)
    }

    fn framerate(&self) -> f64 {
        PpmDecoder::framerate(self)
    }

    fn duration(&self) -> f64 {
        PpmDecoder::duration(self)
    }

    fn thumb_frame_index(&self) -> usize {
        PpmDecoder::thumb_frame_index(self)
    }

    fn layer_visibility(&self) -> &[bool] {
        PpmDecoder::layer_visibility(self)
    }

    fn meta(&self) -> &NoteMeta {
        PpmDecoder::meta(self)
    }

    fn sound_meta(&self) -> &[AudioTrackInfo] {
        PpmDecoder::sound_meta(self)
    }

    fn image_layout(&self) -> ImageLayout {
        ImageLayout {
            src_width: ppm::PPM_WIDTH,
            src_height: ppm::PPM_HEIGHT,
            offset_x: 0,
            offset_y: 0,
            width: ppm::PPM_WIDTH,
            height: ppm::PPM_HEIGHT,
            layer_count: ppm::PPM_LAYER_COUNT,
            colors_per_layer: ppm::PPM_COLORS_PER_LAYER,
        }
    }

    fn global_palette(&self) -> &'static [[u8; 4]] {
        &ppm::PPM_PALETTE
    }

    fn sample_rate(&self) -> u32 {
        ppm::PPM_SAMPLE_RATE
    }

    fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]> {
        PpmDecoder::decode_frame(self, index)
    }

    fn frame_palette_indices(&self, index: usize) -> Result<Vec<usize>> {
        PpmDecoder::frame_palette_indices(self, index)
    }

    fn frame_layer_order(&self, index: usize) -> Result<Vec<usize>> {
        PpmDecoder::frame_layer_order(self, index)
    }

    fn has_audio_track(&self, track: AudioTrack) -> bool {
        PpmDecoder::has_audio_track(self, track)
    }

    fn decode_audio_track(&self, track: AudioTrack) -> Result<Vec<i16>> {
        PpmDecoder::decode_audio_track(self, track)
    }

    fn audio_track_pcm(&self, track: AudioTrack, dst_rate: u32) -> Result<Vec<i16>> {
        PpmDecoder::audio_track_pcm(self, track, dst_rate)
    }

    fn audio_master_pcm(&self, dst_rate: u32) -> Result<Vec<i16>> {
        PpmDecoder::audio_master_pcm(self, dst_rate)
    }

    fn body(&self) -> Result<&[u8]> {
        PpmDecoder::body(self)
    }

    fn signature(&self) -> Result<&[u8]> {
        PpmDecoder::signature(self)
    }
}

impl FlipnoteDecoder for KwzDecoder {
    fn format(&self) -> FormatTag {
        FormatTag::Kwz
    }

    fn frame_count(&self) -> usize {
        KwzDecoder::frame_count(self)
    }

    fn frame_speed(&self) -> u8 {
        KwzDecoder::frame_speed(self)
    }

    fn framerate(&self) -> f64 {
        KwzDecoder::framerate(self)
    }

    fn duration(&self) -> f64 {
        KwzDecoder::duration(self)
    }

    fn thumb_frame_index(&self) -> usize {
        KwzDecoder::thumb_frame_index(self)
    }

    fn layer_visibility(&self) -> &[bool] {
        KwzDecoder::layer_visibility(self)
    }

    fn meta(&self) -> &NoteMeta {
        KwzDecoder::meta(self)
    }

    fn sound_meta(&self) -> &[AudioTrackInfo] {
        KwzDecoder::sound_meta(self)
    }

    fn image_layout(&self) -> ImageLayout {
        let (width, height) = self.image_size();
        ImageLayout {
            src_width: kwz::KWZ_WIDTH,
            src_height: kwz::KWZ_HEIGHT,
            offset_x: 0,
            offset_y: 0,
            width,
            height,
            layer_count: kwz::KWZ_LAYER_COUNT,
            colors_per_layer: kwz::KWZ_COLORS_PER_LAYER,
        }
    }

    fn global_palette(&self) -> &'static [[u8; 4]] {
        &kwz::KWZ_PALETTE
    }

    fn sample_rate(&self) -> u32 {
        kwz::KWZ_SAMPLE_RATE
    }

    fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]> {
        KwzDecoder::decode_frame(self, index)
    }

    fn frame_palette_indices(&self, index: usize) -> Result<Vec<usize>> {
        KwzDecoder::frame_palette_indices(self, index)
    }

    fn frame_layer_order(&self, index: usize) -> Result<Vec<usize>> {
        KwzDecoder::frame_layer_order(self, index)
    }

    fn has_audio_track(&self, track: AudioTrack) -> bool {
        KwzDecoder::has_audio_track(self, track)
    }

    fn decode_audio_track(&self, track: AudioTrack) -> Result<Vec<i16>> {
        KwzDecoder::decode_audio_track(self, track)
    }

    fn audio_track_pcm(&self, track: AudioTrack, dst_rate: u32) -> Result<Vec<i16>> {
        KwzDecoder::audio_track_pcm(self, track, dst_rate)
    }

    fn audio_master_pcm(&self, dst_rate: u32) -> Result<Vec<i16>> {
        KwzDecoder::audio_master_pcm(self, dst_rate)
    }

    fn body(&self) -> Result<&[u8]> {
        KwzDecoder::body(self)
    }

    fn signature(&self) -> Result<&[u8]> {
        KwzDecoder::signature(self)
    }
}

/// Identify a file from its leading bytes without parsing it
///
/// `PARA` selects PPM; `KFH` or `KIC` (3 bytes) select KWZ.
pub fn detect_format(bytes: &[u8]) -> Option<FormatTag> {
    if bytes.starts_with(&ppm::PPM_MAGIC) {
        Some(FormatTag::Ppm)
    } else if bytes.starts_with(b"KFH") || bytes.starts_with(b"KIC") {
        Some(FormatTag::Kwz)
    } else {
        None
    }
}

/// A note of either format
#[derive(Debug)]
pub enum Flipnote {
    /// Flipnote Studio (DSi) note
    Ppm(PpmDecoder),
    /// Flipnote Studio 3D note
    Kwz(KwzDecoder),
}

impl Flipnote {
    /// Parse a note with default settings
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_settings(bytes, DecoderSettings::default())
    }

    /// Parse a note, picking the decoder from the leading bytes
    pub fn from_bytes_with_settings(bytes: Vec<u8>, settings: DecoderSettings) -> Result<Self> {
        match detect_format(&bytes) {
            Some(FormatTag::Ppm) => Ok(Flipnote::Ppm(PpmDecoder::new(bytes)?)),
            Some(FormatTag::Kwz) => Ok(Flipnote::Kwz(KwzDecoder::with_settings(bytes, settings)?)),
            None => {
                let mut magic = [0u8; 4];
                for (dst, &src) in magic.iter_mut().zip(&bytes) {
                    *dst = src;
                }
                log::debug!("unrecognized leading bytes {magic:02x?}");
                Err(FlipnoteError::UnrecognizedFormat(magic))
            }
        }
    }

    /// Read and parse a note from disk with default settings
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_settings(path, DecoderSettings::default())
    }

    /// Read and parse a note from disk
    pub fn open_with_settings<P: AsRef<Path>>(path: P, settings: DecoderSettings) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes_with_settings(bytes, settings)
    }

    /// The PPM decoder, if this is a PPM note
    pub fn as_ppm(&self) -> Option<&PpmDecoder> {
        match self {
            Flipnote::Ppm(ppm) => Some(ppm),
            Flipnote::Kwz(_) => None,
        }
    }

    /// The KWZ decoder, if this is a KWZ note
    pub fn as_kwz(&self) -> Option<&KwzDecoder> {
        match self {
            Flipnote::Kwz(kwz) => Some(kwz),
            Flipnote::Ppm(_) => None,
        }
    }

    fn inner(&self) -> &dyn FlipnoteDecoder {
        match self {
            Flipnote::Ppm(ppm) => ppm,
            Flipnote::Kwz(kwz) => kwz,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FlipnoteDecoder {
        match self {
            Flipnote::Ppm(ppm) => ppm,
            Flipnote::Kwz(kwz) => kwz,
        }
    }
}

impl FlipnoteDecoder for Flipnote {
    fn format(&self) -> FormatTag {
        self.inner().format()
    }

    fn frame_count(&self) -> usize {
        self.inner().frame_count()
    }

    fn frame_speed(&self) -> u8 {
        self.inner().frame_speed()
    }

    fn framerate(&self) -> f64 {
        self.inner().framerate()
    }

    fn duration(&self) -> f64 {
        self.inner().duration()
    }

    fn thumb_frame_index(&self) -> usize {
        self.inner().thumb_frame_index()
    }

    fn layer_visibility(&self) -> &[bool] {
        self.inner().layer_visibility()
    }

    fn meta(&self) -> &NoteMeta {
        self.inner().meta()
    }

    fn sound_meta(&self) -> &[AudioTrackInfo] {
        self.inner().sound_meta()
    }

    fn image_layout(&self) -> ImageLayout {
        self.inner().image_layout()
    }

    fn global_palette(&self) -> &'static [[u8; 4]] {
        self.inner().global_palette()
    }

    fn sample_rate(&self) -> u32 {
        self.inner().sample_rate()
    }

    fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]> {
        self.inner_mut().decode_frame(index)
    }

    fn frame_palette_indices(&self, index: usize) -> Result<Vec<usize>> {
        self.inner().frame_palette_indices(index)
    }

    fn frame_layer_order(&self, index: usize) -> Result<Vec<usize>> {
        self.inner().frame_layer_order(index)
    }

    fn has_audio_track(&self, track: AudioTrack) -> bool {
        self.inner().has_audio_track(track)
    }

    fn decode_audio_track(&self, track: AudioTrack) -> Result<Vec<i16>> {
        self.inner().decode_audio_track(track)
    }

    fn audio_track_pcm(&self, track: AudioTrack, dst_rate: u32) -> Result<Vec<i16>> {
        self.inner().audio_track_pcm(track, dst_rate)
    }

    fn audio_master_pcm(&self, dst_rate: u32) -> Result<Vec<i16>> {
        self.inner().audio_master_pcm(dst_rate)
    }

    fn body(&self) -> Result<&[u8]> {
        self.inner().body()
    }

    fn signature(&self) -> Result<&[u8]> {
        self.inner().signature()
    }
}

/// Document-level facts about a note, detached from its decoder
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSummary {
    /// Container format
    pub format: FormatTag,
    /// Number of frames
    pub frame_count: usize,
    /// Playback frames per second
    pub framerate: f64,
    /// Playback duration in seconds
    pub duration: f64,
    /// Index of the thumbnail frame
    pub thumb_frame_index: usize,
    /// Most recent author's name
    pub author: String,
    /// Most recent author's ID
    pub author_fsid: String,
    /// Tracks that carry audio data
    pub audio_tracks: Vec<AudioTrack>,
    /// Length of the signed body in bytes
    pub body_length: usize,
}

impl NoteSummary {
    /// Collect the summary of a parsed note
    pub fn from_decoder<D: FlipnoteDecoder + ?Sized>(decoder: &D) -> Result<Self> {
        let meta = decoder.meta();
        Ok(NoteSummary {
            format: decoder.format(),
            frame_count: decoder.frame_count(),
            framerate: decoder.framerate(),
            duration: decoder.duration(),
            thumb_frame_index: decoder.thumb_frame_index(),
            author: meta.current.username.clone(),
            author_fsid: meta.current.fsid.clone(),
            audio_tracks: AudioTrack::ALL
                .into_iter()
                .filter(|&track| decoder.has_audio_track(track))
                .collect(),
            body_length: decoder.body()?.len(),
        })
    }
}
