//! KWZ audio: adaptive 2/4-bit ADPCM tracks
//!
//! The `KSN` section holds the BGM speed, five track sizes and a CRC, then
//! the BGM and SE1..SE4 tracks back to back.

use super::{KwzDecoder, KWZ_AUDIO_TRACKS, KWZ_FRAMERATES, KWZ_RAW_SAMPLE_RATE};
use crate::audio::{
    pcm_clipping_ratio, pcm_mix, pcm_resample_linear, pcm_resample_with, pcm_rms,
    ADPCM_INDEX_TABLE_2BIT, ADPCM_INDEX_TABLE_4BIT, ADPCM_SAMPLE_TABLE_2BIT,
    ADPCM_SAMPLE_TABLE_4BIT,
};
use crate::common::{ensure_input, AudioTrack, AudioTrackInfo};
use crate::Result;

/// Size of the `KSN` header after the section header: speed, 5 sizes, CRC
const KSN_HEADER_SIZE: usize = 28;

const PREDICTOR_MIN: i32 = -2048;
const PREDICTOR_MAX: i32 = 2047;
const STEP_INDEX_MAX: i32 = 79;

/// Highest step index tried when guessing a DSi Library note's BGM state
pub const DSI_STEP_INDEX_SEARCH_MAX: i32 = 40;

/// Decode a KWZ ADPCM track from the given initial state
///
/// Each byte is consumed low bits first. A 2-bit sample is read while the
/// step index is below 18 or when fewer than 4 bits of the byte remain;
/// otherwise a 4-bit sample is read. Output is the 12-bit predictor scaled
/// to 16 bits.
pub fn decode_kwz_adpcm(adpcm: &[u8], initial_predictor: i32, initial_step_index: i32) -> Vec<i16> {
    let mut predictor = initial_predictor.clamp(PREDICTOR_MIN, PREDICTOR_MAX);
    let mut step_index = initial_step_index.clamp(0, STEP_INDEX_MAX);
    let mut output = Vec::with_capacity(adpcm.len() * 3);

    for &byte in adpcm {
        let mut byte = byte as usize;
        let mut bit_pos = 0;
        while bit_pos < 8 {
            let diff = if step_index < 18 || bit_pos > 4 {
                let sample = byte & 0x3;
                let diff = ADPCM_SAMPLE_TABLE_2BIT[sample + 4 * step_index as usize];
                step_index += ADPCM_INDEX_TABLE_2BIT[sample] as i32;
                byte >>= 2;
                bit_pos += 2;
                diff
            } else {
                let sample = byte & 0xF;
                let diff = ADPCM_SAMPLE_TABLE_4BIT[sample + 16 * step_index as usize];
                step_index += ADPCM_INDEX_TABLE_4BIT[sample] as i32;
                byte >>= 4;
                bit_pos += 4;
                diff
            };
            predictor = (predictor + diff).clamp(PREDICTOR_MIN, PREDICTOR_MAX);
            step_index = step_index.clamp(0, STEP_INDEX_MAX);
            output.push((predictor * 16) as i16);
        }
    }
    output
}

/// Step index in `0..=DSI_STEP_INDEX_SEARCH_MAX` whose decode has the lowest
/// RMS; ties keep the smaller index
pub fn guess_initial_step_index(adpcm: &[u8], predictor: i32) -> i32 {
    let mut best_index = 0;
    let mut best_rms = f64::INFINITY;
    for step_index in 0..=DSI_STEP_INDEX_SEARCH_MAX {
        let rms = pcm_rms(&decode_kwz_adpcm(adpcm, predictor, step_index));
        if rms < best_rms {
            best_index = step_index;
            best_rms = rms;
        }
    }
    best_index
}

impl KwzDecoder {
    pub(super) fn read_sound_header(&mut self) -> Result<()> {
        let ksn = self.sections.require(b"KSN")?;
        self.stream.seek_to(ksn.payload_offset())?;
        let bgm_speed = self.stream.read_u32()? as usize;
        ensure_input!(
            bgm_speed < KWZ_FRAMERATES.len(),
            "invalid BGM speed {bgm_speed}"
        );
        self.bgm_speed = bgm_speed as u8;
        self.bgm_framerate = KWZ_FRAMERATES[bgm_speed];

        let mut offset = ksn.payload_offset() + KSN_HEADER_SIZE;
        for info in self.sound_meta.iter_mut() {
            let length = self.stream.read_u32()? as usize;
            *info = AudioTrackInfo { offset, length };
            offset += length;
        }
        ensure_input!(
            offset <= ksn.end(),
            "audio tracks end at {offset:#x}, past the end of KSN at {:#x}",
            ksn.end()
        );
        Ok(())
    }

    /// Whether the note carries data for `track`
    pub fn has_audio_track(&self, track: AudioTrack) -> bool {
        track.index() < KWZ_AUDIO_TRACKS && self.sound_meta[track.index()].length > 0
    }

    /// Initial `(predictor, step_index)` for decoding `track`
    ///
    /// Explicit settings win. Otherwise DSi Library notes get their BGM step
    /// index from [`guess_initial_step_index`], and everything else starts
    /// from zero.
    pub fn initial_adpcm_state(&self, track: AudioTrack) -> Result<(i32, i32)> {
        let settings = &self.settings;
        match track {
            AudioTrack::Bgm => {
                let predictor = settings.initial_bgm_predictor.unwrap_or(0);
                if let Some(step_index) = settings.initial_bgm_step_index {
                    return Ok((predictor, step_index));
                }
                if !self.is_dsi_library_note {
                    return Ok((predictor, 0));
                }
                let info = self.sound_meta[track.index()];
                let adpcm = self.stream.slice(info.offset, info.length)?;
                let step_index = guess_initial_step_index(adpcm, predictor);
                log::debug!("KWZ: guessed DSi BGM initial step index {step_index}");
                Ok((predictor, step_index))
            }
            se => {
                let slot = se.index() - 1;
                Ok((
                    settings.initial_se_predictors[slot].unwrap_or(0),
                    settings.initial_se_step_indices[slot].unwrap_or(0),
                ))
            }
        }
    }

    /// Decode a track to PCM at its raw 16364 Hz sample rate
    pub fn decode_audio_track(&self, track: AudioTrack) -> Result<Vec<i16>> {
        let info = self.sound_meta[track.index()];
        let adpcm = self.stream.slice(info.offset, info.length)?;
        let (predictor, step_index) = self.initial_adpcm_state(track)?;
        Ok(decode_kwz_adpcm(adpcm, predictor, step_index))
    }

    /// Decode a track and resample it to `dst_rate` with linear interpolation
    ///
    /// BGM is recorded at the BGM speed, so its source rate is scaled by
    /// `framerate / bgm_framerate` first.
    pub fn audio_track_pcm(&self, track: AudioTrack, dst_rate: u32) -> Result<Vec<i16>> {
        let src = self.decode_audio_track(track)?;
        let mut src_rate = KWZ_RAW_SAMPLE_RATE as f64;
        if track == AudioTrack::Bgm {
            src_rate *= (1.0 / self.bgm_framerate) / (1.0 / self.framerate);
        }
        Ok(pcm_resample_with(
            src,
            src_rate,
            dst_rate as f64,
            pcm_resample_linear,
        ))
    }

    /// Mix BGM and every triggered sound effect into one track
    ///
    /// The output holds exactly `ceil(duration * dst_rate)` samples.
    pub fn audio_master_pcm(&self, dst_rate: u32) -> Result<Vec<i16>> {
        let master_len = (self.duration() * dst_rate as f64).ceil() as usize;
        let mut master = vec![0i16; master_len];

        if self.has_audio_track(AudioTrack::Bgm) {
            let bgm = self.audio_track_pcm(AudioTrack::Bgm, dst_rate)?;
            pcm_mix(&bgm, &mut master, 0);
        }

        let mut effects = Vec::with_capacity(AudioTrack::SOUND_EFFECTS.len());
        for track in AudioTrack::SOUND_EFFECTS {
            effects.push(if self.has_audio_track(track) {
                Some(self.audio_track_pcm(track, dst_rate)?)
            } else {
                None
            });
        }

        if effects.iter().any(Option::is_some) {
            let samples_per_frame = dst_rate as f64 / self.framerate;
            for frame in 0..self.frame_count {
                let offset = (frame as f64 * samples_per_frame).ceil() as usize;
                let flags = self.frame_sound_effect_flags(frame)?;
                for (pcm, used) in effects.iter().zip(flags) {
                    if let (Some(pcm), true) = (pcm, used) {
                        pcm_mix(pcm, &mut master, offset);
                    }
                }
            }
        }

        log::debug!(
            "KWZ master audio: {} samples at {dst_rate} Hz, clipping ratio {:.4}",
            master.len(),
            pcm_clipping_ratio(&master)
        );
        Ok(master)
    }
}
