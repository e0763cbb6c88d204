//! PPM audio: 4-bit IMA ADPCM tracks and sound effect flags

use super::{PpmDecoder, ANIMATION_HEADER_OFFSET, PPM_AUDIO_TRACKS, PPM_RAW_SAMPLE_RATE};
use crate::audio::{
    ima_diff, pcm_clipping_ratio, pcm_mix, pcm_resample_nearest, pcm_resample_with,
    ADPCM_INDEX_TABLE_4BIT, ADPCM_STEP_TABLE,
};
use crate::common::AudioTrack;
use crate::{FlipnoteError, Result};

/// Running IMA ADPCM decoder state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ImaState {
    pub predictor: i32,
    pub step_index: i32,
}

impl ImaState {
    /// Decode one nibble and return the new sample
    #[inline]
    pub fn next_sample(&mut self, nibble: u8) -> i16 {
        let step = ADPCM_STEP_TABLE[self.step_index as usize] as i32;
        let diff = ima_diff(step, nibble);
        self.predictor = (self.predictor + diff).clamp(i16::MIN as i32, i16::MAX as i32);
        self.step_index =
            (self.step_index + ADPCM_INDEX_TABLE_4BIT[nibble as usize] as i32).clamp(0, 88);
        self.predictor as i16
    }
}

/// Decode a 4-bit IMA ADPCM byte stream, low nibble first
pub(crate) fn decode_ima_adpcm(adpcm: &[u8]) -> Vec<i16> {
    let mut state = ImaState::default();
    let mut output = Vec::with_capacity(adpcm.len() * 2);
    for &byte in adpcm {
        output.push(state.next_sample(byte & 0xF));
        output.push(state.next_sample(byte >> 4));
    }
    output
}

impl PpmDecoder {
    fn track_slot(&self, track: AudioTrack) -> Result<usize> {
        match track.index() {
            slot if slot < PPM_AUDIO_TRACKS => Ok(slot),
            _ => Err(FlipnoteError::UnknownAudioTrack(track)),
        }
    }

    /// Whether the note carries data for `track`
    pub fn has_audio_track(&self, track: AudioTrack) -> bool {
        self.track_slot(track)
            .map(|slot| self.sound_meta[slot].length > 0)
            .unwrap_or(false)
    }

    /// Per-frame sound effect usage: `[SE1, SE2, SE3]`
    pub fn sound_effect_flags(&self) -> Result<Vec<[bool; 3]>> {
        let flags = self.stream.slice(
            ANIMATION_HEADER_OFFSET + self.frame_data_length,
            self.frame_count,
        )?;
        Ok(flags
            .iter()
            .map(|&byte| [byte & 0x1 != 0, byte & 0x2 != 0, byte & 0x4 != 0])
            .collect())
    }

    /// Decode a track to PCM at its raw 8192 Hz sample rate
    pub fn decode_audio_track(&self, track: AudioTrack) -> Result<Vec<i16>> {
        let info = self.sound_meta[self.track_slot(track)?];
        let adpcm = self.stream.slice(info.offset, info.length)?;
        Ok(decode_ima_adpcm(adpcm))
    }

    /// Decode a track and resample it to `dst_rate`
    ///
    /// BGM is recorded at the BGM speed, so its source rate is scaled by
    /// `framerate / bgm_framerate` before resampling.
    pub fn audio_track_pcm(&self, track: AudioTrack, dst_rate: u32) -> Result<Vec<i16>> {
        let src = self.decode_audio_track(track)?;
        let mut src_rate = PPM_RAW_SAMPLE_RATE as f64;
        if track == AudioTrack::Bgm {
            let bgm_adjust = (1.0 / self.bgm_framerate) / (1.0 / self.framerate);
            src_rate *= bgm_adjust;
        }
        Ok(pcm_resample_with(
            src,
            src_rate,
            dst_rate as f64,
            pcm_resample_nearest,
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

        let effects = [AudioTrack::Se1, AudioTrack::Se2, AudioTrack::Se3];
        let effect_pcm = effects
            .iter()
            .map(|&track| {
                if self.has_audio_track(track) {
                    self.audio_track_pcm(track, dst_rate).map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        if effect_pcm.iter().any(Option::is_some) {
            let samples_per_frame = dst_rate as f64 / self.framerate;
            for (frame, flags) in self.sound_effect_flags()?.iter().enumerate() {
                let offset = (frame as f64 * samples_per_frame).ceil() as usize;
                for (pcm, &used) in effect_pcm.iter().zip(flags) {
                    if let (Some(pcm), true) = (pcm, used) {
                        pcm_mix(pcm, &mut master, offset);
                    }
                }
            }
        }

        log::debug!(
            "PPM master audio: {} samples at {dst_rate} Hz, clipping ratio {:.4}",
            master.len(),
            pcm_clipping_ratio(&master)
        );
        Ok(master)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_nibble_from_initial_state() {
        let mut state = ImaState::default();
        assert_eq!(state.next_sample(0b0000), 0);
        assert_eq!(state.step_index, 0);
        assert_eq!(state.predictor, 0);
    }

    #[test]
    fn test_nibble_order_and_step_growth() {
        // low nibble 0x7 first: step 7 -> 0 + 7 + 3 + 1 = 11, index +8
        let pcm = decode_ima_adpcm(&[0x07]);
        assert_eq!(pcm[0], 11);
        // high nibble 0 at step index 8 (step 16): diff 2
        assert_eq!(pcm[1], 13);
    }

    #[test]
    fn test_predictor_clamps() {
        let mut state = ImaState {
            predictor: 32760,
            step_index: 88,
        };
        assert_eq!(state.next_sample(0x7), i16::MAX);
        assert_eq!(state.step_index, 88);
        let mut state = ImaState {
            predictor: -32760,
            step_index: 88,
        };
        assert_eq!(state.next_sample(0xF), i16::MIN);
    }
}
