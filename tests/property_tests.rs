//! Property-based tests for the Flipnote decoders
//!
//! These tests use randomized inputs to check that decoding never panics on
//! hostile data and that frame access order never changes the pixels.

mod common;

use common::*;
use flipnote::kwz::{decode_kwz_adpcm, decode_tiles, BitReader};
use flipnote::{parse_bytes, ByteStream, FlipnoteDecoder, KwzDecoder, PpmDecoder};
use proptest::prelude::*;

/// Decode everything a parsed note offers, ignoring errors
fn exercise(note: &mut dyn FlipnoteDecoder) {
    for index in 0..note.frame_count().min(4) {
        let _ = note.frame_pixels_rgba(index);
    }
    let _ = note.audio_master_pcm(8000);
}

proptest! {
    #[test]
    fn test_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        // Random data is almost never a valid note, but must only ever fail with an error
        if let Ok(mut note) = parse_bytes(data) {
            exercise(&mut note);
        }
    }
}

proptest! {
    #[test]
    fn test_magic_prefixed_garbage_never_panics(
        magic in prop::sample::select(vec![&b"PARA"[..], &b"KFH\x14"[..], &b"KIC\x00"[..]]),
        body in prop::collection::vec(any::<u8>(), 0..3000)
    ) {
        let mut data = magic.to_vec();
        data.extend(body);
        if let Ok(mut note) = parse_bytes(data) {
            exercise(&mut note);
        }
    }
}

proptest! {
    #[test]
    fn test_tile_stream_never_panics(data in prop::collection::vec(any::<u8>(), 0..4000)) {
        let mut stream = ByteStream::new(data);
        let mut bits = BitReader::new();
        let mut pixels = vec![0u8; KWZ_WIDTH * KWZ_HEIGHT];
        let _ = decode_tiles(&mut stream, &mut bits, &mut pixels);
        prop_assert!(pixels.iter().all(|&p| p < 3));
    }
}

proptest! {
    #[test]
    fn test_kwz_adpcm_stays_in_range(
        adpcm in prop::collection::vec(any::<u8>(), 0..500),
        predictor in -5000i32..5000,
        step_index in -10i32..100
    ) {
        let pcm = decode_kwz_adpcm(&adpcm, predictor, step_index);
        // each byte yields two to four samples
        prop_assert!(pcm.len() >= adpcm.len() * 2);
        prop_assert!(pcm.len() <= adpcm.len() * 4);
        prop_assert!(pcm.iter().all(|&s| (-2048 * 16..=2047 * 16).contains(&(s as i32))));
    }
}

fn ppm_frames() -> impl Strategy<Value = Vec<(bool, Vec<(usize, usize)>, Vec<(usize, usize)>)>> {
    let points = prop::collection::vec((0..PPM_WIDTH, 0..PPM_HEIGHT), 0..12);
    prop::collection::vec((any::<bool>(), points.clone(), points), 1..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_ppm_random_access_matches_sequential(frames in ppm_frames()) {
        let mut builder = PpmBuilder::new();
        builder.frames = frames
            .iter()
            .map(|(key, a, b)| {
                let layers = [ppm_layer(a), ppm_layer(b)];
                if *key { PpmFrame::key(layers) } else { PpmFrame::diff(layers) }
            })
            .collect();
        let bytes = builder.build();

        let mut sequential = PpmDecoder::new(bytes.clone()).unwrap();
        let expected: Vec<Vec<Vec<u8>>> = (0..frames.len())
            .map(|i| sequential.decode_frame(i).unwrap().to_vec())
            .collect();

        let mut backwards = PpmDecoder::new(bytes).unwrap();
        for i in (0..frames.len()).rev() {
            prop_assert_eq!(backwards.decode_frame(i).unwrap(), &expected[i][..]);
        }
    }
}

fn kwz_frames() -> impl Strategy<Value = Vec<(u32, [Vec<(usize, usize, u8)>; 3])>> {
    let points = prop::collection::vec((0..KWZ_WIDTH, 0..KWZ_HEIGHT, 1u8..3), 0..8);
    let layers = (points.clone(), points.clone(), points).prop_map(|(a, b, c)| [a, b, c]);
    prop::collection::vec((0u32..8, layers), 1..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_kwz_random_access_matches_sequential(frames in kwz_frames()) {
        let mut builder = KwzBuilder::new();
        builder.frames = frames
            .iter()
            .map(|(diff, points)| {
                let mut frame = KwzFrame::diff(points.clone().map(|p| kwz_layer(&p)));
                frame.flags |= diff << 4;
                frame
            })
            .collect();
        let bytes = builder.build();

        let mut sequential = KwzDecoder::new(bytes.clone()).unwrap();
        let expected: Vec<Vec<Vec<u8>>> = (0..frames.len())
            .map(|i| sequential.decode_frame(i).unwrap().to_vec())
            .collect();

        let mut backwards = KwzDecoder::new(bytes).unwrap();
        for i in (0..frames.len()).rev() {
            prop_assert_eq!(backwards.decode_frame(i).unwrap(), &expected[i][..]);
        }
        prop_assert!(expected.iter().flatten().flatten().all(|&p| p < 3));
    }
}

proptest! {
    #[test]
    fn test_master_length_follows_duration(
        frame_count in 1usize..8,
        frame_speed in 1u8..9,
        rate in 4000u32..48000
    ) {
        let mut builder = PpmBuilder::new();
        builder.frames = vec![PpmFrame::key([ppm_blank(), ppm_blank()]); frame_count];
        builder.frame_speed = frame_speed;
        builder.tracks[0] = vec![0x3C; 64];
        let note = PpmDecoder::new(builder.build()).unwrap();

        let master = note.audio_master_pcm(rate).unwrap();
        prop_assert_eq!(master.len(), (note.duration() * rate as f64).ceil() as usize);
    }
}
