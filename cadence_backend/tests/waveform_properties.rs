use cadence_backend::rt_processing::waveform::ToneGenerator;
use cadence_core::{AudioFormat, CursorKind, SampleEncoding, WaveShape};
use proptest::prelude::*;

fn shape() -> impl Strategy<Value = WaveShape> {
    prop::sample::select(WaveShape::ALL.to_vec())
}

fn cursor() -> impl Strategy<Value = CursorKind> {
    prop_oneof![Just(CursorKind::Phase), Just(CursorKind::Time)]
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|quad| f32::from_ne_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect()
}

proptest! {
    #[test]
    fn amplitude_never_exceeds_volume(
        shape in shape(),
        cursor in cursor(),
        frequency in 1u32..24_000,
        volume in 0.0f64..=1.0,
        frames in 1usize..2_048,
    ) {
        let format = AudioFormat::new(SampleEncoding::Float32, 2, 48_000).unwrap();
        let mut generator = ToneGenerator::new(shape, f64::from(frequency), format)
            .with_volume(volume)
            .with_cursor(cursor);
        let mut chunk = vec![0u8; frames * format.frame_size()];
        prop_assert_eq!(generator.fill(&mut chunk), frames);

        for sample in floats(&chunk) {
            prop_assert!(f64::from(sample.abs()) <= volume + 1e-6, "{} > {}", sample, volume);
        }
    }

    #[test]
    fn pcm16_stays_within_scaled_range(
        shape in shape(),
        frequency in 1u32..22_050,
        volume in 0.0f64..=1.0,
    ) {
        let format = AudioFormat::new(SampleEncoding::Int16, 1, 44_100).unwrap();
        let mut generator = ToneGenerator::new(shape, f64::from(frequency), format).with_volume(volume);
        let mut chunk = vec![0u8; 1_024 * format.frame_size()];
        generator.fill(&mut chunk);

        let limit = (volume * f64::from(i16::MAX)).round() as i32;
        for pair in chunk.chunks_exact(2) {
            let sample = i32::from(i16::from_ne_bytes([pair[0], pair[1]]));
            prop_assert!(sample.abs() <= limit);
        }
    }

    #[test]
    fn chunk_boundaries_do_not_affect_output(
        shape in shape(),
        cursor in cursor(),
        frequency in 20u32..2_000,
        split in 0usize..=960,
    ) {
        let format = AudioFormat::new(SampleEncoding::Float32, 2, 48_000).unwrap();
        let make = || ToneGenerator::new(shape, f64::from(frequency), format).with_cursor(cursor);

        let mut whole = vec![0u8; 960 * format.frame_size()];
        make().fill(&mut whole);

        let mut pieces = vec![0u8; whole.len()];
        let mut generator = make();
        let (head, tail) = pieces.split_at_mut(split * format.frame_size());
        generator.fill(head);
        generator.fill(tail);

        prop_assert_eq!(whole, pieces);
    }
}
