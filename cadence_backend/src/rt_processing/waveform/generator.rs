use super::cursor::GenerationCursor;
use super::shapes;
use cadence_core::{AudioFormat, CursorKind, SampleEncoding, WaveShape};

/// Encodes one amplitude value into the bytes of a single sample.
pub type SampleWriter = fn(f64, &mut [u8]);

fn write_f32(value: f64, out: &mut [u8]) {
    out.copy_from_slice(&(value as f32).to_ne_bytes());
}

fn write_i16(value: f64, out: &mut [u8]) {
    let quantized = (value * i16::MAX as f64).round() as i16;
    out.copy_from_slice(&quantized.to_ne_bytes());
}

/// Picks the per-sample encoder once, after format negotiation.
pub fn writer_for(encoding: SampleEncoding) -> SampleWriter {
    match encoding {
        SampleEncoding::Float32 => write_f32,
        SampleEncoding::Int16 => write_i16,
    }
}

/// Monophonic tone generator writing straight into device-format byte buffers.
pub struct ToneGenerator {
    shape: WaveShape,
    frequency: f64,
    volume: f64,
    format: AudioFormat,
    cursor: GenerationCursor,
    writer: SampleWriter,
}

impl ToneGenerator {
    /// `frequency` must be positive and `volume` within `[0, 1]`; callers
    /// validate this upstream through `RenderConfig`.
    pub fn new(shape: WaveShape, frequency: f64, format: AudioFormat) -> Self {
        Self {
            shape,
            frequency,
            volume: 1.0,
            format,
            cursor: GenerationCursor::new(CursorKind::Phase),
            writer: writer_for(format.encoding),
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_cursor(mut self, kind: CursorKind) -> Self {
        self.cursor = GenerationCursor::new(kind);
        self
    }

    pub fn shape(&self) -> WaveShape {
        self.shape
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn cursor(&self) -> &GenerationCursor {
        &self.cursor
    }

    /// Amplitude at the cursor, before encoding.
    #[inline]
    pub fn current_value(&self) -> f64 {
        let cycles = self
            .cursor
            .cycles(self.frequency, self.format.sample_rate as f64);
        self.volume * shapes::evaluate(self.shape, cycles)
    }

    /// Fill `chunk` with `chunk.len() / frame_size` frames, each channel of a
    /// frame carrying the same value. Returns the number of frames written.
    pub fn fill(&mut self, chunk: &mut [u8]) -> usize {
        let frame_size = self.format.frame_size();
        let sample_size = self.format.encoding.bytes_per_sample();
        let sample_rate = self.format.sample_rate as f64;
        debug_assert_eq!(chunk.len() % frame_size, 0, "chunk is not frame-aligned");

        let mut frames = 0;
        for frame in chunk.chunks_exact_mut(frame_size) {
            let value = self.current_value();
            for sample in frame.chunks_exact_mut(sample_size) {
                (self.writer)(value, sample);
            }
            self.cursor.advance(self.frequency, sample_rate);
            frames += 1;
        }
        frames
    }
}
