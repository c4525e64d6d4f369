use cadence_core::CursorKind;
use std::f64::consts::TAU;

/// Running position in the waveform.
///
/// Both forms advance by exactly one frame per generated sample-frame and never
/// wrap, so the stream stays phase-continuous across chunk boundaries as long as
/// the same cursor is threaded through every fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerationCursor {
    /// Accumulated phase angle in radians; advances by `2π·f / R` per frame.
    Phase { angle: f64 },
    /// Elapsed time, kept as a frame count so `t = frames / R` stays exact.
    Time { frames: u64 },
}

impl GenerationCursor {
    pub fn new(kind: CursorKind) -> Self {
        match kind {
            CursorKind::Phase => Self::Phase { angle: 0.0 },
            CursorKind::Time => Self::Time { frames: 0 },
        }
    }

    pub fn kind(&self) -> CursorKind {
        match self {
            Self::Phase { .. } => CursorKind::Phase,
            Self::Time { .. } => CursorKind::Time,
        }
    }

    /// Cycles elapsed (`f·t`) at the current position.
    #[inline]
    pub fn cycles(&self, frequency: f64, sample_rate: f64) -> f64 {
        match *self {
            Self::Phase { angle } => angle / TAU,
            Self::Time { frames } => frequency * (frames as f64 / sample_rate),
        }
    }

    #[inline]
    pub fn advance(&mut self, frequency: f64, sample_rate: f64) {
        match self {
            Self::Phase { angle } => *angle += TAU * frequency / sample_rate,
            Self::Time { frames } => *frames += 1,
        }
    }

    /// Seconds of audio the cursor has moved past.
    pub fn elapsed_secs(&self, frequency: f64, sample_rate: f64) -> f64 {
        match *self {
            Self::Phase { angle } => angle / (TAU * frequency),
            Self::Time { frames } => frames as f64 / sample_rate,
        }
    }
}
