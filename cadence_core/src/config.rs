//! Render session configuration.

use crate::error::{Error, Result};
use crate::format::AudioFormat;
use crate::shape::WaveShape;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How generated audio is staged before it reaches the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferMode {
    /// Pre-render the whole session into a queue of chunks.
    Bulk,
    /// Regenerate a single chunk in place right before each transfer.
    #[default]
    Streaming,
}

/// How the scheduler learns that the sink has room again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeStrategy {
    /// Block on the sink's capacity signal.
    #[default]
    Event,
    /// Sleep for half a period, then query capacity.
    Polling,
}

/// Parametrisation of the generation cursor. Fixed for a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorKind {
    #[default]
    Phase,
    Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frequency: u32,
    pub shape: WaveShape,
    pub volume: f32,
    pub duration_secs: f64,
    pub latency_ms: u32,
    pub buffer_mode: BufferMode,
    pub wake: WakeStrategy,
    pub cursor: CursorKind,
    pub drain_silence: bool,
    pub wait_timeout_ms: Option<u64>,
    pub device: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frequency: 440,
            shape: WaveShape::Sine,
            volume: 0.5,
            duration_secs: 5.0,
            latency_ms: 50,
            buffer_mode: BufferMode::Streaming,
            wake: WakeStrategy::Event,
            cursor: CursorKind::Phase,
            drain_silence: true,
            wait_timeout_ms: None,
            device: None,
        }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_frequency(mut self, hz: u32) -> Self {
        self.frequency = hz;
        self
    }

    pub fn with_shape(mut self, shape: WaveShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_duration_secs(mut self, seconds: f64) -> Self {
        self.duration_secs = seconds;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u32) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_buffer_mode(mut self, mode: BufferMode) -> Self {
        self.buffer_mode = mode;
        self
    }

    pub fn with_wake(mut self, wake: WakeStrategy) -> Self {
        self.wake = wake;
        self
    }

    pub fn with_cursor(mut self, cursor: CursorKind) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_drain_silence(mut self, drain: bool) -> Self {
        self.drain_silence = drain;
        self
    }

    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }

    /// Short buffer, event-driven streaming.
    pub fn low_latency() -> Self {
        Self::new()
            .with_latency_ms(20)
            .with_buffer_mode(BufferMode::Streaming)
            .with_wake(WakeStrategy::Event)
    }

    /// Pre-rendered queue fed by a polling loop.
    pub fn bulk_reference() -> Self {
        Self::new()
            .with_latency_ms(50)
            .with_buffer_mode(BufferMode::Bulk)
            .with_wake(WakeStrategy::Polling)
    }

    /// Timeout for one event-driven wait. Defaults to two full buffers.
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(u64::from(self.latency_ms) * 2))
    }

    pub fn validate(&self) -> Result<()> {
        if self.frequency == 0 {
            return Err(Error::InvalidConfig("frequency must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::InvalidConfig(format!(
                "volume {} outside [0, 1]",
                self.volume
            )));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "duration {}s must be positive and finite",
                self.duration_secs
            )));
        }
        if self.latency_ms == 0 {
            return Err(Error::InvalidConfig("latency must be positive".into()));
        }
        if self.wait_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig("wait timeout must be positive".into()));
        }
        Ok(())
    }

    /// `validate` plus checks that need the negotiated format.
    pub fn validate_for(&self, format: &AudioFormat) -> Result<()> {
        self.validate()?;
        let nyquist = format.sample_rate / 2;
        if self.frequency >= nyquist {
            return Err(Error::InvalidConfig(format!(
                "frequency {}Hz is at or above the Nyquist limit ({}Hz) of {}",
                self.frequency, nyquist, format
            )));
        }
        Ok(())
    }

    pub fn total_frames(&self, format: &AudioFormat) -> u64 {
        format.frames_for_duration(self.duration_secs)
    }
}
