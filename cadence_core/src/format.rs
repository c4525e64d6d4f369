use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a single sample is encoded in the device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    Float32,
    Int16,
}

impl SampleEncoding {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Int16 => 2,
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => f.write_str("32-bit float"),
            Self::Int16 => f.write_str("16-bit PCM"),
        }
    }
}

/// The stream format a session generates for. Fixed once negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub encoding: SampleEncoding,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub fn new(encoding: SampleEncoding, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidConfig("channel count must be at least 1".into()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidConfig("sample rate must be positive".into()));
        }
        Ok(Self {
            encoding,
            channels,
            sample_rate,
        })
    }

    /// Bytes per sample-frame (`channels × bytes_per_sample`).
    #[inline]
    pub const fn frame_size(&self) -> usize {
        self.channels as usize * self.encoding.bytes_per_sample()
    }

    #[inline]
    pub const fn frames_to_bytes(&self, frames: u32) -> usize {
        frames as usize * self.frame_size()
    }

    /// Frame count for `bytes`, or `None` if `bytes` is not frame-aligned.
    pub fn bytes_to_frames(&self, bytes: usize) -> Option<u32> {
        let frame_size = self.frame_size();
        if bytes % frame_size != 0 {
            return None;
        }
        u32::try_from(bytes / frame_size).ok()
    }

    pub fn frames_for_duration(&self, seconds: f64) -> u64 {
        (self.sample_rate as f64 * seconds).round() as u64
    }

    pub fn frames_duration(&self, frames: u32) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch @ {}Hz, {}",
            self.channels, self.sample_rate, self.encoding
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_pcm() -> AudioFormat {
        AudioFormat::new(SampleEncoding::Int16, 2, 48_000).unwrap()
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(stereo_pcm().frame_size(), 4);
        let float = AudioFormat::new(SampleEncoding::Float32, 6, 44_100).unwrap();
        assert_eq!(float.frame_size(), 24);
    }

    #[test]
    fn test_bytes_to_frames_requires_alignment() {
        let format = stereo_pcm();
        assert_eq!(format.bytes_to_frames(4800), Some(1200));
        assert_eq!(format.bytes_to_frames(4802), None);
        assert_eq!(format.frames_to_bytes(1200), 4800);
    }

    #[test]
    fn test_frames_for_duration() {
        assert_eq!(stereo_pcm().frames_for_duration(5.0), 240_000);
        assert_eq!(stereo_pcm().frames_for_duration(0.0105), 504);
    }

    #[test]
    fn test_rejects_degenerate_formats() {
        assert!(AudioFormat::new(SampleEncoding::Int16, 0, 48_000).is_err());
        assert!(AudioFormat::new(SampleEncoding::Int16, 2, 0).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(stereo_pcm().to_string(), "2ch @ 48000Hz, 16-bit PCM");
    }
}
