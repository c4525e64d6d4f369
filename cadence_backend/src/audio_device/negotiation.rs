use crate::audio_device::enumeration::DeviceInfo;
use cadence_core::{AudioFormat, Error, RenderConfig, SampleEncoding, SinkOp};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use std::fmt;
use thiserror::Error;

/// What the session asks of the device. Rate, channel count and sample
/// format always follow the device's mix format; only the latency is chosen.
#[derive(Debug, Clone)]
pub struct FormatRequest {
    pub latency_ms: u32,
}

impl FormatRequest {
    pub fn new() -> Self {
        Self { latency_ms: 50 }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new().with_latency_ms(config.latency_ms)
    }

    pub fn with_latency_ms(mut self, latency_ms: u32) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

impl Default for FormatRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct NegotiatedConfig {
    pub format: AudioFormat,
    pub sample_format: SampleFormat,
    pub stream_config: StreamConfig,
    /// Frames the output ring holds.
    pub buffer_frames: u32,
    /// Frames per device period; a quarter of the buffer.
    pub period_frames: u32,
}

impl NegotiatedConfig {
    pub fn latency_ms(&self) -> f32 {
        ConfigNegotiator::calculate_latency_ms(self.format.sample_rate, self.buffer_frames)
    }
}

impl fmt::Display for NegotiatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, buffer: {} frames ({:.1}ms), period: {} frames",
            self.format,
            self.buffer_frames,
            self.latency_ms(),
            self.period_frames
        )
    }
}

#[derive(Error, Debug, Clone)]
pub enum NegotiationError {
    #[error("No 32-bit float or 16-bit PCM output. Available: {available:?}")]
    FormatNotSupported { available: Vec<SampleFormat> },

    #[error("Latency of {latency_ms}ms is shorter than one frame at {sample_rate}Hz")]
    LatencyTooShort { latency_ms: u32, sample_rate: u32 },
}

impl From<NegotiationError> for Error {
    fn from(err: NegotiationError) -> Self {
        match err {
            NegotiationError::FormatNotSupported { .. } => Error::UnsupportedFormat(err.to_string()),
            other => Error::device(SinkOp::Negotiate, other),
        }
    }
}

pub type NegotiationResult<T> = std::result::Result<T, NegotiationError>;

pub struct ConfigNegotiator;

impl ConfigNegotiator {
    pub fn negotiate(
        device_info: &DeviceInfo,
        request: &FormatRequest,
    ) -> NegotiationResult<NegotiatedConfig> {
        // the mix format avoids resampling in shared-mode hosts
        let sample_rate = device_info.default_sample_rate;
        let channels = device_info.default_channels;
        let sample_format = Self::negotiate_sample_format(device_info)?;
        let (buffer_frames, period_frames) = Self::negotiate_buffer_frames(device_info, sample_rate, request.latency_ms)?;

        // negotiate_sample_format only ever yields F32 or I16
        let encoding = Self::encoding_for(sample_format).ok_or_else(|| NegotiationError::FormatNotSupported {
            available: device_info.supported_sample_formats.clone(),
        })?;
        let format = AudioFormat {
            encoding,
            channels,
            sample_rate,
        };

        let buffer_size = match device_info.buffer_size_range {
            Some(_) => BufferSize::Fixed(period_frames),
            None => BufferSize::Default,
        };
        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size,
        };

        Ok(NegotiatedConfig {
            format,
            sample_format,
            stream_config,
            buffer_frames,
            period_frames,
        })
    }

    /// The device default when it is F32 or I16, otherwise F32, then I16.
    fn negotiate_sample_format(device_info: &DeviceInfo) -> NegotiationResult<SampleFormat> {
        let supported = &device_info.supported_sample_formats;

        if Self::encoding_for(device_info.default_sample_format).is_some() {
            return Ok(device_info.default_sample_format);
        }

        [SampleFormat::F32, SampleFormat::I16]
            .into_iter()
            .find(|format| supported.contains(format))
            .ok_or_else(|| NegotiationError::FormatNotSupported {
                available: supported.clone(),
            })
    }

    /// Ring length from the requested latency, clamped to what the device
    /// accepts per callback; the period is a quarter of it.
    fn negotiate_buffer_frames(
        device_info: &DeviceInfo,
        sample_rate: u32,
        latency_ms: u32,
    ) -> NegotiationResult<(u32, u32)> {
        let (mut buffer_frames, mut period_frames) = Self::buffer_frames_for_latency(sample_rate, latency_ms);
        if buffer_frames == 0 {
            return Err(NegotiationError::LatencyTooShort {
                latency_ms,
                sample_rate,
            });
        }

        if let Some((min, max)) = device_info.buffer_size_range {
            let clamped = period_frames.clamp(min.max(1), max.max(min).max(1));
            if clamped != period_frames {
                tracing::debug!(requested = period_frames, clamped, "period clamped to device range");
                period_frames = clamped;
                buffer_frames = buffer_frames.max(period_frames * 4);
            }
        }
        Ok((buffer_frames, period_frames))
    }

    /// `(buffer, period)` in frames for a latency request.
    pub fn buffer_frames_for_latency(sample_rate: u32, latency_ms: u32) -> (u32, u32) {
        let buffer = (u64::from(sample_rate) * u64::from(latency_ms) / 1000) as u32;
        let period = (buffer / 4).max(1).min(buffer);
        (buffer, period)
    }

    pub fn encoding_for(format: SampleFormat) -> Option<SampleEncoding> {
        match format {
            SampleFormat::F32 => Some(SampleEncoding::Float32),
            SampleFormat::I16 => Some(SampleEncoding::Int16),
            _ => None,
        }
    }

    pub fn calculate_latency_ms(sample_rate: u32, buffer_size: u32) -> f32 {
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(default_format: SampleFormat, formats: Vec<SampleFormat>) -> DeviceInfo {
        DeviceInfo {
            name: "Test Output".to_string(),
            host_id: cpal::ALL_HOSTS[0],
            is_default: true,
            supported_sample_rates: vec![44100, 48000, 96000],
            min_sample_rate: 44100,
            max_sample_rate: 96000,
            default_sample_rate: 48000,
            supported_channels: vec![2],
            max_channels: 2,
            default_channels: 2,
            supported_sample_formats: formats,
            default_sample_format: default_format,
            buffer_size_range: None,
            device_index: 0,
        }
    }

    #[test]
    fn test_default_request_uses_mix_format() {
        let info = device(SampleFormat::I16, vec![SampleFormat::I16, SampleFormat::F32]);
        let negotiated = ConfigNegotiator::negotiate(&info, &FormatRequest::new()).unwrap();

        assert_eq!(negotiated.format.encoding, SampleEncoding::Int16);
        assert_eq!(negotiated.format.channels, 2);
        assert_eq!(negotiated.format.sample_rate, 48000);
        assert_eq!(negotiated.buffer_frames, 2400);
        assert_eq!(negotiated.period_frames, 600);
        assert_eq!(negotiated.stream_config.buffer_size, BufferSize::Default);
    }

    #[test]
    fn test_unusable_default_falls_back_to_float() {
        let info = device(SampleFormat::I32, vec![SampleFormat::I32, SampleFormat::I16, SampleFormat::F32]);
        let negotiated = ConfigNegotiator::negotiate(&info, &FormatRequest::new()).unwrap();
        assert_eq!(negotiated.sample_format, SampleFormat::F32);
    }

    #[test]
    fn test_unsupported_format_maps_to_error() {
        let info = device(SampleFormat::U8, vec![SampleFormat::U8, SampleFormat::I32]);
        let err = ConfigNegotiator::negotiate(&info, &FormatRequest::new()).unwrap_err();
        assert!(matches!(err, NegotiationError::FormatNotSupported { .. }));
        assert!(matches!(Error::from(err), Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_rate_and_channels_follow_device_default() {
        let mut info = device(SampleFormat::F32, vec![SampleFormat::F32]);
        info.default_sample_rate = 44100;
        info.default_channels = 1;
        let negotiated = ConfigNegotiator::negotiate(&info, &FormatRequest::new()).unwrap();

        assert_eq!(negotiated.format.sample_rate, 44100);
        assert_eq!(negotiated.format.channels, 1);
        assert_eq!(negotiated.stream_config.sample_rate, SampleRate(44100));
        assert_eq!(negotiated.buffer_frames, 2205);
    }

    #[test]
    fn test_period_clamped_to_device_range() {
        let mut info = device(SampleFormat::F32, vec![SampleFormat::F32]);
        info.buffer_size_range = Some((256, 4096));
        let request = FormatRequest::new().with_latency_ms(10);
        let negotiated = ConfigNegotiator::negotiate(&info, &request).unwrap();

        assert_eq!(negotiated.period_frames, 256);
        assert_eq!(negotiated.buffer_frames, 1024);
        assert_eq!(negotiated.stream_config.buffer_size, BufferSize::Fixed(256));
    }

    #[test]
    fn test_zero_latency_rejected() {
        let info = device(SampleFormat::F32, vec![SampleFormat::F32]);
        let request = FormatRequest::new().with_latency_ms(0);
        assert!(ConfigNegotiator::negotiate(&info, &request).is_err());
    }

    #[test]
    fn test_latency_calculation() {
        assert_eq!(ConfigNegotiator::buffer_frames_for_latency(48000, 50), (2400, 600));
        assert!((ConfigNegotiator::calculate_latency_ms(48000, 2400) - 50.0).abs() < 1e-3);
    }
}
