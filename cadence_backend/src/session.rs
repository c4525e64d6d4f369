//! One render session from configuration to report.

use std::sync::Arc;

use cadence_core::{AudioFormat, BufferMode, Error, RenderConfig, Result};
use tracing::info;

use crate::audio_device::{
    AudioHost, ConfigNegotiator, CpalSink, DeviceEnumerator, DeviceSink, FormatRequest,
    SimulatedSink,
};
use crate::rt_processing::waveform::ToneGenerator;
use crate::rt_processing::{
    CancellationToken, PerformanceMonitor, PlaybackReport, PlaybackScheduler, SampleBufferPool,
    SchedulerOptions,
};

const TRANSFER_EMA_ALPHA: f64 = 0.1;

pub fn monitor_for(sink: &impl DeviceSink) -> Arc<PerformanceMonitor> {
    Arc::new(PerformanceMonitor::new(
        sink.period_frames(),
        sink.format().sample_rate,
        TRANSFER_EMA_ALPHA,
    ))
}

/// Render `config` into an already opened sink.
///
/// Chunks are one device period long. `monitor` should be the one the sink
/// reports underruns to, so the report reflects them.
pub fn render_with_sink<S: DeviceSink>(
    sink: S,
    config: &RenderConfig,
    monitor: Arc<PerformanceMonitor>,
    cancel: CancellationToken,
) -> Result<PlaybackReport> {
    let format = sink.format();
    config.validate_for(&format)?;

    let generator = ToneGenerator::new(config.shape, f64::from(config.frequency), format)
        .with_volume(f64::from(config.volume))
        .with_cursor(config.cursor);

    let chunk_frames = sink.period_frames();
    let total_frames = config.total_frames(&format);
    let pool = match config.buffer_mode {
        BufferMode::Bulk => SampleBufferPool::bulk(generator, chunk_frames, total_frames)?,
        BufferMode::Streaming => SampleBufferPool::streaming(generator, chunk_frames)?,
    };

    info!(
        format = %format,
        shape = %config.shape,
        frequency = config.frequency,
        total_frames,
        chunk_frames,
        mode = ?config.buffer_mode,
        wake = ?config.wake,
        "starting render session"
    );

    let mut scheduler = PlaybackScheduler::new(
        sink,
        pool,
        total_frames,
        SchedulerOptions::from_config(config),
        monitor,
    )?
    .with_cancellation(cancel);

    let report = scheduler.run()?;
    info!(%report, "render session finished");
    Ok(report)
}

/// Render on a real output device chosen by `config.device`.
pub fn render_to_device(config: &RenderConfig, cancel: CancellationToken) -> Result<PlaybackReport> {
    config.validate()?;

    let host = AudioHost::acquire()?;
    let enumerator = DeviceEnumerator::scan(&host)?;
    let device_info = enumerator.resolve(config.device.as_deref())?;
    let device = enumerator.select_device(device_info)?;
    info!(device = %device_info, "selected output device");

    let negotiated = ConfigNegotiator::negotiate(device_info, &FormatRequest::from_config(config))?;
    info!(config = %negotiated, "negotiated output format");

    let monitor = Arc::new(PerformanceMonitor::new(
        negotiated.period_frames,
        negotiated.format.sample_rate,
        TRANSFER_EMA_ALPHA,
    ));
    let sink = CpalSink::open(device, &negotiated, monitor.clone())?;
    render_with_sink(sink, config, monitor, cancel)
}

/// Render against a [`SimulatedSink`] sized from the configured latency.
/// Runs as fast as the CPU allows; no audio is produced.
pub fn render_simulated(
    config: &RenderConfig,
    format: AudioFormat,
    cancel: CancellationToken,
) -> Result<PlaybackReport> {
    config.validate()?;
    let (buffer_frames, period_frames) =
        ConfigNegotiator::buffer_frames_for_latency(format.sample_rate, config.latency_ms);
    if buffer_frames == 0 {
        return Err(Error::InvalidConfig(format!(
            "latency of {}ms holds no frames at {}Hz",
            config.latency_ms, format.sample_rate
        )));
    }

    let sink = SimulatedSink::new(format, period_frames, buffer_frames);
    let monitor = monitor_for(&sink);
    let sink = sink.with_monitor(monitor.clone());
    render_with_sink(sink, config, monitor, cancel)
}
