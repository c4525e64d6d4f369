//! Real-time tone rendering engine.
//!
//! A [`ToneGenerator`](rt_processing::waveform::ToneGenerator) fills chunks, a
//! [`SampleBufferPool`] stages them and the [`PlaybackScheduler`] keeps a
//! [`DeviceSink`] fed without overflowing it. [`session`] wires those pieces
//! to either a cpal output stream or the [`SimulatedSink`].

pub mod audio_device;
pub mod rt_processing;
pub mod session;

pub use audio_device::{AudioHost, CpalSink, DeviceEnumerator, DeviceSink, SimulatedSink};
pub use rt_processing::{
    CancellationToken, PerformanceMonitor, PlaybackReport, PlaybackScheduler, PlaybackState,
    SampleBufferPool,
};
pub use session::{render_simulated, render_to_device, render_with_sink};
