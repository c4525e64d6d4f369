//! `DeviceSink` over a cpal output stream.
//!
//! cpal is callback driven, so the write-region protocol is emulated: regions
//! are lent from a scratch buffer and copied into the [`PlaybackWriter`] on commit.
//! The stream callback owns the matching reader, drains it and raises the
//! capacity signal.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{AudioFormat, Error, Result, SampleEncoding, SinkOp};
use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;

use super::negotiation::NegotiatedConfig;
use super::sink::{CommitFlags, DeviceSink, WaitOutcome};
use crate::rt_processing::callback::{
    CapacityNotifier, CapacityWaiter, DeviceSample, PlaybackReader, PlaybackWriter,
    capacity_signal, playback_ring,
};
use crate::rt_processing::performance::PerformanceMonitor;

type StreamErrorLatch = Arc<Mutex<Option<String>>>;

pub struct CpalSink {
    stream: cpal::Stream,
    writer: PlaybackWriter,
    waiter: CapacityWaiter,
    stream_error: StreamErrorLatch,

    format: AudioFormat,
    period_frames: u32,
    buffer_frames: u32,

    scratch: Vec<u8>,
    pending: Option<u32>,
    started: bool,
}

impl CpalSink {
    /// Build a paused output stream for a negotiated configuration.
    pub fn open(
        device: &cpal::Device,
        negotiated: &NegotiatedConfig,
        monitor: Arc<PerformanceMonitor>,
    ) -> Result<Self> {
        let format = negotiated.format;
        let (writer, reader) = playback_ring(negotiated.buffer_frames, format)?;
        let (notifier, waiter) = capacity_signal();
        let stream_error: StreamErrorLatch = Arc::new(Mutex::new(None));

        let stream = match format.encoding {
            SampleEncoding::Float32 => Self::build_stream::<f32>(
                device,
                &negotiated.stream_config,
                reader,
                notifier,
                monitor,
                stream_error.clone(),
            ),
            SampleEncoding::Int16 => Self::build_stream::<i16>(
                device,
                &negotiated.stream_config,
                reader,
                notifier,
                monitor,
                stream_error.clone(),
            ),
        }?;

        // Some hosts start streams on creation.
        if let Err(err) = stream.pause() {
            tracing::debug!(error = %err, "stream does not support pausing before start");
        }

        let scratch_len = format.frames_to_bytes(negotiated.buffer_frames);
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(scratch_len)
            .map_err(|_| Error::Allocation {
                what: "write region",
                bytes: scratch_len,
            })?;
        scratch.resize(scratch_len, 0);

        tracing::info!(config = %negotiated, "output stream opened");

        Ok(Self {
            stream,
            writer,
            waiter,
            stream_error,
            format,
            period_frames: negotiated.period_frames,
            buffer_frames: negotiated.buffer_frames,
            scratch,
            pending: None,
            started: false,
        })
    }

    fn build_stream<T: DeviceSample>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut reader: PlaybackReader,
        notifier: CapacityNotifier,
        monitor: Arc<PerformanceMonitor>,
        stream_error: StreamErrorLatch,
    ) -> Result<cpal::Stream> {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        reader.fill_device_buffer(data, &monitor);
                    }));
                    if result.is_err() {
                        data.fill(T::EQUILIBRIUM);
                    }
                    notifier.notify();
                },
                move |err| {
                    let mut latched = stream_error.lock();
                    if latched.is_none() {
                        *latched = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| Error::device(SinkOp::OpenStream, e))
    }

    /// Surface an asynchronous stream failure on the scheduler thread.
    fn check_stream(&self, op: SinkOp) -> Result<()> {
        match self.stream_error.lock().take() {
            Some(message) => Err(Error::device(op, message)),
            None => Ok(()),
        }
    }

    pub fn frames_played(&self) -> u64 {
        self.writer.frames_played()
    }
}

impl DeviceSink for CpalSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn period_frames(&self) -> u32 {
        self.period_frames
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn start(&mut self) -> Result<()> {
        self.check_stream(SinkOp::Start)?;
        self.waiter.clear();
        self.writer.set_playing(true);
        if let Err(err) = self.stream.play() {
            self.writer.set_playing(false);
            return Err(Error::device(SinkOp::Start, err));
        }
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.writer.set_playing(false);
        if self.started {
            self.started = false;
            self.stream
                .pause()
                .map_err(|e| Error::device(SinkOp::Stop, e))?;
        }
        self.check_stream(SinkOp::Stop)
    }

    fn available_frames(&mut self) -> Result<u32> {
        self.check_stream(SinkOp::QueryCapacity)?;
        Ok(self.writer.free_frames())
    }

    fn acquire_write_region(&mut self, frames: u32) -> Result<&mut [u8]> {
        self.check_stream(SinkOp::Acquire)?;
        if self.pending.is_some() {
            return Err(Error::device(SinkOp::Acquire, "previous region not committed"));
        }
        let free = self.writer.free_frames();
        if frames > free {
            return Err(Error::device(
                SinkOp::Acquire,
                format!("requested {frames} frames but only {free} are free"),
            ));
        }
        self.pending = Some(frames);
        let len = self.format.frames_to_bytes(frames);
        Ok(&mut self.scratch[..len])
    }

    fn commit_write_region(&mut self, frames: u32, flags: CommitFlags) -> Result<()> {
        match self.pending.take() {
            Some(acquired) if acquired == frames => {}
            Some(acquired) => {
                return Err(Error::device(
                    SinkOp::Commit,
                    format!("committed {frames} frames after acquiring {acquired}"),
                ));
            }
            None => return Err(Error::device(SinkOp::Commit, "no region acquired")),
        }

        let pushed = match flags {
            CommitFlags::Data => {
                let len = self.format.frames_to_bytes(frames);
                self.writer.push(&self.scratch[..len])
            }
            CommitFlags::Silent => self.writer.push_silence(frames),
        };
        if !pushed {
            return Err(Error::device(SinkOp::Commit, "device buffer overflow"));
        }
        self.check_stream(SinkOp::Commit)
    }

    fn wait_for_capacity(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        self.check_stream(SinkOp::Wait)?;
        self.waiter.wait(timeout)
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.writer.set_playing(false);
        tracing::debug!(frames_played = self.writer.frames_played(), "output stream closed");
    }
}
