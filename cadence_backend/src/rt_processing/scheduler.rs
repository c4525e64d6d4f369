//! The playback state machine: keeps the sink fed from the buffer pool at the
//! cadence the device clock demands.
//!
//! `Priming → Running → Draining → Stopped`. Any sink failure is fatal; the
//! scheduler still tries to stop an already-started sink before returning it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cadence_core::{AudioFormat, Error, RenderConfig, Result, SinkOp, WakeStrategy};
use tracing::{debug, info, trace, warn};

use crate::audio_device::sink::{CommitFlags, DeviceSink, WaitOutcome};
use crate::rt_processing::buffer_pool::SampleBufferPool;
use crate::rt_processing::performance::PerformanceMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Priming,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Priming => "priming",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Aggregate progress of one render session. Mutated only by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSession {
    pub total_frames: u64,
    pub frames_transferred: u64,
    pub chunks_transferred: u64,
    /// Priming and draining silence; never counted in `frames_transferred`.
    pub silent_frames: u64,
    state: PlaybackState,
}

impl PlaybackSession {
    pub fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            frames_transferred: 0,
            chunks_transferred: 0,
            silent_frames: 0,
            state: PlaybackState::Priming,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.frames_transferred >= self.total_frames
    }
}

/// Cooperative cancellation flag, checked at every wait and transfer boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub wake: WakeStrategy,
    pub drain_silence: bool,
    /// Bound on a single event-driven wait.
    pub wait_timeout: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            wake: config.wake,
            drain_silence: config.drain_silence,
            wait_timeout: config.wait_timeout(),
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub chunks_transferred: u64,
    pub frames_transferred: u64,
    pub silent_frames: u64,
    pub wakeups: u64,
    pub timeouts: u64,
    /// Wake-ups that found less than a chunk of room.
    pub starved_wakeups: u64,
    pub underruns: u64,
    pub elapsed: Duration,
}

impl fmt::Display for PlaybackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chunks / {} frames in {:.2?} ({} silent frames, {} wake-ups, {} starved, {} timeouts, {} underruns)",
            self.chunks_transferred,
            self.frames_transferred,
            self.elapsed,
            self.silent_frames,
            self.wakeups,
            self.starved_wakeups,
            self.timeouts,
            self.underruns
        )
    }
}

enum Flow {
    Continue,
    Exhausted,
}

pub struct PlaybackScheduler<S: DeviceSink> {
    sink: S,
    pool: SampleBufferPool,
    session: PlaybackSession,
    options: SchedulerOptions,
    monitor: Arc<PerformanceMonitor>,
    cancel: CancellationToken,
    format: AudioFormat,
    poll_interval: Duration,
    started: bool,
    wakeups: u64,
    timeouts: u64,
    starved_wakeups: u64,
}

impl<S: DeviceSink> PlaybackScheduler<S> {
    pub fn new(
        sink: S,
        pool: SampleBufferPool,
        total_frames: u64,
        options: SchedulerOptions,
        monitor: Arc<PerformanceMonitor>,
    ) -> Result<Self> {
        let format = sink.format();
        let period = sink.period_frames();
        if period == 0 || period > sink.buffer_frames() {
            return Err(Error::InvalidConfig(format!(
                "device period of {period} frames does not fit its {}-frame buffer",
                sink.buffer_frames()
            )));
        }
        if pool.chunk_frames() > sink.buffer_frames() {
            return Err(Error::InvalidConfig(format!(
                "chunk of {} frames can never fit the {}-frame device buffer",
                pool.chunk_frames(),
                sink.buffer_frames()
            )));
        }
        // Half a period, so a poll never sleeps through a whole period.
        let poll_interval = format.frames_duration(period) / 2;

        Ok(Self {
            sink,
            pool,
            session: PlaybackSession::new(total_frames),
            options,
            monitor,
            cancel: CancellationToken::new(),
            format,
            poll_interval,
            started: false,
            wakeups: 0,
            timeouts: 0,
            starved_wakeups: 0,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run the session to completion. Errors leave the scheduler `Stopped`.
    pub fn run(&mut self) -> Result<PlaybackReport> {
        let started_at = Instant::now();
        if let Err(err) = self.play() {
            if self.started {
                if let Err(stop_err) = self.sink.stop() {
                    warn!(error = %stop_err, "failed to stop sink after playback error");
                }
                self.started = false;
            }
            self.transition(PlaybackState::Stopped);
            return Err(err);
        }

        let report = PlaybackReport {
            chunks_transferred: self.session.chunks_transferred,
            frames_transferred: self.session.frames_transferred,
            silent_frames: self.session.silent_frames,
            wakeups: self.wakeups,
            timeouts: self.timeouts,
            starved_wakeups: self.starved_wakeups,
            underruns: self.monitor.underrun_count(),
            elapsed: started_at.elapsed(),
        };
        debug!(snapshot = ?self.monitor.snapshot(false), "playback metrics");
        Ok(report)
    }

    fn play(&mut self) -> Result<()> {
        if self.session.state != PlaybackState::Priming {
            return Err(Error::InvalidConfig(format!(
                "scheduler already ran (state: {})",
                self.session.state
            )));
        }
        self.prime()?;
        self.transition(PlaybackState::Running);
        self.run_transfers()?;
        self.transition(PlaybackState::Draining);
        self.drain();
        self.sink.stop()?;
        self.started = false;
        self.transition(PlaybackState::Stopped);
        Ok(())
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.session.state != next {
            info!(from = %self.session.state, to = %next, "playback state");
            self.session.state = next;
        }
    }

    /// One period of silence ahead of the first real chunk, then start.
    fn prime(&mut self) -> Result<()> {
        let frames = self.sink.period_frames();
        self.write_silence(frames)?;
        self.sink.start()?;
        self.started = true;
        Ok(())
    }

    fn run_transfers(&mut self) -> Result<()> {
        let chunk_bytes = self.pool.chunk_bytes();
        loop {
            if let Flow::Exhausted = self.transfer_ready(chunk_bytes)? {
                warn!(
                    frames = self.session.frames_transferred,
                    total = self.session.total_frames,
                    "buffer pool ran out before the session length"
                );
                return Ok(());
            }
            if self.session.is_complete() {
                return Ok(());
            }
            self.wait()?;
        }
    }

    /// Transfer chunks while there is room for a whole one.
    fn transfer_ready(&mut self, chunk_bytes: usize) -> Result<Flow> {
        let mut transferred = 0u32;
        while !self.session.is_complete() {
            self.check_cancelled()?;
            let available = self.sink.available_frames()?;
            if self.format.frames_to_bytes(available) < chunk_bytes {
                break;
            }
            if !self.transfer_next()? {
                return Ok(Flow::Exhausted);
            }
            transferred += 1;
        }
        if transferred == 0 && !self.session.is_complete() && self.wakeups > 0 {
            self.starved_wakeups += 1;
            self.monitor.increment_starved_wake_count();
        }
        Ok(Flow::Continue)
    }

    fn transfer_next(&mut self) -> Result<bool> {
        let _timing = self.monitor.scoped_transfer();
        let Some(chunk) = self.pool.next_chunk() else {
            return Ok(false);
        };
        let frames = chunk.frames();

        let region = self.sink.acquire_write_region(frames)?;
        if region.len() != chunk.len() {
            return Err(Error::device(
                SinkOp::Acquire,
                format!("sink lent {} bytes for a {}-byte chunk", region.len(), chunk.len()),
            ));
        }
        region.copy_from_slice(&chunk);
        drop(chunk);
        self.sink.commit_write_region(frames, CommitFlags::Data)?;

        self.session.frames_transferred += u64::from(frames);
        self.session.chunks_transferred += 1;
        self.monitor.add_frames_transferred(u64::from(frames));
        trace!(
            chunk = self.session.chunks_transferred,
            frames,
            total = self.session.frames_transferred,
            "chunk transferred"
        );
        Ok(true)
    }

    fn write_silence(&mut self, frames: u32) -> Result<()> {
        self.sink.acquire_write_region(frames)?;
        self.sink.commit_write_region(frames, CommitFlags::Silent)?;
        self.session.silent_frames += u64::from(frames);
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        self.check_cancelled()?;
        self.wakeups += 1;
        match self.options.wake {
            WakeStrategy::Event => {
                if self.sink.wait_for_capacity(self.options.wait_timeout)? == WaitOutcome::TimedOut {
                    self.timeouts += 1;
                    warn!(timeout = ?self.options.wait_timeout, "no capacity signal from device");
                }
            }
            WakeStrategy::Polling => self.sink.idle_for(self.poll_interval),
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                frames_transferred: self.session.frames_transferred,
            });
        }
        Ok(())
    }

    /// Best-effort tail: a period of silence once there is room for it, then
    /// let the queued audio play out before the sink is stopped.
    fn drain(&mut self) {
        let period = self.sink.period_frames();
        let buffer = self.sink.buffer_frames();
        let mut silence_pending = self.options.drain_silence;
        let mut tail = 0;

        // Two buffers' worth of periods bounds the wait; a poll covers half a period.
        let waits_per_period = match self.options.wake {
            WakeStrategy::Event => 1,
            WakeStrategy::Polling => 2,
        };
        let max_waits = (2 * buffer.div_ceil(period) + 2) * waits_per_period;
        for _ in 0..max_waits {
            if self.cancel.is_cancelled() {
                return;
            }
            let available = match self.sink.available_frames() {
                Ok(available) => available,
                Err(err) => {
                    warn!(error = %err, "could not query capacity while draining");
                    return;
                }
            };
            if silence_pending && available >= period {
                silence_pending = false;
                match self.write_silence(period) {
                    Ok(()) => {
                        tail = period;
                        continue;
                    }
                    Err(err) => warn!(error = %err, "could not write drain silence"),
                }
            }
            if !silence_pending && buffer.saturating_sub(available) <= tail {
                return;
            }
            match self.options.wake {
                WakeStrategy::Event => {
                    if let Err(err) = self.sink.wait_for_capacity(self.options.wait_timeout) {
                        warn!(error = %err, "capacity wait failed while draining");
                        return;
                    }
                }
                WakeStrategy::Polling => self.sink.idle_for(self.poll_interval),
            }
        }
        debug!("drain wait limit reached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_device::simulated::{SimulatedSink, SinkEvent};
    use crate::rt_processing::waveform::ToneGenerator;
    use cadence_core::{SampleEncoding, WaveShape};

    fn format() -> AudioFormat {
        AudioFormat::new(SampleEncoding::Int16, 2, 48_000).unwrap()
    }

    fn scheduler(
        sink: SimulatedSink,
        total_frames: u64,
        wake: WakeStrategy,
    ) -> PlaybackScheduler<SimulatedSink> {
        let generator = ToneGenerator::new(WaveShape::Sine, 440.0, format()).with_volume(0.5);
        let pool = SampleBufferPool::streaming(generator, sink.period_frames()).unwrap();
        let options = SchedulerOptions {
            wake,
            drain_silence: true,
            wait_timeout: Duration::from_millis(100),
        };
        let monitor = Arc::new(PerformanceMonitor::new(sink.period_frames(), 48_000, 0.1));
        let sink = sink.with_monitor(Arc::clone(&monitor));
        PlaybackScheduler::new(sink, pool, total_frames, options, monitor).unwrap()
    }

    #[test]
    fn test_primes_before_start() {
        let mut scheduler = scheduler(SimulatedSink::new(format(), 480, 1_920), 4_800, WakeStrategy::Event);
        scheduler.run().unwrap();
        let events = scheduler.sink().events();
        assert!(matches!(&events[0], SinkEvent::Committed(w) if w.silent && w.frames == 480));
        assert_eq!(events[1], SinkEvent::Started);
        assert_eq!(events.last(), Some(&SinkEvent::Stopped));
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_transfers_ceil_of_session_length() {
        for wake in [WakeStrategy::Event, WakeStrategy::Polling] {
            let mut scheduler = scheduler(SimulatedSink::new(format(), 480, 1_920), 4_801, wake);
            let report = scheduler.run().unwrap();
            assert_eq!(report.chunks_transferred, 11);
            assert_eq!(report.frames_transferred, 5_280);
            assert_eq!(report.underruns, 0);
        }
    }

    #[test]
    fn test_drain_silence_is_optional() {
        let sink = SimulatedSink::new(format(), 480, 1_920);
        let generator = ToneGenerator::new(WaveShape::Sine, 440.0, format());
        let pool = SampleBufferPool::streaming(generator, 480).unwrap();
        let options = SchedulerOptions {
            wake: WakeStrategy::Event,
            drain_silence: false,
            wait_timeout: Duration::from_millis(100),
        };
        let monitor = Arc::new(PerformanceMonitor::new(480, 48_000, 0.1));
        let mut scheduler = PlaybackScheduler::new(sink, pool, 960, options, monitor).unwrap();
        let report = scheduler.run().unwrap();
        assert_eq!(report.silent_frames, 480);
        assert_eq!(scheduler.sink().commits().filter(|w| w.silent).count(), 1);
        // queued audio was allowed to play out before stopping
        assert_eq!(scheduler.sink().queued_frames(), 0);
    }

    #[test]
    fn test_cancellation_stops_sink() {
        let token = CancellationToken::new();
        let mut scheduler = scheduler(SimulatedSink::new(format(), 480, 1_920), 48_000, WakeStrategy::Event)
            .with_cancellation(token.clone());
        token.cancel();
        let err = scheduler.run().unwrap_err();
        assert!(matches!(err, Error::Cancelled { frames_transferred: 0 }));
        assert!(!scheduler.sink().is_started());
        assert_eq!(scheduler.sink().events().last(), Some(&SinkEvent::Stopped));
    }

    /// Trips the token once `remaining` data regions have been committed.
    struct CancelAfterCommits {
        inner: SimulatedSink,
        token: CancellationToken,
        remaining: usize,
    }

    impl DeviceSink for CancelAfterCommits {
        fn format(&self) -> AudioFormat {
            self.inner.format()
        }

        fn period_frames(&self) -> u32 {
            self.inner.period_frames()
        }

        fn buffer_frames(&self) -> u32 {
            self.inner.buffer_frames()
        }

        fn start(&mut self) -> Result<()> {
            self.inner.start()
        }

        fn stop(&mut self) -> Result<()> {
            self.inner.stop()
        }

        fn available_frames(&mut self) -> Result<u32> {
            self.inner.available_frames()
        }

        fn acquire_write_region(&mut self, frames: u32) -> Result<&mut [u8]> {
            self.inner.acquire_write_region(frames)
        }

        fn commit_write_region(&mut self, frames: u32, flags: CommitFlags) -> Result<()> {
            self.inner.commit_write_region(frames, flags)?;
            if flags == CommitFlags::Data {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.token.cancel();
                }
            }
            Ok(())
        }

        fn wait_for_capacity(&mut self, timeout: Duration) -> Result<WaitOutcome> {
            self.inner.wait_for_capacity(timeout)
        }

        fn idle_for(&mut self, interval: Duration) {
            self.inner.idle_for(interval)
        }
    }

    #[test]
    fn test_cancellation_mid_session_reports_progress() {
        let token = CancellationToken::new();
        let sink = CancelAfterCommits {
            inner: SimulatedSink::new(format(), 480, 1_920),
            token: token.clone(),
            remaining: 5,
        };
        let generator = ToneGenerator::new(WaveShape::Sine, 440.0, format());
        let pool = SampleBufferPool::streaming(generator, 480).unwrap();
        let monitor = Arc::new(PerformanceMonitor::new(480, 48_000, 0.1));
        let mut scheduler = PlaybackScheduler::new(sink, pool, 48_000, SchedulerOptions::default(), monitor)
            .unwrap()
            .with_cancellation(token);

        let err = scheduler.run().unwrap_err();
        match err {
            Error::Cancelled { frames_transferred } => {
                assert!(frames_transferred > 0);
                assert_eq!(frames_transferred, 5 * 480);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
        assert!(!scheduler.sink().inner.is_started());
        assert_eq!(scheduler.sink().inner.events().last(), Some(&SinkEvent::Stopped));
    }

    #[test]
    fn test_drain_failures_do_not_fail_session() {
        // 960 frames: acquire 1 primes, 2 and 3 carry audio, 4 is the drain silence.
        let sink = SimulatedSink::new(format(), 480, 1_920).fail_on(SinkOp::Acquire, 4);
        let mut silence_fails = scheduler(sink, 960, WakeStrategy::Event);
        let report = silence_fails.run().unwrap();
        assert_eq!(report.frames_transferred, 960);
        assert_eq!(report.silent_frames, 480);
        assert_eq!(silence_fails.state(), PlaybackState::Stopped);
        assert!(!silence_fails.sink().is_started());
        assert_eq!(silence_fails.sink().events().last(), Some(&SinkEvent::Stopped));

        // The first wait of this session happens while draining.
        let sink = SimulatedSink::new(format(), 480, 1_920).fail_on(SinkOp::Wait, 1);
        let mut wait_fails = scheduler(sink, 960, WakeStrategy::Event);
        let report = wait_fails.run().unwrap();
        assert_eq!(report.silent_frames, 960);
        assert_eq!(wait_fails.state(), PlaybackState::Stopped);
        assert!(!wait_fails.sink().is_started());
    }

    #[test]
    fn test_failed_wait_is_fatal() {
        let sink = SimulatedSink::new(format(), 480, 1_920).fail_on(SinkOp::Wait, 3);
        let mut scheduler = scheduler(sink, 48_000, WakeStrategy::Event);
        let err = scheduler.run().unwrap_err();
        assert!(matches!(err, Error::Device { op: SinkOp::Wait, .. }));
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
        assert!(!scheduler.sink().is_started());
    }

    #[test]
    fn test_failed_priming_never_starts() {
        let sink = SimulatedSink::new(format(), 480, 1_920).fail_on(SinkOp::Commit, 1);
        let mut scheduler = scheduler(sink, 4_800, WakeStrategy::Event);
        assert!(scheduler.run().is_err());
        assert!(!scheduler.sink().events().contains(&SinkEvent::Started));
    }

    #[test]
    fn test_rejects_chunk_larger_than_buffer() {
        let sink = SimulatedSink::new(format(), 480, 960);
        let generator = ToneGenerator::new(WaveShape::Sine, 440.0, format());
        let pool = SampleBufferPool::streaming(generator, 1_000).unwrap();
        let monitor = Arc::new(PerformanceMonitor::new(480, 48_000, 0.1));
        let result = PlaybackScheduler::new(sink, pool, 4_800, SchedulerOptions::default(), monitor);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_scheduler_runs_once() {
        let mut scheduler = scheduler(SimulatedSink::new(format(), 480, 1_920), 960, WakeStrategy::Event);
        scheduler.run().unwrap();
        assert!(scheduler.run().is_err());
    }
}
