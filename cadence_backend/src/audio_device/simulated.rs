//! A deterministic stand-in for an output device.
//!
//! The virtual hardware plays one period per capacity wait (or the equivalent
//! frame count per idle interval), so a whole session runs instantly and
//! reproducibly. Used by the test-suite and by the CLI's dry-run mode.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{AudioFormat, Error, Result, SinkOp};

use super::sink::{CommitFlags, DeviceSink, WaitOutcome};
use crate::rt_processing::performance::PerformanceMonitor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Started,
    Stopped,
    Committed(CommittedWrite),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedWrite {
    pub frames: u32,
    pub silent: bool,
    /// Filled only when capture is enabled and the write was not silent.
    pub bytes: Vec<u8>,
}

pub struct SimulatedSink {
    format: AudioFormat,
    period_frames: u32,
    buffer_frames: u32,
    frames_per_wake: u32,

    queued_frames: u32,
    started: bool,
    pending: Option<u32>,
    scratch: Vec<u8>,

    capture: bool,
    events: Vec<SinkEvent>,
    faults: HashMap<SinkOp, usize>,
    op_counts: HashMap<SinkOp, usize>,

    frames_played: u64,
    idle_carry: f64,
    underruns: u64,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl SimulatedSink {
    pub fn new(format: AudioFormat, period_frames: u32, buffer_frames: u32) -> Self {
        assert!(period_frames > 0 && period_frames <= buffer_frames);
        Self {
            format,
            period_frames,
            buffer_frames,
            frames_per_wake: period_frames,
            queued_frames: 0,
            started: false,
            pending: None,
            scratch: vec![0; format.frames_to_bytes(buffer_frames)],
            capture: false,
            events: Vec::new(),
            faults: HashMap::new(),
            op_counts: HashMap::new(),
            frames_played: 0,
            idle_carry: 0.0,
            underruns: 0,
            monitor: None,
        }
    }

    /// Keep the bytes of every data write for inspection.
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Frames the virtual hardware consumes per capacity wake-up.
    pub fn with_frames_per_wake(mut self, frames: u32) -> Self {
        self.frames_per_wake = frames.max(1);
        self
    }

    /// Report underruns to a shared monitor as well.
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Make the `nth` (1-based) call of `op` fail with a device error.
    pub fn fail_on(mut self, op: SinkOp, nth: usize) -> Self {
        self.faults.insert(op, nth);
        self
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn commits(&self) -> impl Iterator<Item = &CommittedWrite> {
        self.events.iter().filter_map(|event| match event {
            SinkEvent::Committed(write) => Some(write),
            _ => None,
        })
    }

    pub fn queued_frames(&self) -> u32 {
        self.queued_frames
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn check(&mut self, op: SinkOp) -> Result<()> {
        let count = self.op_counts.entry(op).or_insert(0);
        *count += 1;
        let count = *count;
        if self.faults.get(&op) == Some(&count) {
            return Err(Error::device(op, "injected device fault"));
        }
        Ok(())
    }

    fn play(&mut self, frames: u32) {
        let played = frames.min(self.queued_frames);
        self.queued_frames -= played;
        self.frames_played += u64::from(played);
        if played < frames {
            self.underruns += 1;
            if let Some(monitor) = &self.monitor {
                monitor.increment_underrun_count();
            }
        }
    }
}

impl DeviceSink for SimulatedSink {
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
        self.check(SinkOp::Start)?;
        if self.started {
            return Err(Error::device(SinkOp::Start, "stream already running"));
        }
        self.started = true;
        self.events.push(SinkEvent::Started);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.check(SinkOp::Stop)?;
        if !self.started {
            return Err(Error::device(SinkOp::Stop, "stream not running"));
        }
        self.started = false;
        self.events.push(SinkEvent::Stopped);
        Ok(())
    }

    fn available_frames(&mut self) -> Result<u32> {
        self.check(SinkOp::QueryCapacity)?;
        Ok(self.buffer_frames - self.queued_frames)
    }

    fn acquire_write_region(&mut self, frames: u32) -> Result<&mut [u8]> {
        self.check(SinkOp::Acquire)?;
        if self.pending.is_some() {
            return Err(Error::device(SinkOp::Acquire, "previous region not committed"));
        }
        let free = self.buffer_frames - self.queued_frames;
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
        self.check(SinkOp::Commit)?;
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

        let silent = flags == CommitFlags::Silent;
        let bytes = if self.capture && !silent {
            self.scratch[..self.format.frames_to_bytes(frames)].to_vec()
        } else {
            Vec::new()
        };
        self.queued_frames += frames;
        self.events.push(SinkEvent::Committed(CommittedWrite {
            frames,
            silent,
            bytes,
        }));
        Ok(())
    }

    fn wait_for_capacity(&mut self, _timeout: Duration) -> Result<WaitOutcome> {
        self.check(SinkOp::Wait)?;
        if !self.started {
            return Ok(WaitOutcome::TimedOut);
        }
        self.play(self.frames_per_wake);
        Ok(WaitOutcome::Signaled)
    }

    fn idle_for(&mut self, interval: Duration) {
        if !self.started {
            return;
        }
        let exact = interval.as_secs_f64() * self.format.sample_rate as f64 + self.idle_carry;
        let frames = exact.floor();
        self.idle_carry = exact - frames;
        self.play(frames as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::SampleEncoding;

    fn sink() -> SimulatedSink {
        let format = AudioFormat::new(SampleEncoding::Int16, 2, 48_000).unwrap();
        SimulatedSink::new(format, 480, 1_920)
    }

    #[test]
    fn test_rejects_oversized_region() {
        let mut sink = sink();
        assert!(sink.acquire_write_region(1_921).is_err());
        assert_eq!(sink.acquire_write_region(1_920).unwrap().len(), 7_680);
    }

    #[test]
    fn test_commit_must_match_acquire() {
        let mut sink = sink();
        sink.acquire_write_region(480).unwrap();
        assert!(sink.commit_write_region(479, CommitFlags::Data).is_err());
        assert!(sink.commit_write_region(480, CommitFlags::Data).is_err());
    }

    #[test]
    fn test_wait_plays_one_period() {
        let mut sink = sink();
        sink.acquire_write_region(960).unwrap();
        sink.commit_write_region(960, CommitFlags::Silent).unwrap();
        assert_eq!(sink.available_frames().unwrap(), 960);

        // nothing plays until started
        assert_eq!(sink.wait_for_capacity(Duration::ZERO).unwrap(), WaitOutcome::TimedOut);
        sink.start().unwrap();
        assert_eq!(sink.wait_for_capacity(Duration::ZERO).unwrap(), WaitOutcome::Signaled);
        assert_eq!(sink.available_frames().unwrap(), 1_440);
        assert_eq!(sink.underruns(), 0);

        sink.wait_for_capacity(Duration::ZERO).unwrap();
        sink.wait_for_capacity(Duration::ZERO).unwrap();
        assert_eq!(sink.underruns(), 1);
        assert_eq!(sink.frames_played(), 960);
    }

    #[test]
    fn test_idle_advances_virtual_clock() {
        let mut sink = sink();
        sink.acquire_write_region(1_920).unwrap();
        sink.commit_write_region(1_920, CommitFlags::Data).unwrap();
        sink.start().unwrap();
        sink.idle_for(Duration::from_millis(5));
        assert_eq!(sink.queued_frames(), 1_680);
    }

    #[test]
    fn test_fault_injection() {
        let mut sink = sink().fail_on(SinkOp::Start, 1);
        let err = sink.start().unwrap_err();
        assert!(matches!(err, Error::Device { op: SinkOp::Start, .. }));
        assert!(sink.stop().is_err());
    }
}
