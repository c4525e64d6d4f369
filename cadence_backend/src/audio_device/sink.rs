use std::time::Duration;

use cadence_core::{AudioFormat, Result};

/// How a committed write region should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitFlags {
    /// The region was filled by the caller.
    #[default]
    Data,
    /// Play silence; the region contents are ignored.
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The sink reported new room since the last wait.
    Signaled,
    /// Nothing arrived within the timeout. Not an error.
    TimedOut,
}

/// An audio output endpoint with a device-managed buffer.
///
/// Every method that talks to the device is fallible, and any failure is fatal
/// for the render session.
pub trait DeviceSink {
    /// The format every committed byte must be in.
    fn format(&self) -> AudioFormat;

    /// Frames per device period.
    fn period_frames(&self) -> u32;

    /// Total frames the device buffer can hold.
    fn buffer_frames(&self) -> u32;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Frames that can be written right now.
    fn available_frames(&mut self) -> Result<u32>;

    /// Lend a region of exactly `frames` frames. Must be followed by
    /// [`commit_write_region`](Self::commit_write_region) with the same count.
    fn acquire_write_region(&mut self, frames: u32) -> Result<&mut [u8]>;

    fn commit_write_region(&mut self, frames: u32, flags: CommitFlags) -> Result<()>;

    /// Block until the device reports new room or `timeout` elapses.
    fn wait_for_capacity(&mut self, timeout: Duration) -> Result<WaitOutcome>;

    /// Pause the caller for `interval` between polls.
    fn idle_for(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

impl<S: DeviceSink + ?Sized> DeviceSink for &mut S {
    fn format(&self) -> AudioFormat {
        (**self).format()
    }

    fn period_frames(&self) -> u32 {
        (**self).period_frames()
    }

    fn buffer_frames(&self) -> u32 {
        (**self).buffer_frames()
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn available_frames(&mut self) -> Result<u32> {
        (**self).available_frames()
    }

    fn acquire_write_region(&mut self, frames: u32) -> Result<&mut [u8]> {
        (**self).acquire_write_region(frames)
    }

    fn commit_write_region(&mut self, frames: u32, flags: CommitFlags) -> Result<()> {
        (**self).commit_write_region(frames, flags)
    }

    fn wait_for_capacity(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        (**self).wait_for_capacity(timeout)
    }

    fn idle_for(&mut self, interval: Duration) {
        (**self).idle_for(interval)
    }
}
