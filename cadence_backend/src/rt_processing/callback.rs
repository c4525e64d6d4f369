//! Device-side half of playback: the byte ring the audio callback drains and
//! the capacity signal it raises.
//!
//! The ring is split once. The scheduler thread keeps the [`PlaybackWriter`]
//! and the stream callback owns the [`PlaybackReader`]; neither side ever
//! takes a lock, so queued audio is always reachable from the callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use cadence_core::{AudioFormat, Error, Result, SampleEncoding, SinkOp};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

use crate::audio_device::sink::WaitOutcome;
use crate::rt_processing::performance::PerformanceMonitor;

/// A sample type the device callback can be built for.
pub trait DeviceSample: cpal::SizedSample + Send + 'static {
    const ENCODING: SampleEncoding;

    /// Decode one native-endian sample. `bytes.len()` equals the encoding's sample size.
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

impl DeviceSample for f32 {
    const ENCODING: SampleEncoding = SampleEncoding::Float32;

    #[inline]
    fn from_ne_slice(bytes: &[u8]) -> Self {
        f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl DeviceSample for i16 {
    const ENCODING: SampleEncoding = SampleEncoding::Int16;

    #[inline]
    fn from_ne_slice(bytes: &[u8]) -> Self {
        i16::from_ne_bytes([bytes[0], bytes[1]])
    }
}

/// State both ends of the ring observe.
#[derive(Debug)]
struct PlaybackMeta {
    format: AudioFormat,
    playing: AtomicBool,
    /// Frames handed to the device so far, silence padding excluded.
    frames_played: AtomicU64,
}

/// Split a ring of `capacity_frames` device-format frames into its two ends.
pub fn playback_ring(
    capacity_frames: u32,
    format: AudioFormat,
) -> Result<(PlaybackWriter, PlaybackReader)> {
    let capacity_bytes = format.frames_to_bytes(capacity_frames);
    if capacity_bytes == 0 {
        return Err(Error::InvalidConfig(
            "playback ring must hold at least one frame".into(),
        ));
    }

    let (prod, cons) = HeapRb::<u8>::new(capacity_bytes).split();
    let meta = Arc::new(PlaybackMeta {
        format,
        playing: AtomicBool::new(false),
        frames_played: AtomicU64::new(0),
    });

    Ok((
        PlaybackWriter {
            prod,
            meta: meta.clone(),
        },
        PlaybackReader { cons, meta },
    ))
}

/// Scheduler end of the ring.
pub struct PlaybackWriter {
    prod: HeapProd<u8>,
    meta: Arc<PlaybackMeta>,
}

impl PlaybackWriter {
    pub fn capacity_frames(&self) -> u32 {
        (self.prod.capacity().get() / self.meta.format.frame_size()) as u32
    }

    pub fn queued_frames(&self) -> u32 {
        (self.prod.occupied_len() / self.meta.format.frame_size()) as u32
    }

    pub fn free_frames(&self) -> u32 {
        (self.prod.vacant_len() / self.meta.format.frame_size()) as u32
    }

    /// Append frame-aligned bytes. Returns `false`, writing nothing, when they
    /// do not fit.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        debug_assert_eq!(bytes.len() % self.meta.format.frame_size(), 0);
        if self.prod.vacant_len() < bytes.len() {
            return false;
        }
        let written = self.prod.push_slice(bytes);
        debug_assert_eq!(written, bytes.len());
        true
    }

    pub fn push_silence(&mut self, frames: u32) -> bool {
        let len = self.meta.format.frames_to_bytes(frames);
        if self.prod.vacant_len() < len {
            return false;
        }
        let written = self.prod.push_iter(std::iter::repeat_n(0u8, len));
        debug_assert_eq!(written, len);
        true
    }

    pub fn set_playing(&self, playing: bool) {
        self.meta.playing.store(playing, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.meta.playing.load(Ordering::Acquire)
    }

    pub fn frames_played(&self) -> u64 {
        self.meta.frames_played.load(Ordering::Relaxed)
    }
}

/// Callback end of the ring.
pub struct PlaybackReader {
    cons: HeapCons<u8>,
    meta: Arc<PlaybackMeta>,
}

impl PlaybackReader {
    /// Realtime entry point: fill an interleaved device buffer from the ring.
    ///
    /// Pads with silence when the ring runs short, counting an underrun while
    /// playing. Returns the number of frames taken from the ring.
    pub fn fill_device_buffer<T: DeviceSample>(
        &mut self,
        output: &mut [T],
        monitor: &PerformanceMonitor,
    ) -> usize {
        let format = self.meta.format;
        debug_assert_eq!(T::ENCODING, format.encoding);

        let channels = format.channels as usize;
        let sample_size = format.encoding.bytes_per_sample();
        let wanted_frames = output.len() / channels;
        let ready_frames = (self.cons.occupied_len() / format.frame_size()).min(wanted_frames);
        let ready_samples = ready_frames * channels;

        let mut raw = [0u8; 4];
        for slot in &mut output[..ready_samples] {
            let read = self.cons.pop_slice(&mut raw[..sample_size]);
            debug_assert_eq!(read, sample_size);
            *slot = T::from_ne_slice(&raw[..sample_size]);
        }
        output[ready_samples..].fill(T::EQUILIBRIUM);

        self.meta
            .frames_played
            .fetch_add(ready_frames as u64, Ordering::Relaxed);
        if ready_frames < wanted_frames && self.meta.playing.load(Ordering::Acquire) {
            monitor.increment_underrun_count();
        }
        ready_frames
    }
}

/// Raised by the device callback each time it frees space in the ring.
#[derive(Clone)]
pub struct CapacityNotifier {
    tx: Sender<()>,
}

impl CapacityNotifier {
    /// Never blocks; a pending, unconsumed signal absorbs this one.
    #[inline]
    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {}
        }
    }
}

/// Scheduler side of the capacity signal.
pub struct CapacityWaiter {
    rx: Receiver<()>,
}

impl CapacityWaiter {
    pub fn wait(&self, timeout: Duration) -> Result<WaitOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => Ok(WaitOutcome::Signaled),
            Err(RecvTimeoutError::Timeout) => Ok(WaitOutcome::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(Error::device(
                SinkOp::Wait,
                "capacity signal disconnected (device callback gone)",
            )),
        }
    }

    /// Drop a stale signal so the next wait reflects fresh progress.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

pub fn capacity_signal() -> (CapacityNotifier, CapacityWaiter) {
    let (tx, rx) = channel::bounded(1);
    (CapacityNotifier { tx }, CapacityWaiter { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn stereo_i16() -> AudioFormat {
        AudioFormat::new(SampleEncoding::Int16, 2, 48_000).unwrap()
    }

    fn i16_bytes(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn test_push_respects_capacity() {
        let (mut writer, _reader) = playback_ring(4, stereo_i16()).unwrap();
        assert_eq!(writer.capacity_frames(), 4);
        assert_eq!(writer.free_frames(), 4);
        assert!(writer.push(&i16_bytes(&[1, 1, 2, 2, 3, 3])));
        assert_eq!(writer.queued_frames(), 3);
        assert!(!writer.push(&i16_bytes(&[4, 4, 5, 5])));
        assert_eq!(writer.queued_frames(), 3);
        assert!(writer.push_silence(1));
        assert_eq!(writer.free_frames(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            playback_ring(0, stereo_i16()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fill_decodes_in_order() {
        let monitor = PerformanceMonitor::new(2, 48_000, 0.1);
        let (mut writer, mut reader) = playback_ring(8, stereo_i16()).unwrap();
        writer.push(&i16_bytes(&[10, 10, -20, -20, 30, 30]));
        writer.set_playing(true);

        let mut out = [0i16; 4];
        assert_eq!(reader.fill_device_buffer(&mut out, &monitor), 2);
        assert_eq!(out, [10, 10, -20, -20]);
        assert_eq!(writer.queued_frames(), 1);
        assert_eq!(writer.free_frames(), 7);
        assert_eq!(monitor.underrun_count(), 0);
        assert_eq!(writer.frames_played(), 2);
    }

    #[test]
    fn test_short_ring_pads_and_counts_underrun() {
        let monitor = PerformanceMonitor::new(2, 48_000, 0.1);
        let format = AudioFormat::new(SampleEncoding::Float32, 1, 48_000).unwrap();
        let (mut writer, mut reader) = playback_ring(8, format).unwrap();
        writer.push(&0.5f32.to_ne_bytes());

        let mut out = [9.0f32; 3];
        reader.fill_device_buffer(&mut out, &monitor);
        assert_eq!(out, [0.5, 0.0, 0.0]);
        // not playing yet: no underrun
        assert_eq!(monitor.underrun_count(), 0);

        writer.set_playing(true);
        reader.fill_device_buffer(&mut out, &monitor);
        assert_eq!(out, [0.0, 0.0, 0.0]);
        assert_eq!(monitor.underrun_count(), 1);
    }

    #[test]
    fn test_queued_audio_plays_while_writer_is_busy() {
        const CAPACITY: u32 = 4096;
        let monitor = PerformanceMonitor::new(2, 48_000, 0.1);
        let (mut writer, mut reader) = playback_ring(CAPACITY, stereo_i16()).unwrap();
        let frame = i16_bytes(&[7, 7]);
        for _ in 0..CAPACITY {
            assert!(writer.push(&frame));
        }
        writer.set_playing(true);

        // The writer keeps querying and topping up the ring from another thread
        // for the whole time the callback drains it.
        let busy = thread::spawn(move || {
            for _ in 0..20_000 {
                if writer.free_frames() > 0 {
                    assert!(writer.push(&frame));
                }
            }
            writer
        });

        let mut out = [0i16; 4];
        for _ in 0..CAPACITY / 2 {
            assert_eq!(reader.fill_device_buffer(&mut out, &monitor), 2);
            assert_eq!(out, [7, 7, 7, 7]);
        }
        let writer = busy.join().unwrap();

        assert_eq!(monitor.underrun_count(), 0);
        assert_eq!(writer.frames_played(), u64::from(CAPACITY));
    }

    #[test]
    fn test_capacity_signal() {
        let (notifier, waiter) = capacity_signal();
        assert_eq!(
            waiter.wait(Duration::from_millis(1)).unwrap(),
            WaitOutcome::TimedOut
        );
        notifier.notify();
        notifier.notify();
        assert_eq!(
            waiter.wait(Duration::from_millis(1)).unwrap(),
            WaitOutcome::Signaled
        );
        waiter.clear();
        drop(notifier);
        assert!(waiter.wait(Duration::from_millis(1)).is_err());
    }
}
