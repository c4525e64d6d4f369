use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use quanta::{Clock, Instant as QuantaInstant};

/// Snapshot of playback metrics suitable for logging (non-RT).
#[derive(Debug, Clone)]
pub struct PerformanceSnapshot {
    /// Frames handed to the sink, silence excluded.
    pub frames_transferred: u64,
    /// Chunk transfers issued.
    pub transfer_count: u64,
    /// Times the device ran out of queued audio.
    pub underrun_count: u64,
    /// Wake-ups that found less than one chunk of free space.
    pub starved_wake_count: u64,
    pub min_transfer_nanos: Option<u64>,
    pub max_transfer_nanos: Option<u64>,
    /// EMA of the time spent generating and copying one chunk.
    pub ema_transfer_nanos: f64,
    /// Wall-clock length of one period.
    pub expected_period_nanos: f64,
    /// EMA transfer time as a share of the period.
    pub avg_load_percent: f64,
    pub timestamp: Instant,
}

/// Real-time-safe playback monitor.
///
/// Shared between the scheduler thread and the device callback. The `add_*`,
/// `increment_*` and `scoped_transfer` methods use atomics only; `snapshot`
/// is for the control thread.
pub struct PerformanceMonitor {
    clock: Clock,
    period_frames: u32,
    sample_rate: u32,

    frames_transferred: AtomicU64,
    transfer_count: AtomicU64,
    underrun_count: AtomicU64,
    starved_wake_count: AtomicU64,

    min_transfer_nanos: AtomicU64,
    max_transfer_nanos: AtomicU64,
    /// EMA stored as f64 bits.
    ema_transfer_bits: AtomicU64,

    ema_alpha: f64,
}

impl PerformanceMonitor {
    /// `ema_alpha` must lie in `(0, 1]`; around 0.05..0.2 works well.
    pub fn new(period_frames: u32, sample_rate: u32, ema_alpha: f64) -> Self {
        assert!(ema_alpha > 0.0 && ema_alpha <= 1.0);
        Self {
            clock: Clock::new(),
            period_frames,
            sample_rate,
            frames_transferred: AtomicU64::new(0),
            transfer_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            starved_wake_count: AtomicU64::new(0),
            min_transfer_nanos: AtomicU64::new(u64::MAX),
            max_transfer_nanos: AtomicU64::new(0),
            ema_transfer_bits: AtomicU64::new(0),
            ema_alpha,
        }
    }

    #[inline(always)]
    pub fn add_frames_transferred(&self, n: u64) {
        self.frames_transferred.fetch_add(n, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn increment_underrun_count(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn increment_starved_wake_count(&self) {
        self.starved_wake_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Record one transfer duration; updates min, max and EMA.
    #[inline(always)]
    pub fn record_transfer_nanos(&self, nanos: u64) {
        self.min_transfer_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_transfer_nanos.fetch_max(nanos, Ordering::Relaxed);

        // EMA_new = alpha * x + (1 - alpha) * EMA_old
        let alpha = self.ema_alpha;
        let mut old_bits = self.ema_transfer_bits.load(Ordering::Relaxed);
        loop {
            let old = f64::from_bits(old_bits);
            let new = alpha * (nanos as f64) + (1.0 - alpha) * old;
            match self.ema_transfer_bits.compare_exchange_weak(
                old_bits,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(found) => old_bits = found,
            }
        }
    }

    #[inline(always)]
    pub fn record_transfer(&self, d: Duration) {
        self.record_transfer_nanos(d.as_nanos().min(u128::from(u64::MAX)) as u64);
    }

    /// Counts a transfer now and records its duration when the guard drops.
    #[inline(always)]
    pub fn scoped_transfer(&self) -> TransferGuard<'_> {
        self.transfer_count.fetch_add(1, Ordering::Relaxed);
        TransferGuard {
            monitor: self,
            start: self.clock.now(),
        }
    }

    /// Not real-time safe. With `reset_peaks` the min/max/EMA start over.
    pub fn snapshot(&self, reset_peaks: bool) -> PerformanceSnapshot {
        let min_raw = self.min_transfer_nanos.load(Ordering::Relaxed);
        let max_raw = self.max_transfer_nanos.load(Ordering::Relaxed);
        let ema = f64::from_bits(self.ema_transfer_bits.load(Ordering::Relaxed));
        let expected_period_nanos =
            (self.period_frames as f64 / self.sample_rate as f64) * 1_000_000_000.0;
        let avg_load_percent = if expected_period_nanos > 0.0 {
            (ema / expected_period_nanos) * 100.0
        } else {
            0.0
        };

        if reset_peaks {
            self.min_transfer_nanos.store(u64::MAX, Ordering::Relaxed);
            self.max_transfer_nanos.store(0, Ordering::Relaxed);
            self.ema_transfer_bits.store(0, Ordering::Relaxed);
        }

        PerformanceSnapshot {
            frames_transferred: self.frames_transferred.load(Ordering::Relaxed),
            transfer_count: self.transfer_count.load(Ordering::Relaxed),
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            starved_wake_count: self.starved_wake_count.load(Ordering::Relaxed),
            min_transfer_nanos: (min_raw != u64::MAX).then_some(min_raw),
            max_transfer_nanos: (max_raw != 0).then_some(max_raw),
            ema_transfer_nanos: ema,
            expected_period_nanos,
            avg_load_percent,
            timestamp: Instant::now(),
        }
    }
}

/// Records transfer latency on drop. Atomics only, no allocation.
pub struct TransferGuard<'a> {
    monitor: &'a PerformanceMonitor,
    start: QuantaInstant,
}

impl Drop for TransferGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.monitor.clock.now().saturating_duration_since(self.start);
        self.monitor.record_transfer(elapsed);
    }
}
