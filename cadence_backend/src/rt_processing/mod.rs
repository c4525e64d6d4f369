pub mod buffer_pool;
pub mod callback;
pub mod performance;
pub mod scheduler;
pub mod waveform;

pub use buffer_pool::{PendingChunk, SampleBufferPool, SampleChunk};
pub use performance::{PerformanceMonitor, PerformanceSnapshot};
pub use scheduler::{
    CancellationToken, PlaybackReport, PlaybackScheduler, PlaybackSession, PlaybackState,
    SchedulerOptions,
};
