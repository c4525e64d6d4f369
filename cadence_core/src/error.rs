//! Error types shared by every cadence crate.

use std::fmt;
use thiserror::Error;

/// The device operation that was in flight when a sink failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkOp {
    Enumerate,
    Negotiate,
    OpenStream,
    Start,
    Stop,
    QueryCapacity,
    Acquire,
    Commit,
    Wait,
}

impl fmt::Display for SinkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enumerate => "device enumeration",
            Self::Negotiate => "format negotiation",
            Self::OpenStream => "stream creation",
            Self::Start => "stream start",
            Self::Stop => "stream stop",
            Self::QueryCapacity => "capacity query",
            Self::Acquire => "buffer acquisition",
            Self::Commit => "buffer commit",
            Self::Wait => "capacity wait",
        };
        f.write_str(name)
    }
}

/// Every failure a render session can hit. None of them is retried.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error during {op}: {message}")]
    Device { op: SinkOp, message: String },

    #[error("Unsupported device format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to allocate {bytes} bytes for {what}")]
    Allocation { what: &'static str, bytes: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Playback cancelled after {frames_transferred} frames")]
    Cancelled { frames_transferred: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a driver/backend error, keeping its message and the failing operation.
    pub fn device(op: SinkOp, err: impl fmt::Display) -> Self {
        Self::Device {
            op,
            message: err.to_string(),
        }
    }

    pub fn is_device(&self) -> bool {
        matches!(self, Self::Device { .. })
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_keeps_message_and_op() {
        let err = Error::device(SinkOp::Commit, "device unplugged");
        assert!(err.is_device());
        assert_eq!(
            err.to_string(),
            "Device error during buffer commit: device unplugged"
        );
    }

    #[test]
    fn test_allocation_message() {
        let err = Error::Allocation {
            what: "sample chunk",
            bytes: 4096,
        };
        assert_eq!(err.to_string(), "Failed to allocate 4096 bytes for sample chunk");
    }
}
