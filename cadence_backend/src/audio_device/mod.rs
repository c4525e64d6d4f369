pub mod cpal_sink;
pub mod enumeration;
pub mod host;
pub mod negotiation;
pub mod simulated;
pub mod sink;

pub use cpal_sink::CpalSink;
pub use enumeration::{DeviceEnumerator, DeviceInfo, HostInfo};
pub use host::AudioHost;
pub use negotiation::{ConfigNegotiator, FormatRequest, NegotiatedConfig, NegotiationError};
pub use simulated::{CommittedWrite, SimulatedSink, SinkEvent};
pub use sink::{CommitFlags, DeviceSink, WaitOutcome};
