//! Shared vocabulary for the cadence tone renderer.
//!
//! Nothing here touches an audio device: the backend negotiates an
//! [`AudioFormat`] with the hardware and every other layer is parameterised
//! by it.

pub mod config;
pub mod error;
pub mod format;
pub mod shape;

pub use config::{BufferMode, CursorKind, RenderConfig, WakeStrategy};
pub use error::{Error, Result, SinkOp};
pub use format::{AudioFormat, SampleEncoding};
pub use shape::WaveShape;
