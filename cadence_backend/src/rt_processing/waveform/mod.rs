pub mod cursor;
pub mod generator;
pub mod shapes;

pub use cursor::GenerationCursor;
pub use generator::{SampleWriter, ToneGenerator, writer_for};
