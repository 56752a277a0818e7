pub mod memory;

pub use memory::{MemoryBackend, RowSink};
