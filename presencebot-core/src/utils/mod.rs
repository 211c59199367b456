pub mod memory;

pub use memory::{MemoryProbe, ProcessMemoryMonitor};
