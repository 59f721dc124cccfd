//! Interrupt backends: pub/sub control signals plus expiring task state

pub mod backend;
pub mod memory;

pub use backend::{DEFAULT_STATE_TTL, InterruptBackend, SignalStream};
pub use memory::MemoryInterruptBackend;
