//! Process-level concerns: single-instance locking and signal handling.

pub mod lock;
pub mod shutdown;
