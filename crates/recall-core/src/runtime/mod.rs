//! Background task supervision and per-session serialization.

pub mod session_lock;
pub mod supervisor;
