//! Persistent cursor store for dripsync.
//!
//! This crate provides the small named-slot store the sync client keeps its
//! cursor and config in:
//! - `CursorStore` trait shared by every backend
//! - In-memory backend for tests and simulations
//! - JSON file backend that survives process restarts

pub mod file;
pub mod memory;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{CursorStore, SlotValue};
