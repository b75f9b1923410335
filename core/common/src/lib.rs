//! Common utilities and types shared across dripsync modules.
//!
//! This module provides the error taxonomy, the durable slot keys shared with
//! the companion process, and the millisecond timestamp type used by every
//! timing comparison.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{elapsed_ms, SlotKey, UtcMillis};
