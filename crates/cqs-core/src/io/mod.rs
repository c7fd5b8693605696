//! Atomic file I/O for the shared state directory
//!
//! Every write to the shared medium goes through [`atomic::write_json_atomic`]
//! so that a concurrently reading instance never observes a torn file.

pub mod atomic;
pub mod hash;

pub use atomic::{read_json, write_json_atomic};
pub use hash::compute_hash;
