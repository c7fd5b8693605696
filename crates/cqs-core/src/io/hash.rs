//! Content hashing for change detection
//!
//! Filesystem watchers report several events per logical write (create,
//! data-modify, metadata). Hashing the file content lets the watcher drop
//! notifications that carry no actual change.

/// Compute BLAKE3 hash of content, hex-encoded for comparison and logging.
pub fn compute_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}
