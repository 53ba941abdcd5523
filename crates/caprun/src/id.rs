//! Process-wide identifier source.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh id, shared by message ids and export ids.
///
/// Monotonic and unique for the lifetime of the process. Restarting resets
/// the sequence; ids are never compared across restarts.
pub fn next_id() -> String {
    NEXT_ID.fetch_add(1, Ordering::Relaxed).to_string()
}
