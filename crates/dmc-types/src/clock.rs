//! Process clocks.
//!
//! Control logic runs on [`monotonic_ms`], which never jumps backwards;
//! published timestamps use [`wall_clock_ms`].

use std::sync::OnceLock;
use std::time::Instant;

use chrono::Utc;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the first call in this process.
pub fn monotonic_ms() -> u64 {
    let origin = ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_millis() as u64
}

/// Milliseconds since the Unix epoch.
pub fn wall_clock_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
