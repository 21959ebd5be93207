//! Wall-clock timestamps and window indices.
//!
//! Record time is plain fractional seconds since the Unix epoch, the unit
//! `__time` carries on the wire. A window index ("bin") is
//! `floor(time / period)`.

use chrono::Utc;
use std::time::Duration;

/// Current wall-clock time in fractional seconds.
pub fn now_seconds() -> f64 {
  Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Window index of `time` for windows of length `period`.
///
/// `period` must be non-zero; zero-length windows are modelled as
/// unbounded filters and never reach this function.
pub fn bin_of(time: f64, period: Duration) -> i64 {
  (time / period.as_secs_f64()).floor() as i64
}
