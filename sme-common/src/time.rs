//! Media-time helpers
//!
//! Media time is carried as `f64` seconds throughout the engine. Decoders
//! report timestamps that are rounded to their own time base, so comparisons
//! between a presentation cursor and unit boundaries go through a small
//! tolerance rather than exact float equality.

use std::time::Duration;

/// Tolerance for media-time comparisons: one microsecond
pub const TIME_EPSILON: f64 = 1e-6;

/// Whether two media times are equal within [`TIME_EPSILON`]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIME_EPSILON
}

/// Convert seconds to whole microseconds (rounded, clamped at zero)
pub fn secs_to_micros(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * 1_000_000.0).round() as u64
}

/// Convert microseconds to seconds
pub fn micros_to_secs(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// Convert a non-negative media time to a `Duration` (negative → zero)
pub fn secs_to_duration(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs)
}

/// Clamp a requested position into `[0, duration]`
pub fn clamp_position(position: f64, duration: f64) -> f64 {
    if position.is_nan() || position <= 0.0 {
        return 0.0;
    }
    position.min(duration.max(0.0))
}

/// Format a media time as `M:SS.mmm` (or `H:MM:SS.mmm` past one hour)
///
/// Used in log lines, where seconds with three decimals are easier to line
/// up against decoder traces than raw floats.
pub fn format_media_time(secs: f64) -> String {
    let negative = secs < 0.0;
    let total_ms = (secs.abs() * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let s = total_secs % 60;
    let m = (total_secs / 60) % 60;
    let h = total_secs / 3600;

    let body = if h > 0 {
        format!("{}:{:02}:{:02}.{:03}", h, m, s, ms)
    } else {
        format!("{}:{:02}.{:03}", m, s, ms)
    };

    if negative {
        format!("-{}", body)
    } else {
        body
    }
}
