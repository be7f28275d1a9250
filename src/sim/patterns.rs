//! Time-of-day, weekly, and seasonal load patterns.
//!
//! Every function here is a pure function of UTC wall time. The noise
//! helpers hash the UTC minute, so two processes sampling the same
//! minute see the same value; traffic bursts reproduce across runs.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Fractional hour of day, smooth at minute granularity.
fn hour_of_day(t: &DateTime<Utc>) -> f64 {
    t.hour() as f64 + t.minute() as f64 / 60.0 + t.second() as f64 / 3600.0
}

/// Smooth interpolation between adjacent control points.
fn cosine_interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    debug_assert!(points.len() >= 2);
    let mut prev = points[0];
    for &point in &points[1..] {
        if x <= point.0 {
            let span = point.0 - prev.0;
            if span <= f64::EPSILON {
                return point.1;
            }
            let frac = (x - prev.0) / span;
            let eased = (1.0 - (std::f64::consts::PI * frac).cos()) / 2.0;
            return prev.1 + (point.1 - prev.1) * eased;
        }
        prev = point;
    }
    prev.1
}

/// Diurnal utilization multiplier in [0.2, 1.5]: quiet overnight,
/// morning ramp, business plateau with a lunch dip, residential evening
/// peak, late decline.
pub fn daily_utilization(t: &DateTime<Utc>) -> f64 {
    const CURVE: [(f64, f64); 12] = [
        (0.0, 0.30),
        (2.0, 0.22),
        (5.0, 0.20),
        (9.0, 1.00),
        (12.0, 1.05),
        (12.75, 0.90),
        (14.0, 1.05),
        (17.0, 1.00),
        (18.0, 1.15),
        (19.5, 1.50),
        (21.0, 1.35),
        (24.0, 0.30),
    ];
    cosine_interpolate(&CURVE, hour_of_day(t)).clamp(0.2, 1.5)
}

/// Day-of-week multiplier: weekdays near 1.0 with a small per-day
/// bias, Saturday 0.7, Sunday 0.5, plus a daytime weekend adjustment.
pub fn weekly(t: &DateTime<Utc>) -> f64 {
    let base = match t.weekday() {
        Weekday::Mon => 0.98,
        Weekday::Tue => 1.00,
        Weekday::Wed => 1.02,
        Weekday::Thu => 1.01,
        Weekday::Fri => 0.95,
        Weekday::Sat => 0.70,
        Weekday::Sun => 0.50,
    };
    let hour = hour_of_day(t);
    let weekend = matches!(t.weekday(), Weekday::Sat | Weekday::Sun);
    if weekend && (10.0..22.0).contains(&hour) {
        base + 0.05
    } else {
        base
    }
}

/// Diurnal temperature offset in [-5, +5] degrees: minimum at 06:00,
/// maximum at 15:00.
pub fn daily_temperature_offset(t: &DateTime<Utc>) -> f64 {
    let hour = hour_of_day(t);
    if (6.0..15.0).contains(&hour) {
        // Rising half-wave, 06:00 to 15:00.
        -5.0 * (std::f64::consts::PI * (hour - 6.0) / 9.0).cos()
    } else {
        // Falling half-wave, 15:00 back around to 06:00.
        let elapsed = if hour >= 15.0 { hour - 15.0 } else { hour + 9.0 };
        5.0 * (std::f64::consts::PI * elapsed / 15.0).cos()
    }
}

/// Seasonal temperature offset in [-15, +15] degrees, peaking around
/// July 1 (northern-hemisphere bias).
pub fn seasonal_temperature_offset(t: &DateTime<Utc>) -> f64 {
    let day = t.ordinal() as f64;
    15.0 * (2.0 * std::f64::consts::PI * (day - 182.0) / 365.25).cos()
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn minute_epoch(t: &DateTime<Utc>) -> u64 {
    (t.timestamp().max(0) as u64) / 60
}

/// Deterministic noise in [0, 1): identical for identical (minute,
/// salt) across processes.
pub fn minute_noise(t: &DateTime<Utc>, salt: u64) -> f64 {
    let bits = splitmix64(minute_epoch(t) ^ salt.rotate_left(17));
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

/// A seeded generator for behaviors that need several draws per
/// sample, still deterministic in the UTC minute.
pub fn minute_rng(t: &DateTime<Utc>, salt: u64) -> StdRng {
    StdRng::seed_from_u64(splitmix64(minute_epoch(t) ^ salt.rotate_left(17)))
}
