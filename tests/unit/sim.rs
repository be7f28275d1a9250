//! Unit tests for value simulation and the time patterns.

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;

use snmpfarm::catalog::behavior::Behavior;
use snmpfarm::catalog::CatalogEntry;
use snmpfarm::sim::{self, patterns, CounterCell, DeviceState};
use snmpfarm::snmp::{Oid, TypedValue, ValueKind};

fn oid(s: &str) -> Oid {
    s.parse().unwrap()
}

fn entry(kind: ValueKind, base: TypedValue, behavior: Behavior) -> CatalogEntry {
    CatalogEntry {
        declared_type: kind,
        base_value: base,
        behavior,
        params: behavior.default_params(),
    }
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 12, h, m, 0).unwrap()
}

// ==================== Counters (P6, scenario 4) ====================

#[test]
fn traffic_counter_is_monotone_over_a_day_of_samples() {
    let counter_oid = oid("1.3.6.1.2.1.2.2.1.10.1");
    let e = entry(
        ValueKind::Counter64,
        TypedValue::Counter64(10_000),
        Behavior::TrafficCounter,
    );
    let mut state = DeviceState::new(99);
    let mut prev = 0u64;
    for step in 0..200u64 {
        let uptime = step as f64 * 30.0;
        let when = at((step / 60) as u32 % 24, (step % 60) as u32);
        match sim::render(&counter_oid, &e, &mut state, when, uptime) {
            TypedValue::Counter64(v) => {
                assert!(v >= prev, "counter went backwards: {} < {}", v, prev);
                prev = v;
            }
            other => panic!("wrong tag: {:?}", other),
        }
    }
    assert!(prev > 10_000, "counter never advanced");
}

#[test]
fn counter_wrap_matches_modular_arithmetic() {
    let counter_oid = oid("1.3.6.1.2.1.2.2.1.10.1");
    let e = entry(
        ValueKind::Counter32,
        TypedValue::Counter32(0),
        Behavior::TrafficCounter,
    );
    let mut state = DeviceState::new(4);
    let seed = u32::MAX as u64 - 10;
    state.counters.insert(
        counter_oid.clone(),
        CounterCell {
            value: seed,
            last_uptime: 0.0,
        },
    );
    // Default traffic rates add far more than 10 over 60 s of uptime.
    let rendered = sim::render(&counter_oid, &e, &mut state, at(12, 0), 60.0);
    let stored = state.counters[&counter_oid].value;
    assert!(stored < seed, "stored value should have wrapped");
    assert_eq!(rendered, TypedValue::Counter32(stored as u32));
}

#[test]
fn error_counter_rate_is_hourly_scale() {
    let err_oid = oid("1.3.6.1.2.1.2.2.1.14.1");
    let e = entry(
        ValueKind::Counter32,
        TypedValue::Counter32(0),
        Behavior::ErrorCounter,
    );
    let mut state = DeviceState::new(11);
    // Prime the cell, then advance one hour of uptime.
    sim::render(&err_oid, &e, &mut state, at(12, 0), 0.0);
    let after = sim::render(&err_oid, &e, &mut state, at(13, 0), 3600.0);
    match after {
        TypedValue::Counter32(v) => {
            // Hourly rates top out at 50/h before bursts; one hour of
            // errors stays far below any per-second interpretation.
            assert!(v <= 5_000, "unreasonable error count {}", v);
        }
        other => panic!("wrong tag: {:?}", other),
    }
}

// ==================== Uptime (P7) ====================

#[test]
fn uptime_ticks_are_centiseconds_mod_2_32() {
    let up_oid = oid("1.3.6.1.2.1.1.3.0");
    let e = entry(
        ValueKind::TimeTicks,
        TypedValue::TimeTicks(0),
        Behavior::UptimeTicks,
    );
    let mut state = DeviceState::new(5);
    assert_eq!(
        sim::render(&up_oid, &e, &mut state, at(8, 0), 4.5),
        TypedValue::TimeTicks(450)
    );
    // Past the 32-bit tick horizon the value wraps.
    let huge = (1u64 << 33) as f64; // seconds
    match sim::render(&up_oid, &e, &mut state, at(8, 0), huge) {
        TypedValue::TimeTicks(_) => {}
        other => panic!("wrong tag: {:?}", other),
    }
}

// ==================== Gauges ====================

#[test]
fn cpu_gauge_smooths_and_stays_in_percent_range() {
    let cpu_oid = oid("1.3.6.1.2.1.25.3.3.1.2.1");
    let e = entry(ValueKind::Integer, TypedValue::Integer(40), Behavior::CpuGauge);
    let mut state = DeviceState::new(21);
    let mut last = None;
    for _ in 0..50 {
        match sim::render(&cpu_oid, &e, &mut state, at(14, 30), 600.0) {
            TypedValue::Integer(v) => {
                assert!((0..=100).contains(&v), "cpu {} out of range", v);
                // Smoothing keeps successive samples close.
                if let Some(prev) = last {
                    let delta: i64 = v - prev;
                    assert!(delta.abs() <= 25, "jumped {} -> {}", prev, v);
                }
                last = Some(v);
            }
            other => panic!("wrong tag: {:?}", other),
        }
    }
}

#[test]
fn temperature_tracks_daily_and_seasonal_offsets() {
    let temp_oid = oid("1.3.6.1.4.1.2021.13.16.2.1.3.1");
    let e = entry(
        ValueKind::Integer,
        TypedValue::Integer(45),
        Behavior::TemperatureGauge,
    );
    let mut state = DeviceState::new(31);
    for hour in 0..24 {
        match sim::render(&temp_oid, &e, &mut state, at(hour, 0), 60.0) {
            TypedValue::Integer(v) => assert!((-10..=85).contains(&v)),
            other => panic!("wrong tag: {:?}", other),
        }
    }
}

#[test]
fn snr_gauge_respects_clamp_bounds() {
    let snr_oid = oid("1.3.6.1.2.1.10.127.1.1.4.1.5.3");
    let e = entry(ValueKind::Integer, TypedValue::Integer(35), Behavior::SnrGauge);
    let mut state = DeviceState::new(8);
    for hour in 0..24 {
        match sim::render(&snr_oid, &e, &mut state, at(hour, 17), 60.0) {
            TypedValue::Integer(v) => assert!((10..=40).contains(&v), "snr {}", v),
            other => panic!("wrong tag: {:?}", other),
        }
    }
}

// ==================== Patterns (C8 determinism) ====================

#[test]
fn patterns_are_deterministic_at_minute_granularity() {
    let a = Utc.with_ymd_and_hms(2025, 3, 12, 9, 15, 2).unwrap();
    let b = Utc.with_ymd_and_hms(2025, 3, 12, 9, 15, 59).unwrap();
    assert_eq!(patterns::minute_noise(&a, 1234), patterns::minute_noise(&b, 1234));
    assert_ne!(
        patterns::minute_noise(&a, 1234),
        patterns::minute_noise(&a, 1235)
    );
}

#[test]
fn daily_pattern_bounds_hold_across_a_week() {
    let start = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
    for minutes in (0..7 * 24 * 60).step_by(13) {
        let t = start + chrono::Duration::minutes(minutes);
        let daily = patterns::daily_utilization(&t);
        assert!((0.2..=1.5).contains(&daily));
        let weekly = patterns::weekly(&t);
        assert!((0.4..=1.1).contains(&weekly));
        let temp = patterns::daily_temperature_offset(&t);
        assert!((-5.0..=5.0).contains(&temp));
    }
}

#[test]
fn seasonal_offset_peaks_in_summer() {
    let july = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
    let january = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    assert!(patterns::seasonal_temperature_offset(&july) > 14.0);
    assert!(patterns::seasonal_temperature_offset(&january) < -13.0);
}

#[test]
fn jitter_draws_replay_for_identical_seed_and_minute() {
    let counter_oid = oid("1.3.6.1.2.1.2.2.1.10.1");
    let e = entry(
        ValueKind::Counter32,
        TypedValue::Counter32(500),
        Behavior::TrafficCounter,
    );
    let mut a = DeviceState::new(12_345);
    let mut b = DeviceState::new(12_345);
    for step in 1..10u32 {
        let when = at(9, step);
        let uptime = step as f64 * 15.0;
        assert_eq!(
            sim::render(&counter_oid, &e, &mut a, when, uptime),
            sim::render(&counter_oid, &e, &mut b, when, uptime),
            "two identically seeded devices diverged at step {}",
            step
        );
    }
}

// ==================== State lifecycle ====================

#[test]
fn reset_clears_dynamic_state_but_keeps_identity() {
    let mut state = DeviceState::new(77);
    let bias = state.utilization_bias;
    state.counters.insert(
        oid("1.3.6.1.2.1.2.2.1.10.1"),
        CounterCell {
            value: 123,
            last_uptime: 9.0,
        },
    );
    state.gauges.insert(oid("1.3.6.1.2.1.25.3.3.1.2.1"), 55.0);
    state.error_rate = 0.5;
    state.reset();
    assert!(state.counters.is_empty());
    assert!(state.gauges.is_empty());
    assert_eq!(state.error_rate, 0.0);
    assert_eq!(state.utilization_bias, bias);
}

#[test]
fn device_state_is_deterministic_per_seed() {
    let a = DeviceState::new(1000);
    let b = DeviceState::new(1000);
    let c = DeviceState::new(1001);
    assert_eq!(a.utilization_bias, b.utilization_bias);
    assert_eq!(a.signal_quality, b.signal_quality);
    assert!(a.utilization_bias != c.utilization_bias || a.signal_quality != c.signal_quality);
}
