//! Value simulation.
//!
//! Turns a static catalog entry into a fresh, type-correct value on
//! every read. Counters accumulate over the uptime elapsed since their
//! previous sample, so they are monotone between wraps by construction;
//! gauges smooth toward a pattern-driven target and clamp to their
//! configured bounds.

pub mod patterns;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;

use crate::catalog::behavior::Behavior;
use crate::catalog::CatalogEntry;
use crate::snmp::{Oid, TypedValue, ValueKind};

/// Salt mixed into the shared weather noise so it differs from other
/// pattern draws.
const WEATHER_SALT: u64 = 0x5745_4154;

/// Interface status values per IF-MIB ifOperStatus.
pub const STATUS_UP: i64 = 1;
pub const STATUS_DOWN: i64 = 2;
pub const STATUS_DEGRADED: i64 = 3;

/// One counter accumulator. `value` already has the declared width's
/// modulus applied; `last_uptime` is the uptime at the previous sample.
#[derive(Debug, Clone, Copy)]
pub struct CounterCell {
    pub value: u64,
    pub last_uptime: f64,
}

/// Mutable per-device simulation state, owned by the agent and only
/// touched from its serialized handler.
#[derive(Debug)]
pub struct DeviceState {
    pub counters: HashMap<Oid, CounterCell>,
    pub gauges: HashMap<Oid, f64>,
    pub status_vars: HashMap<Oid, i64>,
    /// Mixed into every jitter draw; fixed at creation.
    pub noise_seed: u64,
    /// Per-device multiplier on the shared load patterns, fixed at
    /// creation.
    pub utilization_bias: f64,
    /// Link quality in [0, 1]; degraded by fault injection.
    pub signal_quality: f64,
    /// Overall health in [0, 1]; below 0.5 the device reports down.
    pub health: f64,
    /// Fraction of traffic erroring, drives status degradation.
    pub error_rate: f64,
}

impl DeviceState {
    /// Deterministic per-device state from a seed (port + device type).
    pub fn new(seed: u64) -> Self {
        let unit = |salt: u64| {
            let bits = seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .rotate_left(13)
                .wrapping_add(salt)
                .wrapping_mul(0xBF58_476D_1CE4_E5B9);
            (bits >> 11) as f64 / (1u64 << 53) as f64
        };
        DeviceState {
            counters: HashMap::new(),
            gauges: HashMap::new(),
            status_vars: HashMap::new(),
            noise_seed: seed,
            utilization_bias: 0.8 + 0.4 * unit(1),
            signal_quality: 0.7 + 0.3 * unit(2),
            health: 1.0,
            error_rate: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.counters.clear();
        self.gauges.clear();
        self.status_vars.clear();
        self.health = 1.0;
        self.error_rate = 0.0;
    }
}

/// Render a fresh value for `oid` from its catalog entry and the
/// device state. The returned value's wire tag always equals the
/// entry's declared type.
pub fn render(
    oid: &Oid,
    entry: &CatalogEntry,
    state: &mut DeviceState,
    now: DateTime<Utc>,
    uptime_secs: f64,
) -> TypedValue {
    match entry.behavior {
        Behavior::Static => entry.base_value.clone(),
        Behavior::TrafficCounter => step_counter(oid, entry, state, now, uptime_secs, false),
        Behavior::PacketCounter => step_counter(oid, entry, state, now, uptime_secs, false),
        Behavior::ErrorCounter => step_counter(oid, entry, state, now, uptime_secs, true),
        Behavior::UtilizationGauge | Behavior::CpuGauge => {
            smooth_gauge(oid, entry, state, now)
        }
        Behavior::TemperatureGauge => temperature_gauge(entry, state, now),
        Behavior::SnrGauge => snr_gauge(oid, entry, state, now),
        Behavior::SignalGauge | Behavior::PowerGauge => modulated_gauge(oid, entry, state, now),
        Behavior::UptimeTicks => {
            emit_unsigned(entry.declared_type, ((uptime_secs * 100.0) as u64) & 0xFFFF_FFFF)
        }
        Behavior::StatusEnum => status_enum(oid, entry, state),
    }
}

fn oid_salt(oid: &Oid) -> u64 {
    oid.components()
        .iter()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, &c| {
            (h ^ c as u64).wrapping_mul(0x100_0000_01b3)
        })
}

/// Jitter generator, deterministic in (UTC minute, device, OID):
/// replaying the same instant reproduces the same draws, bursts
/// included, across processes.
fn sample_rng(state: &DeviceState, oid: &Oid, now: &DateTime<Utc>) -> StdRng {
    patterns::minute_rng(now, state.noise_seed ^ oid_salt(oid))
}

/// Normalized utilization in [0, 1] for this instant and device.
fn utilization(state: &DeviceState, now: &DateTime<Utc>) -> f64 {
    let raw = patterns::daily_utilization(now) * patterns::weekly(now) * state.utilization_bias;
    (raw / 1.5).clamp(0.0, 1.0)
}

fn counter_modulus_mask(kind: ValueKind) -> u64 {
    match kind {
        ValueKind::Counter64 => u64::MAX,
        _ => 0xFFFF_FFFF,
    }
}

fn step_counter(
    oid: &Oid,
    entry: &CatalogEntry,
    state: &mut DeviceState,
    now: DateTime<Utc>,
    uptime_secs: f64,
    per_hour: bool,
) -> TypedValue {
    let params = &entry.params;
    let util = utilization(state, &now);

    let rate = if per_hour {
        // Error counters mix load with link quality; bursts are rare
        // but violent.
        let hourly = params.rate_max * (0.7 * util + 0.3 * (1.0 - state.signal_quality));
        hourly.max(params.rate_min) / 3600.0
    } else {
        params.rate_min + (params.rate_max - params.rate_min) * util
    };

    let mut rng = sample_rng(state, oid, &now);
    let jitter = 1.0 + params.variance * (2.0 * rng.gen::<f64>() - 1.0);
    let burst = if rng.gen::<f64>() < params.burst_probability {
        params.burst_factor
    } else {
        1.0
    };

    let mask = counter_modulus_mask(entry.declared_type);
    let cell = state.counters.entry(oid.clone()).or_insert_with(|| CounterCell {
        value: unsigned_base(&entry.base_value) & mask,
        last_uptime: uptime_secs,
    });
    let elapsed = (uptime_secs - cell.last_uptime).max(0.0);
    let increment = (rate * elapsed * jitter * burst).trunc();
    let increment = if increment.is_finite() && increment > 0.0 {
        increment as u64
    } else {
        0
    };
    cell.value = cell.value.wrapping_add(increment) & mask;
    cell.last_uptime = uptime_secs;

    emit_unsigned(entry.declared_type, cell.value)
}

fn smooth_gauge(
    oid: &Oid,
    entry: &CatalogEntry,
    state: &mut DeviceState,
    now: DateTime<Utc>,
) -> TypedValue {
    let params = entry.params.clone();
    let base = numeric_base(&entry.base_value);
    let target = base
        * patterns::daily_utilization(&now)
        * patterns::weekly(&now)
        * state.utilization_bias;

    let prev = *state.gauges.get(oid).unwrap_or(&base);
    let mut rng = sample_rng(state, oid, &now);
    let noise = 1.0 + params.variance * (2.0 * rng.gen::<f64>() - 1.0);
    let next = (prev + 0.1 * (target - prev)) * noise;
    let next = next.clamp(params.clamp_min, params.clamp_max);
    state.gauges.insert(oid.clone(), next);

    emit_numeric(entry.declared_type, next)
}

fn temperature_gauge(
    entry: &CatalogEntry,
    state: &mut DeviceState,
    now: DateTime<Utc>,
) -> TypedValue {
    let params = &entry.params;
    let cpu_utilization = 100.0 * utilization(state, &now);
    let value = numeric_base(&entry.base_value)
        + patterns::daily_temperature_offset(&now)
        + patterns::seasonal_temperature_offset(&now)
        + params.load_factor * cpu_utilization;
    emit_numeric(
        entry.declared_type,
        value.clamp(params.clamp_min, params.clamp_max),
    )
}

fn snr_gauge(
    oid: &Oid,
    entry: &CatalogEntry,
    state: &mut DeviceState,
    now: DateTime<Utc>,
) -> TypedValue {
    let params = &entry.params;
    let util = utilization(state, &now);
    // Weather is shared across the farm: every device sees the same
    // factor for the same minute.
    let weather = 0.92 + 0.16 * patterns::minute_noise(&now, WEATHER_SALT);
    let mut rng = sample_rng(state, oid, &now);
    let noise = 1.0 + params.variance * (2.0 * rng.gen::<f64>() - 1.0);
    let value = numeric_base(&entry.base_value) * (1.0 - util * 0.2) * weather * noise;
    emit_numeric(
        entry.declared_type,
        value.clamp(params.clamp_min, params.clamp_max),
    )
}

fn modulated_gauge(
    oid: &Oid,
    entry: &CatalogEntry,
    state: &mut DeviceState,
    now: DateTime<Utc>,
) -> TypedValue {
    let params = &entry.params;
    let temperature_swing = patterns::daily_temperature_offset(&now)
        + patterns::seasonal_temperature_offset(&now);
    let mut rng = sample_rng(state, oid, &now);
    let noise = params.variance * (2.0 * rng.gen::<f64>() - 1.0);
    let value = numeric_base(&entry.base_value)
        + 0.1 * temperature_swing
        + 2.0 * (state.signal_quality - 0.5)
        + noise;
    emit_numeric(
        entry.declared_type,
        value.clamp(params.clamp_min, params.clamp_max),
    )
}

fn status_enum(oid: &Oid, entry: &CatalogEntry, state: &mut DeviceState) -> TypedValue {
    let status = if state.health < 0.5 {
        STATUS_DOWN
    } else if state.error_rate > 0.1 {
        STATUS_DEGRADED
    } else {
        STATUS_UP
    };
    state.status_vars.insert(oid.clone(), status);
    match entry.declared_type {
        ValueKind::OctetString => {
            let name: &[u8] = match status {
                STATUS_DOWN => b"down",
                STATUS_DEGRADED => b"degraded",
                _ => b"up",
            };
            TypedValue::OctetString(name.to_vec())
        }
        _ => emit_numeric(entry.declared_type, status as f64),
    }
}

/// Base value as an exact unsigned, for counter seeding.
fn unsigned_base(value: &TypedValue) -> u64 {
    match value {
        TypedValue::Counter64(v) => *v,
        TypedValue::Counter32(v) | TypedValue::Gauge32(v) | TypedValue::TimeTicks(v) => *v as u64,
        TypedValue::Integer(v) => (*v).max(0) as u64,
        other => numeric_base(other) as u64,
    }
}

/// Base value as f64, for behaviors that need arithmetic on it.
fn numeric_base(value: &TypedValue) -> f64 {
    match value {
        TypedValue::Integer(v) => *v as f64,
        TypedValue::Counter32(v) | TypedValue::Gauge32(v) | TypedValue::TimeTicks(v) => *v as f64,
        TypedValue::Counter64(v) => *v as f64,
        TypedValue::OctetString(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Emit an unsigned accumulator under the declared tag.
fn emit_unsigned(kind: ValueKind, value: u64) -> TypedValue {
    match kind {
        ValueKind::Counter64 => TypedValue::Counter64(value),
        ValueKind::Counter32 => TypedValue::Counter32((value & 0xFFFF_FFFF) as u32),
        ValueKind::Gauge32 => TypedValue::Gauge32((value & 0xFFFF_FFFF) as u32),
        ValueKind::TimeTicks => TypedValue::TimeTicks((value & 0xFFFF_FFFF) as u32),
        ValueKind::Integer => TypedValue::Integer((value & 0x7FFF_FFFF) as i64),
        ValueKind::OctetString => TypedValue::OctetString(value.to_string().into_bytes()),
        _ => TypedValue::Counter32((value & 0xFFFF_FFFF) as u32),
    }
}

/// Emit a float result as an integer value under the declared tag.
fn emit_numeric(kind: ValueKind, value: f64) -> TypedValue {
    let rounded = value.round();
    match kind {
        ValueKind::Integer => TypedValue::Integer(rounded as i64),
        ValueKind::Gauge32 => TypedValue::Gauge32(rounded.max(0.0) as u32),
        ValueKind::Counter32 => TypedValue::Counter32(rounded.max(0.0) as u32),
        ValueKind::Counter64 => TypedValue::Counter64(rounded.max(0.0) as u64),
        ValueKind::TimeTicks => TypedValue::TimeTicks(rounded.max(0.0) as u32),
        ValueKind::OctetString => TypedValue::OctetString(format!("{:.1}", value).into_bytes()),
        _ => TypedValue::Integer(rounded as i64),
    }
}
