//! Value behaviors and their parameter records.
//!
//! A behavior decides how a catalog entry turns into a fresh value on
//! each read. Behaviors are inferred from well-known OID families
//! first, then from the declared type; device-type configuration can
//! override both per OID prefix.

use serde::{Deserialize, Serialize};

use crate::snmp::{Oid, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Static,
    TrafficCounter,
    PacketCounter,
    ErrorCounter,
    UtilizationGauge,
    CpuGauge,
    TemperatureGauge,
    SignalGauge,
    SnrGauge,
    PowerGauge,
    UptimeTicks,
    StatusEnum,
}

/// Tuning knobs shared by all behaviors. Rates are per second except
/// for `ErrorCounter`, where they are per hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorParams {
    pub rate_min: f64,
    pub rate_max: f64,
    /// Relative jitter amplitude applied per sample.
    pub variance: f64,
    pub burst_probability: f64,
    pub burst_factor: f64,
    pub clamp_min: f64,
    pub clamp_max: f64,
    /// Temperature correlation with CPU utilization.
    pub load_factor: f64,
}

impl Default for BehaviorParams {
    fn default() -> Self {
        BehaviorParams {
            rate_min: 0.0,
            rate_max: 0.0,
            variance: 0.1,
            burst_probability: 0.05,
            burst_factor: 10.0,
            clamp_min: 0.0,
            clamp_max: 100.0,
            load_factor: 0.15,
        }
    }
}

impl Behavior {
    pub fn default_params(self) -> BehaviorParams {
        let d = BehaviorParams::default();
        match self {
            Behavior::TrafficCounter => BehaviorParams {
                rate_min: 1_000.0,
                rate_max: 12_500_000.0,
                variance: 0.1,
                ..d
            },
            Behavior::PacketCounter => BehaviorParams {
                rate_min: 10.0,
                rate_max: 10_000.0,
                variance: 0.4,
                burst_probability: 0.1,
                burst_factor: 5.0,
                ..d
            },
            Behavior::ErrorCounter => BehaviorParams {
                // Per hour.
                rate_min: 0.5,
                rate_max: 50.0,
                variance: 0.5,
                burst_probability: 0.02,
                ..d
            },
            Behavior::UtilizationGauge | Behavior::CpuGauge => BehaviorParams {
                variance: 0.05,
                clamp_min: 0.0,
                clamp_max: 100.0,
                ..d
            },
            Behavior::TemperatureGauge => BehaviorParams {
                variance: 0.02,
                clamp_min: -10.0,
                clamp_max: 85.0,
                ..d
            },
            Behavior::SnrGauge => BehaviorParams {
                variance: 0.03,
                clamp_min: 10.0,
                clamp_max: 40.0,
                ..d
            },
            Behavior::SignalGauge => BehaviorParams {
                variance: 0.03,
                clamp_min: -15.0,
                clamp_max: 15.0,
                ..d
            },
            Behavior::PowerGauge => BehaviorParams {
                variance: 0.03,
                clamp_min: -10.0,
                clamp_max: 60.0,
                ..d
            },
            _ => d,
        }
    }
}

// IF-MIB column prefixes (RFC 2863).
const IF_IN_OCTETS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 10];
const IF_IN_UCAST_PKTS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 11];
const IF_IN_NUCAST_PKTS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 12];
const IF_IN_DISCARDS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 13];
const IF_IN_ERRORS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 14];
const IF_OUT_OCTETS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 16];
const IF_OUT_UCAST_PKTS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 17];
const IF_OUT_NUCAST_PKTS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 18];
const IF_OUT_DISCARDS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 19];
const IF_OUT_ERRORS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 20];
const IF_OPER_STATUS: [u32; 10] = [1, 3, 6, 1, 2, 1, 2, 2, 1, 8];
const IF_HC_IN_OCTETS: [u32; 11] = [1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 6];
const IF_HC_IN_UCAST: [u32; 11] = [1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 7];
const IF_HC_OUT_OCTETS: [u32; 11] = [1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 10];
const IF_HC_OUT_UCAST: [u32; 11] = [1, 3, 6, 1, 2, 1, 31, 1, 1, 1, 11];

const SYS_UPTIME: [u32; 8] = [1, 3, 6, 1, 2, 1, 1, 3];
const HR_SYSTEM_UPTIME: [u32; 9] = [1, 3, 6, 1, 2, 1, 25, 1, 1];
const HR_PROCESSOR_LOAD: [u32; 11] = [1, 3, 6, 1, 2, 1, 25, 3, 3, 1, 2];

// DOCSIS cable-interface MIB (RFC 4546).
const DOCS_IF_SIG_QUALITY_SNR: [u32; 13] = [1, 3, 6, 1, 2, 1, 10, 127, 1, 1, 4, 1, 5];
const DOCS_IF_DOWN_CHANNEL_POWER: [u32; 13] = [1, 3, 6, 1, 2, 1, 10, 127, 1, 1, 1, 1, 6];
const DOCS_IF_UP_CHANNEL_TX_POWER: [u32; 13] = [1, 3, 6, 1, 2, 1, 10, 127, 1, 2, 2, 1, 3];

// lm-sensors temperature table (UCD-SNMP-MIB extension).
const LM_TEMP_SENSOR_VALUE: [u32; 11] = [1, 3, 6, 1, 4, 1, 2021, 13, 16, 2, 1];

fn under(oid: &Oid, prefix: &[u32]) -> bool {
    oid.starts_with(&Oid::from(prefix))
}

/// Pick a behavior for a walk entry that has no explicit override.
pub fn infer(oid: &Oid, kind: ValueKind) -> Behavior {
    if under(oid, &SYS_UPTIME) || under(oid, &HR_SYSTEM_UPTIME) {
        return Behavior::UptimeTicks;
    }
    if under(oid, &IF_IN_OCTETS)
        || under(oid, &IF_OUT_OCTETS)
        || under(oid, &IF_HC_IN_OCTETS)
        || under(oid, &IF_HC_OUT_OCTETS)
    {
        return Behavior::TrafficCounter;
    }
    if under(oid, &IF_IN_UCAST_PKTS)
        || under(oid, &IF_OUT_UCAST_PKTS)
        || under(oid, &IF_IN_NUCAST_PKTS)
        || under(oid, &IF_OUT_NUCAST_PKTS)
        || under(oid, &IF_HC_IN_UCAST)
        || under(oid, &IF_HC_OUT_UCAST)
    {
        return Behavior::PacketCounter;
    }
    if under(oid, &IF_IN_ERRORS)
        || under(oid, &IF_OUT_ERRORS)
        || under(oid, &IF_IN_DISCARDS)
        || under(oid, &IF_OUT_DISCARDS)
    {
        return Behavior::ErrorCounter;
    }
    if under(oid, &IF_OPER_STATUS) {
        return Behavior::StatusEnum;
    }
    if under(oid, &HR_PROCESSOR_LOAD) {
        return Behavior::CpuGauge;
    }
    if under(oid, &DOCS_IF_SIG_QUALITY_SNR) {
        return Behavior::SnrGauge;
    }
    if under(oid, &DOCS_IF_DOWN_CHANNEL_POWER) || under(oid, &DOCS_IF_UP_CHANNEL_TX_POWER) {
        return Behavior::PowerGauge;
    }
    if under(oid, &LM_TEMP_SENSOR_VALUE) {
        return Behavior::TemperatureGauge;
    }

    match kind {
        ValueKind::Counter32 | ValueKind::Counter64 => Behavior::TrafficCounter,
        ValueKind::Gauge32 => Behavior::UtilizationGauge,
        _ => Behavior::Static,
    }
}

/// A configured behavior override, matched by OID prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorOverride {
    pub prefix: Oid,
    pub behavior: Behavior,
    #[serde(default)]
    pub params: Option<BehaviorParams>,
}
