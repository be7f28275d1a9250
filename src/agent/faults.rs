//! Fault injection.
//!
//! Each agent owns a store of active fault conditions, consulted before
//! every reply. Installation is idempotent per kind: installing a
//! second `timeout` replaces the first. Faults are controlled through
//! the internal control API, never via SNMP itself.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::snmp::Oid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    PacketLoss,
    Timeout,
    SnmpError,
    Malformed,
    DeviceFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedVariant {
    Truncated,
    WrongTag,
    BadLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Reboot,
    PowerFailure,
    NetworkDisconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    #[default]
    Immediate,
    Gradual,
    ResetCounters,
}

/// One installed fault condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultConfig {
    PacketLoss {
        rate: f64,
    },
    Timeout {
        probability: f64,
        delay_ms: u64,
        /// Reply after the delay instead of staying silent.
        #[serde(default)]
        reply_after_delay: bool,
    },
    SnmpError {
        code: u32,
        probability: f64,
        #[serde(default)]
        oid_filter: Option<Oid>,
    },
    Malformed {
        variant: MalformedVariant,
        probability: f64,
    },
    DeviceFailure {
        failure: FailureType,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        recovery: RecoveryPolicy,
    },
}

impl FaultConfig {
    pub fn kind(&self) -> FaultKind {
        match self {
            FaultConfig::PacketLoss { .. } => FaultKind::PacketLoss,
            FaultConfig::Timeout { .. } => FaultKind::Timeout,
            FaultConfig::SnmpError { .. } => FaultKind::SnmpError,
            FaultConfig::Malformed { .. } => FaultKind::Malformed,
            FaultConfig::DeviceFailure { .. } => FaultKind::DeviceFailure,
        }
    }
}

/// What the fault layer decided for one request, before any catalog
/// work happens.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultVerdict {
    /// No fault fired; answer normally.
    Pass,
    /// Stay silent.
    Drop,
    /// Wait, then reply or stay silent.
    Delay { delay: Duration, reply: bool },
    /// Answer with this PDU-level error status.
    ErrorStatus(u32),
    /// Encode the normal reply, then corrupt it.
    Malformed(MalformedVariant),
}

#[derive(Debug, Default)]
pub struct FaultStore {
    active: HashMap<FaultKind, FaultConfig>,
}

impl FaultStore {
    /// Install, replacing any fault of the same kind.
    pub fn install(&mut self, config: FaultConfig) {
        self.active.insert(config.kind(), config);
    }

    pub fn clear(&mut self, kind: FaultKind) -> bool {
        self.active.remove(&kind).is_some()
    }

    pub fn clear_all(&mut self) {
        self.active.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn get(&self, kind: FaultKind) -> Option<&FaultConfig> {
        self.active.get(&kind)
    }

    pub fn kinds(&self) -> Vec<FaultKind> {
        self.active.keys().copied().collect()
    }

    /// Decide the fate of a request touching `oids`. Checked in fixed
    /// order: loss, timeout, SNMP error, malformed.
    pub fn decide(&self, oids: &[&Oid]) -> FaultVerdict {
        let mut rng = rand::thread_rng();

        if let Some(FaultConfig::PacketLoss { rate }) = self.get(FaultKind::PacketLoss) {
            if rng.gen::<f64>() < *rate {
                return FaultVerdict::Drop;
            }
        }

        if let Some(FaultConfig::Timeout {
            probability,
            delay_ms,
            reply_after_delay,
        }) = self.get(FaultKind::Timeout)
        {
            if rng.gen::<f64>() < *probability {
                return FaultVerdict::Delay {
                    delay: Duration::from_millis(*delay_ms),
                    reply: *reply_after_delay,
                };
            }
        }

        if let Some(FaultConfig::SnmpError {
            code,
            probability,
            oid_filter,
        }) = self.get(FaultKind::SnmpError)
        {
            let applies = match oid_filter {
                Some(prefix) => oids.iter().any(|oid| oid.starts_with(prefix)),
                None => true,
            };
            if applies && rng.gen::<f64>() < *probability {
                return FaultVerdict::ErrorStatus(*code);
            }
        }

        if let Some(FaultConfig::Malformed {
            variant,
            probability,
        }) = self.get(FaultKind::Malformed)
        {
            if rng.gen::<f64>() < *probability {
                return FaultVerdict::Malformed(*variant);
            }
        }

        FaultVerdict::Pass
    }
}

/// Corrupt an encoded reply per the malformed variant.
pub fn corrupt(mut bytes: Vec<u8>, variant: MalformedVariant) -> Vec<u8> {
    match variant {
        MalformedVariant::Truncated => {
            bytes.truncate(bytes.len() / 2);
            bytes
        }
        MalformedVariant::WrongTag => {
            if !bytes.is_empty() {
                // The outer SEQUENCE tag becomes a SET.
                bytes[0] = 0x31;
            }
            bytes
        }
        MalformedVariant::BadLength => {
            if bytes.len() >= 2 {
                // Claim more content than the datagram carries.
                bytes[1] = 0x7F;
            }
            bytes
        }
    }
}
