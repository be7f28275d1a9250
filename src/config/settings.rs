//! Configuration settings structures.
//!
//! These structs represent the full simulator configuration tree,
//! matching the keys in config.yml.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::behavior::BehaviorOverride;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no device types configured")]
    NoDeviceTypes,
    #[error("device type {0:?} has an empty port range")]
    EmptyRange(String),
    #[error("port ranges of {0:?} and {1:?} overlap")]
    OverlappingRanges(String, String),
    #[error("{0} must be at least 1")]
    ZeroSized(&'static str),
}

/// Top-level simulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmConfig {
    // General
    pub log: String,
    pub bind_address: String,

    // Device pool
    pub max_devices: usize,
    pub max_memory_mb: usize,
    pub idle_timeout_ms: u64,
    pub cleanup_interval_ms: u64,

    // Default agent port range, used by a device type without its own
    pub port_range_start: u16,
    pub port_range_end: u16,

    // Ingress
    pub worker_pool_size: usize,
    pub socket_count: usize,
    pub packet_queue_size: usize,
    pub enable_hot_path: bool,
    /// Optional aggregate endpoint; targets are picked with the
    /// `community@port` convention.
    pub front_port: Option<u16>,

    // SNMP
    pub default_community: String,
    pub max_response_size: usize,
    pub handler_timeout_ms: u64,

    pub device_types: Vec<DeviceTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTypeConfig {
    pub name: String,
    pub walk_file: PathBuf,
    #[serde(default)]
    pub port_range: Option<PortRange>,
    #[serde(default)]
    pub community: Option<String>,
    /// Per-type sysDescr override; distinct wording per type, exact
    /// text not contractual.
    #[serde(default)]
    pub sys_descr: Option<String>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn len(&self) -> usize {
        (self.end as usize).saturating_sub(self.start as usize) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            log: "info".into(),
            bind_address: "0.0.0.0".into(),
            max_devices: 10_000,
            max_memory_mb: 1024,
            idle_timeout_ms: 1_800_000,
            cleanup_interval_ms: 300_000,
            port_range_start: 30_000,
            port_range_end: 39_999,
            worker_pool_size: 16,
            socket_count: 4,
            packet_queue_size: 10_000,
            enable_hot_path: true,
            front_port: None,
            default_community: "public".into(),
            max_response_size: 65_507,
            handler_timeout_ms: 5_000,
            device_types: Vec::new(),
        }
    }
}

impl FarmConfig {
    /// The effective port range of one device type: its own, or the
    /// global default.
    pub fn effective_range(&self, dt: &DeviceTypeConfig) -> PortRange {
        dt.port_range.unwrap_or(PortRange {
            start: self.port_range_start,
            end: self.port_range_end,
        })
    }

    pub fn effective_community<'a>(&'a self, dt: &'a DeviceTypeConfig) -> &'a str {
        dt.community.as_deref().unwrap_or(&self.default_community)
    }

    /// Reject impossible setups at load time; overlapping port ranges
    /// are a configuration error, not a runtime tie-break.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_types.is_empty() {
            return Err(ConfigError::NoDeviceTypes);
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::ZeroSized("worker_pool_size"));
        }
        if self.packet_queue_size == 0 {
            return Err(ConfigError::ZeroSized("packet_queue_size"));
        }
        if self.socket_count == 0 {
            return Err(ConfigError::ZeroSized("socket_count"));
        }

        for dt in &self.device_types {
            if self.effective_range(dt).is_empty() {
                return Err(ConfigError::EmptyRange(dt.name.clone()));
            }
        }

        for (i, a) in self.device_types.iter().enumerate() {
            for b in &self.device_types[i + 1..] {
                if self.effective_range(a).overlaps(&self.effective_range(b)) {
                    return Err(ConfigError::OverlappingRanges(
                        a.name.clone(),
                        b.name.clone(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides (for container use).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SNMPFARM_MAX_DEVICES") {
            if let Ok(n) = v.parse() {
                self.max_devices = n;
            }
        }
        if let Ok(v) = std::env::var("SNMPFARM_COMMUNITY") {
            self.default_community = v;
        }
        if let Ok(v) = std::env::var("SNMPFARM_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Ok(v) = std::env::var("SNMPFARM_WORKER_POOL_SIZE") {
            if let Ok(n) = v.parse() {
                self.worker_pool_size = n;
            }
        }
        if let Ok(v) = std::env::var("SNMPFARM_LOG") {
            self.log = v;
        }
    }
}

/// Built-in sysDescr flavors, keyed loosely by device-type name.
pub fn default_sys_descr(device_type: &str) -> String {
    let lowered = device_type.to_ascii_lowercase();
    if lowered.contains("cable") || lowered.contains("modem") {
        format!(
            "DOCSIS 3.1 Cable Modem <<HW_REV: 7; VENDOR: simulated; MODEL: {}>>",
            device_type
        )
    } else if lowered.contains("switch") {
        format!(
            "Managed L2/L3 Ethernet Switch {} Software Release 12.8",
            device_type
        )
    } else if lowered.contains("router") {
        format!(
            "Modular Services Router {} System Software Version 15.4",
            device_type
        )
    } else {
        format!("Simulated SNMP device ({})", device_type)
    }
}
