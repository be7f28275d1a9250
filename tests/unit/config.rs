//! Unit tests for configuration parsing, defaults, and validation.

use pretty_assertions::assert_eq;

use snmpfarm::catalog::behavior::Behavior;
use snmpfarm::config::{default_sys_descr, FarmConfig};

// ==================== Defaults ====================

#[test]
fn defaults_match_the_documented_table() {
    let config = FarmConfig::default();
    assert_eq!(config.max_devices, 10_000);
    assert_eq!(config.max_memory_mb, 1024);
    assert_eq!(config.port_range_start, 30_000);
    assert_eq!(config.port_range_end, 39_999);
    assert_eq!(config.idle_timeout_ms, 1_800_000);
    assert_eq!(config.cleanup_interval_ms, 300_000);
    assert_eq!(config.worker_pool_size, 16);
    assert_eq!(config.socket_count, 4);
    assert_eq!(config.default_community, "public");
    assert_eq!(config.packet_queue_size, 10_000);
    assert!(config.enable_hot_path);
    assert_eq!(config.front_port, None);
    assert_eq!(config.max_response_size, 65_507);
    assert_eq!(config.handler_timeout_ms, 5_000);
}

// ==================== YAML parsing ====================

#[test]
fn yaml_round_trip_with_device_types() {
    let yaml = r#"
max_devices: 500
default_community: lab
device_types:
  - name: cable_modem
    walk_file: walks/cable_modem.walk
    port_range: { start: 30000, end: 30499 }
    community: cmts
    behaviors:
      - prefix: "1.3.6.1.2.1.10.127.1.1.4.1.5"
        behavior: snr_gauge
  - name: core_switch
    walk_file: walks/switch.walk
    port_range: { start: 31000, end: 31099 }
"#;
    let config: FarmConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.max_devices, 500);
    assert_eq!(config.default_community, "lab");
    assert_eq!(config.device_types.len(), 2);

    let cm = &config.device_types[0];
    assert_eq!(cm.name, "cable_modem");
    assert_eq!(config.effective_community(cm), "cmts");
    assert_eq!(config.effective_range(cm).start, 30_000);
    assert_eq!(cm.behaviors.len(), 1);
    assert_eq!(cm.behaviors[0].behavior, Behavior::SnrGauge);

    let sw = &config.device_types[1];
    assert_eq!(config.effective_community(sw), "lab");

    // Unset keys fall back to defaults.
    assert_eq!(config.worker_pool_size, 16);

    assert!(config.validate().is_ok());
}

#[test]
fn device_type_without_range_uses_the_global_default() {
    let yaml = r#"
device_types:
  - name: router
    walk_file: walks/router.walk
"#;
    let config: FarmConfig = serde_yaml::from_str(yaml).unwrap();
    let range = config.effective_range(&config.device_types[0]);
    assert_eq!((range.start, range.end), (30_000, 39_999));
    assert!(config.validate().is_ok());
}

// ==================== Validation ====================

#[test]
fn empty_config_fails_validation() {
    assert!(FarmConfig::default().validate().is_err());
}

#[test]
fn inverted_range_fails_validation() {
    let yaml = r#"
device_types:
  - name: router
    walk_file: walks/router.walk
    port_range: { start: 31000, end: 30000 }
"#;
    let config: FarmConfig = serde_yaml::from_str(yaml).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn zero_worker_pool_fails_validation() {
    let yaml = r#"
worker_pool_size: 0
device_types:
  - name: router
    walk_file: walks/router.walk
"#;
    let config: FarmConfig = serde_yaml::from_str(yaml).unwrap();
    assert!(config.validate().is_err());
}

// ==================== sysDescr flavors ====================

#[test]
fn sys_descr_defaults_are_distinct_and_nonempty() {
    let flavors = [
        default_sys_descr("cable_modem"),
        default_sys_descr("access_switch"),
        default_sys_descr("core_router"),
        default_sys_descr("generic"),
    ];
    for flavor in &flavors {
        assert!(!flavor.is_empty());
    }
    for (i, a) in flavors.iter().enumerate() {
        for b in &flavors[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
