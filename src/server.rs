//! Server assembly.
//!
//! Loads the device-type catalogs, wires pool, recovery timer, control
//! handle and ingress together, and tears them down in order on
//! shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::catalog::{walk, DeviceTypeCatalog};
use crate::config::{default_sys_descr, FarmConfig};
use crate::control::ControlHandle;
use crate::ingress::UdpIngress;
use crate::pool::{recovery, DevicePool, PortRule};
use crate::snmp::{Oid, TypedValue, ValueKind};
use crate::stats::ServerStats;

const SYS_DESCR_0: [u32; 9] = [1, 3, 6, 1, 2, 1, 1, 1, 0];

/// A running simulator.
pub struct Server {
    pub config: Arc<FarmConfig>,
    pub pool: Arc<DevicePool>,
    pub control: ControlHandle,
    pub stats: Arc<ServerStats>,
    ingress: UdpIngress,
}

/// Load every device type's walk file into a shared catalog and build
/// the port-range rules.
pub fn build_port_rules(config: &FarmConfig) -> Result<Vec<PortRule>> {
    let mut rules = Vec::with_capacity(config.device_types.len());
    for dt in &config.device_types {
        let mut parsed = walk::parse_file(&dt.walk_file)
            .with_context(|| format!("reading walk file {}", dt.walk_file.display()))?;

        // Every type gets a distinct sysDescr: explicit config wins,
        // then whatever the walk carries, then a built-in flavor.
        let descr_oid = Oid::from(SYS_DESCR_0);
        let has_descr = parsed.records.iter().any(|r| r.oid == descr_oid);
        if let Some(text) = &dt.sys_descr {
            parsed.upsert(
                descr_oid,
                ValueKind::OctetString,
                TypedValue::OctetString(text.clone().into_bytes()),
            );
        } else if !has_descr {
            parsed.upsert(
                descr_oid,
                ValueKind::OctetString,
                TypedValue::OctetString(default_sys_descr(&dt.name).into_bytes()),
            );
        }

        let catalog = DeviceTypeCatalog::from_walk(&dt.name, parsed, &dt.behaviors)
            .with_context(|| format!("building catalog for {}", dt.name))?;
        rules.push(PortRule {
            device_type: Arc::from(dt.name.as_str()),
            range: config.effective_range(dt),
            community: config.effective_community(dt).as_bytes().to_vec(),
            catalog: Arc::new(catalog),
        });
    }
    Ok(rules)
}

impl Server {
    pub async fn start(config: Arc<FarmConfig>) -> Result<Server> {
        let rules = build_port_rules(&config)?;
        let stats = Arc::new(ServerStats::default());

        let pool = DevicePool::new(config.clone(), rules);
        pool.start_maintenance();
        let scheduler = recovery::spawn(pool.clone());
        let control = ControlHandle::new(pool.clone(), scheduler, stats.clone());

        let ingress = UdpIngress::start(config.clone(), pool.clone(), stats.clone()).await?;
        info!(
            "simulator up: {} device types, {} ports bound, capacity {}",
            config.device_types.len(),
            ingress.bound_ports,
            config.max_devices
        );

        Ok(Server {
            config,
            pool,
            control,
            stats,
            ingress,
        })
    }

    pub fn bound_ports(&self) -> usize {
        self.ingress.bound_ports
    }

    /// Stop the ingress first so no new work arrives, then release the
    /// agents.
    pub fn shutdown(&mut self) {
        self.ingress.shutdown();
        self.pool.shutdown();
        info!("simulator stopped");
    }
}
