//! Internal control API.
//!
//! Fault injection and operational control ride the same mailboxes as
//! SNMP requests, so every operation is serialized with the traffic it
//! manipulates. This API is message-passing over handles; it is not
//! reachable through SNMP.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::info;

use crate::agent::faults::{FailureType, FaultConfig, FaultKind};
use crate::agent::{AgentInfo, AgentMsg, ControlMsg};
use crate::pool::recovery::RecoveryScheduler;
use crate::pool::{DevicePool, PoolError, PoolStatsSnapshot};
use crate::stats::{ServerStats, StatsSnapshot};

/// Combined server + pool counters for `get_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct FullStats {
    pub server: StatsSnapshot,
    pub pool: PoolStatsSnapshot,
}

#[derive(Clone)]
pub struct ControlHandle {
    pool: Arc<DevicePool>,
    scheduler: RecoveryScheduler,
    stats: Arc<ServerStats>,
}

impl ControlHandle {
    pub fn new(
        pool: Arc<DevicePool>,
        scheduler: RecoveryScheduler,
        stats: Arc<ServerStats>,
    ) -> Self {
        ControlHandle {
            pool,
            scheduler,
            stats,
        }
    }

    /// Install a fault on a port, creating the agent if it does not
    /// exist yet so faults can be staged before traffic arrives.
    /// Finite device failures get their recovery scheduled here.
    pub async fn install_fault(&self, port: u16, config: FaultConfig) -> Result<(), PoolError> {
        let handle = self.pool.get_or_create(port).await?;
        let schedule = match &config {
            FaultConfig::DeviceFailure {
                failure,
                duration_ms: Some(ms),
                recovery,
            } if !matches!(failure, FailureType::PowerFailure) => Some((*ms, *recovery)),
            _ => None,
        };
        handle
            .sender
            .send(AgentMsg::Control(ControlMsg::InstallFault(config)))
            .await
            .map_err(|_| PoolError::MailboxClosed(port))?;
        if let Some((ms, recovery)) = schedule {
            self.scheduler
                .schedule(port, Duration::from_millis(ms), recovery);
        }
        info!("fault installed on port {}", port);
        Ok(())
    }

    pub async fn clear_fault(&self, port: u16, kind: FaultKind) -> Result<(), PoolError> {
        self.pool
            .send_control(port, ControlMsg::ClearFault(kind))
            .await
    }

    pub async fn clear_all_faults(&self, port: u16) -> Result<(), PoolError> {
        self.pool
            .send_control(port, ControlMsg::ClearAllFaults)
            .await
    }

    /// Operational reboot: uptime restarts and dynamic state clears,
    /// but the agent keeps serving.
    pub async fn reboot(&self, port: u16) -> Result<(), PoolError> {
        let handle = self.pool.get_or_create(port).await?;
        handle
            .sender
            .send(AgentMsg::Control(ControlMsg::Reboot))
            .await
            .map_err(|_| PoolError::MailboxClosed(port))
    }

    pub async fn get_info(&self, port: u16) -> Result<AgentInfo, PoolError> {
        let handle = self.pool.lookup(port).ok_or(PoolError::NotFound(port))?;
        let (tx, rx) = oneshot::channel();
        handle
            .sender
            .send(AgentMsg::Control(ControlMsg::GetInfo(tx)))
            .await
            .map_err(|_| PoolError::MailboxClosed(port))?;
        rx.await.map_err(|_| PoolError::MailboxClosed(port))
    }

    pub fn get_stats(&self) -> FullStats {
        FullStats {
            server: self.stats.snapshot(),
            pool: self.pool.stats_snapshot(),
        }
    }
}
