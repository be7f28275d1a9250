//! Lazy device pool.
//!
//! Ports map to device types through configured ranges; agents are
//! created on the first packet to their port, evicted after idling,
//! and recreated on death. The port map is a plain mutex held only to
//! publish slots: creation work happens outside the critical section
//! behind a pending marker that concurrent requests wait on.

pub mod recovery;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{self, AgentHandle, AgentMsg, AgentSpec, ControlMsg};
use crate::catalog::SharedCatalog;
use crate::config::{FarmConfig, PortRange};
use crate::stats::monotonic_ms;

/// Rough per-agent footprint used for the memory-pressure pass;
/// shared catalogs are excluded since they are per type.
const PER_AGENT_MEMORY_BYTES: usize = 48 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("port {0} is outside every configured range")]
    UnknownPortRange(u16),
    #[error("device capacity exhausted")]
    CapacityExceeded,
    #[error("pool is shutting down")]
    ShuttingDown,
    #[error("no agent on port {0}")]
    NotFound(u16),
    #[error("agent on port {0} is not accepting messages")]
    MailboxClosed(u16),
}

/// One configured `(device type, port range)` rule. Ranges never
/// overlap; config validation rejects that.
#[derive(Debug, Clone)]
pub struct PortRule {
    pub device_type: Arc<str>,
    pub range: PortRange,
    pub community: Vec<u8>,
    pub catalog: SharedCatalog,
}

enum Slot {
    /// Creation in progress; wait until the watch flips to true.
    Pending(watch::Receiver<bool>),
    Ready(AgentHandle),
}

#[derive(Debug, Default)]
struct PoolCounters {
    active_count: AtomicUsize,
    created_total: AtomicU64,
    evicted_total: AtomicU64,
    died_total: AtomicU64,
    peak_count: AtomicUsize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub active_count: usize,
    pub created_total: u64,
    pub evicted_total: u64,
    pub died_total: u64,
    pub peak_count: usize,
    pub max_devices: usize,
}

pub struct DevicePool {
    config: Arc<FarmConfig>,
    rules: Vec<PortRule>,
    slots: Mutex<HashMap<u16, Slot>>,
    counters: PoolCounters,
    generation: AtomicU64,
    shutting_down: AtomicBool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl DevicePool {
    pub fn new(config: Arc<FarmConfig>, rules: Vec<PortRule>) -> Arc<Self> {
        Arc::new(DevicePool {
            config,
            rules,
            slots: Mutex::new(HashMap::new()),
            counters: PoolCounters::default(),
            generation: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            maintenance: Mutex::new(None),
        })
    }

    pub fn rule_for(&self, port: u16) -> Option<&PortRule> {
        self.rules.iter().find(|rule| rule.range.contains(port))
    }

    pub fn rules(&self) -> &[PortRule] {
        &self.rules
    }

    /// Resolve the agent for a port, creating it on first use.
    /// Concurrent calls for the same port resolve to the same agent.
    pub async fn get_or_create(self: &Arc<Self>, port: u16) -> Result<AgentHandle, PoolError> {
        loop {
            if self.shutting_down.load(Ordering::Relaxed) {
                return Err(PoolError::ShuttingDown);
            }

            enum Next {
                Wait(watch::Receiver<bool>),
                Create(watch::Sender<bool>),
            }

            let next = {
                let mut slots = self.slots.lock().expect("pool lock poisoned");
                match slots.get(&port) {
                    Some(Slot::Ready(handle)) => return Ok(handle.clone()),
                    Some(Slot::Pending(rx)) => Next::Wait(rx.clone()),
                    None => {
                        if self.rule_for(port).is_none() {
                            return Err(PoolError::UnknownPortRange(port));
                        }
                        if slots.len() >= self.config.max_devices {
                            return Err(PoolError::CapacityExceeded);
                        }
                        let (tx, rx) = watch::channel(false);
                        slots.insert(port, Slot::Pending(rx));
                        Next::Create(tx)
                    }
                }
            };

            match next {
                Next::Wait(mut rx) => {
                    // The creator flips the flag after publishing; a
                    // dropped sender means creation failed, retry.
                    let _ = rx.wait_for(|ready| *ready).await;
                }
                Next::Create(tx) => {
                    let handle = self.spawn_agent(port);
                    {
                        let mut slots = self.slots.lock().expect("pool lock poisoned");
                        if self.shutting_down.load(Ordering::Relaxed) {
                            // Shutdown raced the creation; do not
                            // repopulate the drained map. Dropping the
                            // watch sender wakes the waiters.
                            slots.remove(&port);
                            return Err(PoolError::ShuttingDown);
                        }
                        slots.insert(port, Slot::Ready(handle.clone()));
                    }
                    let active = self.counters.active_count.fetch_add(1, Ordering::Relaxed) + 1;
                    self.counters.created_total.fetch_add(1, Ordering::Relaxed);
                    self.counters.peak_count.fetch_max(active, Ordering::Relaxed);
                    let _ = tx.send(true);
                    return Ok(handle);
                }
            }
        }
    }

    fn spawn_agent(self: &Arc<Self>, port: u16) -> AgentHandle {
        let rule = self.rule_for(port).expect("rule checked before spawn");
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let spec = AgentSpec {
            port,
            device_type: rule.device_type.clone(),
            community: rule.community.clone(),
            catalog: rule.catalog.clone(),
            max_response_size: self.config.max_response_size,
        };
        let (agent_task, handle, rx) = agent::build(spec, generation);
        let pool = self.clone();
        tokio::spawn(async move {
            agent_task.run(rx).await;
            pool.on_agent_exit(port, generation);
        });
        debug!("created agent on port {} ({})", port, rule.device_type);
        handle
    }

    /// Existing agent only; never creates.
    pub fn lookup(&self, port: u16) -> Option<AgentHandle> {
        let slots = self.slots.lock().expect("pool lock poisoned");
        match slots.get(&port) {
            Some(Slot::Ready(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Deliver a control message to a live agent.
    pub async fn send_control(&self, port: u16, msg: ControlMsg) -> Result<(), PoolError> {
        let handle = self.lookup(port).ok_or(PoolError::NotFound(port))?;
        handle
            .sender
            .send(AgentMsg::Control(msg))
            .await
            .map_err(|_| PoolError::MailboxClosed(port))
    }

    /// Death handling: an agent task ended while its slot was still
    /// published. Eviction removes the slot first, so reaching the map
    /// here means the agent died on its own.
    fn on_agent_exit(&self, port: u16, generation: u64) {
        let mut slots = self.slots.lock().expect("pool lock poisoned");
        if let Some(Slot::Ready(handle)) = slots.get(&port) {
            if handle.generation == generation {
                slots.remove(&port);
                self.counters.active_count.fetch_sub(1, Ordering::Relaxed);
                self.counters.died_total.fetch_add(1, Ordering::Relaxed);
                warn!("agent on port {} terminated; will recreate on demand", port);
            }
        }
    }

    /// Remove one agent, but only the generation the scanner saw; a
    /// slot that died and was recreated in between stays. Dropping the
    /// last handle closes the mailbox and ends the agent task; an
    /// in-flight request keeps its own clone and completes first.
    fn evict(&self, port: u16, generation: u64) -> bool {
        let removed = {
            let mut slots = self.slots.lock().expect("pool lock poisoned");
            match slots.get(&port) {
                Some(Slot::Ready(handle)) if handle.generation == generation => {
                    slots.remove(&port);
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.counters.active_count.fetch_sub(1, Ordering::Relaxed);
            self.counters.evicted_total.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Start the background idle/memory scanner.
    pub fn start_maintenance(self: &Arc<Self>) {
        let pool = self.clone();
        let interval = Duration::from_millis(self.config.cleanup_interval_ms.max(1));
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                pool.cleanup_pass();
            }
        });
        *self.maintenance.lock().expect("pool lock poisoned") = Some(handle);
    }

    fn cleanup_pass(&self) {
        let now = monotonic_ms();
        let idle_timeout = self.config.idle_timeout_ms;

        let mut by_age: Vec<(u64, u16, u64)> = {
            let slots = self.slots.lock().expect("pool lock poisoned");
            slots
                .iter()
                .filter_map(|(port, slot)| match slot {
                    Slot::Ready(handle) => {
                        Some((handle.shared.last_access(), *port, handle.generation))
                    }
                    Slot::Pending(_) => None,
                })
                .collect()
        };

        let mut evicted = 0usize;
        for &(last_access, port, generation) in &by_age {
            if now.saturating_sub(last_access) >= idle_timeout && self.evict(port, generation) {
                evicted += 1;
            }
        }

        // Memory pressure: shed the least-recently used agents beyond
        // the estimated budget.
        let budget = (self.config.max_memory_mb * 1024 * 1024) / PER_AGENT_MEMORY_BYTES;
        let active = self.counters.active_count.load(Ordering::Relaxed);
        if active > budget {
            by_age.sort_unstable();
            let excess = active - budget;
            for &(_, port, generation) in by_age.iter().take(excess) {
                if self.evict(port, generation) {
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            info!("cleanup pass evicted {} agents", evicted);
        }
    }

    /// Stop accepting work and drop every agent. Each agent drains the
    /// requests already in its mailbox, then terminates.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        if let Some(handle) = self.maintenance.lock().expect("pool lock poisoned").take() {
            handle.abort();
        }
        let drained: usize = {
            let mut slots = self.slots.lock().expect("pool lock poisoned");
            let count = slots.len();
            slots.clear();
            count
        };
        self.counters.active_count.store(0, Ordering::Relaxed);
        info!("pool shut down, {} agents released", drained);
    }

    pub fn active_count(&self) -> usize {
        self.counters.active_count.load(Ordering::Relaxed)
    }

    pub fn stats_snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            active_count: self.counters.active_count.load(Ordering::Relaxed),
            created_total: self.counters.created_total.load(Ordering::Relaxed),
            evicted_total: self.counters.evicted_total.load(Ordering::Relaxed),
            died_total: self.counters.died_total.load(Ordering::Relaxed),
            peak_count: self.counters.peak_count.load(Ordering::Relaxed),
            max_devices: self.config.max_devices,
        }
    }
}
