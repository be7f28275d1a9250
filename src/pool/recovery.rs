//! Recovery timer service.
//!
//! One task with a min-heap of scheduled recoveries posts `Recover`
//! control messages to agents when finite device failures elapse. No
//! per-agent timers.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::agent::faults::RecoveryPolicy;
use crate::agent::{AgentMsg, ControlMsg};

use super::DevicePool;

struct Pending {
    fire_at: Instant,
    port: u16,
    policy: RecoveryPolicy,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.port == other.port
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    /// Reversed so the BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.port.cmp(&self.port))
    }
}

#[derive(Clone)]
pub struct RecoveryScheduler {
    tx: mpsc::UnboundedSender<Pending>,
}

impl RecoveryScheduler {
    pub fn schedule(&self, port: u16, delay: Duration, policy: RecoveryPolicy) {
        let _ = self.tx.send(Pending {
            fire_at: Instant::now() + delay,
            port,
            policy,
        });
    }
}

/// Spawn the timer task. It lives until the scheduler handle is
/// dropped.
pub fn spawn(pool: Arc<DevicePool>) -> RecoveryScheduler {
    let (tx, mut rx) = mpsc::unbounded_channel::<Pending>();
    tokio::spawn(async move {
        let mut heap: BinaryHeap<Pending> = BinaryHeap::new();
        loop {
            let next_deadline = heap.peek().map(|p| p.fire_at);
            tokio::select! {
                req = rx.recv() => match req {
                    Some(pending) => heap.push(pending),
                    None => break,
                },
                _ = async {
                    match next_deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    let now = Instant::now();
                    while heap.peek().is_some_and(|p| p.fire_at <= now) {
                        let due = heap.pop().expect("peeked entry");
                        fire(&pool, due).await;
                    }
                }
            }
        }
    });
    RecoveryScheduler { tx }
}

async fn fire(pool: &Arc<DevicePool>, due: Pending) {
    debug!("recovery timer fired for port {}", due.port);
    if let Some(handle) = pool.lookup(due.port) {
        let _ = handle
            .sender
            .send(AgentMsg::Control(ControlMsg::Recover(due.policy)))
            .await;
    }
}
