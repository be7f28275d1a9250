//! UDP ingress.
//!
//! Binds one socket per agent port (plus an optional reuse-port group
//! on the aggregate front endpoint), pushes datagrams through a single
//! bounded work queue with drop-at-admission backpressure, and fans
//! decoding out to a fixed pool of workers. Responses leave on the
//! socket the request arrived on.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::agent::{AgentMsg, AgentResponse};
use crate::config::FarmConfig;
use crate::pool::{DevicePool, PoolError};
use crate::snmp::{
    self, error_status, Oid, Pdu, PduType, SnmpMessage, TypedValue, ValueKind, VarBind,
};
use crate::stats::ServerStats;

const SYS_DESCR_0: [u32; 9] = [1, 3, 6, 1, 2, 1, 1, 1, 0];
const SYS_UPTIME_0: [u32; 9] = [1, 3, 6, 1, 2, 1, 1, 3, 0];

/// Backpressure hysteresis: drop above the high watermark, readmit
/// below the low one.
const HIGH_WATERMARK_PCT: usize = 90;
const LOW_WATERMARK_PCT: usize = 50;

struct WorkItem {
    bytes: Vec<u8>,
    peer: SocketAddr,
    socket: Arc<UdpSocket>,
    /// Destination port the datagram arrived on.
    port: u16,
    /// Arrived on the aggregate endpoint; target is in the community.
    via_front: bool,
}

struct Admission {
    depth: AtomicUsize,
    high: usize,
    low: usize,
    accepting: AtomicBool,
}

impl Admission {
    fn new(capacity: usize) -> Self {
        Admission {
            depth: AtomicUsize::new(0),
            high: capacity * HIGH_WATERMARK_PCT / 100,
            low: capacity * LOW_WATERMARK_PCT / 100,
            accepting: AtomicBool::new(true),
        }
    }

    fn try_admit(&self) -> bool {
        let depth = self.depth.load(Ordering::Relaxed);
        if self.accepting.load(Ordering::Relaxed) {
            if depth >= self.high {
                self.accepting.store(false, Ordering::Relaxed);
                false
            } else {
                true
            }
        } else if depth <= self.low {
            self.accepting.store(true, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    fn enqueued(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn dequeued(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct UdpIngress {
    tasks: Vec<JoinHandle<()>>,
    pub bound_ports: usize,
}

impl UdpIngress {
    /// Bind every configured port and start the worker pool.
    pub async fn start(
        config: Arc<FarmConfig>,
        pool: Arc<DevicePool>,
        stats: Arc<ServerStats>,
    ) -> Result<UdpIngress> {
        let (work_tx, work_rx) = mpsc::channel::<WorkItem>(config.packet_queue_size);
        let admission = Arc::new(Admission::new(config.packet_queue_size));
        let mut tasks = Vec::new();
        let mut bound_ports = 0usize;

        for rule in pool.rules() {
            for port in rule.range.start..=rule.range.end {
                let addr: SocketAddr = format!("{}:{}", config.bind_address, port)
                    .parse()
                    .with_context(|| format!("invalid bind address {}", config.bind_address))?;
                let socket = match bind_udp(addr, false) {
                    Ok(socket) => Arc::new(socket),
                    Err(e) => {
                        warn!("skipping port {}: {}", port, e);
                        continue;
                    }
                };
                bound_ports += 1;
                tasks.push(spawn_receiver(
                    socket,
                    port,
                    false,
                    work_tx.clone(),
                    admission.clone(),
                    stats.clone(),
                ));
            }
        }

        if let Some(front_port) = config.front_port {
            let addr: SocketAddr = format!("{}:{}", config.bind_address, front_port)
                .parse()
                .context("invalid front endpoint address")?;
            for _ in 0..config.socket_count {
                let socket = Arc::new(
                    bind_udp(addr, true)
                        .with_context(|| format!("binding front endpoint {}", addr))?,
                );
                tasks.push(spawn_receiver(
                    socket,
                    front_port,
                    true,
                    work_tx.clone(),
                    admission.clone(),
                    stats.clone(),
                ));
            }
            info!(
                "front endpoint on {} with {} receive queues",
                addr, config.socket_count
            );
        }
        drop(work_tx);

        let work_rx = Arc::new(Mutex::new(work_rx));
        for worker_id in 0..config.worker_pool_size {
            tasks.push(spawn_worker(
                worker_id,
                work_rx.clone(),
                admission.clone(),
                config.clone(),
                pool.clone(),
                stats.clone(),
            ));
        }

        info!(
            "ingress listening on {} agent ports, {} decode workers",
            bound_ports, config.worker_pool_size
        );
        Ok(UdpIngress { tasks, bound_ports })
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for UdpIngress {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bind a UDP socket with address reuse; `reuse_port` additionally
/// spreads one port over multiple kernel receive queues.
fn bind_udp(addr: SocketAddr, reuse_port: bool) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    if reuse_port {
        socket.set_reuse_port(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

fn spawn_receiver(
    socket: Arc<UdpSocket>,
    port: u16,
    via_front: bool,
    work_tx: mpsc::Sender<WorkItem>,
    admission: Arc<Admission>,
    stats: Arc<ServerStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; snmp::MAX_UDP_PAYLOAD];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("recv error on port {}: {}", port, e);
                    continue;
                }
            };
            ServerStats::incr(&stats.packets_received);

            if !admission.try_admit() {
                ServerStats::incr(&stats.dropped_backpressure);
                continue;
            }
            let item = WorkItem {
                bytes: buf[..len].to_vec(),
                peer,
                socket: socket.clone(),
                port,
                via_front,
            };
            match work_tx.try_send(item) {
                Ok(()) => admission.enqueued(),
                Err(_) => ServerStats::incr(&stats.dropped_backpressure),
            }
        }
    })
}

fn spawn_worker(
    worker_id: usize,
    work_rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    admission: Arc<Admission>,
    config: Arc<FarmConfig>,
    pool: Arc<DevicePool>,
    stats: Arc<ServerStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("decode worker {} started", worker_id);
        loop {
            let item = {
                let mut rx = work_rx.lock().await;
                rx.recv().await
            };
            let Some(item) = item else { break };
            admission.dequeued();
            handle_packet(item, &config, &pool, &stats).await;
        }
        debug!("decode worker {} stopped", worker_id);
    })
}

async fn handle_packet(
    item: WorkItem,
    config: &Arc<FarmConfig>,
    pool: &Arc<DevicePool>,
    stats: &Arc<ServerStats>,
) {
    let mut msg = match snmp::decode(&item.bytes) {
        Ok(msg) => msg,
        Err(e) => {
            trace!("undecodable packet from {}: {}", item.peer, e);
            ServerStats::incr(&stats.decode_errors);
            return;
        }
    };

    // On the front endpoint the community carries the target:
    // "public@30017" addresses the agent on port 30017.
    let target_port = if item.via_front {
        match split_front_community(&msg.community) {
            Some((community, port)) => {
                msg.community = community;
                port
            }
            None => {
                ServerStats::incr(&stats.auth_failures);
                return;
            }
        }
    } else {
        item.port
    };

    let Some(rule) = pool.rule_for(target_port) else {
        ServerStats::incr(&stats.unknown_port_drops);
        return;
    };

    // Authentication failures are silent per RFC practice.
    if msg.community != rule.community {
        ServerStats::incr(&stats.auth_failures);
        return;
    }

    match msg.pdu.pdu_type {
        PduType::GetRequest => ServerStats::incr(&stats.get_requests),
        PduType::GetNextRequest => ServerStats::incr(&stats.get_next_requests),
        PduType::GetBulkRequest => ServerStats::incr(&stats.get_bulk_requests),
        PduType::SetRequest => ServerStats::incr(&stats.set_requests),
        _ => {}
    }

    let handle = match pool.get_or_create(target_port).await {
        Ok(handle) => handle,
        Err(PoolError::CapacityExceeded) => {
            ServerStats::incr(&stats.capacity_drops);
            return;
        }
        Err(PoolError::UnknownPortRange(_)) => {
            ServerStats::incr(&stats.unknown_port_drops);
            return;
        }
        Err(_) => return,
    };

    if config.enable_hot_path {
        if let Some(reply) = try_hot_path(&msg, &handle) {
            ServerStats::incr(&stats.hot_path_hits);
            send_reply(&item.socket, item.peer, reply, stats).await;
            return;
        }
    }

    let timeout = Duration::from_millis(config.handler_timeout_ms);
    let (respond, response_rx) = oneshot::channel();
    if handle
        .sender
        .send(AgentMsg::Request {
            msg: msg.clone(),
            respond,
        })
        .await
        .is_err()
    {
        // The agent was evicted between lookup and send; one retry
        // against a freshly created agent.
        let Ok(handle) = pool.get_or_create(target_port).await else {
            return;
        };
        let (respond, retry_rx) = oneshot::channel();
        if handle
            .sender
            .send(AgentMsg::Request {
                msg: msg.clone(),
                respond,
            })
            .await
            .is_err()
        {
            return;
        }
        await_and_send(retry_rx, timeout, &msg, item, stats).await;
        return;
    }
    await_and_send(response_rx, timeout, &msg, item, stats).await;
}

async fn await_and_send(
    response_rx: oneshot::Receiver<AgentResponse>,
    timeout: Duration,
    msg: &SnmpMessage,
    item: WorkItem,
    stats: &Arc<ServerStats>,
) {
    let response = match tokio::time::timeout(timeout, response_rx).await {
        Ok(Ok(response)) => response,
        Ok(Err(_)) => return,
        Err(_) => {
            // Handler timed out: tell the client genErr and abandon it.
            ServerStats::incr(&stats.handler_timeouts);
            let pdu = Pdu::error_response(
                msg.pdu.request_id,
                error_status::GEN_ERR,
                0,
                Vec::new(),
            );
            if let Ok(bytes) = snmp::encode(&msg.reply_with(pdu)) {
                send_reply(&item.socket, item.peer, bytes, stats).await;
            }
            return;
        }
    };

    match response {
        AgentResponse::Reply(bytes) => send_reply(&item.socket, item.peer, bytes, stats).await,
        AgentResponse::Drop => ServerStats::incr(&stats.fault_drops),
        AgentResponse::Delay { delay, reply } => {
            let socket = item.socket.clone();
            let peer = item.peer;
            let stats = stats.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match reply {
                    Some(bytes) => send_reply(&socket, peer, bytes, &stats).await,
                    None => ServerStats::incr(&stats.fault_drops),
                }
            });
        }
    }
}

async fn send_reply(
    socket: &Arc<UdpSocket>,
    peer: SocketAddr,
    bytes: Vec<u8>,
    stats: &Arc<ServerStats>,
) {
    match socket.send_to(&bytes, peer).await {
        Ok(_) => ServerStats::incr(&stats.responses_sent),
        Err(e) => warn!("send to {} failed: {}", peer, e),
    }
}

/// Answer single-varbind sysDescr.0 / sysUpTime.0 GETs from the agent
/// handle alone: no mailbox round-trip, no state mutation. Disabled
/// while the agent has active faults so observable behavior never
/// changes.
fn try_hot_path(msg: &SnmpMessage, handle: &crate::agent::AgentHandle) -> Option<Vec<u8>> {
    if msg.pdu.pdu_type != PduType::GetRequest || msg.pdu.varbinds.len() != 1 {
        return None;
    }
    if !handle.shared.hot_path_ok() {
        return None;
    }
    let oid = &msg.pdu.varbinds[0].oid;
    let value = if oid.components() == &SYS_UPTIME_0[..] {
        // Only when the catalog actually serves an uptime here; an
        // absent or oddly-typed sysUpTime.0 takes the mailbox path.
        let entry = handle.shared.catalog.entry(&Oid::from(SYS_UPTIME_0))?;
        if entry.behavior != crate::catalog::behavior::Behavior::UptimeTicks
            || entry.declared_type != ValueKind::TimeTicks
        {
            return None;
        }
        let centis = handle.shared.uptime().as_millis() / 10;
        TypedValue::TimeTicks((centis & 0xFFFF_FFFF) as u32)
    } else if oid.components() == &SYS_DESCR_0[..] {
        let entry = handle.shared.catalog.entry(&Oid::from(SYS_DESCR_0))?;
        if entry.behavior != crate::catalog::behavior::Behavior::Static {
            return None;
        }
        entry.base_value.clone()
    } else {
        return None;
    };
    handle.shared.touch();
    let pdu = Pdu::response(
        msg.pdu.request_id,
        vec![VarBind::new(oid.clone(), value)],
    );
    snmp::encode(&msg.reply_with(pdu)).ok()
}

/// Split the proxy-style front community `community@port`.
fn split_front_community(community: &[u8]) -> Option<(Vec<u8>, u16)> {
    let at = community.iter().rposition(|&b| b == b'@')?;
    let port = std::str::from_utf8(&community[at + 1..]).ok()?.parse().ok()?;
    Some((community[..at].to_vec(), port))
}
