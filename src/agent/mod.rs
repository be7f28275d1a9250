//! Per-port simulated agents.
//!
//! Every agent is a tokio task owning its mutable state behind a
//! bounded single-consumer mailbox, so requests against one agent are
//! serialized FIFO while different agents run in parallel. The task
//! never sleeps while holding state: delayed replies are returned to
//! the ingress, which schedules the send.

pub mod faults;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::{GetOutcome, SharedCatalog};
use crate::sim::{self, DeviceState};
use crate::snmp::{
    self, error_status, Oid, Pdu, PduType, SnmpMessage, SnmpVersion, TypedValue, VarBind,
};
use crate::stats::monotonic_ms;
use faults::{
    corrupt, FailureType, FaultConfig, FaultKind, FaultStore, FaultVerdict, RecoveryPolicy,
};

/// Mailbox depth per agent. Overflow is backpressure at the ingress.
pub const MAILBOX_CAPACITY: usize = 128;

/// Internal cap on GETBULK repetitions per repeater; the MTU bounds
/// the response anyway, this bounds the catalog walking.
const MAX_REPETITIONS: u32 = 1024;

/// What the agent decided to do with one request.
#[derive(Debug)]
pub enum AgentResponse {
    /// Encoded reply, send immediately.
    Reply(Vec<u8>),
    /// Stay silent.
    Drop,
    /// Wait `delay`, then send the bytes if present.
    Delay {
        delay: Duration,
        reply: Option<Vec<u8>>,
    },
}

/// Control-plane operations, delivered through the same mailbox as
/// requests and therefore serialized with them.
#[derive(Debug)]
pub enum ControlMsg {
    InstallFault(FaultConfig),
    ClearFault(FaultKind),
    ClearAllFaults,
    Reboot,
    Recover(RecoveryPolicy),
    GetInfo(oneshot::Sender<AgentInfo>),
    Shutdown,
}

#[derive(Debug)]
pub enum AgentMsg {
    Request {
        msg: SnmpMessage,
        respond: oneshot::Sender<AgentResponse>,
    },
    Control(ControlMsg),
}

/// Metadata published by an agent for the hot path and the pool;
/// everything here is lock-free.
#[derive(Debug)]
pub struct AgentShared {
    pub port: u16,
    pub device_type: Arc<str>,
    pub community: Vec<u8>,
    pub catalog: SharedCatalog,
    /// Monotonic ms at (re)boot; uptime = now - this.
    uptime_base_ms: AtomicU64,
    /// Monotonic ms of the last handled request.
    last_access_ms: AtomicU64,
    /// True only while the agent is up with no active faults.
    hot_path_ok: AtomicBool,
}

impl AgentShared {
    pub fn touch(&self) {
        self.last_access_ms.store(monotonic_ms(), Ordering::Relaxed);
    }

    pub fn last_access(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_millis(monotonic_ms().saturating_sub(self.uptime_base_ms.load(Ordering::Relaxed)))
    }

    pub fn hot_path_ok(&self) -> bool {
        self.hot_path_ok.load(Ordering::Relaxed)
    }
}

/// Cheap, cloneable address of a live agent.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    pub shared: Arc<AgentShared>,
    pub sender: mpsc::Sender<AgentMsg>,
    pub generation: u64,
}

/// JSON-friendly agent description for `get_info`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentInfo {
    pub port: u16,
    pub device_type: String,
    pub device_id: String,
    pub mac: String,
    pub uptime_seconds: f64,
    pub oid_count: usize,
    pub counter_count: usize,
    pub active_faults: Vec<FaultKind>,
    pub reachable: bool,
}

#[derive(Debug)]
enum PowerState {
    Up,
    Down {
        until: Option<Instant>,
        failure: FailureType,
    },
}

/// Inputs for spawning one agent.
pub struct AgentSpec {
    pub port: u16,
    pub device_type: Arc<str>,
    pub community: Vec<u8>,
    pub catalog: SharedCatalog,
    pub max_response_size: usize,
}

pub struct Agent {
    port: u16,
    device_id: Uuid,
    mac: [u8; 6],
    catalog: SharedCatalog,
    state: DeviceState,
    uptime_start: Instant,
    faults: FaultStore,
    power: PowerState,
    max_response_size: usize,
    shared: Arc<AgentShared>,
}

/// Build the agent and its handle; the caller spawns [`Agent::run`].
pub fn build(spec: AgentSpec, generation: u64) -> (Agent, AgentHandle, mpsc::Receiver<AgentMsg>) {
    let seed = ((spec.port as u64) << 16) ^ hash_name(&spec.device_type);
    let now = monotonic_ms();
    let shared = Arc::new(AgentShared {
        port: spec.port,
        device_type: spec.device_type,
        community: spec.community,
        catalog: spec.catalog.clone(),
        uptime_base_ms: AtomicU64::new(now),
        last_access_ms: AtomicU64::new(now),
        hot_path_ok: AtomicBool::new(true),
    });
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let agent = Agent {
        port: spec.port,
        device_id: Uuid::new_v4(),
        mac: derive_mac(spec.port, seed),
        catalog: spec.catalog,
        state: DeviceState::new(seed),
        uptime_start: Instant::now(),
        faults: FaultStore::default(),
        power: PowerState::Up,
        max_response_size: spec.max_response_size,
        shared: shared.clone(),
    };
    let handle = AgentHandle {
        shared,
        sender: tx,
        generation,
    };
    (agent, handle, rx)
}

fn hash_name(name: &str) -> u64 {
    name.bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x100_0000_01b3)
        })
}

/// Locally administered unicast MAC, deterministic per (type, port).
fn derive_mac(port: u16, seed: u64) -> [u8; 6] {
    [
        0x02,
        (seed >> 8) as u8,
        seed as u8,
        (seed >> 16) as u8,
        (port >> 8) as u8,
        port as u8,
    ]
}

impl Agent {
    /// The agent's mailbox loop. Returns when shut down or when every
    /// sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<AgentMsg>) {
        debug!("agent on port {} ({}) starting", self.port, self.shared.device_type);
        while let Some(msg) = rx.recv().await {
            match msg {
                AgentMsg::Request { msg, respond } => {
                    let response = self.handle_request(&msg);
                    // A closed receiver just means the ingress timed out.
                    let _ = respond.send(response);
                }
                AgentMsg::Control(control) => {
                    if !self.handle_control(control) {
                        break;
                    }
                }
            }
        }
        debug!("agent on port {} stopping", self.port);
    }

    fn uptime_seconds(&self) -> f64 {
        self.uptime_start.elapsed().as_secs_f64()
    }

    fn publish_hot_path(&self) {
        let ok = self.faults.is_empty() && matches!(self.power, PowerState::Up);
        self.shared.hot_path_ok.store(ok, Ordering::Relaxed);
    }

    // ==================== Request handling ====================

    fn handle_request(&mut self, msg: &SnmpMessage) -> AgentResponse {
        self.shared.touch();

        // A finite outage can expire between timer fire and the next
        // packet; recover in-band rather than answer stale.
        if let PowerState::Down { until: Some(t), .. } = self.power {
            if Instant::now() >= t {
                self.recover(RecoveryPolicy::Immediate);
            }
        }
        if let PowerState::Down { .. } = self.power {
            return AgentResponse::Drop;
        }

        // Gradual recovery decays the injected error rate as traffic
        // flows again.
        if self.state.error_rate > 0.0 {
            self.state.error_rate *= 0.95;
            if self.state.error_rate < 1e-3 {
                self.state.error_rate = 0.0;
            }
        }

        let oids: Vec<&Oid> = msg.pdu.varbinds.iter().map(|vb| &vb.oid).collect();
        match self.faults.decide(&oids) {
            FaultVerdict::Pass => self.answer(msg),
            FaultVerdict::Drop => AgentResponse::Drop,
            FaultVerdict::Delay { delay, reply } => {
                let reply = if reply {
                    match self.answer(msg) {
                        AgentResponse::Reply(bytes) => Some(bytes),
                        _ => None,
                    }
                } else {
                    None
                };
                AgentResponse::Delay { delay, reply }
            }
            FaultVerdict::ErrorStatus(code) => self.encode_reply(
                msg,
                Pdu::error_response(msg.pdu.request_id, code, 1, msg.pdu.varbinds.clone()),
            ),
            FaultVerdict::Malformed(variant) => match self.answer(msg) {
                AgentResponse::Reply(bytes) => AgentResponse::Reply(corrupt(bytes, variant)),
                other => other,
            },
        }
    }

    /// Fault-free PDU dispatch.
    fn answer(&mut self, msg: &SnmpMessage) -> AgentResponse {
        let pdu = match msg.pdu.pdu_type {
            PduType::GetRequest => self.handle_get(msg),
            PduType::GetNextRequest => self.handle_get_next(msg),
            PduType::GetBulkRequest if msg.version == SnmpVersion::V2c => {
                return self.handle_get_bulk(msg)
            }
            PduType::SetRequest => Pdu::error_response(
                msg.pdu.request_id,
                error_status::READ_ONLY,
                1,
                msg.pdu.varbinds.clone(),
            ),
            _ => Pdu::error_response(
                msg.pdu.request_id,
                error_status::GEN_ERR,
                0,
                msg.pdu.varbinds.clone(),
            ),
        };
        self.encode_reply(msg, pdu)
    }

    fn render_entry(&mut self, oid: &Oid) -> TypedValue {
        let uptime = self.uptime_seconds();
        match self.catalog.get(oid) {
            GetOutcome::Found(entry) => {
                let entry = entry.clone();
                sim::render(oid, &entry, &mut self.state, Utc::now(), uptime)
            }
            GetOutcome::NoSuchInstance => TypedValue::NoSuchInstance,
            GetOutcome::NoSuchObject => TypedValue::NoSuchObject,
        }
    }

    fn handle_get(&mut self, msg: &SnmpMessage) -> Pdu {
        let mut varbinds = Vec::with_capacity(msg.pdu.varbinds.len());
        for vb in &msg.pdu.varbinds {
            varbinds.push(VarBind::new(vb.oid.clone(), self.render_entry(&vb.oid)));
        }
        self.finish_v1_exceptions(msg, varbinds)
    }

    fn next_varbind(&mut self, oid: &Oid) -> VarBind {
        let uptime = self.uptime_seconds();
        match self.catalog.get_next(oid) {
            Some((next, entry)) => {
                let (next, entry) = (next.clone(), entry.clone());
                let value = sim::render(&next, &entry, &mut self.state, Utc::now(), uptime);
                VarBind::new(next, value)
            }
            None => VarBind::new(oid.clone(), TypedValue::EndOfMibView),
        }
    }

    fn handle_get_next(&mut self, msg: &SnmpMessage) -> Pdu {
        let mut varbinds = Vec::with_capacity(msg.pdu.varbinds.len());
        for vb in &msg.pdu.varbinds {
            varbinds.push(self.next_varbind(&vb.oid));
        }
        self.finish_v1_exceptions(msg, varbinds)
    }

    /// SNMPv1 has no exception markers; the first missing varbind
    /// becomes a noSuchName error with its 1-based index.
    fn finish_v1_exceptions(&self, msg: &SnmpMessage, varbinds: Vec<VarBind>) -> Pdu {
        if msg.version == SnmpVersion::V1 {
            if let Some(idx) = varbinds.iter().position(|vb| vb.value.is_exception()) {
                return Pdu::error_response(
                    msg.pdu.request_id,
                    error_status::NO_SUCH_NAME,
                    (idx + 1) as u32,
                    msg.pdu.varbinds.clone(),
                );
            }
        }
        Pdu::response(msg.pdu.request_id, varbinds)
    }

    fn handle_get_bulk(&mut self, msg: &SnmpMessage) -> AgentResponse {
        let non_repeaters = (msg.pdu.non_repeaters() as usize).min(msg.pdu.varbinds.len());
        let max_repetitions = msg.pdu.max_repetitions().min(MAX_REPETITIONS) as usize;

        let mut varbinds = Vec::new();
        for vb in &msg.pdu.varbinds[..non_repeaters] {
            varbinds.push(self.next_varbind(&vb.oid));
        }
        for vb in &msg.pdu.varbinds[non_repeaters..] {
            let mut cursor = vb.oid.clone();
            for _ in 0..max_repetitions {
                let next = self.next_varbind(&cursor);
                let at_end = next.value == TypedValue::EndOfMibView;
                cursor = next.oid.clone();
                varbinds.push(next);
                if at_end {
                    break;
                }
            }
        }

        // Never tooBig for legitimate bulk: shed repetitions from the
        // tail until the reply fits.
        loop {
            let pdu = Pdu::response(msg.pdu.request_id, varbinds.clone());
            let reply = msg.reply_with(pdu);
            match snmp::encode(&reply) {
                Ok(bytes) if bytes.len() <= self.max_response_size => {
                    return AgentResponse::Reply(bytes)
                }
                Ok(_) | Err(snmp::CodecError::TooBig(_)) => {
                    if varbinds.len() <= non_repeaters || varbinds.is_empty() {
                        return self.too_big(msg);
                    }
                    let shed = (varbinds.len() / 4)
                        .max(1)
                        .min(varbinds.len() - non_repeaters);
                    varbinds.truncate(varbinds.len() - shed);
                }
                Err(e) => {
                    warn!("encode failure on port {}: {}", self.port, e);
                    return self.gen_err(msg);
                }
            }
        }
    }

    fn encode_reply(&self, msg: &SnmpMessage, pdu: Pdu) -> AgentResponse {
        let reply = msg.reply_with(pdu);
        match snmp::encode(&reply) {
            Ok(bytes) if bytes.len() <= self.max_response_size => AgentResponse::Reply(bytes),
            Ok(_) | Err(snmp::CodecError::TooBig(_)) => self.too_big(msg),
            Err(e) => {
                warn!("encode failure on port {}: {}", self.port, e);
                self.gen_err(msg)
            }
        }
    }

    /// tooBig(1) with empty varbinds, per RFC 3416 §4.2.1.
    fn too_big(&self, msg: &SnmpMessage) -> AgentResponse {
        let pdu = Pdu::error_response(msg.pdu.request_id, error_status::TOO_BIG, 0, Vec::new());
        match snmp::encode(&msg.reply_with(pdu)) {
            Ok(bytes) => AgentResponse::Reply(bytes),
            Err(_) => AgentResponse::Drop,
        }
    }

    fn gen_err(&self, msg: &SnmpMessage) -> AgentResponse {
        let pdu =
            Pdu::error_response(msg.pdu.request_id, error_status::GEN_ERR, 0, Vec::new());
        match snmp::encode(&msg.reply_with(pdu)) {
            Ok(bytes) => AgentResponse::Reply(bytes),
            Err(_) => AgentResponse::Drop,
        }
    }

    // ==================== Control handling ====================

    /// Returns false when the agent should stop.
    fn handle_control(&mut self, control: ControlMsg) -> bool {
        match control {
            ControlMsg::InstallFault(config) => {
                if let FaultConfig::DeviceFailure {
                    failure,
                    duration_ms,
                    ..
                } = &config
                {
                    let until = duration_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
                    match failure {
                        FailureType::Reboot | FailureType::PowerFailure => {
                            self.power = PowerState::Down {
                                until,
                                failure: *failure,
                            };
                        }
                        FailureType::NetworkDisconnect => {
                            self.power = PowerState::Down {
                                until,
                                failure: *failure,
                            };
                            self.state.health = 0.2;
                        }
                    }
                }
                self.faults.install(config);
                self.publish_hot_path();
            }
            ControlMsg::ClearFault(kind) => {
                if self.faults.clear(kind) && kind == FaultKind::DeviceFailure {
                    self.recover(RecoveryPolicy::Immediate);
                }
                self.publish_hot_path();
            }
            ControlMsg::ClearAllFaults => {
                self.faults.clear_all();
                if matches!(self.power, PowerState::Down { .. }) {
                    self.recover(RecoveryPolicy::Immediate);
                }
                self.publish_hot_path();
            }
            ControlMsg::Reboot => self.reboot(),
            ControlMsg::Recover(policy) => {
                self.recover(policy);
                self.publish_hot_path();
            }
            ControlMsg::GetInfo(respond) => {
                let _ = respond.send(self.info());
            }
            ControlMsg::Shutdown => return false,
        }
        true
    }

    /// Operational reboot: fresh uptime, zeroed dynamic state, faults
    /// cleared; keeps serving.
    fn reboot(&mut self) {
        self.uptime_start = Instant::now();
        self.state.reset();
        self.faults.clear_all();
        self.power = PowerState::Up;
        self.shared
            .uptime_base_ms
            .store(monotonic_ms(), Ordering::Relaxed);
        self.publish_hot_path();
        debug!("agent on port {} rebooted", self.port);
    }

    fn recover(&mut self, policy: RecoveryPolicy) {
        let was_disconnect = matches!(
            self.power,
            PowerState::Down {
                failure: FailureType::NetworkDisconnect,
                ..
            }
        );
        self.power = PowerState::Up;
        self.faults.clear(FaultKind::DeviceFailure);
        if was_disconnect {
            self.state.health = 1.0;
        }
        match policy {
            RecoveryPolicy::Immediate => {}
            RecoveryPolicy::Gradual => {
                // Comes back shaky; the error rate decays with traffic.
                self.state.error_rate = 0.15;
            }
            RecoveryPolicy::ResetCounters => {
                self.uptime_start = Instant::now();
                self.state.reset();
                self.shared
                    .uptime_base_ms
                    .store(monotonic_ms(), Ordering::Relaxed);
            }
        }
        self.publish_hot_path();
    }

    fn info(&self) -> AgentInfo {
        AgentInfo {
            port: self.port,
            device_type: self.shared.device_type.to_string(),
            device_id: self.device_id.to_string(),
            mac: self
                .mac
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(":"),
            uptime_seconds: self.uptime_seconds(),
            oid_count: self.catalog.len(),
            counter_count: self.state.counters.len(),
            active_faults: self.faults.kinds(),
            reachable: matches!(self.power, PowerState::Up),
        }
    }
}
