//! End-to-end workflows over real UDP sockets: a test client walks,
//! bulks, and injects faults against a running simulator.

use std::io::Write;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serial_test::serial;

use snmpfarm::agent::faults::FaultConfig;
use snmpfarm::config::{DeviceTypeConfig, FarmConfig, PortRange};
use snmpfarm::server::Server;
use snmpfarm::snmp::{
    decode, encode, error_status, Oid, Pdu, PduType, SnmpMessage, SnmpVersion, TypedValue,
    VarBind,
};

const WALK: &str = "\
.1.3.6.1.2.1.1.1.0 = STRING: \"Farm Test Router\"
.1.3.6.1.2.1.1.3.0 = Timeticks: (700) 0:00:07.00
.1.3.6.1.2.1.1.5.0 = STRING: farm-rtr-01
.1.3.6.1.2.1.2.1.0 = INTEGER: 2
.1.3.6.1.2.1.2.2.1.2.1 = STRING: uplink0
.1.3.6.1.2.1.2.2.1.2.2 = STRING: uplink1
.1.3.6.1.2.1.2.2.1.8.1 = INTEGER: up(1)
.1.3.6.1.2.1.2.2.1.10.1 = Counter32: 1000000
.1.3.6.1.2.1.2.2.1.10.2 = Counter32: 2000000
.1.3.6.1.2.1.2.2.1.16.1 = Counter32: 1500000
";

fn oid(s: &str) -> Oid {
    s.parse().unwrap()
}

/// Write the walk fixture and start a server on `[start, end]`.
/// Returns the tempdir alongside the server to keep the walk file
/// alive.
async fn start_farm(
    start: u16,
    end: u16,
    mutate: impl FnOnce(&mut FarmConfig),
) -> (Server, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let walk_path = dir.path().join("router.walk");
    let mut file = std::fs::File::create(&walk_path).unwrap();
    file.write_all(WALK.as_bytes()).unwrap();

    let mut config = FarmConfig {
        bind_address: "127.0.0.1".into(),
        worker_pool_size: 4,
        device_types: vec![DeviceTypeConfig {
            name: "router".into(),
            walk_file: walk_path,
            port_range: Some(PortRange { start, end }),
            community: None,
            sys_descr: None,
            behaviors: Vec::new(),
        }],
        ..FarmConfig::default()
    };
    mutate(&mut config);
    config.validate().unwrap();

    let server = Server::start(Arc::new(config)).await.unwrap();
    (server, dir)
}

fn client(timeout_ms: u64) -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(timeout_ms)))
        .unwrap();
    socket
}

fn exchange(socket: &UdpSocket, port: u16, msg: &SnmpMessage) -> Option<SnmpMessage> {
    let bytes = encode(msg).unwrap();
    socket
        .send_to(&bytes, ("127.0.0.1", port))
        .expect("send failed");
    let mut buf = [0u8; 65_535];
    match socket.recv_from(&mut buf) {
        Ok((len, _)) => Some(decode(&buf[..len]).expect("undecodable response")),
        Err(_) => None,
    }
}

fn get(request_id: i32, oids: &[&str]) -> SnmpMessage {
    SnmpMessage::new(
        SnmpVersion::V2c,
        b"public".to_vec(),
        Pdu::request(
            PduType::GetRequest,
            request_id,
            oids.iter().map(|s| VarBind::null(oid(s))).collect(),
        ),
    )
}

fn get_next(request_id: i32, from: &Oid) -> SnmpMessage {
    SnmpMessage::new(
        SnmpVersion::V2c,
        b"public".to_vec(),
        Pdu::request(
            PduType::GetNextRequest,
            request_id,
            vec![VarBind::null(from.clone())],
        ),
    )
}

// ==================== Scenario 1: sysDescr GET ====================

#[tokio::test]
#[serial]
async fn sys_descr_get_over_udp() {
    let (mut server, _dir) = start_farm(47_300, 47_304, |_| {}).await;
    let socket = client(2_000);

    let reply = exchange(&socket, 47_300, &get(0x1234_5678, &["1.3.6.1.2.1.1.1.0"]))
        .expect("no response");
    assert_eq!(reply.pdu.request_id, 0x1234_5678);
    assert_eq!(reply.pdu.error_status, error_status::NO_ERROR);
    assert_eq!(
        reply.pdu.varbinds[0].value,
        TypedValue::OctetString(b"Farm Test Router".to_vec())
    );
    assert_eq!(server.pool.active_count(), 1);
    server.shutdown();
}

// ==================== Scenario 2: walk from root ====================

#[tokio::test]
#[serial]
async fn getnext_walk_from_internal_node() {
    let (mut server, _dir) = start_farm(47_310, 47_314, |_| {}).await;
    let socket = client(2_000);

    let mut cursor = oid("1.3.6.1.2.1");
    let mut collected = Vec::new();
    for step in 0..64 {
        let reply = exchange(&socket, 47_311, &get_next(step, &cursor)).expect("walk stalled");
        let vb = &reply.pdu.varbinds[0];
        if vb.value == TypedValue::EndOfMibView {
            break;
        }
        assert!(vb.oid > cursor, "walk not increasing");
        cursor = vb.oid.clone();
        collected.push((vb.oid.clone(), vb.value.clone()));
    }
    assert_eq!(collected.len(), 10);
    assert_eq!(collected[0].0, oid("1.3.6.1.2.1.1.1.0"));
    assert!(matches!(collected[0].1, TypedValue::OctetString(_)));
    server.shutdown();
}

// ==================== Scenario 3: bulk bound ====================

#[tokio::test]
#[serial]
async fn getbulk_is_bounded_and_contiguous() {
    let (mut server, _dir) = start_farm(47_320, 47_324, |_| {}).await;
    let socket = client(2_000);

    let bulk = SnmpMessage::new(
        SnmpVersion::V2c,
        b"public".to_vec(),
        Pdu::get_bulk(1, 0, 6, vec![VarBind::null(oid("1"))]),
    );
    let reply = exchange(&socket, 47_320, &bulk).expect("no response");
    assert_eq!(reply.pdu.varbinds.len(), 6, "bulk bound violated");

    // Continue from the last OID: the stream continues without gaps.
    let last = reply.pdu.varbinds.last().unwrap().oid.clone();
    let next = SnmpMessage::new(
        SnmpVersion::V2c,
        b"public".to_vec(),
        Pdu::get_bulk(2, 0, 10, vec![VarBind::null(last.clone())]),
    );
    let tail = exchange(&socket, 47_320, &next).expect("no response");
    assert!(tail.pdu.varbinds.first().unwrap().oid > last);
    assert_eq!(
        tail.pdu.varbinds.last().unwrap().value,
        TypedValue::EndOfMibView
    );
    server.shutdown();
}

// ==================== Scenario 5: packet loss ====================

#[tokio::test]
#[serial]
async fn packet_loss_injection_and_clear() {
    let (mut server, _dir) = start_farm(47_330, 47_334, |_| {}).await;
    let socket = client(300);

    // Healthy first.
    assert!(exchange(&socket, 47_330, &get(1, &["1.3.6.1.2.1.1.5.0"])).is_some());

    server
        .control
        .install_fault(47_330, FaultConfig::PacketLoss { rate: 1.0 })
        .await
        .unwrap();
    for i in 0..3 {
        assert!(
            exchange(&socket, 47_330, &get(10 + i, &["1.3.6.1.2.1.1.5.0"])).is_none(),
            "reply leaked through total packet loss"
        );
    }

    server.control.clear_all_faults(47_330).await.unwrap();
    let reply = exchange(&socket, 47_330, &get(99, &["1.3.6.1.2.1.1.5.0"]));
    assert!(reply.is_some(), "agent stayed silent after clear_all");
    server.shutdown();
}

// ==================== Scenario 6: lazy creation + eviction ====================

#[tokio::test]
#[serial]
async fn lazy_creation_and_idle_eviction() {
    let (mut server, _dir) = start_farm(47_340, 47_344, |config| {
        config.idle_timeout_ms = 200;
        config.cleanup_interval_ms = 100;
    })
    .await;
    let socket = client(2_000);

    assert_eq!(server.pool.active_count(), 0);
    assert!(exchange(&socket, 47_341, &get(1, &["1.3.6.1.2.1.1.5.0"])).is_some());
    assert_eq!(server.pool.active_count(), 1);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(server.pool.active_count(), 0, "idle agent was not evicted");

    // The next packet creates a fresh agent.
    assert!(exchange(&socket, 47_341, &get(2, &["1.3.6.1.2.1.1.5.0"])).is_some());
    assert_eq!(server.pool.active_count(), 1);
    assert!(server.pool.stats_snapshot().created_total >= 2);
    server.shutdown();
}

// ==================== Community handling ====================

#[tokio::test]
#[serial]
async fn wrong_community_is_dropped_silently() {
    let (mut server, _dir) = start_farm(47_350, 47_354, |_| {}).await;
    let socket = client(300);

    let msg = SnmpMessage::new(
        SnmpVersion::V2c,
        b"letmein".to_vec(),
        Pdu::request(
            PduType::GetRequest,
            1,
            vec![VarBind::null(oid("1.3.6.1.2.1.1.1.0"))],
        ),
    );
    assert!(exchange(&socket, 47_350, &msg).is_none());
    assert!(server.stats.snapshot().auth_failures >= 1);
    // No agent is created for unauthenticated traffic.
    assert_eq!(server.pool.active_count(), 0);
    server.shutdown();
}

// ==================== SET ====================

#[tokio::test]
#[serial]
async fn set_request_returns_read_only() {
    let (mut server, _dir) = start_farm(47_355, 47_359, |_| {}).await;
    let socket = client(2_000);

    let msg = SnmpMessage::new(
        SnmpVersion::V2c,
        b"public".to_vec(),
        Pdu::request(
            PduType::SetRequest,
            21,
            vec![VarBind::new(
                oid("1.3.6.1.2.1.1.5.0"),
                TypedValue::OctetString(b"hacked".to_vec()),
            )],
        ),
    );
    let reply = exchange(&socket, 47_355, &msg).expect("no response");
    assert_eq!(reply.pdu.error_status, error_status::READ_ONLY);
    assert_eq!(reply.pdu.error_index, 1);
    server.shutdown();
}

// ==================== SNMPv1 ====================

#[tokio::test]
#[serial]
async fn v1_get_works_end_to_end() {
    let (mut server, _dir) = start_farm(47_370, 47_374, |_| {}).await;
    let socket = client(2_000);

    let msg = SnmpMessage::new(
        SnmpVersion::V1,
        b"public".to_vec(),
        Pdu::request(
            PduType::GetRequest,
            31,
            vec![VarBind::null(oid("1.3.6.1.2.1.1.1.0"))],
        ),
    );
    let reply = exchange(&socket, 47_370, &msg).expect("no response");
    assert_eq!(reply.version, SnmpVersion::V1);
    assert_eq!(reply.pdu.error_status, error_status::NO_ERROR);
    assert!(matches!(
        reply.pdu.varbinds[0].value,
        TypedValue::OctetString(_)
    ));
    server.shutdown();
}

// ==================== Hot path ====================

#[tokio::test]
#[serial]
async fn hot_path_answers_sys_uptime_inline() {
    let (mut server, _dir) = start_farm(47_375, 47_379, |_| {}).await;
    let socket = client(2_000);

    // First request creates the agent; both should be hot-path
    // eligible single-varbind GETs.
    for i in 0..2 {
        let reply = exchange(&socket, 47_375, &get(40 + i, &["1.3.6.1.2.1.1.3.0"]))
            .expect("no response");
        assert!(matches!(
            reply.pdu.varbinds[0].value,
            TypedValue::TimeTicks(_)
        ));
    }
    assert!(server.stats.snapshot().hot_path_hits >= 1);
    server.shutdown();
}

// ==================== Front endpoint ====================

#[tokio::test]
#[serial]
async fn front_endpoint_routes_by_community_suffix() {
    let (mut server, _dir) = start_farm(47_380, 47_384, |config| {
        config.front_port = Some(47_389);
        config.socket_count = 2;
    })
    .await;
    let socket = client(2_000);

    let msg = SnmpMessage::new(
        SnmpVersion::V2c,
        b"public@47381".to_vec(),
        Pdu::request(
            PduType::GetRequest,
            51,
            vec![VarBind::null(oid("1.3.6.1.2.1.1.5.0"))],
        ),
    );
    let reply = exchange(&socket, 47_389, &msg).expect("no response from front endpoint");
    assert_eq!(reply.pdu.request_id, 51);
    assert_eq!(
        reply.pdu.varbinds[0].value,
        TypedValue::OctetString(b"farm-rtr-01".to_vec())
    );
    assert!(server.pool.lookup(47_381).is_some());

    // Without a target suffix the front endpoint stays silent.
    let short_timeout = client(300);
    let plain = SnmpMessage::new(
        SnmpVersion::V2c,
        b"public".to_vec(),
        Pdu::request(
            PduType::GetRequest,
            52,
            vec![VarBind::null(oid("1.3.6.1.2.1.1.5.0"))],
        ),
    );
    assert!(exchange(&short_timeout, 47_389, &plain).is_none());
    server.shutdown();
}
