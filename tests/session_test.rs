use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use ofp_core::ofp_codec::OfpCodec;
use ofp_core::ofp_header::Envelope;
use ofp_core::ofp_message::{self, DeviceIdentity, Message, OfpMessage, PortDesc, PortReason,
                            SwitchDesc};
use ofp_core::{openflow0x01 as of10, openflow0x04 as of13};
use ofp_core::{DeviceEvent, DeviceHandle, DeviceManager, SessionConfig};

type Switch = Framed<DuplexStream, OfpCodec>;

const WAIT: Duration = Duration::from_secs(2);

fn manager() -> (DeviceManager, mpsc::Receiver<DeviceEvent>, CancellationToken) {
    manager_with(SessionConfig::default())
}

fn manager_with(config: SessionConfig)
                -> (DeviceManager, mpsc::Receiver<DeviceEvent>, CancellationToken) {
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    (DeviceManager::new(config, tx, cancel.clone()), rx, cancel)
}

fn connect(manager: &mut DeviceManager) -> (u64, Switch) {
    connect_buffered(manager, 64 * 1024)
}

/// Connect a switch whose transport holds at most `capacity` unread bytes.
fn connect_buffered(manager: &mut DeviceManager, capacity: usize) -> (u64, Switch) {
    let (switch, controller) = tokio::io::duplex(capacity);
    let session = manager.spawn(controller);
    (session, Framed::new(switch, OfpCodec))
}

fn port_status(xid: u32, port_no: u32) -> of13::PortStatus {
    of13::PortStatus {
        xid,
        status: ofp_message::PortStatus {
            reason: PortReason::PortModify,
            desc: PortDesc {
                port_no,
                ..Default::default()
            },
        },
    }
}

async fn send(sw: &mut Switch, msg: impl OfpMessage) {
    sw.send(msg.to_envelope().unwrap()).await.unwrap();
}

async fn recv(sw: &mut Switch) -> Envelope {
    timeout(WAIT, sw.next()).await.expect("no frame in time").expect("eof").unwrap()
}

async fn next_event(rx: &mut mpsc::Receiver<DeviceEvent>) -> DeviceEvent {
    timeout(WAIT, rx.recv()).await.expect("no event in time").expect("events closed")
}

fn identity(datapath_id: u64, ports: Vec<PortDesc>) -> DeviceIdentity {
    DeviceIdentity {
        datapath_id,
        num_buffers: 256,
        num_tables: 4,
        capabilities: 0xc7,
        actions: 0,
        auxiliary_id: 0,
        ports,
    }
}

/// Play the switch side of a 1.3 handshake and return the controller's handle.
async fn establish13(sw: &mut Switch,
                     rx: &mut mpsc::Receiver<DeviceEvent>,
                     datapath_id: u64)
                     -> DeviceHandle {
    send(sw, of13::Hello::new(1)).await;
    let hello = recv(sw).await;
    assert_eq!((hello.version(), hello.type_code()), (0x04, of13::MsgCode::Hello as u8));
    let req = recv(sw).await;
    assert_eq!((req.version(), req.type_code()), (0x04, of13::MsgCode::FeaturesReq as u8));
    send(sw, of13::FeaturesReply::new(req.xid(), identity(datapath_id, vec![]))).await;

    match next_event(rx).await {
        DeviceEvent::Connected { version, identity, handle, .. } => {
            assert_eq!(version, 0x04);
            assert_eq!(identity.datapath_id, datapath_id);
            handle
        }
        e => panic!("expected connected, got {:?}", e),
    }
}

#[tokio::test]
async fn openflow10_handshake_reports_ports() {
    let (mut manager, mut rx, _cancel) = manager();
    let (session, mut sw) = connect(&mut manager);

    send(&mut sw, of10::Hello::new(7)).await;
    let hello = recv(&mut sw).await;
    assert_eq!((hello.version(), hello.type_code()), (0x01, of10::MsgCode::Hello as u8));
    let req = recv(&mut sw).await;
    assert_eq!((req.version(), req.type_code()), (0x01, of10::MsgCode::FeaturesReq as u8));

    let ports = vec![PortDesc {
                         port_no: 1,
                         name: "eth1".into(),
                         ..Default::default()
                     },
                     PortDesc {
                         port_no: 2,
                         name: "eth2".into(),
                         ..Default::default()
                     }];
    let mut id = identity(0xdead, ports.clone());
    id.actions = 0xfff;
    send(&mut sw, of10::FeaturesReply::new(req.xid(), id)).await;

    match next_event(&mut rx).await {
        DeviceEvent::Connected { session: s, version, identity, handle } => {
            assert_eq!(s, session);
            assert_eq!(version, 0x01);
            assert_eq!(handle.version(), 0x01);
            assert_eq!(identity.actions, 0xfff);
            assert_eq!(identity.ports, ports);
        }
        e => panic!("expected connected, got {:?}", e),
    }
    manager.shutdown(WAIT).await;
}

#[tokio::test]
async fn openflow13_description_round_trip() {
    let (mut manager, mut rx, _cancel) = manager();
    let (_, mut sw) = connect(&mut manager);
    let handle = establish13(&mut sw, &mut rx, 42).await;

    handle.send(handle.protocol().desc_request(99)).await.unwrap();
    let req = recv(&mut sw).await;
    assert_eq!(req.type_code(), of13::MsgCode::MultipartReq as u8);
    assert_eq!(req.xid(), 99);
    assert_eq!(&req.payload()[0..2], &of13::OFPMP_DESC.to_be_bytes());

    let desc = SwitchDesc {
        manufacturer: "ACME".into(),
        serial: "123".into(),
        ..Default::default()
    };
    send(&mut sw, of13::DescReply { xid: 99, desc }).await;
    match next_event(&mut rx).await {
        DeviceEvent::Message { xid: 99, message: Message::DescReply(d), .. } => {
            assert_eq!(d.manufacturer, "ACME");
            assert_eq!(d.serial, "123");
        }
        e => panic!("expected desc reply, got {:?}", e),
    }
    manager.shutdown(WAIT).await;
}

#[tokio::test]
async fn established_session_answers_echo_and_keeps_order() {
    let (mut manager, mut rx, _cancel) = manager();
    let (_, mut sw) = connect(&mut manager);
    establish13(&mut sw, &mut rx, 1).await;

    send(&mut sw,
         of13::EchoRequest {
             xid: 5,
             data: "ping".into(),
         })
        .await;
    let reply = recv(&mut sw).await;
    assert_eq!(reply.type_code(), of13::MsgCode::EchoResp as u8);
    assert_eq!(reply.xid(), 5);
    assert_eq!(&reply.payload()[..], b"ping");

    for no in 1..=20u32 {
        send(&mut sw, port_status(100 + no, no)).await;
    }
    for no in 1..=20u32 {
        match next_event(&mut rx).await {
            DeviceEvent::Message { xid, message: Message::PortStatus(s), .. } => {
                assert_eq!(xid, 100 + no);
                assert_eq!(s.desc.port_no, no);
            }
            e => panic!("expected port status, got {:?}", e),
        }
    }
    manager.shutdown(WAIT).await;
}

#[tokio::test]
async fn malformed_message_closes_only_its_session() {
    let (mut manager, mut rx, _cancel) = manager();
    let (bad, mut bad_sw) = connect(&mut manager);
    establish13(&mut bad_sw, &mut rx, 1).await;
    let (good, mut good_sw) = connect(&mut manager);
    establish13(&mut good_sw, &mut rx, 2).await;

    let truncated = Envelope::new(0x04, of13::MsgCode::PortStatus as u8, 9, vec![0; 10]).unwrap();
    bad_sw.send(truncated).await.unwrap();
    match next_event(&mut rx).await {
        DeviceEvent::Disconnected { session, datapath_id, reason } => {
            assert_eq!(session, bad);
            assert_eq!(datapath_id, 1);
            assert!(reason.contains("port status"), "{}", reason);
        }
        e => panic!("expected disconnect, got {:?}", e),
    }
    assert!(timeout(WAIT, bad_sw.next()).await.unwrap().is_none());

    send(&mut good_sw, of13::EchoRequest { xid: 3, data: Default::default() }).await;
    assert_eq!(recv(&mut good_sw).await.xid(), 3);
    send(&mut good_sw,
         of13::ErrorMessage {
             xid: 4,
             typ: 1,
             code: 2,
             data: Default::default(),
         })
        .await;
    match next_event(&mut rx).await {
        DeviceEvent::Message { session, message: Message::Error(e), .. } => {
            assert_eq!(session, good);
            assert_eq!((e.typ, e.code), (1, 2));
        }
        e => panic!("expected error message, got {:?}", e),
    }
    assert_eq!(manager.active(), 1);
    manager.shutdown(WAIT).await;
}

#[tokio::test]
async fn unsupported_version_is_closed_without_features_request() {
    let (mut manager, mut rx, _cancel) = manager();
    let (_, mut sw) = connect(&mut manager);

    sw.send(Envelope::empty(0x05, 0, 1)).await.unwrap();
    assert!(timeout(WAIT, sw.next()).await.unwrap().is_none());
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    assert_eq!(manager.shutdown(WAIT).await, 0);
}

#[tokio::test]
async fn bitmap_hello_negotiates_highest_common_version() {
    let (mut manager, _rx, _cancel) = manager();
    let (_, mut sw) = connect(&mut manager);

    // a 1.5 switch that also speaks 1.0
    let bitmap = vec![0, 1, 0, 8, 0, 0, 0, 0x42];
    sw.send(Envelope::new(0x06, 0, 1, bitmap).unwrap()).await.unwrap();
    let hello = recv(&mut sw).await;
    assert_eq!(hello.version(), 0x01);
    assert_eq!(recv(&mut sw).await.type_code(), of10::MsgCode::FeaturesReq as u8);
    manager.shutdown(WAIT).await;
}

#[tokio::test]
async fn unexpected_message_during_handshake_closes() {
    let (mut manager, mut rx, _cancel) = manager();
    let (_, mut sw) = connect(&mut manager);

    send(&mut sw, of13::Hello::new(1)).await;
    recv(&mut sw).await;
    recv(&mut sw).await;
    // echo is allowed before the features reply
    send(&mut sw, of13::EchoRequest { xid: 8, data: Default::default() }).await;
    assert_eq!(recv(&mut sw).await.xid(), 8);

    send(&mut sw, of13::DescReply::default()).await;
    assert!(timeout(WAIT, sw.next()).await.unwrap().is_none());
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    manager.shutdown(WAIT).await;
}

#[tokio::test]
async fn commands_of_another_version_are_dropped() {
    let (mut manager, mut rx, _cancel) = manager();
    let (_, mut sw) = connect(&mut manager);
    let handle = establish13(&mut sw, &mut rx, 1).await;

    handle.send(Box::new(of10::BarrierRequest { xid: 1 })).await.unwrap();
    handle.send(Box::new(of13::BarrierRequest { xid: 2 })).await.unwrap();
    let barrier = recv(&mut sw).await;
    assert_eq!((barrier.version(), barrier.type_code(), barrier.xid()),
               (0x04, of13::MsgCode::BarrierReq as u8, 2));
    manager.shutdown(WAIT).await;
}

#[tokio::test]
async fn shutdown_interrupts_sessions_blocked_on_read() {
    let (mut manager, mut rx, _cancel) = manager();
    let (session, mut sw) = connect(&mut manager);
    let handle = establish13(&mut sw, &mut rx, 77).await;
    // a second session still waiting for its hello
    let (_, _idle) = connect(&mut manager);

    let aborted = timeout(WAIT, manager.shutdown(Duration::from_millis(500)))
        .await
        .expect("shutdown exceeded its grace period");
    assert_eq!(aborted, 0);

    match next_event(&mut rx).await {
        DeviceEvent::Disconnected { session: s, datapath_id, .. } => {
            assert_eq!(s, session);
            assert_eq!(datapath_id, 77);
        }
        e => panic!("expected disconnect, got {:?}", e),
    }
    assert!(handle.is_closed());
    assert!(matches!(handle.send(Box::new(of13::BarrierRequest { xid: 1 })).await,
                     Err(ofp_core::OfpError::SessionClosed)));
}

#[tokio::test]
async fn interleaved_sessions_keep_their_own_order() {
    let (mut manager, mut rx, _cancel) = manager();
    let (a, mut sw_a) = connect(&mut manager);
    establish13(&mut sw_a, &mut rx, 10).await;
    let (b, mut sw_b) = connect(&mut manager);
    establish13(&mut sw_b, &mut rx, 20).await;

    for no in 1..=20u32 {
        send(&mut sw_a, port_status(100 + no, no)).await;
        send(&mut sw_b, port_status(200 + no, no)).await;
    }

    let mut seen_a = vec![];
    let mut seen_b = vec![];
    while seen_a.len() + seen_b.len() < 40 {
        match next_event(&mut rx).await {
            DeviceEvent::Message { session, xid, message: Message::PortStatus(s) } => {
                if session == a {
                    assert_eq!(xid, 100 + s.desc.port_no);
                    seen_a.push(xid);
                } else {
                    assert_eq!(session, b);
                    assert_eq!(xid, 200 + s.desc.port_no);
                    seen_b.push(xid);
                }
            }
            e => panic!("expected port status, got {:?}", e),
        }
    }
    assert_eq!(seen_a, (101..=120).collect::<Vec<u32>>());
    assert_eq!(seen_b, (201..=220).collect::<Vec<u32>>());
    assert_eq!(manager.shutdown(WAIT).await, 0);
}

#[tokio::test]
async fn shutdown_interrupts_sessions_blocked_on_write() {
    let config = SessionConfig {
        close_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let (mut manager, mut rx, _cancel) = manager_with(config);
    let (session, mut sw) = connect_buffered(&mut manager, 256);
    let handle = establish13(&mut sw, &mut rx, 5).await;

    // the switch stops reading; this frame cannot fit the transport
    handle.send(Box::new(of13::EchoRequest {
                             xid: 1,
                             data: vec![0u8; 8192].into(),
                         }))
          .await
          .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let aborted = timeout(WAIT, manager.shutdown(Duration::from_secs(1)))
        .await
        .expect("shutdown exceeded its grace period");
    assert_eq!(aborted, 0);

    match next_event(&mut rx).await {
        DeviceEvent::Disconnected { session: s, datapath_id, .. } => {
            assert_eq!(s, session);
            assert_eq!(datapath_id, 5);
        }
        e => panic!("expected disconnect, got {:?}", e),
    }
    assert!(handle.is_closed());
    drop(sw);
}
