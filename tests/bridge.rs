// The channel-backed connection used by the TCP bridge: inbound lines
// and outbound frames flow through without blocking the poll cycle.

use std::sync::Arc;

use pinhost::config::HostConfig;
use pinhost::controller::Controller;
use pinhost::sim::{RamNvMem, SimBoard, SystemClock};
use pinhost::store::IMAGE_LEN;
use pinhost::transport::{ChannelConnection, Connection, TransportKind};

fn controller() -> Controller {
    let config = HostConfig::default();
    let board = Arc::new(SimBoard::new(config.board.pin_count));
    let clock = Arc::new(SystemClock::new());
    let mem = Arc::new(RamNvMem::new(IMAGE_LEN));
    let mut controller = Controller::new(&config, board.clone(), board, clock, mem, Vec::new());
    controller.init();
    controller
}

#[tokio::test]
async fn lines_in_frames_out() {
    let (mut conn, mut remote) = ChannelConnection::endpoints(TransportKind::Ethernet, "test");
    conn.open();
    let mut controller = controller();

    remote.line_tx.send("spm=7,1".to_string()).unwrap();
    remote.line_tx.send("pmd=7".to_string()).unwrap();
    controller.poll(&mut conn);

    assert_eq!(remote.frame_rx.recv().await, Some("pmd=7,1".to_string()));
    assert!(remote.frame_rx.try_recv().is_err(), "write commands reply nothing without ack");
}

#[tokio::test]
async fn closed_connection_neither_receives_nor_sends() {
    let (mut conn, mut remote) = ChannelConnection::endpoints(TransportKind::Ethernet, "test");
    let mut controller = controller();

    remote.line_tx.send("pmd=0".to_string()).unwrap();
    controller.poll(&mut conn);
    assert!(remote.frame_rx.try_recv().is_err());

    conn.open();
    controller.poll(&mut conn);
    assert_eq!(remote.frame_rx.recv().await, Some("pmd=0,0".to_string()));
}

#[test]
fn connection_reports_its_record() {
    let (conn, _remote) = ChannelConnection::endpoints(TransportKind::Wifi, "10.0.0.2:8266");
    assert_eq!(conn.kind(), TransportKind::Wifi);
    assert_eq!(conn.params(), "10.0.0.2:8266");
}
