// End-to-end protocol tests: lines in through a loopback connection,
// frames out, side effects on the simulated board.

use std::sync::{Arc, Mutex};

use pinhost::Gpio;
use pinhost::config::{BoardProfile, HostConfig};
use pinhost::controller::Controller;
use pinhost::program::RecordingSink;
use pinhost::protocol::checksum;
use pinhost::sim::{ManualClock, RamNvMem, SimBoard};
use pinhost::store::IMAGE_LEN;
use pinhost::transport::LoopbackConnection;

struct Rig {
    controller: Controller,
    board: Arc<SimBoard>,
    clock: Arc<ManualClock>,
    conn: LoopbackConnection,
}

fn host_config() -> HostConfig {
    HostConfig {
        board: BoardProfile {
            pin_count: 12,
            analog_pins: vec![10, 11],
            pwm_pins: vec![5, 6],
            interrupt_pins: vec![2, 3, 4],
            reserved_pins: vec![9],
            defaults_pin: None,
            analog_noise: false,
        },
        ..HostConfig::default()
    }
}

fn rig() -> Rig {
    let config = host_config();
    let board = Arc::new(SimBoard::new(config.board.pin_count));
    let clock = Arc::new(ManualClock::new());
    let mem = Arc::new(RamNvMem::new(IMAGE_LEN));
    let mut controller = Controller::new(
        &config,
        board.clone(),
        board.clone(),
        clock.clone(),
        mem,
        Vec::new(),
    );
    controller.init();
    Rig {
        controller,
        board,
        clock,
        conn: LoopbackConnection::new(),
    }
}

fn send(rig: &mut Rig, line: &str) -> Vec<String> {
    rig.conn.push_line(line);
    rig.controller.poll(&mut rig.conn);
    rig.conn.take_output()
}

#[test]
fn set_mode_then_query_round_trips() {
    let mut rig = rig();
    assert!(send(&mut rig, "spm=3,1").is_empty());
    assert_eq!(send(&mut rig, "pmd=3"), vec!["pmd=3,1"]);
}

#[test]
fn read_commands_are_idempotent() {
    let mut rig = rig();
    rig.board.drive(7, true);
    let first = send(&mut rig, "rdp=7");
    let second = send(&mut rig, "rdp=7");
    assert_eq!(first, vec!["7=1"]);
    assert_eq!(first, second);
}

#[test]
fn read_list_expands_ranges_in_ascending_order() {
    let mut rig = rig();
    rig.board.drive(1, true);
    rig.board.drive(5, true);
    let replies = send(&mut rig, "rdl=0-2.5");
    assert_eq!(replies, vec!["0=0", "1=1", "2=0", "5=1"]);
}

#[test]
fn write_list_applies_one_value_to_every_index() {
    let mut rig = rig();
    send(&mut rig, "spm=5,3");
    send(&mut rig, "spm=6,3");
    assert!(send(&mut rig, "wrl=5-6,200").is_empty());
    assert_eq!(rig.board.pwm_duty(5), 200);
    assert_eq!(rig.board.pwm_duty(6), 200);
}

#[test]
fn write_pin_drives_an_output() {
    let mut rig = rig();
    send(&mut rig, "spm=7,1");
    send(&mut rig, "wrp=7,1");
    assert!(rig.board.digital_read(7));
    send(&mut rig, "wrp=7,0");
    assert!(!rig.board.digital_read(7));
}

#[test]
fn bad_checksum_means_no_reply_and_no_side_effect() {
    let mut rig = rig();
    assert!(send(&mut rig, "spm=3,1:7").is_empty());
    assert_eq!(send(&mut rig, "pmd=3"), vec!["pmd=3,0"]);
}

#[test]
fn valid_checksum_is_echoed_on_the_reply() {
    let mut rig = rig();
    let payload = "pmd=3";
    let frame = format!("{payload}:{}", checksum(payload));
    let body = "pmd=3,0";
    let expected = format!("{body}:{}", checksum(body));
    assert_eq!(send(&mut rig, &frame), vec![expected]);
}

#[test]
fn small_port_in_params_is_not_mistaken_for_a_checksum() {
    let mut rig = rig();
    assert!(send(&mut rig, "scp=2,10.0.0.1:23").is_empty());
    assert_eq!(send(&mut rig, "cnp"), vec!["cnp=2,10.0.0.1:23"]);
}

#[test]
fn ack_flag_makes_writes_echo_their_key() {
    let mut rig = rig();
    assert_eq!(send(&mut rig, "ack=1"), vec!["ack"]);
    assert_eq!(send(&mut rig, "spm=3,1"), vec!["spm"]);
    assert!(send(&mut rig, "ack=0").is_empty());
    assert!(send(&mut rig, "spm=3,0").is_empty());
}

#[test]
fn reserved_pin_mode_is_immutable_from_the_wire() {
    let mut rig = rig();
    assert!(send(&mut rig, "spm=9,1").is_empty());
    assert_eq!(send(&mut rig, "pmd=9"), vec!["pmd=9,4"]);
}

#[test]
fn arity_mismatch_is_a_silent_noop() {
    let mut rig = rig();
    assert!(send(&mut rig, "spm=3").is_empty());
    assert!(send(&mut rig, "spm=3,1,2").is_empty());
    assert_eq!(send(&mut rig, "pmd=3"), vec!["pmd=3,0"]);
}

#[test]
fn unknown_keys_are_silently_ignored() {
    let mut rig = rig();
    assert!(send(&mut rig, "xyz=1,2,3").is_empty());
    assert!(send(&mut rig, "spmx=3,1").is_empty());
}

#[test]
fn out_of_range_read_produces_no_reply() {
    let mut rig = rig();
    assert!(send(&mut rig, "rdp=12").is_empty());
    assert!(send(&mut rig, "pmd=99").is_empty());
}

#[test]
fn info_reports_identity_and_capacities() {
    let mut rig = rig();
    let replies = send(&mut rig, "inf");
    assert_eq!(replies.len(), 1);
    assert!(replies[0].starts_with(&format!("inf={},", pinhost::store::DEVICE_ID)));
    assert!(replies[0].ends_with(",12,8"));
}

#[test]
fn attach_then_edge_then_status_reports_live_elapsed() {
    let mut rig = rig();
    // slot 0, pin 2, timer, falling trigger, continuous, instantaneous
    assert!(send(&mut rig, "atc=0,2,1,0,0,0").is_empty());
    rig.board.drive(2, true);
    rig.board.drive(2, false);
    rig.clock.advance_micros(1_500);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,1,1500"]);
}

#[test]
fn soft_reset_restores_inputs_and_clears_ack() {
    let mut rig = rig();
    send(&mut rig, "ack=1");
    send(&mut rig, "spm=3,1");
    assert!(send(&mut rig, "rse").is_empty(), "reset clears ack before echo could apply");
    assert!(!rig.controller.ack());
    assert_eq!(send(&mut rig, "pmd=3"), vec!["pmd=3,0"]);
}

#[test]
fn program_sink_captures_unknown_lines_while_loading() {
    let mut rig = rig();
    let sink = Arc::new(Mutex::new(RecordingSink { active: true, lines: Vec::new() }));
    rig.controller.set_program_sink(Box::new(sink.clone()));
    assert!(send(&mut rig, "mac=3,start").is_empty());
    // built-ins still dispatch normally while loading
    assert_eq!(send(&mut rig, "pmd=3"), vec!["pmd=3,0"]);
    assert_eq!(sink.lock().unwrap().lines, vec!["mac=3,start"]);
}

#[test]
fn sys_hooks_expose_pin_and_slot_state() {
    let mut rig = rig();
    rig.board.drive(7, true);
    assert_eq!(rig.controller.sys_get("#7"), Some(1));
    send(&mut rig, "atc=0,2,0,1,0,0");
    rig.board.drive(2, true);
    rig.board.drive(2, false);
    rig.board.drive(2, true);
    assert_eq!(rig.controller.sys_get("+0"), Some(2));
    assert!(rig.controller.sys_set("+0", 9));
    assert_eq!(rig.controller.sys_get("+0"), Some(9));
    rig.clock.advance_micros(42_000);
    assert_eq!(rig.controller.sys_get("$0"), Some(42));
    assert_eq!(rig.controller.sys_get("?0"), None);
}

#[test]
fn commands_execute_in_arrival_order() {
    let mut rig = rig();
    rig.conn.push_line("spm=7,1");
    rig.conn.push_line("wrp=7,1");
    rig.conn.push_line("rdp=7");
    rig.controller.poll(&mut rig.conn);
    assert_eq!(rig.conn.take_output(), vec!["7=1"]);
}
