// Counter/timer bank behavior through the wire protocol: attachment
// rules, eviction, one-shot capture, and software-driven slots.

use std::sync::Arc;

use pinhost::Gpio;
use pinhost::board::PinMode;
use pinhost::config::{BoardProfile, HostConfig};
use pinhost::controller::Controller;
use pinhost::sim::{ManualClock, RamNvMem, SimBoard};
use pinhost::store::IMAGE_LEN;
use pinhost::transport::LoopbackConnection;

struct Rig {
    controller: Controller,
    board: Arc<SimBoard>,
    clock: Arc<ManualClock>,
    conn: LoopbackConnection,
}

fn rig() -> Rig {
    let config = HostConfig {
        board: BoardProfile {
            pin_count: 10,
            analog_pins: vec![8, 9],
            pwm_pins: vec![5],
            interrupt_pins: vec![2, 3, 4],
            reserved_pins: Vec::new(),
            defaults_pin: None,
            analog_noise: false,
        },
        ..HostConfig::default()
    };
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

fn falling_edge(rig: &Rig, pin: u8) {
    rig.board.drive(pin, true);
    rig.board.drive(pin, false);
}

#[test]
fn counter_counts_matching_edges() {
    let mut rig = rig();
    // slot 0, pin 2, counter, rising trigger
    send(&mut rig, "atc=0,2,0,1,0,0");
    for _ in 0..3 {
        rig.board.drive(2, true);
        rig.board.drive(2, false);
    }
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,1,3"]);
}

#[test]
fn second_attachment_to_a_pin_evicts_the_first() {
    let mut rig = rig();
    send(&mut rig, "atc=0,2,0,1,0,0");
    assert!(rig.controller.bank().is_attached(0));
    send(&mut rig, "atc=1,2,0,1,0,0");
    assert!(!rig.controller.bank().is_attached(0));
    assert!(rig.controller.bank().is_attached(1));
    rig.board.drive(2, true);
    rig.board.drive(2, false);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,0"]);
    assert_eq!(send(&mut rig, "tms=1"), vec!["tms=1,1,1"]);
}

#[test]
fn one_shot_timer_captures_exactly_one_cycle() {
    let mut rig = rig();
    // slot 0, pin 3, timer, falling trigger, one-shot, latched report
    send(&mut rig, "atc=0,3,1,0,1,1");

    falling_edge(&rig, 3);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,1,0"], "armed, nothing captured yet");

    rig.clock.advance_micros(500);
    falling_edge(&rig, 3);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,500"]);

    // further triggers are ignored until reset
    rig.clock.advance_micros(900);
    falling_edge(&rig, 3);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,500"]);
}

#[test]
fn slot_reset_rearms_a_finished_one_shot() {
    let mut rig = rig();
    send(&mut rig, "atc=0,3,1,0,1,1");
    falling_edge(&rig, 3);
    rig.clock.advance_micros(100);
    falling_edge(&rig, 3);
    send(&mut rig, "rst=0");
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,0"]);
    falling_edge(&rig, 3);
    rig.clock.advance_micros(250);
    falling_edge(&rig, 3);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,250"]);
}

#[test]
fn continuous_timer_toggles_between_cycles() {
    let mut rig = rig();
    // continuous, latched report
    send(&mut rig, "atc=0,2,1,0,0,1");
    falling_edge(&rig, 2);
    rig.clock.advance_micros(300);
    falling_edge(&rig, 2);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,300"]);
    // next cycle starts over
    falling_edge(&rig, 2);
    rig.clock.advance_micros(800);
    falling_edge(&rig, 2);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,800"]);
}

#[test]
fn low_trigger_forces_pullup_before_arming() {
    let mut rig = rig();
    send(&mut rig, "atc=0,2,0,3,0,0");
    assert_eq!(rig.controller.pins().mode_of(2), Some(PinMode::InputPullup));
    // pulled-up line reads high until driven
    assert!(rig.board.digital_read(2));
    rig.board.drive(2, false);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,1,1"]);
}

#[test]
fn attach_rejects_slots_and_pins_out_of_contract() {
    let mut rig = rig();
    // slot out of range
    send(&mut rig, "atc=8,2,0,1,0,0");
    // pin without interrupt capability
    send(&mut rig, "atc=0,5,0,1,0,0");
    // nonexistent pin
    send(&mut rig, "atc=0,77,0,1,0,0");
    for slot in 0..8 {
        assert!(!rig.controller.bank().is_attached(slot));
    }
    assert!(!rig.board.irq_attached(5));
}

#[test]
fn detach_tears_down_the_interrupt_source() {
    let mut rig = rig();
    send(&mut rig, "atc=0,2,0,1,0,0");
    assert!(rig.board.irq_attached(2));
    send(&mut rig, "dtc=0");
    assert!(!rig.board.irq_attached(2));
    rig.board.drive(2, true);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,0"]);
}

#[test]
fn reattach_resets_the_underlying_primitive() {
    let mut rig = rig();
    send(&mut rig, "atc=0,2,0,1,0,0");
    rig.board.drive(2, true);
    rig.board.drive(2, false);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,1,1"]);
    send(&mut rig, "atc=0,2,0,1,0,0");
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,1,0"]);
}

#[test]
fn pinless_timer_is_software_driven_and_instantaneous() {
    let mut rig = rig();
    // requests one-shot + latched; both are overridden for a pin-less timer
    send(&mut rig, "atc=0,255,1,0,1,1");
    assert!(rig.controller.sys_set("*0", 1));
    rig.clock.advance_micros(5_000);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,1,5000"]);
    assert_eq!(rig.controller.sys_get("%0"), Some(5_000));
    rig.controller.sys_set("*0", 1);
    assert_eq!(send(&mut rig, "tms=0"), vec!["tms=0,0,5000"]);
}
