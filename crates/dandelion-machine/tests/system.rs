//! End-to-end: register writes scheduling real events, driven by the
//! per-cycle clock, observed through the CP wake lines.

use dandelion_cp::{RecordingSink, Task};
use dandelion_machine::System;
use dandelion_net::SFD;
use dandelion_storage::DriveType;

const KCTL_WAKEUP_SEEK_COMPLETE: u16 = 1;
const KCTL_STEP: u16 = 1 << 9;
const KCTL_DIRECTION_IN: u16 = 1 << 10;

const OCTL_ENABLE_TX: u16 = 1 << 0;
const OCTL_LAST_WORD: u16 = 1 << 1;
const ICTL_ENABLE_RCV: u16 = 1 << 0;
const ICTL_LOCAL_LOOP: u16 = 1 << 2;

fn system() -> (System, RecordingSink) {
    let mut system =
        System::new(256, DriveType::Sa1004, [2, 0, 0, 0, 0, 1], Box::new(())).unwrap();
    let mut sink = RecordingSink::new();
    system.reset(&mut sink);
    (system, sink)
}

fn run_for(system: &mut System, sink: &mut RecordingSink, ns: u64) {
    let deadline = system.now_ns() + ns;
    while system.now_ns() < deadline {
        system.clock(sink);
    }
}

#[test]
fn disk_seek_wakes_the_disk_task_through_the_clock() {
    let (mut system, mut sink) = system();

    system
        .disk
        .set_kctl(KCTL_WAKEUP_SEEK_COMPLETE, &mut sink);
    assert!(sink.is_awake(Task::Disk), "seek complete is level-driven");

    // Three inward step pulses.
    for _ in 0..3 {
        system.disk.set_kctl(
            KCTL_WAKEUP_SEEK_COMPLETE | KCTL_STEP | KCTL_DIRECTION_IN,
            &mut sink,
        );
        system
            .disk
            .set_kctl(KCTL_WAKEUP_SEEK_COMPLETE | KCTL_DIRECTION_IN, &mut sink);
    }

    // Inside the step window the task goes back to sleep once the seek
    // starts, then wakes at completion 25ms later.
    run_for(&mut system, &mut sink, 100_000);
    assert!(!sink.is_awake(Task::Disk), "seek in progress");

    run_for(&mut system, &mut sink, 26_000_000);
    assert!(sink.is_awake(Task::Disk));
    assert_eq!(system.disk.drive().cylinder(), 3);
}

#[test]
fn ethernet_loopback_round_trips_through_the_clock() {
    let (mut system, mut sink) = system();

    system.ether_write_ictl(ICTL_ENABLE_RCV | ICTL_LOCAL_LOOP, &mut sink);

    for word in SFD.iter().copied().chain([0xCAFE]) {
        system.ether.write_odata(word);
        system.ether_strobe(1, &mut sink);
    }
    system.ether_write_octl(OCTL_ENABLE_TX | OCTL_LAST_WORD, &mut sink);

    // Transmit, loop back through the poll event, receive.
    run_for(&mut system, &mut sink, 300_000);

    assert!(sink.is_awake(Task::Ethernet), "input attention raised");
    assert_eq!(system.ether.read_idata(1, &mut sink), 0xCAFE);
}
