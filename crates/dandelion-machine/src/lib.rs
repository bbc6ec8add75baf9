//! System wiring: one scheduler, every controller, and the per-tick drive
//! loop.
//!
//! The host execution loop calls [`System::clock`] once per microinstruction
//! cycle. Due events are drained in timestamp order and dispatched to the
//! device that scheduled them; handlers reschedule themselves through the
//! same `&mut Scheduler`, which is the only way periodic behavior exists in
//! this core.
#![forbid(unsafe_code)]

use dandelion_cp::TaskSink;
use dandelion_devices_storage::{
    DiskEvent, FloppyDrive, FloppyEvent, Sa1000Drive, ShugartController,
};
use dandelion_mem::{Memory, MemoryConfigError, MemoryController};
use dandelion_net::{EtherEvent, EthernetController};
use dandelion_net_backend::HostLink;
use dandelion_storage::{DriveType, FloppyDisk};
use dandelion_time::Scheduler;

/// Tag for every event in the system's single timer queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceEvent {
    Floppy(FloppyEvent),
    Disk(DiskEvent),
    Ether(EtherEvent),
}

impl From<FloppyEvent> for DeviceEvent {
    fn from(ev: FloppyEvent) -> Self {
        DeviceEvent::Floppy(ev)
    }
}

impl From<DiskEvent> for DeviceEvent {
    fn from(ev: DiskEvent) -> Self {
        DeviceEvent::Disk(ev)
    }
}

impl From<EtherEvent> for DeviceEvent {
    fn from(ev: EtherEvent) -> Self {
        DeviceEvent::Ether(ev)
    }
}

pub struct System {
    sched: Scheduler<DeviceEvent>,
    pub mem: MemoryController,
    pub disk: ShugartController,
    pub ether: EthernetController,
    floppy: FloppyDrive,
}

impl System {
    pub fn new(
        memory_kw: usize,
        drive_type: DriveType,
        mac: [u8; 6],
        host: Box<dyn HostLink>,
    ) -> Result<System, MemoryConfigError> {
        Ok(System {
            sched: Scheduler::new(),
            mem: MemoryController::new(Memory::new(memory_kw)?),
            disk: ShugartController::new(Sa1000Drive::new(drive_type)),
            ether: EthernetController::new(mac, host),
            floppy: FloppyDrive::new(),
        })
    }

    /// Power-up/reset: every controller returns to its initial state and
    /// the periodic events are re-armed. Memory contents and platters
    /// survive.
    pub fn reset(&mut self, tasks: &mut dyn TaskSink) {
        self.sched.clear();
        self.mem.reset();
        self.disk.reset(tasks);
        self.ether.reset(tasks);
        self.floppy.reset(&mut self.sched);
        self.disk.start(&mut self.sched);
        self.ether.start(&mut self.sched);
    }

    /// Advances the simulation by one 137ns cycle and fires everything that
    /// came due, in timestamp order.
    pub fn clock(&mut self, tasks: &mut dyn TaskSink) {
        self.sched.tick();
        while let Some(fired) = self.sched.pop_due() {
            match fired.tag {
                DeviceEvent::Floppy(ev) => {
                    self.floppy.handle_event(ev, fired.skew_ns, &mut self.sched);
                }
                DeviceEvent::Disk(ev) => {
                    self.disk
                        .handle_event(ev, fired.skew_ns, &mut self.sched, tasks);
                }
                DeviceEvent::Ether(ev) => {
                    self.ether
                        .handle_event(ev, fired.skew_ns, &mut self.sched, tasks);
                }
            }
        }
    }

    pub fn now_ns(&self) -> u64 {
        self.sched.now_ns()
    }

    // Register accesses that schedule or cancel events go through the
    // system so they can reach the timer queue.

    pub fn ether_write_octl(&mut self, value: u16, tasks: &mut dyn TaskSink) {
        self.ether.write_octl(value, &mut self.sched, tasks);
    }

    pub fn ether_write_ictl(&mut self, value: u16, tasks: &mut dyn TaskSink) {
        self.ether.write_ictl(value, &mut self.sched, tasks);
    }

    pub fn ether_strobe(&mut self, cycle: u8, tasks: &mut dyn TaskSink) {
        self.ether.strobe(cycle, &mut self.sched, tasks);
    }

    pub fn floppy(&self) -> &FloppyDrive {
        &self.floppy
    }

    pub fn floppy_mut(&mut self) -> &mut FloppyDrive {
        &mut self.floppy
    }

    pub fn floppy_load(&mut self, disk: FloppyDisk) {
        self.floppy.load_disk(disk, &mut self.sched);
    }

    pub fn floppy_unload(&mut self) -> Option<FloppyDisk> {
        self.floppy.unload_disk(&mut self.sched)
    }

    pub fn floppy_select(&mut self, selected: bool) {
        self.floppy.set_drive_select(selected, &mut self.sched);
    }
}
