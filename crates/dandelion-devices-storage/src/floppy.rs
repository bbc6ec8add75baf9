use dandelion_storage::{FloppyDisk, Track};
use dandelion_time::{EventId, Scheduler};

/// One rotation at 300 RPM.
pub const ROTATION_NS: u64 = 200_000_000;

/// How long the index pulse is held high each rotation.
pub const INDEX_PULSE_NS: u64 = 10_000;

const MAX_CYLINDER: u8 = 76;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloppyEvent {
    IndexOn,
    IndexOff,
}

/// Rotational and seek timing around a loaded [`FloppyDisk`].
///
/// The index pulse fires once per rotation while the drive is selected with
/// a disk in it. Seeks have no modeled settle time. `disk_change` latches on
/// load/unload and is acknowledged (cleared) by deselecting the drive,
/// matching the hardware contract.
#[derive(Debug, Default)]
pub struct FloppyDrive {
    disk: Option<FloppyDisk>,
    cylinder: u8,
    selected: bool,
    index: bool,
    disk_change: bool,
    rotation: Option<EventId>,
    pulse: Option<EventId>,
}

impl FloppyDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disk(&self) -> Option<&FloppyDisk> {
        self.disk.as_ref()
    }

    pub fn disk_mut(&mut self) -> Option<&mut FloppyDisk> {
        self.disk.as_mut()
    }

    /// The track currently under `head`, if the loaded image recorded one.
    pub fn current_track(&self, head: u8) -> Option<&Track> {
        self.disk.as_ref()?.track(head, self.cylinder)
    }

    pub fn cylinder(&self) -> u8 {
        self.cylinder
    }

    pub fn index(&self) -> bool {
        self.index
    }

    pub fn disk_change(&self) -> bool {
        self.disk_change
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn load_disk<T: From<FloppyEvent> + Copy>(
        &mut self,
        disk: FloppyDisk,
        sched: &mut Scheduler<T>,
    ) {
        self.disk = Some(disk);
        self.disk_change = true;
        self.update_rotation(sched);
    }

    pub fn unload_disk<T: From<FloppyEvent> + Copy>(
        &mut self,
        sched: &mut Scheduler<T>,
    ) -> Option<FloppyDisk> {
        let disk = self.disk.take();
        if disk.is_some() {
            self.disk_change = true;
        }
        self.update_rotation(sched);
        disk
    }

    /// Selecting starts index timing; deselecting acknowledges
    /// `disk_change`.
    pub fn set_drive_select<T: From<FloppyEvent> + Copy>(
        &mut self,
        selected: bool,
        sched: &mut Scheduler<T>,
    ) {
        if !selected {
            self.disk_change = false;
        }
        self.selected = selected;
        self.update_rotation(sched);
    }

    /// Head positioning, clipped to the 77-cylinder geometry.
    pub fn seek_to(&mut self, cylinder: u8) {
        self.cylinder = cylinder.min(MAX_CYLINDER);
    }

    /// Power-up/reset: forgets any queued rotation events (the machine has
    /// cleared the scheduler) and re-arms if the drive is still spinning.
    /// The loaded disk and head position survive.
    pub fn reset<T: From<FloppyEvent> + Copy>(&mut self, sched: &mut Scheduler<T>) {
        self.index = false;
        self.rotation = None;
        self.pulse = None;
        self.update_rotation(sched);
    }

    pub fn handle_event<T: From<FloppyEvent> + Copy>(
        &mut self,
        event: FloppyEvent,
        skew_ns: u64,
        sched: &mut Scheduler<T>,
    ) {
        match event {
            FloppyEvent::IndexOn => {
                self.index = true;
                self.pulse =
                    Some(sched.schedule(INDEX_PULSE_NS, FloppyEvent::IndexOff.into()));
                self.rotation = Some(sched.schedule(
                    ROTATION_NS.saturating_sub(skew_ns),
                    FloppyEvent::IndexOn.into(),
                ));
            }
            FloppyEvent::IndexOff => {
                self.index = false;
                self.pulse = None;
            }
        }
    }

    fn update_rotation<T: From<FloppyEvent> + Copy>(&mut self, sched: &mut Scheduler<T>) {
        let spinning = self.selected && self.disk.is_some();
        if spinning {
            if self.rotation.is_none() {
                self.rotation = Some(sched.schedule(ROTATION_NS, FloppyEvent::IndexOn.into()));
            }
        } else {
            if let Some(id) = self.rotation.take() {
                sched.cancel(id);
            }
            if let Some(id) = self.pulse.take() {
                sched.cancel(id);
            }
            self.index = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dandelion_storage::FloppyDisk;

    fn single_track_disk() -> FloppyDisk {
        let mut raw = vec![0x1A]; // empty comment header
        raw.extend_from_slice(&[3, 0, 0, 1, 0, 1, 1]);
        raw.extend_from_slice(&[0; 128]);
        FloppyDisk::read(&raw[..]).unwrap()
    }

    /// Runs the clock to `until_ns`, counting ticks where index is high.
    fn pump(drive: &mut FloppyDrive, sched: &mut Scheduler<FloppyEvent>, until_ns: u64) -> u64 {
        let mut high_ticks = 0;
        while sched.now_ns() < until_ns {
            sched.tick();
            while let Some(ev) = sched.pop_due() {
                drive.handle_event(ev.tag, ev.skew_ns, sched);
            }
            if drive.index() {
                high_ticks += 1;
            }
        }
        high_ticks
    }

    #[test]
    fn index_pulses_once_per_rotation_while_selected() {
        let mut sched = Scheduler::new();
        let mut drive = FloppyDrive::new();
        drive.load_disk(single_track_disk(), &mut sched);
        drive.set_drive_select(true, &mut sched);

        let high_ticks = pump(&mut drive, &mut sched, 2 * ROTATION_NS + ROTATION_NS / 2);
        // Two rotations completed: two ~10us pulses, quantized to the 137ns
        // tick (73 ticks each).
        let per_pulse = INDEX_PULSE_NS / dandelion_time::CYCLE_NS;
        assert!(high_ticks >= 2 * per_pulse);
        assert!(high_ticks <= 2 * (per_pulse + 2));
    }

    #[test]
    fn no_index_when_deselected_or_empty() {
        let mut sched: Scheduler<FloppyEvent> = Scheduler::new();
        let mut drive = FloppyDrive::new();

        drive.set_drive_select(true, &mut sched);
        assert_eq!(sched.pending(), 0, "no disk, no rotation event");

        drive.load_disk(single_track_disk(), &mut sched);
        assert_eq!(sched.pending(), 1);
        drive.set_drive_select(false, &mut sched);
        assert_eq!(sched.pending(), 0, "deselect cancels rotation");
        assert!(!drive.index());
    }

    #[test]
    fn deselect_acknowledges_disk_change() {
        let mut sched: Scheduler<FloppyEvent> = Scheduler::new();
        let mut drive = FloppyDrive::new();
        drive.load_disk(single_track_disk(), &mut sched);
        assert!(drive.disk_change());

        drive.set_drive_select(true, &mut sched);
        assert!(drive.disk_change(), "select does not acknowledge");
        drive.set_drive_select(false, &mut sched);
        assert!(!drive.disk_change());
    }

    #[test]
    fn seek_clips_to_geometry() {
        let mut drive = FloppyDrive::new();
        drive.seek_to(76);
        assert_eq!(drive.cylinder(), 76);
        drive.seek_to(200);
        assert_eq!(drive.cylinder(), 76);
    }
}
