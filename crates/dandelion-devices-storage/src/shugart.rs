//! Shugart SA1000-interface disk controller.
//!
//! The microcode programs the controller through a 16-bit control word
//! (KCtl) and moves data one word at a time through KData, paced by the
//! drive's word clock. Three transfer protocols run over the same word
//! tick: read, verify and write, each a small state machine. Faults are
//! sticky status bits surfaced through KStatus (active low on the bus);
//! only a microcode contract violation — an impossible control-word
//! combination — is treated as a hard failure.

use std::collections::VecDeque;

use bitflags::bitflags;
use dandelion_cp::{Task, TaskSink};
use dandelion_storage::{ADDRESS_MARK, CRC_FLAG};
use dandelion_time::{EventId, Scheduler};

use crate::sa1000::{Sa1000Drive, SEEK_SETTLE_NS, WORD_NS};

/// Hardware-generated preamble words before the microcode-supplied ones.
pub const AUTO_PREAMBLE_WORDS: u8 = 2;

/// Microcode-supplied preamble words ahead of the address mark.
pub const PREAMBLE_WORDS: u8 = 4;

/// Depth of the KData write pipeline between microcode and the drive.
pub const WRITE_PIPELINE_DEPTH: usize = 2;

/// Stamp value the hardware writes for CRC words and checks on read/verify.
///
/// A placeholder, not a computed CRC16; the microcode is tuned against this
/// residual and it must not be "fixed" to a real one.
pub const CRC_STAMP: u16 = 0x1D0F;

// KCtl bit assignments.
const KCTL_WAKEUP_MASK: u16 = 0x0007;
const KCTL_TRANSFER_ENABLE: u16 = 1 << 3;
const KCTL_WRITE_ENABLE: u16 = 1 << 4;
const KCTL_HEAD_SHIFT: u16 = 5;
const KCTL_HEAD_MASK: u16 = 0x7;
const KCTL_DRIVE_SELECT: u16 = 1 << 8;
const KCTL_STEP: u16 = 1 << 9;
const KCTL_DIRECTION_IN: u16 = 1 << 10;
const KCTL_CRC_GENERATE: u16 = 1 << 11;

bitflags! {
    /// KStatus bits, composed active-high and inverted on read (the status
    /// bus is active low).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct KStatus: u16 {
        const VERIFY_ERROR = 1 << 0;
        const CRC_ERROR = 1 << 1;
        const OVERRUN = 1 << 2;
        const WRITE_FAULT = 1 << 3;
        const NOT_READY = 1 << 4;
        const SECTOR_FOUND = 1 << 5;
        const INDEX_FOUND = 1 << 6;
        const FIRMWARE_ENABLE = 1 << 7;
        const TRACK0 = 1 << 8;
        const SEEK_COMPLETE = 1 << 9;
        const HEAD_SELECT = 1 << 10;
    }
}

/// Events the controller schedules for itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskEvent {
    /// The word clock: one word passed under the head.
    Word,
    /// A buffered seek's settle time elapsed.
    SeekDone,
}

/// Which condition the microcode asked to be woken for (KCtl bits 0..2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Wakeup {
    FirmwareEnable,
    SeekComplete,
    IndexFound,
    SectorFound,
    ReadWordReady,
    WriteWordNeeded,
    NoWakeup,
}

impl Wakeup {
    fn from_bits(bits: u16) -> Wakeup {
        match bits {
            0 => Wakeup::FirmwareEnable,
            1 => Wakeup::SeekComplete,
            2 => Wakeup::IndexFound,
            3 => Wakeup::SectorFound,
            4 => Wakeup::ReadWordReady,
            5 => Wakeup::WriteWordNeeded,
            6 => Wakeup::NoWakeup,
            _ => panic!("KCtl wakeup selector {bits} is not a valid microcode request"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriteState {
    /// Hardware-generated zero words before the microcode takes over.
    AutoPreamble { remaining: u8 },
    Preamble { remaining: u8 },
    AddressMark,
    Data,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VerifyState {
    WaitAddressMark,
    Data,
    Crc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadState {
    WaitAddressMark,
    Data,
    Crc,
}

/// The active transfer and its sub-state, one tagged value so impossible
/// combinations cannot be represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transfer {
    None,
    Read(ReadState),
    Verify(VerifyState),
    Write(WriteState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TransferKind {
    None,
    Read,
    Verify,
    Write,
}

impl Transfer {
    fn kind(self) -> TransferKind {
        match self {
            Transfer::None => TransferKind::None,
            Transfer::Read(_) => TransferKind::Read,
            Transfer::Verify(_) => TransferKind::Verify,
            Transfer::Write(_) => TransferKind::Write,
        }
    }

    fn fresh(kind: TransferKind) -> Transfer {
        match kind {
            TransferKind::None => Transfer::None,
            TransferKind::Read => Transfer::Read(ReadState::WaitAddressMark),
            TransferKind::Verify => Transfer::Verify(VerifyState::WaitAddressMark),
            TransferKind::Write => Transfer::Write(WriteState::AutoPreamble {
                remaining: AUTO_PREAMBLE_WORDS,
            }),
        }
    }
}

pub struct ShugartController {
    drive: Sa1000Drive,

    wakeup: Wakeup,
    write_enable: bool,
    transfer_enable: bool,
    crc_generate: bool,
    drive_select: bool,

    transfer: Transfer,
    pipeline: VecDeque<u16>,
    read_data: u16,
    read_ready: bool,

    // Sticky fault/condition latches, cleared by ClrKFlags.
    crc_error: bool,
    verify_error: bool,
    overrun: bool,
    index_found: bool,
    sector_found: bool,

    word_event: Option<EventId>,
    seek_event: Option<EventId>,
}

impl ShugartController {
    pub fn new(drive: Sa1000Drive) -> Self {
        Self {
            drive,
            wakeup: Wakeup::NoWakeup,
            write_enable: false,
            transfer_enable: false,
            crc_generate: false,
            drive_select: false,
            transfer: Transfer::None,
            pipeline: VecDeque::with_capacity(WRITE_PIPELINE_DEPTH),
            read_data: 0,
            read_ready: false,
            crc_error: false,
            verify_error: false,
            overrun: false,
            index_found: false,
            sector_found: false,
            word_event: None,
            seek_event: None,
        }
    }

    pub fn drive(&self) -> &Sa1000Drive {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut Sa1000Drive {
        &mut self.drive
    }

    /// Arms the word clock. Called at power-up/reset by the machine.
    pub fn start<T: From<DiskEvent> + Copy>(&mut self, sched: &mut Scheduler<T>) {
        if self.word_event.is_none() {
            self.word_event = Some(sched.schedule(WORD_NS, DiskEvent::Word.into()));
        }
    }

    /// Power-up/reset: clears protocol state and latches; the platters are
    /// untouched. The caller re-arms the word clock with
    /// [`ShugartController::start`].
    pub fn reset(&mut self, tasks: &mut dyn TaskSink) {
        self.wakeup = Wakeup::NoWakeup;
        self.write_enable = false;
        self.transfer_enable = false;
        self.crc_generate = false;
        self.drive_select = false;
        self.transfer = Transfer::None;
        self.pipeline.clear();
        self.read_data = 0;
        self.read_ready = false;
        self.crc_error = false;
        self.verify_error = false;
        self.overrun = false;
        self.index_found = false;
        self.sector_found = false;
        self.word_event = None;
        self.seek_event = None;
        self.drive.reset();
        tasks.sleep(Task::Disk);
    }

    /// Writes the control word: derives the active transfer, forwards head
    /// select and step pulses to the drive, and re-evaluates the wake line.
    ///
    /// # Panics
    ///
    /// Panics on a write-enable/wakeup combination that no transfer protocol
    /// defines while transfers are enabled — that is a microcode logic bug,
    /// not a hardware condition (see module docs).
    pub fn set_kctl(&mut self, value: u16, tasks: &mut dyn TaskSink) {
        self.wakeup = Wakeup::from_bits(value & KCTL_WAKEUP_MASK);
        self.transfer_enable = value & KCTL_TRANSFER_ENABLE != 0;
        self.write_enable = value & KCTL_WRITE_ENABLE != 0;
        self.crc_generate = value & KCTL_CRC_GENERATE != 0;
        self.drive_select = value & KCTL_DRIVE_SELECT != 0;

        self.drive
            .set_head(((value >> KCTL_HEAD_SHIFT) & KCTL_HEAD_MASK) as usize);
        self.drive
            .step(value & KCTL_DIRECTION_IN != 0, value & KCTL_STEP != 0);

        let kind = if self.transfer_enable {
            match (self.write_enable, self.wakeup) {
                (true, Wakeup::WriteWordNeeded) => TransferKind::Write,
                (false, Wakeup::WriteWordNeeded) => TransferKind::Verify,
                (false, Wakeup::ReadWordReady) => TransferKind::Read,
                (write_enable, wakeup) => panic!(
                    "impossible KCtl transfer request: write_enable={write_enable} wakeup={wakeup:?}"
                ),
            }
        } else {
            TransferKind::None
        };
        // Re-writing KCtl with the same transfer type (e.g. to pulse step or
        // raise CRC generate) must not restart the protocol mid-field.
        if kind != self.transfer.kind() {
            self.transfer = Transfer::fresh(kind);
            self.pipeline.clear();
            self.read_ready = false;
        }

        self.update_wakeup(tasks);
    }

    /// Microcode pushes the next outbound word (preamble, address mark,
    /// data, or verify compare value).
    pub fn write_kdata(&mut self, value: u16, tasks: &mut dyn TaskSink) {
        if self.pipeline.len() >= WRITE_PIPELINE_DEPTH {
            tracing::warn!(value, "KData write pipeline full, word dropped");
        } else {
            self.pipeline.push_back(value);
        }
        self.update_wakeup(tasks);
    }

    /// Microcode pops the latest word read off the platter.
    pub fn read_kdata(&mut self, tasks: &mut dyn TaskSink) -> u16 {
        self.read_ready = false;
        self.update_wakeup(tasks);
        self.read_data
    }

    /// Clears the sticky fault/found latches. The wake line drops unless the
    /// selected wakeup condition is level-driven (firmware enable, seek
    /// complete) and still holds.
    pub fn clr_kflags(&mut self, tasks: &mut dyn TaskSink) {
        self.crc_error = false;
        self.verify_error = false;
        self.overrun = false;
        self.index_found = false;
        self.sector_found = false;
        self.read_ready = false;
        self.update_wakeup(tasks);
    }

    /// Composes the status word. Active low on the bus: every bit is
    /// inverted on read, so microcode tests for zero bits.
    pub fn read_kstatus(&self) -> u16 {
        let mut status = KStatus::empty();
        status.set(KStatus::VERIFY_ERROR, self.verify_error);
        status.set(KStatus::CRC_ERROR, self.crc_error);
        status.set(KStatus::OVERRUN, self.overrun);
        // Write faults are not modeled; the bit exists for the microcode.
        status.set(KStatus::WRITE_FAULT, false);
        status.set(KStatus::NOT_READY, !self.drive_select);
        status.set(KStatus::SECTOR_FOUND, self.sector_found);
        status.set(KStatus::INDEX_FOUND, self.index_found);
        status.set(
            KStatus::FIRMWARE_ENABLE,
            self.wakeup == Wakeup::FirmwareEnable,
        );
        status.set(KStatus::TRACK0, self.drive.track0());
        status.set(KStatus::SEEK_COMPLETE, self.drive.seek_complete());
        status.set(KStatus::HEAD_SELECT, self.drive.head() & 1 != 0);
        !status.bits()
    }

    pub fn handle_event<T: From<DiskEvent> + Copy>(
        &mut self,
        event: DiskEvent,
        skew_ns: u64,
        sched: &mut Scheduler<T>,
        tasks: &mut dyn TaskSink,
    ) {
        match event {
            DiskEvent::Word => {
                let service = self.drive.service_word();
                if service.index {
                    self.index_found = true;
                }
                if service.seek_started {
                    if let Some(id) = self.seek_event.take() {
                        sched.cancel(id);
                    }
                    self.seek_event =
                        Some(sched.schedule(SEEK_SETTLE_NS, DiskEvent::SeekDone.into()));
                }

                // Sector boundaries are only observable as address marks
                // passing under the head; don't sample a cell the write
                // path is about to overwrite.
                if !matches!(self.transfer, Transfer::Write(_))
                    && self.drive.read_word() & ADDRESS_MARK != 0
                {
                    self.sector_found = true;
                }

                if self.transfer_enable {
                    self.word_tick();
                }
                self.update_wakeup(tasks);

                self.word_event =
                    Some(sched.schedule(WORD_NS.saturating_sub(skew_ns), DiskEvent::Word.into()));
            }
            DiskEvent::SeekDone => {
                self.seek_event = None;
                self.drive.complete_seek();
                self.update_wakeup(tasks);
            }
        }
    }

    fn word_tick(&mut self) {
        match self.transfer {
            Transfer::None => {}
            Transfer::Write(state) => self.write_tick(state),
            Transfer::Verify(state) => self.verify_tick(state),
            Transfer::Read(state) => self.read_tick(state),
        }
    }

    fn write_tick(&mut self, state: WriteState) {
        use WriteState::*;

        let next = match state {
            AutoPreamble { remaining } => {
                self.drive.write_word(0);
                if remaining > 1 {
                    AutoPreamble {
                        remaining: remaining - 1,
                    }
                } else {
                    Preamble {
                        remaining: PREAMBLE_WORDS,
                    }
                }
            }
            Preamble { remaining } => match self.pipeline.pop_front() {
                Some(word) => {
                    self.drive.write_word(word);
                    if remaining > 1 {
                        Preamble {
                            remaining: remaining - 1,
                        }
                    } else {
                        AddressMark
                    }
                }
                None => {
                    self.overrun = true;
                    Complete
                }
            },
            AddressMark => match self.pipeline.pop_front() {
                Some(word) => {
                    self.drive.write_address_mark(word);
                    Data
                }
                None => {
                    self.overrun = true;
                    Complete
                }
            },
            // CRC generate closes the field only once the pipeline has
            // drained; until then queued data words keep flowing.
            Data => match self.pipeline.pop_front() {
                Some(word) => {
                    self.drive.write_word(word);
                    Data
                }
                None if self.crc_generate => {
                    // The hardware closes the field with two tagged filler
                    // words inside this word time.
                    self.drive.write_crc(CRC_STAMP);
                    self.drive.advance_word();
                    self.drive.write_crc(CRC_STAMP);
                    Complete
                }
                None => {
                    self.overrun = true;
                    Complete
                }
            },
            Complete => Complete,
        };
        self.transfer = Transfer::Write(next);
    }

    fn verify_tick(&mut self, state: VerifyState) {
        use VerifyState::*;

        let cell = self.drive.read_word();
        let next = match state {
            WaitAddressMark => {
                if cell & ADDRESS_MARK != 0 {
                    // Optimistically flagged; cleared only by a matching
                    // CRC word at the end of the field.
                    self.crc_error = true;
                    Data
                } else {
                    WaitAddressMark
                }
            }
            Data => {
                if cell & CRC_FLAG != 0 {
                    if cell as u16 == CRC_STAMP {
                        self.crc_error = false;
                    }
                    Crc
                } else {
                    match self.pipeline.pop_front() {
                        Some(expected) => {
                            if expected != cell as u16 {
                                self.verify_error = true;
                            }
                        }
                        None => self.overrun = true,
                    }
                    Data
                }
            }
            // Trailing words after the CRC are absorbed and ignored.
            Crc => Crc,
        };
        self.transfer = Transfer::Verify(next);
    }

    fn read_tick(&mut self, state: ReadState) {
        use ReadState::*;

        let cell = self.drive.read_word();
        let next = match state {
            WaitAddressMark => {
                if cell & ADDRESS_MARK != 0 {
                    Data
                } else {
                    WaitAddressMark
                }
            }
            Data => {
                if cell & CRC_FLAG != 0 {
                    if cell as u16 != CRC_STAMP {
                        self.crc_error = true;
                    }
                    Crc
                } else {
                    if self.read_ready {
                        // Microcode missed a word.
                        self.overrun = true;
                    }
                    self.read_data = cell as u16;
                    self.read_ready = true;
                    Data
                }
            }
            Crc => Crc,
        };
        self.transfer = Transfer::Read(next);
    }

    /// Single authority for the Disk task wake line, re-evaluated after
    /// every state change.
    fn update_wakeup(&mut self, tasks: &mut dyn TaskSink) {
        let wake = match self.wakeup {
            Wakeup::FirmwareEnable => true,
            Wakeup::SeekComplete => self.drive.seek_complete(),
            Wakeup::IndexFound => self.index_found,
            Wakeup::SectorFound => self.sector_found,
            Wakeup::ReadWordReady => self.read_ready,
            Wakeup::WriteWordNeeded => self.write_word_needed(),
            Wakeup::NoWakeup => false,
        };
        if wake {
            tasks.wake(Task::Disk);
        } else {
            tasks.sleep(Task::Disk);
        }
    }

    /// The microcode owes the pipeline a word: a write or verify transfer
    /// is in a word-consuming state and there is room.
    fn write_word_needed(&self) -> bool {
        let consuming = match self.transfer {
            Transfer::Write(state) => !matches!(
                state,
                WriteState::AutoPreamble { .. } | WriteState::Complete
            ),
            Transfer::Verify(state) => !matches!(state, VerifyState::Crc),
            _ => false,
        };
        consuming && self.pipeline.len() < WRITE_PIPELINE_DEPTH
    }

    /// True once a write transfer has finished its CRC words.
    pub fn write_complete(&self) -> bool {
        matches!(self.transfer, Transfer::Write(WriteState::Complete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dandelion_storage::DriveType;

    fn controller() -> ShugartController {
        ShugartController::new(Sa1000Drive::new(DriveType::Sa1004))
    }

    const KCTL_WRITE: u16 = 5 /* WriteWordNeeded */ | KCTL_TRANSFER_ENABLE | KCTL_WRITE_ENABLE;

    #[test]
    fn kctl_derives_transfer_type() {
        let mut shugart = controller();
        shugart.set_kctl(KCTL_WRITE, &mut ());
        assert_eq!(shugart.transfer.kind(), TransferKind::Write);

        shugart.set_kctl(5 | KCTL_TRANSFER_ENABLE, &mut ());
        assert_eq!(shugart.transfer.kind(), TransferKind::Verify);

        shugart.set_kctl(4 | KCTL_TRANSFER_ENABLE, &mut ());
        assert_eq!(shugart.transfer.kind(), TransferKind::Read);

        shugart.set_kctl(6, &mut ());
        assert_eq!(shugart.transfer.kind(), TransferKind::None);
    }

    #[test]
    #[should_panic(expected = "impossible KCtl transfer request")]
    fn impossible_transfer_combination_panics() {
        let mut shugart = controller();
        // Write enable with a read-word-ready wakeup is undefined.
        shugart.set_kctl(4 | KCTL_TRANSFER_ENABLE | KCTL_WRITE_ENABLE, &mut ());
    }

    #[test]
    fn rewriting_kctl_same_type_keeps_sub_state() {
        let mut shugart = controller();
        shugart.set_kctl(KCTL_WRITE, &mut ());
        shugart.write_kdata(0, &mut ());
        shugart.word_tick(); // first auto preamble word
        let mid = shugart.transfer;

        shugart.set_kctl(KCTL_WRITE | KCTL_STEP, &mut ());
        assert_eq!(shugart.transfer, mid);
    }

    #[test]
    fn kstatus_is_active_low() {
        let mut shugart = controller();
        shugart.set_kctl(KCTL_DRIVE_SELECT | 6, &mut ());
        let status = !shugart.read_kstatus();
        let bits = KStatus::from_bits_truncate(status);
        assert!(bits.contains(KStatus::TRACK0));
        assert!(bits.contains(KStatus::SEEK_COMPLETE));
        assert!(!bits.contains(KStatus::NOT_READY));
        assert!(!bits.contains(KStatus::CRC_ERROR));
    }

    #[test]
    fn head_select_forwards_to_drive() {
        let mut shugart = controller();
        shugart.set_kctl(6 | (3 << KCTL_HEAD_SHIFT), &mut ());
        assert_eq!(shugart.drive().head(), 3);
    }
}
