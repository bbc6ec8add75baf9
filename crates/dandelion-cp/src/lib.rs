//! Interfaces this core consumes from the central processor.
//!
//! The CP's microcode task scheduler is outside this workspace; controllers
//! see it only as a wake/sleep line per task. The [`TaskSink`] capability is
//! injected per call (`&mut dyn TaskSink`) so no device holds a reference
//! into CP state.
#![forbid(unsafe_code)]

/// CP microcode task ids.
///
/// Only `Disk` and `Ethernet` are woken by this core, but the full id space
/// is needed for the per-task memory error bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Task {
    Emulator = 0,
    Disk = 1,
    Display = 2,
    Ethernet = 3,
    Iop = 4,
    Refresh = 5,
}

impl Task {
    pub const COUNT: usize = 6;

    pub fn from_index(index: u8) -> Option<Task> {
        match index {
            0 => Some(Task::Emulator),
            1 => Some(Task::Disk),
            2 => Some(Task::Display),
            3 => Some(Task::Ethernet),
            4 => Some(Task::Iop),
            5 => Some(Task::Refresh),
            _ => None,
        }
    }
}

/// Wake/sleep line into the CP task scheduler.
///
/// Level-triggered and idempotent: waking an awake task or sleeping a
/// sleeping one must be harmless.
pub trait TaskSink {
    fn wake(&mut self, task: Task);
    fn sleep(&mut self, task: Task);
}

/// Discards all wake/sleep signals. Useful for tests and for running a
/// device without a CP attached.
impl TaskSink for () {
    fn wake(&mut self, _task: Task) {}
    fn sleep(&mut self, _task: Task) {}
}

impl<T: TaskSink + ?Sized> TaskSink for &mut T {
    fn wake(&mut self, task: Task) {
        <T as TaskSink>::wake(&mut **self, task);
    }

    fn sleep(&mut self, task: Task) {
        <T as TaskSink>::sleep(&mut **self, task);
    }
}

impl<T: TaskSink + ?Sized> TaskSink for Box<T> {
    fn wake(&mut self, task: Task) {
        <T as TaskSink>::wake(&mut **self, task);
    }

    fn sleep(&mut self, task: Task) {
        <T as TaskSink>::sleep(&mut **self, task);
    }
}

/// Records the most recent wake/sleep level per task. Test double for the CP
/// scheduler.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    levels: [bool; Task::COUNT],
    pub wakes: u64,
    pub sleeps: u64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_awake(&self, task: Task) -> bool {
        self.levels[task as usize]
    }
}

impl TaskSink for RecordingSink {
    fn wake(&mut self, task: Task) {
        self.levels[task as usize] = true;
        self.wakes += 1;
    }

    fn sleep(&mut self, task: Task) {
        self.levels[task as usize] = false;
        self.sleeps += 1;
    }
}
