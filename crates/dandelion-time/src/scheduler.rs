use crate::Clock;

/// One CP microinstruction cycle, the fixed step of the simulation clock.
pub const CYCLE_NS: u64 = 137;

/// Handle returned by [`Scheduler::schedule`], usable to cancel the event
/// before it fires. Stale handles (already fired or canceled) are harmless.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId(u64);

/// A due event removed from the queue.
///
/// `skew_ns` is how far past its deadline the event fired (the clock only
/// moves in [`CYCLE_NS`] steps, so deadlines rarely land exactly on a tick).
/// Periodic handlers subtract the skew from their next delay to stay on
/// their nominal period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fired<T> {
    pub tag: T,
    pub deadline_ns: u64,
    pub skew_ns: u64,
}

#[derive(Clone, Debug)]
struct Entry<T> {
    id: EventId,
    deadline_ns: u64,
    tag: T,
}

/// Ordered event queue over a virtual [`Clock`].
///
/// The queue is kept sorted ascending by deadline; events with equal
/// deadlines fire in the order they were scheduled. Not thread-safe: all use
/// happens on the simulation thread.
#[derive(Clone, Debug, Default)]
pub struct Scheduler<T> {
    clock: Clock,
    queue: Vec<Entry<T>>,
    next_id: u64,
}

impl<T: Copy> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
            queue: Vec::new(),
            next_id: 0,
        }
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    /// Advances the simulation clock by one [`CYCLE_NS`] step.
    ///
    /// Events that have come due are not fired here; the caller drains them
    /// with [`Scheduler::pop_due`] so it can dispatch each one while holding
    /// `&mut self` for reschedules.
    pub fn tick(&mut self) {
        self.clock.advance(CYCLE_NS);
    }

    /// Schedules `tag` to fire `delay_ns` from now. Returns a handle for
    /// [`Scheduler::cancel`].
    pub fn schedule(&mut self, delay_ns: u64, tag: T) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        let deadline_ns = self.clock.now_ns().saturating_add(delay_ns);
        // Insert after every entry with an earlier-or-equal deadline so that
        // equal deadlines fire in schedule order.
        let at = self
            .queue
            .partition_point(|e| e.deadline_ns <= deadline_ns);
        self.queue.insert(
            at,
            Entry {
                id,
                deadline_ns,
                tag,
            },
        );
        id
    }

    /// Cancels a scheduled event. A handle that already fired (or was never
    /// scheduled) is a no-op.
    pub fn cancel(&mut self, id: EventId) {
        if let Some(at) = self.queue.iter().position(|e| e.id == id) {
            self.queue.remove(at);
        }
    }

    /// Removes and returns the earliest event whose deadline has passed.
    pub fn pop_due(&mut self) -> Option<Fired<T>> {
        let now = self.clock.now_ns();
        match self.queue.first() {
            Some(head) if head.deadline_ns <= now => {
                let entry = self.queue.remove(0);
                Some(Fired {
                    tag: entry.tag,
                    deadline_ns: entry.deadline_ns,
                    skew_ns: now - entry.deadline_ns,
                })
            }
            _ => None,
        }
    }

    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.queue.iter().any(|e| e.id == id)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drops every queued event and restarts the virtual clock. Used by the
    /// machine's reset path before devices re-arm their periodic events.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.clock = Clock::new();
    }
}
