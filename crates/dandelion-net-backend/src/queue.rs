use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Bound on host frames waiting for the simulation's poll event.
pub const PENDING_FRAMES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushError {
    /// The queue already holds [`PENDING_FRAMES`] frames.
    Full,
    /// The receiver side is disabled; frames are dropped at the door.
    Disabled,
}

/// Drop accounting for the host->simulation frame queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostQueueStats {
    pub pushed: u64,
    pub dropped_full: u64,
    pub dropped_disabled: u64,
}

#[derive(Debug, Default)]
struct Shared {
    frames: Mutex<VecDeque<Vec<u16>>>,
    enabled: AtomicBool,
    pushed: AtomicU64,
    dropped_full: AtomicU64,
    dropped_disabled: AtomicU64,
}

/// Creates the bounded single-producer/single-consumer frame queue bridging
/// the host receive thread into the simulation.
///
/// Policy: frames are dropped (with a counted reason) when the receiver is
/// disabled or the queue is full — the emulated hardware has nowhere to put
/// them either. The queue starts disabled.
pub fn frame_queue() -> (FrameSender, FrameReceiver) {
    let shared = Arc::new(Shared::default());
    (
        FrameSender {
            shared: shared.clone(),
        },
        FrameReceiver { shared },
    )
}

/// Producer half, owned by the host receive thread.
#[derive(Clone, Debug)]
pub struct FrameSender {
    shared: Arc<Shared>,
}

impl FrameSender {
    /// Enqueues a received frame. Never blocks beyond the queue lock.
    pub fn push(&self, frame: Vec<u16>) -> Result<(), PushError> {
        // The enabled gate is checked before taking the lock so a disabled
        // receiver costs the host thread nothing.
        if !self.shared.enabled.load(Ordering::Acquire) {
            self.shared.dropped_disabled.fetch_add(1, Ordering::Relaxed);
            return Err(PushError::Disabled);
        }

        let mut frames = self
            .shared
            .frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if frames.len() >= PENDING_FRAMES {
            self.shared.dropped_full.fetch_add(1, Ordering::Relaxed);
            return Err(PushError::Full);
        }
        frames.push_back(frame);
        self.shared.pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Consumer half, owned by the Ethernet controller on the simulation
/// thread.
#[derive(Debug)]
pub struct FrameReceiver {
    shared: Arc<Shared>,
}

impl FrameReceiver {
    /// Gates the producer. Disabling also discards anything already queued,
    /// matching the hardware's receiver-off behavior.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.shared
                .frames
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Pops one pending frame; the poll event consumes at most one per
    /// firing.
    pub fn pop(&self) -> Option<Vec<u16>> {
        self.shared
            .frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    pub fn stats(&self) -> HostQueueStats {
        HostQueueStats {
            pushed: self.shared.pushed.load(Ordering::Relaxed),
            dropped_full: self.shared.dropped_full.load(Ordering::Relaxed),
            dropped_disabled: self.shared.dropped_disabled.load(Ordering::Relaxed),
        }
    }
}
