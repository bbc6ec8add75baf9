//! Host-network backends for the Ethernet controller.
//!
//! This crate is intentionally minimal: it deals exclusively with 16-bit
//! word frames (`Vec<u16>`, including the 4-word software SFD preamble) and
//! the one genuine concurrency boundary in the system — the host receive
//! path, which runs on a thread this crate does not own. Received frames
//! cross into the simulation through a bounded [`FrameQueue`]; the
//! controller drains it from a scheduled poll event, never by blocking.
#![forbid(unsafe_code)]

mod hub;
mod queue;

pub use hub::HubLink;
pub use queue::{frame_queue, FrameReceiver, FrameSender, HostQueueStats, PushError, PENDING_FRAMES};

/// Outbound path to the host network.
///
/// Frames are 16-bit words with the SFD preamble still attached; the
/// backend owns any further framing. `send` must not block the simulation
/// thread for longer than a socket write.
pub trait HostLink {
    fn send(&mut self, frame: &[u16]);

    /// Tears down any background receive thread. Idempotent.
    fn shutdown(&mut self) {}
}

/// No network attached: transmitted frames vanish.
impl HostLink for () {
    fn send(&mut self, _frame: &[u16]) {}
}

impl<T: HostLink + ?Sized> HostLink for Box<T> {
    fn send(&mut self, frame: &[u16]) {
        <T as HostLink>::send(&mut **self, frame);
    }

    fn shutdown(&mut self) {
        <T as HostLink>::shutdown(&mut **self);
    }
}

impl<T: HostLink + ?Sized> HostLink for &mut T {
    fn send(&mut self, frame: &[u16]) {
        <T as HostLink>::send(&mut **self, frame);
    }

    fn shutdown(&mut self) {
        <T as HostLink>::shutdown(&mut **self);
    }
}
