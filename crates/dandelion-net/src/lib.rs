//! 10Mb Ethernet controller model.
//!
//! The microcode side is a handful of registers around a single 16-word
//! FIFO shared by transmit and receive. The wire side is a [`HostLink`]
//! plus the bounded cross-thread frame queue from `dandelion-net-backend`.
//! All timing is event-driven: a defer (backoff) one-shot, a word-rate
//! transmit clock, a receive poll that lifts one pending host frame per
//! firing, and a word-rate receive clock that walks the frame into the
//! FIFO.
//!
//! Frames carry a 4-word software start-frame-delimiter preamble on the
//! microcode side. Transmit validates it and forwards the trimmed payload
//! to the host; receive re-attaches it so the microcode always sees the
//! preamble walk by. Loopback frames keep theirs.
#![forbid(unsafe_code)]

mod crc;

pub use crc::{Crc32, GOOD_CRC_RESIDUAL};

use std::collections::VecDeque;

use bitflags::bitflags;
use dandelion_cp::{Task, TaskSink};
use dandelion_net_backend::{frame_queue, FrameReceiver, FrameSender, HostLink, HostQueueStats};
use dandelion_time::{EventId, Scheduler};

/// Depth of the shared transmit/receive FIFO.
pub const FIFO_DEPTH: usize = 16;

/// Transmit defer (backoff) delay: one 512-bit slot time.
pub const DEFER_NS: u64 = 51_200;

/// Period of the pending-host-frame poll.
pub const POLL_NS: u64 = 51_200;

/// One 16-bit word at 10Mb/s.
pub const TX_WORD_NS: u64 = 1_600;
pub const RX_WORD_NS: u64 = 1_600;

/// The software start-frame-delimiter preamble.
pub const SFD: [u16; 4] = [0x5555, 0x5555, 0x5555, 0x55D5];

// EOCtl bits.
const OCTL_ENABLE_TX: u16 = 1 << 0;
const OCTL_LAST_WORD: u16 = 1 << 1;
const OCTL_DEFER: u16 = 1 << 2;

// EICtl bits.
const ICTL_ENABLE_RCV: u16 = 1 << 0;
const ICTL_RCV_OFF: u16 = 1 << 1;
const ICTL_LOCAL_LOOP: u16 = 1 << 2;
const ICTL_LOOPBACK: u16 = 1 << 3;

bitflags! {
    /// EStatus bits as read by the microcode.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EStatus: u16 {
        const INPUT_ATTENTION = 1 << 0;
        const GOOD_CRC = 1 << 1;
        const UNDERRUN = 1 << 2;
        const FIFO_EMPTY = 1 << 3;
        const DEFERRING = 1 << 4;
        const OUTPUT_ATTENTION = 1 << 5;
    }
}

/// Events the controller schedules for itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EtherEvent {
    /// The defer backoff elapsed.
    Defer,
    /// Transmit word clock.
    TxWord,
    /// Periodic pending-host-frame poll.
    RxPoll,
    /// Receive word clock.
    RxWord,
}

/// Receiver sub-state: one tagged value, no boolean soup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RxState {
    Idle,
    Preamble { remaining: u8 },
    Data,
}

pub struct EthernetController {
    mac: [u8; 6],
    host: Box<dyn HostLink>,
    pending: FrameReceiver,
    sender: FrameSender,

    fifo: VecDeque<u16>,
    odata_latch: u16,
    out_packet: Vec<u16>,
    in_words: VecDeque<u16>,
    loopback_frames: VecDeque<Vec<u16>>,

    tx_enabled: bool,
    last_word: bool,
    deferring: bool,
    defer_elapsed: bool,
    underrun: bool,

    rcv_enabled: bool,
    rcv_off: bool,
    local_loop: bool,
    loopback: bool,

    rx_state: RxState,
    rx_crc: Crc32,
    crc_good: bool,
    input_attention: bool,
    output_attention: bool,

    defer_event: Option<EventId>,
    tx_event: Option<EventId>,
    poll_event: Option<EventId>,
    rx_word_event: Option<EventId>,
}

impl EthernetController {
    pub fn new(mac: [u8; 6], host: Box<dyn HostLink>) -> Self {
        let (sender, pending) = frame_queue();
        Self {
            mac,
            host,
            pending,
            sender,
            fifo: VecDeque::with_capacity(FIFO_DEPTH),
            odata_latch: 0,
            out_packet: Vec::new(),
            in_words: VecDeque::new(),
            loopback_frames: VecDeque::new(),
            tx_enabled: false,
            last_word: false,
            deferring: false,
            defer_elapsed: false,
            underrun: false,
            rcv_enabled: false,
            rcv_off: false,
            local_loop: false,
            loopback: false,
            rx_state: RxState::Idle,
            rx_crc: Crc32::new(),
            crc_good: false,
            input_attention: false,
            output_attention: false,
            defer_event: None,
            tx_event: None,
            poll_event: None,
            rx_word_event: None,
        }
    }

    /// Producer half of the pending-frame queue, for the host receive
    /// thread (or backend) to push into.
    pub fn host_sender(&self) -> FrameSender {
        self.sender.clone()
    }

    pub fn host_queue_stats(&self) -> HostQueueStats {
        self.pending.stats()
    }

    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    /// Arms the pending-frame poll. Called at power-up/reset by the
    /// machine.
    pub fn start<T: From<EtherEvent> + Copy>(&mut self, sched: &mut Scheduler<T>) {
        if self.poll_event.is_none() {
            self.poll_event = Some(sched.schedule(POLL_NS, EtherEvent::RxPoll.into()));
        }
    }

    /// Power-up/reset: drops every latch, queue and in-flight frame. The
    /// caller clears the scheduler and re-arms with
    /// [`EthernetController::start`].
    pub fn reset(&mut self, tasks: &mut dyn TaskSink) {
        self.fifo.clear();
        self.odata_latch = 0;
        self.out_packet.clear();
        self.in_words.clear();
        self.loopback_frames.clear();
        self.tx_enabled = false;
        self.last_word = false;
        self.deferring = false;
        self.defer_elapsed = false;
        self.underrun = false;
        self.rcv_enabled = false;
        self.rcv_off = false;
        self.local_loop = false;
        self.loopback = false;
        self.rx_state = RxState::Idle;
        self.rx_crc.reset();
        self.crc_good = false;
        self.input_attention = false;
        self.output_attention = false;
        self.defer_event = None;
        self.tx_event = None;
        self.poll_event = None;
        self.rx_word_event = None;
        self.pending.set_enabled(false);
        tasks.sleep(Task::Ethernet);
    }

    /// Shuts the host link down (joins its receive thread).
    pub fn shutdown_host(&mut self) {
        self.host.shutdown();
    }

    fn receiver_on(&self) -> bool {
        self.rcv_enabled && !self.rcv_off
    }

    /// EOCtl: transmitter enable, last-word mark, and the defer strobe.
    /// Writing defer restarts the backoff window.
    pub fn write_octl<T: From<EtherEvent> + Copy>(
        &mut self,
        value: u16,
        sched: &mut Scheduler<T>,
        tasks: &mut dyn TaskSink,
    ) {
        self.tx_enabled = value & OCTL_ENABLE_TX != 0;
        self.last_word = value & OCTL_LAST_WORD != 0;

        if value & OCTL_DEFER != 0 {
            if let Some(id) = self.defer_event.take() {
                sched.cancel(id);
            }
            self.deferring = true;
            self.defer_event = Some(sched.schedule(DEFER_NS, EtherEvent::Defer.into()));
        }

        if self.tx_enabled && !self.deferring {
            self.start_transmitter(sched);
        } else if !self.tx_enabled {
            if let Some(id) = self.tx_event.take() {
                sched.cancel(id);
            }
        }

        self.update_wakeup(tasks);
    }

    /// EICtl: receiver enable/off and the two loopback modes. Turning the
    /// receiver off aborts any frame in flight and closes the pending
    /// queue's gate.
    pub fn write_ictl<T: From<EtherEvent> + Copy>(
        &mut self,
        value: u16,
        sched: &mut Scheduler<T>,
        tasks: &mut dyn TaskSink,
    ) {
        self.rcv_enabled = value & ICTL_ENABLE_RCV != 0;
        self.rcv_off = value & ICTL_RCV_OFF != 0;
        self.local_loop = value & ICTL_LOCAL_LOOP != 0;
        self.loopback = value & ICTL_LOOPBACK != 0;

        self.pending.set_enabled(self.receiver_on());
        if !self.receiver_on() {
            self.abort_receive(sched);
        }

        self.update_wakeup(tasks);
    }

    /// EOData: latches one outbound word; EStrobe commits it.
    pub fn write_odata(&mut self, value: u16) {
        self.odata_latch = value;
    }

    /// EStrobe: cycle 1/3 commits the latched word into the FIFO (dropping
    /// the oldest word on overflow); cycle 2 flushes/aborts the receiver.
    pub fn strobe<T: From<EtherEvent> + Copy>(
        &mut self,
        cycle: u8,
        sched: &mut Scheduler<T>,
        tasks: &mut dyn TaskSink,
    ) {
        match cycle {
            1 | 3 => {
                if self.fifo.len() >= FIFO_DEPTH {
                    let dropped = self.fifo.pop_front();
                    tracing::error!(?dropped, "ethernet FIFO overflow, oldest word dropped");
                }
                self.fifo.push_back(self.odata_latch);
            }
            2 => {
                self.abort_receive(sched);
                self.input_attention = false;
                self.crc_good = false;
            }
            other => {
                tracing::debug!(cycle = other, "unhandled EStrobe cycle");
            }
        }
        self.update_wakeup(tasks);
    }

    /// EIData: pops one word off the FIFO.
    pub fn read_idata(&mut self, _cycle: u8, tasks: &mut dyn TaskSink) -> u16 {
        let word = match self.fifo.pop_front() {
            Some(word) => word,
            None => {
                tracing::warn!("EIData read from empty FIFO");
                0
            }
        };
        self.update_wakeup(tasks);
        word
    }

    pub fn read_status(&self) -> u16 {
        let mut status = EStatus::empty();
        status.set(EStatus::INPUT_ATTENTION, self.input_attention);
        status.set(EStatus::GOOD_CRC, self.crc_good);
        status.set(EStatus::UNDERRUN, self.underrun);
        status.set(EStatus::FIFO_EMPTY, self.fifo.is_empty());
        status.set(EStatus::DEFERRING, self.deferring);
        status.set(EStatus::OUTPUT_ATTENTION, self.output_attention);
        status.bits()
    }

    /// EtherDisp: the low word of the station address.
    pub fn read_disp(&self) -> u16 {
        u16::from_be_bytes([self.mac[4], self.mac[5]])
    }

    /// Clears the sticky attention/fault latches after the microcode has
    /// serviced them.
    pub fn clear_attention(&mut self, tasks: &mut dyn TaskSink) {
        self.input_attention = false;
        self.output_attention = false;
        self.underrun = false;
        self.update_wakeup(tasks);
    }

    pub fn handle_event<T: From<EtherEvent> + Copy>(
        &mut self,
        event: EtherEvent,
        skew_ns: u64,
        sched: &mut Scheduler<T>,
        tasks: &mut dyn TaskSink,
    ) {
        match event {
            EtherEvent::Defer => {
                self.defer_event = None;
                self.deferring = false;
                // One-shot: consumed by the wake it causes.
                self.defer_elapsed = true;
                if self.tx_enabled {
                    self.start_transmitter(sched);
                }
                self.update_wakeup(tasks);
            }
            EtherEvent::TxWord => {
                self.tx_event = None;
                match self.fifo.pop_front() {
                    Some(word) => {
                        self.out_packet.push(word);
                        self.tx_event = Some(sched.schedule(
                            TX_WORD_NS.saturating_sub(skew_ns),
                            EtherEvent::TxWord.into(),
                        ));
                    }
                    None if self.last_word => {
                        self.finish_packet();
                        self.output_attention = true;
                    }
                    None => {
                        tracing::warn!("transmit underrun: FIFO empty before last word");
                        self.underrun = true;
                        self.output_attention = true;
                    }
                }
                self.update_wakeup(tasks);
            }
            EtherEvent::RxPoll => {
                if self.receiver_on()
                    && self.rx_state == RxState::Idle
                    && self.in_words.is_empty()
                {
                    // Loopback frames take priority over host traffic and
                    // already carry their preamble; host frames get it
                    // re-attached here.
                    let frame = match self.loopback_frames.pop_front() {
                        Some(frame) => Some(frame),
                        None => self.pending.pop().map(|frame| {
                            let mut with_sfd = Vec::with_capacity(SFD.len() + frame.len());
                            with_sfd.extend_from_slice(&SFD);
                            with_sfd.extend(frame);
                            with_sfd
                        }),
                    };
                    if let Some(frame) = frame {
                        self.in_words.extend(frame);
                        self.rx_state = RxState::Preamble {
                            remaining: SFD.len() as u8,
                        };
                        self.rx_crc.reset();
                        self.rx_word_event =
                            Some(sched.schedule(RX_WORD_NS, EtherEvent::RxWord.into()));
                    }
                }
                self.poll_event = Some(sched.schedule(
                    POLL_NS.saturating_sub(skew_ns),
                    EtherEvent::RxPoll.into(),
                ));
                self.update_wakeup(tasks);
            }
            EtherEvent::RxWord => {
                self.rx_word_event = None;
                self.receive_word(skew_ns, sched);
                self.update_wakeup(tasks);
            }
        }
    }

    fn receive_word<T: From<EtherEvent> + Copy>(
        &mut self,
        skew_ns: u64,
        sched: &mut Scheduler<T>,
    ) {
        let Some(word) = self.in_words.pop_front() else {
            self.rx_state = RxState::Idle;
            return;
        };

        match self.rx_state {
            RxState::Idle => {
                // A strobe purge raced the word clock; drop the word.
            }
            RxState::Preamble { remaining } => {
                // The preamble walks by without entering the FIFO.
                self.rx_state = if remaining > 1 {
                    RxState::Preamble {
                        remaining: remaining - 1,
                    }
                } else {
                    RxState::Data
                };
            }
            RxState::Data => {
                if self.fifo.len() >= FIFO_DEPTH {
                    let dropped = self.fifo.pop_front();
                    tracing::error!(?dropped, "receive FIFO overflow, oldest word dropped");
                }
                self.fifo.push_back(word);
                self.rx_crc.update_word(word);
            }
        }

        if self.in_words.is_empty() {
            // End of frame: attention plus the (placeholder) CRC check.
            self.input_attention = true;
            self.crc_good = self.rx_crc.value() == GOOD_CRC_RESIDUAL;
            self.rx_state = RxState::Idle;
        } else {
            self.rx_word_event = Some(sched.schedule(
                RX_WORD_NS.saturating_sub(skew_ns),
                EtherEvent::RxWord.into(),
            ));
        }
    }

    fn start_transmitter<T: From<EtherEvent> + Copy>(&mut self, sched: &mut Scheduler<T>) {
        if self.tx_event.is_none() {
            self.tx_event = Some(sched.schedule(TX_WORD_NS, EtherEvent::TxWord.into()));
        }
    }

    /// The FIFO drained with last-word set: validate the preamble and hand
    /// the frame on — to our own receiver in loopback, to the host
    /// otherwise.
    fn finish_packet(&mut self) {
        let packet = std::mem::take(&mut self.out_packet);
        if packet.len() < SFD.len() || packet[..SFD.len()] != SFD {
            tracing::warn!(len = packet.len(), "malformed SFD preamble, packet dropped");
            return;
        }

        if self.local_loop || self.loopback {
            self.loopback_frames.push_back(packet);
        } else {
            self.host.send(&packet[SFD.len()..]);
        }
    }

    /// Single authority for the Ethernet task wake line, re-evaluated after
    /// every register write and event.
    fn update_wakeup(&mut self, tasks: &mut dyn TaskSink) {
        let transmit_ready = self.tx_enabled
            && self.fifo.len() < FIFO_DEPTH
            && !self.deferring
            && !self.last_word;
        let receive_ready = !self.rcv_off && self.fifo.len() > 2;

        let wake = transmit_ready
            || self.defer_elapsed
            || receive_ready
            || self.input_attention
            || self.output_attention;

        if wake {
            tasks.wake(Task::Ethernet);
            // The defer tick is consumed by the wake it causes.
            self.defer_elapsed = false;
        } else {
            tasks.sleep(Task::Ethernet);
        }
    }

    fn abort_receive<T: From<EtherEvent> + Copy>(&mut self, sched: &mut Scheduler<T>) {
        self.in_words.clear();
        self.rx_state = RxState::Idle;
        self.rx_crc.reset();
        if let Some(id) = self.rx_word_event.take() {
            sched.cancel(id);
        }
    }
}
