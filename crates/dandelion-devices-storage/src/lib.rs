//! Disk mechanism and controller models.
//!
//! [`FloppyDrive`] wraps a decoded IMD image with rotation/index timing.
//! [`Sa1000Drive`] models the rigid-disk platter set, spindle and buffered
//! head stepping. [`ShugartController`] sits on top of the rigid drive and
//! translates microcode KCtl/KData register traffic into the per-word
//! read/verify/write protocol, raising the Disk task wake line through an
//! injected [`dandelion_cp::TaskSink`].
#![forbid(unsafe_code)]

mod floppy;
mod sa1000;
mod shugart;

pub use floppy::{FloppyDrive, FloppyEvent, INDEX_PULSE_NS, ROTATION_NS};
pub use sa1000::{Sa1000Drive, WordService, SEEK_SETTLE_NS, STEP_IDLE_NS, WORD_NS};
pub use shugart::{
    DiskEvent, KStatus, ShugartController, AUTO_PREAMBLE_WORDS, CRC_STAMP, PREAMBLE_WORDS,
    WRITE_PIPELINE_DEPTH,
};
