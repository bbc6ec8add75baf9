//! On-disk image codecs for the Dandelion storage devices.
//!
//! Two formats live here: the IMD floppy container (decode + in-memory
//! sector mutation; images are not written back in the current feature set)
//! and the rigid-disk word-grid image with atomic save. Neither knows
//! anything about timing — the mechanism models in
//! `dandelion-devices-storage` wrap these.
#![forbid(unsafe_code)]

mod error;
mod imd;
mod rigid;

pub use error::{ImageError, Result};
pub use imd::{FloppyDisk, Sector, SectorRecord, Track, TrackFormat, FLOPPY_CYLINDERS, FLOPPY_HEADS};
pub use rigid::{
    DriveGeometry, DriveType, RigidImage, ADDRESS_MARK, CRC_FLAG, WORDS_PER_TRACK,
};
