//! Physical word memory and the CP-facing memory controller.
//!
//! Storage is 16-bit words with a per-word ECC check byte. The syndrome
//! calculation is the hardware's documented stub (always zero), so the check
//! byte only carries the configurable invert mask — but the mask round-trip
//! is still honored: flipping the invert bits between a write and a read
//! fails validity, exactly as the real check bits would.
//!
//! Invalid accesses are reported through status bits, never by panicking or
//! returning `Err`; the microcode contract is "report, don't crash".
#![forbid(unsafe_code)]

mod controller;
mod memory;

pub use controller::{MStatus, MemoryController};
pub use memory::{Memory, MemoryConfigError, WORDS_PER_KW};
