use std::path::Path;

use dandelion_storage::{DriveType, Result, RigidImage, ADDRESS_MARK, CRC_FLAG, WORDS_PER_TRACK};

/// One word time under the head at the SA1000 transfer rate.
pub const WORD_NS: u64 = 3_700;

/// Step pulses arriving within this window are buffered into one seek; the
/// seek begins once the interface has been idle this long.
pub const STEP_IDLE_NS: u64 = 35_000;

/// Mechanical settle time charged for a buffered seek, regardless of
/// distance.
pub const SEEK_SETTLE_NS: u64 = 25_000_000;

/// Result of one word-time of drive service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WordService {
    /// The index mark passed under the head on this word.
    pub index: bool,
    /// A buffered seek started; the caller owes a completion event
    /// [`SEEK_SETTLE_NS`] out.
    pub seek_started: bool,
}

/// Rigid-disk mechanism: platter word grid, spindle position, and the
/// buffered-step seek model.
///
/// The controller drives this once per [`WORD_NS`] via
/// [`Sa1000Drive::service_word`]; the drive itself owns no events.
#[derive(Clone, Debug)]
pub struct Sa1000Drive {
    image: RigidImage,
    cylinder: usize,
    head: usize,
    word_index: usize,
    index: bool,
    seek_complete: bool,
    pending_steps: usize,
    step_in: bool,
    last_step_level: bool,
    idle_ns: u64,
}

impl Sa1000Drive {
    pub fn new(drive_type: DriveType) -> Self {
        Self::with_image(RigidImage::blank(drive_type))
    }

    pub fn with_image(image: RigidImage) -> Self {
        Self {
            image,
            cylinder: 0,
            head: 0,
            word_index: 0,
            index: false,
            seek_complete: true,
            pending_steps: 0,
            step_in: false,
            last_step_level: false,
            idle_ns: 0,
        }
    }

    /// Replaces the platter contents from an image file. On failure the
    /// current contents are untouched.
    pub fn load_image(&mut self, path: &Path) -> Result<()> {
        self.image = RigidImage::load(path)?;
        self.cylinder = 0;
        self.word_index = 0;
        Ok(())
    }

    pub fn save_image(&self, path: &Path) -> Result<()> {
        self.image.save(path)
    }

    pub fn image(&self) -> &RigidImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RigidImage {
        &mut self.image
    }

    pub fn drive_type(&self) -> DriveType {
        self.image.drive_type()
    }

    pub fn cylinder(&self) -> usize {
        self.cylinder
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn set_head(&mut self, head: usize) {
        self.head = head.min(self.image.geometry().heads - 1);
    }

    pub fn word_index(&self) -> usize {
        self.word_index
    }

    pub fn index(&self) -> bool {
        self.index
    }

    pub fn seek_complete(&self) -> bool {
        self.seek_complete
    }

    pub fn track0(&self) -> bool {
        self.cylinder == 0
    }

    /// Buffers a step-interface edge. The first pulse of a burst fixes the
    /// direction; the seek itself happens from [`Sa1000Drive::service_word`]
    /// once the interface goes idle.
    pub fn step(&mut self, direction_in: bool, pulse: bool) {
        if pulse && !self.last_step_level {
            if self.pending_steps == 0 {
                self.step_in = direction_in;
            }
            self.pending_steps += 1;
            self.idle_ns = 0;
        }
        self.last_step_level = pulse;
    }

    /// Advances the spindle one word and ages the step buffer.
    pub fn service_word(&mut self) -> WordService {
        self.advance_word();

        let mut service = WordService {
            index: self.index,
            seek_started: false,
        };

        if self.pending_steps > 0 {
            self.idle_ns += WORD_NS;
            if self.idle_ns > STEP_IDLE_NS {
                self.begin_seek();
                service.seek_started = true;
            }
        }

        service
    }

    fn begin_seek(&mut self) {
        let cylinders = self.image.geometry().cylinders as isize;
        let delta = self.pending_steps as isize * if self.step_in { 1 } else { -1 };
        let target = (self.cylinder as isize + delta).clamp(0, cylinders - 1);
        self.cylinder = target as usize;
        self.pending_steps = 0;
        self.idle_ns = 0;
        self.seek_complete = false;
    }

    /// Called when the buffered seek's settle delay elapses.
    pub fn complete_seek(&mut self) {
        self.seek_complete = true;
    }

    /// Reset clears the step interface state; platters and head position
    /// survive.
    pub fn reset(&mut self) {
        self.pending_steps = 0;
        self.idle_ns = 0;
        self.last_step_level = false;
        self.seek_complete = true;
    }

    /// Moves to the next word position; raises index exactly at the wrap.
    pub fn advance_word(&mut self) {
        self.word_index = (self.word_index + 1) % WORDS_PER_TRACK;
        self.index = self.word_index == 0;
    }

    /// Raw cell (data plus tag flags) under the head.
    pub fn read_word(&self) -> u32 {
        self.image.cell(self.cylinder, self.head, self.word_index)
    }

    pub fn write_word(&mut self, data: u16) {
        self.image
            .set_cell(self.cylinder, self.head, self.word_index, data as u32);
    }

    /// Writes a word tagged as an address mark.
    pub fn write_address_mark(&mut self, data: u16) {
        self.image.set_cell(
            self.cylinder,
            self.head,
            self.word_index,
            ADDRESS_MARK | data as u32,
        );
    }

    /// Writes a word tagged as a CRC word.
    pub fn write_crc(&mut self, data: u16) {
        self.image.set_cell(
            self.cylinder,
            self.head,
            self.word_index,
            CRC_FLAG | data as u32,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Service the drive for `n` word times, collecting seek starts.
    fn service(drive: &mut Sa1000Drive, n: usize) -> usize {
        let mut seeks = 0;
        for _ in 0..n {
            if drive.service_word().seek_started {
                seeks += 1;
            }
        }
        seeks
    }

    #[test]
    fn index_raised_exactly_at_wrap() {
        let mut drive = Sa1000Drive::new(DriveType::Sa1004);
        let mut index_words = Vec::new();
        for _ in 0..2 * WORDS_PER_TRACK {
            let service = drive.service_word();
            if service.index {
                index_words.push(drive.word_index());
            }
        }
        assert_eq!(index_words, [0, 0]);
    }

    #[test]
    fn step_burst_coalesces_into_one_seek_after_idle_window() {
        let mut drive = Sa1000Drive::new(DriveType::Sa1004);

        // Ten rising edges toward the spindle.
        for _ in 0..10 {
            drive.step(true, true);
            drive.step(true, false);
        }

        // The idle window is ~10 word times; no seek before it elapses.
        assert_eq!(service(&mut drive, 9), 0);
        assert!(drive.seek_complete());

        assert_eq!(service(&mut drive, 1), 1);
        assert_eq!(drive.cylinder(), 10);
        assert!(!drive.seek_complete());

        drive.complete_seek();
        assert!(drive.seek_complete());
    }

    #[test]
    fn held_step_level_is_one_pulse() {
        let mut drive = Sa1000Drive::new(DriveType::Sa1004);
        drive.step(true, true);
        drive.step(true, true);
        drive.step(true, true);
        assert_eq!(service(&mut drive, 10), 1);
        assert_eq!(drive.cylinder(), 1);
    }

    #[test]
    fn seek_clips_at_both_ends() {
        let mut drive = Sa1000Drive::new(DriveType::Sa1004);
        // Step out past cylinder 0.
        for _ in 0..5 {
            drive.step(false, true);
            drive.step(false, false);
        }
        service(&mut drive, 10);
        assert_eq!(drive.cylinder(), 0);
        assert!(drive.track0());

        // Step in past the last cylinder.
        for _ in 0..300 {
            drive.step(true, true);
            drive.step(true, false);
        }
        service(&mut drive, 10);
        assert_eq!(drive.cylinder(), 255);
    }

    #[test]
    fn tagged_writes_carry_flags() {
        let mut drive = Sa1000Drive::new(DriveType::Sa1004);
        drive.write_address_mark(0x1234);
        assert_eq!(drive.read_word(), ADDRESS_MARK | 0x1234);
        drive.write_crc(0x5678);
        assert_eq!(drive.read_word(), CRC_FLAG | 0x5678);
        drive.write_word(0x9ABC);
        assert_eq!(drive.read_word(), 0x9ABC);
    }
}
