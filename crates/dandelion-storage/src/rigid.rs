//! Rigid-disk image: `[1 byte drive type][cyl x head x word cells of 3 bytes]`.
//!
//! Each cell is a 24-bit little-endian value: low 16 bits of data plus the
//! address-mark/CRC tag flags. Save is atomic — the image is written to a
//! temp file beside the destination and renamed over it, so the previous
//! image survives a failed save.

use crate::{ImageError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Words in one track, fixed across the supported drive types.
pub const WORDS_PER_TRACK: usize = 5325;

/// Cell flag: this word is an address mark.
pub const ADDRESS_MARK: u32 = 0x1_0000;
/// Cell flag: this word is a CRC word.
pub const CRC_FLAG: u32 = 0x2_0000;

const CELL_BYTES: usize = 3;
// Flag bits above 24 bits cannot be represented and are truncated away.
const CELL_MASK: u32 = 0x00FF_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DriveType {
    Sa1004 = 0,
    Q2040 = 1,
    Q2080 = 2,
}

impl DriveType {
    fn from_byte(value: u8) -> Result<DriveType> {
        match value {
            0 => Ok(DriveType::Sa1004),
            1 => Ok(DriveType::Q2040),
            2 => Ok(DriveType::Q2080),
            _ => Err(ImageError::Corrupt("unknown drive type byte")),
        }
    }

    pub fn geometry(self) -> DriveGeometry {
        match self {
            DriveType::Sa1004 => DriveGeometry {
                cylinders: 256,
                heads: 4,
            },
            DriveType::Q2040 => DriveGeometry {
                cylinders: 512,
                heads: 8,
            },
            DriveType::Q2080 => DriveGeometry {
                cylinders: 1172,
                heads: 7,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriveGeometry {
    pub cylinders: usize,
    pub heads: usize,
}

impl DriveGeometry {
    pub fn cells(&self) -> usize {
        self.cylinders * self.heads * WORDS_PER_TRACK
    }
}

/// The full word grid of a rigid disk, flat in (cylinder, head, word) order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RigidImage {
    drive_type: DriveType,
    cells: Vec<u32>,
}

impl RigidImage {
    /// A blank (zeroed) platter set for `drive_type`.
    pub fn blank(drive_type: DriveType) -> Self {
        Self {
            drive_type,
            cells: vec![0; drive_type.geometry().cells()],
        }
    }

    pub fn load(path: &Path) -> Result<RigidImage> {
        let raw = fs::read(path)?;
        let (&type_byte, body) = raw
            .split_first()
            .ok_or(ImageError::Corrupt("empty image file"))?;
        let drive_type = DriveType::from_byte(type_byte)?;
        let geometry = drive_type.geometry();
        if body.len() != geometry.cells() * CELL_BYTES {
            return Err(ImageError::Corrupt("image length does not match geometry"));
        }

        let cells = body
            .chunks_exact(CELL_BYTES)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], 0]))
            .collect();
        Ok(RigidImage { drive_type, cells })
    }

    /// Writes the image to `path` via a temp file + rename in the same
    /// directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut out = std::io::BufWriter::new(fs::File::create(&tmp)?);
            out.write_all(&[self.drive_type as u8])?;
            for &cell in &self.cells {
                out.write_all(&(cell & CELL_MASK).to_le_bytes()[..CELL_BYTES])?;
            }
            out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn drive_type(&self) -> DriveType {
        self.drive_type
    }

    pub fn geometry(&self) -> DriveGeometry {
        self.drive_type.geometry()
    }

    #[inline]
    fn index(&self, cylinder: usize, head: usize, word: usize) -> usize {
        debug_assert!(cylinder < self.geometry().cylinders);
        debug_assert!(head < self.geometry().heads);
        debug_assert!(word < WORDS_PER_TRACK);
        (cylinder * self.geometry().heads + head) * WORDS_PER_TRACK + word
    }

    /// Raw cell (data + tag flags) at a platter position.
    #[inline]
    pub fn cell(&self, cylinder: usize, head: usize, word: usize) -> u32 {
        self.cells[self.index(cylinder, head, word)]
    }

    #[inline]
    pub fn set_cell(&mut self, cylinder: usize, head: usize, word: usize, cell: u32) {
        let at = self.index(cylinder, head, word);
        self.cells[at] = cell & CELL_MASK;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_flags_fit_the_cell() {
        assert_eq!(ADDRESS_MARK & CELL_MASK, ADDRESS_MARK);
        assert_eq!(CRC_FLAG & CELL_MASK, CRC_FLAG);
    }

    #[test]
    fn blank_image_matches_geometry() {
        let image = RigidImage::blank(DriveType::Sa1004);
        let geometry = image.geometry();
        assert_eq!(geometry.cylinders, 256);
        assert_eq!(geometry.heads, 4);
        assert_eq!(image.cell(255, 3, WORDS_PER_TRACK - 1), 0);
    }

    #[test]
    fn cell_round_trip_with_flags() {
        let mut image = RigidImage::blank(DriveType::Q2040);
        image.set_cell(100, 5, 42, ADDRESS_MARK | 0xBEEF);
        assert_eq!(image.cell(100, 5, 42), ADDRESS_MARK | 0xBEEF);
    }
}
