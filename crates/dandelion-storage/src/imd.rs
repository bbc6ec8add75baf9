//! IMD floppy image container.
//!
//! Layout: a free-form ASCII header terminated by 0x1A, then one record per
//! track: mode byte, cylinder, head (top two bits are optional
//! cylinder/head map flags — not supported here), sector count, sector-size
//! index, the sector numbering table, and per sector a record-type byte
//! followed by either `sector_size` raw bytes or a single fill byte for
//! compressed records.

use crate::{ImageError, Result};
use std::io::Read;

pub const FLOPPY_CYLINDERS: usize = 77;
pub const FLOPPY_HEADS: usize = 2;

const HEADER_TERMINATOR: u8 = 0x1A;
const HEAD_HAS_CYLINDER_MAP: u8 = 0x80;
const HEAD_HAS_HEAD_MAP: u8 = 0x40;
const HEAD_MASK: u8 = 0x3F;

const SECTOR_SIZES: [usize; 7] = [128, 256, 512, 1024, 2048, 4096, 8192];

/// Recording mode of a track, from the IMD mode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TrackFormat {
    Fm500 = 0,
    Fm300 = 1,
    Fm250 = 2,
    Mfm500 = 3,
    Mfm300 = 4,
    Mfm250 = 5,
}

impl TrackFormat {
    fn from_byte(value: u8) -> Result<TrackFormat> {
        match value {
            0 => Ok(TrackFormat::Fm500),
            1 => Ok(TrackFormat::Fm300),
            2 => Ok(TrackFormat::Fm250),
            3 => Ok(TrackFormat::Mfm500),
            4 => Ok(TrackFormat::Mfm300),
            5 => Ok(TrackFormat::Mfm250),
            _ => Err(ImageError::Corrupt("track mode byte out of range")),
        }
    }
}

/// Per-sector record type. Compressed records are expanded to their fill
/// byte at decode time; the kind is kept so error/deleted marks survive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SectorRecord {
    Unavailable = 0,
    Normal = 1,
    Compressed = 2,
    NormalDeleted = 3,
    CompressedDeleted = 4,
    NormalError = 5,
    CompressedError = 6,
}

impl SectorRecord {
    fn from_byte(value: u8) -> Result<SectorRecord> {
        match value {
            0 => Ok(SectorRecord::Unavailable),
            1 => Ok(SectorRecord::Normal),
            2 => Ok(SectorRecord::Compressed),
            3 => Ok(SectorRecord::NormalDeleted),
            4 => Ok(SectorRecord::CompressedDeleted),
            5 => Ok(SectorRecord::NormalError),
            6 => Ok(SectorRecord::CompressedError),
            _ => Err(ImageError::Corrupt("unexpected sector record type")),
        }
    }

    fn is_compressed(self) -> bool {
        matches!(
            self,
            SectorRecord::Compressed
                | SectorRecord::CompressedDeleted
                | SectorRecord::CompressedError
        )
    }
}

#[derive(Clone, Debug)]
pub struct Sector {
    record: SectorRecord,
    data: Vec<u8>,
}

impl Sector {
    pub fn record(&self) -> SectorRecord {
        self.record
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Overwrites the sector payload in place. Length must match the
    /// track's sector size; drive-level writes always do.
    pub fn write(&mut self, data: &[u8]) {
        debug_assert_eq!(data.len(), self.data.len());
        self.data.copy_from_slice(data);
        self.record = SectorRecord::Normal;
    }
}

#[derive(Clone, Debug)]
pub struct Track {
    format: TrackFormat,
    cylinder: u8,
    head: u8,
    sector_size: usize,
    ordering: Vec<u8>,
    sectors: Vec<Sector>,
}

impl Track {
    pub fn format(&self) -> TrackFormat {
        self.format
    }

    pub fn cylinder(&self) -> u8 {
        self.cylinder
    }

    pub fn head(&self) -> u8 {
        self.head
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Sector numbering table, one entry per physical slot.
    pub fn ordering(&self) -> &[u8] {
        &self.ordering
    }

    /// Direct slot index; callers bounds-check against
    /// [`Track::sector_count`]. There is no auto-growth.
    pub fn sector(&self, slot: usize) -> Option<&Sector> {
        self.sectors.get(slot)
    }

    pub fn sector_mut(&mut self, slot: usize) -> Option<&mut Sector> {
        self.sectors.get_mut(slot)
    }
}

/// In-memory representation of a two-sided 77-cylinder IMD floppy image.
#[derive(Clone, Debug)]
pub struct FloppyDisk {
    header: String,
    tracks: Vec<Option<Track>>,
}

impl FloppyDisk {
    /// Decodes an IMD container. Any format violation fails the whole load;
    /// no partially-decoded disk is ever returned.
    pub fn read<R: Read>(mut r: R) -> Result<FloppyDisk> {
        let mut raw = Vec::new();
        r.read_to_end(&mut raw)?;
        let mut cur = Cursor { raw: &raw, at: 0 };

        let mut header = Vec::new();
        loop {
            let byte = cur.u8()?;
            if byte == HEADER_TERMINATOR {
                break;
            }
            header.push(byte);
        }

        let mut tracks: Vec<Option<Track>> = vec![None; FLOPPY_CYLINDERS * FLOPPY_HEADS];
        while !cur.done() {
            let track = Self::read_track(&mut cur)?;
            let slot = track.head as usize * FLOPPY_CYLINDERS + track.cylinder as usize;
            if tracks[slot].is_some() {
                return Err(ImageError::Corrupt("duplicate head/cylinder track record"));
            }
            tracks[slot] = Some(track);
        }

        Ok(FloppyDisk {
            header: String::from_utf8_lossy(&header).into_owned(),
            tracks,
        })
    }

    fn read_track(cur: &mut Cursor<'_>) -> Result<Track> {
        let format = TrackFormat::from_byte(cur.u8()?)?;
        let cylinder = cur.u8()?;
        if cylinder as usize >= FLOPPY_CYLINDERS {
            return Err(ImageError::Corrupt("cylinder out of range"));
        }
        let head_byte = cur.u8()?;
        if head_byte & (HEAD_HAS_CYLINDER_MAP | HEAD_HAS_HEAD_MAP) != 0 {
            return Err(ImageError::Unsupported("cylinder/head map flags"));
        }
        let head = head_byte & HEAD_MASK;
        if head as usize >= FLOPPY_HEADS {
            return Err(ImageError::Corrupt("head out of range"));
        }
        let sector_count = cur.u8()? as usize;
        let size_index = cur.u8()? as usize;
        let sector_size = *SECTOR_SIZES
            .get(size_index)
            .ok_or(ImageError::Unsupported("sector size index"))?;

        let ordering = cur.bytes(sector_count)?.to_vec();

        let mut sectors = Vec::with_capacity(sector_count);
        for _ in 0..sector_count {
            let record = SectorRecord::from_byte(cur.u8()?)?;
            let data = match record {
                SectorRecord::Unavailable => vec![0; sector_size],
                record if record.is_compressed() => {
                    let fill = cur.u8()?;
                    vec![fill; sector_size]
                }
                _ => cur.bytes(sector_size)?.to_vec(),
            };
            sectors.push(Sector { record, data });
        }

        Ok(Track {
            format,
            cylinder,
            head,
            sector_size,
            ordering,
            sectors,
        })
    }

    /// The free-form comment header from the container.
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn track(&self, head: u8, cylinder: u8) -> Option<&Track> {
        self.tracks
            .get(head as usize * FLOPPY_CYLINDERS + cylinder as usize)?
            .as_ref()
    }

    pub fn track_mut(&mut self, head: u8, cylinder: u8) -> Option<&mut Track> {
        self.tracks
            .get_mut(head as usize * FLOPPY_CYLINDERS + cylinder as usize)?
            .as_mut()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_some()).count()
    }

    /// Direct sector lookup; the caller bounds-checks `slot` against the
    /// track geometry.
    pub fn sector(&self, cylinder: u8, head: u8, slot: usize) -> Option<&Sector> {
        self.track(head, cylinder)?.sector(slot)
    }

    pub fn sector_mut(&mut self, cylinder: u8, head: u8, slot: usize) -> Option<&mut Sector> {
        self.track_mut(head, cylinder)?.sector_mut(slot)
    }
}

struct Cursor<'a> {
    raw: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn done(&self) -> bool {
        self.at >= self.raw.len()
    }

    fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .raw
            .get(self.at)
            .ok_or(ImageError::Corrupt("truncated image"))?;
        self.at += 1;
        Ok(byte)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .at
            .checked_add(len)
            .filter(|&end| end <= self.raw.len())
            .ok_or(ImageError::Corrupt("truncated image"))?;
        let slice = &self.raw[self.at..end];
        self.at = end;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal IMD: header, then one track record.
    fn image(cylinder: u8, head_byte: u8, payload: &[u8]) -> Vec<u8> {
        let mut raw = b"IMD 1.18: test\r\n".to_vec();
        raw.push(HEADER_TERMINATOR);
        raw.push(3); // Mfm500
        raw.push(cylinder);
        raw.push(head_byte);
        raw.push(1); // one sector
        raw.push(0); // 128 bytes
        raw.push(1); // numbering: sector 1
        raw.push(1); // normal record
        raw.extend_from_slice(payload);
        raw
    }

    #[test]
    fn decodes_single_sector_image() {
        let payload = [0x5A; 128];
        let disk = FloppyDisk::read(&image(0, 0, &payload)[..]).unwrap();

        assert_eq!(disk.track_count(), 1);
        let track = disk.track(0, 0).expect("track at head 0 cyl 0");
        assert_eq!(track.format(), TrackFormat::Mfm500);
        assert_eq!(track.sector_size(), 128);
        assert_eq!(track.ordering(), [1]);
        let sector = track.sector(0).unwrap();
        assert_eq!(sector.record(), SectorRecord::Normal);
        assert_eq!(sector.data(), payload);
        assert!(disk.track(1, 0).is_none());
    }

    #[test]
    fn cylinder_77_fails_to_decode() {
        let err = FloppyDisk::read(&image(77, 0, &[0; 128])[..]).unwrap_err();
        assert!(matches!(err, ImageError::Corrupt(_)));
    }

    #[test]
    fn head_map_flags_are_unsupported() {
        let err = FloppyDisk::read(&image(0, HEAD_HAS_HEAD_MAP, &[0; 128])[..]).unwrap_err();
        assert!(matches!(err, ImageError::Unsupported(_)));
    }

    #[test]
    fn compressed_sector_expands_to_fill_byte() {
        let mut raw = b"IMD".to_vec();
        raw.push(HEADER_TERMINATOR);
        raw.extend_from_slice(&[3, 10, 1, 1, 1]); // cyl 10, head 1, 1x256
        raw.push(7); // numbering
        raw.push(2); // compressed
        raw.push(0xE5); // fill

        let disk = FloppyDisk::read(&raw[..]).unwrap();
        let track = disk.track(1, 10).unwrap();
        let sector = track.sector(0).unwrap();
        assert_eq!(sector.record(), SectorRecord::Compressed);
        assert_eq!(sector.data(), vec![0xE5; 256]);
    }

    #[test]
    fn duplicate_track_fails() {
        let mut raw = image(5, 0, &[0; 128]);
        // Append a second record for the same (head, cylinder).
        raw.extend_from_slice(&[3, 5, 0, 1, 0, 1, 1]);
        raw.extend_from_slice(&[0; 128]);
        let err = FloppyDisk::read(&raw[..]).unwrap_err();
        assert!(matches!(err, ImageError::Corrupt(_)));
    }

    #[test]
    fn truncated_sector_data_fails() {
        let raw = image(0, 0, &[0; 64]);
        assert!(FloppyDisk::read(&raw[..]).is_err());
    }

    #[test]
    fn sector_write_mutates_in_memory() {
        let mut disk = FloppyDisk::read(&image(0, 0, &[0; 128])[..]).unwrap();
        let sector = disk.sector_mut(0, 0, 0).unwrap();
        sector.write(&[0xAB; 128]);
        assert_eq!(disk.sector(0, 0, 0).unwrap().data()[0], 0xAB);
        assert!(disk.sector(0, 0, 1).is_none(), "no auto-growth past the slot count");
    }
}
