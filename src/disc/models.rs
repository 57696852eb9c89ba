use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Number of sectors in the two second lead-in that precedes track one.
pub const SECTOR_OFFSET: u32 = 150;

/// first track, last track, lead-out, then 99 track offsets
pub const TABLE_SLOTS: usize = 102;

pub const MAX_TRACKS: u32 = 99;

/// Frames per second of audio CD time.
const FRAMES_PER_SECOND: u32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MSF {
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl MSF {
    /// Absolute frame address, lead-in included. `None` when it does not fit in 32 bits.
    pub fn to_frames(&self) -> Option<u32> {
        self.minutes
            .checked_mul(60)?
            .checked_add(self.seconds)?
            .checked_mul(FRAMES_PER_SECOND)?
            .checked_add(self.frames)
    }

    pub fn to_lba(&self) -> Option<u32> {
        Some(self.to_frames()?.saturating_sub(SECTOR_OFFSET))
    }
}

/// Table address of an LBA, `None` when adding [`SECTOR_OFFSET`] overflows.
pub fn with_offset(lba: u32) -> Option<u32> {
    lba.checked_add(SECTOR_OFFSET)
}

/// Normalized table of contents.
///
/// Slot 0 holds the first track number, slot 1 the last track number, slot 2 the lead-out
/// and slots 3..=101 the start of tracks 1..=99. Every address already includes
/// [`SECTOR_OFFSET`]. Unused slots are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorOffsetTable {
    slots: [u32; TABLE_SLOTS],
}

impl Default for SectorOffsetTable {
    fn default() -> Self {
        Self {
            slots: [0; TABLE_SLOTS],
        }
    }
}

impl SectorOffsetTable {
    /// Builds a table from addresses that already have the sector offset applied.
    ///
    /// Offsets past track 99 are ignored.
    pub fn new(first_track: u32, last_track: u32, lead_out: u32, track_offsets: &[u32]) -> Self {
        let mut table = Self::default();
        table.slots[0] = first_track;
        table.slots[1] = last_track;
        table.slots[2] = lead_out;
        for (slot, offset) in table.slots[3..].iter_mut().zip(track_offsets) {
            *slot = *offset;
        }
        table
    }

    pub fn first_track(&self) -> u32 {
        self.slots[0]
    }

    pub fn last_track(&self) -> u32 {
        self.slots[1]
    }

    pub fn lead_out(&self) -> u32 {
        self.slots[2]
    }

    /// Offset of a 1-based track, `None` outside 1..=99.
    pub fn track_offset(&self, track: u32) -> Option<u32> {
        if (1..=MAX_TRACKS).contains(&track) {
            Some(self.slots[track as usize + 2])
        } else {
            None
        }
    }

    pub fn track_count(&self) -> u32 {
        self.last_track()
    }

    pub fn is_empty(&self) -> bool {
        self.track_count() == 0
    }

    /// Hex rendering that gets hashed: two digits for first/last, eight for the rest.
    pub fn to_hex_string(&self) -> String {
        let mut out = String::with_capacity(4 + 8 * (TABLE_SLOTS - 2));
        out.push_str(&format!("{:02X}{:02X}", self.slots[0], self.slots[1]));
        for slot in &self.slots[2..] {
            out.push_str(&format!("{slot:08X}"));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscIdentity {
    pub hash: String,
    pub track_count: u32,
}

impl DiscIdentity {
    /// The "no disc" identity.
    pub fn none() -> Self {
        Self {
            hash: String::new(),
            track_count: 0,
        }
    }

    pub fn is_none(&self) -> bool {
        self.track_count == 0
    }

    pub fn to_record(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    #[allow(dead_code)]
    pub fn from_record(record: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(record)
    }
}

impl Display for DiscIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            f.write_str("<no disc>")
        } else {
            write!(f, "{} ({} tracks)", self.hash, self.track_count)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TocDiagnostic {
    /// The tool reported a first track other than 1.
    FirstTrackNormalized { reported: u32 },
    /// Track line outside 1..=99.
    TrackOutOfRange { track: u32 },
}

impl Display for TocDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TocDiagnostic::FirstTrackNormalized { reported } => {
                write!(f, "first track {reported} normalized to 1")
            }
            TocDiagnostic::TrackOutOfRange { track } => {
                write!(f, "track {track} is outside 1-{MAX_TRACKS}, skipped")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToc {
    pub table: SectorOffsetTable,
    pub diagnostics: Vec<TocDiagnostic>,
}
