use crate::disc::error::{TocError, TocResult};
use crate::disc::models::{MSF, with_offset};
use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};

lazy_static! {
    // wodim: "first: 1 last 12"
    static ref TRACK_RANGE: Regex =
        Regex::new(r"(?i)^first:\s*(?P<first>\d+)\s+last:?\s*(?P<last>\d+)").unwrap();
    // wodim: "track:   1 lba:         0 (        0) 00:02:00 adr: 1 control: 0 mode: 0"
    static ref WODIM_TRACK: Regex =
        Regex::new(r"(?i)^track:\s*(?P<track>\d+|lout)\s+lba:\s*(?P<lba>\d+)").unwrap();
    // drutil: "First track: 1"
    static ref FIRST_TRACK: Regex = Regex::new(r"(?i)^first\s+track:\s*(?P<track>\d+)").unwrap();
    // drutil: "Last track: 12"
    static ref LAST_TRACK: Regex = Regex::new(r"(?i)^last\s+track:\s*(?P<track>\d+)").unwrap();
    // drutil: "Lead-out: 52:07.42"
    static ref LEAD_OUT: Regex =
        Regex::new(r"(?i)^lead-?out:\s*(?P<m>\d+):(?P<s>\d+)[.:](?P<f>\d+)").unwrap();
    // drutil: "Track 1: 00:02.00"
    static ref MSF_TRACK: Regex =
        Regex::new(r"(?i)^track\s*(?P<track>\d+):\s*(?P<m>\d+):(?P<s>\d+)[.:](?P<f>\d+)").unwrap();
}

/// One classified line of TOC output. Addresses are plain LBAs, without the sector offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocLine {
    FirstTrack(u32),
    LastTrack(u32),
    /// Both bounds on one line.
    TrackRange { first: u32, last: u32 },
    LeadOut(u32),
    Track { number: u32, lba: u32 },
    Unrecognized,
}

impl TocLine {
    pub fn is_track(&self) -> bool {
        matches!(self, TocLine::Track { .. })
    }
}

pub fn classify_line(line: &str) -> TocLine {
    let line = line.trim();
    if line.is_empty() {
        return TocLine::Unrecognized;
    }

    match try_classify(line) {
        Ok(Some(classified)) => classified,
        Ok(None) => TocLine::Unrecognized,
        Err(e) => {
            debug!("Ignoring malformed TOC line {line:?}: {e}");
            TocLine::Unrecognized
        }
    }
}

fn try_classify(line: &str) -> TocResult<Option<TocLine>> {
    if let Some(caps) = TRACK_RANGE.captures(line) {
        return Ok(Some(TocLine::TrackRange {
            first: number(&caps, "first")?,
            last: number(&caps, "last")?,
        }));
    }

    if let Some(caps) = WODIM_TRACK.captures(line) {
        let lba = address(number(&caps, "lba")?)?;
        return Ok(Some(match &caps["track"] {
            track if track.eq_ignore_ascii_case("lout") => TocLine::LeadOut(lba),
            track => TocLine::Track {
                number: track.parse()?,
                lba,
            },
        }));
    }

    if let Some(caps) = FIRST_TRACK.captures(line) {
        return Ok(Some(TocLine::FirstTrack(number(&caps, "track")?)));
    }

    if let Some(caps) = LAST_TRACK.captures(line) {
        return Ok(Some(TocLine::LastTrack(number(&caps, "track")?)));
    }

    if let Some(caps) = LEAD_OUT.captures(line) {
        return Ok(Some(TocLine::LeadOut(msf_lba(&caps)?)));
    }

    if let Some(caps) = MSF_TRACK.captures(line) {
        return Ok(Some(TocLine::Track {
            number: number(&caps, "track")?,
            lba: msf_lba(&caps)?,
        }));
    }

    Ok(None)
}

fn number(caps: &Captures<'_>, name: &str) -> TocResult<u32> {
    Ok(caps[name].parse()?)
}

/// LBAs whose table address would overflow are rejected here, so later stages never see them.
fn address(lba: u32) -> TocResult<u32> {
    with_offset(lba).ok_or(TocError::AddressOutOfRange)?;
    Ok(lba)
}

fn msf_lba(caps: &Captures<'_>) -> TocResult<u32> {
    let msf = MSF {
        minutes: number(caps, "m")?,
        seconds: number(caps, "s")?,
        frames: number(caps, "f")?,
    };
    address(msf.to_lba().ok_or(TocError::AddressOutOfRange)?)
}

/// Whether any line of the text is a track line in either dialect.
pub fn has_track_marker(text: &str) -> bool {
    text.lines().any(|line| classify_line(line).is_track())
}
