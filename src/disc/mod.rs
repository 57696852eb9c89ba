use crate::disc::error::{TocError, TocResult};
use crate::disc::models::{
    DiscIdentity, MAX_TRACKS, ParsedToc, SectorOffsetTable, TocDiagnostic, with_offset,
};
use crate::disc::toc::{TocLine, classify_line};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use sha1::{Digest, Sha1};

pub mod error;
pub mod models;
pub mod toc;

/// Parses TOC output from either wodim or drutil.
///
/// Lines matching neither grammar are skipped. Fails when no track lines or no lead-out
/// were found, or when the reported track range is unusable.
pub fn try_parse(text: &str) -> TocResult<ParsedToc> {
    let mut first = None;
    let mut last = None;
    let mut lead_out = None;
    let mut tracks = Vec::new();
    let mut diagnostics = Vec::new();

    for line in text.lines() {
        match classify_line(line) {
            TocLine::FirstTrack(n) => first = Some(n),
            TocLine::LastTrack(n) => last = Some(n),
            TocLine::TrackRange {
                first: range_first,
                last: range_last,
            } => {
                first = Some(range_first);
                last = Some(range_last);
            }
            TocLine::LeadOut(lba) => lead_out = Some(lba),
            TocLine::Track { number, lba } => {
                if (1..=MAX_TRACKS).contains(&number) {
                    tracks.push((number, lba));
                } else {
                    diagnostics.push(TocDiagnostic::TrackOutOfRange { track: number });
                }
            }
            TocLine::Unrecognized => {}
        }
    }

    if tracks.is_empty() {
        return Err(TocError::NoTrackMarkers);
    }
    let lead_out = lead_out.ok_or(TocError::MissingLeadOut)?;

    let reported_first = first.unwrap_or_else(|| tracks.iter().map(|(n, _)| *n).min().unwrap_or(1));
    let last = last.unwrap_or_else(|| tracks.iter().map(|(n, _)| *n).max().unwrap_or(0));
    if last == 0 || last > MAX_TRACKS {
        return Err(TocError::InvalidTrackRange {
            first: reported_first,
            last,
        });
    }

    if reported_first != 1 {
        warn!("TOC reports first track {reported_first}, normalizing to 1");
        diagnostics.push(TocDiagnostic::FirstTrackNormalized {
            reported: reported_first,
        });
    }

    let mut offsets = [0; MAX_TRACKS as usize];
    for (number, lba) in tracks {
        offsets[number as usize - 1] = with_offset(lba).ok_or(TocError::AddressOutOfRange)?;
    }
    let lead_out = with_offset(lead_out).ok_or(TocError::AddressOutOfRange)?;
    let table = SectorOffsetTable::new(1, last, lead_out, &offsets);

    Ok(ParsedToc { table, diagnostics })
}

/// Like [`try_parse`], but unusable text yields the empty table.
pub fn parse(text: &str) -> SectorOffsetTable {
    match try_parse(text) {
        Ok(parsed) => parsed.table,
        Err(e) => {
            debug!("Treating TOC as no disc: {e}");
            SectorOffsetTable::default()
        }
    }
}

pub fn identify(table: &SectorOffsetTable) -> DiscIdentity {
    if table.is_empty() {
        return DiscIdentity::none();
    }

    let digest = Sha1::digest(table.to_hex_string().as_bytes());
    let hash = STANDARD
        .encode(digest)
        .chars()
        .map(|c| match c {
            '+' => '.',
            '/' => '_',
            '=' => '-',
            c => c,
        })
        .collect();

    DiscIdentity {
        hash,
        track_count: table.track_count(),
    }
}

pub fn identify_toc(text: &str) -> DiscIdentity {
    identify(&parse(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN_OFFSETS: [u32; 12] = [
        150, 16034, 32890, 48500, 63000, 79875, 95210, 110980, 127400, 150225, 178300, 205600,
    ];
    const GOLDEN_HASH: &str = "8wTMu5tIw2drjv_KJXBinv3eWZM-";

    fn wodim_toc() -> String {
        let mut out = String::from(
            "Cdrecorder version 1.1.11\nfirst: 1 last 12\n",
        );
        for (i, offset) in GOLDEN_OFFSETS.iter().enumerate() {
            out.push_str(&format!(
                "track:  {} lba: {:>9} (   0) 00:00:00 adr: 1 control: 0 mode: 0\n",
                i + 1,
                offset - 150
            ));
        }
        out.push_str("track:lout lba:    234417 (   937668) 52:07:42 adr: 1 control: 0 mode: -1\n");
        out
    }

    const DRUTIL_TOC: &str = "
   Vendor   Product           Rev
   HL-DT-ST DVDRW  GX40N      RQ00

   Session:  1
   First track: 1
   Last track: 12
   Lead-out:  52:07.42

   Track 1:  00:02.00
   Track 2:  03:33.59
   Track 3:  07:18.40
   Track 4:  10:46.50
   Track 5:  14:00.00
   Track 6:  17:45.00
   Track 7:  21:09.35
   Track 8:  24:39.55
   Track 9:  28:18.50
   Track 10: 33:23.00
   Track 11: 39:37.25
   Track 12: 45:41.25
";

    #[test]
    fn golden_hash_from_table() {
        let table = SectorOffsetTable::new(1, 12, 234567, &GOLDEN_OFFSETS);
        let identity = identify(&table);
        assert_eq!(identity.hash, GOLDEN_HASH);
        assert_eq!(identity.track_count, 12);
    }

    #[test]
    fn matches_published_musicbrainz_example() {
        let table = SectorOffsetTable::new(1, 6, 95462, &[150, 15363, 32314, 46592, 63414, 80489]);
        assert_eq!(identify(&table).hash, "49HHV7Eb8UKF3aQiNmu1GR8vKTY-");
    }

    #[test]
    fn substitutes_url_unsafe_characters() {
        let table = SectorOffsetTable::new(1, 3, 48500, &[150, 16034, 32890]);
        assert_eq!(identify(&table).hash, "iDA3z09_RVrwk8MhKgJNaCF.z8o-");
    }

    #[test]
    fn both_dialects_produce_the_golden_hash() {
        let wodim = identify_toc(&wodim_toc());
        let drutil = identify_toc(DRUTIL_TOC);
        assert_eq!(wodim.hash, GOLDEN_HASH);
        assert_eq!(drutil, wodim);
    }

    #[test]
    fn parsing_applies_the_sector_offset() {
        let table = parse(&wodim_toc());
        assert_eq!(table.first_track(), 1);
        assert_eq!(table.last_track(), 12);
        assert_eq!(table.lead_out(), 234567);
        assert_eq!(table.track_offset(1), Some(150));
        assert_eq!(table.track_offset(12), Some(205600));
        assert_eq!(table.track_offset(13), Some(0));
        assert_eq!(table.track_offset(100), None);
    }

    #[test]
    fn identify_is_deterministic() {
        let text = wodim_toc();
        let identities: Vec<_> = (0..5).map(|_| identify_toc(&text)).collect();
        assert!(identities.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn first_track_is_normalized_with_a_diagnostic() {
        let text = wodim_toc().replace("first: 1 last 12", "first: 2 last 12");
        let parsed = try_parse(&text).unwrap();
        assert_eq!(parsed.table.first_track(), 1);
        assert_eq!(
            parsed.diagnostics,
            vec![TocDiagnostic::FirstTrackNormalized { reported: 2 }]
        );
        assert_eq!(identify(&parsed.table).hash, GOLDEN_HASH);
    }

    #[test]
    fn out_of_range_tracks_are_reported_and_skipped() {
        let text = format!("{}track: 120 lba: 5\n", wodim_toc());
        let parsed = try_parse(&text).unwrap();
        assert_eq!(
            parsed.diagnostics,
            vec![TocDiagnostic::TrackOutOfRange { track: 120 }]
        );
        assert_eq!(identify(&parsed.table).hash, GOLDEN_HASH);
    }

    #[test]
    fn missing_range_is_derived_from_track_lines() {
        let text = "track: 1 lba: 0\ntrack: 2 lba: 15884\ntrack:lout lba: 32740\n";
        let table = parse(text);
        assert_eq!(table.first_track(), 1);
        assert_eq!(table.track_count(), 2);
    }

    #[test]
    fn empty_or_markerless_text_is_no_disc() {
        for text in ["", "   \n\n", "wodim: Cannot load media.", "first: 1 last 12\ntrack:lout lba: 5"] {
            let identity = identify_toc(text);
            assert_eq!(identity, DiscIdentity::none());
            assert_eq!(identity.track_count, 0);
        }
        assert!(matches!(try_parse(""), Err(TocError::NoTrackMarkers)));
    }

    #[test]
    fn overflowing_addresses_are_no_disc() {
        let wodim = "first: 1 last 1\ntrack: 1 lba: 0\ntrack:lout lba: 4294967295\n";
        assert!(matches!(try_parse(wodim), Err(TocError::MissingLeadOut)));
        assert_eq!(identify_toc(wodim), DiscIdentity::none());

        let drutil = "First track: 1\nLast track: 1\nLead-out: 99999999:00.00\nTrack 1: 00:02.00\n";
        assert_eq!(identify_toc(drutil), DiscIdentity::none());

        let track = "first: 1 last 1\ntrack: 1 lba: 4294967200\ntrack:lout lba: 16000\n";
        assert!(matches!(try_parse(track), Err(TocError::NoTrackMarkers)));
    }

    #[test]
    fn largest_addresses_still_parse() {
        let text = "first: 1 last 1\ntrack: 1 lba: 0\ntrack:lout lba: 4294967145\n";
        let table = parse(text);
        assert_eq!(table.lead_out(), u32::MAX);
        assert_eq!(identify(&table).track_count, 1);
    }

    #[test]
    fn missing_lead_out_is_no_disc() {
        let text = "first: 1 last 1\ntrack: 1 lba: 0\n";
        assert!(matches!(try_parse(text), Err(TocError::MissingLeadOut)));
        assert!(identify_toc(text).is_none());
    }

    #[test]
    fn identity_record_round_trip() {
        let identity = identify_toc(&wodim_toc());
        let record = identity.to_record().unwrap();
        assert_eq!(record["hash"], GOLDEN_HASH);
        assert_eq!(record["trackCount"], 12);
        assert_eq!(DiscIdentity::from_record(record.clone()).unwrap(), identity);
        assert_eq!(
            DiscIdentity::from_record(record.clone()).unwrap().to_record().unwrap(),
            record
        );
    }
}
