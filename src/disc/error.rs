use thiserror::Error;

#[derive(Debug, Error)]
pub enum TocError {
    #[error("No track markers found in the TOC")]
    NoTrackMarkers,

    #[error("No lead-out found in the TOC")]
    MissingLeadOut,

    #[error("Invalid track range: first {first}, last {last}")]
    InvalidTrackRange { first: u32, last: u32 },

    #[error("Address does not fit a CD table of contents")]
    AddressOutOfRange,

    #[error(transparent)]
    ParseIntError(#[from] std::num::ParseIntError),
}

pub type TocResult<T> = Result<T, TocError>;
