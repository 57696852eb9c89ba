use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata unavailable: {0}")]
    Unavailable(String),
}

pub type MetadataResult<T> = Result<T, MetadataError>;
