use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Player process has no {0} pipe")]
    MissingPipe(&'static str),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
