use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Command timed out: {0}")]
    Timeout(String),

    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

pub type ProbeResult<T> = Result<T, ProbeError>;
