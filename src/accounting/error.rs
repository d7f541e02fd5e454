use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create or register metric: {0}")]
    Metric(#[from] prometheus::Error),
    #[error(transparent)]
    Stat(#[from] fsutil::StatError),
}

pub type Result<T> = std::result::Result<T, Error>;
