use crate::{accounting, config, dispatch, transport, watch};

/// Fatal errors surfaced by [`crate::run`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::Error),
    #[error("invalid TLS configuration: {0}")]
    Transport(#[from] transport::Error),
    #[error(transparent)]
    Watch(#[from] watch::WatchError),
    #[error(transparent)]
    Accounting(#[from] accounting::Error),
    #[error(transparent)]
    Dispatch(#[from] dispatch::DispatchError),
    #[error("metrics server failed: {0}")]
    Server(#[source] std::io::Error),
    #[error("event dispatcher panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }
}
