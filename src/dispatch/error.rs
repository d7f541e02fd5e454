use crate::watch::WatchError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("inotify event queue overflowed, events were lost")]
    Overflow,
    #[error(transparent)]
    Watch(#[from] WatchError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
