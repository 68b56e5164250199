use thiserror::Error;

/// The result type of the tracker thread operations.
pub type Result<T> = std::result::Result<T, ThreadError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ThreadError {
    #[error("the tracker thread has already been shutdown")]
    AlreadyShutdown,
    #[error("failed to spawn the tracker thread, {0}")]
    Spawn(String),
    #[error("the tracker thread runtime failed, {0}")]
    Runtime(String),
    #[error("the tracker thread is no longer running")]
    Closed,
}
