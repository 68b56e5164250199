use crate::net::HttpError;
use crate::tracker::TrackerHandle;
use crate::InfoHash;
use thiserror::Error;
use url::ParseError;

/// The result type of tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Error type for tracker-related operations.
///
/// This enum groups all errors that can occur while sending requests to a tracker,
/// or while processing its responses.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("the tracker handle {0} is invalid")]
    InvalidHandle(TrackerHandle),
    #[error("the tracker handle {0} is already registered")]
    DuplicateHandle(TrackerHandle),
    #[error("tracker url \"{0}\" is invalid")]
    InvalidUrl(String),
    #[error("tracker url \"{0}\" doesn't support scraping")]
    ScrapeUnsupported(String),
    #[error("no usable address family")]
    NoAddressFamily,
    #[error("an error occurred while connecting to the tracker, {0}")]
    Connection(String),
    #[error("timed out while performing the request")]
    Timeout,
    #[error("received invalid status code {0}")]
    Status(u16),
    #[error("failed to parse tracker response, {0}")]
    Parse(String),
    #[error("failed to announce to the tracker, {0}")]
    AnnounceFailure(String),
    #[error("info hash {0} not found within scrape response")]
    InfoHashNotFound(InfoHash),
}

impl PartialEq for TrackerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidHandle(_), Self::InvalidHandle(_)) => true,
            (Self::DuplicateHandle(_), Self::DuplicateHandle(_)) => true,
            (Self::InvalidUrl(_), Self::InvalidUrl(_)) => true,
            (Self::ScrapeUnsupported(_), Self::ScrapeUnsupported(_)) => true,
            (Self::NoAddressFamily, Self::NoAddressFamily) => true,
            (Self::Connection(_), Self::Connection(_)) => true,
            (Self::Timeout, Self::Timeout) => true,
            (Self::Status(_), Self::Status(_)) => true,
            (Self::Parse(_), Self::Parse(_)) => true,
            (Self::AnnounceFailure(_), Self::AnnounceFailure(_)) => true,
            (Self::InfoHashNotFound(_), Self::InfoHashNotFound(_)) => true,
            _ => false,
        }
    }
}

impl From<HttpError> for TrackerError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout => Self::Timeout,
            HttpError::Client(e) => Self::Connection(e),
            HttpError::Connection(e) => Self::Connection(e),
        }
    }
}

impl From<ParseError> for TrackerError {
    fn from(error: ParseError) -> Self {
        Self::InvalidUrl(error.to_string())
    }
}

impl From<serde_bencode::Error> for TrackerError {
    fn from(error: serde_bencode::Error) -> Self {
        Self::Parse(error.to_string())
    }
}
