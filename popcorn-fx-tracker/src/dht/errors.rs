use thiserror::Error;

/// The result type of the DHT operations.
pub type Result<T> = std::result::Result<T, DhtError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DhtError {
    #[error("the DHT has not been initialized")]
    NotInitialized,
    #[error("the DHT has already been initialized")]
    AlreadyInitialized,
    #[error("the DHT is already active, stop it before starting it again")]
    AlreadyActive,
    #[error("the DHT router failed, {0}")]
    Router(String),
}

impl DhtError {
    /// Returns true when the error is caused by calling an operation in an invalid lifecycle state,
    /// which indicates a bug within the caller.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, DhtError::NotInitialized | DhtError::AlreadyInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_programming_error() {
        assert_eq!(true, DhtError::NotInitialized.is_programming_error());
        assert_eq!(true, DhtError::AlreadyInitialized.is_programming_error());
        assert_eq!(false, DhtError::AlreadyActive.is_programming_error());
        assert_eq!(false, DhtError::Router("lorem".to_string()).is_programming_error());
    }
}
