//! Driver error types.
//!
//! Every fallible operation on the driver surface returns [`DriverError`].
//! Hosts that need a coarse classification (for mapping onto their own
//! status codes) can use [`DriverError::kind`].

use crate::store::StoreError;
use thiserror::Error;

/// Result alias used across the driver.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Coarse error classification exposed to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    MissingParameter,
    NotFound,
    AccessDenied,
    Network,
    Internal,
    NotConnected,
}

/// Errors surfaced by the driver facade and the stream layer.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("invalid S3 URI: {0}")]
    InvalidUri(String),

    #[error("no bucket specified and no default bucket configured")]
    MissingBucket,

    #[error("driver is not connected")]
    NotConnected,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("arithmetic overflow in offset computation")]
    Overflow,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// The coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::InvalidUri(_) | DriverError::InvalidParameter(_) => {
                ErrorKind::InvalidParameter
            }
            DriverError::MissingBucket => ErrorKind::MissingParameter,
            DriverError::NotConnected => ErrorKind::NotConnected,
            DriverError::Overflow | DriverError::Internal(_) | DriverError::Io(_) => {
                ErrorKind::Internal
            }
            DriverError::Store(e) => e.kind.into(),
        }
    }

    /// True when the error denotes a missing object or an empty match set.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
