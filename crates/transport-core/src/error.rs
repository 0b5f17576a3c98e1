//! Error types for transport-core.

use std::path::PathBuf;
use thiserror::Error;
use transport_host::{ErrorKind, HostError, OsFamily};

/// Result type alias for transport-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while delivering to a guest.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from the host API
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Session is not in the state the operation needs
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Local payload artifact is missing
    #[error("payload not found: {0}")]
    MissingPayload(PathBuf),

    /// No payload exists for this OS family
    #[error("unsupported OS family: {0}")]
    UnsupportedOs(OsFamily),

    /// The remote install command ran but reported failure
    #[error("remote install command exited with status {0}")]
    NonZeroExit(i32),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Durable completion log could not be read or written
    #[error("completion log error: {0}")]
    CompletionLog(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the registry does with a guest after an operation on its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Record nothing; the guest is picked up again by a later refresh.
    Retry,
    /// Delivery confirmed; never touch the guest again in this run.
    Done,
    /// Forget the session without retrying it in this run.
    Drop,
}

impl CoreError {
    /// Map a failure onto its disposition. Failures are never `Done`.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Host(e) => match e.kind() {
                ErrorKind::GuestGone => Disposition::Drop,
                ErrorKind::Auth | ErrorKind::Exec | ErrorKind::Host => Disposition::Retry,
            },
            Self::NonZeroExit(_) | Self::MissingPayload(_) | Self::Io(_) => Disposition::Retry,
            Self::InvalidState { .. }
            | Self::UnsupportedOs(_)
            | Self::InvalidConfig(_)
            | Self::CompletionLog(_) => Disposition::Drop,
        }
    }

    /// Host error category, if this came from the host.
    pub fn host_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Host(e) => Some(e.kind()),
            _ => None,
        }
    }
}
