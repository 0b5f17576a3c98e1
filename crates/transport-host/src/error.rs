//! Error types for transport-host.

use crate::guest::GuestId;
use thiserror::Error;

/// Result type alias for transport-host operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Coarse error category used by callers to decide retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Authentication or connection failure at login time.
    Auth,
    /// Failure while running a command inside the guest.
    Exec,
    /// The guest is no longer running.
    GuestGone,
    /// The host could not be queried at all.
    Host,
}

/// Errors that can occur while talking to the host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Guest login failed
    #[error("login to guest {guest} failed: {reason}")]
    Auth { guest: GuestId, reason: String },

    /// Remote command failed
    #[error("execution in guest {guest} failed: {reason}")]
    Exec { guest: GuestId, reason: String },

    /// Guest stopped running or disappeared
    #[error("guest {0} is no longer running")]
    GuestGone(GuestId),

    /// Host-level enumeration or state query failed
    #[error("guest enumeration failed: {0}")]
    Enumerate(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed host output
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Exec { .. } => ErrorKind::Exec,
            Self::GuestGone(_) => ErrorKind::GuestGone,
            Self::Enumerate(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Host,
        }
    }

    /// The guest this error refers to, if any.
    pub fn guest(&self) -> Option<GuestId> {
        match self {
            Self::Auth { guest, .. } | Self::Exec { guest, .. } => Some(*guest),
            Self::GuestGone(guest) => Some(*guest),
            _ => None,
        }
    }
}
