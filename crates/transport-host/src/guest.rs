//! Guest identity and observed state.

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable unique identifier of a guest, as assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestId(Uuid);

impl GuestId {
    /// Create a new random guest ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Braced form (`{xxxxxxxx-...}`) used on the host command line.
    pub fn braced(&self) -> String {
        self.0.braced().to_string()
    }
}

impl Default for GuestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for GuestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for GuestId {
    type Err = uuid::Error;

    /// Accepts hyphenated, simple, URN and braced forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Operating system family of a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// Linux and other POSIX guests with a shell.
    Linux,
    /// Windows guests.
    Windows,
    /// Anything else; never receives a payload.
    Other,
}

/// Distribution names the host reports for Linux guests.
const LINUX_OS_NAMES: &[&str] = &[
    "linux", "centos", "rhel", "redhat", "fedora", "debian", "ubuntu", "suse", "opensuse", "sles",
    "vzlinux", "almalinux", "rocky", "oracle", "virtuozzo", "mandriva", "gentoo", "arch",
];

impl OsFamily {
    /// Map the host's OS name (e.g. `centos7`, `win-2019`) to a family.
    pub fn from_os_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        if name.starts_with("win") {
            Self::Windows
        } else if LINUX_OS_NAMES.iter().any(|prefix| name.starts_with(prefix)) {
            Self::Linux
        } else {
            Self::Other
        }
    }

    /// Whether a payload exists for this family.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Windows => write!(f, "windows"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Power state of a guest as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Running,
    NotRunning,
    Unknown,
}

impl PowerState {
    /// Parse the host's state string.
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "stopped" | "suspended" | "paused" | "stopping" | "starting" | "mounted"
            | "suspending" | "resuming" => Self::NotRunning,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::NotRunning => write!(f, "not-running"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A guest as observed through the host management API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guest {
    pub id: GuestId,
    pub name: String,
    pub os: OsFamily,
    pub state: PowerState,
}

impl Guest {
    /// A running guest.
    pub fn running(id: GuestId, name: impl Into<String>, os: OsFamily) -> Self {
        Self {
            id,
            name: name.into(),
            os,
            state: PowerState::Running,
        }
    }
}
