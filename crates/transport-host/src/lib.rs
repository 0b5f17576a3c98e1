//! # transport-host
//!
//! Host management API layer for guest transport delivery.
//! Provides the [`HostApi`] boundary the orchestrator drives, plus a
//! concrete adapter over the host's `prlctl` management CLI.
//!
//! ## Quick Start
//!
//! ```no_run
//! use transport_host::{HostApi, PrlctlConfig, PrlctlHost};
//!
//! # async fn example() -> transport_host::Result<()> {
//! let host = PrlctlHost::new(PrlctlConfig::default());
//!
//! for guest in host.list_running_guests().await? {
//!     println!("{} ({}) is {}", guest.name, guest.os, guest.state);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error categories
//!
//! Every failure maps onto one [`ErrorKind`]:
//!
//! - **Auth**: login failed (guest unreachable, still booting, credentials rejected)
//! - **Exec**: remote command failed (guest crashed, host disconnect, missing tooling)
//! - **GuestGone**: the guest stopped running
//! - **Host**: the host itself could not be queried

mod api;
mod error;
mod guest;
mod prlctl;

pub use api::{ConnectionHandle, HostApi, OutputSink, RemoteCommand, StdinSource};
pub use error::{ErrorKind, HostError, Result};
pub use guest::{Guest, GuestId, OsFamily, PowerState};
pub use prlctl::{PrlctlConfig, PrlctlHost};
