//! # transport-core
//!
//! Delivers the transport agent into every running guest, once per guest.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  transport-core (host)                   │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌──────────────────┐     ┌─────────────────────────┐   │
//! │  │ SessionRegistry  │────▶│ active: HashMap<GuestId,│   │
//! │  │  - refresh()     │     │   Box<dyn GuestSession>>│   │
//! │  │  - deliver_all() │     │ done:   HashSet<GuestId>│   │
//! │  │  - disconnect_all│     └─────────────────────────┘   │
//! │  └──────────────────┘                                    │
//! │           │                                              │
//! │           ▼                                              │
//! │  ┌──────────────────┐     ┌─────────────────────────┐   │
//! │  │  GuestSession    │────▶│   PayloadSelector       │   │
//! │  │  PosixSession    │     │   OsFamily → Payload    │   │
//! │  │  WindowsSession  │     └─────────────────────────┘   │
//! │  └──────────────────┘                                    │
//! │           │ login / execute / logout                     │
//! │           ▼                                              │
//! │  ┌──────────────────┐                                    │
//! │  │ dyn HostApi      │  (from transport-host)             │
//! │  └──────────────────┘                                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use transport_core::{PayloadSelector, RegistryConfig, SessionRegistry};
//! use transport_host::{PrlctlConfig, PrlctlHost};
//!
//! # async fn example() {
//! let host = Arc::new(PrlctlHost::new(PrlctlConfig::default()));
//! let mut registry = SessionRegistry::new(
//!     host,
//!     PayloadSelector::new("/usr/libexec/transport"),
//!     RegistryConfig::default(),
//! );
//!
//! let report = registry.run().await;
//! println!("delivered to {} guests", report.delivered);
//! # }
//! ```
//!
//! ## Failure handling
//!
//! - **Login failure**: the guest is skipped and retried on the next run
//! - **Delivery failure**: the session is dropped and retried on the next run
//! - **Guest gone**: the session is dropped
//! - **Logout failure**: logged and ignored
//!
//! Completed guests are remembered for the lifetime of one registry. Attach a
//! [`CompletionLog`] to remember them across process runs.

mod completion;
mod config;
mod error;
mod payload;
mod registry;
mod report;
mod session;

pub use completion::CompletionLog;
pub use config::{RegistryConfig, RegistryConfigBuilder};
pub use error::{CoreError, Disposition, Result};
pub use payload::{
    posix_install_command, windows_install_command, Payload, PayloadLayout, PayloadSelector,
    POSIX_ARTIFACT, POSIX_INSTALL_PATH, WINDOWS_ARTIFACT, WINDOWS_INSTALL_PATH,
};
pub use registry::SessionRegistry;
pub use report::RunReport;
pub use session::{
    open_session, DeliveryStatus, GuestSession, PosixSession, SessionState, WindowsSession,
};
