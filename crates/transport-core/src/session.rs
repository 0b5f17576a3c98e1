//! Guest sessions - one connect/deliver/disconnect cycle per guest.

use crate::config::RegistryConfig;
use crate::error::{CoreError, Result};
use crate::payload::{Payload, PayloadSelector};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use transport_host::{
    ConnectionHandle, Guest, GuestId, HostApi, OsFamily, OutputSink, StdinSource,
};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Logging into the guest.
    Connecting,
    /// Logged in, nothing sent yet.
    Ready,
    /// Payload transfer in flight.
    Delivering,
    /// Payload written and confirmed.
    Delivered,
    /// Login or delivery failed.
    Failed,
    /// Logged out before any delivery attempt.
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Ready => write!(f, "Ready"),
            Self::Delivering => write!(f, "Delivering"),
            Self::Delivered => write!(f, "Delivered"),
            Self::Failed => write!(f, "Failed"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Outcome of the delivery attempt.
///
/// Failures carry no permanence: a failed guest stays eligible for the next
/// run for as long as it keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

/// A session bound to one guest.
///
/// Implementations own their connection handle exclusively. `disconnect`
/// releases it at most once; later calls are no-ops.
#[async_trait]
pub trait GuestSession: Send {
    /// The guest this session is bound to.
    fn guest(&self) -> &Guest;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Delivery outcome so far.
    fn status(&self) -> DeliveryStatus;

    /// Whether a login handle is currently held.
    fn is_connected(&self) -> bool;

    /// Log into the guest.
    async fn connect(&mut self) -> Result<()>;

    /// Stream the payload into the guest with a single remote command.
    async fn deliver_payload(&mut self) -> Result<()>;

    /// Log out of the guest.
    async fn disconnect(&mut self) -> Result<()>;

    /// The guest's ID.
    fn guest_id(&self) -> GuestId {
        self.guest().id
    }
}

/// Connection and state shared by all session variants.
struct SessionCore {
    guest: Guest,
    host: Arc<dyn HostApi>,
    user: String,
    output: OutputSink,
    handle: Option<ConnectionHandle>,
    state: SessionState,
    status: DeliveryStatus,
    created_at: DateTime<Utc>,
}

impl SessionCore {
    fn new(guest: Guest, host: Arc<dyn HostApi>, config: &RegistryConfig) -> Self {
        Self {
            guest,
            host,
            user: config.guest_user.clone(),
            output: config.output,
            handle: None,
            state: SessionState::Connecting,
            status: DeliveryStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn ensure_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(CoreError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }

    fn fail(&mut self, err: CoreError) -> CoreError {
        self.state = SessionState::Failed;
        self.status = DeliveryStatus::Failed;
        err
    }

    async fn connect(&mut self) -> Result<()> {
        self.ensure_state(SessionState::Connecting)?;
        tracing::debug!(guest_id = %self.guest.id, os = %self.guest.os, user = %self.user, "Logging into guest");

        match self.host.login(&self.guest, &self.user).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SessionState::Ready;
                tracing::debug!(guest_id = %self.guest.id, "Session ready");
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    async fn deliver(&mut self, payload: &Payload) -> Result<()> {
        self.ensure_state(SessionState::Ready)?;
        let start = std::time::Instant::now();
        self.state = SessionState::Delivering;
        tracing::debug!(
            guest_id = %self.guest.id,
            source = %payload.source.display(),
            install_path = %payload.install_path,
            "Delivering payload"
        );

        if let Err(e) = tokio::fs::metadata(&payload.source).await {
            tracing::error!(source = %payload.source.display(), error = %e, "Payload artifact unreadable");
            return Err(self.fail(CoreError::MissingPayload(payload.source.clone())));
        }

        let Some(handle) = self.handle.as_ref() else {
            return Err(self.fail(CoreError::InvalidState {
                expected: "connected".into(),
                actual: "no login handle".into(),
            }));
        };

        let result = self
            .host
            .execute(
                handle,
                &payload.command,
                StdinSource::File(payload.source.clone()),
                self.output,
                self.output,
            )
            .await;

        match result {
            Ok(0) => {
                self.state = SessionState::Delivered;
                self.status = DeliveryStatus::Delivered;
                tracing::info!(
                    guest_id = %self.guest.id,
                    os = %self.guest.os,
                    install_path = %payload.install_path,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Payload delivered"
                );
                Ok(())
            }
            Ok(code) => Err(self.fail(CoreError::NonZeroExit(code))),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            tracing::trace!(guest_id = %self.guest.id, "Disconnect without login, nothing to release");
            return Ok(());
        };
        if self.state == SessionState::Ready {
            self.state = SessionState::Disconnected;
        }
        tracing::debug!(
            guest_id = %self.guest.id,
            session_age_ms = (Utc::now() - self.created_at).num_milliseconds(),
            "Logging out of guest"
        );
        self.host.logout(handle).await.map_err(CoreError::from)
    }
}

/// Session for Linux and other POSIX guests.
pub struct PosixSession {
    core: SessionCore,
    selector: Arc<PayloadSelector>,
}

impl PosixSession {
    pub fn new(
        guest: Guest,
        host: Arc<dyn HostApi>,
        selector: Arc<PayloadSelector>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            core: SessionCore::new(guest, host, config),
            selector,
        }
    }
}

#[async_trait]
impl GuestSession for PosixSession {
    fn guest(&self) -> &Guest {
        &self.core.guest
    }

    fn state(&self) -> SessionState {
        self.core.state
    }

    fn status(&self) -> DeliveryStatus {
        self.core.status
    }

    fn is_connected(&self) -> bool {
        self.core.handle.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        self.core.connect().await
    }

    async fn deliver_payload(&mut self) -> Result<()> {
        let payload = self
            .selector
            .select(OsFamily::Linux)
            .ok_or(CoreError::UnsupportedOs(OsFamily::Linux))?;
        self.core.deliver(&payload).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.core.disconnect().await
    }
}

/// Session for Windows guests with a Python runtime installed.
pub struct WindowsSession {
    core: SessionCore,
    selector: Arc<PayloadSelector>,
}

impl WindowsSession {
    pub fn new(
        guest: Guest,
        host: Arc<dyn HostApi>,
        selector: Arc<PayloadSelector>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            core: SessionCore::new(guest, host, config),
            selector,
        }
    }
}

#[async_trait]
impl GuestSession for WindowsSession {
    fn guest(&self) -> &Guest {
        &self.core.guest
    }

    fn state(&self) -> SessionState {
        self.core.state
    }

    fn status(&self) -> DeliveryStatus {
        self.core.status
    }

    fn is_connected(&self) -> bool {
        self.core.handle.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        self.core.connect().await
    }

    async fn deliver_payload(&mut self) -> Result<()> {
        let payload = self
            .selector
            .select(OsFamily::Windows)
            .ok_or(CoreError::UnsupportedOs(OsFamily::Windows))?;
        let result = self.core.deliver(&payload).await;
        if let Err(CoreError::NonZeroExit(code)) = &result {
            tracing::warn!(
                guest_id = %self.core.guest.id,
                code,
                "Windows install script failed; is Python installed in the guest?"
            );
        }
        result
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.core.disconnect().await
    }
}

/// Build the session variant for `guest`'s OS family.
///
/// Returns `None` for unsupported families; such guests never get a session.
pub fn open_session(
    guest: Guest,
    host: Arc<dyn HostApi>,
    selector: Arc<PayloadSelector>,
    config: &RegistryConfig,
) -> Option<Box<dyn GuestSession>> {
    match guest.os {
        OsFamily::Linux => Some(Box::new(PosixSession::new(guest, host, selector, config))),
        OsFamily::Windows => Some(Box::new(WindowsSession::new(guest, host, selector, config))),
        OsFamily::Other => None,
    }
}
