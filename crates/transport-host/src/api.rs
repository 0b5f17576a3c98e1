//! The host API boundary consumed by the orchestrator.

use crate::error::Result;
use crate::guest::{Guest, GuestId};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// A guest-level login.
///
/// Handles are deliberately neither `Clone` nor `Copy`: each one is owned by
/// exactly one session and consumed by [`HostApi::logout`].
#[derive(Debug, PartialEq, Eq)]
pub struct ConnectionHandle {
    guest: GuestId,
    user: String,
    token: u64,
}

impl ConnectionHandle {
    /// Mint a new handle for `guest`. Called by adapters on successful login.
    pub fn new(guest: GuestId, user: impl Into<String>) -> Self {
        Self {
            guest,
            user: user.into(),
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The guest this handle is logged into.
    pub fn guest(&self) -> GuestId {
        self.guest
    }

    /// The guest user the login was made as.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Process-unique token distinguishing logins to the same guest.
    pub fn token(&self) -> u64 {
        self.token
    }
}

/// A program plus arguments to run inside a guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RemoteCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {:?}", arg)?;
        }
        Ok(())
    }
}

/// Where the remote command's standard input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    /// Empty input.
    Null,
    /// Stream the contents of a local file.
    File(PathBuf),
}

impl StdinSource {
    /// Open the source for handing to a child process.
    pub async fn open(&self) -> std::io::Result<Stdio> {
        match self {
            Self::Null => Ok(Stdio::null()),
            Self::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Stdio::from(file.into_std().await))
            }
        }
    }
}

/// Where the remote command's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSink {
    /// Discard.
    Null,
    /// Forward to this process's standard output.
    #[default]
    Forward,
}

impl OutputSink {
    /// Stdio for a child process writing into this sink.
    pub fn stdio(&self) -> Stdio {
        match self {
            Self::Null => Stdio::null(),
            Self::Forward => Stdio::inherit(),
        }
    }
}

/// Guest management operations offered by the host.
///
/// All methods block the calling task until the host answers or an
/// adapter-side timeout elapses; timeouts surface as `Auth` or `Exec` errors.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Guests currently in the running power state.
    ///
    /// Guests whose state query fails are omitted rather than failing the call.
    async fn list_running_guests(&self) -> Result<Vec<Guest>>;

    /// Log into a guest as `user`.
    async fn login(&self, guest: &Guest, user: &str) -> Result<ConnectionHandle>;

    /// Run `command` in the guest with `stdin` bound to its standard input.
    ///
    /// Returns the remote exit status.
    async fn execute(
        &self,
        handle: &ConnectionHandle,
        command: &RemoteCommand,
        stdin: StdinSource,
        stdout: OutputSink,
        stderr: OutputSink,
    ) -> Result<i32>;

    /// Release a login. Best-effort.
    async fn logout(&self, handle: ConnectionHandle) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let guest = GuestId::new();
        let a = ConnectionHandle::new(guest, "root");
        let b = ConnectionHandle::new(guest, "root");
        assert_eq!(a.guest(), b.guest());
        assert_ne!(a.token(), b.token());
        assert_eq!(a.user(), "root");
    }

    #[test]
    fn test_remote_command_display() {
        let cmd = RemoteCommand::new("sh", ["-c", "cat > /bin/x"]);
        assert_eq!(cmd.to_string(), r#"sh "-c" "cat > /bin/x""#);
    }

    #[tokio::test]
    async fn test_stdin_missing_file() {
        let source = StdinSource::File(PathBuf::from("/nonexistent/payload.bin"));
        assert!(source.open().await.is_err());
        assert!(StdinSource::Null.open().await.is_ok());
    }
}
