//! `HostApi` adapter over the host's `prlctl` management CLI.
//!
//! Every operation is one `prlctl` invocation. The CLI has no persistent guest
//! login, so `login` probes the guest tools with a trivial command and mints a
//! handle, and `logout` just releases it.

use crate::api::{ConnectionHandle, HostApi, OutputSink, RemoteCommand, StdinSource};
use crate::error::{HostError, Result};
use crate::guest::{Guest, GuestId, OsFamily, PowerState};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Default location of the management CLI.
const DEFAULT_PRLCTL: &str = "/usr/bin/prlctl";

/// Guest user that needs no explicit `--user` on `prlctl exec`.
const DEFAULT_EXEC_USER: &str = "root";

/// Configuration for [`PrlctlHost`].
#[derive(Debug, Clone)]
pub struct PrlctlConfig {
    /// Path to the `prlctl` binary.
    pub binary: PathBuf,
    /// Upper bound on the login probe (default: 30s).
    pub login_timeout: Duration,
    /// Upper bound on a remote command, including payload transfer (default: 300s).
    pub exec_timeout: Duration,
    /// Upper bound on enumeration and state queries (default: 30s).
    pub query_timeout: Duration,
}

impl Default for PrlctlConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_PRLCTL),
            login_timeout: Duration::from_secs(30),
            exec_timeout: Duration::from_secs(300),
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl PrlctlConfig {
    /// Set the CLI path.
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = path.into();
        self
    }

    /// Set the login probe timeout.
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Set the remote command timeout.
    pub fn exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }
}

/// Entry of `prlctl list --all --json`.
#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(alias = "ID")]
    uuid: String,
    #[serde(default, alias = "Name")]
    name: String,
}

/// Entry of `prlctl list --info --json <id>`.
#[derive(Debug, Deserialize)]
struct InfoEntry {
    #[serde(rename = "ID", alias = "uuid")]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "State", alias = "status", default)]
    state: String,
    #[serde(rename = "OS", default)]
    os: String,
}

impl InfoEntry {
    fn into_guest(self) -> Result<Guest> {
        let id = self
            .id
            .parse::<GuestId>()
            .map_err(|e| HostError::Enumerate(format!("bad guest id {:?}: {}", self.id, e)))?;
        Ok(Guest {
            id,
            name: self.name,
            os: OsFamily::from_os_name(&self.os),
            state: PowerState::from_status(&self.state),
        })
    }
}

fn parse_list(raw: &[u8]) -> Result<Vec<ListEntry>> {
    Ok(serde_json::from_slice(raw)?)
}

fn parse_info(raw: &[u8]) -> Result<Guest> {
    let entries: Vec<InfoEntry> = serde_json::from_slice(raw)?;
    entries
        .into_iter()
        .next()
        .ok_or_else(|| HostError::Enumerate("empty info response".into()))?
        .into_guest()
}

/// Command run by `login` to check that the guest tools answer.
fn login_probe(os: OsFamily) -> RemoteCommand {
    match os {
        OsFamily::Windows => RemoteCommand::new("cmd", ["/c", "exit 0"]),
        OsFamily::Linux | OsFamily::Other => RemoteCommand::new("true", Vec::<String>::new()),
    }
}

/// Whether a failed query's message says the host has no such guest.
fn is_unknown_guest(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    reason.contains("could not be found") || reason.contains("no such virtual machine")
}

/// Standard streams bound to one `prlctl exec`.
struct ExecIo {
    stdin: StdinSource,
    stdout: OutputSink,
    stderr: OutputSink,
}

impl ExecIo {
    fn null() -> Self {
        Self {
            stdin: StdinSource::Null,
            stdout: OutputSink::Null,
            stderr: OutputSink::Null,
        }
    }
}

/// Host adapter driving `prlctl`.
#[derive(Debug, Clone)]
pub struct PrlctlHost {
    config: PrlctlConfig,
}

impl PrlctlHost {
    /// Create an adapter.
    pub fn new(config: PrlctlConfig) -> Self {
        tracing::debug!(binary = %config.binary.display(), "Creating prlctl host adapter");
        Self { config }
    }

    /// Get the adapter configuration.
    pub fn config(&self) -> &PrlctlConfig {
        &self.config
    }

    /// Run a host-side query and return its stdout.
    async fn query(&self, args: &[&str]) -> Result<Vec<u8>> {
        tracing::trace!(?args, "Running prlctl query");
        let output = Command::new(&self.config.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = timeout(self.config.query_timeout, output)
            .await
            .map_err(|_| {
                HostError::Enumerate(format!(
                    "prlctl {} timed out after {:?}",
                    args.join(" "),
                    self.config.query_timeout
                ))
            })??;

        if !output.status.success() {
            return Err(HostError::Enumerate(format!(
                "prlctl {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Query one guest's current state and OS.
    pub async fn guest_info(&self, id: GuestId) -> Result<Guest> {
        let braced = id.braced();
        let raw = self.query(&["list", "--info", "--json", &braced]).await?;
        parse_info(&raw)
    }

    /// Spawn `prlctl exec` and wait for it.
    ///
    /// Returns the exit status, or a reason string when the command could not
    /// be run to completion.
    async fn run_in_guest(
        &self,
        guest: GuestId,
        user: &str,
        command: &RemoteCommand,
        io: ExecIo,
        limit: Duration,
    ) -> std::result::Result<i32, String> {
        let ExecIo {
            stdin,
            stdout,
            stderr,
        } = io;
        let stdin = stdin
            .open()
            .await
            .map_err(|e| format!("failed to open stdin source: {e}"))?;

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("exec").arg(guest.braced()).arg("--without-shell");
        if !user.is_empty() && user != DEFAULT_EXEC_USER {
            cmd.arg("--user").arg(user);
        }
        cmd.arg(&command.program)
            .args(&command.args)
            .stdin(stdin)
            .stdout(stdout.stdio())
            .stderr(stderr.stdio())
            .kill_on_drop(true);

        tracing::trace!(guest_id = %guest, command = %command, "Spawning prlctl exec");
        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", self.config.binary.display()))?;

        match timeout(limit, child.wait()).await {
            Ok(Ok(status)) => status
                .code()
                .ok_or_else(|| "prlctl exec terminated by signal".to_string()),
            Ok(Err(e)) => Err(format!("failed to wait for prlctl exec: {e}")),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(guest_id = %guest, error = %e, "Failed to kill timed out prlctl exec");
                }
                Err(format!("timed out after {:?}", limit))
            }
        }
    }

    /// Whether the guest has stopped, per a fresh state query.
    ///
    /// Only a stopped guest or one the host reports as unknown is gone. Any
    /// other query failure says nothing about the guest.
    async fn is_gone(&self, guest: GuestId) -> bool {
        match self.guest_info(guest).await {
            Ok(info) => info.state == PowerState::NotRunning,
            Err(HostError::Enumerate(reason)) if is_unknown_guest(&reason) => {
                tracing::debug!(guest_id = %guest, %reason, "Host no longer knows the guest");
                true
            }
            Err(e) => {
                tracing::debug!(guest_id = %guest, error = %e, "State re-query failed");
                false
            }
        }
    }
}

#[async_trait]
impl HostApi for PrlctlHost {
    async fn list_running_guests(&self) -> Result<Vec<Guest>> {
        let raw = self
            .query(&["list", "--all", "--json", "--vmtype", "vm"])
            .await?;
        let entries = parse_list(&raw)?;
        tracing::debug!(count = entries.len(), "Enumerated guests");

        let mut running = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = match entry.uuid.parse::<GuestId>() {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(uuid = %entry.uuid, name = %entry.name, error = %e, "Skipping guest with unparsable id");
                    continue;
                }
            };
            match self.guest_info(id).await {
                Ok(guest) if guest.state == PowerState::Running => running.push(guest),
                Ok(guest) => {
                    tracing::trace!(guest_id = %id, state = %guest.state, "Guest not running");
                }
                Err(e) => {
                    tracing::warn!(guest_id = %id, error = %e, "State query failed, skipping guest");
                }
            }
        }
        Ok(running)
    }

    async fn login(&self, guest: &Guest, user: &str) -> Result<ConnectionHandle> {
        let probe = login_probe(guest.os);
        let status = self
            .run_in_guest(guest.id, user, &probe, ExecIo::null(), self.config.login_timeout)
            .await;

        match status {
            Ok(0) => {
                tracing::debug!(guest_id = %guest.id, user, "Guest login succeeded");
                Ok(ConnectionHandle::new(guest.id, user))
            }
            Ok(code) => Err(HostError::Auth {
                guest: guest.id,
                reason: format!("login probe exited with status {code}"),
            }),
            Err(reason) => Err(HostError::Auth {
                guest: guest.id,
                reason,
            }),
        }
    }

    async fn execute(
        &self,
        handle: &ConnectionHandle,
        command: &RemoteCommand,
        stdin: StdinSource,
        stdout: OutputSink,
        stderr: OutputSink,
    ) -> Result<i32> {
        let guest = handle.guest();
        let status = self
            .run_in_guest(
                guest,
                handle.user(),
                command,
                ExecIo {
                    stdin,
                    stdout,
                    stderr,
                },
                self.config.exec_timeout,
            )
            .await;

        match status {
            Ok(0) => Ok(0),
            // prlctl folds its own failures into the exit status, so a
            // non-zero code may mean the guest went away mid-transfer.
            Ok(code) => {
                if self.is_gone(guest).await {
                    tracing::debug!(guest_id = %guest, code, "Guest stopped during execution");
                    return Err(HostError::GuestGone(guest));
                }
                Ok(code)
            }
            Err(reason) => {
                if self.is_gone(guest).await {
                    return Err(HostError::GuestGone(guest));
                }
                Err(HostError::Exec { guest, reason })
            }
        }
    }

    async fn logout(&self, handle: ConnectionHandle) -> Result<()> {
        tracing::debug!(guest_id = %handle.guest(), token = handle.token(), "Guest logout");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PrlctlConfig::default();
        assert_eq!(config.binary, PathBuf::from("/usr/bin/prlctl"));
        assert_eq!(config.login_timeout, Duration::from_secs(30));
        assert_eq!(config.exec_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_config_builder() {
        let config = PrlctlConfig::default()
            .binary("/opt/bin/prlctl")
            .exec_timeout(Duration::from_secs(5))
            .login_timeout(Duration::from_secs(1));
        assert_eq!(config.binary, PathBuf::from("/opt/bin/prlctl"));
        assert_eq!(config.exec_timeout, Duration::from_secs(5));
        assert_eq!(config.login_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_parse_list() {
        let raw = br#"[
            {"uuid": "{4b0e1c5e-6a43-4a4b-9d5e-2f3b8f0c1a11}", "status": "running", "name": "web"},
            {"uuid": "{8d2f3a10-1b22-4c33-8e44-5f6a7b8c9d00}", "status": "stopped", "name": "db"}
        ]"#;
        let entries = parse_list(raw).expect("list should parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "web");
        assert!(entries[1].uuid.parse::<GuestId>().is_ok());
    }

    #[test]
    fn test_parse_info() {
        let raw = br#"[{
            "ID": "{4b0e1c5e-6a43-4a4b-9d5e-2f3b8f0c1a11}",
            "Name": "web",
            "State": "running",
            "OS": "win-2019",
            "Type": "VM"
        }]"#;
        let guest = parse_info(raw).expect("info should parse");
        assert_eq!(guest.name, "web");
        assert_eq!(guest.os, OsFamily::Windows);
        assert_eq!(guest.state, PowerState::Running);
    }

    #[test]
    fn test_parse_info_empty() {
        assert!(matches!(parse_info(b"[]"), Err(HostError::Enumerate(_))));
        assert!(matches!(parse_info(b"{"), Err(HostError::Json(_))));
    }

    #[test]
    fn test_login_probe() {
        assert_eq!(login_probe(OsFamily::Linux).program, "true");
        assert_eq!(login_probe(OsFamily::Windows).program, "cmd");
    }

    #[tokio::test]
    async fn test_missing_binary_is_host_error() {
        let host = PrlctlHost::new(PrlctlConfig::default().binary("/nonexistent/prlctl"));
        let result = host.list_running_guests().await;
        assert!(matches!(result, Err(HostError::Io(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_login_is_auth_error() {
        let host = PrlctlHost::new(PrlctlConfig::default().binary("/nonexistent/prlctl"));
        let guest = Guest::running(GuestId::new(), "web", OsFamily::Linux);
        let err = host.login(&guest, "root").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Auth);
    }

    #[test]
    fn test_unknown_guest_message() {
        assert!(is_unknown_guest(
            "prlctl list --info exited with exit status: 255: Failed to get VM config: The virtual machine could not be found."
        ));
        assert!(!is_unknown_guest("prlctl list --info timed out after 30s"));
        assert!(!is_unknown_guest("Unable to connect to Parallels Service"));
    }

    #[tokio::test]
    async fn test_execute_failure_without_host_is_exec_error() {
        // Neither the exec nor the state re-query can run; the guest is not gone
        let host = PrlctlHost::new(PrlctlConfig::default().binary("/nonexistent/prlctl"));
        let handle = ConnectionHandle::new(GuestId::new(), "root");
        let err = host
            .execute(
                &handle,
                &RemoteCommand::new("true", Vec::<String>::new()),
                StdinSource::Null,
                OutputSink::Null,
                OutputSink::Null,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Exec);
    }
}
