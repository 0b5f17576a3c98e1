//! Configuration for the installer.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use transport_core::{
    CoreError, PayloadLayout, PayloadSelector, RegistryConfig, POSIX_ARTIFACT,
    POSIX_INSTALL_PATH, WINDOWS_ARTIFACT, WINDOWS_INSTALL_PATH,
};
use transport_host::{OutputSink, PrlctlConfig};

/// Configuration for the transport installer.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Path to the host management CLI.
    pub prlctl_path: PathBuf,

    /// Directory holding the payload artifacts (default: next to the executable).
    pub payload_dir: PathBuf,

    /// File name of the POSIX payload.
    pub posix_artifact: String,

    /// File name of the Windows payload.
    pub windows_artifact: String,

    /// Guest user to log in as (default: root).
    pub guest_user: String,

    /// Maximum parallel deliveries (default: 4).
    pub max_concurrent: usize,

    /// Timeout for the payload transfer command (default: 300s).
    pub exec_timeout: Duration,

    /// Timeout for the login probe (default: 30s).
    pub login_timeout: Duration,

    /// Forward remote command output to stdout (default: true).
    pub forward_output: bool,

    /// Durable completion log; unset keeps completions in memory only.
    pub done_log: Option<PathBuf>,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("prlctl binary not found: {0}")]
    MissingPrlctl(PathBuf),

    #[error("payload artifact not found: {0}")]
    MissingPayload(PathBuf),

    #[error("completion log directory not found: {0}")]
    InvalidDoneLog(PathBuf),
}

/// Directory of the running executable, where payloads ship by default.
fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            prlctl_path: PathBuf::from("/usr/bin/prlctl"),
            payload_dir: executable_dir(),
            posix_artifact: POSIX_ARTIFACT.to_string(),
            windows_artifact: WINDOWS_ARTIFACT.to_string(),
            guest_user: "root".to_string(),
            max_concurrent: 4,
            exec_timeout: Duration::from_secs(300),
            login_timeout: Duration::from_secs(30),
            forward_output: true,
            done_log: None,
        }
    }
}

impl InstallConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TRANSPORT_PRLCTL` | `/usr/bin/prlctl` |
    /// | `TRANSPORT_PAYLOAD_DIR` | directory of the executable |
    /// | `TRANSPORT_POSIX_PAYLOAD` | `drs-transport` |
    /// | `TRANSPORT_WINDOWS_PAYLOAD` | `drs-transport.exe` |
    /// | `TRANSPORT_GUEST_USER` | `root` |
    /// | `TRANSPORT_MAX_CONCURRENT` | `4` |
    /// | `TRANSPORT_EXEC_TIMEOUT_SECS` | `300` |
    /// | `TRANSPORT_LOGIN_TIMEOUT_SECS` | `30` |
    /// | `TRANSPORT_FORWARD_OUTPUT` | `true` |
    /// | `TRANSPORT_DONE_LOG` | unset |
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            prlctl_path: std::env::var("TRANSPORT_PRLCTL")
                .map(PathBuf::from)
                .unwrap_or(default.prlctl_path),
            payload_dir: std::env::var("TRANSPORT_PAYLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.payload_dir),
            posix_artifact: std::env::var("TRANSPORT_POSIX_PAYLOAD")
                .unwrap_or(default.posix_artifact),
            windows_artifact: std::env::var("TRANSPORT_WINDOWS_PAYLOAD")
                .unwrap_or(default.windows_artifact),
            guest_user: std::env::var("TRANSPORT_GUEST_USER").unwrap_or(default.guest_user),
            max_concurrent: std::env::var("TRANSPORT_MAX_CONCURRENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default.max_concurrent),
            exec_timeout: std::env::var("TRANSPORT_EXEC_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.exec_timeout),
            login_timeout: std::env::var("TRANSPORT_LOGIN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.login_timeout),
            forward_output: std::env::var("TRANSPORT_FORWARD_OUTPUT")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(default.forward_output),
            done_log: std::env::var("TRANSPORT_DONE_LOG")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Host adapter settings.
    pub fn prlctl_config(&self) -> PrlctlConfig {
        PrlctlConfig::default()
            .binary(&self.prlctl_path)
            .exec_timeout(self.exec_timeout)
            .login_timeout(self.login_timeout)
    }

    /// Payload selector over the configured artifacts.
    pub fn payload_selector(&self) -> PayloadSelector {
        PayloadSelector::new(&self.payload_dir)
            .with_posix(PayloadLayout::new(&self.posix_artifact, POSIX_INSTALL_PATH))
            .with_windows(PayloadLayout::new(
                &self.windows_artifact,
                WINDOWS_INSTALL_PATH,
            ))
    }

    /// Registry settings.
    pub fn registry_config(&self) -> Result<RegistryConfig, CoreError> {
        let output = if self.forward_output {
            OutputSink::Forward
        } else {
            OutputSink::Null
        };
        RegistryConfig::builder()
            .guest_user(&self.guest_user)
            .max_concurrent(self.max_concurrent)
            .output(output)
            .build()
    }

    /// Validate the completion log directory, the host CLI and the payload
    /// artifacts, in that order.
    ///
    /// The installer only refuses to start on [`ConfigError::InvalidDoneLog`];
    /// the other errors are reported by [`validate_warn`](Self::validate_warn).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.done_log.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidDoneLog(parent.to_path_buf()));
            }
        }

        if !self.prlctl_path.exists() {
            return Err(ConfigError::MissingPrlctl(self.prlctl_path.clone()));
        }

        if let Some(missing) = self.payload_selector().missing_artifacts().into_iter().next() {
            return Err(ConfigError::MissingPayload(missing));
        }

        Ok(())
    }

    /// Validate configuration but only log warnings instead of failing.
    ///
    /// A missing artifact only affects guests of that OS family.
    pub fn validate_warn(&self) {
        if !self.prlctl_path.exists() {
            tracing::warn!("prlctl not found: {:?}", self.prlctl_path);
        }

        for missing in self.payload_selector().missing_artifacts() {
            tracing::warn!("Payload artifact not found: {:?}", missing);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport_host::OsFamily;

    #[test]
    fn test_default_config() {
        let config = InstallConfig::default();
        assert_eq!(config.prlctl_path, PathBuf::from("/usr/bin/prlctl"));
        assert_eq!(config.posix_artifact, "drs-transport");
        assert_eq!(config.windows_artifact, "drs-transport.exe");
        assert_eq!(config.guest_user, "root");
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.exec_timeout, Duration::from_secs(300));
        assert!(config.forward_output);
        assert!(config.done_log.is_none());
    }

    #[test]
    fn test_from_env_uses_defaults() {
        // Clear any existing env vars
        std::env::remove_var("TRANSPORT_PRLCTL");
        std::env::remove_var("TRANSPORT_GUEST_USER");
        std::env::remove_var("TRANSPORT_MAX_CONCURRENT");
        std::env::remove_var("TRANSPORT_EXEC_TIMEOUT_SECS");
        std::env::remove_var("TRANSPORT_DONE_LOG");

        let config = InstallConfig::from_env();
        let default = InstallConfig::default();

        assert_eq!(config.prlctl_path, default.prlctl_path);
        assert_eq!(config.guest_user, default.guest_user);
        assert_eq!(config.max_concurrent, default.max_concurrent);
        assert_eq!(config.exec_timeout, default.exec_timeout);
        assert!(config.done_log.is_none());
    }

    #[test]
    fn test_payload_selector_uses_artifact_names() {
        let config = InstallConfig {
            payload_dir: PathBuf::from("/opt/transport"),
            posix_artifact: "agent".into(),
            ..Default::default()
        };
        let payload = config
            .payload_selector()
            .select(OsFamily::Linux)
            .expect("linux payload");
        assert_eq!(payload.source, PathBuf::from("/opt/transport/agent"));
        assert_eq!(payload.install_path, POSIX_INSTALL_PATH);
    }

    #[test]
    fn test_registry_config_output() {
        let config = InstallConfig {
            forward_output: false,
            ..Default::default()
        };
        let registry = config.registry_config().expect("valid registry config");
        assert_eq!(registry.output, OutputSink::Null);
    }

    #[test]
    fn test_prlctl_config() {
        let config = InstallConfig {
            prlctl_path: PathBuf::from("/opt/prlctl"),
            exec_timeout: Duration::from_secs(9),
            ..Default::default()
        };
        let prlctl = config.prlctl_config();
        assert_eq!(prlctl.binary, PathBuf::from("/opt/prlctl"));
        assert_eq!(prlctl.exec_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_validate_reports_missing_prlctl() {
        let config = InstallConfig {
            prlctl_path: PathBuf::from("/nonexistent/prlctl"),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingPrlctl(_))
        ));
    }

    #[test]
    fn test_validate_checks_done_log_first() {
        let config = InstallConfig {
            prlctl_path: PathBuf::from("/nonexistent/prlctl"),
            done_log: Some(PathBuf::from("/nonexistent/state/done.log")),
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidDoneLog(dir)) => {
                assert_eq!(dir, PathBuf::from("/nonexistent/state"));
            }
            other => panic!("expected InvalidDoneLog, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_accepts_bare_done_log_name() {
        let config = InstallConfig {
            prlctl_path: PathBuf::from("/nonexistent/prlctl"),
            done_log: Some(PathBuf::from("done.log")),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingPrlctl(_))
        ));
    }
}
