//! Payload selection by guest OS family.
//!
//! Maps an [`OsFamily`] to the local artifact to stream and the remote
//! command that writes it into place. POSIX guests unpack with `sh`; Windows
//! guests need a Python runtime in the guest, since the host offers no
//! native file-write primitive there.

use std::path::{Path, PathBuf};
use transport_host::{OsFamily, RemoteCommand};

/// Default artifact name and install path for POSIX guests.
pub const POSIX_ARTIFACT: &str = "drs-transport";
pub const POSIX_INSTALL_PATH: &str = "/bin/drs-transport";

/// Default artifact name and install path for Windows guests.
pub const WINDOWS_ARTIFACT: &str = "drs-transport.exe";
pub const WINDOWS_INSTALL_PATH: &str = r"C:\Program Files\Qemu-ga\drs-transport.exe";

/// Local artifact name and remote install path for one OS family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadLayout {
    pub artifact: String,
    pub install_path: String,
}

impl PayloadLayout {
    pub fn new(artifact: impl Into<String>, install_path: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            install_path: install_path.into(),
        }
    }
}

/// A resolved payload: what to stream and how the guest receives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub os: OsFamily,
    pub source: PathBuf,
    pub install_path: String,
    pub command: RemoteCommand,
}

/// Remote command writing stdin to `path` and marking it executable.
pub fn posix_install_command(path: &str) -> RemoteCommand {
    let quoted = format!("'{}'", path.replace('\'', r"'\''"));
    RemoteCommand::new(
        "sh",
        [
            "-c".to_string(),
            format!("cat > {quoted} && chmod +x {quoted}"),
        ],
    )
}

/// Remote command writing binary stdin to `path` through the guest's Python.
pub fn windows_install_command(path: &str) -> RemoteCommand {
    let script = format!(
        "import sys, os, msvcrt; \
         msvcrt.setmode(sys.stdin.fileno(), os.O_BINARY); \
         data = getattr(sys.stdin, 'buffer', sys.stdin).read(); \
         f = open(r'{path}', 'wb'); f.write(data); f.close()"
    );
    RemoteCommand::new("python", ["-u".to_string(), "-c".to_string(), script])
}

/// Pure mapping from OS family to [`Payload`].
#[derive(Debug, Clone)]
pub struct PayloadSelector {
    dir: PathBuf,
    posix: PayloadLayout,
    windows: PayloadLayout,
}

impl PayloadSelector {
    /// Selector over artifacts in `dir` with the default layouts.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            posix: PayloadLayout::new(POSIX_ARTIFACT, POSIX_INSTALL_PATH),
            windows: PayloadLayout::new(WINDOWS_ARTIFACT, WINDOWS_INSTALL_PATH),
        }
    }

    /// Override the POSIX layout.
    pub fn with_posix(mut self, layout: PayloadLayout) -> Self {
        self.posix = layout;
        self
    }

    /// Override the Windows layout.
    pub fn with_windows(mut self, layout: PayloadLayout) -> Self {
        self.windows = layout;
        self
    }

    /// Directory holding the artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the payload for `os`. `None` for unsupported families.
    pub fn select(&self, os: OsFamily) -> Option<Payload> {
        let (layout, command) = match os {
            OsFamily::Linux => (&self.posix, posix_install_command(&self.posix.install_path)),
            OsFamily::Windows => (
                &self.windows,
                windows_install_command(&self.windows.install_path),
            ),
            OsFamily::Other => return None,
        };
        Some(Payload {
            os,
            source: self.dir.join(&layout.artifact),
            install_path: layout.install_path.clone(),
            command,
        })
    }

    /// Local artifacts that do not exist.
    pub fn missing_artifacts(&self) -> Vec<PathBuf> {
        [&self.posix, &self.windows]
            .into_iter()
            .map(|layout| self.dir.join(&layout.artifact))
            .filter(|path| !path.is_file())
            .collect()
    }
}
