//! Opt-in durable record of completed deliveries.
//!
//! Without a log, completed guests are remembered only for the lifetime of
//! one registry, so a later process run delivers to them again. With a log,
//! each completion is appended as `<guest-id>\t<rfc3339 timestamp>` and the
//! file seeds the registry's done set on startup.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use transport_host::GuestId;

/// Append-only completion log file.
#[derive(Debug, Clone)]
pub struct CompletionLog {
    path: PathBuf,
}

impl CompletionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every recorded guest. A missing file is an empty log.
    pub async fn load(&self) -> Result<HashSet<GuestId>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No completion log yet");
                return Ok(HashSet::new());
            }
            Err(e) => {
                return Err(CoreError::CompletionLog(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut done = HashSet::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let id = line.split('\t').next().unwrap_or_default();
            match id.parse::<GuestId>() {
                Ok(id) => {
                    done.insert(id);
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = lineno + 1, error = %e, "Skipping malformed completion entry");
                }
            }
        }
        tracing::debug!(path = %self.path.display(), count = done.len(), "Completion log loaded");
        Ok(done)
    }

    /// Append one completion.
    pub async fn record(&self, id: GuestId) -> Result<()> {
        self.record_at(id, Utc::now()).await
    }

    async fn record_at(&self, id: GuestId, at: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\t{}\n", id, at.to_rfc3339()).as_bytes())
            .await?;
        file.sync_data().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(name: &str) -> CompletionLog {
        let dir = std::env::temp_dir().join(format!(
            "transport-core-completion-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        CompletionLog::new(dir.join("done.log"))
    }

    #[tokio::test]
    async fn test_missing_log_is_empty() {
        let log = temp_log("missing");
        assert!(log.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_then_load() {
        let log = temp_log("record");
        let a = GuestId::new();
        let b = GuestId::new();
        log.record(a).await.unwrap();
        log.record(b).await.unwrap();
        log.record(a).await.unwrap();

        let done = log.load().await.unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains(&a));
        assert!(done.contains(&b));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let log = temp_log("malformed");
        let a = GuestId::new();
        log.record(a).await.unwrap();
        let mut content = std::fs::read_to_string(log.path()).unwrap();
        content.push_str("# comment\ngarbage\tline\n\n");
        std::fs::write(log.path(), content).unwrap();

        let done = log.load().await.unwrap();
        assert_eq!(done.len(), 1);
        assert!(done.contains(&a));
    }
}
