use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use tradesync_common::EntityKind;
use uuid::Uuid;

use super::{AuditError, AuditSink};

/// Keeps the most recent raw batch of each kind as pretty-printed JSON.
///
/// Files are replaced by writing a temporary sibling and renaming it over the
/// target, so a reader never sees a half-written copy.
#[derive(Debug, Clone)]
pub struct FileAuditSink {
    dir: PathBuf,
}

impl FileAuditSink {
    /// Create the sink, creating `dir` if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the copy for `kind` is kept
    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.file_stem()))
    }
}

fn to_pretty_json(records: &serde_json::Value) -> Result<Vec<u8>, AuditError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut serializer)?;
    Ok(buf)
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn write(&self, kind: EntityKind, records: &serde_json::Value) -> Result<(), AuditError> {
        let bytes = to_pretty_json(records)?;
        let target = self.path_for(kind);
        let temp = self
            .dir
            .join(format!(".{}.{}.tmp", kind.file_stem(), Uuid::new_v4()));

        tokio::fs::write(&temp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(kind = %kind, path = %target.display(), bytes = bytes.len(), "Audit copy written");
        Ok(())
    }
}
