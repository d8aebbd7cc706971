//! Decision file written for the GPU virtualization layer
//!
//! The file is replaced as a whole on every publish: the new content goes to
//! a temporary file in the same directory which is then renamed over the old
//! one, so readers never see a partial decision.

use async_trait::async_trait;
use gpushare_core::{DecisionView, GpushareError, GpushareResult};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Destination for published decisions
#[async_trait]
pub trait DecisionSink: Send + Sync {
    /// Publish a decision, replacing the previous one
    async fn publish(&self, view: &DecisionView) -> GpushareResult<()>;
}

/// Render a decision as indented JSON with sorted keys
pub fn render_decision(view: &DecisionView) -> GpushareResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    view.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| GpushareError::Serialization(e.to_string()))
}

/// Decision file on local disk
#[derive(Debug, Clone)]
pub struct DecisionFile {
    path: PathBuf,
}

impl DecisionFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the file with `view`
    pub async fn write(&self, view: &DecisionView) -> GpushareResult<()> {
        let content = render_decision(view)?;
        debug!(path = %self.path.display(), content = %content, "Dumping decision");

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, content.as_bytes()))
            .await
            .map_err(|e| GpushareError::Internal(format!("decision writer panicked: {}", e)))??;

        info!(
            path = %self.path.display(),
            version = view.version,
            allocations = view.len(),
            "Decision written"
        );
        Ok(())
    }

    /// Read the last written decision, `None` if the file does not exist
    pub async fn read(&self) -> GpushareResult<Option<DecisionView>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let view = serde_json::from_str(&content)?;
        Ok(Some(view))
    }
}

#[async_trait]
impl DecisionSink for DecisionFile {
    async fn publish(&self, view: &DecisionView) -> GpushareResult<()> {
        self.write(view).await
    }
}

fn replace_file(path: &Path, content: &[u8]) -> GpushareResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        GpushareError::Storage(format!(
            "failed to replace decision file {}: {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}
