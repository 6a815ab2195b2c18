//! Downstream delivery of serialized validation results.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use conform_core::config::PublishConfig;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("publisher configuration error: {0}")]
    Config(String),
}

/// Delivers one JSON document per validation result.
pub trait Publisher: Send + Sync {
    fn publish(&self, message: &str) -> Result<(), PublishError>;
}

/// Blanket implementation so `Arc<dyn Publisher>` can be used directly.
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    fn publish(&self, message: &str) -> Result<(), PublishError> {
        (**self).publish(message)
    }
}

/// Build the publisher described by `PUBLISH_MODE` / `PUBLISH_PATH`.
pub fn publisher_from_config(config: &PublishConfig) -> Result<Box<dyn Publisher>, PublishError> {
    match config.mode.as_str() {
        "log" => Ok(Box::new(LogPublisher)),
        "file" => {
            let path = config.path.as_deref().ok_or_else(|| {
                PublishError::Config("PUBLISH_MODE=file requires PUBLISH_PATH".to_string())
            })?;
            Ok(Box::new(JsonlFilePublisher::open(path)?))
        }
        other => Err(PublishError::Config(format!(
            "unknown publish mode '{other}' (expected 'log' or 'file')"
        ))),
    }
}

// ── Log ─────────────────────────────────────────────────────────────

/// Writes each result to the log at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&self, message: &str) -> Result<(), PublishError> {
        info!(target: "conform::publish", result = %message, "validation result");
        Ok(())
    }
}

// ── JSON lines ──────────────────────────────────────────────────────

/// Appends each result as one line of a file.
#[derive(Debug)]
pub struct JsonlFilePublisher {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlFilePublisher {
    pub fn open(path: &Path) -> Result<Self, PublishError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Publisher for JsonlFilePublisher {
    fn publish(&self, message: &str) -> Result<(), PublishError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // One result per line.
        writeln!(writer, "{}", message.replace('\n', " "))?;
        writer.flush()?;
        Ok(())
    }
}

// ── Collecting ──────────────────────────────────────────────────────

/// Keeps published messages in memory.
#[derive(Debug, Default)]
pub struct CollectingPublisher {
    messages: Mutex<Vec<String>>,
}

impl CollectingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Publisher for CollectingPublisher {
    fn publish(&self, message: &str) -> Result<(), PublishError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
        Ok(())
    }
}
