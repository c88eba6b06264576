use crate::archive::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct JournalEvent<'a> {
    pub at_epoch_secs: u64,
    pub item_id: &'a str,
    pub action: &'a str,
    pub source: &'a str,
    pub target: &'a str,
    pub status: &'a str,
    pub message: &'a str,
}

/// Append-only JSONL record of every mutation attempt. Disabled when no path
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    path: Option<PathBuf>,
}

impl Journal {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(
        &self,
        item_id: &str,
        action: &str,
        source: &str,
        target: &str,
        status: &str,
        message: &str,
    ) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let event = JournalEvent {
            at_epoch_secs: now_epoch_secs()?,
            item_id,
            action,
            source,
            target,
            status,
            message,
        };
        let line = format!("{}\n", serde_json::to_string(&event)?);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
