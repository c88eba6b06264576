use crate::archive::config::LookupConfig;
use crate::archive::owner::OwnerLookup;
use crate::archive::record::ItemId;
use crate::archive::util::run_command_with_optional_timeout;
use crate::error::MigrateError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Owner lookup backed by `yt-dlp --print channel_id`.
pub struct YtDlpLookup {
    bin: PathBuf,
    timeout_secs: u64,
    url_prefix: String,
}

pub fn resolve_bin(configured: &str) -> Result<PathBuf> {
    let path = Path::new(configured);
    if path.components().count() > 1 {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("lookup binary {} does not exist", path.display());
    }
    which::which(configured).with_context(|| format!("{configured} not found in PATH"))
}

fn parse_channel_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "NA")
        .last()
        .map(ToOwned::to_owned)
}

fn is_missing_item(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    ["unavailable", "private", "removed", "does not exist"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

impl YtDlpLookup {
    pub fn new(cfg: &LookupConfig) -> Result<Self> {
        Ok(Self {
            bin: resolve_bin(&cfg.bin)?,
            timeout_secs: cfg.timeout_secs,
            url_prefix: cfg.video_url_prefix.clone(),
        })
    }
}

impl OwnerLookup for YtDlpLookup {
    fn lookup_owner(&self, item_id: &ItemId) -> Result<Option<String>, MigrateError> {
        let url = format!("{}{}", self.url_prefix, item_id);
        tracing::info!("looking up owner for {item_id} via {}", self.bin.display());
        let mut cmd = Command::new(&self.bin);
        cmd.arg("--skip-download")
            .arg("--no-warnings")
            .arg("--print")
            .arg("channel_id")
            .arg(&url);
        let output = run_command_with_optional_timeout(&mut cmd, Some(self.timeout_secs))
            .map_err(|err| MigrateError::LookupTransport {
                item_id: item_id.to_string(),
                reason: format!("{err:#}"),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if is_missing_item(&stderr) {
                tracing::debug!("{item_id} is not available upstream: {}", stderr.trim());
                return Ok(None);
            }
            return Err(MigrateError::LookupTransport {
                item_id: item_id.to_string(),
                reason: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(parse_channel_id(&String::from_utf8_lossy(&output.stdout)))
    }
}
