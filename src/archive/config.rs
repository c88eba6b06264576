use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

include!(concat!(env!("OUT_DIR"), "/ta_env_allowlist.rs"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    #[default]
    Extension,
    Sniff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub source_dir: PathBuf,
    pub marker_file: String,
    #[serde(default)]
    pub classification: ClassificationMode,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("/youtube"),
            marker_file: "channel.id".to_string(),
            classification: ClassificationMode::Extension,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub enabled: bool,
    pub delay_secs: u64,
    pub bin: String,
    pub timeout_secs: u64,
    pub video_url_prefix: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: 3,
            bin: "yt-dlp".to_string(),
            timeout_secs: 120,
            video_url_prefix: "https://www.youtube.com/watch?v=".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub url: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub name: String,
    pub page_size: u64,
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://archivist-es:9200".to_string(),
            user: "elastic".to_string(),
            password: None,
            name: "ta_video".to_string(),
            page_size: 500,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub pre_migration_delay_secs: u64,
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            pre_migration_delay_secs: 10,
            journal_path: None,
        }
    }
}

/// Immutable run configuration handed to every component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrateConfig {
    pub archive: ArchiveConfig,
    pub lookup: LookupConfig,
    pub index: IndexConfig,
    pub migration: MigrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialMigrateConfig {
    archive: Option<ArchiveConfig>,
    lookup: Option<LookupConfig>,
    index: Option<IndexConfig>,
    migration: Option<MigrationConfig>,
}

/// Command-line overrides applied after file and environment layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_dir: Option<PathBuf>,
    pub disable_lookup: bool,
    pub lookup_delay_secs: Option<u64>,
    pub guess_types: bool,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn validate(cfg: &MigrateConfig) -> Result<()> {
    if cfg.archive.source_dir.as_os_str().is_empty() {
        return Err(anyhow!("invalid source dir: cannot be empty"));
    }
    let marker = cfg.archive.marker_file.trim();
    if marker.is_empty() || marker.contains('/') {
        return Err(anyhow!(
            "invalid marker file name: must be a bare file name"
        ));
    }
    if cfg.lookup.enabled && cfg.lookup.bin.trim().is_empty() {
        return Err(anyhow!("invalid lookup bin: cannot be empty when lookups are enabled"));
    }
    if cfg.lookup.timeout_secs == 0 {
        return Err(anyhow!("invalid lookup timeout: must be >= 1 second"));
    }
    if cfg.index.url.trim().is_empty() {
        return Err(anyhow!("invalid index url: cannot be empty"));
    }
    if cfg.index.name.trim().is_empty() {
        return Err(anyhow!("invalid index name: cannot be empty"));
    }
    if cfg.index.page_size == 0 || cfg.index.page_size > 10_000 {
        return Err(anyhow!("invalid index page size: require 1 <= page_size <= 10000"));
    }
    if cfg.index.timeout_secs == 0 {
        return Err(anyhow!("invalid index timeout: must be >= 1 second"));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("TA_MIGRATE_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let config_dir = dirs::config_dir()?;
    Some(config_dir.join("ta-migrate").join("config.toml"))
}

fn merge_file_config(base: &mut MigrateConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialMigrateConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(archive) = parsed.archive {
        base.archive = archive;
    }
    if let Some(lookup) = parsed.lookup {
        base.lookup = lookup;
    }
    if let Some(index) = parsed.index {
        base.index = index;
    }
    if let Some(migration) = parsed.migration {
        base.migration = migration;
    }
    Ok(())
}

fn merge_env(cfg: &mut MigrateConfig) {
    if let Some(dir) = env_non_empty("TA_SOURCE_DIR") {
        cfg.archive.source_dir = PathBuf::from(dir);
    }
    cfg.archive.marker_file = env_or_string("TA_MARKER_FILE", &cfg.archive.marker_file);
    if env_or_bool("TA_GUESS_TYPES", false) {
        cfg.archive.classification = ClassificationMode::Sniff;
    }

    cfg.lookup.enabled = env_or_bool("TA_USE_LOOKUP", cfg.lookup.enabled);
    cfg.lookup.delay_secs = env_or_u64("TA_LOOKUP_DELAY_SECS", cfg.lookup.delay_secs);
    cfg.lookup.bin = env_or_string("TA_LOOKUP_BIN", &cfg.lookup.bin);
    cfg.lookup.timeout_secs = env_or_u64("TA_LOOKUP_TIMEOUT_SECS", cfg.lookup.timeout_secs);

    cfg.index.url = env_or_string("ES_URL", &cfg.index.url);
    cfg.index.user = env_or_string("ELASTIC_USER", &cfg.index.user);
    if let Some(password) = env_non_empty("ELASTIC_PASSWORD") {
        cfg.index.password = Some(password);
    }
    cfg.index.name = env_or_string("TA_INDEX_NAME", &cfg.index.name);
    cfg.index.page_size = env_or_u64("TA_INDEX_PAGE_SIZE", cfg.index.page_size);
    cfg.index.timeout_secs = env_or_u64("TA_INDEX_TIMEOUT_SECS", cfg.index.timeout_secs);

    cfg.migration.pre_migration_delay_secs = env_or_u64(
        "TA_MIGRATION_DELAY_SECS",
        cfg.migration.pre_migration_delay_secs,
    );
    if let Some(journal) = env_non_empty("TA_JOURNAL_PATH") {
        cfg.migration.journal_path = Some(PathBuf::from(journal));
    }
}

impl MigrateConfig {
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        if let Some(dir) = &overrides.source_dir {
            self.archive.source_dir = dir.clone();
        }
        if overrides.disable_lookup {
            self.lookup.enabled = false;
        }
        if let Some(delay) = overrides.lookup_delay_secs {
            self.lookup.delay_secs = delay;
        }
        if overrides.guess_types {
            self.archive.classification = ClassificationMode::Sniff;
        }
        validate(&self)?;
        Ok(self)
    }
}

pub fn load_config() -> Result<MigrateConfig> {
    let mut cfg = MigrateConfig::default();
    merge_file_config(&mut cfg)?;
    merge_env(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

/// `TA_*` variables present in the environment that nothing in this binary
/// reads; usually a typo in a compose file.
pub fn unknown_env_keys() -> Vec<String> {
    let mut out = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("TA_"))
        .filter(|key| !GENERATED_TA_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect::<Vec<_>>();
    out.sort();
    out
}
