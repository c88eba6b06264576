use anyhow::Result;
use serde_json::Value;

use crate::archive::config::{MigrateConfig, resolve_config_path, unknown_env_keys};
use crate::archive::scanner::ensure_root;
use crate::commands::CommandReport;
use crate::remote::elastic::ElasticIndex;
use crate::remote::ytdlp::resolve_bin;

fn cluster_version(banner: &Value) -> &str {
    banner
        .get("version")
        .and_then(|v| v.get("number"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}

pub fn run(cfg: &MigrateConfig) -> Result<CommandReport> {
    let mut report = CommandReport::new("status");

    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config={}", path.display())),
        Some(path) => report.detail(format!("config={} (absent, defaults)", path.display())),
        None => report.detail("config=defaults"),
    }

    let root = &cfg.archive.source_dir;
    match ensure_root(root) {
        Ok(()) => report.detail(format!("source_dir={} ok", root.display())),
        Err(err) => report.issue(format!("source_dir: {err}")),
    }
    report.detail(format!("classification={:?}", cfg.archive.classification).to_lowercase());

    match ElasticIndex::new(&cfg.index).and_then(|index| index.ping()) {
        Ok(banner) => report.detail(format!(
            "index={} ok (version {}, index `{}`)",
            cfg.index.url,
            cluster_version(&banner),
            cfg.index.name
        )),
        Err(err) => report.issue(format!("index: {err}")),
    }

    if cfg.lookup.enabled {
        match resolve_bin(&cfg.lookup.bin) {
            Ok(bin) => report.detail(format!(
                "lookup={} (min delay {}s)",
                bin.display(),
                cfg.lookup.delay_secs
            )),
            Err(err) => report.issue(format!("lookup: {err:#}")),
        }
    } else {
        report.detail("lookup=disabled");
    }

    report.detail(format!(
        "pre_migration_delay={}s",
        cfg.migration.pre_migration_delay_secs
    ));
    if let Some(path) = &cfg.migration.journal_path {
        report.detail(format!("journal={}", path.display()));
    }

    for key in unknown_env_keys() {
        report.issue(format!("unknown environment variable {key}"));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_read_from_banner() {
        assert_eq!(
            cluster_version(&json!({"version": {"number": "8.14.1"}})),
            "8.14.1"
        );
        assert_eq!(cluster_version(&json!({})), "unknown");
    }
}
