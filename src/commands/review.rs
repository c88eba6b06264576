use anyhow::{Context, Result};
use std::path::Path;

use crate::archive::config::MigrateConfig;
use crate::archive::owner::{OwnerLookup, OwnerResolver};
use crate::archive::reconcile::{ReconciliationResult, reconcile};
use crate::archive::scanner::{LogProgress, ensure_root, scan};
use crate::archive::snapshot::{IndexSnapshot, IndexStore};
use crate::archive::warn::{self, WarnEvent};
use crate::commands::{CommandReport, write_dump};
use crate::error::WarnCode;
use crate::remote::elastic::ElasticIndex;
use crate::remote::ytdlp::YtDlpLookup;
use std::time::Duration;

/// Live collaborators for one run.
pub struct Backends {
    pub index: ElasticIndex,
    pub lookup: Option<YtDlpLookup>,
}

impl Backends {
    pub fn open(cfg: &MigrateConfig) -> Result<Self> {
        let index = ElasticIndex::new(&cfg.index).context("failed to set up index client")?;
        let lookup = if cfg.lookup.enabled {
            match YtDlpLookup::new(&cfg.lookup) {
                Ok(lookup) => Some(lookup),
                Err(err) => {
                    warn::emit(WarnEvent {
                        code: WarnCode::LookupFailed,
                        stage: "setup",
                        item: "",
                        path: &cfg.lookup.bin,
                        reason: "lookup-binary-unavailable",
                        err: &format!("{err:#}"),
                    });
                    None
                }
            }
        } else {
            tracing::info!("external lookup disabled");
            None
        };
        Ok(Self { index, lookup })
    }

    pub fn lookup(&self) -> Option<&dyn OwnerLookup> {
        self.lookup.as_ref().map(|l| l as &dyn OwnerLookup)
    }
}

/// Scan the archive, pull the index and reconcile the two.
pub fn reconcile_archive(
    cfg: &MigrateConfig,
    index: &dyn IndexStore,
    lookup: Option<&dyn OwnerLookup>,
) -> Result<ReconciliationResult> {
    let root = cfg.archive.source_dir.as_path();
    ensure_root(root)?;

    let snapshot = IndexSnapshot::new(index);
    tracing::info!("pulling all items from index `{}`", cfg.index.name);
    let index_records = snapshot
        .fetch_all()
        .context("failed to read the index")?;

    let mut resolver = OwnerResolver::new(
        lookup,
        snapshot,
        &cfg.archive.marker_file,
        Duration::from_secs(cfg.lookup.delay_secs),
    );
    let outcome = scan(root, cfg.archive.classification, &mut resolver, &LogProgress)?;
    Ok(reconcile(root, &outcome, &index_records, &snapshot))
}

pub fn summarize(report: &mut CommandReport, result: &ReconciliationResult) {
    report.detail(format!("source_dir={}", result.root.display()));
    report.detail(format!("items.disk_only={}", result.disk_only.len()));
    report.detail(format!("items.index_only={}", result.index_only.len()));
    report.detail(format!("items.both={}", result.both.len()));
    report.detail(format!(
        "files.pending_migration={}",
        result
            .both
            .values()
            .chain(result.disk_only.values())
            .flat_map(|item| &item.records)
            .filter(|r| r.needs_migration())
            .count()
    ));
    if !result.unresolved_files.is_empty() {
        report.detail(format!(
            "files.unresolved_owner={}",
            result.unresolved_files.len()
        ));
    }
    if !result.rescan_recommended.is_empty() {
        report.detail(format!(
            "rescan_recommended={}",
            result
                .rescan_recommended
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(",")
        ));
    }
}

pub fn run(cfg: &MigrateConfig, report_path: Option<&Path>) -> Result<CommandReport> {
    let mut report = CommandReport::new("review");
    let backends = Backends::open(cfg)?;
    let result = reconcile_archive(cfg, &backends.index, backends.lookup())?;
    write_dump(&result, report_path)?;
    summarize(&mut report, &result);
    Ok(report)
}
