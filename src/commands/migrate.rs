use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::archive::audit::Journal;
use crate::archive::config::MigrateConfig;
use crate::archive::migrate::{MigrationAction, MigrationExecutor, MigrationReport};
use crate::archive::reconcile::ReconciliationResult;
use crate::archive::snapshot::IndexSnapshot;
use crate::commands::review::{Backends, reconcile_archive, summarize};
use crate::commands::{CommandReport, write_dump};

#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    pub dry_run: bool,
    pub report_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct MigrateDump<'a> {
    reconciliation: &'a ReconciliationResult,
    migration: &'a MigrationReport,
}

pub fn run(cfg: &MigrateConfig, opts: &MigrateOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new(if opts.dry_run {
        "migrate (dry run)"
    } else {
        "migrate"
    });
    let backends = Backends::open(cfg)?;
    let mut result = reconcile_archive(cfg, &backends.index, backends.lookup())?;

    let delay = cfg.migration.pre_migration_delay_secs;
    if !opts.dry_run && delay > 0 {
        tracing::warn!("starting live migration in {delay}s; interrupt now to abort");
        thread::sleep(Duration::from_secs(delay));
    }

    let journal = Journal::new(cfg.migration.journal_path.clone());
    let executor = MigrationExecutor::new(
        IndexSnapshot::new(&backends.index),
        cfg.archive.classification,
        &journal,
        opts.dry_run,
    );
    let migration = executor.migrate(&mut result);

    write_dump(
        &MigrateDump {
            reconciliation: &result,
            migration: &migration,
        },
        opts.report_path.as_deref(),
    )?;

    summarize(&mut report, &result);
    if opts.dry_run {
        let planned = migration
            .outcomes
            .iter()
            .filter(|o| matches!(o.action, MigrationAction::Planned { .. }))
            .count();
        report.detail(format!("planned={planned}"));
    } else {
        report.detail(format!("moved={}", migration.moves));
        report.detail(format!("index_patched={}", migration.patches));
    }
    report.detail(format!("unchanged={}", migration.noops));
    report.detail(format!("skipped={}", migration.skipped));
    if let Some(path) = journal.path() {
        report.detail(format!("journal={}", path.display()));
    }
    if migration.partial_writes > 0 {
        report.detail(format!(
            "index_partial_writes={} (not every shard acknowledged)",
            migration.partial_writes
        ));
    }
    if migration.failures > 0 {
        report.issue(format!(
            "{} file or index operation(s) failed; see TA_WARN lines",
            migration.failures
        ));
    }
    Ok(report)
}
