use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::archive::config::{ConfigOverrides, load_config};
use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(name = "ta-migrate")]
#[command(version)]
#[command(about = "Reconcile a media archive with its search index and migrate files to canonical paths", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ScanArgs {
    /// Archive root (overrides config and TA_SOURCE_DIR)
    #[arg(long, value_name = "DIR")]
    pub source_dir: Option<PathBuf>,
    /// Never call the external metadata lookup
    #[arg(long)]
    pub no_lookup: bool,
    /// Minimum seconds between external lookups
    #[arg(long, value_name = "SECS")]
    pub lookup_delay: Option<u64>,
    /// Classify files by content instead of extension
    #[arg(long)]
    pub guess_types: bool,
    /// Also write the JSON dump to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

impl ScanArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source_dir: self.source_dir.clone(),
            disable_lookup: self.no_lookup,
            lookup_delay_secs: self.lookup_delay,
            guess_types: self.guess_types,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan, reconcile and print the result without changing anything
    Review(ScanArgs),
    /// Reconcile, then move files to canonical paths and patch the index
    Migrate {
        #[command(flatten)]
        scan: ScanArgs,
        /// Plan every action but perform none
        #[arg(long)]
        dry_run: bool,
    },
    /// Check configuration, archive root, index and lookup binary
    Status {
        #[arg(long, value_name = "DIR")]
        source_dir: Option<PathBuf>,
    },
}

fn finish(report: CommandReport) -> Result<()> {
    eprint!("{}", report.render());
    if !report.ok {
        bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let base = load_config()?;
    let report = match &cli.command {
        Command::Review(scan) => {
            let cfg = base.with_overrides(&scan.overrides())?;
            commands::review::run(&cfg, scan.report.as_deref())?
        }
        Command::Migrate { scan, dry_run } => {
            let cfg = base.with_overrides(&scan.overrides())?;
            commands::migrate::run(
                &cfg,
                &commands::migrate::MigrateOptions {
                    dry_run: *dry_run,
                    report_path: scan.report.clone(),
                },
            )?
        }
        Command::Status { source_dir } => {
            let cfg = base.with_overrides(&ConfigOverrides {
                source_dir: source_dir.clone(),
                ..ConfigOverrides::default()
            })?;
            commands::status::run(&cfg)?
        }
    };
    finish(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_flags_parse() {
        let cli = Cli::try_parse_from([
            "ta-migrate",
            "--debug",
            "migrate",
            "--dry-run",
            "--no-lookup",
            "--source-dir",
            "/srv/youtube",
            "--lookup-delay",
            "0",
        ])
        .expect("parse");
        assert!(cli.debug);
        let Command::Migrate { scan, dry_run } = cli.command else {
            panic!("expected migrate");
        };
        assert!(dry_run);
        let overrides = scan.overrides();
        assert!(overrides.disable_lookup);
        assert_eq!(overrides.lookup_delay_secs, Some(0));
        assert_eq!(overrides.source_dir, Some(PathBuf::from("/srv/youtube")));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["ta-migrate"]).is_err());
    }
}
