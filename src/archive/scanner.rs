use crate::archive::classify::classify;
use crate::archive::config::ClassificationMode;
use crate::archive::identity::extract_item_id;
use crate::archive::owner::{OwnerResolver, Resolution};
use crate::archive::record::{FileRecord, ItemId};
use crate::archive::warn::{self, WarnEvent};
use crate::error::{MigrateError, WarnCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Progress callbacks for the filesystem walk. All methods default to no-ops.
pub trait ScanProgress {
    fn on_scan_start(&self, _total_files: usize) {}
    fn on_file(&self, _current: usize, _total: usize, _path: &Path, _item: Option<&ItemId>) {}
    fn on_scan_complete(&self, _outcome: &ScanOutcome) {}
}

/// Progress lines through `tracing`, proportional to the total file count.
pub struct LogProgress;

impl ScanProgress for LogProgress {
    fn on_scan_start(&self, total_files: usize) {
        tracing::info!("processing {total_files} file(s)");
    }

    fn on_file(&self, current: usize, total: usize, path: &Path, item: Option<&ItemId>) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match item {
            Some(item) => {
                tracing::info!("[{current}/{total}] matching file: {name} | item id: {item}")
            }
            None => tracing::debug!("[{current}/{total}] skipping non-candidate file: {name}"),
        }
    }

    fn on_scan_complete(&self, outcome: &ScanOutcome) {
        tracing::info!(
            "scan complete: {} file(s), {} item(s), {} unresolved, {} non-candidate",
            outcome.total_files,
            outcome.records.len(),
            outcome.unresolved.len(),
            outcome.unmatched
        );
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutcome {
    pub records: BTreeMap<ItemId, Vec<FileRecord>>,
    #[serde(skip)]
    pub all_paths: Vec<PathBuf>,
    pub unresolved: Vec<String>,
    pub unmatched: usize,
    pub total_files: usize,
}

fn walk_files(root: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn::emit(WarnEvent {
                    code: WarnCode::WalkFailed,
                    stage: "scan",
                    item: "",
                    path: &err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    reason: "walk-entry-failed",
                    err: &err.to_string(),
                });
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
}

pub fn ensure_root(root: &Path) -> Result<(), MigrateError> {
    let meta = std::fs::metadata(root).map_err(|err| {
        MigrateError::RootUnreadable(format!("{}: {err}", root.display()))
    })?;
    if !meta.is_dir() {
        return Err(MigrateError::RootUnreadable(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    std::fs::read_dir(root)
        .map_err(|err| MigrateError::RootUnreadable(format!("{}: {err}", root.display())))?;
    Ok(())
}

/// Walk `root` once, producing file records for every candidate whose owner
/// resolves, plus the full path list for later secondary-evidence searches.
pub fn scan(
    root: &Path,
    mode: ClassificationMode,
    resolver: &mut OwnerResolver<'_>,
    progress: &dyn ScanProgress,
) -> Result<ScanOutcome, MigrateError> {
    ensure_root(root)?;

    let total = walk_files(root).count();
    progress.on_scan_start(total);

    let mut out = ScanOutcome {
        total_files: total,
        ..ScanOutcome::default()
    };

    for (idx, entry) in walk_files(root).enumerate() {
        let path = entry.into_path();
        out.all_paths.push(path.clone());

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let item = extract_item_id(&filename);
        progress.on_file(idx + 1, total, &path, item.as_ref());

        let Some(item_id) = item else {
            out.unmatched += 1;
            continue;
        };

        let dir = path.parent().unwrap_or(root);
        let owner = match resolver.resolve(&item_id, dir) {
            Resolution::Resolved { owner, source } => {
                tracing::debug!("owner {owner} for {item_id} via {}", source.label());
                owner
            }
            Resolution::Unresolved { reasons } => {
                warn::emit(WarnEvent {
                    code: WarnCode::OwnerUnresolved,
                    stage: "scan",
                    item: item_id.as_str(),
                    path: &filename,
                    reason: &reasons.join("; "),
                    err: "",
                });
                out.unresolved.push(filename);
                continue;
            }
        };

        let class = classify(&path, mode);
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        tracing::debug!("{filename} is of type {}", class.kind.label());

        let record = FileRecord::new(
            root,
            item_id.clone(),
            &owner,
            class.kind,
            class.language,
            &extension,
            path,
        );
        out.records.entry(item_id).or_default().push(record);
    }

    progress.on_scan_complete(&out);
    Ok(out)
}
