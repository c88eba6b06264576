use crate::archive::record::{
    ArtifactKind, FileRecord, IndexRecord, ItemId, PRIMARY_EXTENSION, SUBTITLE_EXTENSION,
};
use crate::archive::scanner::ScanOutcome;
use crate::archive::snapshot::IndexSnapshot;
use crate::archive::warn::{self, WarnEvent};
use crate::error::WarnCode;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SecondaryEvidence {
    #[serde(rename = "Secondary Search Found Result")]
    FoundElsewhere,
    #[serde(rename = "Not Found In Index")]
    NotFoundInIndex,
    #[serde(rename = "Not Found In Filesystem")]
    NotFoundInFilesystem,
    #[serde(rename = "Not Required - Present In Both")]
    NotRequired,
    #[serde(rename = "Secondary Search Failed")]
    CheckFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledItem {
    pub secondary: SecondaryEvidence,
    pub records: Vec<FileRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disk_matches: Vec<PathBuf>,
}

/// Three-way partition of every item id seen on disk or in the index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationResult {
    pub root: PathBuf,
    pub disk_only: BTreeMap<ItemId, ReconciledItem>,
    pub index_only: BTreeMap<ItemId, ReconciledItem>,
    pub both: BTreeMap<ItemId, ReconciledItem>,
    pub rescan_recommended: Vec<ItemId>,
    pub unresolved_files: Vec<String>,
}

impl ReconciliationResult {
    pub fn item_count(&self) -> usize {
        self.disk_only.len() + self.index_only.len() + self.both.len()
    }
}

/// Paths whose text contains the item id anywhere (directory or file name).
pub fn paths_mentioning<'p>(all_paths: &'p [PathBuf], item_id: &ItemId) -> Vec<&'p PathBuf> {
    all_paths
        .iter()
        .filter(|p| p.to_string_lossy().contains(item_id.as_str()))
        .collect()
}

/// Records describing where the index thinks an item lives and where it
/// should live. The owner comes from the index record itself.
pub fn synthesize_records(root: &Path, record: &IndexRecord) -> Vec<FileRecord> {
    let Some(owner) = record.owner_id.as_deref() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if let Some(stored) = &record.stored_path {
        out.push(FileRecord::new(
            root,
            record.item_id.clone(),
            owner,
            ArtifactKind::Primary,
            None,
            PRIMARY_EXTENSION,
            root.join(stored),
        ));
    }
    for (lang, stored) in &record.subtitles {
        out.push(FileRecord::new(
            root,
            record.item_id.clone(),
            owner,
            ArtifactKind::Subtitle,
            Some(lang.clone()),
            SUBTITLE_EXTENSION,
            root.join(stored),
        ));
    }
    out
}

pub fn reconcile(
    root: &Path,
    scan: &ScanOutcome,
    index_records: &BTreeMap<ItemId, IndexRecord>,
    snapshot: &IndexSnapshot<'_>,
) -> ReconciliationResult {
    let disk_ids: BTreeSet<&ItemId> = scan.records.keys().collect();
    let index_ids: BTreeSet<&ItemId> = index_records.keys().collect();

    let mut out = ReconciliationResult {
        root: root.to_path_buf(),
        unresolved_files: scan.unresolved.clone(),
        ..ReconciliationResult::default()
    };

    tracing::info!("comparing filesystem and index results");

    for item_id in disk_ids.difference(&index_ids) {
        let secondary = match snapshot.fetch_one(item_id) {
            Ok(Some(_)) => SecondaryEvidence::FoundElsewhere,
            Ok(None) => SecondaryEvidence::NotFoundInIndex,
            Err(err) => {
                warn::emit(WarnEvent {
                    code: WarnCode::SecondaryCheckFailed,
                    stage: "reconcile",
                    item: item_id.as_str(),
                    path: "",
                    reason: "index-point-lookup-failed",
                    err: &err.to_string(),
                });
                SecondaryEvidence::CheckFailed
            }
        };
        out.disk_only.insert(
            (*item_id).clone(),
            ReconciledItem {
                secondary,
                records: scan.records[*item_id].clone(),
                disk_matches: Vec::new(),
            },
        );
    }

    for item_id in index_ids.difference(&disk_ids) {
        let record = &index_records[*item_id];
        let matches = paths_mentioning(&scan.all_paths, item_id);
        let secondary = if matches.is_empty() {
            out.rescan_recommended.push((*item_id).clone());
            SecondaryEvidence::NotFoundInFilesystem
        } else {
            SecondaryEvidence::FoundElsewhere
        };
        let records = synthesize_records(root, record);
        if records.is_empty() && !matches.is_empty() {
            warn::emit(WarnEvent {
                code: WarnCode::IndexRecordInvalid,
                stage: "reconcile",
                item: item_id.as_str(),
                path: "",
                reason: "index-record-without-owner-or-paths",
                err: "",
            });
        }
        out.index_only.insert(
            (*item_id).clone(),
            ReconciledItem {
                secondary,
                records,
                disk_matches: matches.into_iter().cloned().collect(),
            },
        );
    }

    for item_id in disk_ids.intersection(&index_ids) {
        out.both.insert(
            (*item_id).clone(),
            ReconciledItem {
                secondary: SecondaryEvidence::NotRequired,
                records: scan.records[*item_id].clone(),
                disk_matches: Vec::new(),
            },
        );
    }

    tracing::info!(
        "reconciled {} item(s): {} disk-only, {} index-only, {} in both",
        out.item_count(),
        out.disk_only.len(),
        out.index_only.len(),
        out.both.len()
    );
    out
}
