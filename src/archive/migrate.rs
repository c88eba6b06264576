use crate::archive::audit::Journal;
use crate::archive::classify::{Classification, classify};
use crate::archive::config::ClassificationMode;
use crate::archive::fsops::{self, MoveResult};
use crate::archive::reconcile::{ReconciliationResult, SecondaryEvidence};
use crate::archive::record::{ArtifactKind, FileRecord, ItemId, index_relative_path};
use crate::archive::snapshot::IndexSnapshot;
use crate::archive::warn::{self, WarnEvent};
use crate::error::{MigrateError, WarnCode};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexPatchStatus {
    Applied,
    AlreadyCurrent,
    Partial { successful: u64, total: u64 },
    Failed { reason: String },
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MigrationAction {
    NoOp,
    Planned { patch: Option<Value> },
    Moved { index: IndexPatchStatus },
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationOutcome {
    pub item_id: ItemId,
    pub source: PathBuf,
    pub target: PathBuf,
    pub kind: ArtifactKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub action: MigrationAction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub outcomes: Vec<MigrationOutcome>,
    pub rescan_recommended: Vec<ItemId>,
    pub moves: usize,
    pub patches: usize,
    pub partial_writes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub noops: usize,
}

impl MigrationReport {
    fn push(&mut self, outcome: MigrationOutcome) {
        match &outcome.action {
            MigrationAction::NoOp => self.noops += 1,
            MigrationAction::Planned { .. } => {}
            MigrationAction::Moved { index } => {
                self.moves += 1;
                match index {
                    IndexPatchStatus::Applied => self.patches += 1,
                    IndexPatchStatus::Partial { .. } => {
                        self.patches += 1;
                        self.partial_writes += 1;
                    }
                    IndexPatchStatus::Failed { .. } => self.failures += 1,
                    IndexPatchStatus::AlreadyCurrent | IndexPatchStatus::NotApplicable => {}
                }
            }
            MigrationAction::Skipped { .. } => self.skipped += 1,
            MigrationAction::Failed { .. } => self.failures += 1,
        }
        self.outcomes.push(outcome);
    }
}

enum PatchPlan {
    Send(Value),
    AlreadyCurrent,
    Unavailable(String),
}

/// Lazily fetched `_source` of one document. Successful patches are applied
/// to the cached copy so later patches for the same item never build on a
/// stale read.
#[derive(Default)]
struct ItemDocument {
    loaded: Option<Option<Value>>,
}

impl ItemDocument {
    fn get(
        &mut self,
        index: &IndexSnapshot<'_>,
        item_id: &ItemId,
    ) -> Result<Option<&mut Value>, MigrateError> {
        if self.loaded.is_none() {
            self.loaded = Some(index.fetch_source(item_id)?);
        }
        Ok(self.loaded.as_mut().and_then(Option::as_mut))
    }

    fn apply(&mut self, patch: &Value) {
        let (Some(Some(Value::Object(doc))), Some(Value::Object(fields))) =
            (self.loaded.as_mut(), patch.get("doc"))
        else {
            return;
        };
        for (key, value) in fields {
            doc.insert(key.clone(), value.clone());
        }
    }
}

fn plan_patch(
    root: &Path,
    record: &FileRecord,
    doc: &mut ItemDocument,
    index: &IndexSnapshot<'_>,
) -> Result<PatchPlan, MigrateError> {
    let rel = index_relative_path(root, &record.expected_path);
    let Some(source) = doc.get(index, &record.item_id)? else {
        return Ok(PatchPlan::Unavailable("document not found".to_string()));
    };

    match record.kind {
        ArtifactKind::Primary => {
            if source.get("media_url").and_then(Value::as_str) == Some(rel.as_str()) {
                return Ok(PatchPlan::AlreadyCurrent);
            }
            Ok(PatchPlan::Send(json!({ "doc": { "media_url": rel } })))
        }
        ArtifactKind::Subtitle => {
            let lang = record.language.as_deref().unwrap_or_default();
            let mut subtitles = source
                .get("subtitles")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let Some(entry) = subtitles
                .iter_mut()
                .find(|s| s.get("lang").and_then(Value::as_str) == Some(lang))
            else {
                return Ok(PatchPlan::Unavailable(format!(
                    "no subtitle entry for language `{lang}`"
                )));
            };
            if entry.get("media_url").and_then(Value::as_str) == Some(rel.as_str()) {
                return Ok(PatchPlan::AlreadyCurrent);
            }
            if let Some(obj) = entry.as_object_mut() {
                obj.insert("media_url".to_string(), Value::String(rel));
            }
            Ok(PatchPlan::Send(json!({ "doc": { "subtitles": subtitles } })))
        }
        ArtifactKind::Other => Ok(PatchPlan::Unavailable(
            "no index field for other artifacts".to_string(),
        )),
    }
}

fn evidence_slot(records: &[FileRecord], class: &Classification) -> Option<usize> {
    records.iter().position(|r| {
        r.kind == class.kind && (r.kind != ArtifactKind::Subtitle || r.language == class.language)
    })
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

pub struct MigrationExecutor<'a> {
    index: IndexSnapshot<'a>,
    mode: ClassificationMode,
    journal: &'a Journal,
    dry_run: bool,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(
        index: IndexSnapshot<'a>,
        mode: ClassificationMode,
        journal: &'a Journal,
        dry_run: bool,
    ) -> Self {
        Self {
            index,
            mode,
            journal,
            dry_run,
        }
    }

    fn prefix(&self) -> &'static str {
        if self.dry_run { "DRY_RUN: " } else { "" }
    }

    fn journal(&self, record: &FileRecord, action: &str, status: &str, message: &str) -> bool {
        let result = self.journal.append(
            record.item_id.as_str(),
            action,
            &display(&record.current_path),
            &display(&record.expected_path),
            status,
            message,
        );
        match result {
            Ok(()) => true,
            Err(err) => {
                warn::emit(WarnEvent {
                    code: WarnCode::JournalWriteFailed,
                    stage: "migrate",
                    item: record.item_id.as_str(),
                    path: &display(&record.current_path),
                    reason: "journal-append-failed",
                    err: &format!("{err:#}"),
                });
                false
            }
        }
    }

    pub fn migrate(&self, result: &mut ReconciliationResult) -> MigrationReport {
        let mut report = MigrationReport {
            dry_run: self.dry_run,
            rescan_recommended: result.rescan_recommended.clone(),
            ..MigrationReport::default()
        };
        let root = result.root.clone();

        for item in result.both.values_mut() {
            let mut doc = ItemDocument::default();
            for record in &mut item.records {
                report.push(self.migrate_record(&root, record, &mut doc, true));
            }
        }

        for (item_id, item) in result.disk_only.iter_mut() {
            if item.secondary == SecondaryEvidence::CheckFailed {
                warn::emit(WarnEvent {
                    code: WarnCode::SecondaryCheckFailed,
                    stage: "migrate",
                    item: item_id.as_str(),
                    path: "",
                    reason: "index-state-unknown",
                    err: "",
                });
                for record in &item.records {
                    report.push(MigrationOutcome {
                        item_id: record.item_id.clone(),
                        source: record.current_path.clone(),
                        target: record.expected_path.clone(),
                        kind: record.kind,
                        language: record.language.clone(),
                        action: MigrationAction::Skipped {
                            reason: "index point lookup failed; index state unknown".to_string(),
                        },
                    });
                }
                continue;
            }
            let patch_index = item.secondary == SecondaryEvidence::FoundElsewhere;
            if !patch_index {
                tracing::info!(
                    "{}{item_id} is not in the index; files are moved without an index update",
                    self.prefix()
                );
            }
            let mut doc = ItemDocument::default();
            for record in &mut item.records {
                report.push(self.migrate_record(&root, record, &mut doc, patch_index));
            }
        }

        for (item_id, item) in result.index_only.iter_mut() {
            if item.secondary != SecondaryEvidence::FoundElsewhere {
                tracing::info!(
                    "{}{item_id} has no file on disk; recommending a rescan",
                    self.prefix()
                );
                continue;
            }
            let mut doc = ItemDocument::default();
            for matched in &mut item.disk_matches {
                let class = classify(matched, self.mode);
                let outcome = match evidence_slot(&item.records, &class) {
                    Some(slot) => {
                        let record = &mut item.records[slot];
                        record.adopt_evidence(&root, matched);
                        let outcome = self.migrate_record(&root, record, &mut doc, true);
                        *matched = record.current_path.clone();
                        outcome
                    }
                    None => self.unpaired(item_id, matched, &class, item.records.is_empty()),
                };
                report.push(outcome);
            }
        }

        tracing::info!(
            "{}migration finished: {} moved, {} patched, {} partial, {} failed, {} skipped, {} unchanged",
            self.prefix(),
            report.moves,
            report.patches,
            report.partial_writes,
            report.failures,
            report.skipped,
            report.noops
        );
        report
    }

    fn unpaired(
        &self,
        item_id: &ItemId,
        path: &Path,
        class: &Classification,
        no_records: bool,
    ) -> MigrationOutcome {
        let reason = if no_records {
            "index record has no owner to derive a target from".to_string()
        } else if class.kind == ArtifactKind::Other {
            "no index field for other artifacts".to_string()
        } else {
            warn::emit(WarnEvent {
                code: WarnCode::KindMismatch,
                stage: "migrate",
                item: item_id.as_str(),
                path: &display(path),
                reason: "disk-evidence-kind-not-in-index",
                err: class.kind.label(),
            });
            format!(
                "disk file is {} but the index has no matching entry",
                class.kind.label()
            )
        };
        MigrationOutcome {
            item_id: item_id.clone(),
            source: path.to_path_buf(),
            target: path.to_path_buf(),
            kind: class.kind,
            language: class.language.clone(),
            action: MigrationAction::Skipped { reason },
        }
    }

    fn migrate_record(
        &self,
        root: &Path,
        record: &mut FileRecord,
        doc: &mut ItemDocument,
        patch_index: bool,
    ) -> MigrationOutcome {
        let source = record.current_path.clone();
        let action = self.record_action(root, record, doc, patch_index);
        MigrationOutcome {
            item_id: record.item_id.clone(),
            source,
            target: record.expected_path.clone(),
            kind: record.kind,
            language: record.language.clone(),
            action,
        }
    }

    fn record_action(
        &self,
        root: &Path,
        record: &mut FileRecord,
        doc: &mut ItemDocument,
        patch_index: bool,
    ) -> MigrationAction {
        if record.kind == ArtifactKind::Other {
            tracing::debug!(
                "{}skipping other artifact {}",
                self.prefix(),
                record.current_path.display()
            );
            return MigrationAction::Skipped {
                reason: "no index field for other artifacts".to_string(),
            };
        }
        if !record.needs_migration() {
            tracing::info!(
                "{}No migration necessary for `{}`",
                self.prefix(),
                record.current_path.display()
            );
            return MigrationAction::NoOp;
        }

        if self.dry_run {
            tracing::info!(
                "DRY_RUN: moving {} -> {}",
                record.current_path.display(),
                record.expected_path.display()
            );
            let patch = if patch_index {
                self.dry_run_patch(root, record, doc)
            } else {
                None
            };
            return MigrationAction::Planned { patch };
        }

        let already_moved = !record.current_path.exists() && record.expected_path.exists();
        if already_moved {
            tracing::info!(
                "{} already at {}",
                record.item_id,
                record.expected_path.display()
            );
        } else if let Err(reason) = self.move_record(record) {
            return reason;
        }
        record.current_path = record.expected_path.clone();

        let index = if patch_index {
            self.apply_patch(root, record, doc)
        } else {
            IndexPatchStatus::NotApplicable
        };
        MigrationAction::Moved { index }
    }

    fn move_record(&self, record: &FileRecord) -> Result<(), MigrationAction> {
        if !record.current_path.exists() {
            return Err(MigrationAction::Failed {
                reason: format!("source {} does not exist", record.current_path.display()),
            });
        }
        if !self.journal(record, "move", "attempt", "") {
            return Err(MigrationAction::Skipped {
                reason: "mutation journal unavailable".to_string(),
            });
        }

        let template = record.current_path.parent().unwrap_or(Path::new("."));
        if let Some(target_dir) = record.expected_path.parent()
            && let Err(err) = fsops::prep_directory(target_dir, template)
        {
            let err = format!("{err:#}");
            warn::emit(WarnEvent {
                code: WarnCode::DirectoryPrepFailed,
                stage: "migrate",
                item: record.item_id.as_str(),
                path: &display(target_dir),
                reason: "create-or-chown-failed",
                err: &err,
            });
            self.journal(record, "move", "skipped", &err);
            return Err(MigrationAction::Skipped { reason: err });
        }

        tracing::info!(
            "moving {} -> {}",
            record.current_path.display(),
            record.expected_path.display()
        );
        match fsops::move_file(&record.current_path, &record.expected_path) {
            Ok(how) => {
                let note = match how {
                    MoveResult::Renamed => "renamed",
                    MoveResult::Copied => "copied across devices",
                    MoveResult::Deduplicated => "identical destination, source removed",
                };
                self.journal(record, "move", "ok", note);
                Ok(())
            }
            Err(err) => {
                let err = format!("{err:#}");
                warn::emit(WarnEvent {
                    code: WarnCode::MoveFailed,
                    stage: "migrate",
                    item: record.item_id.as_str(),
                    path: &display(&record.current_path),
                    reason: "move-failed",
                    err: &err,
                });
                self.journal(record, "move", "failed", &err);
                Err(MigrationAction::Failed { reason: err })
            }
        }
    }

    fn dry_run_patch(
        &self,
        root: &Path,
        record: &FileRecord,
        doc: &mut ItemDocument,
    ) -> Option<Value> {
        match plan_patch(root, record, doc, &self.index) {
            Ok(PatchPlan::Send(patch)) => {
                tracing::info!("DRY_RUN: updating index for {} with {patch}", record.item_id);
                doc.apply(&patch);
                Some(patch)
            }
            Ok(PatchPlan::AlreadyCurrent) => {
                tracing::info!("DRY_RUN: index already current for {}", record.item_id);
                None
            }
            Ok(PatchPlan::Unavailable(reason)) => {
                tracing::info!(
                    "DRY_RUN: no index update for {}: {reason}",
                    record.item_id
                );
                None
            }
            Err(err) => {
                tracing::info!(
                    "DRY_RUN: could not plan index update for {}: {err}",
                    record.item_id
                );
                None
            }
        }
    }

    fn apply_patch(
        &self,
        root: &Path,
        record: &FileRecord,
        doc: &mut ItemDocument,
    ) -> IndexPatchStatus {
        let failed = |err: &str, code: WarnCode| {
            warn::emit(WarnEvent {
                code,
                stage: "migrate",
                item: record.item_id.as_str(),
                path: &display(&record.expected_path),
                reason: "index-update-failed",
                err,
            });
            IndexPatchStatus::Failed {
                reason: err.to_string(),
            }
        };

        let patch = match plan_patch(root, record, doc, &self.index) {
            Ok(PatchPlan::Send(patch)) => patch,
            Ok(PatchPlan::AlreadyCurrent) => {
                tracing::info!("index already current for {}", record.item_id);
                return IndexPatchStatus::AlreadyCurrent;
            }
            Ok(PatchPlan::Unavailable(reason)) => {
                let code = if record.kind == ArtifactKind::Subtitle {
                    WarnCode::SubtitleEntryMissing
                } else {
                    WarnCode::IndexWriteFailed
                };
                return failed(&reason, code);
            }
            Err(err) => return failed(&err.to_string(), WarnCode::IndexWriteFailed),
        };

        if !self.journal(record, "index-update", "attempt", &patch.to_string()) {
            return IndexPatchStatus::Failed {
                reason: "mutation journal unavailable".to_string(),
            };
        }
        tracing::info!("updating index for {}", record.item_id);
        match self.index.store().update(&record.item_id, &patch) {
            Ok(ack) => {
                doc.apply(&patch);
                if ack.fully_propagated() {
                    self.journal(record, "index-update", "ok", "");
                    IndexPatchStatus::Applied
                } else {
                    warn::emit(WarnEvent {
                        code: WarnCode::IndexPartialWrite,
                        stage: "migrate",
                        item: record.item_id.as_str(),
                        path: &display(&record.expected_path),
                        reason: "shard-acknowledgment-incomplete",
                        err: &format!("{}/{}", ack.shards_successful, ack.shards_total),
                    });
                    self.journal(record, "index-update", "partial", "");
                    IndexPatchStatus::Partial {
                        successful: ack.shards_successful,
                        total: ack.shards_total,
                    }
                }
            }
            Err(err) => {
                let err = err.to_string();
                self.journal(record, "index-update", "failed", &err);
                failed(&err, WarnCode::IndexWriteFailed)
            }
        }
    }
}
