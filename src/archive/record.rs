use crate::error::MigrateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ITEM_ID_LEN: usize = 11;
pub const PRIMARY_EXTENSION: &str = "mp4";
pub const SUBTITLE_EXTENSION: &str = "vtt";

/// Fixed-format media item identifier, the join key between disk and index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    pub fn parse(raw: &str) -> Result<Self, MigrateError> {
        let valid = raw.len() == ITEM_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(MigrateError::InvalidItemId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemId {
    type Error = MigrateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    #[serde(rename = "video")]
    Primary,
    #[serde(rename = "subtitle")]
    Subtitle,
    #[serde(rename = "other")]
    Other,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Primary => "video",
            Self::Subtitle => "subtitle",
            Self::Other => "other",
        }
    }
}

/// One physical file discovered on disk (or synthesised from the index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub item_id: ItemId,
    pub owner_id: String,
    pub kind: ArtifactKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub extension: String,
    pub current_path: PathBuf,
    pub expected_path: PathBuf,
}

impl FileRecord {
    pub fn new(
        root: &Path,
        item_id: ItemId,
        owner_id: &str,
        kind: ArtifactKind,
        language: Option<String>,
        extension: &str,
        current_path: PathBuf,
    ) -> Self {
        let expected_path =
            canonical_path(root, owner_id, &item_id, kind, language.as_deref(), extension);
        Self {
            item_id,
            owner_id: owner_id.to_string(),
            kind,
            language,
            extension: extension.to_string(),
            current_path,
            expected_path,
        }
    }

    pub fn needs_migration(&self) -> bool {
        self.current_path != self.expected_path
    }

    /// Point a synthesised record at a file found on disk. The target keeps
    /// the evidence file's own extension.
    pub fn adopt_evidence(&mut self, root: &Path, path: &Path) {
        if let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_string())
            && ext != self.extension
        {
            self.expected_path = canonical_path(
                root,
                &self.owner_id,
                &self.item_id,
                self.kind,
                self.language.as_deref(),
                &ext,
            );
            self.extension = ext;
        }
        self.current_path = path.to_path_buf();
    }
}

/// Canonical location: `root/owner/item[.language][.ext]`.
pub fn canonical_path(
    root: &Path,
    owner_id: &str,
    item_id: &ItemId,
    kind: ArtifactKind,
    language: Option<&str>,
    extension: &str,
) -> PathBuf {
    let mut name = item_id.as_str().to_string();
    if kind == ArtifactKind::Subtitle
        && let Some(lang) = language.filter(|l| !l.is_empty())
    {
        name.push('.');
        name.push_str(lang);
    }
    let ext = extension.trim_start_matches('.');
    if !ext.is_empty() {
        name.push('.');
        name.push_str(ext);
    }
    root.join(owner_id).join(name)
}

/// Path as stored in the index: relative to the archive root, `/` separated.
pub fn index_relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// One logical item as known to the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub item_id: ItemId,
    pub owner_id: Option<String>,
    pub stored_path: Option<String>,
    pub subtitles: BTreeMap<String, String>,
}

impl IndexRecord {
    /// Build from an index document `_source`, falling back to `doc_id` when
    /// the source carries no `youtube_id`.
    pub fn from_source(doc_id: &str, source: &Value) -> Result<Self, MigrateError> {
        let raw_id = source
            .get("youtube_id")
            .and_then(Value::as_str)
            .unwrap_or(doc_id);
        let item_id = ItemId::parse(raw_id)?;
        let owner_id = source
            .get("channel")
            .and_then(|c| c.get("channel_id"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);
        let stored_path = source
            .get("media_url")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        let mut subtitles = BTreeMap::new();
        for sub in source
            .get("subtitles")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let (Some(lang), Some(url)) = (
                sub.get("lang").and_then(Value::as_str),
                sub.get("media_url").and_then(Value::as_str),
            ) else {
                continue;
            };
            subtitles.insert(lang.to_string(), url.to_string());
        }

        Ok(Self {
            item_id,
            owner_id,
            stored_path,
            subtitles,
        })
    }
}
