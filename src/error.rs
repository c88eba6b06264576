use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("archive root unreadable: {0}")]
    RootUnreadable(String),
    #[error("index unreachable during {context}: {reason}")]
    IndexTransport { context: String, reason: String },
    #[error("index returned status {status} during {context}")]
    IndexStatus { context: String, status: u16 },
    #[error("index response malformed during {context}: {reason}")]
    IndexResponse { context: String, reason: String },
    #[error("metadata lookup failed for {item_id}: {reason}")]
    LookupTransport { item_id: String, reason: String },
    #[error("invalid item id `{0}`")]
    InvalidItemId(String),
}

impl MigrateError {
    pub fn index_transport(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::IndexTransport {
            context: context.into(),
            reason: err.to_string(),
        }
    }

    pub fn index_response(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IndexResponse {
            context: context.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnCode {
    OwnerUnresolved,
    LookupFailed,
    MarkerUnreadable,
    ClassifyFailed,
    WalkFailed,
    SecondaryCheckFailed,
    IndexRecordInvalid,
    KindMismatch,
    DirectoryPrepFailed,
    MoveFailed,
    IndexWriteFailed,
    IndexPartialWrite,
    SubtitleEntryMissing,
    JournalWriteFailed,
}

impl WarnCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OwnerUnresolved => "OWNER_UNRESOLVED",
            Self::LookupFailed => "LOOKUP_FAILED",
            Self::MarkerUnreadable => "MARKER_UNREADABLE",
            Self::ClassifyFailed => "CLASSIFY_FAILED",
            Self::WalkFailed => "WALK_FAILED",
            Self::SecondaryCheckFailed => "SECONDARY_CHECK_FAILED",
            Self::IndexRecordInvalid => "INDEX_RECORD_INVALID",
            Self::KindMismatch => "KIND_MISMATCH",
            Self::DirectoryPrepFailed => "DIRECTORY_PREP_FAILED",
            Self::MoveFailed => "MOVE_FAILED",
            Self::IndexWriteFailed => "INDEX_WRITE_FAILED",
            Self::IndexPartialWrite => "INDEX_PARTIAL_WRITE",
            Self::SubtitleEntryMissing => "SUBTITLE_ENTRY_MISSING",
            Self::JournalWriteFailed => "JOURNAL_WRITE_FAILED",
        }
    }
}
