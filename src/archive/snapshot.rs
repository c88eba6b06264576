use crate::archive::record::{IndexRecord, ItemId};
use crate::archive::warn::{self, WarnEvent};
use crate::error::{MigrateError, WarnCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One raw document returned by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub source: Value,
}

/// Write acknowledgment with shard-level success counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateAck {
    pub status: u16,
    pub shards_total: u64,
    pub shards_successful: u64,
}

impl UpdateAck {
    pub fn fully_propagated(&self) -> bool {
        self.status == 200 && self.shards_successful >= self.shards_total
    }
}

/// Query/update transport of the search index.
pub trait IndexStore {
    fn search_by_id(&self, item_id: &ItemId) -> Result<Vec<IndexHit>, MigrateError>;
    fn paginate_all(&self) -> Result<Vec<IndexHit>, MigrateError>;
    fn update(&self, item_id: &ItemId, patch: &Value) -> Result<UpdateAck, MigrateError>;
}

/// Read-only view over the index used by the scan and reconcile stages.
#[derive(Clone, Copy)]
pub struct IndexSnapshot<'a> {
    store: &'a dyn IndexStore,
}

impl<'a> IndexSnapshot<'a> {
    pub fn new(store: &'a dyn IndexStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a dyn IndexStore {
        self.store
    }

    pub fn fetch_all(&self) -> Result<BTreeMap<ItemId, IndexRecord>, MigrateError> {
        let hits = self.store.paginate_all()?;
        let mut out = BTreeMap::new();
        for hit in hits {
            match IndexRecord::from_source(&hit.id, &hit.source) {
                Ok(record) => {
                    out.insert(record.item_id.clone(), record);
                }
                Err(err) => warn::emit(WarnEvent {
                    code: WarnCode::IndexRecordInvalid,
                    stage: "index-snapshot",
                    item: &hit.id,
                    path: "",
                    reason: "unparseable-document",
                    err: &err.to_string(),
                }),
            }
        }
        tracing::info!("pulled {} item(s) from the index", out.len());
        Ok(out)
    }

    /// Raw `_source` of the document for `item_id`, if any.
    pub fn fetch_source(&self, item_id: &ItemId) -> Result<Option<Value>, MigrateError> {
        let hits = self.store.search_by_id(item_id)?;
        let exact = hits.iter().position(|h| h.id == item_id.as_str());
        let hit = match exact {
            Some(idx) => hits.into_iter().nth(idx),
            None => hits.into_iter().find(|h| {
                h.source.get("youtube_id").and_then(Value::as_str) == Some(item_id.as_str())
            }),
        };
        Ok(hit.map(|h| h.source))
    }

    pub fn fetch_one(&self, item_id: &ItemId) -> Result<Option<IndexRecord>, MigrateError> {
        let Some(source) = self.fetch_source(item_id)? else {
            return Ok(None);
        };
        Ok(Some(IndexRecord::from_source(item_id.as_str(), &source)?))
    }
}
