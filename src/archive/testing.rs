//! In-memory stand-ins for the index and the metadata lookup.

use crate::archive::owner::OwnerLookup;
use crate::archive::record::ItemId;
use crate::archive::scanner::ScanProgress;
use crate::archive::snapshot::{IndexHit, IndexStore, UpdateAck};
use crate::error::MigrateError;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct FakeIndex {
    pub docs: RefCell<BTreeMap<String, Value>>,
    pub updates: RefCell<Vec<(String, Value)>>,
    pub searches: Cell<usize>,
    pub fail_reads: Cell<bool>,
    pub fail_searches: Cell<bool>,
    pub empty_listing: Cell<bool>,
    pub fail_updates: Cell<bool>,
    pub partial_updates: Cell<bool>,
}

impl FakeIndex {
    pub fn insert(&self, id: &str, source: Value) {
        self.docs.borrow_mut().insert(id.to_string(), source);
    }

    pub fn doc(&self, id: &str) -> Option<Value> {
        self.docs.borrow().get(id).cloned()
    }

    fn transport_error(context: &str) -> MigrateError {
        MigrateError::index_transport(context, "connection refused")
    }
}

fn merge_doc(target: &mut Value, patch: &Value) {
    if let (Some(obj), Some(doc)) = (
        target.as_object_mut(),
        patch.get("doc").and_then(Value::as_object),
    ) {
        for (key, value) in doc {
            obj.insert(key.clone(), value.clone());
        }
    }
}

impl IndexStore for FakeIndex {
    fn search_by_id(&self, item_id: &ItemId) -> Result<Vec<IndexHit>, MigrateError> {
        self.searches.set(self.searches.get() + 1);
        if self.fail_reads.get() || self.fail_searches.get() {
            return Err(Self::transport_error("search"));
        }
        Ok(self
            .docs
            .borrow()
            .get(item_id.as_str())
            .map(|source| IndexHit {
                id: item_id.to_string(),
                source: source.clone(),
            })
            .into_iter()
            .collect())
    }

    fn paginate_all(&self) -> Result<Vec<IndexHit>, MigrateError> {
        if self.fail_reads.get() {
            return Err(Self::transport_error("paginate"));
        }
        if self.empty_listing.get() {
            return Ok(Vec::new());
        }
        Ok(self
            .docs
            .borrow()
            .iter()
            .map(|(id, source)| IndexHit {
                id: id.clone(),
                source: source.clone(),
            })
            .collect())
    }

    fn update(&self, item_id: &ItemId, patch: &Value) -> Result<UpdateAck, MigrateError> {
        if self.fail_updates.get() {
            return Err(Self::transport_error("update"));
        }
        self.updates
            .borrow_mut()
            .push((item_id.to_string(), patch.clone()));
        if let Some(doc) = self.docs.borrow_mut().get_mut(item_id.as_str()) {
            merge_doc(doc, patch);
        }
        let shards_successful = if self.partial_updates.get() { 1 } else { 2 };
        Ok(UpdateAck {
            status: 200,
            shards_total: 2,
            shards_successful,
        })
    }
}

#[derive(Default)]
pub struct FakeLookup {
    pub owners: BTreeMap<String, String>,
    pub fail: bool,
    pub calls: Cell<usize>,
}

impl FakeLookup {
    pub fn with(item: &str, owner: &str) -> Self {
        let mut owners = BTreeMap::new();
        owners.insert(item.to_string(), owner.to_string());
        Self {
            owners,
            ..Self::default()
        }
    }
}

impl OwnerLookup for FakeLookup {
    fn lookup_owner(&self, item_id: &ItemId) -> Result<Option<String>, MigrateError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(MigrateError::LookupTransport {
                item_id: item_id.to_string(),
                reason: "network unreachable".to_string(),
            });
        }
        Ok(self.owners.get(item_id.as_str()).cloned())
    }
}

/// No-op reporter for silent scans.
pub struct SilentProgress;

impl ScanProgress for SilentProgress {}
