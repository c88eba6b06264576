use crate::archive::record::ItemId;
use crate::archive::snapshot::IndexSnapshot;
use crate::archive::util::Throttle;
use crate::archive::warn::{self, WarnEvent};
use crate::error::{MigrateError, WarnCode};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// External metadata service that knows which collection owns an item.
///
/// `Ok(None)` means the service answered and does not know the item;
/// `Err` means the service could not be asked.
pub trait OwnerLookup {
    fn lookup_owner(&self, item_id: &ItemId) -> Result<Option<String>, MigrateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerSource {
    Sibling,
    Marker,
    Lookup,
    Index,
}

impl OwnerSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Sibling => "sibling",
            Self::Marker => "marker-file",
            Self::Lookup => "external-lookup",
            Self::Index => "index",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved { owner: String, source: OwnerSource },
    Unresolved { reasons: Vec<String> },
}

/// Resolves the owning collection of an item, cheapest source first:
/// sibling cache, marker file, throttled external lookup, then the index.
pub struct OwnerResolver<'a> {
    lookup: Option<&'a dyn OwnerLookup>,
    index: IndexSnapshot<'a>,
    marker_file: String,
    throttle: Throttle,
    resolved: HashMap<ItemId, String>,
}

fn read_marker(path: &Path) -> std::io::Result<Option<String>> {
    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(ToOwned::to_owned))
}

impl<'a> OwnerResolver<'a> {
    pub fn new(
        lookup: Option<&'a dyn OwnerLookup>,
        index: IndexSnapshot<'a>,
        marker_file: &str,
        lookup_delay: Duration,
    ) -> Self {
        Self {
            lookup,
            index,
            marker_file: marker_file.to_string(),
            throttle: Throttle::new(lookup_delay),
            resolved: HashMap::new(),
        }
    }

    fn from_marker(&self, item_id: &ItemId, dir: &Path) -> Option<String> {
        let marker = dir.join(&self.marker_file);
        if !marker.is_file() {
            return None;
        }
        match read_marker(&marker) {
            Ok(owner) => owner,
            Err(err) => {
                warn::emit(WarnEvent {
                    code: WarnCode::MarkerUnreadable,
                    stage: "resolve-owner",
                    item: item_id.as_str(),
                    path: &marker.display().to_string(),
                    reason: "marker-read-failed",
                    err: &err.to_string(),
                });
                None
            }
        }
    }

    fn from_lookup(&mut self, item_id: &ItemId, reasons: &mut Vec<String>) -> Option<String> {
        let lookup = self.lookup?;
        self.throttle.wait();
        match lookup.lookup_owner(item_id) {
            Ok(Some(owner)) => {
                tracing::debug!("owner for {item_id} extracted from lookup: {owner}");
                Some(owner)
            }
            Ok(None) => {
                reasons.push("external lookup: not found".to_string());
                None
            }
            Err(err) => {
                warn::emit(WarnEvent {
                    code: WarnCode::LookupFailed,
                    stage: "resolve-owner",
                    item: item_id.as_str(),
                    path: "",
                    reason: "external-lookup-failed",
                    err: &err.to_string(),
                });
                reasons.push(format!("external lookup: {err}"));
                None
            }
        }
    }

    fn from_index(&self, item_id: &ItemId, reasons: &mut Vec<String>) -> Option<String> {
        match self.index.fetch_one(item_id) {
            Ok(Some(record)) => {
                if record.owner_id.is_none() {
                    reasons.push("index: document has no owner".to_string());
                }
                record.owner_id
            }
            Ok(None) => {
                reasons.push("index: not found".to_string());
                None
            }
            Err(err) => {
                reasons.push(format!("index: {err}"));
                None
            }
        }
    }

    pub fn resolve(&mut self, item_id: &ItemId, dir: &Path) -> Resolution {
        if let Some(owner) = self.resolved.get(item_id) {
            return Resolution::Resolved {
                owner: owner.clone(),
                source: OwnerSource::Sibling,
            };
        }

        let mut reasons = Vec::new();
        let found = if let Some(owner) = self.from_marker(item_id, dir) {
            Some((owner, OwnerSource::Marker))
        } else if let Some(owner) = self.from_lookup(item_id, &mut reasons) {
            Some((owner, OwnerSource::Lookup))
        } else {
            self.from_index(item_id, &mut reasons)
                .map(|owner| (owner, OwnerSource::Index))
        };

        match found {
            Some((owner, source)) => {
                self.resolved.insert(item_id.clone(), owner.clone());
                Resolution::Resolved { owner, source }
            }
            None => Resolution::Unresolved { reasons },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testing::{FakeIndex, FakeLookup};
    use serde_json::json;
    use tempfile::tempdir;

    fn id() -> ItemId {
        ItemId::parse("abcdefghijk").expect("id")
    }

    #[test]
    fn marker_file_wins_over_lookup() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("channel.id"), "\nUCmarker\n\n").expect("marker");
        let index = FakeIndex::default();
        let lookup = FakeLookup::with("abcdefghijk", "UClookup");
        let mut resolver = OwnerResolver::new(
            Some(&lookup),
            IndexSnapshot::new(&index),
            "channel.id",
            Duration::ZERO,
        );
        let got = resolver.resolve(&id(), tmp.path());
        assert_eq!(
            got,
            Resolution::Resolved {
                owner: "UCmarker".to_string(),
                source: OwnerSource::Marker
            }
        );
        assert_eq!(lookup.calls.get(), 0);
    }

    #[test]
    fn sibling_cache_avoids_second_lookup() {
        let tmp = tempdir().expect("tempdir");
        let index = FakeIndex::default();
        let lookup = FakeLookup::with("abcdefghijk", "UCchannel1");
        let mut resolver = OwnerResolver::new(
            Some(&lookup),
            IndexSnapshot::new(&index),
            "channel.id",
            Duration::ZERO,
        );
        resolver.resolve(&id(), tmp.path());
        let second = resolver.resolve(&id(), tmp.path());
        assert_eq!(
            second,
            Resolution::Resolved {
                owner: "UCchannel1".to_string(),
                source: OwnerSource::Sibling
            }
        );
        assert_eq!(lookup.calls.get(), 1);
    }

    #[test]
    fn lookup_failure_falls_back_to_index() {
        let tmp = tempdir().expect("tempdir");
        let index = FakeIndex::default();
        index.insert(
            "abcdefghijk",
            json!({"youtube_id": "abcdefghijk", "channel": {"channel_id": "UCindex"}}),
        );
        let lookup = FakeLookup {
            fail: true,
            ..FakeLookup::default()
        };
        let mut resolver = OwnerResolver::new(
            Some(&lookup),
            IndexSnapshot::new(&index),
            "channel.id",
            Duration::ZERO,
        );
        assert_eq!(
            resolver.resolve(&id(), tmp.path()),
            Resolution::Resolved {
                owner: "UCindex".to_string(),
                source: OwnerSource::Index
            }
        );
    }

    #[test]
    fn disabled_lookup_goes_straight_to_index() {
        let tmp = tempdir().expect("tempdir");
        let index = FakeIndex::default();
        index.insert(
            "abcdefghijk",
            json!({"channel": {"channel_id": "UCindex"}}),
        );
        let mut resolver =
            OwnerResolver::new(None, IndexSnapshot::new(&index), "channel.id", Duration::ZERO);
        assert!(matches!(
            resolver.resolve(&id(), tmp.path()),
            Resolution::Resolved {
                source: OwnerSource::Index,
                ..
            }
        ));
    }

    #[test]
    fn all_sources_failing_is_unresolved_with_reasons() {
        let tmp = tempdir().expect("tempdir");
        let index = FakeIndex::default();
        index.fail_reads.set(true);
        let lookup = FakeLookup::default();
        let mut resolver = OwnerResolver::new(
            Some(&lookup),
            IndexSnapshot::new(&index),
            "channel.id",
            Duration::ZERO,
        );
        let Resolution::Unresolved { reasons } = resolver.resolve(&id(), tmp.path()) else {
            panic!("expected unresolved");
        };
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("not found"));
        assert!(reasons[1].starts_with("index:"));
    }
}
