use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::record::{FetchMeta, TrainingRecord, WireRecord};

/// Training observations keyed by backend id, plus the fetch cursor.
///
/// The cursor is the highest id the backend has ever reported and never moves
/// backwards; the map only ever holds records that passed the inclusion rule
/// on their most recent sighting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingCache {
    #[serde(default)]
    records: BTreeMap<u64, TrainingRecord>,
    #[serde(default)]
    cursor: u64,
}

/// Summary of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// At least one record was inserted, changed or removed.
    pub changed: bool,
    pub inserted: usize,
    pub removed: usize,
    pub skipped: usize,
    pub cursor: u64,
}

impl TrainingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&TrainingRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    /// Records in ascending id order.
    pub fn records(&self) -> impl Iterator<Item = &TrainingRecord> {
        self.records.values()
    }

    /// Merge one fetched page into the cache.
    ///
    /// Disqualified records evict their cached counterpart; qualifying ones
    /// overwrite it. Re-sending a record identical to the cached one is not a
    /// change. The cursor advances to the reported max id even when
    /// every record in the page was filtered out.
    pub fn reconcile(&mut self, records: &[WireRecord], meta: &FetchMeta) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for wire in records {
            let Some(id) = wire.record_id() else {
                outcome.skipped += 1;
                continue;
            };
            match wire.qualify(id) {
                Ok(record) => {
                    if self.records.get(&id) != Some(&record) {
                        self.records.insert(id, record);
                        outcome.inserted += 1;
                    }
                }
                Err(reason) => {
                    if self.records.remove(&id).is_some() {
                        trace!(target: "wki::cache", id, ?reason, "evicted record");
                        outcome.removed += 1;
                    } else {
                        outcome.skipped += 1;
                    }
                }
            }
        }

        if let Some(max_id) = meta.max_id() {
            self.cursor = self.cursor.max(max_id);
        }

        outcome.changed = outcome.inserted > 0 || outcome.removed > 0;
        outcome.cursor = self.cursor;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn batch(items: Value) -> Vec<WireRecord> {
        serde_json::from_value(items).expect("records")
    }

    fn completed(id: u64, text: &str, minutes: f64) -> Value {
        json!({"id": id, "arbeit": text, "tatsaechliche_zeit": minutes, "status": "abgeschlossen"})
    }

    #[test]
    fn reconcile_is_idempotent() {
        let records = batch(json!([
            completed(1, "Bremsen wechseln", 60.0),
            completed(2, "Ölwechsel", 30.0),
            {"id": 3, "status": "offen"}
        ]));
        let meta = FetchMeta::with_max_id(3);

        let mut once = TrainingCache::new();
        let first = once.reconcile(&records, &meta);
        assert!(first.changed);
        assert_eq!(first.inserted, 2);

        let mut twice = once.clone();
        let second = twice.reconcile(&records, &meta);
        assert_eq!(twice, once);
        assert_eq!(second.cursor, first.cursor);
        assert!(!second.changed);
    }

    #[test]
    fn cursor_never_decreases() {
        let mut cache = TrainingCache::new();
        let filtered = batch(json!([{"id": 40, "status": "offen"}]));

        let out = cache.reconcile(&filtered, &FetchMeta::with_max_id(40));
        assert_eq!(out.cursor, 40);
        assert!(!out.changed);
        assert!(cache.is_empty());

        cache.reconcile(&[], &FetchMeta::with_max_id(12));
        assert_eq!(cache.cursor(), 40);

        cache.reconcile(&[], &FetchMeta::default());
        assert_eq!(cache.cursor(), 40);

        cache.reconcile(&[], &FetchMeta::with_max_id(41));
        assert_eq!(cache.cursor(), 41);
    }

    #[test]
    fn status_change_evicts_cached_record() {
        let mut cache = TrainingCache::new();
        let first = batch(json!([
            {"id": 7, "status": "abgeschlossen", "tatsaechliche_zeit": 45, "arbeit": "batterie pruefen"}
        ]));
        cache.reconcile(&first, &FetchMeta::with_max_id(7));
        assert_eq!(cache.get(7).map(|r| r.text.as_str()), Some("batterie pruefen"));

        let later = batch(json!([{"id": 7, "status": "offen"}]));
        let out = cache.reconcile(&later, &FetchMeta::with_max_id(7));
        assert!(out.changed);
        assert_eq!(out.removed, 1);
        assert!(!cache.contains(7));
    }

    #[test]
    fn malformed_records_do_not_abort_batch() {
        let mut cache = TrainingCache::new();
        let records = batch(json!([
            {"id": "not-a-number", "status": "abgeschlossen"},
            completed(5, "Reifen wechseln", 40.0),
            {"id": 6, "status": "abgeschlossen", "arbeit": "x", "tatsaechliche_zeit": "??"}
        ]));
        let out = cache.reconcile(&records, &FetchMeta::with_max_id(6));
        assert_eq!(out.inserted, 1);
        assert_eq!(out.skipped, 2);
        assert!(cache.contains(5));
    }

    #[test]
    fn requalified_record_overwrites() {
        let mut cache = TrainingCache::new();
        cache.reconcile(&batch(json!([completed(9, "Klima", 20.0)])), &FetchMeta::default());
        let out = cache.reconcile(&batch(json!([completed(9, "Klima", 35.0)])), &FetchMeta::default());
        assert!(out.changed);
        assert_eq!(cache.get(9).map(|r| r.minutes), Some(35.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn identical_resend_is_not_a_change() {
        let mut cache = TrainingCache::new();
        let records = batch(json!([completed(9, "Klima", 20.0)]));
        assert!(cache.reconcile(&records, &FetchMeta::default()).changed);
        let out = cache.reconcile(&records, &FetchMeta::with_max_id(9));
        assert!(!out.changed);
        assert_eq!(out.inserted, 0);
        assert_eq!(out.cursor, 9);
    }
}
