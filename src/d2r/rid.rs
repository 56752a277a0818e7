use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use crate::core::table_ref::TableRef;
use crate::core::types::RowId;

/// Source of row ids.
///
/// Ids only need to be unique within one (database, collection, DocPart);
/// the root sequence doubles as the document id sequence.
pub trait RidGenerator: Send + Sync {
    fn next_rid(&self, database: &str, collection: &str, table_ref: &TableRef) -> RowId;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RidScope {
    database: String,
    collection: String,
    table_ref: TableRef,
}

/// Process-local generator with one atomic counter per DocPart.
#[derive(Debug, Default)]
pub struct InMemoryRidGenerator {
    counters: RwLock<HashMap<RidScope, Arc<AtomicU64>>>,
}

impl InMemoryRidGenerator {
    pub fn new() -> Self {
        InMemoryRidGenerator::default()
    }

    fn counter(&self, database: &str, collection: &str, table_ref: &TableRef) -> Arc<AtomicU64> {
        let scope = RidScope {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: table_ref.clone(),
        };
        if let Some(counter) = self.counters.read().get(&scope) {
            return counter.clone();
        }
        self.counters
            .write()
            .entry(scope)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Makes the next id of the scope at least `next`, e.g. after reopening
    /// a backend that already holds rows. Never moves a counter backwards.
    pub fn seed(&self, database: &str, collection: &str, table_ref: &TableRef, next: RowId) {
        self.counter(database, collection, table_ref)
            .fetch_max(next, Ordering::SeqCst);
    }

    /// Id the next call to `next_rid` would hand out.
    pub fn peek(&self, database: &str, collection: &str, table_ref: &TableRef) -> RowId {
        self.counter(database, collection, table_ref).load(Ordering::SeqCst)
    }
}

impl RidGenerator for InMemoryRidGenerator {
    fn next_rid(&self, database: &str, collection: &str, table_ref: &TableRef) -> RowId {
        self.counter(database, collection, table_ref)
            .fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_per_doc_part() {
        let generator = InMemoryRidGenerator::new();
        let root = TableRef::root();
        let child = root.child("a");
        assert_eq!(generator.next_rid("db", "c", &root), 0);
        assert_eq!(generator.next_rid("db", "c", &root), 1);
        assert_eq!(generator.next_rid("db", "c", &child), 0);
        assert_eq!(generator.next_rid("db", "other", &root), 0);
    }

    #[test]
    fn seed_never_rewinds() {
        let generator = InMemoryRidGenerator::new();
        let root = TableRef::root();
        generator.seed("db", "c", &root, 10);
        assert_eq!(generator.next_rid("db", "c", &root), 10);
        generator.seed("db", "c", &root, 3);
        assert_eq!(generator.peek("db", "c", &root), 11);
    }

    #[test]
    fn concurrent_callers_get_distinct_ids() {
        let generator = Arc::new(InMemoryRidGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| generator.next_rid("db", "c", &TableRef::root()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<RowId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 400);
    }
}
