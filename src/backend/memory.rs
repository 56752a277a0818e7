use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use crate::core::error::Result;
use crate::core::table_ref::TableRef;
use crate::d2r::collection_data::{CollectionData, DocPartRow};
use crate::metainf::{ImmutableMetaDocPart, MetaDocPart};
use crate::r2d::result::{DocPartResult, InMemoryDocPartResult};

/// Destination of translated rows.
pub trait RowSink {
    fn insert(&mut self, data: &CollectionData) -> Result<()>;
}

#[derive(Debug)]
struct StoredDocPart {
    meta: Arc<ImmutableMetaDocPart>,
    rows: Vec<DocPartRow>,
}

#[derive(Debug, Default)]
struct StoredCollection {
    doc_parts: Vec<StoredDocPart>,
    by_ref: HashMap<TableRef, usize>,
}

/// Row store keeping one table per DocPart in memory.
///
/// Tables widen when a later unit brings a DocPart with more columns;
/// existing rows are realigned and read NULL in the new columns.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: BTreeMap<(String, String), StoredCollection>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    pub fn row_count(&self, database: &str, collection: &str) -> usize {
        self.collection(database, collection)
            .map_or(0, |c| c.doc_parts.iter().map(|dp| dp.rows.len()).sum())
    }

    /// Rows of one DocPart table, in insertion order.
    pub fn rows(&self, database: &str, collection: &str, table_ref: &TableRef) -> Option<&[DocPartRow]> {
        let stored = self.collection(database, collection)?;
        let index = *stored.by_ref.get(table_ref)?;
        Some(&stored.doc_parts[index].rows)
    }

    /// Cursors over every table of the collection, deepest first.
    pub fn results(&self, database: &str, collection: &str) -> Vec<InMemoryDocPartResult> {
        let Some(stored) = self.collection(database, collection) else {
            return Vec::new();
        };
        let mut results: Vec<InMemoryDocPartResult> = stored
            .doc_parts
            .iter()
            .map(|dp| InMemoryDocPartResult::new(dp.meta.clone(), dp.rows.clone()))
            .collect();
        results.sort_by_key(|r| std::cmp::Reverse(r.meta_doc_part().table_ref().depth()));
        results
    }

    fn collection(&self, database: &str, collection: &str) -> Option<&StoredCollection> {
        self.collections.get(&(database.to_string(), collection.to_string()))
    }
}

impl RowSink for MemoryBackend {
    fn insert(&mut self, data: &CollectionData) -> Result<()> {
        let stored = self
            .collections
            .entry((data.database().to_string(), data.collection().to_string()))
            .or_default();

        for doc_part in data.doc_parts() {
            let meta = doc_part.meta_doc_part();
            let index = match stored.by_ref.get(meta.table_ref()) {
                Some(&index) => index,
                None => {
                    debug!(table = %meta.identifier(), "creating docpart table");
                    stored.by_ref.insert(meta.table_ref().clone(), stored.doc_parts.len());
                    stored.doc_parts.push(StoredDocPart { meta: meta.clone(), rows: Vec::new() });
                    stored.doc_parts.len() - 1
                }
            };

            let table = &mut stored.doc_parts[index];
            if table.meta.column_count() < meta.column_count() {
                debug!(table = %meta.identifier(), columns = meta.column_count(), "widening docpart table");
                for row in &mut table.rows {
                    row.realign(&table.meta, meta)?;
                }
                table.meta = meta.clone();
            }

            for row in doc_part.rows() {
                let mut row = row.clone();
                if !Arc::ptr_eq(&table.meta, meta) && **meta != *table.meta {
                    row.realign(meta, &table.meta)?;
                }
                table.rows.push(row);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FieldType, KvValue, RowIdentity};
    use crate::d2r::collection_data::DocPartData;

    fn data(meta: ImmutableMetaDocPart, rows: Vec<DocPartRow>) -> CollectionData {
        CollectionData::new("db", "c", vec![DocPartData::new(Arc::new(meta), rows)])
    }

    #[test]
    fn tables_widen_for_new_columns() {
        let narrow = ImmutableMetaDocPart::new(TableRef::root(), "c")
            .with_field("a", "a_i", FieldType::Integer);
        let wide = narrow.clone().with_field("b", "b_s", FieldType::String);

        let mut first = DocPartRow::new(RowIdentity::root(0));
        first.set_field(0, KvValue::Integer(1));
        let mut second = DocPartRow::new(RowIdentity::root(1));
        second.set_field(1, KvValue::from("x"));
        second.pad(2, 0);

        let mut backend = MemoryBackend::new();
        backend.insert(&data(narrow, vec![first])).unwrap();
        backend.insert(&data(wide, vec![second])).unwrap();

        let rows = backend.rows("db", "c", &TableRef::root()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values().count(), 2);
        assert_eq!(rows[0].field_value(1), None);
        assert_eq!(rows[1].field_value(1), Some(&KvValue::from("x")));
        assert_eq!(backend.row_count("db", "c"), 2);
    }

    #[test]
    fn results_come_deepest_first() {
        let root = ImmutableMetaDocPart::new(TableRef::root(), "c");
        let child = ImmutableMetaDocPart::new(TableRef::root().child("a"), "c_a");
        let mut backend = MemoryBackend::new();
        backend
            .insert(&CollectionData::new(
                "db",
                "c",
                vec![
                    DocPartData::new(Arc::new(root), Vec::new()),
                    DocPartData::new(Arc::new(child), Vec::new()),
                ],
            ))
            .unwrap();
        let depths: Vec<usize> = backend
            .results("db", "c")
            .iter()
            .map(|r| r.meta_doc_part().table_ref().depth())
            .collect();
        assert_eq!(depths, vec![1, 0]);
        assert!(backend.results("db", "missing").is_empty());
    }
}
