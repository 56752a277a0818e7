use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use crate::core::table_ref::TableRef;
use crate::core::types::FieldType;
use crate::metainf::{MetaDatabase, MetaDocPart, MetaField, MetaScalar, MetaSnapshot};

/// Committed, read-only view of every database the backend knows.
///
/// Children are held behind `Arc`, so deriving a new snapshot that touches
/// one collection shares every untouched subtree with the old one.
#[derive(Debug, Clone, Default)]
pub struct ImmutableMetaSnapshot {
    databases: BTreeMap<String, Arc<ImmutableMetaDatabase>>,
}

impl ImmutableMetaSnapshot {
    pub fn new() -> Self {
        ImmutableMetaSnapshot::default()
    }

    pub fn with_database(mut self, database: ImmutableMetaDatabase) -> Self {
        self.put_database(database);
        self
    }

    pub fn put_database(&mut self, database: ImmutableMetaDatabase) {
        self.databases.insert(database.name.clone(), Arc::new(database));
    }

    pub fn database(&self, name: &str) -> Option<&Arc<ImmutableMetaDatabase>> {
        self.databases.get(name)
    }

    pub fn database_by_identifier(&self, identifier: &str) -> Option<&Arc<ImmutableMetaDatabase>> {
        self.databases.values().find(|db| db.identifier == identifier)
    }

    pub fn databases(&self) -> impl Iterator<Item = &Arc<ImmutableMetaDatabase>> {
        self.databases.values()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

impl MetaSnapshot for ImmutableMetaSnapshot {
    fn database_identifiers(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.databases.values().map(|db| db.identifier.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct ImmutableMetaDatabase {
    name: String,
    identifier: String,
    collections: BTreeMap<String, Arc<ImmutableMetaCollection>>,
}

impl ImmutableMetaDatabase {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        ImmutableMetaDatabase {
            name: name.into(),
            identifier: identifier.into(),
            collections: BTreeMap::new(),
        }
    }

    pub fn with_collection(mut self, collection: ImmutableMetaCollection) -> Self {
        self.put_collection(collection);
        self
    }

    pub fn put_collection(&mut self, collection: ImmutableMetaCollection) {
        self.collections.insert(collection.name.clone(), Arc::new(collection));
    }

    pub fn collection(&self, name: &str) -> Option<&Arc<ImmutableMetaCollection>> {
        self.collections.get(name)
    }

    pub fn collection_by_identifier(&self, identifier: &str) -> Option<&Arc<ImmutableMetaCollection>> {
        self.collections.values().find(|c| c.identifier == identifier)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Arc<ImmutableMetaCollection>> {
        self.collections.values()
    }
}

impl MetaDatabase for ImmutableMetaDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn doc_part_identifiers(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(
            self.collections
                .values()
                .flat_map(|c| c.doc_parts.iter().map(|dp| dp.identifier.as_str())),
        )
    }
}

/// A collection and the DocParts its documents have been split into.
/// The root DocPart shares the collection identifier.
#[derive(Debug, Clone)]
pub struct ImmutableMetaCollection {
    name: String,
    identifier: String,
    doc_parts: Vec<Arc<ImmutableMetaDocPart>>,
    by_ref: HashMap<TableRef, usize>,
}

impl ImmutableMetaCollection {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        ImmutableMetaCollection {
            name: name.into(),
            identifier: identifier.into(),
            doc_parts: Vec::new(),
            by_ref: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn set_identifier(&mut self, identifier: String) {
        self.identifier = identifier;
    }

    pub fn with_doc_part(mut self, doc_part: ImmutableMetaDocPart) -> Self {
        self.put_doc_part(doc_part);
        self
    }

    /// Adds a DocPart or replaces the one at the same `TableRef`.
    pub fn put_doc_part(&mut self, doc_part: ImmutableMetaDocPart) {
        match self.by_ref.get(&doc_part.table_ref) {
            Some(&index) => self.doc_parts[index] = Arc::new(doc_part),
            None => {
                self.by_ref.insert(doc_part.table_ref.clone(), self.doc_parts.len());
                self.doc_parts.push(Arc::new(doc_part));
            }
        }
    }

    pub fn doc_part(&self, table_ref: &TableRef) -> Option<&Arc<ImmutableMetaDocPart>> {
        self.by_ref.get(table_ref).map(|&index| &self.doc_parts[index])
    }

    pub fn doc_part_by_identifier(&self, identifier: &str) -> Option<&Arc<ImmutableMetaDocPart>> {
        self.doc_parts.iter().find(|dp| dp.identifier == identifier)
    }

    pub fn doc_parts(&self) -> impl Iterator<Item = &Arc<ImmutableMetaDocPart>> {
        self.doc_parts.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImmutableMetaDocPart {
    table_ref: TableRef,
    identifier: String,
    fields: Vec<MetaField>,
    scalars: Vec<MetaScalar>,
}

impl ImmutableMetaDocPart {
    pub fn new(table_ref: TableRef, identifier: impl Into<String>) -> Self {
        ImmutableMetaDocPart {
            table_ref,
            identifier: identifier.into(),
            fields: Vec::new(),
            scalars: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        table_ref: TableRef,
        identifier: String,
        fields: Vec<MetaField>,
        scalars: Vec<MetaScalar>,
    ) -> Self {
        ImmutableMetaDocPart { table_ref, identifier, fields, scalars }
    }

    pub fn with_field(mut self, name: &str, identifier: &str, field_type: FieldType) -> Self {
        self.fields.push(MetaField::new(name, identifier, field_type));
        self
    }

    pub fn with_scalar(mut self, identifier: &str, field_type: FieldType) -> Self {
        self.scalars.push(MetaScalar::new(identifier, field_type));
        self
    }

    pub(crate) fn push_field(&mut self, field: MetaField) {
        self.fields.push(field);
    }

    pub(crate) fn push_scalar(&mut self, scalar: MetaScalar) {
        self.scalars.push(scalar);
    }
}

impl MetaDocPart for ImmutableMetaDocPart {
    fn table_ref(&self) -> &TableRef {
        &self.table_ref
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn fields(&self) -> &[MetaField] {
        &self.fields
    }

    fn scalars(&self) -> &[MetaScalar] {
        &self.scalars
    }
}
