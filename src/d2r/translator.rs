use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::table_ref::TableRef;
use crate::core::types::{FieldType, KvDocument, KvValue, RowId, RowIdentity};
use crate::d2r::collection_data::{CollectionData, DocPartData, DocPartRow};
use crate::d2r::rid::RidGenerator;
use crate::identifier::IdentifierFactory;
use crate::metainf::{MetaDocPart, MutableMetaCollection, MutableMetaSnapshot};

/// Rows collected for one DocPart, in the order documents produced them.
struct PendingDocPart {
    table_ref: TableRef,
    doc_part: usize,
    rows: Vec<DocPartRow>,
}

/// Splits documents of one collection into DocPart rows.
///
/// Every object becomes a row of the DocPart at its `TableRef`; arrays
/// become one row per element in the DocPart one level down. Whatever
/// metadata is missing (database, collection, DocParts, fields, scalars)
/// is registered in the unit's mutable snapshot on the way.
pub struct D2RTranslator<'a> {
    factory: &'a IdentifierFactory,
    rid_generator: &'a dyn RidGenerator,
    snapshot: &'a mut MutableMetaSnapshot,
    database: String,
    collection: String,
    pending: Vec<PendingDocPart>,
    by_ref: HashMap<TableRef, usize>,
    documents: usize,
}

impl<'a> D2RTranslator<'a> {
    pub fn new(
        factory: &'a IdentifierFactory,
        rid_generator: &'a dyn RidGenerator,
        snapshot: &'a mut MutableMetaSnapshot,
        database: &str,
        collection: &str,
    ) -> Result<Self> {
        snapshot
            .get_or_create_database(database, factory)?
            .get_or_create_collection(collection, factory)?;
        Ok(D2RTranslator {
            factory,
            rid_generator,
            snapshot,
            database: database.to_string(),
            collection: collection.to_string(),
            pending: Vec::new(),
            by_ref: HashMap::new(),
            documents: 0,
        })
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    /// Translates one document and returns its `did`.
    ///
    /// Unsupported values are rejected before anything is touched. Any other
    /// failure drops the rows of this document; metadata it registered stays
    /// in the unit.
    pub fn translate(&mut self, document: &KvDocument) -> Result<RowId> {
        check_storable(document)?;

        let checkpoint: Vec<usize> = self.pending.iter().map(|p| p.rows.len()).collect();
        match self.translate_root(document) {
            Ok(did) => {
                self.documents += 1;
                Ok(did)
            }
            Err(e) => {
                self.rollback(&checkpoint);
                Err(e)
            }
        }
    }

    fn rollback(&mut self, checkpoint: &[usize]) {
        for dropped in self.pending.drain(checkpoint.len()..) {
            self.by_ref.remove(&dropped.table_ref);
        }
        for (pending, &len) in self.pending.iter_mut().zip(checkpoint) {
            pending.rows.truncate(len);
        }
    }

    fn translate_root(&mut self, document: &KvDocument) -> Result<RowId> {
        let root = TableRef::root();
        let did = self.rid_generator.next_rid(&self.database, &self.collection, &root);
        let group = self.pending_for(&root)?;
        let row = self.push_row(group, RowIdentity::root(did));
        self.visit_document(did, document, group, row)?;
        trace!(did, "translated document");
        Ok(did)
    }

    fn visit_document(&mut self, did: RowId, document: &KvDocument, group: usize, row: usize) -> Result<()> {
        let rid = self.pending[group].rows[row].rid();
        for (key, value) in document.iter() {
            match value {
                KvValue::Document(subdocument) => {
                    self.set_field(group, row, key, FieldType::Child, KvValue::Boolean(false))?;
                    let child_ref = self.pending[group].table_ref.child(key);
                    let child = self.pending_for(&child_ref)?;
                    let child_rid = self.next_rid(&child_ref);
                    let child_row = self.push_row(
                        child,
                        RowIdentity { did, rid: child_rid, pid: Some(rid), seq: None },
                    );
                    self.visit_document(did, subdocument, child, child_row)?;
                }
                KvValue::Array(elements) => {
                    self.set_field(group, row, key, FieldType::Child, KvValue::Boolean(true))?;
                    let child_ref = self.pending[group].table_ref.child(key);
                    let child = self.pending_for(&child_ref)?;
                    self.visit_array(did, elements, child, rid)?;
                }
                scalar => {
                    let field_type = FieldType::of(scalar)?;
                    self.set_field(group, row, key, field_type, scalar.clone())?;
                }
            }
        }
        Ok(())
    }

    fn visit_array(&mut self, did: RowId, elements: &[KvValue], group: usize, parent_rid: RowId) -> Result<()> {
        for (seq, element) in elements.iter().enumerate() {
            let table_ref = self.pending[group].table_ref.clone();
            let rid = self.next_rid(&table_ref);
            let seq = u32::try_from(seq).map_err(|_| {
                Error::new(ErrorKind::InvalidArgument, format!("array at {} is too long", table_ref))
            })?;
            let row = self.push_row(group, RowIdentity { did, rid, pid: Some(parent_rid), seq: Some(seq) });

            match element {
                KvValue::Document(subdocument) => self.visit_document(did, subdocument, group, row)?,
                KvValue::Array(inner) => {
                    self.set_scalar(group, row, FieldType::Child, KvValue::Boolean(true))?;
                    let child = self.pending_for(&table_ref.array_child())?;
                    self.visit_array(did, inner, child, rid)?;
                }
                scalar => {
                    let field_type = FieldType::of(scalar)?;
                    self.set_scalar(group, row, field_type, scalar.clone())?;
                }
            }
        }
        Ok(())
    }

    fn next_rid(&self, table_ref: &TableRef) -> RowId {
        self.rid_generator.next_rid(&self.database, &self.collection, table_ref)
    }

    fn push_row(&mut self, group: usize, identity: RowIdentity) -> usize {
        let rows = &mut self.pending[group].rows;
        rows.push(DocPartRow::new(identity));
        rows.len() - 1
    }

    fn collection_mut(&mut self) -> Result<&mut MutableMetaCollection> {
        let (database, collection) = (&self.database, &self.collection);
        self.snapshot
            .database_mut(database)
            .and_then(|db| db.collection_mut(collection))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Internal,
                    format!("{}.{} missing from the unit snapshot", database, collection),
                )
            })
    }

    /// Index of the pending rows for `table_ref`, registering the DocPart
    /// in the snapshot when the collection does not have it yet.
    fn pending_for(&mut self, table_ref: &TableRef) -> Result<usize> {
        if let Some(&index) = self.by_ref.get(table_ref) {
            return Ok(index);
        }

        let existing = self.collection_mut()?.doc_part_index(table_ref);
        let doc_part = match existing {
            Some(doc_part) => doc_part,
            None => {
                let database = self.snapshot.database(&self.database).ok_or_else(|| {
                    Error::new(ErrorKind::Internal, format!("database {} missing from the unit snapshot", self.database))
                })?;
                let identifier = self.factory.table_identifier(database, &self.collection, table_ref)?;
                debug!(collection = %self.collection, table_ref = %table_ref, identifier = %identifier, "registering docpart");
                self.collection_mut()?.add_doc_part(table_ref.clone(), identifier)
            }
        };

        let index = self.pending.len();
        self.pending.push(PendingDocPart {
            table_ref: table_ref.clone(),
            doc_part,
            rows: Vec::new(),
        });
        self.by_ref.insert(table_ref.clone(), index);
        Ok(index)
    }

    fn set_field(&mut self, group: usize, row: usize, name: &str, field_type: FieldType, value: KvValue) -> Result<()> {
        let factory = self.factory;
        let doc_part = self.pending[group].doc_part;
        let collection = self.collection_mut()?;
        let position = match collection.doc_part(doc_part).field_position(name, field_type) {
            Some(position) => position,
            None => {
                let identifier = factory.field_identifier(collection.doc_part(doc_part), field_type, name)?;
                trace!(field = %name, identifier = %identifier, "registering field");
                collection.doc_part_mut(doc_part).add_field(name, identifier, field_type)
            }
        };
        self.pending[group].rows[row].set_field(position, value);
        Ok(())
    }

    fn set_scalar(&mut self, group: usize, row: usize, field_type: FieldType, value: KvValue) -> Result<()> {
        let factory = self.factory;
        let doc_part = self.pending[group].doc_part;
        let collection = self.collection_mut()?;
        let position = match collection.doc_part(doc_part).scalar_position(field_type) {
            Some(position) => position,
            None => {
                let identifier = factory.scalar_identifier(field_type);
                collection.doc_part_mut(doc_part).add_scalar(identifier, field_type)
            }
        };
        self.pending[group].rows[row].set_scalar(position, value);
        Ok(())
    }

    /// Closes the unit. Rows are aligned to the final shape of their DocPart.
    pub fn finish(mut self) -> Result<CollectionData> {
        let pending = std::mem::take(&mut self.pending);
        let collection = self.collection_mut()?;
        let mut doc_parts = Vec::with_capacity(pending.len());
        for PendingDocPart { doc_part, mut rows, .. } in pending {
            let meta = Arc::new(collection.doc_part(doc_part).immutable_copy());
            for row in &mut rows {
                row.pad(meta.fields().len(), meta.scalars().len());
            }
            doc_parts.push(DocPartData::new(meta, rows));
        }
        debug!(
            database = %self.database,
            collection = %self.collection,
            documents = self.documents,
            doc_parts = doc_parts.len(),
            "finished translation unit"
        );
        Ok(CollectionData::new(self.database.clone(), self.collection.clone(), doc_parts))
    }
}

/// Rejects documents holding values no column type can store.
fn check_storable(document: &KvDocument) -> Result<()> {
    document.iter().try_for_each(|(_, value)| check_value(value))
}

fn check_value(value: &KvValue) -> Result<()> {
    match value {
        KvValue::Document(document) => check_storable(document),
        KvValue::Array(elements) => elements.iter().try_for_each(check_value),
        other => FieldType::of(other).map(|_| ()),
    }
}
