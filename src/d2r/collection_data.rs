use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::table_ref::TableRef;
use crate::core::types::{KvValue, RowId, RowIdentity};
use crate::metainf::{ImmutableMetaDocPart, ImmutableMetaSnapshot, MetaDocPart};

/// One relational row of a DocPart.
///
/// Values are aligned with the DocPart columns: `field_values[i]` belongs to
/// field `i`, `scalar_values[j]` to scalar `j`. `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct DocPartRow {
    identity: RowIdentity,
    field_values: Vec<Option<KvValue>>,
    scalar_values: Vec<Option<KvValue>>,
}

impl DocPartRow {
    pub fn new(identity: RowIdentity) -> Self {
        DocPartRow {
            identity,
            field_values: Vec::new(),
            scalar_values: Vec::new(),
        }
    }

    pub fn identity(&self) -> RowIdentity {
        self.identity
    }

    pub fn did(&self) -> RowId {
        self.identity.did
    }

    pub fn rid(&self) -> RowId {
        self.identity.rid
    }

    pub fn pid(&self) -> Option<RowId> {
        self.identity.pid
    }

    pub fn seq(&self) -> Option<u32> {
        self.identity.seq
    }

    pub fn field_value(&self, position: usize) -> Option<&KvValue> {
        self.field_values.get(position).and_then(Option::as_ref)
    }

    pub fn scalar_value(&self, position: usize) -> Option<&KvValue> {
        self.scalar_values.get(position).and_then(Option::as_ref)
    }

    /// Every field value, then every scalar value.
    pub fn values(&self) -> impl Iterator<Item = Option<&KvValue>> {
        self.field_values
            .iter()
            .chain(self.scalar_values.iter())
            .map(Option::as_ref)
    }

    pub(crate) fn set_field(&mut self, position: usize, value: KvValue) {
        set_at(&mut self.field_values, position, value);
    }

    pub(crate) fn set_scalar(&mut self, position: usize, value: KvValue) {
        set_at(&mut self.scalar_values, position, value);
    }

    pub(crate) fn pad(&mut self, fields: usize, scalars: usize) {
        self.field_values.resize(fields, None);
        self.scalar_values.resize(scalars, None);
    }

    /// Moves every value from its column in `from` to the column with the
    /// same key in `to`.
    pub(crate) fn realign(&mut self, from: &ImmutableMetaDocPart, to: &ImmutableMetaDocPart) -> Result<()> {
        let mut field_values = vec![None; to.fields().len()];
        for (position, value) in self.field_values.drain(..).enumerate() {
            let Some(value) = value else { continue };
            let field = from.fields().get(position).ok_or_else(|| misaligned(from))?;
            let target = to
                .field_position(&field.name, field.field_type)
                .ok_or_else(|| missing_column(to, &field.name))?;
            field_values[target] = Some(value);
        }

        let mut scalar_values = vec![None; to.scalars().len()];
        for (position, value) in self.scalar_values.drain(..).enumerate() {
            let Some(value) = value else { continue };
            let scalar = from.scalars().get(position).ok_or_else(|| misaligned(from))?;
            let target = to
                .scalar_position(scalar.field_type)
                .ok_or_else(|| missing_column(to, &scalar.identifier))?;
            scalar_values[target] = Some(value);
        }

        self.field_values = field_values;
        self.scalar_values = scalar_values;
        Ok(())
    }
}

fn set_at(values: &mut Vec<Option<KvValue>>, position: usize, value: KvValue) {
    if values.len() <= position {
        values.resize(position + 1, None);
    }
    values[position] = Some(value);
}

fn misaligned(doc_part: &ImmutableMetaDocPart) -> Error {
    Error::new(
        ErrorKind::Internal,
        format!("row has more values than docpart {} has columns", doc_part.identifier()),
    )
}

fn missing_column(doc_part: &ImmutableMetaDocPart, column: &str) -> Error {
    Error::new(
        ErrorKind::NotFound,
        format!("docpart {} has no column for {}", doc_part.identifier(), column),
    )
}

/// Rows produced for one DocPart by a translation unit.
#[derive(Debug, Clone)]
pub struct DocPartData {
    meta: Arc<ImmutableMetaDocPart>,
    rows: Vec<DocPartRow>,
}

impl DocPartData {
    pub fn new(meta: Arc<ImmutableMetaDocPart>, rows: Vec<DocPartRow>) -> Self {
        DocPartData { meta, rows }
    }

    pub fn meta_doc_part(&self) -> &Arc<ImmutableMetaDocPart> {
        &self.meta
    }

    pub fn table_ref(&self) -> &TableRef {
        self.meta.table_ref()
    }

    pub fn rows(&self) -> &[DocPartRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (Arc<ImmutableMetaDocPart>, Vec<DocPartRow>) {
        (self.meta, self.rows)
    }
}

/// Everything a translation unit produced for one collection.
///
/// DocParts are in first-touched order, so a parent always precedes its
/// children and rows can be inserted front to back.
#[derive(Debug, Clone)]
pub struct CollectionData {
    database: String,
    collection: String,
    doc_parts: Vec<DocPartData>,
}

impl CollectionData {
    pub fn new(database: impl Into<String>, collection: impl Into<String>, doc_parts: Vec<DocPartData>) -> Self {
        CollectionData {
            database: database.into(),
            collection: collection.into(),
            doc_parts,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn doc_parts(&self) -> &[DocPartData] {
        &self.doc_parts
    }

    pub fn doc_part(&self, table_ref: &TableRef) -> Option<&DocPartData> {
        self.doc_parts.iter().find(|dp| dp.table_ref() == table_ref)
    }

    pub fn row_count(&self) -> usize {
        self.doc_parts.iter().map(DocPartData::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Rebinds every DocPart to its committed metadata, which may carry
    /// renamed identifiers and extra columns from concurrent commits.
    pub fn rebind(&mut self, committed: &ImmutableMetaSnapshot) -> Result<()> {
        let collection = committed
            .database(&self.database)
            .and_then(|db| db.collection(&self.collection))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    format!("{}.{} is not in the committed snapshot", self.database, self.collection),
                )
            })?;

        for data in &mut self.doc_parts {
            let target = collection.doc_part(data.meta.table_ref()).ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    format!("docpart {} is not in the committed snapshot", data.meta.table_ref()),
                )
            })?;
            if **target == *data.meta {
                data.meta = target.clone();
                continue;
            }
            for row in &mut data.rows {
                row.realign(&data.meta, target)?;
            }
            data.meta = target.clone();
        }
        Ok(())
    }
}

impl IntoIterator for CollectionData {
    type Item = DocPartData;
    type IntoIter = std::vec::IntoIter<DocPartData>;

    fn into_iter(self) -> Self::IntoIter {
        self.doc_parts.into_iter()
    }
}
