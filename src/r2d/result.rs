use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{FieldType, KvValue, RowIdentity};
use crate::d2r::collection_data::{CollectionData, DocPartData, DocPartRow};
use crate::metainf::{ImmutableMetaDocPart, MetaDocPart};

/// Cursor over the rows of one DocPart.
///
/// Columns are addressed the way rows lay them out: fields first in
/// declaration order, then scalars.
pub trait DocPartResult {
    fn meta_doc_part(&self) -> &Arc<ImmutableMetaDocPart>;

    /// Moves to the next row. `false` once the rows are exhausted.
    fn next_row(&mut self) -> Result<bool>;

    fn read_row_identity(&self) -> Result<RowIdentity>;

    /// Value of `column` in the current row, `None` for NULL.
    fn read_value(&self, field_type: FieldType, column: usize) -> Result<Option<KvValue>>;
}

/// [`DocPartResult`] over rows held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDocPartResult {
    meta: Arc<ImmutableMetaDocPart>,
    rows: Vec<DocPartRow>,
    cursor: Option<usize>,
}

impl InMemoryDocPartResult {
    pub fn new(meta: Arc<ImmutableMetaDocPart>, rows: Vec<DocPartRow>) -> Self {
        InMemoryDocPartResult { meta, rows, cursor: None }
    }

    fn current(&self) -> Result<&DocPartRow> {
        self.cursor
            .and_then(|index| self.rows.get(index))
            .ok_or_else(|| Error::new(ErrorKind::Internal, "cursor is not on a row".to_string()))
    }
}

impl From<DocPartData> for InMemoryDocPartResult {
    fn from(data: DocPartData) -> Self {
        let (meta, rows) = data.into_parts();
        InMemoryDocPartResult::new(meta, rows)
    }
}

impl DocPartResult for InMemoryDocPartResult {
    fn meta_doc_part(&self) -> &Arc<ImmutableMetaDocPart> {
        &self.meta
    }

    fn next_row(&mut self) -> Result<bool> {
        let next = self.cursor.map_or(0, |index| index + 1);
        self.cursor = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn read_row_identity(&self) -> Result<RowIdentity> {
        Ok(self.current()?.identity())
    }

    fn read_value(&self, field_type: FieldType, column: usize) -> Result<Option<KvValue>> {
        let row = self.current()?;
        let fields = self.meta.fields().len();
        let (declared, value) = if column < fields {
            (self.meta.fields()[column].field_type, row.field_value(column))
        } else {
            let scalar = self.meta.scalars().get(column - fields).ok_or_else(|| {
                Error::illegal_row(format!("column {} is out of range for {}", column, self.meta.identifier()))
            })?;
            (scalar.field_type, row.scalar_value(column - fields))
        };

        if declared != field_type {
            return Err(Error::illegal_row(format!(
                "column {} of {} is {:?}, read as {:?}",
                column,
                self.meta.identifier(),
                declared,
                field_type
            )));
        }
        match value {
            Some(value) if !field_type.accepts(value) => Err(Error::illegal_row(format!(
                "column {} of {} holds a {} value",
                column,
                self.meta.identifier(),
                value.type_name()
            ))),
            other => Ok(other.cloned()),
        }
    }
}

/// Cursors over a translated unit, deepest DocParts first.
pub fn deepest_first(data: CollectionData) -> Vec<InMemoryDocPartResult> {
    let mut results: Vec<InMemoryDocPartResult> = data.into_iter().map(InMemoryDocPartResult::from).collect();
    results.sort_by_key(|r| std::cmp::Reverse(r.meta.table_ref().depth()));
    results
}
