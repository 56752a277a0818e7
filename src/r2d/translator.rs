use std::collections::HashMap;
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::core::table_ref::TableRef;
use crate::core::types::{FieldType, KvDocument, KvValue, RowId, RowIdentity, TranslatedDocument};
use crate::metainf::{ImmutableMetaDocPart, MetaDocPart};
use crate::r2d::result::DocPartResult;

/// Values of child rows waiting for their parent, keyed by parent `rid`.
/// Each entry keeps the child's `did` next to its `seq`.
type Attachments = HashMap<RowId, Vec<(RowId, Option<u32>, KvValue)>>;

/// Rebuilds documents from DocPart rows.
///
/// Results must come deepest DocPart first, so that every child row is
/// pending by the time its parent row is read. Each DocPart appears in one
/// result at most. Documents come out in the order of the root rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct R2DTranslator;

impl R2DTranslator {
    pub fn new() -> Self {
        R2DTranslator
    }

    pub fn translate<I, R>(&self, results: I) -> Result<Vec<TranslatedDocument>>
    where
        I: IntoIterator<Item = R>,
        R: DocPartResult,
    {
        let mut pending: HashMap<TableRef, Attachments> = HashMap::new();
        let mut documents = Vec::new();

        for mut result in results {
            let meta = result.meta_doc_part().clone();
            let table_ref = meta.table_ref().clone();

            let child_refs: Vec<TableRef> = pending
                .keys()
                .filter(|child| child.parent().as_ref() == Some(&table_ref))
                .cloned()
                .collect();
            let mut children: HashMap<TableRef, Attachments> = child_refs
                .into_iter()
                .filter_map(|child| pending.remove_entry(&child))
                .collect();

            let mut rows = 0usize;
            while result.next_row()? {
                let identity = result.read_row_identity()?;
                let value = read_row(&meta, &result, &identity, &mut children)?;
                rows += 1;

                if table_ref.is_root() {
                    let document = match value {
                        KvValue::Document(document) if identity.seq.is_none() => document,
                        _ => {
                            return Err(Error::illegal_row(format!(
                                "root row {} is not a document",
                                identity.rid
                            )));
                        }
                    };
                    documents.push(TranslatedDocument { did: identity.did, document });
                } else {
                    let pid = identity.pid.ok_or_else(|| {
                        Error::illegal_row(format!("row {} of {} has no parent", identity.rid, table_ref))
                    })?;
                    pending
                        .entry(table_ref.clone())
                        .or_default()
                        .entry(pid)
                        .or_default()
                        .push((identity.did, identity.seq, value));
                }
            }

            for (child, attachments) in children {
                if let Some(pid) = attachments.keys().next() {
                    return Err(Error::illegal_row(format!(
                        "rows of {} reference parent {} which {} does not have",
                        child, pid, table_ref
                    )));
                }
            }
            debug!(table_ref = %table_ref, rows, "read docpart rows");
        }

        if let Some((table_ref, attachments)) = pending.iter().find(|(_, a)| !a.is_empty()) {
            let pid = attachments.keys().next().copied().unwrap_or_default();
            return Err(Error::illegal_row(format!(
                "rows of {} reference parent {} but no parent rows were read",
                table_ref, pid
            )));
        }
        Ok(documents)
    }
}

/// Reads the current row as a document, or as an array element when a
/// scalar column is set.
fn read_row<R: DocPartResult>(
    meta: &ImmutableMetaDocPart,
    result: &R,
    identity: &RowIdentity,
    children: &mut HashMap<TableRef, Attachments>,
) -> Result<KvValue> {
    let table_ref = meta.table_ref();
    let field_count = meta.fields().len();

    let mut element = None;
    for (position, scalar) in meta.scalars().iter().enumerate() {
        let Some(value) = result.read_value(scalar.field_type, field_count + position)? else {
            continue;
        };
        if element.is_some() {
            return Err(Error::illegal_row(format!(
                "row {} of {} has more than one scalar value",
                identity.rid, table_ref
            )));
        }
        let value = if scalar.field_type == FieldType::Child {
            if value.as_bool() != Some(true) {
                return Err(Error::illegal_row(format!(
                    "row {} of {} holds a nested array marker that is not true",
                    identity.rid, table_ref
                )));
            }
            let entries = take_entries(children, &table_ref.array_child(), identity)?;
            collect_array(entries, identity, table_ref)?
        } else {
            value
        };
        element = Some(value);
    }

    if let Some(element) = element {
        if identity.seq.is_none() {
            return Err(Error::illegal_row(format!(
                "row {} of {} holds a scalar but is not an array element",
                identity.rid, table_ref
            )));
        }
        return Ok(element);
    }

    let mut document = KvDocument::new();
    for (position, field) in meta.fields().iter().enumerate() {
        let Some(value) = result.read_value(field.field_type, position)? else {
            continue;
        };
        let value = if field.field_type == FieldType::Child {
            let is_array = value.as_bool().ok_or_else(|| {
                Error::illegal_row(format!("field {} of row {} holds a non-boolean marker", field.name, identity.rid))
            })?;
            let entries = take_entries(children, &table_ref.child(&field.name), identity)?;
            if is_array {
                collect_array(entries, identity, table_ref)?
            } else {
                match collect_subdocument(entries, identity, &field.name)? {
                    Some(subdocument) => subdocument,
                    None => continue,
                }
            }
        } else {
            value
        };

        if document.contains_key(&field.name) {
            return Err(Error::illegal_row(format!(
                "row {} of {} has several values for field {}",
                identity.rid, table_ref, field.name
            )));
        }
        document.insert(field.name.clone(), value);
    }
    Ok(KvValue::Document(document))
}

/// Claims the child rows of `parent`. They must belong to its document.
fn take_entries(
    children: &mut HashMap<TableRef, Attachments>,
    child_ref: &TableRef,
    parent: &RowIdentity,
) -> Result<Vec<(Option<u32>, KvValue)>> {
    let entries = children
        .get_mut(child_ref)
        .and_then(|attachments| attachments.remove(&parent.rid))
        .unwrap_or_default();
    entries
        .into_iter()
        .map(|(did, seq, value)| {
            if did != parent.did {
                return Err(Error::illegal_row(format!(
                    "row of {} in document {} points at parent {} of document {}",
                    child_ref, did, parent.rid, parent.did
                )));
            }
            Ok((seq, value))
        })
        .collect()
}

/// Orders element rows by `seq`. Positions must be exactly `0..n`.
fn collect_array(
    mut entries: Vec<(Option<u32>, KvValue)>,
    identity: &RowIdentity,
    table_ref: &TableRef,
) -> Result<KvValue> {
    if entries.iter().any(|(seq, _)| seq.is_none()) {
        return Err(Error::illegal_row(format!(
            "array under row {} of {} has an element without seq",
            identity.rid, table_ref
        )));
    }
    entries.sort_by_key(|(seq, _)| *seq);
    let mut elements = Vec::with_capacity(entries.len());
    for (index, (seq, value)) in entries.into_iter().enumerate() {
        if seq != Some(index as u32) {
            return Err(Error::illegal_row(format!(
                "array under row {} of {} has a gap or duplicate at position {}",
                identity.rid, table_ref, index
            )));
        }
        elements.push(value);
    }
    Ok(KvValue::Array(elements))
}

fn collect_subdocument(
    mut entries: Vec<(Option<u32>, KvValue)>,
    identity: &RowIdentity,
    field: &str,
) -> Result<Option<KvValue>> {
    match entries.len() {
        0 => Ok(None),
        1 => match entries.pop() {
            Some((None, value @ KvValue::Document(_))) => Ok(Some(value)),
            _ => Err(Error::illegal_row(format!(
                "subdocument {} of row {} is stored as an array element",
                field, identity.rid
            ))),
        },
        n => Err(Error::illegal_row(format!(
            "subdocument {} of row {} has {} rows",
            field, identity.rid, n
        ))),
    }
}
