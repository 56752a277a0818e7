use std::sync::Arc;
use regex::Regex;
use tracing::trace;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::table_ref::{TableRef, TableRefSegment};
use crate::core::types::FieldType;
use crate::identifier::constraints::IdentifierConstraints;
use crate::metainf::{MetaDatabase, MetaDocPart, MetaSnapshot};

/// Derives backend identifiers for databases, DocParts and columns.
///
/// A name chain is normalized (lowercase, unsupported characters replaced
/// by the separator) and joined with the separator. When the result is
/// too long or already taken in its scope, a counter is spliced in and the
/// middle of the chain is elided until the identifier fits and is unique.
pub struct IdentifierFactory {
    constraints: Arc<dyn IdentifierConstraints>,
    unsupported_chars: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Schema,
    Table,
    Column,
}

impl IdentifierFactory {
    pub fn new(constraints: Arc<dyn IdentifierConstraints>) -> Result<Self> {
        if !constraints.separator().is_ascii() || !constraints.array_dimension_separator().is_ascii() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "identifier separators must be ASCII".to_string(),
            ));
        }
        let pattern = format!(
            "[^0-9a-z{}{}]",
            regex::escape(&constraints.separator().to_string()),
            regex::escape(&constraints.array_dimension_separator().to_string()),
        );
        let unsupported_chars = Regex::new(&pattern)
            .map_err(|e| Error::new(ErrorKind::InvalidArgument, format!("bad separators: {}", e)))?;
        Ok(IdentifierFactory { constraints, unsupported_chars })
    }

    pub fn constraints(&self) -> &dyn IdentifierConstraints {
        self.constraints.as_ref()
    }

    pub fn schema_identifier<S>(&self, snapshot: &S, database: &str) -> Result<String>
    where
        S: MetaSnapshot + ?Sized,
    {
        let chain = vec![self.normalize(database)];
        self.generate(&chain, None, Scope::Schema, |candidate| {
            snapshot
                .database_identifiers()
                .all(|existing| !self.constraints.is_same_identifier(existing, candidate))
        })
    }

    /// Identifier of the collection, which is also its root DocPart.
    pub fn collection_identifier<D>(&self, database: &D, collection: &str) -> Result<String>
    where
        D: MetaDatabase + ?Sized,
    {
        self.table_identifier(database, collection, &TableRef::root())
    }

    pub fn table_identifier<D>(&self, database: &D, collection: &str, table_ref: &TableRef) -> Result<String>
    where
        D: MetaDatabase + ?Sized,
    {
        let chain = self.table_chain(collection, table_ref);
        self.generate(&chain, None, Scope::Table, |candidate| {
            database
                .doc_part_identifiers()
                .all(|existing| !self.constraints.is_same_identifier(existing, candidate))
        })
    }

    pub fn field_identifier<P>(&self, doc_part: &P, field_type: FieldType, field_name: &str) -> Result<String>
    where
        P: MetaDocPart + ?Sized,
    {
        let chain = vec![self.normalize(field_name)];
        let suffix = self.constraints.field_type_identifier(field_type);
        self.generate(&chain, Some(suffix), Scope::Column, |candidate| {
            doc_part
                .column_identifiers()
                .all(|existing| !self.constraints.is_same_identifier(existing, candidate))
        })
    }

    pub fn scalar_identifier(&self, field_type: FieldType) -> String {
        self.constraints.scalar_identifier(field_type)
    }

    fn normalize(&self, name: &str) -> String {
        let separator = self.constraints.separator().to_string();
        self.unsupported_chars
            .replace_all(&name.to_lowercase(), separator.as_str())
            .into_owned()
    }

    /// Collection name followed by each named position of `table_ref`. An
    /// anonymous array level renders as `<nearest name><sep><dimension>`
    /// and stands in for that name.
    fn table_chain(&self, collection: &str, table_ref: &TableRef) -> Vec<String> {
        let mut chain = vec![self.normalize(collection)];
        let mut last_name = "";
        for segment in table_ref.segments() {
            match segment {
                TableRefSegment::Name(name) => {
                    chain.push(self.normalize(name));
                    last_name = name;
                }
                TableRefSegment::ArrayDimension(dimension) => {
                    chain.pop();
                    chain.push(self.normalize(&format!(
                        "{}{}{}",
                        last_name,
                        self.constraints.array_dimension_separator(),
                        dimension
                    )));
                }
            }
        }
        chain
    }

    fn generate<F>(&self, chain: &[String], suffix: Option<char>, scope: Scope, is_unique: F) -> Result<String>
    where
        F: Fn(&str) -> bool,
    {
        let max_length = self.constraints.max_identifier_length();

        let identifier = self.build(chain, None, suffix, scope)?;
        if identifier.len() <= max_length && is_unique(&identifier) {
            return Ok(identifier);
        }

        let mut counter: u64 = 1;
        loop {
            let identifier = self.build(chain, Some(counter), suffix, scope)?;
            if identifier.len() > max_length {
                return Err(exhausted(chain, max_length));
            }
            if is_unique(&identifier) {
                trace!(identifier = %identifier, counter, "disambiguated identifier");
                return Ok(identifier);
            }
            counter += 1;
        }
    }

    fn build(&self, chain: &[String], counter: Option<u64>, suffix: Option<char>, scope: Scope) -> Result<String> {
        let separator = self.constraints.separator();
        let max_length = self.constraints.max_identifier_length();
        // room left for `<sep><type char>`
        let name_max = match suffix {
            Some(_) => max_length.saturating_sub(2),
            None => max_length,
        };

        let whole = chain.join(&separator.to_string());
        let mut identifier = match counter {
            None => whole,
            Some(counter) => {
                splice_counter(&whole, &format!("{}{}", separator, counter), name_max)
                    .ok_or_else(|| exhausted(chain, max_length))?
            }
        };

        if let Some(suffix) = suffix {
            identifier.push(separator);
            identifier.push(suffix);
        }

        let allowed = match scope {
            Scope::Schema => self.constraints.is_allowed_schema_identifier(&identifier),
            Scope::Table => self.constraints.is_allowed_table_identifier(&identifier),
            Scope::Column => self.constraints.is_allowed_column_identifier(&identifier),
        };
        if !allowed {
            identifier.insert(0, separator);
        }
        Ok(identifier)
    }
}

/// Appends `value` to `name`, dropping characters from the middle of
/// `name` when the result would not be shorter than `max_length`.
fn splice_counter(name: &str, value: &str, max_length: usize) -> Option<String> {
    if name.len() + value.len() < max_length {
        return Some(format!("{}{}", name, value));
    }
    let available = name.len().min(max_length).checked_sub(value.len())?;
    let head = available / 2 + available % 2;
    let tail = available / 2;
    Some(format!("{}{}{}", &name[..head], &name[name.len() - tail..], value))
}

fn exhausted(chain: &[String], max_length: usize) -> Error {
    Error::new(
        ErrorKind::IdentifierSpaceExhausted,
        format!("no identifier of at most {} characters left for {:?}", max_length, chain),
    )
}
