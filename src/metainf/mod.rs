pub mod immutable;
pub mod mutable;
pub mod merge;
pub mod repository;

use serde::{Deserialize, Serialize};
use crate::core::table_ref::TableRef;
use crate::core::types::FieldType;

pub use immutable::{ImmutableMetaCollection, ImmutableMetaDatabase, ImmutableMetaDocPart, ImmutableMetaSnapshot};
pub use mutable::{MetaElementState, MutableMetaCollection, MutableMetaDatabase, MutableMetaDocPart, MutableMetaSnapshot};

/// Named, typed column of a DocPart. Keyed by (name, type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaField {
    pub name: String,
    pub identifier: String,
    pub field_type: FieldType,
}

impl MetaField {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>, field_type: FieldType) -> Self {
        MetaField {
            name: name.into(),
            identifier: identifier.into(),
            field_type,
        }
    }
}

/// Unnamed column holding scalar array elements. Keyed by type only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaScalar {
    pub identifier: String,
    pub field_type: FieldType,
}

impl MetaScalar {
    pub fn new(identifier: impl Into<String>, field_type: FieldType) -> Self {
        MetaScalar {
            identifier: identifier.into(),
            field_type,
        }
    }
}

/// Read view shared by committed and in-progress snapshots.
pub trait MetaSnapshot {
    fn database_identifiers(&self) -> Box<dyn Iterator<Item = &str> + '_>;
}

pub trait MetaDatabase {
    fn name(&self) -> &str;

    fn identifier(&self) -> &str;

    /// Identifiers of every DocPart of every collection; the table scope.
    fn doc_part_identifiers(&self) -> Box<dyn Iterator<Item = &str> + '_>;
}

pub trait MetaDocPart {
    fn table_ref(&self) -> &TableRef;

    fn identifier(&self) -> &str;

    /// Fields in declaration order.
    fn fields(&self) -> &[MetaField];

    /// Scalars in declaration order.
    fn scalars(&self) -> &[MetaScalar];

    fn field_position(&self, name: &str, field_type: FieldType) -> Option<usize> {
        self.fields()
            .iter()
            .position(|f| f.name == name && f.field_type == field_type)
    }

    fn field_by_name_and_type(&self, name: &str, field_type: FieldType) -> Option<&MetaField> {
        self.field_position(name, field_type).map(|p| &self.fields()[p])
    }

    fn scalar_position(&self, field_type: FieldType) -> Option<usize> {
        self.scalars().iter().position(|s| s.field_type == field_type)
    }

    /// Identifiers of fields and scalars; the column scope.
    fn column_identifiers(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(
            self.fields()
                .iter()
                .map(|f| f.identifier.as_str())
                .chain(self.scalars().iter().map(|s| s.identifier.as_str())),
        )
    }

    /// Values per row: every field, then every scalar.
    fn column_count(&self) -> usize {
        self.fields().len() + self.scalars().len()
    }
}
