use std::fmt;
use tracing::{debug, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::table_ref::TableRef;
use crate::core::types::FieldType;
use crate::identifier::IdentifierFactory;
use crate::metainf::immutable::{ImmutableMetaCollection, ImmutableMetaDatabase, ImmutableMetaDocPart, ImmutableMetaSnapshot};
use crate::metainf::mutable::{MetaElementState, MutableMetaCollection, MutableMetaDatabase, MutableMetaDocPart, MutableMetaSnapshot};
use crate::metainf::{MetaDatabase, MetaDocPart, MetaField, MetaSnapshot};

/// An element the unit created under one identifier that the merged
/// snapshot knows under another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierRename {
    Database {
        name: String,
        from: String,
        to: String,
    },
    DocPart {
        database: String,
        collection: String,
        table_ref: TableRef,
        from: String,
        to: String,
    },
    Field {
        database: String,
        collection: String,
        table_ref: TableRef,
        name: String,
        field_type: FieldType,
        from: String,
        to: String,
    },
}

impl fmt::Display for IdentifierRename {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IdentifierRename::Database { name, from, to } => {
                write!(f, "database {}: {} -> {}", name, from, to)
            }
            IdentifierRename::DocPart { database, collection, table_ref, from, to } => {
                write!(f, "docpart {}.{} {}: {} -> {}", database, collection, table_ref, from, to)
            }
            IdentifierRename::Field { database, collection, table_ref, name, field_type, from, to } => {
                write!(
                    f,
                    "field {}.{} {} {}:{:?}: {} -> {}",
                    database, collection, table_ref, name, field_type, from, to
                )
            }
        }
    }
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub snapshot: ImmutableMetaSnapshot,
    pub renames: Vec<IdentifierRename>,
}

/// Folds a unit's mutable snapshot into the latest committed one.
///
/// Elements are matched by their logical key: databases and collections by
/// name, DocParts by `TableRef`, fields by (name, type), scalars by type.
/// A match reuses the committed identifier. A new element whose identifier
/// is already held by something else gets a fresh one from the factory.
pub struct SnapshotMerger<'a> {
    factory: &'a IdentifierFactory,
}

impl<'a> SnapshotMerger<'a> {
    pub fn new(factory: &'a IdentifierFactory) -> Self {
        SnapshotMerger { factory }
    }

    pub fn merge(&self, committed: &ImmutableMetaSnapshot, changes: &MutableMetaSnapshot) -> Result<MergeOutcome> {
        let mut snapshot = committed.clone();
        let mut renames = Vec::new();

        for changed in changes.modified_databases() {
            let database = self.merge_database(&snapshot, changed, &mut renames)?;
            snapshot.put_database(database);
        }

        if !renames.is_empty() {
            debug!(renames = renames.len(), "merge renamed identifiers");
        }
        Ok(MergeOutcome { snapshot, renames })
    }

    fn merge_database(
        &self,
        snapshot: &ImmutableMetaSnapshot,
        changed: &MutableMetaDatabase,
        renames: &mut Vec<IdentifierRename>,
    ) -> Result<ImmutableMetaDatabase> {
        let mut database = match snapshot.database(changed.name()) {
            Some(existing) => (**existing).clone(),
            None => {
                let identifier = self.free_schema_identifier(snapshot, changed)?;
                ImmutableMetaDatabase::new(changed.name(), identifier)
            }
        };
        if database.identifier() != changed.identifier() {
            renames.push(IdentifierRename::Database {
                name: changed.name().to_string(),
                from: changed.identifier().to_string(),
                to: database.identifier().to_string(),
            });
        }

        for collection in changed.modified_collections() {
            let merged = self.merge_collection(&database, collection, renames)?;
            database.put_collection(merged);
        }
        Ok(database)
    }

    fn free_schema_identifier(&self, snapshot: &ImmutableMetaSnapshot, changed: &MutableMetaDatabase) -> Result<String> {
        let constraints = self.factory.constraints();
        let taken = snapshot
            .database_identifiers()
            .any(|id| constraints.is_same_identifier(id, changed.identifier()));
        if !taken {
            return Ok(changed.identifier().to_string());
        }
        self.factory
            .schema_identifier(snapshot, changed.name())
            .map_err(|e| conflict(e, format!("database {}", changed.name())))
    }

    fn merge_collection(
        &self,
        database: &ImmutableMetaDatabase,
        changed: &MutableMetaCollection,
        renames: &mut Vec<IdentifierRename>,
    ) -> Result<ImmutableMetaCollection> {
        let mut collection = match database.collection(changed.name()) {
            Some(existing) => (**existing).clone(),
            None => ImmutableMetaCollection::new(changed.name(), changed.identifier()),
        };

        for doc_part in changed.modified_doc_parts() {
            let merged = self.merge_doc_part(database, &collection, doc_part, renames)?;
            if merged.table_ref().is_root() {
                collection.set_identifier(merged.identifier().to_string());
            }
            collection.put_doc_part(merged);
        }
        Ok(collection)
    }

    fn merge_doc_part(
        &self,
        database: &ImmutableMetaDatabase,
        collection: &ImmutableMetaCollection,
        changed: &MutableMetaDocPart,
        renames: &mut Vec<IdentifierRename>,
    ) -> Result<ImmutableMetaDocPart> {
        let table_ref = changed.table_ref();
        let (mut doc_part, new_columns) = match collection.doc_part(table_ref) {
            Some(existing) => ((**existing).clone(), changed.state() == MetaElementState::Added),
            None => {
                let identifier = self.free_table_identifier(database, collection, changed)?;
                (ImmutableMetaDocPart::new(table_ref.clone(), identifier), true)
            }
        };
        if doc_part.identifier() != changed.identifier() {
            renames.push(IdentifierRename::DocPart {
                database: database.name().to_string(),
                collection: collection.name().to_string(),
                table_ref: table_ref.clone(),
                from: changed.identifier().to_string(),
                to: doc_part.identifier().to_string(),
            });
        }

        // an Added DocPart owns all of its columns
        let (fields, scalars) = if new_columns {
            (changed.fields(), changed.scalars())
        } else {
            (changed.added_fields(), changed.added_scalars())
        };

        for field in fields {
            self.merge_field(database, collection, &mut doc_part, field, renames)?;
        }

        for scalar in scalars {
            if doc_part.scalar_position(scalar.field_type).is_some() {
                continue;
            }
            let constraints = self.factory.constraints();
            if doc_part
                .column_identifiers()
                .any(|id| constraints.is_same_identifier(id, &scalar.identifier))
            {
                return Err(Error::new(
                    ErrorKind::SchemaMergeConflict,
                    format!(
                        "scalar {} of {}.{} {} collides with an existing column",
                        scalar.identifier,
                        database.name(),
                        collection.name(),
                        table_ref
                    ),
                ));
            }
            doc_part.push_scalar(scalar.clone());
        }
        Ok(doc_part)
    }

    fn free_table_identifier(
        &self,
        database: &ImmutableMetaDatabase,
        collection: &ImmutableMetaCollection,
        changed: &MutableMetaDocPart,
    ) -> Result<String> {
        let scope = PendingDatabase { database, collection };
        let constraints = self.factory.constraints();
        let taken = scope
            .doc_part_identifiers()
            .any(|id| constraints.is_same_identifier(id, changed.identifier()));
        if !taken {
            return Ok(changed.identifier().to_string());
        }
        warn!(
            collection = %collection.name(),
            table_ref = %changed.table_ref(),
            identifier = %changed.identifier(),
            "docpart identifier taken by a concurrent commit"
        );
        self.factory
            .table_identifier(&scope, collection.name(), changed.table_ref())
            .map_err(|e| conflict(e, format!("docpart {}.{}", collection.name(), changed.table_ref())))
    }

    fn merge_field(
        &self,
        database: &ImmutableMetaDatabase,
        collection: &ImmutableMetaCollection,
        doc_part: &mut ImmutableMetaDocPart,
        field: &MetaField,
        renames: &mut Vec<IdentifierRename>,
    ) -> Result<()> {
        let rename = |to: &str| IdentifierRename::Field {
            database: database.name().to_string(),
            collection: collection.name().to_string(),
            table_ref: doc_part.table_ref().clone(),
            name: field.name.clone(),
            field_type: field.field_type,
            from: field.identifier.clone(),
            to: to.to_string(),
        };

        if let Some(existing) = doc_part.field_by_name_and_type(&field.name, field.field_type) {
            if existing.identifier != field.identifier {
                renames.push(rename(&existing.identifier));
            }
            return Ok(());
        }

        let constraints = self.factory.constraints();
        let taken = doc_part
            .column_identifiers()
            .any(|id| constraints.is_same_identifier(id, &field.identifier));
        let identifier = if taken {
            let fresh = self
                .factory
                .field_identifier(&*doc_part, field.field_type, &field.name)
                .map_err(|e| conflict(e, format!("field {} of {}", field.name, doc_part.table_ref())))?;
            renames.push(rename(&fresh));
            fresh
        } else {
            field.identifier.clone()
        };
        doc_part.push_field(MetaField::new(field.name.clone(), identifier, field.field_type));
        Ok(())
    }
}

fn conflict(cause: Error, element: String) -> Error {
    match cause.kind {
        ErrorKind::IdentifierSpaceExhausted => Error::new(
            ErrorKind::SchemaMergeConflict,
            format!("{} cannot be given a unique identifier: {}", element, cause.context),
        ),
        _ => cause,
    }
}

/// Table scope of a database whose collection is mid-merge.
struct PendingDatabase<'a> {
    database: &'a ImmutableMetaDatabase,
    collection: &'a ImmutableMetaCollection,
}

impl MetaDatabase for PendingDatabase<'_> {
    fn name(&self) -> &str {
        self.database.name()
    }

    fn identifier(&self) -> &str {
        self.database.identifier()
    }

    fn doc_part_identifiers(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        let others = self
            .database
            .collections()
            .filter(move |c| c.name() != self.collection.name())
            .flat_map(|c| c.doc_parts().map(|dp| dp.identifier()));
        let pending = self.collection.doc_parts().map(|dp| dp.identifier());
        Box::new(others.chain(pending))
    }
}
