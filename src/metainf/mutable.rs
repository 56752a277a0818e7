use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::table_ref::TableRef;
use crate::core::types::FieldType;
use crate::identifier::IdentifierFactory;
use crate::metainf::immutable::{ImmutableMetaCollection, ImmutableMetaDatabase, ImmutableMetaDocPart, ImmutableMetaSnapshot};
use crate::metainf::{MetaDatabase, MetaDocPart, MetaField, MetaScalar, MetaSnapshot};

/// What a mutable element did relative to the snapshot it was opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaElementState {
    NotChanged,
    Added,
    Modified,
}

/// Copy-on-write overlay of an [`ImmutableMetaSnapshot`] owned by one
/// translation unit. Only elements the unit touches are wrapped; everything
/// else is read through from the base.
#[derive(Debug)]
pub struct MutableMetaSnapshot {
    base: Arc<ImmutableMetaSnapshot>,
    base_version: u64,
    databases: BTreeMap<String, MutableMetaDatabase>,
}

impl MutableMetaSnapshot {
    pub fn new(base: Arc<ImmutableMetaSnapshot>, base_version: u64) -> Self {
        MutableMetaSnapshot {
            base,
            base_version,
            databases: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &Arc<ImmutableMetaSnapshot> {
        &self.base
    }

    /// Version of the committed snapshot this overlay started from.
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Database touched by this unit.
    pub fn database(&self, name: &str) -> Option<&MutableMetaDatabase> {
        self.databases.get(name)
    }

    /// Wraps the committed database on first access.
    pub fn database_mut(&mut self, name: &str) -> Option<&mut MutableMetaDatabase> {
        if !self.databases.contains_key(name) {
            let base = self.base.database(name)?.clone();
            self.databases.insert(name.to_string(), MutableMetaDatabase::wrap(base));
        }
        self.databases.get_mut(name)
    }

    pub fn get_or_create_database(
        &mut self,
        name: &str,
        factory: &IdentifierFactory,
    ) -> Result<&mut MutableMetaDatabase> {
        let known = self.databases.contains_key(name) || self.base.database(name).is_some();
        if !known {
            let identifier = factory.schema_identifier(&*self, name)?;
            debug!(database = %name, identifier = %identifier, "registering database");
            self.databases
                .insert(name.to_string(), MutableMetaDatabase::added(name, identifier));
        }
        self.database_mut(name).ok_or_else(|| {
            Error::new(
                ErrorKind::Internal,
                format!("database {} vanished from the snapshot", name),
            )
        })
    }

    /// Databases that gained or changed anything.
    pub fn modified_databases(&self) -> impl Iterator<Item = &MutableMetaDatabase> {
        self.databases
            .values()
            .filter(|db| db.state() != MetaElementState::NotChanged)
    }

    pub fn has_changes(&self) -> bool {
        self.modified_databases().next().is_some()
    }

    /// Folds the overlay into a fresh immutable snapshot, ignoring
    /// whatever was committed after the base.
    pub fn immutable_copy(&self) -> ImmutableMetaSnapshot {
        let mut snapshot = (*self.base).clone();
        for database in self.modified_databases() {
            snapshot.put_database(database.immutable_copy());
        }
        snapshot
    }
}

impl MetaSnapshot for MutableMetaSnapshot {
    fn database_identifiers(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        let untouched = self
            .base
            .databases()
            .filter(|db| !self.databases.contains_key(db.name()))
            .map(|db| db.identifier());
        Box::new(untouched.chain(self.databases.values().map(|db| db.identifier.as_str())))
    }
}

#[derive(Debug)]
pub struct MutableMetaDatabase {
    base: Option<Arc<ImmutableMetaDatabase>>,
    name: String,
    identifier: String,
    collections: BTreeMap<String, MutableMetaCollection>,
}

impl MutableMetaDatabase {
    fn wrap(base: Arc<ImmutableMetaDatabase>) -> Self {
        MutableMetaDatabase {
            name: base.name().to_string(),
            identifier: base.identifier().to_string(),
            base: Some(base),
            collections: BTreeMap::new(),
        }
    }

    fn added(name: &str, identifier: String) -> Self {
        MutableMetaDatabase {
            base: None,
            name: name.to_string(),
            identifier,
            collections: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> Option<&Arc<ImmutableMetaDatabase>> {
        self.base.as_ref()
    }

    pub fn state(&self) -> MetaElementState {
        if self.base.is_none() {
            MetaElementState::Added
        } else if self.collections.values().any(|c| c.state() != MetaElementState::NotChanged) {
            MetaElementState::Modified
        } else {
            MetaElementState::NotChanged
        }
    }

    /// Collection touched by this unit.
    pub fn collection(&self, name: &str) -> Option<&MutableMetaCollection> {
        self.collections.get(name)
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut MutableMetaCollection> {
        if !self.collections.contains_key(name) {
            let base = self.base.as_ref()?.collection(name)?.clone();
            self.collections.insert(name.to_string(), MutableMetaCollection::wrap(base));
        }
        self.collections.get_mut(name)
    }

    /// Creates the collection with its root DocPart when it is unknown.
    pub fn get_or_create_collection(
        &mut self,
        name: &str,
        factory: &IdentifierFactory,
    ) -> Result<&mut MutableMetaCollection> {
        let known = self.collections.contains_key(name)
            || self.base.as_ref().is_some_and(|b| b.collection(name).is_some());
        if !known {
            let identifier = factory.collection_identifier(&*self, name)?;
            debug!(database = %self.name, collection = %name, identifier = %identifier, "registering collection");
            self.collections
                .insert(name.to_string(), MutableMetaCollection::added(name, identifier));
        }
        self.collection_mut(name).ok_or_else(|| {
            Error::new(
                ErrorKind::Internal,
                format!("collection {} vanished from the snapshot", name),
            )
        })
    }

    pub fn modified_collections(&self) -> impl Iterator<Item = &MutableMetaCollection> {
        self.collections
            .values()
            .filter(|c| c.state() != MetaElementState::NotChanged)
    }

    pub fn immutable_copy(&self) -> ImmutableMetaDatabase {
        let mut database = match &self.base {
            Some(base) => (**base).clone(),
            None => ImmutableMetaDatabase::new(self.name.clone(), self.identifier.clone()),
        };
        for collection in self.modified_collections() {
            database.put_collection(collection.immutable_copy());
        }
        database
    }
}

impl MetaDatabase for MutableMetaDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn doc_part_identifiers(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        let untouched = self
            .base
            .iter()
            .flat_map(|base| base.collections())
            .filter(|c| !self.collections.contains_key(c.name()))
            .flat_map(|c| c.doc_parts().map(|dp| dp.identifier()));
        let touched = self
            .collections
            .values()
            .flat_map(|c| c.doc_parts.iter().map(|dp| dp.identifier.as_str()));
        Box::new(untouched.chain(touched))
    }
}

#[derive(Debug)]
pub struct MutableMetaCollection {
    base: Option<Arc<ImmutableMetaCollection>>,
    name: String,
    identifier: String,
    doc_parts: Vec<MutableMetaDocPart>,
    by_ref: HashMap<TableRef, usize>,
}

impl MutableMetaCollection {
    fn wrap(base: Arc<ImmutableMetaCollection>) -> Self {
        let doc_parts: Vec<MutableMetaDocPart> = base
            .doc_parts()
            .map(|dp| MutableMetaDocPart::wrap(dp.clone()))
            .collect();
        let by_ref = doc_parts
            .iter()
            .enumerate()
            .map(|(index, dp)| (dp.table_ref.clone(), index))
            .collect();
        MutableMetaCollection {
            name: base.name().to_string(),
            identifier: base.identifier().to_string(),
            base: Some(base),
            doc_parts,
            by_ref,
        }
    }

    fn added(name: &str, identifier: String) -> Self {
        let root = MutableMetaDocPart::added(TableRef::root(), identifier.clone());
        let mut by_ref = HashMap::new();
        by_ref.insert(TableRef::root(), 0);
        MutableMetaCollection {
            base: None,
            name: name.to_string(),
            identifier,
            doc_parts: vec![root],
            by_ref,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn state(&self) -> MetaElementState {
        if self.base.is_none() {
            MetaElementState::Added
        } else if self.doc_parts.iter().any(|dp| dp.state() != MetaElementState::NotChanged) {
            MetaElementState::Modified
        } else {
            MetaElementState::NotChanged
        }
    }

    pub fn doc_part_index(&self, table_ref: &TableRef) -> Option<usize> {
        self.by_ref.get(table_ref).copied()
    }

    pub fn doc_part(&self, index: usize) -> &MutableMetaDocPart {
        &self.doc_parts[index]
    }

    pub fn doc_part_mut(&mut self, index: usize) -> &mut MutableMetaDocPart {
        &mut self.doc_parts[index]
    }

    pub fn doc_part_by_ref(&self, table_ref: &TableRef) -> Option<&MutableMetaDocPart> {
        self.doc_part_index(table_ref).map(|index| &self.doc_parts[index])
    }

    pub fn doc_parts(&self) -> impl Iterator<Item = &MutableMetaDocPart> {
        self.doc_parts.iter()
    }

    pub fn modified_doc_parts(&self) -> impl Iterator<Item = &MutableMetaDocPart> {
        self.doc_parts
            .iter()
            .filter(|dp| dp.state() != MetaElementState::NotChanged)
    }

    /// Registers a DocPart the collection did not have. Returns its index.
    pub fn add_doc_part(&mut self, table_ref: TableRef, identifier: String) -> usize {
        if let Some(index) = self.doc_part_index(&table_ref) {
            return index;
        }
        let index = self.doc_parts.len();
        self.by_ref.insert(table_ref.clone(), index);
        self.doc_parts.push(MutableMetaDocPart::added(table_ref, identifier));
        index
    }

    pub fn immutable_copy(&self) -> ImmutableMetaCollection {
        let mut collection = match &self.base {
            Some(base) => (**base).clone(),
            None => ImmutableMetaCollection::new(self.name.clone(), self.identifier.clone()),
        };
        for doc_part in self.modified_doc_parts() {
            collection.put_doc_part(doc_part.immutable_copy());
        }
        collection
    }
}

/// DocPart being extended by a translation unit. Fields and scalars only
/// ever get appended, so positions of committed columns never move.
#[derive(Debug)]
pub struct MutableMetaDocPart {
    base: Option<Arc<ImmutableMetaDocPart>>,
    table_ref: TableRef,
    identifier: String,
    fields: Vec<MetaField>,
    scalars: Vec<MetaScalar>,
    base_fields: usize,
    base_scalars: usize,
    by_name_and_type: HashMap<(String, FieldType), usize>,
}

impl MutableMetaDocPart {
    fn wrap(base: Arc<ImmutableMetaDocPart>) -> Self {
        let fields = base.fields().to_vec();
        let scalars = base.scalars().to_vec();
        let by_name_and_type = fields
            .iter()
            .enumerate()
            .map(|(index, f)| ((f.name.clone(), f.field_type), index))
            .collect();
        MutableMetaDocPart {
            table_ref: base.table_ref().clone(),
            identifier: base.identifier().to_string(),
            base_fields: fields.len(),
            base_scalars: scalars.len(),
            fields,
            scalars,
            by_name_and_type,
            base: Some(base),
        }
    }

    fn added(table_ref: TableRef, identifier: String) -> Self {
        MutableMetaDocPart {
            base: None,
            table_ref,
            identifier,
            fields: Vec::new(),
            scalars: Vec::new(),
            base_fields: 0,
            base_scalars: 0,
            by_name_and_type: HashMap::new(),
        }
    }

    pub fn state(&self) -> MetaElementState {
        if self.base.is_none() {
            MetaElementState::Added
        } else if self.fields.len() > self.base_fields || self.scalars.len() > self.base_scalars {
            MetaElementState::Modified
        } else {
            MetaElementState::NotChanged
        }
    }

    pub fn added_fields(&self) -> &[MetaField] {
        &self.fields[self.base_fields..]
    }

    pub fn added_scalars(&self) -> &[MetaScalar] {
        &self.scalars[self.base_scalars..]
    }

    pub fn add_field(&mut self, name: &str, identifier: String, field_type: FieldType) -> usize {
        if let Some(position) = self.field_position(name, field_type) {
            return position;
        }
        let position = self.fields.len();
        self.by_name_and_type.insert((name.to_string(), field_type), position);
        self.fields.push(MetaField::new(name, identifier, field_type));
        position
    }

    pub fn add_scalar(&mut self, identifier: String, field_type: FieldType) -> usize {
        if let Some(position) = self.scalar_position(field_type) {
            return position;
        }
        self.scalars.push(MetaScalar::new(identifier, field_type));
        self.scalars.len() - 1
    }

    pub fn immutable_copy(&self) -> ImmutableMetaDocPart {
        ImmutableMetaDocPart::from_parts(
            self.table_ref.clone(),
            self.identifier.clone(),
            self.fields.clone(),
            self.scalars.clone(),
        )
    }
}

impl MetaDocPart for MutableMetaDocPart {
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

    fn field_position(&self, name: &str, field_type: FieldType) -> Option<usize> {
        self.by_name_and_type.get(&(name.to_string(), field_type)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::DefaultIdentifierConstraints;

    fn factory() -> IdentifierFactory {
        IdentifierFactory::new(Arc::new(DefaultIdentifierConstraints::default())).unwrap()
    }

    fn committed() -> Arc<ImmutableMetaSnapshot> {
        let root = ImmutableMetaDocPart::new(TableRef::root(), "people")
            .with_field("name", "name_s", FieldType::String);
        Arc::new(ImmutableMetaSnapshot::new().with_database(
            ImmutableMetaDatabase::new("app", "app")
                .with_collection(ImmutableMetaCollection::new("people", "people").with_doc_part(root)),
        ))
    }

    #[test]
    fn untouched_overlay_has_no_changes() {
        let mut snapshot = MutableMetaSnapshot::new(committed(), 3);
        let factory = factory();
        snapshot
            .get_or_create_database("app", &factory).unwrap()
            .get_or_create_collection("people", &factory).unwrap();
        assert!(!snapshot.has_changes());
        assert_eq!(snapshot.base_version(), 3);
    }

    #[test]
    fn new_collection_gets_a_root_doc_part() {
        let factory = factory();
        let mut snapshot = MutableMetaSnapshot::new(committed(), 0);
        let db = snapshot.get_or_create_database("app", &factory).unwrap();
        assert_eq!(db.state(), MetaElementState::NotChanged);
        let collection = db.get_or_create_collection("orders", &factory).unwrap();
        assert_eq!(collection.state(), MetaElementState::Added);
        assert_eq!(collection.identifier(), "orders");
        let root = collection.doc_part_by_ref(&TableRef::root()).unwrap();
        assert_eq!(root.identifier(), "orders");
        assert_eq!(snapshot.database("app").unwrap().state(), MetaElementState::Modified);
    }

    #[test]
    fn added_columns_append_after_committed_ones() {
        let factory = factory();
        let mut snapshot = MutableMetaSnapshot::new(committed(), 0);
        let collection = snapshot
            .get_or_create_database("app", &factory).unwrap()
            .get_or_create_collection("people", &factory).unwrap();
        let root = collection.doc_part_mut(0);
        assert_eq!(root.field_position("name", FieldType::String), Some(0));
        assert_eq!(root.add_field("age", "age_i".to_string(), FieldType::Integer), 1);
        assert_eq!(root.add_field("age", "ignored".to_string(), FieldType::Integer), 1);
        assert_eq!(root.add_scalar("v_s".to_string(), FieldType::String), 0);
        assert_eq!(root.state(), MetaElementState::Modified);
        assert_eq!(root.added_fields().len(), 1);
        assert_eq!(root.added_scalars().len(), 1);

        let copy = snapshot.immutable_copy();
        let merged_root = copy.database("app").unwrap()
            .collection("people").unwrap()
            .doc_part(&TableRef::root()).unwrap()
            .clone();
        assert_eq!(merged_root.fields().len(), 2);
        assert_eq!(merged_root.fields()[1].identifier, "age_i");
    }

    #[test]
    fn database_identifiers_merge_overlay_and_base() {
        let factory = factory();
        let mut snapshot = MutableMetaSnapshot::new(committed(), 0);
        snapshot.get_or_create_database("APP", &factory).unwrap();
        let mut ids: Vec<&str> = snapshot.database_identifiers().collect();
        ids.sort();
        assert_eq!(ids, vec!["app", "app_1"]);
    }
}
