use serde::{Serialize, Deserialize};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use crate::core::error::{Error, Result};

/// Row id. `did`, `rid` and `pid` all live in this space.
pub type RowId = u64;

/// A typed document value.
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Instant(DateTime<Utc>),
    ObjectId([u8; 12]),
    Timestamp { seconds: u32, ordinal: u32 },
    Document(KvDocument),
    Array(Vec<KvValue>),
    MinKey,
    MaxKey,
}

impl KvValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            KvValue::Null => "null",
            KvValue::Boolean(_) => "boolean",
            KvValue::Integer(_) => "integer",
            KvValue::Long(_) => "long",
            KvValue::Double(_) => "double",
            KvValue::String(_) => "string",
            KvValue::Binary(_) => "binary",
            KvValue::Date(_) => "date",
            KvValue::Time(_) => "time",
            KvValue::Instant(_) => "instant",
            KvValue::ObjectId(_) => "objectId",
            KvValue::Timestamp { .. } => "timestamp",
            KvValue::Document(_) => "document",
            KvValue::Array(_) => "array",
            KvValue::MinKey => "minKey",
            KvValue::MaxKey => "maxKey",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KvValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for KvValue {
    fn from(value: &str) -> Self {
        KvValue::String(value.to_string())
    }
}

impl From<String> for KvValue {
    fn from(value: String) -> Self {
        KvValue::String(value)
    }
}

impl From<i32> for KvValue {
    fn from(value: i32) -> Self {
        KvValue::Integer(value)
    }
}

impl From<i64> for KvValue {
    fn from(value: i64) -> Self {
        KvValue::Long(value)
    }
}

impl From<f64> for KvValue {
    fn from(value: f64) -> Self {
        KvValue::Double(value)
    }
}

impl From<bool> for KvValue {
    fn from(value: bool) -> Self {
        KvValue::Boolean(value)
    }
}

impl From<KvDocument> for KvValue {
    fn from(value: KvDocument) -> Self {
        KvValue::Document(value)
    }
}

impl From<Vec<KvValue>> for KvValue {
    fn from(value: Vec<KvValue>) -> Self {
        KvValue::Array(value)
    }
}

/// Insertion-ordered document. Equality ignores key order because the
/// relational form only preserves column declaration order.
#[derive(Debug, Clone, Default)]
pub struct KvDocument {
    entries: Vec<(String, KvValue)>,
}

impl KvDocument {
    pub fn new() -> Self {
        KvDocument { entries: Vec::new() }
    }

    /// Sets `key`, replacing any previous value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<KvValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<KvValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&KvValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KvValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for KvDocument {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(key, value)| other.get(key) == Some(value))
    }
}

impl FromIterator<(String, KvValue)> for KvDocument {
    fn from_iter<T: IntoIterator<Item = (String, KvValue)>>(iter: T) -> Self {
        let mut doc = KvDocument::new();
        for (key, value) in iter {
            doc.insert(key, value);
        }
        doc
    }
}

/// Position of a row in the document tree.
///
/// `did` is the document the row belongs to, `rid` the row itself, `pid`
/// the `rid` of the parent row (absent on root rows) and `seq` the element
/// index when the row stands for an array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowIdentity {
    pub did: RowId,
    pub rid: RowId,
    pub pid: Option<RowId>,
    pub seq: Option<u32>,
}

impl RowIdentity {
    pub fn root(did: RowId) -> Self {
        RowIdentity { did, rid: did, pid: None, seq: None }
    }
}

/// A document read back from rows, tagged with its document id.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedDocument {
    pub did: RowId,
    pub document: KvDocument,
}

/// Column type of a field or scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldType {
    Binary,
    Boolean,
    Date,
    Double,
    Instant,
    Integer,
    Long,
    MongoObjectId,
    MongoTimestamp,
    Null,
    String,
    Time,
    /// The value lives in a child DocPart; the column holds the array marker.
    Child,
}

impl FieldType {
    pub const ALL: [FieldType; 13] = [
        FieldType::Binary,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::Double,
        FieldType::Instant,
        FieldType::Integer,
        FieldType::Long,
        FieldType::MongoObjectId,
        FieldType::MongoTimestamp,
        FieldType::Null,
        FieldType::String,
        FieldType::Time,
        FieldType::Child,
    ];

    /// Suffix appended to column identifiers of this type.
    pub fn identifier_char(self) -> char {
        match self {
            FieldType::Binary => 'r',         // [r]aw
            FieldType::Boolean => 'b',
            FieldType::Date => 'c',           // [c]alendar
            FieldType::Double => 'd',
            FieldType::Instant => 'g',
            FieldType::Integer => 'i',
            FieldType::Long => 'l',
            FieldType::MongoObjectId => 'x',
            FieldType::MongoTimestamp => 'y',
            FieldType::Null => 'n',
            FieldType::String => 's',
            FieldType::Time => 't',
            FieldType::Child => 'e',          // [e]lement
        }
    }

    /// Classifies a value. Documents and arrays are `Child`.
    pub fn of(value: &KvValue) -> Result<FieldType> {
        let field_type = match value {
            KvValue::Null => FieldType::Null,
            KvValue::Boolean(_) => FieldType::Boolean,
            KvValue::Integer(_) => FieldType::Integer,
            KvValue::Long(_) => FieldType::Long,
            KvValue::Double(_) => FieldType::Double,
            KvValue::String(_) => FieldType::String,
            KvValue::Binary(_) => FieldType::Binary,
            KvValue::Date(_) => FieldType::Date,
            KvValue::Time(_) => FieldType::Time,
            KvValue::Instant(_) => FieldType::Instant,
            KvValue::ObjectId(_) => FieldType::MongoObjectId,
            KvValue::Timestamp { .. } => FieldType::MongoTimestamp,
            KvValue::Document(_) | KvValue::Array(_) => FieldType::Child,
            KvValue::MinKey | KvValue::MaxKey => {
                return Err(Error::unsupported_value_type(value.type_name()));
            }
        };
        Ok(field_type)
    }

    /// Whether `value` is a legal cell value for a column of this type.
    pub fn accepts(self, value: &KvValue) -> bool {
        match (self, value) {
            (FieldType::Child, KvValue::Boolean(_)) => true,
            (FieldType::Child, _) => false,
            (field_type, value) => FieldType::of(value).map_or(false, |t| t == field_type),
        }
    }
}
