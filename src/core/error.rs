use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A document value could not be classified into a field type.
    UnsupportedValueType,
    /// A relational row could not be attached back into a document tree.
    IllegalRow,
    /// No counter fits the identifier length limit.
    IdentifierSpaceExhausted,
    /// Two metadata elements collide and cannot be disambiguated.
    SchemaMergeConflict,
    /// The optimistic snapshot commit lost every retry.
    CommitConflict,
    NotFound,
    InvalidArgument,
    Parse,
    Internal,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn unsupported_value_type(type_name: &str) -> Self {
        Error::new(
            ErrorKind::UnsupportedValueType,
            format!("values of type {} cannot be stored", type_name),
        )
    }

    pub fn illegal_row(context: String) -> Self {
        Error::new(ErrorKind::IllegalRow, context)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("invalid hex: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
