use serde::{Deserialize, Serialize};
use crate::core::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Identifier policy of the relational backend
    pub max_identifier_length: usize,
    pub separator: char,
    pub array_dimension_separator: char,
    pub case_insensitive_identifiers: bool,
    pub restricted_schema_names: Vec<String>,
    pub restricted_table_names: Vec<String>,
    pub restricted_column_names: Vec<String>,

    // Write path
    pub writer_batch_size: usize,               // documents per translation unit

    // Metadata repository
    pub commit_retries: usize,                  // optimistic commit attempts
    pub max_versions: usize,                    // committed versions kept
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_identifier_length: 63,              // PostgreSQL NAMEDATALEN - 1
            separator: '_',
            array_dimension_separator: '$',
            case_insensitive_identifiers: false,
            restricted_schema_names: vec![
                "information_schema".to_string(),
                "pg_catalog".to_string(),
            ],
            restricted_table_names: Vec::new(),
            restricted_column_names: Vec::new(),

            writer_batch_size: 1000,

            commit_retries: 8,
            max_versions: 16,
        }
    }
}

impl Config {
    /// Parses a JSON config; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
