use std::collections::HashSet;
use crate::core::config::Config;
use crate::core::types::FieldType;

/// Rules the relational backend imposes on identifiers.
pub trait IdentifierConstraints: Send + Sync {
    fn max_identifier_length(&self) -> usize;

    fn separator(&self) -> char;

    fn array_dimension_separator(&self) -> char;

    fn is_allowed_schema_identifier(&self, identifier: &str) -> bool;

    fn is_allowed_table_identifier(&self, identifier: &str) -> bool;

    fn is_allowed_column_identifier(&self, identifier: &str) -> bool;

    /// Whether the backend would treat two identifiers as the same name.
    fn is_same_identifier(&self, a: &str, b: &str) -> bool;

    fn field_type_identifier(&self, field_type: FieldType) -> char {
        field_type.identifier_char()
    }

    /// Column identifier of the scalar of `field_type`, e.g. `v_s`.
    fn scalar_identifier(&self, field_type: FieldType) -> String {
        format!("v{}{}", self.separator(), self.field_type_identifier(field_type))
    }
}

/// Row-identity columns every DocPart table carries.
pub const ROW_COLUMNS: [&str; 4] = ["did", "rid", "pid", "seq"];

/// Constraints built from [`Config`].
///
/// Column names reserve the row-identity columns and every scalar
/// identifier on top of whatever the config restricts.
#[derive(Debug, Clone)]
pub struct DefaultIdentifierConstraints {
    max_identifier_length: usize,
    separator: char,
    array_dimension_separator: char,
    case_insensitive: bool,
    restricted_schemas: HashSet<String>,
    restricted_tables: HashSet<String>,
    restricted_columns: HashSet<String>,
}

impl DefaultIdentifierConstraints {
    pub fn new(config: &Config) -> Self {
        let case_insensitive = config.case_insensitive_identifiers;
        let fold = |names: &[String]| -> HashSet<String> {
            names.iter().map(|n| Self::fold_case(case_insensitive, n)).collect()
        };

        let mut restricted_columns = fold(&config.restricted_column_names);
        restricted_columns.extend(ROW_COLUMNS.iter().map(|c| c.to_string()));
        for field_type in FieldType::ALL {
            restricted_columns.insert(format!(
                "v{}{}",
                config.separator,
                field_type.identifier_char()
            ));
        }

        DefaultIdentifierConstraints {
            max_identifier_length: config.max_identifier_length,
            separator: config.separator,
            array_dimension_separator: config.array_dimension_separator,
            case_insensitive,
            restricted_schemas: fold(&config.restricted_schema_names),
            restricted_tables: fold(&config.restricted_table_names),
            restricted_columns,
        }
    }

    fn fold_case(case_insensitive: bool, name: &str) -> String {
        if case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    fn is_restricted(&self, set: &HashSet<String>, identifier: &str) -> bool {
        set.contains(&Self::fold_case(self.case_insensitive, identifier))
    }
}

impl Default for DefaultIdentifierConstraints {
    fn default() -> Self {
        DefaultIdentifierConstraints::new(&Config::default())
    }
}

impl IdentifierConstraints for DefaultIdentifierConstraints {
    fn max_identifier_length(&self) -> usize {
        self.max_identifier_length
    }

    fn separator(&self) -> char {
        self.separator
    }

    fn array_dimension_separator(&self) -> char {
        self.array_dimension_separator
    }

    fn is_allowed_schema_identifier(&self, identifier: &str) -> bool {
        !identifier.is_empty() && !self.is_restricted(&self.restricted_schemas, identifier)
    }

    fn is_allowed_table_identifier(&self, identifier: &str) -> bool {
        !identifier.is_empty() && !self.is_restricted(&self.restricted_tables, identifier)
    }

    fn is_allowed_column_identifier(&self, identifier: &str) -> bool {
        !identifier.is_empty() && !self.is_restricted(&self.restricted_columns, identifier)
    }

    fn is_same_identifier(&self, a: &str, b: &str) -> bool {
        if self.case_insensitive {
            a.to_lowercase() == b.to_lowercase()
        } else {
            a == b
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_columns_and_scalars_are_reserved() {
        let constraints = DefaultIdentifierConstraints::default();
        for column in ROW_COLUMNS {
            assert!(!constraints.is_allowed_column_identifier(column));
        }
        assert!(!constraints.is_allowed_column_identifier("v_s"));
        assert!(!constraints.is_allowed_column_identifier("v_e"));
        assert!(constraints.is_allowed_column_identifier("v_z"));
        assert!(constraints.is_allowed_column_identifier("name_s"));
    }

    #[test]
    fn restricted_schemas_come_from_config() {
        let constraints = DefaultIdentifierConstraints::default();
        assert!(!constraints.is_allowed_schema_identifier("pg_catalog"));
        assert!(constraints.is_allowed_schema_identifier("app"));
    }

    #[test]
    fn case_folding_follows_config() {
        let config = Config {
            case_insensitive_identifiers: true,
            restricted_table_names: vec!["Users".to_string()],
            ..Config::default()
        };
        let constraints = DefaultIdentifierConstraints::new(&config);
        assert!(constraints.is_same_identifier("Name", "nAME"));
        assert!(!constraints.is_allowed_table_identifier("USERS"));

        let strict = DefaultIdentifierConstraints::default();
        assert!(!strict.is_same_identifier("Name", "name"));
    }

    #[test]
    fn scalar_identifiers_use_the_separator() {
        let constraints = DefaultIdentifierConstraints::default();
        assert_eq!(constraints.scalar_identifier(FieldType::String), "v_s");
        assert_eq!(constraints.scalar_identifier(FieldType::Child), "v_e");
    }
}
