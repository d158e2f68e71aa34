//! Table schemas and column binding.
//!
//! The store carries exactly two byte strings per entry. Binding resolves,
//! once at open time, which row slot holds the store key and which holds
//! the value, and rejects definitions that cannot be mapped.

use kvtab_common::config::{SchemaPolicy, TableConfig};

use crate::error::{HandlerError, HandlerResult};

/// Declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Variable-length binary string.
    VarBinary,
    /// Variable-length character string.
    VarChar,
    /// Integer.
    Int,
    /// Floating point.
    Double,
}

impl ColumnKind {
    /// Returns true for variable-length byte-string types.
    pub fn is_byte_string(self) -> bool {
        matches!(self, ColumnKind::VarBinary | ColumnKind::VarChar)
    }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub kind: ColumnKind,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl ColumnDef {
    /// Creates a NOT NULL column.
    pub fn not_null(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
        }
    }

    /// Creates a nullable column.
    pub fn nullable(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }
}

/// A table definition as declared by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Creates a schema from its columns, in slot order.
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    /// The conventional two-column definition: `k` and `v`, both NOT NULL
    /// `VARBINARY`.
    pub fn key_value() -> Self {
        Self::new(vec![
            ColumnDef::not_null("k", ColumnKind::VarBinary),
            ColumnDef::not_null("v", ColumnKind::VarBinary),
        ])
    }

    /// The two-column definition matching the configured key and value
    /// column names, both NOT NULL `VARBINARY`.
    pub fn for_config(config: &TableConfig) -> Self {
        Self::new(vec![
            ColumnDef::not_null(config.key_column.clone(), ColumnKind::VarBinary),
            ColumnDef::not_null(config.value_column.clone(), ColumnKind::VarBinary),
        ])
    }

    /// Returns the columns in slot order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the slot index of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

impl Default for TableSchema {
    fn default() -> Self {
        Self::key_value()
    }
}

/// Resolved slot positions for the store key and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    /// Slot of the key column.
    pub key_index: usize,
    /// Slot of the value column.
    pub value_index: usize,
    /// Total number of slots in a row.
    pub width: usize,
    /// Name of the key column.
    pub key_column: String,
    /// Name of the value column.
    pub value_column: String,
}

/// Binds `schema` against the configured key and value columns.
pub fn bind(schema: &TableSchema, config: &TableConfig) -> HandlerResult<SchemaDescriptor> {
    let key_index = resolve(schema, &config.key_column)?;
    let value_index = resolve(schema, &config.value_column)?;

    if key_index == value_index {
        return Err(HandlerError::SchemaMismatch(format!(
            "key and value both bind to column '{}'",
            config.key_column
        )));
    }

    if config.schema_policy == SchemaPolicy::Strict && schema.len() != 2 {
        let extras: Vec<&str> = schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_index && *i != value_index)
            .map(|(_, c)| c.name.as_str())
            .collect();
        return Err(HandlerError::SchemaMismatch(format!(
            "unexpected columns [{}]; only '{}' and '{}' can be stored",
            extras.join(", "),
            config.key_column,
            config.value_column
        )));
    }

    Ok(SchemaDescriptor {
        key_index,
        value_index,
        width: schema.len(),
        key_column: config.key_column.clone(),
        value_column: config.value_column.clone(),
    })
}

fn resolve(schema: &TableSchema, name: &str) -> HandlerResult<usize> {
    let index = schema
        .column_index(name)
        .ok_or_else(|| HandlerError::SchemaMismatch(format!("missing column '{name}'")))?;

    let column = &schema.columns()[index];
    if !column.kind.is_byte_string() {
        return Err(HandlerError::SchemaMismatch(format!(
            "column '{name}' must be a variable-length string, found {:?}",
            column.kind
        )));
    }
    if column.nullable {
        return Err(HandlerError::SchemaMismatch(format!(
            "column '{name}' must be NOT NULL"
        )));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_columns() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::not_null("k", ColumnKind::VarBinary),
            ColumnDef::nullable("note", ColumnKind::VarChar),
            ColumnDef::not_null("v", ColumnKind::VarBinary),
        ])
    }

    #[test]
    fn test_bind_default() {
        let descriptor = bind(&TableSchema::key_value(), &TableConfig::default()).unwrap();
        assert_eq!(descriptor.key_index, 0);
        assert_eq!(descriptor.value_index, 1);
        assert_eq!(descriptor.width, 2);
    }

    #[test]
    fn test_bind_reordered_columns() {
        let schema = TableSchema::new(vec![
            ColumnDef::not_null("v", ColumnKind::VarChar),
            ColumnDef::not_null("k", ColumnKind::VarChar),
        ]);
        let descriptor = bind(&schema, &TableConfig::default()).unwrap();
        assert_eq!(descriptor.key_index, 1);
        assert_eq!(descriptor.value_index, 0);
    }

    #[test]
    fn test_bind_configured_columns() {
        let schema = TableSchema::new(vec![
            ColumnDef::not_null("id", ColumnKind::VarBinary),
            ColumnDef::not_null("payload", ColumnKind::VarBinary),
        ]);
        assert!(bind(&schema, &TableConfig::default()).is_err());

        let config = TableConfig::default().columns("id", "payload");
        let descriptor = bind(&schema, &config).unwrap();
        assert_eq!(descriptor.key_column, "id");
        assert_eq!(descriptor.value_index, 1);
    }

    #[test]
    fn test_schema_for_config_binds() {
        let config = TableConfig::default().columns("id", "body");
        let schema = TableSchema::for_config(&config);
        assert_eq!(schema.column_index("id"), Some(0));
        assert_eq!(schema.column_index("body"), Some(1));

        let descriptor = bind(&schema, &config).unwrap();
        assert_eq!((descriptor.key_index, descriptor.value_index), (0, 1));
        assert_eq!(
            TableSchema::for_config(&TableConfig::default()),
            TableSchema::key_value()
        );
    }

    #[test]
    fn test_strict_rejects_extra_columns() {
        let err = bind(&three_columns(), &TableConfig::default()).unwrap_err();
        match err {
            HandlerError::SchemaMismatch(msg) => assert!(msg.contains("note"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lenient_accepts_extra_columns() {
        let config = TableConfig::default().schema_policy(SchemaPolicy::Lenient);
        let descriptor = bind(&three_columns(), &config).unwrap();
        assert_eq!(descriptor.key_index, 0);
        assert_eq!(descriptor.value_index, 2);
        assert_eq!(descriptor.width, 3);
    }

    #[test]
    fn test_rejects_unbindable_columns() {
        let missing = TableSchema::new(vec![ColumnDef::not_null("k", ColumnKind::VarBinary)]);
        assert!(bind(&missing, &TableConfig::default()).is_err());

        let nullable = TableSchema::new(vec![
            ColumnDef::not_null("k", ColumnKind::VarBinary),
            ColumnDef::nullable("v", ColumnKind::VarBinary),
        ]);
        assert!(bind(&nullable, &TableConfig::default()).is_err());

        let numeric = TableSchema::new(vec![
            ColumnDef::not_null("k", ColumnKind::Int),
            ColumnDef::not_null("v", ColumnKind::VarBinary),
        ]);
        assert!(bind(&numeric, &TableConfig::default()).is_err());
    }
}
