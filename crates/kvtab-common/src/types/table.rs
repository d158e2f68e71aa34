//! Table identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Database used when a name carries no database component.
pub const DEFAULT_DATABASE: &str = "default";

/// Error returned when a table name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid table name '{input}': {reason}")]
pub struct ParseTableNameError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

/// Fully qualified table identity: `database/table`.
///
/// This is the key of the share registry. The host hands tables to the
/// adapter as a path (`./db/table`); users and configuration tend to write
/// `db.table`. Both parse to the same identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName {
    database: String,
    table: String,
}

impl TableName {
    /// Creates a table name from its parts.
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Parses a host path (`./db/table`), a dotted name (`db.table`) or a
    /// bare table name.
    ///
    /// # Errors
    ///
    /// Returns [`ParseTableNameError`] for empty input or empty components.
    pub fn parse(input: &str) -> Result<Self, ParseTableNameError> {
        let err = |reason| ParseTableNameError {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim().trim_start_matches("./");
        if trimmed.is_empty() {
            return Err(err("empty name"));
        }

        let (database, table) = if trimmed.contains('/') {
            let mut parts = trimmed.rsplit('/');
            let table = parts.next().unwrap_or_default();
            let database = parts.next().unwrap_or_default();
            (database, table)
        } else if let Some((database, table)) = trimmed.split_once('.') {
            (database, table)
        } else {
            (DEFAULT_DATABASE, trimmed)
        };

        if database.is_empty() {
            return Err(err("empty database component"));
        }
        if table.is_empty() {
            return Err(err("empty table component"));
        }

        Ok(Self::new(database, table))
    }

    /// Returns the database component.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the table component.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl FromStr for TableName {
    type Err = ParseTableNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_path() {
        let name = TableName::parse("./test/kv").unwrap();
        assert_eq!(name.database(), "test");
        assert_eq!(name.table(), "kv");

        let nested = TableName::parse("/var/lib/data/test/kv").unwrap();
        assert_eq!(nested, name);
    }

    #[test]
    fn test_parse_dotted() {
        let name = TableName::parse("test.kv").unwrap();
        assert_eq!(name, TableName::new("test", "kv"));
        assert_eq!(name.to_string(), "test.kv");
    }

    #[test]
    fn test_parse_bare() {
        let name: TableName = "kv".parse().unwrap();
        assert_eq!(name.database(), DEFAULT_DATABASE);
        assert_eq!(name.table(), "kv");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(TableName::parse("").is_err());
        assert!(TableName::parse("./").is_err());
        assert!(TableName::parse("db.").is_err());
        assert!(TableName::parse(".kv").is_err());
        assert!(TableName::parse("db/").is_err());
    }
}
