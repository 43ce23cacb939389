//! Identifier handling and SQL statement builders
//!
//! Physical table names are derived from caller-supplied strings
//! (`{project}_{table}`), so they are checked against a strict allow-list
//! before they ever reach a statement. Anything outside
//! `[A-Za-z_][A-Za-z0-9_]*`, or longer than PostgreSQL's identifier limit once
//! the index suffix is added, is a schema error.
//!
//! Schema and user names come from configuration and may legitimately hold
//! other characters; they are quoted with embedded quotes doubled.
//!
//! ## Table Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "{project}_{table}" (
//!     entity_key BYTEA,
//!     feature_name TEXT,
//!     value BYTEA,
//!     event_ts TIMESTAMPTZ,
//!     created_ts TIMESTAMPTZ,
//!     PRIMARY KEY (entity_key, feature_name)
//! );
//! CREATE INDEX IF NOT EXISTS "{project}_{table}_ek" ON "{project}_{table}" (entity_key);
//! ```

use featurepg_core::{Error, FeatureView, Result};
use std::fmt;

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Bind parameters per stored row in the upsert statement
pub const PARAMS_PER_ROW: usize = 5;

/// Upper bound on bind parameters in one statement
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

const INDEX_SUFFIX: &str = "_ek";

/// Validated physical table name for one (project, feature view) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId(String);

impl TableId {
    /// Derives `{project}_{table}` and validates it
    pub fn new(project: &str, table: &FeatureView) -> Result<Self> {
        let name = format!("{}_{}", project, table.name);
        validate_identifier(&name)?;

        if name.len() + INDEX_SUFFIX.len() > MAX_IDENTIFIER_LEN {
            return Err(Error::schema(format!(
                "table identifier '{}' is too long: '{}{}' exceeds {} bytes",
                name, name, INDEX_SUFFIX, MAX_IDENTIFIER_LEN
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn index_name(&self) -> String {
        format!("{}{}", self.0, INDEX_SUFFIX)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks an identifier against the `[A-Za-z_][A-Za-z0-9_]*` allow-list
pub fn validate_identifier(ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::schema(format!(
            "'{}' is not a valid identifier (allowed: letters, digits and '_', not starting with a digit)",
            ident
        )));
    }
    if ident.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::schema(format!(
            "identifier '{}' exceeds {} bytes",
            ident, MAX_IDENTIFIER_LEN
        )));
    }
    Ok(())
}

/// Double-quotes an identifier, doubling embedded quotes
pub fn quote_identifier(ident: &str) -> Result<String> {
    if ident.is_empty() || ident.contains('\0') {
        return Err(Error::schema(format!(
            "'{}' cannot be used as an identifier",
            ident.escape_debug()
        )));
    }
    Ok(format!("\"{}\"", ident.replace('"', "\"\"")))
}

fn quoted(table: &TableId) -> String {
    // Validated identifiers never contain quotes
    format!("\"{}\"", table.as_str())
}

/// `CREATE SCHEMA IF NOT EXISTS`, owned by `user`
///
/// Without an explicit schema PostgreSQL names the schema after the owner.
pub fn create_schema(db_schema: Option<&str>, user: &str) -> Result<String> {
    let user = quote_identifier(user)?;
    Ok(match db_schema.filter(|s| !s.is_empty()) {
        Some(schema) => format!(
            "CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {}",
            quote_identifier(schema)?,
            user
        ),
        None => format!("CREATE SCHEMA IF NOT EXISTS AUTHORIZATION {}", user),
    })
}

/// `DROP SCHEMA ... CASCADE`
///
/// Deliberately without `IF EXISTS`: tearing down a schema that is already
/// gone is reported as a failure.
pub fn drop_schema(schema: &str) -> Result<String> {
    Ok(format!("DROP SCHEMA {} CASCADE", quote_identifier(schema)?))
}

pub fn drop_table(table: &TableId) -> String {
    format!("DROP TABLE IF EXISTS {}", quoted(table))
}

pub fn create_table(table: &TableId) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         entity_key BYTEA, \
         feature_name TEXT, \
         value BYTEA, \
         event_ts TIMESTAMPTZ, \
         created_ts TIMESTAMPTZ, \
         PRIMARY KEY (entity_key, feature_name))",
        quoted(table)
    )
}

pub fn create_index(table: &TableId) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS \"{}\" ON {} (entity_key)",
        table.index_name(),
        quoted(table)
    )
}

/// Multi-row upsert with `rows` value tuples (`$1..$5`, `$6..$10`, ...)
pub fn upsert(table: &TableId, rows: usize) -> String {
    let mut values = Vec::with_capacity(rows);
    for i in 0..rows {
        let base = i * PARAMS_PER_ROW;
        values.push(format!(
            "(${}, ${}, ${}, ${}, ${})",
            base + 1,
            base + 2,
            base + 3,
            base + 4,
            base + 5
        ));
    }

    format!(
        "INSERT INTO {} (entity_key, feature_name, value, event_ts, created_ts) VALUES {} \
         ON CONFLICT (entity_key, feature_name) DO UPDATE SET \
         value = EXCLUDED.value, event_ts = EXCLUDED.event_ts, created_ts = EXCLUDED.created_ts",
        quoted(table),
        values.join(", ")
    )
}

/// Fetches every stored row whose key is in the `$1` bytea array
pub fn select_by_keys(table: &TableId) -> String {
    format!(
        "SELECT entity_key, feature_name, value, event_ts FROM {} WHERE entity_key = ANY($1)",
        quoted(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(project: &str, name: &str) -> Result<TableId> {
        TableId::new(project, &FeatureView::new(name))
    }

    #[test]
    fn test_table_id_is_project_prefixed() {
        let id = table("driver_ranking", "driver_hourly_stats").unwrap();
        assert_eq!(id.as_str(), "driver_ranking_driver_hourly_stats");
        assert_eq!(id.index_name(), "driver_ranking_driver_hourly_stats_ek");
    }

    #[test]
    fn test_table_id_rejects_injection() {
        let err = table("p", "x\"; DROP TABLE users; --").unwrap_err();
        assert!(matches!(err, Error::Schema(_)));

        assert!(table("p", "with space").is_err());
        assert!(table("p", "dash-ed").is_err());
        assert!(table("1p", "t").is_err());
        assert!(table("p", "").is_ok(), "'p_' is still a valid identifier");
    }

    #[test]
    fn test_table_id_length_includes_index_suffix() {
        // 60 + 3 fits exactly
        let name = "t".repeat(58);
        assert!(table("p", &name).is_ok());

        let name = "t".repeat(59);
        let err = table("p", &name).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("feast").unwrap(), "\"feast\"");
        assert_eq!(quote_identifier("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert!(quote_identifier("").is_err());
        assert!(quote_identifier("nul\0").is_err());
    }

    #[test]
    fn test_create_schema_statements() {
        assert_eq!(
            create_schema(Some("online"), "feast").unwrap(),
            "CREATE SCHEMA IF NOT EXISTS \"online\" AUTHORIZATION \"feast\""
        );
        assert_eq!(
            create_schema(None, "feast").unwrap(),
            "CREATE SCHEMA IF NOT EXISTS AUTHORIZATION \"feast\""
        );
        assert_eq!(
            create_schema(Some(""), "feast").unwrap(),
            "CREATE SCHEMA IF NOT EXISTS AUTHORIZATION \"feast\""
        );
    }

    #[test]
    fn test_drop_schema_has_no_if_exists() {
        assert_eq!(
            drop_schema("online").unwrap(),
            "DROP SCHEMA \"online\" CASCADE"
        );
    }

    #[test]
    fn test_table_statements() {
        let id = table("p", "t").unwrap();
        assert_eq!(drop_table(&id), "DROP TABLE IF EXISTS \"p_t\"");
        assert!(create_table(&id).starts_with("CREATE TABLE IF NOT EXISTS \"p_t\" ("));
        assert!(create_table(&id).contains("PRIMARY KEY (entity_key, feature_name)"));
        assert_eq!(
            create_index(&id),
            "CREATE INDEX IF NOT EXISTS \"p_t_ek\" ON \"p_t\" (entity_key)"
        );
    }

    #[test]
    fn test_upsert_placeholders() {
        let id = table("p", "t").unwrap();
        let sql = upsert(&id, 2);

        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5), ($6, $7, $8, $9, $10) ON CONFLICT"));
        assert!(sql.contains("ON CONFLICT (entity_key, feature_name) DO UPDATE SET"));
        assert!(sql.contains("created_ts = EXCLUDED.created_ts"));
        assert!(!sql.contains("$11"));
    }

    #[test]
    fn test_select_by_keys() {
        let id = table("p", "t").unwrap();
        assert_eq!(
            select_by_keys(&id),
            "SELECT entity_key, feature_name, value, event_ts FROM \"p_t\" WHERE entity_key = ANY($1)"
        );
    }
}
