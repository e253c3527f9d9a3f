//! Platform abstraction: schema introspection per backend.
//!
//! A platform is created by its driver and cached by the [`Connection`].
//! Introspection statements run through [`Connection::query_with_args`], so
//! they are processed, logged and reported to `on_query` observers like any
//! other query. Nothing is cached here.
//!
//! Each implementation adapts the same interface to its system catalogs:
//! - [`MySqlPlatform`]: `information_schema`
//! - [`PostgresPlatform`]: `pg_catalog`
//! - [`SqlitePlatform`]: `sqlite_master` and pragmas

use crate::db::connection::Connection;
use crate::db::types::{declared_size, normalize_type_name};
use crate::error::DbResult;
use crate::models::{ColumnInfo, ForeignKeyInfo, QueryParam, TableInfo, TableType, json_to_string};
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

/// Optional SQL capabilities a caller may probe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFeature {
    /// Row-value comparisons such as `(a, b) IN ((1, 2), (3, 4))`.
    MultiColumnIn,
}

#[async_trait]
pub trait Platform: Send + Sync + std::fmt::Debug {
    /// Platform identifier: `mysql`, `pgsql` or `sqlite`.
    fn name(&self) -> &'static str;

    /// Tables and views visible to the session.
    async fn tables(&self, connection: &mut Connection) -> DbResult<Vec<TableInfo>>;

    /// Column metadata in declaration order.
    async fn columns(&self, connection: &mut Connection, table: &str) -> DbResult<Vec<ColumnInfo>>;

    async fn foreign_keys(
        &self,
        connection: &mut Connection,
        table: &str,
    ) -> DbResult<Vec<ForeignKeyInfo>>;

    /// Sequence backing the table's primary key, if the backend has one.
    async fn primary_sequence_name(
        &self,
        connection: &mut Connection,
        table: &str,
    ) -> DbResult<Option<String>>;

    fn is_supported(&self, feature: PlatformFeature) -> bool;
}

type Row = Map<String, JsonValue>;

fn text(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(json_to_string)
}

fn flag(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        Some(JsonValue::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "1" | "t" | "true" | "yes"),
        _ => false,
    }
}

/// Split `schema.table` into its parts.
fn split_table(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

// =============================================================================
// MySQL
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlPlatform;

mod mysql_queries {
    pub const TABLES: &str = r#"
        SELECT
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(TABLE_TYPE USING utf8) AS TABLE_TYPE
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        ORDER BY TABLE_NAME
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
            CONVERT(EXTRA USING utf8) AS EXTRA
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = %s AND TABLE_SCHEMA = COALESCE(%?s, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
            CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_NAME = %s
        AND TABLE_SCHEMA = COALESCE(%?s, DATABASE())
        AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY ORDINAL_POSITION
        "#;
}

#[async_trait]
impl Platform for MySqlPlatform {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn tables(&self, connection: &mut Connection) -> DbResult<Vec<TableInfo>> {
        let result = connection.query_with_args(mysql_queries::TABLES, &[]).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "TABLE_NAME")?;
                let kind = text(row, "TABLE_TYPE").unwrap_or_default();
                Some(TableInfo::new(name, TableType::from_db_str(&kind)))
            })
            .collect())
    }

    async fn columns(&self, connection: &mut Connection, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let (schema, name) = split_table(table);
        let args = [QueryParam::from(name), QueryParam::from(schema)];
        let result = connection.query_with_args(mysql_queries::COLUMNS, &args).await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let column_type = text(row, "COLUMN_TYPE").unwrap_or_default();
                let mut column = ColumnInfo::new(
                    text(row, "COLUMN_NAME")?,
                    normalize_type_name(&column_type),
                    text(row, "IS_NULLABLE").as_deref() == Some("YES"),
                );
                column.size = declared_size(&column_type);
                column.default = text(row, "COLUMN_DEFAULT");
                column.is_primary = text(row, "COLUMN_KEY").as_deref() == Some("PRI");
                column.is_autoincrement = text(row, "EXTRA")
                    .is_some_and(|extra| extra.to_lowercase().contains("auto_increment"));
                Some(column)
            })
            .collect())
    }

    async fn foreign_keys(
        &self,
        connection: &mut Connection,
        table: &str,
    ) -> DbResult<Vec<ForeignKeyInfo>> {
        let (schema, name) = split_table(table);
        let args = [QueryParam::from(name), QueryParam::from(schema)];
        let result = connection
            .query_with_args(mysql_queries::FOREIGN_KEYS, &args)
            .await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let fk = ForeignKeyInfo::new(
                    text(row, "COLUMN_NAME")?,
                    text(row, "REFERENCED_TABLE_NAME")?,
                    text(row, "REFERENCED_COLUMN_NAME")?,
                );
                Some(match text(row, "CONSTRAINT_NAME") {
                    Some(constraint) => fk.with_name(constraint),
                    None => fk,
                })
            })
            .collect())
    }

    async fn primary_sequence_name(
        &self,
        _connection: &mut Connection,
        _table: &str,
    ) -> DbResult<Option<String>> {
        Ok(None)
    }

    fn is_supported(&self, feature: PlatformFeature) -> bool {
        match feature {
            PlatformFeature::MultiColumnIn => true,
        }
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresPlatform;

mod postgres_queries {
    pub const TABLES: &str = r#"
        SELECT table_schema, table_name, table_type
        FROM information_schema.tables
        WHERE table_schema = ANY(current_schemas(false))
        AND table_type IN ('BASE TABLE', 'VIEW')
        ORDER BY table_schema, table_name
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            a.attname::varchar AS name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            pg_catalog.pg_get_expr(ad.adbin, ad.adrelid)::varchar AS column_default,
            COALESCE(co.contype = 'p', FALSE) AS is_primary,
            NOT a.attnotnull AS is_nullable
        FROM pg_catalog.pg_attribute AS a
        JOIN pg_catalog.pg_class AS c ON a.attrelid = c.oid
        LEFT JOIN pg_catalog.pg_attrdef AS ad ON ad.adrelid = c.oid AND ad.adnum = a.attnum
        LEFT JOIN pg_catalog.pg_constraint AS co
            ON co.conrelid = c.oid AND co.contype = 'p' AND a.attnum = ANY(co.conkey)
        WHERE c.oid = %s::regclass AND a.attnum > 0 AND NOT a.attisdropped
        ORDER BY a.attnum
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            co.conname::varchar AS name,
            al.attname::varchar AS column_name,
            ns.nspname::varchar AS ref_schema,
            cl.relname::varchar AS ref_table,
            af.attname::varchar AS ref_column
        FROM pg_catalog.pg_constraint AS co
        JOIN pg_catalog.pg_class AS cl ON co.confrelid = cl.oid
        JOIN pg_catalog.pg_namespace AS ns ON cl.relnamespace = ns.oid
        JOIN pg_catalog.pg_attribute AS al ON al.attrelid = co.conrelid AND al.attnum = co.conkey[1]
        JOIN pg_catalog.pg_attribute AS af ON af.attrelid = co.confrelid AND af.attnum = co.confkey[1]
        WHERE co.contype = 'f' AND co.conrelid = %s::regclass
        ORDER BY co.conname
        "#;

    pub const PRIMARY_SEQUENCE: &str = r#"
        SELECT pg_get_serial_sequence(%s, a.attname::text) AS sequence_name
        FROM pg_catalog.pg_index AS i
        JOIN pg_catalog.pg_attribute AS a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
        WHERE i.indrelid = %s::regclass AND i.indisprimary
        "#;
}

fn is_serial_default(default: Option<&str>) -> bool {
    default.is_some_and(|d| d.starts_with("nextval("))
}

#[async_trait]
impl Platform for PostgresPlatform {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    async fn tables(&self, connection: &mut Connection) -> DbResult<Vec<TableInfo>> {
        let result = connection.query_with_args(postgres_queries::TABLES, &[]).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "table_name")?;
                let kind = text(row, "table_type").unwrap_or_default();
                let info = TableInfo::new(name, TableType::from_db_str(&kind));
                Some(match text(row, "table_schema") {
                    Some(schema) => info.with_schema(schema),
                    None => info,
                })
            })
            .collect())
    }

    async fn columns(&self, connection: &mut Connection, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let result = connection
            .query_with_args(postgres_queries::COLUMNS, &[QueryParam::from(table)])
            .await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let column_type = text(row, "column_type").unwrap_or_default();
                let mut column = ColumnInfo::new(
                    text(row, "name")?,
                    normalize_type_name(&column_type),
                    flag(row, "is_nullable"),
                );
                column.size = declared_size(&column_type);
                column.default = text(row, "column_default");
                column.is_primary = flag(row, "is_primary");
                column.is_autoincrement =
                    column.is_primary && is_serial_default(column.default.as_deref());
                Some(column)
            })
            .collect())
    }

    async fn foreign_keys(
        &self,
        connection: &mut Connection,
        table: &str,
    ) -> DbResult<Vec<ForeignKeyInfo>> {
        let result = connection
            .query_with_args(postgres_queries::FOREIGN_KEYS, &[QueryParam::from(table)])
            .await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let ref_table = match (text(row, "ref_schema"), text(row, "ref_table")?) {
                    (Some(schema), name) if schema != "public" => format!("{}.{}", schema, name),
                    (_, name) => name,
                };
                let fk = ForeignKeyInfo::new(
                    text(row, "column_name")?,
                    ref_table,
                    text(row, "ref_column")?,
                );
                Some(match text(row, "name") {
                    Some(name) => fk.with_name(name),
                    None => fk,
                })
            })
            .collect())
    }

    async fn primary_sequence_name(
        &self,
        connection: &mut Connection,
        table: &str,
    ) -> DbResult<Option<String>> {
        let args = [QueryParam::from(table), QueryParam::from(table)];
        let result = connection
            .query_with_args(postgres_queries::PRIMARY_SEQUENCE, &args)
            .await?;
        Ok(result.column_strings("sequence_name").next())
    }

    fn is_supported(&self, feature: PlatformFeature) -> bool {
        match feature {
            PlatformFeature::MultiColumnIn => true,
        }
    }
}

// =============================================================================
// SQLite
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlitePlatform;

mod sqlite_queries {
    pub const TABLES: &str = r#"
        SELECT name, type FROM sqlite_master
        WHERE type IN ('table', 'view')
        AND name NOT LIKE 'sqlite_%%'
        ORDER BY name
        "#;

    pub const COLUMNS: &str = "PRAGMA table_info(%table)";

    pub const FOREIGN_KEYS: &str = "PRAGMA foreign_key_list(%table)";
}

#[async_trait]
impl Platform for SqlitePlatform {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn tables(&self, connection: &mut Connection) -> DbResult<Vec<TableInfo>> {
        let result = connection.query_with_args(sqlite_queries::TABLES, &[]).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "name")?;
                let kind = text(row, "type").unwrap_or_default();
                Some(TableInfo::new(name, TableType::from_db_str(&kind)))
            })
            .collect())
    }

    async fn columns(&self, connection: &mut Connection, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let result = connection
            .query_with_args(sqlite_queries::COLUMNS, &[QueryParam::from(table)])
            .await?;
        let primary_count = result.rows.iter().filter(|row| flag(row, "pk")).count();

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let column_type = text(row, "type").unwrap_or_default();
                let mut column = ColumnInfo::new(
                    text(row, "name")?,
                    normalize_type_name(&column_type),
                    !flag(row, "notnull"),
                );
                column.size = declared_size(&column_type);
                column.default = text(row, "dflt_value");
                column.is_primary = flag(row, "pk");
                // A lone INTEGER PRIMARY KEY aliases the rowid.
                column.is_autoincrement = column.is_primary
                    && primary_count == 1
                    && column_type.eq_ignore_ascii_case("integer");
                Some(column)
            })
            .collect())
    }

    async fn foreign_keys(
        &self,
        connection: &mut Connection,
        table: &str,
    ) -> DbResult<Vec<ForeignKeyInfo>> {
        let result = connection
            .query_with_args(sqlite_queries::FOREIGN_KEYS, &[QueryParam::from(table)])
            .await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                Some(ForeignKeyInfo::new(
                    text(row, "from")?,
                    text(row, "table")?,
                    text(row, "to")?,
                ))
            })
            .collect())
    }

    async fn primary_sequence_name(
        &self,
        _connection: &mut Connection,
        _table: &str,
    ) -> DbResult<Option<String>> {
        Ok(None)
    }

    fn is_supported(&self, feature: PlatformFeature) -> bool {
        match feature {
            PlatformFeature::MultiColumnIn => false,
        }
    }
}
