//! Query processor: turns a template plus arguments into final SQL.
//!
//! Arguments are consumed left to right. A string in template position is a
//! SQL fragment; every `%` modifier inside it consumes the next argument.
//! Rendered fragments are joined with a single space.
//!
//! | Modifier | Accepts | Renders |
//! |----------|---------|---------|
//! | `%s` | string | quoted literal |
//! | `%i` | integer | number |
//! | `%f` | float or integer | number |
//! | `%b` | boolean | dialect boolean |
//! | `%any` | anything | by value type |
//! | `%column`, `%table` | string | quoted identifier |
//! | `%?s` `%?i` `%?f` `%?b` | value or null | as above, or `NULL` |
//! | `%s[]` `%i[]` `%f[]` `%any[]` | non-empty list | `(a, b, ...)` |
//!
//! `%%` renders a literal percent sign. A `%` that is not followed by a
//! letter or `?` is copied verbatim, so `LIKE 'a%'` needs no escaping.

use crate::db::connection::Connection;
use crate::db::driver::Driver;
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;

/// Renders query arguments into a final SQL string.
pub trait QueryProcessor: Send + Sync + std::fmt::Debug {
    fn process(&self, driver: &dyn Driver, args: &[QueryParam]) -> DbResult<String>;
}

/// Builds the processor a connection uses instead of [`SqlProcessor`].
pub trait SqlProcessorFactory: Send + Sync + std::fmt::Debug {
    fn create(&self, connection: &Connection) -> Box<dyn QueryProcessor>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    String,
    Int,
    Float,
    Bool,
    Any,
    Column,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Modifier {
    kind: Kind,
    nullable: bool,
    list: bool,
}

impl Modifier {
    /// Parse the text following a `%`. Returns the modifier and the number of
    /// bytes it spans, or `Ok(None)` when the `%` is a plain character.
    fn parse(input: &str) -> DbResult<Option<(Self, usize)>> {
        let nullable = input.starts_with('?');
        let offset = usize::from(nullable);
        let name_len = input[offset..]
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(input.len() - offset);
        if name_len == 0 {
            return Ok(None);
        }
        let name = &input[offset..offset + name_len];
        let list = input[offset + name_len..].starts_with("[]");
        let spelled = &input[..offset + name_len + if list { 2 } else { 0 }];

        let kind = match name {
            "s" => Kind::String,
            "i" => Kind::Int,
            "f" => Kind::Float,
            "b" => Kind::Bool,
            "any" => Kind::Any,
            "column" => Kind::Column,
            "table" => Kind::Table,
            _ => return Err(DbError::invalid_input(format!("Unknown modifier %{}", spelled))),
        };
        let valid = match (nullable, list) {
            (false, false) => true,
            (true, false) => matches!(kind, Kind::String | Kind::Int | Kind::Float | Kind::Bool),
            (false, true) => matches!(kind, Kind::String | Kind::Int | Kind::Float | Kind::Any),
            (true, true) => false,
        };
        if !valid {
            return Err(DbError::invalid_input(format!("Unknown modifier %{}", spelled)));
        }

        Ok(Some((Self { kind, nullable, list }, spelled.len())))
    }
}

/// Default processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlProcessor;

impl SqlProcessor {
    pub fn new() -> Self {
        Self
    }

    fn process_fragment<'a>(
        &self,
        driver: &dyn Driver,
        template: &str,
        args: &mut impl Iterator<Item = &'a QueryParam>,
    ) -> DbResult<String> {
        let mut sql = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find('%') {
            sql.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('%') {
                sql.push('%');
                rest = tail;
                continue;
            }

            match Modifier::parse(after)? {
                Some((modifier, len)) => {
                    let value = args.next().ok_or_else(|| {
                        DbError::invalid_input(format!(
                            "Missing argument for modifier %{}",
                            &after[..len]
                        ))
                    })?;
                    sql.push_str(&self.render(driver, modifier, value)?);
                    rest = &after[len..];
                }
                None => {
                    sql.push('%');
                    rest = after;
                }
            }
        }

        sql.push_str(rest);
        Ok(sql)
    }

    fn render(&self, driver: &dyn Driver, modifier: Modifier, value: &QueryParam) -> DbResult<String> {
        if modifier.list {
            let items = match value {
                QueryParam::List(items) if !items.is_empty() => items,
                QueryParam::List(_) => {
                    return Err(DbError::invalid_input("List modifier received an empty list"));
                }
                other => return Err(mismatch(modifier, other)),
            };
            let rendered = items
                .iter()
                .map(|item| self.render_scalar(driver, modifier.kind, false, item))
                .collect::<DbResult<Vec<_>>>()?;
            return Ok(format!("({})", rendered.join(", ")));
        }
        self.render_scalar(driver, modifier.kind, modifier.nullable, value)
    }

    fn render_scalar(
        &self,
        driver: &dyn Driver,
        kind: Kind,
        nullable: bool,
        value: &QueryParam,
    ) -> DbResult<String> {
        let modifier = Modifier {
            kind,
            nullable,
            list: false,
        };
        match (kind, value) {
            (_, QueryParam::Null) if nullable || kind == Kind::Any => Ok("NULL".to_string()),
            (Kind::String, QueryParam::String(s)) => Ok(driver.quote_string(s)),
            (Kind::Int, QueryParam::Int(i)) => Ok(i.to_string()),
            (Kind::Float, QueryParam::Int(i)) => Ok(i.to_string()),
            (Kind::Float, QueryParam::Float(f)) => format_float(*f),
            (Kind::Bool, QueryParam::Bool(b)) => Ok(driver.format_bool(*b)),
            (Kind::Column, QueryParam::String(s)) => Ok(quote_column(driver, s)),
            (Kind::Table, QueryParam::String(s)) => Ok(driver.quote_identifier(s)),
            (Kind::Any, QueryParam::Bool(b)) => Ok(driver.format_bool(*b)),
            (Kind::Any, QueryParam::Int(i)) => Ok(i.to_string()),
            (Kind::Any, QueryParam::Float(f)) => format_float(*f),
            (Kind::Any, QueryParam::String(s)) => Ok(driver.quote_string(s)),
            (Kind::Any, list @ QueryParam::List(_)) => self.render(
                driver,
                Modifier {
                    kind: Kind::Any,
                    nullable: false,
                    list: true,
                },
                list,
            ),
            (_, other) => Err(mismatch(modifier, other)),
        }
    }
}

impl QueryProcessor for SqlProcessor {
    fn process(&self, driver: &dyn Driver, args: &[QueryParam]) -> DbResult<String> {
        if args.is_empty() {
            return Err(DbError::invalid_input("Query is empty"));
        }

        let mut iter = args.iter();
        let mut fragments = Vec::new();
        while let Some(arg) = iter.next() {
            let template = arg.as_str().ok_or_else(|| {
                DbError::invalid_input(format!(
                    "Expected a query fragment, got {} value",
                    arg.type_name()
                ))
            })?;
            fragments.push(self.process_fragment(driver, template, &mut iter)?);
        }
        Ok(fragments.join(" "))
    }
}

fn mismatch(modifier: Modifier, value: &QueryParam) -> DbError {
    let name = match modifier.kind {
        Kind::String => "s",
        Kind::Int => "i",
        Kind::Float => "f",
        Kind::Bool => "b",
        Kind::Any => "any",
        Kind::Column => "column",
        Kind::Table => "table",
    };
    DbError::invalid_input(format!(
        "Modifier %{}{}{} does not accept {} value",
        if modifier.nullable { "?" } else { "" },
        name,
        if modifier.list { "[]" } else { "" },
        value.type_name()
    ))
}

fn format_float(value: f64) -> DbResult<String> {
    if value.is_finite() {
        Ok(value.to_string())
    } else {
        Err(DbError::invalid_input(format!("Cannot render non-finite float {}", value)))
    }
}

/// Quote a column reference, keeping a trailing `.*` unquoted.
fn quote_column(driver: &dyn Driver, column: &str) -> String {
    match column.strip_suffix(".*") {
        Some(table) => format!("{}.*", driver.quote_identifier(table)),
        None if column == "*" => "*".to_string(),
        None => driver.quote_identifier(column),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::drivers::{MySqlDriver, SqliteDriver};

    fn process(args: Vec<QueryParam>) -> DbResult<String> {
        SqlProcessor::new().process(&SqliteDriver::new(), &args)
    }

    #[test]
    fn test_plain_fragments_are_joined_with_space() {
        let sql = process(vec!["SELECT 1".into(), "FROM dual".into()]).unwrap();
        assert_eq!(sql, "SELECT 1 FROM dual");
    }

    #[test]
    fn test_scalar_modifiers() {
        let sql = process(vec![
            "SELECT * FROM %table WHERE name = %s AND age > %i AND score < %f AND active = %b"
                .into(),
            "users".into(),
            "O'Brien".into(),
            30.into(),
            2.5.into(),
            true.into(),
        ])
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE name = 'O''Brien' AND age > 30 AND score < 2.5 AND active = 1"
        );
    }

    #[test]
    fn test_nullable_modifiers() {
        let sql = process(vec![
            "UPDATE t SET a = %?s, b = %?i".into(),
            QueryParam::Null,
            Some(5).into(),
        ])
        .unwrap();
        assert_eq!(sql, "UPDATE t SET a = NULL, b = 5");

        let err = process(vec!["SELECT %s".into(), QueryParam::Null]).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_list_modifiers() {
        let sql = process(vec![
            "SELECT * FROM t WHERE id IN %i[] AND tag IN %s[]".into(),
            vec![1, 2, 3].into(),
            vec!["a", "b"].into(),
        ])
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE id IN (1, 2, 3) AND tag IN ('a', 'b')");

        let err = process(vec!["SELECT %i[]".into(), QueryParam::List(vec![])]).unwrap_err();
        assert!(err.to_string().contains("empty list"));
    }

    #[test]
    fn test_any_renders_by_type() {
        let sql = process(vec![
            "VALUES (%any, %any, %any, %any)".into(),
            QueryParam::Null,
            "x".into(),
            7.into(),
            vec![1, 2].into(),
        ])
        .unwrap();
        assert_eq!(sql, "VALUES (NULL, 'x', 7, (1, 2))");
    }

    #[test]
    fn test_column_quoting() {
        let sql = process(vec![
            "SELECT %column, %column FROM t".into(),
            "u.*".into(),
            "u.name".into(),
        ])
        .unwrap();
        assert_eq!(sql, "SELECT \"u\".*, \"u\".\"name\" FROM t");
    }

    #[test]
    fn test_percent_handling() {
        let sql = process(vec!["SELECT 10 %% 3, 'a%' LIKE 'a%'".into()]).unwrap();
        assert_eq!(sql, "SELECT 10 % 3, 'a%' LIKE 'a%'");
    }

    #[test]
    fn test_dialect_quoting_comes_from_driver() {
        let sql = SqlProcessor::new()
            .process(
                &MySqlDriver::new(),
                &[
                    QueryParam::from("SELECT %column FROM %table WHERE ok = %b"),
                    QueryParam::from("id"),
                    QueryParam::from("db.t"),
                    QueryParam::from(false),
                ],
            )
            .unwrap();
        assert_eq!(sql, "SELECT `id` FROM `db`.`t` WHERE ok = 0");
    }

    #[test]
    fn test_errors() {
        assert!(process(vec![]).is_err());
        assert!(process(vec!["SELECT %i".into()]).is_err());
        assert!(process(vec!["SELECT %x".into(), 1.into()]).is_err());
        assert!(process(vec!["SELECT %?column".into(), "a".into()]).is_err());
        assert!(process(vec!["SELECT %i".into(), "nope".into()]).is_err());
        assert!(process(vec![1.into()]).is_err());
        assert!(process(vec!["SELECT %f".into(), f64::NAN.into()]).is_err());
    }

    #[test]
    fn test_modifier_parse_lengths() {
        let (modifier, len) = Modifier::parse("?s rest").unwrap().unwrap();
        assert!(modifier.nullable);
        assert_eq!(len, 2);
        let (modifier, len) = Modifier::parse("any[])").unwrap().unwrap();
        assert!(modifier.list);
        assert_eq!(len, 5);
        assert!(Modifier::parse("' AND").unwrap().is_none());
    }
}
