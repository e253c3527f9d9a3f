//! Fluent SELECT builder.
//!
//! The builder produces a query template and its arguments; it never renders
//! values itself. Execute it with [`Connection::query_by_query_builder`],
//! which passes both through the connection's query processor.
//!
//! [`Connection::query_by_query_builder`]: crate::db::connection::Connection::query_by_query_builder

use crate::models::QueryParam;

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    sql: String,
    args: Vec<QueryParam>,
}

impl Clause {
    fn new(sql: &str, args: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.to_string(),
            args,
        }
    }

    /// Combine with another condition, parenthesising both sides.
    fn combine(self, operator: &str, other: Clause) -> Self {
        let mut args = self.args;
        args.extend(other.args);
        Self {
            sql: format!("({}) {} ({})", self.sql, operator, other.sql),
            args,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    kind: JoinKind,
    table: String,
    alias: Option<String>,
    on: Clause,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    select: Vec<Clause>,
    from: Option<(String, Option<String>)>,
    joins: Vec<Join>,
    where_: Option<Clause>,
    group_by: Vec<Clause>,
    having: Option<Clause>,
    order_by: Vec<Clause>,
    limit: Option<(u32, Option<u32>)>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the select list.
    pub fn select(mut self, expression: &str, args: Vec<QueryParam>) -> Self {
        self.select = vec![Clause::new(expression, args)];
        self
    }

    pub fn add_select(mut self, expression: &str, args: Vec<QueryParam>) -> Self {
        self.select.push(Clause::new(expression, args));
        self
    }

    pub fn from(mut self, table: &str, alias: Option<&str>) -> Self {
        self.from = Some((table.to_string(), alias.map(str::to_string)));
        self
    }

    pub fn inner_join(self, table: &str, alias: Option<&str>, on: &str, args: Vec<QueryParam>) -> Self {
        self.join(JoinKind::Inner, table, alias, on, args)
    }

    pub fn left_join(self, table: &str, alias: Option<&str>, on: &str, args: Vec<QueryParam>) -> Self {
        self.join(JoinKind::Left, table, alias, on, args)
    }

    fn join(
        mut self,
        kind: JoinKind,
        table: &str,
        alias: Option<&str>,
        on: &str,
        args: Vec<QueryParam>,
    ) -> Self {
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            alias: alias.map(str::to_string),
            on: Clause::new(on, args),
        });
        self
    }

    /// Replace the WHERE condition.
    pub fn where_(mut self, condition: &str, args: Vec<QueryParam>) -> Self {
        self.where_ = Some(Clause::new(condition, args));
        self
    }

    pub fn and_where(self, condition: &str, args: Vec<QueryParam>) -> Self {
        self.extend_where("AND", condition, args)
    }

    pub fn or_where(self, condition: &str, args: Vec<QueryParam>) -> Self {
        self.extend_where("OR", condition, args)
    }

    fn extend_where(mut self, operator: &str, condition: &str, args: Vec<QueryParam>) -> Self {
        let clause = Clause::new(condition, args);
        self.where_ = Some(match self.where_.take() {
            Some(existing) => existing.combine(operator, clause),
            None => clause,
        });
        self
    }

    pub fn group_by(mut self, expression: &str, args: Vec<QueryParam>) -> Self {
        self.group_by.push(Clause::new(expression, args));
        self
    }

    pub fn having(mut self, condition: &str, args: Vec<QueryParam>) -> Self {
        self.having = Some(Clause::new(condition, args));
        self
    }

    pub fn order_by(mut self, expression: &str, args: Vec<QueryParam>) -> Self {
        self.order_by.push(Clause::new(expression, args));
        self
    }

    /// An offset always comes with a limit; SQLite and MySQL reject a bare
    /// `OFFSET`.
    pub fn limit(mut self, limit: u32, offset: Option<u32>) -> Self {
        self.limit = Some((limit, offset));
        self
    }

    pub fn clear_limit(mut self) -> Self {
        self.limit = None;
        self
    }

    /// Render the query template with processor modifiers.
    pub fn query_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.select.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&join_sql(&self.select, ", "));
        }

        if let Some((_, alias)) = &self.from {
            sql.push_str(" FROM %table");
            if alias.is_some() {
                sql.push_str(" AS %table");
            }
        }

        for join in &self.joins {
            sql.push_str(match join.kind {
                JoinKind::Inner => " INNER JOIN %table",
                JoinKind::Left => " LEFT JOIN %table",
            });
            if join.alias.is_some() {
                sql.push_str(" AS %table");
            }
            sql.push_str(" ON (");
            sql.push_str(&join.on.sql);
            sql.push(')');
        }

        if let Some(condition) = &self.where_ {
            sql.push_str(" WHERE ");
            sql.push_str(&condition.sql);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&join_sql(&self.group_by, ", "));
        }
        if let Some(condition) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(&condition.sql);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&join_sql(&self.order_by, ", "));
        }
        if let Some((_, offset)) = self.limit {
            sql.push_str(" LIMIT %i");
            if offset.is_some() {
                sql.push_str(" OFFSET %i");
            }
        }
        sql
    }

    /// Arguments in the order their modifiers appear in [`Self::query_sql`].
    pub fn query_parameters(&self) -> Vec<QueryParam> {
        let mut params: Vec<QueryParam> = self.select.iter().flat_map(|c| c.args.clone()).collect();

        if let Some((table, alias)) = &self.from {
            params.push(table.as_str().into());
            if let Some(alias) = alias {
                params.push(alias.as_str().into());
            }
        }
        for join in &self.joins {
            params.push(join.table.as_str().into());
            if let Some(alias) = &join.alias {
                params.push(alias.as_str().into());
            }
            params.extend(join.on.args.iter().cloned());
        }
        if let Some(condition) = &self.where_ {
            params.extend(condition.args.iter().cloned());
        }
        params.extend(self.group_by.iter().flat_map(|c| c.args.clone()));
        if let Some(condition) = &self.having {
            params.extend(condition.args.iter().cloned());
        }
        params.extend(self.order_by.iter().flat_map(|c| c.args.clone()));
        if let Some((limit, offset)) = self.limit {
            params.push(QueryParam::Int(i64::from(limit)));
            params.extend(offset.map(|o| QueryParam::Int(i64::from(o))));
        }
        params
    }
}

fn join_sql(clauses: &[Clause], separator: &str) -> String {
    clauses
        .iter()
        .map(|c| c.sql.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}
