//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from an entity definition.

use crate::filter::{Condition, Direction, Filter, Row, SelectOptions};
use crate::schema::{ColumnType, EntityDef};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from the schema registry).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its placeholder, cast to the column's type.
    fn placeholder(&mut self, v: Value, ty: Option<ColumnType>) -> String {
        self.params.push(v);
        let n = self.params.len();
        match ty {
            Some(t) => format!("${}::{}", n, t.pg_type()),
            None => format!("${}", n),
        }
    }
}

/// SELECT list: each declared column; numeric as col::text so tallies keep their precision.
fn select_column_list(entity: &EntityDef) -> String {
    entity
        .columns()
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            if c.type_ == ColumnType::Decimal {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_type(entity: &EntityDef, name: &str) -> Option<ColumnType> {
    entity.column(name).map(|c| c.type_)
}

/// SELECT with filters (AND), ORDER BY the requested column or the primary key, optional LIMIT/OFFSET.
pub fn select_where(entity: &EntityDef, schema: &str, filter: &Filter, options: &SelectOptions) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, entity.name());

    let mut where_parts = Vec::new();
    for (col, cond) in filter.conditions() {
        let ty = column_type(entity, col);
        let lhs = quoted(col);
        let part = match cond {
            Condition::Eq(v) => format!("{} = {}", lhs, q.placeholder(v.clone(), ty)),
            Condition::Gt(v) => format!("{} > {}", lhs, q.placeholder(v.clone(), ty)),
            Condition::Lt(v) => format!("{} < {}", lhs, q.placeholder(v.clone(), ty)),
            Condition::In(vs) if vs.is_empty() => "1 = 0".to_string(),
            Condition::In(vs) => {
                let placeholders: Vec<String> = vs
                    .iter()
                    .map(|v| q.placeholder(v.clone(), ty))
                    .collect();
                format!("{} IN ({})", lhs, placeholders.join(", "))
            }
        };
        where_parts.push(part);
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    let pk = quoted(entity.primary_key());
    let order_clause = match &options.order_by {
        Some(o) => {
            let dir = match o.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            format!(" ORDER BY {} {} NULLS LAST, {}", quoted(&o.column), dir, pk)
        }
        None => format!(" ORDER BY {}", pk),
    };
    let limit_clause = options.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = options.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(entity),
        table,
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// INSERT of the given columns (declared ones only), returning the primary key.
pub fn insert(entity: &EntityDef, schema: &str, columns: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, entity.name());
    let pk = quoted(entity.primary_key());
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in entity.columns() {
        let Some(v) = columns.get(&c.name) else { continue };
        if c.primary && v.is_null() {
            continue;
        }
        cols.push(quoted(&c.name));
        placeholders.push(q.placeholder(v.clone(), Some(c.type_)));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, pk)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            pk
        )
    };
    q
}

/// UPDATE by primary key: SET only the changed declared columns. `None` when nothing is left to set.
pub fn update(entity: &EntityDef, schema: &str, key: &Value, changed: &Row) -> Option<QueryBuf> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, entity.name());
    let pk = entity.primary_key();
    let mut sets = Vec::new();
    for c in entity.columns() {
        if c.name == pk {
            continue;
        }
        let Some(v) = changed.get(&c.name) else { continue };
        let rhs = q.placeholder(v.clone(), Some(c.type_));
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    if sets.is_empty() {
        return None;
    }
    let key_ph = q.placeholder(key.clone(), column_type(entity, pk));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table,
        sets.join(", "),
        quoted(pk),
        key_ph
    );
    Some(q)
}

/// DELETE by primary key.
pub fn delete(entity: &EntityDef, schema: &str, key: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, entity.name());
    let pk = entity.primary_key();
    let key_ph = q.placeholder(key.clone(), column_type(entity, pk));
    q.sql = format!("DELETE FROM {} WHERE {} = {}", table, quoted(pk), key_ph);
    q
}
