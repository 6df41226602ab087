//! Row predicates, ordering and key comparison shared by the query builder and storage backends.

use crate::error::OrmError;
use crate::schema::{ColumnType, EntityDef};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A row as read from or written to storage: column name to value.
pub type Row = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(Value),
    Gt(Value),
    Lt(Value),
    In(Vec<Value>),
}

/// Conjunction of per-column conditions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn and(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((column.into(), condition));
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(column, Condition::Eq(value.into()))
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(column, Condition::Gt(value.into()))
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(column, Condition::Lt(value.into()))
    }

    pub fn is_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.and(column, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Every filtered column must be declared on `def`.
    pub fn check(&self, def: &EntityDef) -> Result<(), OrmError> {
        for (col, _) in &self.conditions {
            def.require_column(col)?;
        }
        Ok(())
    }

    /// SQL semantics: a null cell never satisfies a condition.
    pub fn matches(&self, def: &EntityDef, row: &Row) -> bool {
        self.conditions.iter().all(|(col, cond)| {
            let ty = def.column(col).map(|c| c.type_);
            let cell = row.get(col).unwrap_or(&Value::Null);
            match cond {
                Condition::Eq(v) => compare_values(ty, cell, v) == Some(Ordering::Equal),
                Condition::Gt(v) => compare_values(ty, cell, v) == Some(Ordering::Greater),
                Condition::Lt(v) => compare_values(ty, cell, v) == Some(Ordering::Less),
                Condition::In(vs) => vs
                    .iter()
                    .any(|v| compare_values(ty, cell, v) == Some(Ordering::Equal)),
            }
        })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filter {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        iter.into_iter().fold(Filter::new(), |f, (k, v)| f.eq(k, v))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Ordering and paging for one select. No `order_by` means ascending primary key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectOptions {
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SelectOptions {
    pub fn ordered(order_by: Option<OrderBy>) -> Self {
        SelectOptions {
            order_by,
            ..SelectOptions::default()
        }
    }
}

/// Compare two cells as values of column type `ty`. `None` when either side is null or the
/// values are not comparable.
pub fn compare_values(ty: Option<ColumnType>, a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match ty {
        Some(t) if t.is_numeric() => as_f64(a)?.partial_cmp(&as_f64(b)?),
        Some(ColumnType::DateTime) => match (as_datetime(a), as_datetime(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => loose_cmp(a, b),
        },
        _ => loose_cmp(a, b),
    }
}

fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(_), _) | (_, Value::Number(_)) => as_f64(a)?.partial_cmp(&as_f64(b)?),
        _ => (a == b).then_some(Ordering::Equal),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_datetime(v: &Value) -> Option<DateTime<FixedOffset>> {
    v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Hashable form of a primary or foreign key, used to group rows by key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    pub fn from_value(v: &Value) -> Option<KeyValue> {
        match v {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(KeyValue::Int(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Some(KeyValue::Int(f as i64))
                        }
                        _ => Some(KeyValue::Text(n.to_string())),
                    }
                }
            }
            Value::String(s) => Some(
                s.parse::<i64>()
                    .map(KeyValue::Int)
                    .unwrap_or_else(|_| KeyValue::Text(s.clone())),
            ),
            Value::Bool(b) => Some(KeyValue::Text(b.to_string())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Int(i) => Value::from(*i),
            KeyValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Text(s) => f.write_str(s),
        }
    }
}
