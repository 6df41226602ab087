//! In-process table store. Enforces primary key and declared unique columns the way a database would.

use super::Storage;
use crate::error::OrmError;
use crate::filter::{compare_values, Direction, Filter, KeyValue, Row, SelectOptions};
use crate::schema::EntityDef;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemTable {
    rows: BTreeMap<KeyValue, Row>,
    next_id: i64,
}

impl MemTable {
    fn check_unique(&self, def: &EntityDef, row: &Row, skip: Option<&KeyValue>) -> Result<(), OrmError> {
        for col in def.unique_columns() {
            let Some(v) = row.get(&col.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self
                .rows
                .iter()
                .filter(|(k, _)| Some(*k) != skip)
                .any(|(_, r)| {
                    r.get(&col.name)
                        .map(|other| compare_values(Some(col.type_), other, v) == Some(Ordering::Equal))
                        .unwrap_or(false)
                });
            if clash {
                return Err(OrmError::DuplicateKey {
                    table: def.name().to_string(),
                    detail: format!("{} = {}", col.name, v),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, MemTable>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Number of rows currently stored for `table`.
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn select_where(
        &self,
        table: &EntityDef,
        filter: &Filter,
        options: &SelectOptions,
    ) -> Result<Vec<Row>, OrmError> {
        let tables = self.tables.read().await;
        let Some(t) = tables.get(table.name()) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<Row> = t
            .rows
            .values()
            .filter(|r| filter.matches(table, r))
            .cloned()
            .collect();
        if let Some(order) = &options.order_by {
            let ty = table.column(&order.column).map(|c| c.type_);
            // stable sort keeps primary key order among ties; nulls sort last
            rows.sort_by(|a, b| {
                let x = a.get(&order.column).unwrap_or(&Value::Null);
                let y = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = match (x.is_null(), y.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => return Ordering::Greater,
                    (false, true) => return Ordering::Less,
                    _ => compare_values(ty, x, y).unwrap_or(Ordering::Equal),
                };
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        let offset = options.offset.unwrap_or(0) as usize;
        let limit = options.limit.map(|n| n as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn insert(&self, table: &EntityDef, columns: &Row) -> Result<Value, OrmError> {
        let mut tables = self.tables.write().await;
        let t = tables.entry(table.name().to_string()).or_default();
        let pk = table.primary_key();
        let mut row = columns.clone();
        let key = match row.get(pk).and_then(KeyValue::from_value) {
            Some(k) => k,
            None if table.primary_column().map(|c| c.is_generated()).unwrap_or(false) => {
                KeyValue::Int(t.next_id + 1)
            }
            None => {
                return Err(OrmError::ConstraintViolation(format!(
                    "{}: primary key '{}' is required",
                    table.name(),
                    pk
                )))
            }
        };
        if t.rows.contains_key(&key) {
            return Err(OrmError::DuplicateKey {
                table: table.name().to_string(),
                detail: format!("{} = {}", pk, key),
            });
        }
        t.check_unique(table, &row, None)?;
        if let KeyValue::Int(i) = key {
            t.next_id = t.next_id.max(i);
        }
        let key_value = key.to_value();
        row.insert(pk.to_string(), key_value.clone());
        t.rows.insert(key, row);
        Ok(key_value)
    }

    async fn update(&self, table: &EntityDef, key: &Value, changed: &Row) -> Result<u64, OrmError> {
        let mut tables = self.tables.write().await;
        let Some(t) = tables.get_mut(table.name()) else {
            return Ok(0);
        };
        let Some(k) = KeyValue::from_value(key) else {
            return Ok(0);
        };
        let Some(current) = t.rows.get(&k) else {
            return Ok(0);
        };
        let mut merged = current.clone();
        for (col, v) in changed {
            if col != table.primary_key() {
                merged.insert(col.clone(), v.clone());
            }
        }
        t.check_unique(table, &merged, Some(&k))?;
        t.rows.insert(k, merged);
        Ok(1)
    }

    async fn delete_row(&self, table: &EntityDef, key: &Value) -> Result<u64, OrmError> {
        let mut tables = self.tables.write().await;
        let removed = tables
            .get_mut(table.name())
            .zip(KeyValue::from_value(key))
            .and_then(|(t, k)| t.rows.remove(&k));
        Ok(u64::from(removed.is_some()))
    }
}
