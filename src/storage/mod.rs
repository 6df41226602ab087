//! Storage collaborator: the four statements the core issues, plus in-memory and PostgreSQL backends.

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

use crate::error::OrmError;
use crate::filter::{Filter, Row, SelectOptions};
use crate::schema::EntityDef;
use async_trait::async_trait;
use serde_json::Value;

/// One statement per call; implementations provide no multi-statement transactions.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Rows of `table` matching `filter`, ordered by `options.order_by` or ascending primary key.
    async fn select_where(
        &self,
        table: &EntityDef,
        filter: &Filter,
        options: &SelectOptions,
    ) -> Result<Vec<Row>, OrmError>;

    /// Insert one row and return its primary key (generated when not supplied).
    async fn insert(&self, table: &EntityDef, columns: &Row) -> Result<Value, OrmError>;

    /// Update the row with primary key `key`; returns the affected row count.
    async fn update(&self, table: &EntityDef, key: &Value, changed: &Row) -> Result<u64, OrmError>;

    /// Delete the row with primary key `key`; returns the affected row count.
    async fn delete_row(&self, table: &EntityDef, key: &Value) -> Result<u64, OrmError>;
}
