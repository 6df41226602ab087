//! Session: the registry, the storage collaborator and the per-call timeout, passed explicitly.

use crate::error::OrmError;
use crate::filter::{Filter, Row, SelectOptions};
use crate::query::QueryBuilder;
use crate::resolver::RelationResolver;
use crate::schema::{EntityDef, SchemaRegistry};
use crate::storage::Storage;
use crate::writer::PersistenceWriter;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Session {
    registry: Arc<SchemaRegistry>,
    storage: Arc<dyn Storage>,
    timeout: Duration,
}

impl Session {
    pub fn new(registry: Arc<SchemaRegistry>, storage: Arc<dyn Storage>, timeout: Duration) -> Self {
        Session {
            registry,
            storage,
            timeout,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn entity(&self, name: &str) -> Result<Arc<EntityDef>, OrmError> {
        self.registry.resolve(name).cloned()
    }

    pub fn queries(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    pub fn resolver(&self) -> RelationResolver<'_> {
        RelationResolver::new(self)
    }

    pub fn writer(&self) -> PersistenceWriter<'_> {
        PersistenceWriter::new(self)
    }

    pub(crate) async fn select(
        &self,
        table: &EntityDef,
        filter: &Filter,
        options: &SelectOptions,
    ) -> Result<Vec<Row>, OrmError> {
        self.timed("select", table, self.storage.select_where(table, filter, options))
            .await
    }

    pub(crate) async fn insert(&self, table: &EntityDef, columns: &Row) -> Result<Value, OrmError> {
        self.timed("insert", table, self.storage.insert(table, columns)).await
    }

    pub(crate) async fn update(&self, table: &EntityDef, key: &Value, changed: &Row) -> Result<u64, OrmError> {
        self.timed("update", table, self.storage.update(table, key, changed))
            .await
    }

    pub(crate) async fn delete_row(&self, table: &EntityDef, key: &Value) -> Result<u64, OrmError> {
        self.timed("delete", table, self.storage.delete_row(table, key))
            .await
    }

    async fn timed<T>(
        &self,
        op: &'static str,
        table: &EntityDef,
        call: impl Future<Output = Result<T, OrmError>>,
    ) -> Result<T, OrmError> {
        tracing::debug!(op, table = %table.name(), "storage call");
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, table = %table.name(), timeout = ?self.timeout, "storage call timed out");
                Err(OrmError::StorageTimeout(self.timeout))
            }
        }
    }
}
