//! PostgreSQL backend over a sqlx pool.

use super::Storage;
use crate::error::OrmError;
use crate::filter::{Filter, Row, SelectOptions};
use crate::schema::EntityDef;
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for foreign_key_violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone, Debug)]
pub struct PgStorage {
    pool: PgPool,
    schema: String,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        PgStorage {
            pool,
            schema: "public".into(),
        }
    }

    /// Tables live in `schema` instead of `public`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn query(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        q.params
            .iter()
            .fold(sqlx::query(&q.sql), |query, p| PgBindValue::from_json(p).bind_to(query))
    }
}

/// Map constraint failures reported by PostgreSQL onto the core's error taxonomy.
fn map_db_error(table: &EntityDef, e: sqlx::Error) -> OrmError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return OrmError::DuplicateKey {
                    table: table.name().to_string(),
                    detail: db.message().to_string(),
                }
            }
            Some(FOREIGN_KEY_VIOLATION) => {
                return OrmError::ConstraintViolation(db.message().to_string())
            }
            _ => {}
        }
    }
    OrmError::Db(e)
}

#[async_trait]
impl Storage for PgStorage {
    async fn select_where(
        &self,
        table: &EntityDef,
        filter: &Filter,
        options: &SelectOptions,
    ) -> Result<Vec<Row>, OrmError> {
        let q = sql::select_where(table, &self.schema, filter, options);
        let rows = Self::query(&q)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error(table, e))?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    async fn insert(&self, table: &EntityDef, columns: &Row) -> Result<Value, OrmError> {
        let q = sql::insert(table, &self.schema, columns);
        let row = Self::query(&q)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error(table, e))?;
        Ok(cell_to_value(&row, table.primary_key()))
    }

    async fn update(&self, table: &EntityDef, key: &Value, changed: &Row) -> Result<u64, OrmError> {
        let Some(q) = sql::update(table, &self.schema, key, changed) else {
            return Ok(0);
        };
        let done = Self::query(&q)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(table, e))?;
        Ok(done.rows_affected())
    }

    async fn delete_row(&self, table: &EntityDef, key: &Value) -> Result<u64, OrmError> {
        let q = sql::delete(table, &self.schema, key);
        let done = Self::query(&q)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(table, e))?;
        Ok(done.rows_affected())
    }
}

fn row_to_map(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.and_utc().to_rfc3339());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}
