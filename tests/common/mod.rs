#![allow(dead_code)]

use async_trait::async_trait;
use fieldnotes::schema::blog;
use fieldnotes::{Entity, EntityDef, Filter, MemoryStorage, OrmError, Row, SelectOptions, Session, Storage};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory storage that counts selects, for batching assertions.
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    selects: AtomicUsize,
}

impl CountingStorage {
    pub fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.selects.store(0, Ordering::SeqCst);
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.inner.row_count(table).await
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn select_where(&self, table: &EntityDef, filter: &Filter, options: &SelectOptions) -> Result<Vec<Row>, OrmError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.inner.select_where(table, filter, options).await
    }

    async fn insert(&self, table: &EntityDef, columns: &Row) -> Result<Value, OrmError> {
        self.inner.insert(table, columns).await
    }

    async fn update(&self, table: &EntityDef, key: &Value, changed: &Row) -> Result<u64, OrmError> {
        self.inner.update(table, key, changed).await
    }

    async fn delete_row(&self, table: &EntityDef, key: &Value) -> Result<u64, OrmError> {
        self.inner.delete_row(table, key).await
    }
}

/// Storage whose every call stalls for `delay`.
pub struct SlowStorage {
    pub delay: Duration,
}

#[async_trait]
impl Storage for SlowStorage {
    async fn select_where(&self, _: &EntityDef, _: &Filter, _: &SelectOptions) -> Result<Vec<Row>, OrmError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn insert(&self, _: &EntityDef, _: &Row) -> Result<Value, OrmError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!(1))
    }

    async fn update(&self, _: &EntityDef, _: &Value, _: &Row) -> Result<u64, OrmError> {
        tokio::time::sleep(self.delay).await;
        Ok(1)
    }

    async fn delete_row(&self, _: &EntityDef, _: &Value) -> Result<u64, OrmError> {
        tokio::time::sleep(self.delay).await;
        Ok(1)
    }
}

pub fn session_with(storage: Arc<dyn Storage>) -> Session {
    let registry = blog::registry().unwrap().freeze().unwrap();
    Session::new(registry, storage, Duration::from_secs(2))
}

/// Blog session over counting memory storage.
pub fn counting_session() -> (Session, Arc<CountingStorage>) {
    let storage = Arc::new(CountingStorage::default());
    (session_with(storage.clone()), storage)
}

pub fn entity(session: &Session, name: &str, values: Value) -> Entity {
    let Value::Object(map) = values else {
        panic!("values must be an object");
    };
    Entity::with_values(session.entity(name).unwrap(), map).unwrap()
}

pub async fn save(session: &Session, name: &str, values: Value) -> Entity {
    let mut e = entity(session, name, values);
    session.writer().save(&mut e).await.unwrap();
    e
}

pub async fn user(session: &Session, email: &str) -> Entity {
    save(
        session,
        "users",
        json!({
            "email": email,
            "name": "Ada",
            "lat": 51.5,
            "lng": -0.12,
            "formatted_address": "London",
        }),
    )
    .await
}

pub async fn category(session: &Session, name: &str) -> Entity {
    save(session, "categories", json!({ "name": name })).await
}

pub async fn post(session: &Session, author: &Entity, category: &Entity, slug: &str) -> Entity {
    save(
        session,
        "posts",
        json!({
            "user_id": author.primary_key().unwrap(),
            "category_id": category.primary_key().unwrap(),
            "title": slug.to_uppercase(),
            "slug": slug,
            "html": "<p>hello</p>",
        }),
    )
    .await
}

pub async fn tag(session: &Session, slug: &str) -> Entity {
    save(session, "tags", json!({ "slug": slug, "name": slug })).await
}

pub async fn location(session: &Session, owner: &Entity, remove_after: &str) -> Entity {
    save(
        session,
        "added_locations",
        json!({
            "user_id": owner.primary_key().unwrap(),
            "lat": 48.85,
            "lng": 2.35,
            "formatted_address": "Paris",
            "remove_after": remove_after,
        }),
    )
    .await
}

pub fn key(e: &Entity) -> i64 {
    e.primary_key().and_then(Value::as_i64).unwrap()
}
