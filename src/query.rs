//! Query builder: one base select per request, rows mapped to entities, relation paths handed to the resolver.

use crate::entity::Entity;
use crate::error::OrmError;
use crate::filter::{Filter, OrderBy, SelectOptions};
use crate::resolver::RelationPath;
use crate::session::Session;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// A find request: entity, filter, relation paths to eager-load, ordering and paging.
#[derive(Clone, Debug)]
pub struct Query {
    entity: String,
    filter: Filter,
    paths: Vec<RelationPath>,
    order_by: Option<OrderBy>,
    limit: Option<u32>,
    offset: Option<u32>,
    live_at: Option<DateTime<Utc>>,
}

impl Query {
    pub fn new(entity: impl Into<String>) -> Self {
        Query {
            entity: entity.into(),
            filter: Filter::new(),
            paths: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
            live_at: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Eager-load `path` on every result. May be called repeatedly.
    pub fn with(mut self, path: RelationPath) -> Self {
        if !path.is_empty() {
            self.paths.push(path);
        }
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u32) -> Self {
        self.offset = Some(n);
        self
    }

    /// Hide rows whose declared expiry column is at or before `at`. Entities without one are unaffected.
    pub fn live_at(mut self, at: DateTime<Utc>) -> Self {
        self.live_at = Some(at);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }
}

pub struct QueryBuilder<'s> {
    session: &'s Session,
}

impl<'s> QueryBuilder<'s> {
    pub fn new(session: &'s Session) -> Self {
        QueryBuilder { session }
    }

    /// Entities of `entity` matching `filter`, ascending by primary key, with `path` resolved when given.
    pub async fn find(
        &self,
        entity: &str,
        filter: &Filter,
        path: Option<&RelationPath>,
    ) -> Result<Vec<Entity>, OrmError> {
        let mut query = Query::new(entity).filter(filter.clone());
        if let Some(p) = path {
            query = query.with(p.clone());
        }
        self.run(&query).await
    }

    /// Zero or one entity by primary key. Absence is not an error.
    pub async fn find_by_primary_key(
        &self,
        entity: &str,
        key: impl Into<Value>,
        path: Option<&RelationPath>,
    ) -> Result<Option<Entity>, OrmError> {
        let def = self.session.entity(entity)?;
        let filter = Filter::new().eq(def.primary_key(), key);
        Ok(self.find(entity, &filter, path).await?.into_iter().next())
    }

    pub async fn run(&self, query: &Query) -> Result<Vec<Entity>, OrmError> {
        let def = self.session.entity(&query.entity)?;
        query.filter.check(&def)?;
        if let Some(order) = &query.order_by {
            def.require_column(&order.column)?;
        }
        let mut filter = query.filter.clone();
        if let (Some(at), Some(col)) = (query.live_at, def.expiry_column()) {
            filter = filter.gt(col, at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        }
        let options = SelectOptions {
            order_by: query.order_by.clone(),
            limit: query.limit,
            offset: query.offset,
        };
        let rows = self.session.select(&def, &filter, &options).await?;
        let mut entities: Vec<Entity> = rows
            .into_iter()
            .map(|row| Entity::from_row(def.clone(), row))
            .collect();
        tracing::debug!(entity = %def.name(), rows = entities.len(), "find");
        if !entities.is_empty() {
            self.session
                .resolver()
                .resolve_all(&mut entities, &query.paths)
                .await?;
        }
        Ok(entities)
    }
}
