//! Relation resolution: batched, path-based eager loading into entity relation caches.
//!
//! Each path segment costs at most one storage query per entity type for `belongs_to` and
//! `has_many`, and two for `belongs_to_many` (join rows, then targets), however many entities are
//! being resolved. Entities that already hold the relation are skipped, so re-resolving is free.

use crate::entity::{Entity, Related};
use crate::error::OrmError;
use crate::filter::{Filter, KeyValue, OrderBy, Row, SelectOptions};
use crate::schema::{EntityDef, RelationDef, RelationKind};
use crate::session::Session;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathSegment {
    pub relation: String,
    /// Overrides the relation's declared ordering for this load.
    pub order_by: Option<OrderBy>,
}

/// Ordered relation names, e.g. `category.posts` loads each entity's category, then the category's posts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationPath {
    segments: Vec<PathSegment>,
}

impl RelationPath {
    pub fn new<I, S>(relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelationPath {
            segments: relations
                .into_iter()
                .map(|r| PathSegment {
                    relation: r.into(),
                    order_by: None,
                })
                .collect(),
        }
    }

    /// Dotted form; empty pieces are ignored.
    pub fn parse(s: &str) -> Self {
        RelationPath::new(s.split('.').map(str::trim).filter(|p| !p.is_empty()))
    }

    /// Append a segment.
    pub fn then(mut self, relation: impl Into<String>) -> Self {
        self.segments.push(PathSegment {
            relation: relation.into(),
            order_by: None,
        });
        self
    }

    /// Order the last segment's rows by `order`.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        if let Some(last) = self.segments.last_mut() {
            last.order_by = Some(order);
        }
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for RelationPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RelationPath::parse(s))
    }
}

impl fmt::Display for RelationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.segments.iter().map(|s| s.relation.as_str()).collect();
        f.write_str(&names.join("."))
    }
}

pub struct RelationResolver<'s> {
    session: &'s Session,
}

impl<'s> RelationResolver<'s> {
    pub fn new(session: &'s Session) -> Self {
        RelationResolver { session }
    }

    /// Populate `path` on every entity, segment by segment.
    pub async fn resolve(&self, entities: &mut [Entity], path: &RelationPath) -> Result<(), OrmError> {
        let mut frontier: Vec<&mut Entity> = entities.iter_mut().collect();
        for segment in path.segments() {
            if frontier.is_empty() {
                break;
            }
            self.resolve_segment(&mut frontier, segment).await?;
            frontier = frontier
                .into_iter()
                .flat_map(|e| e.related_entities_mut(&segment.relation))
                .collect();
        }
        Ok(())
    }

    pub async fn resolve_all(&self, entities: &mut [Entity], paths: &[RelationPath]) -> Result<(), OrmError> {
        for path in paths {
            self.resolve(entities, path).await?;
        }
        Ok(())
    }

    pub async fn resolve_one(&self, entity: &mut Entity, path: &RelationPath) -> Result<(), OrmError> {
        self.resolve(std::slice::from_mut(entity), path).await
    }

    /// One segment over a mixed frontier: grouped by entity type, unresolved entities only.
    async fn resolve_segment(&self, frontier: &mut [&mut Entity], segment: &PathSegment) -> Result<(), OrmError> {
        let mut groups: Vec<(Arc<EntityDef>, Vec<usize>)> = Vec::new();
        for (i, e) in frontier.iter().enumerate() {
            if e.is_resolved(&segment.relation) {
                continue;
            }
            match groups.iter_mut().find(|(d, _)| d.name() == e.name()) {
                Some((_, idx)) => idx.push(i),
                None => groups.push((e.def().clone(), vec![i])),
            }
        }
        // entities already holding the relation still need it declared
        if let Some(e) = frontier.first() {
            if groups.is_empty() {
                e.def().relation(&segment.relation)?;
            }
        }
        for (def, idx) in groups {
            let relation = def.relation(&segment.relation)?.clone();
            let order = segment.order_by.clone().or_else(|| relation.order_by.clone());
            tracing::debug!(
                entity = %def.name(),
                relation = %relation.name,
                count = idx.len(),
                "resolving relation"
            );
            match &relation.kind {
                RelationKind::BelongsTo { foreign_key } => {
                    self.belongs_to(frontier, &idx, &relation, foreign_key).await?
                }
                RelationKind::HasMany { foreign_key } => {
                    self.has_many(frontier, &idx, &relation, foreign_key, order).await?
                }
                RelationKind::BelongsToMany {
                    join_entity,
                    this_key,
                    other_key,
                } => {
                    self.belongs_to_many(frontier, &idx, &relation, join_entity, this_key, other_key, order)
                        .await?
                }
            }
        }
        Ok(())
    }

    async fn belongs_to(
        &self,
        frontier: &mut [&mut Entity],
        idx: &[usize],
        relation: &RelationDef,
        foreign_key: &str,
    ) -> Result<(), OrmError> {
        let target = self.session.entity(&relation.target)?;
        let keys: BTreeSet<KeyValue> = idx.iter().filter_map(|&i| frontier[i].key_of(foreign_key)).collect();
        let by_key = if keys.is_empty() {
            HashMap::new()
        } else {
            let filter = Filter::new().is_in(target.primary_key(), keys.iter().map(KeyValue::to_value));
            let rows = self.session.select(&target, &filter, &SelectOptions::default()).await?;
            keyed_entities(&target, rows)
        };
        for &i in idx {
            let found = frontier[i]
                .key_of(foreign_key)
                .and_then(|k| by_key.get(&k))
                .map(|e| Box::new(e.clone()));
            frontier[i].set_related(&relation.name, Related::One(found));
        }
        Ok(())
    }

    async fn has_many(
        &self,
        frontier: &mut [&mut Entity],
        idx: &[usize],
        relation: &RelationDef,
        foreign_key: &str,
        order: Option<OrderBy>,
    ) -> Result<(), OrmError> {
        let target = self.session.entity(&relation.target)?;
        let keys: BTreeSet<KeyValue> = idx.iter().filter_map(|&i| frontier[i].key()).collect();
        let mut groups: HashMap<KeyValue, Vec<Entity>> = HashMap::new();
        if !keys.is_empty() {
            let filter = Filter::new().is_in(foreign_key, keys.iter().map(KeyValue::to_value));
            let rows = self.session.select(&target, &filter, &SelectOptions::ordered(order)).await?;
            for row in rows {
                let child = Entity::from_row(target.clone(), row);
                if let Some(k) = child.key_of(foreign_key) {
                    groups.entry(k).or_default().push(child);
                }
            }
        }
        for &i in idx {
            let children = frontier[i]
                .key()
                .and_then(|k| groups.get(&k).cloned())
                .unwrap_or_default();
            frontier[i].set_related(&relation.name, Related::Many(children));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn belongs_to_many(
        &self,
        frontier: &mut [&mut Entity],
        idx: &[usize],
        relation: &RelationDef,
        join_entity: &str,
        this_key: &str,
        other_key: &str,
        order: Option<OrderBy>,
    ) -> Result<(), OrmError> {
        let target = self.session.entity(&relation.target)?;
        let join = self.session.entity(join_entity)?;
        let keys: BTreeSet<KeyValue> = idx.iter().filter_map(|&i| frontier[i].key()).collect();

        let mut links: HashMap<KeyValue, HashSet<KeyValue>> = HashMap::new();
        if !keys.is_empty() {
            let filter = Filter::new().is_in(this_key, keys.iter().map(KeyValue::to_value));
            let join_rows = self.session.select(&join, &filter, &SelectOptions::default()).await?;
            for row in &join_rows {
                let this = row.get(this_key).and_then(KeyValue::from_value);
                let other = row.get(other_key).and_then(KeyValue::from_value);
                if let (Some(this), Some(other)) = (this, other) {
                    links.entry(this).or_default().insert(other);
                }
            }
        }
        let others: BTreeSet<&KeyValue> = links.values().flatten().collect();
        let targets: Vec<Entity> = if others.is_empty() {
            Vec::new()
        } else {
            let filter = Filter::new().is_in(target.primary_key(), others.iter().map(|k| k.to_value()));
            self.session
                .select(&target, &filter, &SelectOptions::ordered(order))
                .await?
                .into_iter()
                .map(|row| Entity::from_row(target.clone(), row))
                .collect()
        };
        for &i in idx {
            let linked = frontier[i].key().and_then(|k| links.get(&k));
            let list = match linked {
                Some(set) => targets
                    .iter()
                    .filter(|t| t.key().map(|k| set.contains(&k)).unwrap_or(false))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            };
            frontier[i].set_related(&relation.name, Related::Many(list));
        }
        Ok(())
    }
}

fn keyed_entities(def: &Arc<EntityDef>, rows: Vec<Row>) -> HashMap<KeyValue, Entity> {
    rows.into_iter()
        .map(|row| Entity::from_row(def.clone(), row))
        .filter_map(|e| e.key().map(|k| (k, e)))
        .collect()
}
