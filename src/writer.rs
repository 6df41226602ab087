//! Persistence writer: insert/update from dirty columns, deletes under a reference policy, join-row links.
//!
//! Every write is a single storage statement. Foreign keys and unique columns are checked with reads
//! beforehand; a storage-side rejection surfaces with the same error kinds.

use crate::entity::Entity;
use crate::error::OrmError;
use crate::filter::{Filter, KeyValue, Row, SelectOptions};
use crate::schema::{EntityDef, RelationDef, RelationKind};
use crate::session::Session;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// What `delete` does when `has_many` dependents still reference the row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Refuse with `ConstraintViolation`.
    #[default]
    Restrict,
    /// Delete dependents first, recursively.
    Cascade,
}

pub struct PersistenceWriter<'s> {
    session: &'s Session,
}

impl<'s> PersistenceWriter<'s> {
    pub fn new(session: &'s Session) -> Self {
        PersistenceWriter { session }
    }

    /// Insert a new entity (assigning its generated key) or update its dirty columns.
    pub async fn save(&self, entity: &mut Entity) -> Result<(), OrmError> {
        if entity.is_new() {
            self.insert(entity).await
        } else {
            self.update(entity).await
        }
    }

    async fn insert(&self, entity: &mut Entity) -> Result<(), OrmError> {
        let def = entity.def().clone();
        let now = now_rfc3339();
        for col in def.columns() {
            if def.is_managed_timestamp(&col.name) && !entity.is_set(&col.name) {
                entity.set_managed(&col.name, now.clone());
            }
        }
        for col in def.columns() {
            if let Some(default) = &col.default {
                if !entity.is_set(&col.name) {
                    entity.set_managed(&col.name, default.clone());
                }
            }
        }
        for col in def.columns() {
            if !col.nullable && !col.is_generated() && !entity.is_set(&col.name) {
                return Err(OrmError::ValidationFailed(format!(
                    "{}.{} is required",
                    def.name(),
                    col.name
                )));
            }
        }
        let row: Row = entity
            .values()
            .iter()
            .filter(|(k, v)| !(v.is_null() && *k == def.primary_key()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.check_unique(&def, &row, None).await?;
        self.check_foreign_keys(&def, &row).await?;
        let key = self.session.insert(&def, &row).await.inspect_err(|e| {
            tracing::warn!(entity = %def.name(), error = %e, "insert rejected");
        })?;
        tracing::debug!(entity = %def.name(), key = %key, "inserted");
        entity.assign_key(key);
        entity.mark_clean();
        Ok(())
    }

    async fn update(&self, entity: &mut Entity) -> Result<(), OrmError> {
        if !entity.is_dirty() {
            return Ok(());
        }
        let def = entity.def().clone();
        if def.is_managed_timestamp("updated_at") && def.column("updated_at").is_some() {
            entity.set_managed("updated_at", now_rfc3339());
        }
        let key = entity
            .primary_key()
            .cloned()
            .ok_or_else(|| OrmError::ValidationFailed(format!("{} has no primary key", def.name())))?;
        let changed: Row = entity
            .dirty_columns()
            .filter(|c| *c != def.primary_key())
            .map(|c| (c.to_string(), entity.values().get(c).cloned().unwrap_or(Value::Null)))
            .collect();
        let own_key = KeyValue::from_value(&key);
        self.check_unique(&def, &changed, own_key.as_ref()).await?;
        self.check_foreign_keys(&def, &changed).await?;
        let affected = self.session.update(&def, &key, &changed).await.inspect_err(|e| {
            tracing::warn!(entity = %def.name(), error = %e, "update rejected");
        })?;
        if affected == 0 {
            return Err(OrmError::NotFound {
                entity: def.name().to_string(),
                key: key.to_string(),
            });
        }
        // cached belongs_to targets are stale once their foreign key changes
        for rel in def.relations() {
            if let RelationKind::BelongsTo { foreign_key } = &rel.kind {
                if changed.contains_key(foreign_key) {
                    entity.clear_related(&rel.name);
                }
            }
        }
        entity.mark_clean();
        Ok(())
    }

    /// Unique columns present in `row` must not already hold the same value in another row.
    async fn check_unique(&self, def: &EntityDef, row: &Row, own_key: Option<&KeyValue>) -> Result<(), OrmError> {
        for col in def.unique_columns() {
            let Some(v) = row.get(&col.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let filter = Filter::new().eq(col.name.as_str(), v.clone());
            let rows = self.session.select(def, &filter, &SelectOptions::default()).await?;
            let clash = rows.iter().any(|r| {
                r.get(def.primary_key()).and_then(KeyValue::from_value).as_ref() != own_key
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

    /// Every non-null `belongs_to` foreign key present in `row` must reference an existing target row.
    async fn check_foreign_keys(&self, def: &EntityDef, row: &Row) -> Result<(), OrmError> {
        for rel in def.relations() {
            let RelationKind::BelongsTo { foreign_key } = &rel.kind else {
                continue;
            };
            let Some(v) = row.get(foreign_key).filter(|v| !v.is_null()) else {
                continue;
            };
            let target = self.session.entity(&rel.target)?;
            let filter = Filter::new().eq(target.primary_key(), v.clone());
            let found = self
                .session
                .select(&target, &filter, &SelectOptions::default())
                .await?;
            if found.is_empty() {
                return Err(OrmError::ConstraintViolation(format!(
                    "{}.{} = {} does not reference an existing {} row",
                    def.name(),
                    foreign_key,
                    v,
                    target.name()
                )));
            }
        }
        Ok(())
    }

    /// Delete by primary key. `has_many` dependents are refused or cascaded per `policy`;
    /// many-to-many join rows are left alone (see `unlink`).
    pub async fn delete(&self, entity: &Entity, policy: DeletePolicy) -> Result<(), OrmError> {
        let def = entity.def().clone();
        let key = entity.primary_key().cloned().ok_or_else(|| {
            OrmError::ValidationFailed(format!("cannot delete an unsaved {}", def.name()))
        })?;

        // breadth-first plan, deleted leaves first
        let mut plan: Vec<(Arc<EntityDef>, Value)> = vec![(def.clone(), key.clone())];
        let mut seen: HashSet<(String, KeyValue)> = HashSet::new();
        if let Some(k) = KeyValue::from_value(&key) {
            seen.insert((def.name().to_string(), k));
        }
        let mut i = 0;
        while i < plan.len() {
            let (owner, owner_key) = plan[i].clone();
            for rel in owner.relations() {
                let RelationKind::HasMany { foreign_key } = &rel.kind else {
                    continue;
                };
                let child = self.session.entity(&rel.target)?;
                let filter = Filter::new().eq(foreign_key.as_str(), owner_key.clone());
                let rows = self.session.select(&child, &filter, &SelectOptions::default()).await?;
                if rows.is_empty() {
                    continue;
                }
                if policy == DeletePolicy::Restrict {
                    return Err(OrmError::ConstraintViolation(format!(
                        "{} {} is still referenced by {} {} row(s)",
                        owner.name(),
                        owner_key,
                        rows.len(),
                        child.name()
                    )));
                }
                for row in rows {
                    let Some(child_key) = row.get(child.primary_key()).cloned() else {
                        continue;
                    };
                    let Some(k) = KeyValue::from_value(&child_key) else {
                        continue;
                    };
                    if seen.insert((child.name().to_string(), k)) {
                        plan.push((child.clone(), child_key));
                    }
                }
            }
            i += 1;
        }

        for (table, k) in plan.iter().skip(1).rev() {
            self.session.delete_row(table, k).await?;
        }
        let affected = self.session.delete_row(&def, &key).await?;
        if affected == 0 {
            return Err(OrmError::NotFound {
                entity: def.name().to_string(),
                key: key.to_string(),
            });
        }
        tracing::debug!(entity = %def.name(), key = %key, cascaded = plan.len() - 1, "deleted");
        Ok(())
    }

    /// Add a join row linking `entity` to `target` through the many-to-many `relation`.
    /// Linking an already linked pair is a no-op.
    pub async fn link(&self, entity: &mut Entity, relation: &str, target: &Entity) -> Result<(), OrmError> {
        let link = self.join_link(entity, relation, target)?;
        let existing = self.session.select(&link.join, &link.filter(), &SelectOptions::default()).await?;
        if existing.is_empty() {
            let mut row = Row::new();
            row.insert(link.this_key.clone(), link.this_value.clone());
            row.insert(link.other_key.clone(), link.other_value.clone());
            self.check_foreign_keys(&link.join, &row).await?;
            self.session.insert(&link.join, &row).await?;
        }
        entity.clear_related(relation);
        Ok(())
    }

    /// Remove the join row linking `entity` to `target`; `LinkNotFound` when they are not linked.
    pub async fn unlink(&self, entity: &mut Entity, relation: &str, target: &Entity) -> Result<(), OrmError> {
        let link = self.join_link(entity, relation, target)?;
        let rows = self.session.select(&link.join, &link.filter(), &SelectOptions::default()).await?;
        if rows.is_empty() {
            return Err(OrmError::LinkNotFound {
                entity: entity.name().to_string(),
                relation: relation.to_string(),
                target: link.other_value.to_string(),
            });
        }
        for row in rows {
            if let Some(k) = row.get(link.join.primary_key()) {
                self.session.delete_row(&link.join, k).await?;
            }
        }
        entity.clear_related(relation);
        Ok(())
    }

    fn join_link(&self, entity: &Entity, relation: &str, target: &Entity) -> Result<JoinLink, OrmError> {
        let rel: &RelationDef = entity.def().relation(relation)?;
        let RelationKind::BelongsToMany {
            join_entity,
            this_key,
            other_key,
        } = &rel.kind
        else {
            return Err(OrmError::ValidationFailed(format!(
                "{}.{} is not a many-to-many relation",
                entity.name(),
                relation
            )));
        };
        if target.name() != rel.target {
            return Err(OrmError::ValidationFailed(format!(
                "{}.{} links to {}, not {}",
                entity.name(),
                relation,
                rel.target,
                target.name()
            )));
        }
        let this_value = entity.primary_key().cloned().ok_or_else(|| {
            OrmError::ValidationFailed(format!("{} must be saved before linking", entity.name()))
        })?;
        let other_value = target.primary_key().cloned().ok_or_else(|| {
            OrmError::ValidationFailed(format!("{} must be saved before linking", target.name()))
        })?;
        Ok(JoinLink {
            join: self.session.entity(join_entity)?,
            this_key: this_key.clone(),
            other_key: other_key.clone(),
            this_value,
            other_value,
        })
    }
}

struct JoinLink {
    join: Arc<EntityDef>,
    this_key: String,
    other_key: String,
    this_value: Value,
    other_value: Value,
}

impl JoinLink {
    fn filter(&self) -> Filter {
        Filter::new()
            .eq(self.this_key.as_str(), self.this_value.clone())
            .eq(self.other_key.as_str(), self.other_value.clone())
    }
}

fn now_rfc3339() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}
