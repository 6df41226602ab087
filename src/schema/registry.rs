//! Process-wide entity registry: populated once at startup, then shared read-only behind `Arc`.

use crate::error::OrmError;
use crate::schema::types::{ColumnType, EntityDef, RelationKind};
use crate::schema::validator::validate;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, Arc<EntityDef>>,
    /// Definition order, for deterministic iteration.
    order: Vec<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Register an entity. Fails with `SchemaConflict` on a repeated name or a malformed definition.
    pub fn define(&mut self, def: EntityDef) -> Result<Arc<EntityDef>, OrmError> {
        if self.entities.contains_key(def.name()) {
            return Err(OrmError::SchemaConflict(format!(
                "entity '{}' is already defined",
                def.name()
            )));
        }
        check_local(&def)?;
        let def = Arc::new(def);
        tracing::debug!(entity = %def.name(), columns = def.columns().len(), relations = def.relations().len(), "entity defined");
        self.order.push(def.name().to_string());
        self.entities.insert(def.name().to_string(), def.clone());
        Ok(def)
    }

    pub fn resolve(&self, name: &str) -> Result<&Arc<EntityDef>, OrmError> {
        self.entities
            .get(name)
            .ok_or_else(|| OrmError::UnknownEntity(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityDef>> {
        self.order.iter().filter_map(|n| self.entities.get(n))
    }

    /// Cross-entity checks: relation targets, join entities and key columns.
    pub fn validate(&self) -> Result<(), OrmError> {
        validate(self)
    }

    /// Validate and share. No definitions can be added afterwards.
    pub fn freeze(self) -> Result<Arc<SchemaRegistry>, OrmError> {
        self.validate()?;
        Ok(Arc::new(self))
    }
}

/// Checks that need only the definition itself.
fn check_local(def: &EntityDef) -> Result<(), OrmError> {
    let name = def.name();
    let primaries = def.columns().iter().filter(|c| c.primary).count();
    if primaries != 1 {
        return Err(OrmError::SchemaConflict(format!(
            "entity '{}' must declare exactly one primary column, found {}",
            name, primaries
        )));
    }
    let mut seen = HashSet::new();
    for c in def.columns() {
        if !seen.insert(c.name.as_str()) {
            return Err(OrmError::SchemaConflict(format!(
                "entity '{}' declares column '{}' twice",
                name, c.name
            )));
        }
        if c.type_ == ColumnType::Increments && !c.primary {
            return Err(OrmError::SchemaConflict(format!(
                "{}.{}: increments is only valid on the primary column",
                name, c.name
            )));
        }
        if let Some(pattern) = &c.pattern {
            Regex::new(pattern).map_err(|e| {
                OrmError::SchemaConflict(format!("{}.{}: invalid pattern: {}", name, c.name, e))
            })?;
        }
    }
    let mut relation_names = HashSet::new();
    for r in def.relations() {
        if seen.contains(r.name.as_str()) || !relation_names.insert(r.name.as_str()) {
            return Err(OrmError::SchemaConflict(format!(
                "entity '{}' relation '{}' clashes with another column or relation",
                name, r.name
            )));
        }
        if let RelationKind::BelongsTo { foreign_key } = &r.kind {
            if def.column(foreign_key).is_none() {
                return Err(OrmError::SchemaConflict(format!(
                    "{}.{}: foreign key column '{}' is not declared",
                    name, r.name, foreign_key
                )));
            }
        }
    }
    if let Some(col) = def.expiry_column() {
        match def.column(col) {
            Some(c) if c.type_ == ColumnType::DateTime => {}
            _ => {
                return Err(OrmError::SchemaConflict(format!(
                    "{}: expiry column '{}' must be a declared dateTime column",
                    name, col
                )))
            }
        }
    }
    Ok(())
}
