//! Entity: a record bound to one schema definition, with dirty tracking and a relation cache.
//!
//! Relations are never loaded implicitly. Reading a relation that the resolver has not populated
//! fails with `RelationNotResolved`, so every storage access stays visible to the caller.

use crate::error::OrmError;
use crate::filter::{KeyValue, Row};
use crate::schema::EntityDef;
use crate::validation::validate_value;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A resolved relation value.
#[derive(Clone, Debug, PartialEq)]
pub enum Related {
    /// `belongs_to`: the target row, or `None` for a null or dangling foreign key.
    One(Option<Box<Entity>>),
    /// `has_many` / `belongs_to_many`, in resolution order.
    Many(Vec<Entity>),
}

impl Related {
    pub fn len(&self) -> usize {
        match self {
            Related::One(e) => usize::from(e.is_some()),
            Related::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entities_mut(&mut self) -> Vec<&mut Entity> {
        match self {
            Related::One(Some(e)) => vec![e.as_mut()],
            Related::One(None) => Vec::new(),
            Related::Many(v) => v.iter_mut().collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Entity {
    def: Arc<EntityDef>,
    values: Row,
    dirty: BTreeSet<String>,
    relations: HashMap<String, Related>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.def.name() == other.def.name()
            && self.values == other.values
            && self.relations == other.relations
    }
}

impl Entity {
    /// Empty, unsaved entity.
    pub fn new(def: Arc<EntityDef>) -> Self {
        Entity {
            def,
            values: Row::new(),
            dirty: BTreeSet::new(),
            relations: HashMap::new(),
        }
    }

    /// Unsaved entity with every value validated as by `set`.
    pub fn with_values(def: Arc<EntityDef>, values: Row) -> Result<Self, OrmError> {
        let mut entity = Entity::new(def);
        for (k, v) in values {
            entity.set(&k, v)?;
        }
        Ok(entity)
    }

    /// Entity read from storage: values are trusted and nothing is dirty. Undeclared columns are dropped.
    pub(crate) fn from_row(def: Arc<EntityDef>, row: Row) -> Self {
        let values = row
            .into_iter()
            .filter(|(k, _)| def.column(k).is_some())
            .collect();
        Entity {
            def,
            values,
            dirty: BTreeSet::new(),
            relations: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn def(&self) -> &Arc<EntityDef> {
        &self.def
    }

    /// Declared column value; unset columns read as null.
    pub fn get(&self, column: &str) -> Result<&Value, OrmError> {
        self.def.require_column(column)?;
        Ok(self.values.get(column).unwrap_or(&Value::Null))
    }

    /// Validate and assign a column value, marking it dirty.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<(), OrmError> {
        let value = value.into();
        let col = self.def.require_column(column)?;
        validate_value(self.def.name(), col, &value)?;
        if col.primary && !self.is_new() && self.values.get(column) != Some(&value) {
            return Err(OrmError::invalid_value(
                self.def.name(),
                column,
                "primary key of a persisted entity cannot change",
            ));
        }
        self.values.insert(column.to_string(), value);
        self.dirty.insert(column.to_string());
        Ok(())
    }

    /// True until a primary key is assigned.
    pub fn is_new(&self) -> bool {
        self.primary_key().is_none()
    }

    pub fn primary_key(&self) -> Option<&Value> {
        self.values
            .get(self.def.primary_key())
            .filter(|v| !v.is_null())
    }

    pub(crate) fn key(&self) -> Option<KeyValue> {
        self.primary_key().and_then(KeyValue::from_value)
    }

    pub(crate) fn key_of(&self, column: &str) -> Option<KeyValue> {
        self.values.get(column).and_then(KeyValue::from_value)
    }

    pub fn values(&self) -> &Row {
        &self.values
    }

    pub fn is_set(&self, column: &str) -> bool {
        self.values.get(column).map(|v| !v.is_null()).unwrap_or(false)
    }

    pub fn dirty_columns(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// Store a generated key without marking it dirty.
    pub(crate) fn assign_key(&mut self, key: Value) {
        self.values.insert(self.def.primary_key().to_string(), key);
    }

    /// Writer-managed assignment (timestamps, defaults); skips validation but marks dirty.
    pub(crate) fn set_managed(&mut self, column: &str, value: Value) {
        self.values.insert(column.to_string(), value);
        self.dirty.insert(column.to_string());
    }

    /// Resolved relation value. Fails with `RelationNotResolved` until the resolver has run.
    pub fn related(&self, relation: &str) -> Result<&Related, OrmError> {
        self.def.relation(relation)?;
        self.relations
            .get(relation)
            .ok_or_else(|| OrmError::RelationNotResolved {
                entity: self.def.name().to_string(),
                relation: relation.to_string(),
            })
    }

    /// Resolved `belongs_to` target, `None` when the foreign key is null or dangling.
    pub fn related_one(&self, relation: &str) -> Result<Option<&Entity>, OrmError> {
        match self.related(relation)? {
            Related::One(e) => Ok(e.as_deref()),
            Related::Many(v) => Ok(v.first()),
        }
    }

    /// Resolved to-many sequence. A `belongs_to` reads as a zero-or-one slice.
    pub fn related_many(&self, relation: &str) -> Result<&[Entity], OrmError> {
        match self.related(relation)? {
            Related::One(Some(e)) => Ok(std::slice::from_ref(e.as_ref())),
            Related::One(None) => Ok(&[]),
            Related::Many(v) => Ok(v),
        }
    }

    pub fn is_resolved(&self, relation: &str) -> bool {
        self.relations.contains_key(relation)
    }

    pub(crate) fn set_related(&mut self, relation: &str, value: Related) {
        self.relations.insert(relation.to_string(), value);
    }

    /// Forget a cached relation; the next read must resolve again.
    pub(crate) fn clear_related(&mut self, relation: &str) {
        self.relations.remove(relation);
    }

    /// Entities cached under `relation`, for recursing into the next path segment.
    pub(crate) fn related_entities_mut(&mut self, relation: &str) -> Vec<&mut Entity> {
        self.relations
            .get_mut(relation)
            .map(Related::entities_mut)
            .unwrap_or_default()
    }

    /// Columns plus every resolved relation, nested.
    pub fn to_json(&self) -> Value {
        let mut map = self.values.clone();
        for col in self.def.columns() {
            map.entry(col.name.clone()).or_insert(Value::Null);
        }
        for (name, related) in &self.relations {
            let v = match related {
                Related::One(Some(e)) => e.to_json(),
                Related::One(None) => Value::Null,
                Related::Many(v) => Value::Array(v.iter().map(Entity::to_json).collect()),
            };
            map.insert(name.clone(), v);
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType, RelationDef};
    use serde_json::json;

    fn tags() -> Arc<EntityDef> {
        Arc::new(
            EntityDef::new("tags")
                .with_column(ColumnDef::increments("id"))
                .with_column(ColumnDef::new("slug", ColumnType::String).not_null().max_length(5))
                .with_column(ColumnDef::new("name", ColumnType::String))
                .with_relation(RelationDef::belongs_to_many("posts", "posts", "posts_tags", "tag_id", "post_id")),
        )
    }

    #[test]
    fn get_and_set_validate_columns() {
        let mut tag = Entity::new(tags());
        assert!(matches!(tag.get("colour"), Err(OrmError::UnknownColumn { .. })));
        assert!(matches!(tag.set("colour", "red"), Err(OrmError::UnknownColumn { .. })));
        assert!(matches!(tag.set("slug", "toolong"), Err(OrmError::InvalidValue { .. })));
        assert!(matches!(tag.set("slug", Value::Null), Err(OrmError::InvalidValue { .. })));
        tag.set("slug", "rust").unwrap();
        assert_eq!(tag.get("slug").unwrap(), &json!("rust"));
        assert_eq!(tag.get("name").unwrap(), &Value::Null);
        assert_eq!(tag.dirty_columns().collect::<Vec<_>>(), vec!["slug"]);
    }

    #[test]
    fn is_new_tracks_primary_key() {
        let mut tag = Entity::new(tags());
        assert!(tag.is_new());
        tag.assign_key(json!(5));
        assert!(!tag.is_new());
        assert!(!tag.is_dirty());
        assert!(matches!(tag.set("id", 6), Err(OrmError::InvalidValue { .. })));
    }

    #[test]
    fn relations_must_be_resolved_before_reading() {
        let tag = Entity::new(tags());
        assert!(matches!(
            tag.related("posts"),
            Err(OrmError::RelationNotResolved { relation, .. }) if relation == "posts"
        ));
        assert!(matches!(tag.related("owner"), Err(OrmError::UnknownRelation { .. })));
    }

    #[test]
    fn to_json_nests_resolved_relations() {
        let def = tags();
        let mut tag = Entity::from_row(def.clone(), json!({"id": 1, "slug": "rust"}).as_object().cloned().unwrap());
        tag.set_related("posts", Related::Many(Vec::new()));
        let out = tag.to_json();
        assert_eq!(out["slug"], json!("rust"));
        assert_eq!(out["name"], Value::Null);
        assert_eq!(out["posts"], json!([]));
    }

    #[test]
    fn from_row_drops_undeclared_columns() {
        let row = json!({"id": 2, "slug": "go", "archived_at": null}).as_object().cloned().unwrap();
        let tag = Entity::from_row(tags(), row);
        assert!(!tag.values().contains_key("archived_at"));
    }
}
