//! Schema validation: relation targets, join entities and key columns must all exist.

use crate::error::OrmError;
use crate::schema::registry::SchemaRegistry;
use crate::schema::types::{EntityDef, RelationKind};

pub fn validate(registry: &SchemaRegistry) -> Result<(), OrmError> {
    for def in registry.entities() {
        for rel in def.relations() {
            let target = registry.resolve(&rel.target).map_err(|_| {
                missing(def, &rel.name, "target entity", &rel.target)
            })?;
            match &rel.kind {
                RelationKind::BelongsTo { .. } => {}
                RelationKind::HasMany { foreign_key } => {
                    if target.column(foreign_key).is_none() {
                        return Err(missing(def, &rel.name, "foreign key column", foreign_key));
                    }
                }
                RelationKind::BelongsToMany {
                    join_entity,
                    this_key,
                    other_key,
                } => {
                    let join = registry.resolve(join_entity).map_err(|_| {
                        missing(def, &rel.name, "join entity", join_entity)
                    })?;
                    for key in [this_key, other_key] {
                        if join.column(key).is_none() {
                            return Err(missing(def, &rel.name, "join key column", key));
                        }
                    }
                }
            }
            if let Some(order) = &rel.order_by {
                if target.column(&order.column).is_none() {
                    return Err(missing(def, &rel.name, "ordering column", &order.column));
                }
            }
        }
    }
    Ok(())
}

fn missing(def: &EntityDef, relation: &str, what: &str, id: &str) -> OrmError {
    OrmError::SchemaConflict(format!(
        "{}.{}: {} '{}' is not defined",
        def.name(),
        relation,
        what,
        id
    ))
}
