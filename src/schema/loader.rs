//! Load a schema document (JSON) into a registry.

use crate::error::{ConfigError, OrmError};
use crate::schema::registry::SchemaRegistry;
use crate::schema::types::EntityDef;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All entity declarations in one document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub entities: Vec<EntityDef>,
}

impl SchemaDocument {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}

/// Define every entity of the document, then validate cross-entity references.
pub fn load_registry(doc: &SchemaDocument) -> Result<SchemaRegistry, OrmError> {
    let mut registry = SchemaRegistry::new();
    for def in &doc.entities {
        registry.define(def.clone())?;
    }
    registry.validate()?;
    tracing::info!(entities = doc.entities.len(), "schema loaded");
    Ok(registry)
}
