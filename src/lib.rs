//! Fieldnotes: schema-driven entity mapping with explicit, batched relation loading over pluggable storage.

pub mod entity;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod query;
pub mod resolver;
pub mod response;
pub mod routes;
pub mod schema;
pub mod session;
pub mod settings;
pub mod sql;
pub mod state;
pub mod storage;
pub mod validation;
pub mod writer;

pub use entity::{Entity, Related};
pub use error::{AppError, ConfigError, OrmError};
pub use filter::{Condition, Direction, Filter, OrderBy, Row, SelectOptions};
pub use query::{Query, QueryBuilder};
pub use resolver::{RelationPath, RelationResolver};
pub use routes::{app, common_routes, entity_routes};
pub use schema::{ColumnDef, ColumnType, EntityDef, RelationDef, RelationKind, SchemaDocument, SchemaRegistry};
pub use session::{Session, DEFAULT_STORAGE_TIMEOUT};
pub use settings::Settings;
pub use state::AppState;
pub use storage::{MemoryStorage, PgStorage, Storage};
pub use writer::{DeletePolicy, PersistenceWriter};
