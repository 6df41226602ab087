//! Schema registry: data-driven entity, column and relation declarations.

pub mod blog;
pub mod loader;
pub mod registry;
pub mod types;
pub mod validator;

pub use loader::{load_registry, SchemaDocument};
pub use registry::SchemaRegistry;
pub use types::*;
