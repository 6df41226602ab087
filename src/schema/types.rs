//! Entity, column and relation declarations. Deserializable so a whole schema can live in one JSON document.

use crate::error::OrmError;
use crate::filter::OrderBy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column storage types, named as in the schema document (`increments`, `dateTime`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    /// Generated integer primary key.
    Increments,
    Integer,
    Float,
    /// Numeric tally; accepts JSON numbers or numeric strings.
    Decimal,
    String,
    Text,
    Boolean,
    /// RFC 3339 timestamp string.
    DateTime,
}

impl ColumnType {
    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::Increments | ColumnType::Integer)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Increments | ColumnType::Integer | ColumnType::Float | ColumnType::Decimal
        )
    }

    /// PostgreSQL type used to cast bound parameters.
    pub fn pg_type(self) -> &'static str {
        match self {
            ColumnType::Increments | ColumnType::Integer => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Decimal => "numeric",
            ColumnType::String | ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "timestamptz",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    Email,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub unsigned: bool,
    #[serde(default, alias = "maxlength")]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub format: Option<ValueFormat>,
    #[serde(default)]
    pub default: Option<Value>,
}

fn default_true() -> bool {
    true
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_: ColumnType) -> Self {
        ColumnDef {
            name: name.into(),
            type_,
            nullable: true,
            primary: false,
            unique: false,
            unsigned: false,
            max_length: None,
            min_length: None,
            pattern: None,
            format: None,
            default: None,
        }
    }

    /// Generated integer primary key.
    pub fn increments(name: impl Into<String>) -> Self {
        let mut col = ColumnDef::new(name, ColumnType::Increments);
        col.nullable = false;
        col.primary = true;
        col
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn max_length(mut self, n: u32) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn min_length(mut self, n: u32) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn pattern(mut self, re: impl Into<String>) -> Self {
        self.pattern = Some(re.into());
        self
    }

    pub fn format(mut self, format: ValueFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }

    /// Key is produced by storage on insert.
    pub fn is_generated(&self) -> bool {
        self.type_ == ColumnType::Increments
    }
}

/// How a relation joins its owner to its target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    /// Owner holds `foreign_key` pointing at the target's primary key.
    BelongsTo { foreign_key: String },
    /// Target holds `foreign_key` pointing at the owner's primary key.
    HasMany { foreign_key: String },
    /// Rows of `join_entity` link owner (`this_key`) to target (`other_key`).
    BelongsToMany {
        join_entity: String,
        this_key: String,
        other_key: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub target: String,
    #[serde(flatten)]
    pub kind: RelationKind,
    /// Default ordering for to-many relations; ascending primary key when absent.
    #[serde(default)]
    pub order_by: Option<OrderBy>,
}

impl RelationDef {
    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        RelationDef {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::BelongsTo {
                foreign_key: foreign_key.into(),
            },
            order_by: None,
        }
    }

    pub fn has_many(name: impl Into<String>, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        RelationDef {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::HasMany {
                foreign_key: foreign_key.into(),
            },
            order_by: None,
        }
    }

    pub fn belongs_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        join_entity: impl Into<String>,
        this_key: impl Into<String>,
        other_key: impl Into<String>,
    ) -> Self {
        RelationDef {
            name: name.into(),
            target: target.into(),
            kind: RelationKind::BelongsToMany {
                join_entity: join_entity.into(),
                this_key: this_key.into(),
                other_key: other_key.into(),
            },
            order_by: None,
        }
    }

    pub fn ordered_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }
}

/// One table: columns, relations and managed-column options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    name: String,
    columns: Vec<ColumnDef>,
    #[serde(default)]
    relations: Vec<RelationDef>,
    /// Writer fills `created_at` on insert and `updated_at` on insert and update.
    #[serde(default)]
    timestamps: bool,
    /// Soft-expiry column consulted by `Query::live_at`.
    #[serde(default)]
    expires_at: Option<String>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        EntityDef {
            name: name.into(),
            columns: Vec::new(),
            relations: Vec::new(),
            timestamps: false,
            expires_at: None,
        }
    }

    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn with_expiry(mut self, column: impl Into<String>) -> Self {
        self.expires_at = Some(column.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn expiry_column(&self) -> Option<&str> {
        self.expires_at.as_deref()
    }

    /// Name of the primary key column. The registry rejects definitions without exactly one.
    pub fn primary_key(&self) -> &str {
        self.columns
            .iter()
            .find(|c| c.primary)
            .map(|c| c.name.as_str())
            .unwrap_or("id")
    }

    pub fn primary_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&ColumnDef, OrmError> {
        self.column(name)
            .ok_or_else(|| OrmError::unknown_column(&self.name, name))
    }

    pub fn relation(&self, name: &str) -> Result<&RelationDef, OrmError> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| OrmError::UnknownRelation {
                entity: self.name.clone(),
                relation: name.to_string(),
            })
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.unique && !c.primary)
    }

    /// Columns the writer fills itself when `timestamps` is on.
    pub fn is_managed_timestamp(&self, column: &str) -> bool {
        self.timestamps && (column == "created_at" || column == "updated_at")
    }
}
