//! Entity handlers: list, read, create, update, delete, link and unlink.

use crate::entity::Entity;
use crate::error::AppError;
use crate::filter::{Condition, Filter};
use crate::query::Query as FindQuery;
use crate::resolver::RelationPath;
use crate::response::{success_many, success_one, success_one_ok, success_read, ReadMeta};
use crate::schema::{ColumnType, EntityDef};
use crate::state::AppState;
use crate::writer::DeletePolicy;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

const RESERVED_PARAMS: [&str; 5] = ["include", "limit", "offset", "live", "cascade"];

fn parse_id(def: &EntityDef, id_str: &str) -> Result<Value, AppError> {
    let is_int = def.primary_column().map(|c| c.type_.is_integer()).unwrap_or(true);
    if is_int {
        let n: i64 = id_str.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
        Ok(Value::Number(n.into()))
    } else {
        Ok(Value::String(id_str.to_string()))
    }
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Query-string text to a JSON value of the column's type.
fn query_value_for_column(def: &EntityDef, col: &str, s: &str) -> Result<Value, AppError> {
    let Some(ty) = def.column(col).map(|c| c.type_) else {
        return Ok(Value::String(s.to_string()));
    };
    let bad = || AppError::BadRequest(format!("invalid value for {}: '{}'", col, s));
    Ok(match ty {
        t if t.is_integer() => Value::Number(s.parse::<i64>().map_err(|_| bad())?.into()),
        ColumnType::Float => {
            let f: f64 = s.parse().map_err(|_| bad())?;
            serde_json::Number::from_f64(f).map(Value::Number).ok_or_else(bad)?
        }
        ColumnType::Boolean => {
            if s.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if s.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                return Err(bad());
            }
        }
        _ => Value::String(s.to_string()),
    })
}

/// `col`, `col__gt`, `col__lt` and `col__in` (comma separated) query parameters.
fn filter_from_params(def: &EntityDef, params: &HashMap<String, String>) -> Result<Filter, AppError> {
    let mut filter = Filter::new();
    let mut keys: Vec<&String> = params
        .keys()
        .filter(|k| !RESERVED_PARAMS.contains(&k.as_str()))
        .collect();
    keys.sort();
    for key in keys {
        let raw = &params[key];
        let (col, op) = key.rsplit_once("__").unwrap_or((key.as_str(), "eq"));
        let condition = match op {
            "eq" => Condition::Eq(query_value_for_column(def, col, raw)?),
            "gt" => Condition::Gt(query_value_for_column(def, col, raw)?),
            "lt" => Condition::Lt(query_value_for_column(def, col, raw)?),
            "in" => Condition::In(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| query_value_for_column(def, col, s))
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(AppError::BadRequest(format!("unknown filter operator: {}", other))),
        };
        filter = filter.and(col, condition);
    }
    Ok(filter)
}

/// `include=a.b,c` as relation paths.
fn include_paths(params: &HashMap<String, String>) -> Vec<RelationPath> {
    params
        .get("include")
        .map(|s| {
            s.split(',')
                .map(RelationPath::parse)
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn flag(params: &HashMap<String, String>, name: &str) -> bool {
    params
        .get(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn paging(params: &HashMap<String, String>, name: &str) -> Result<Option<u32>, AppError> {
    params
        .get(name)
        .map(|v| v.parse().map_err(|_| AppError::BadRequest(format!("invalid {}", name))))
        .transpose()
}

async fn load(state: &AppState, entity: &str, id_str: &str) -> Result<Entity, AppError> {
    let def = state.session.entity(entity)?;
    let id = parse_id(&def, id_str)?;
    state
        .session
        .queries()
        .find_by_primary_key(entity, id, None)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", entity, id_str)))
}

pub async fn list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let def = state.session.entity(&entity)?;
    let mut query = FindQuery::new(&entity).filter(filter_from_params(&def, &params)?);
    let paths = include_paths(&params);
    for path in &paths {
        query = query.with(path.clone());
    }
    if let Some(n) = paging(&params, "limit")? {
        query = query.limit(n);
    }
    if let Some(n) = paging(&params, "offset")? {
        query = query.offset(n);
    }
    let live_at = flag(&params, "live").then(chrono::Utc::now);
    if let Some(at) = live_at {
        query = query.live_at(at);
    }
    let rows = state.session.queries().run(&query).await?;
    let meta = ReadMeta::included(&paths).live_at(live_at);
    Ok(success_many(rows.iter().map(Entity::to_json).collect(), meta))
}

pub async fn read(
    State(state): State<AppState>,
    Path((entity, id_str)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let mut found = load(&state, &entity, &id_str).await?;
    let paths = include_paths(&params);
    state
        .session
        .resolver()
        .resolve_all(std::slice::from_mut(&mut found), &paths)
        .await?;
    Ok(success_read(found.to_json(), ReadMeta::included(&paths)))
}

pub async fn create(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let def = state.session.entity(&entity)?;
    let mut record = Entity::with_values(def, body_to_map(body)?)?;
    state.session.writer().save(&mut record).await?;
    tracing::info!(entity = %entity, key = ?record.primary_key(), "created");
    Ok(success_one(record.to_json()))
}

pub async fn update(
    State(state): State<AppState>,
    Path((entity, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let mut record = load(&state, &entity, &id_str).await?;
    for (col, v) in body_to_map(body)? {
        record.set(&col, v)?;
    }
    state.session.writer().save(&mut record).await?;
    Ok(success_one_ok(record.to_json()))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((entity, id_str)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let record = load(&state, &entity, &id_str).await?;
    let policy = if flag(&params, "cascade") {
        DeletePolicy::Cascade
    } else {
        DeletePolicy::Restrict
    };
    state.session.writer().delete(&record, policy).await?;
    tracing::info!(entity = %entity, id = %id_str, ?policy, "deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn link_pair(
    state: &AppState,
    entity: &str,
    id_str: &str,
    relation: &str,
    target_id: &str,
) -> Result<(Entity, Entity), AppError> {
    let def = state.session.entity(entity)?;
    let target_entity = def.relation(relation)?.target.clone();
    let record = load(state, entity, id_str).await?;
    let target = load(state, &target_entity, target_id).await?;
    Ok((record, target))
}

pub async fn link(
    State(state): State<AppState>,
    Path((entity, id_str, relation, target_id)): Path<(String, String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let (mut record, target) = link_pair(&state, &entity, &id_str, &relation, &target_id).await?;
    state.session.writer().link(&mut record, &relation, &target).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unlink(
    State(state): State<AppState>,
    Path((entity, id_str, relation, target_id)): Path<(String, String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let (mut record, target) = link_pair(&state, &entity, &id_str, &relation, &target_id).await?;
    state.session.writer().unlink(&mut record, &relation, &target).await?;
    Ok(StatusCode::NO_CONTENT)
}
