//! `{data, meta}` envelopes. `meta` reports what a read loaded beyond the rows themselves.

use crate::resolver::RelationPath;
use axum::{http::StatusCode, Json};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ReadMeta>,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: ReadMeta,
}

#[derive(Debug, Default, Serialize)]
pub struct ReadMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Relation paths resolved onto `data`, as `a.b` strings.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    /// Instant expired rows were filtered against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_at: Option<String>,
}

impl ReadMeta {
    pub fn included(paths: &[RelationPath]) -> Self {
        ReadMeta {
            include: paths.iter().map(ToString::to_string).collect(),
            ..ReadMeta::default()
        }
    }

    pub fn live_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.live_at = at.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));
        self
    }

    fn is_empty(&self) -> bool {
        self.count.is_none() && self.include.is_empty() && self.live_at.is_none()
    }
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data, meta: None }))
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data, meta: None }))
}

/// A single read; `meta` is omitted when nothing was included.
pub fn success_read<T: Serialize>(data: T, meta: ReadMeta) -> (StatusCode, Json<SuccessOne<T>>) {
    let meta = (!meta.is_empty()).then_some(meta);
    (StatusCode::OK, Json(SuccessOne { data, meta }))
}

pub fn success_many<T: Serialize>(data: Vec<T>, meta: ReadMeta) -> (StatusCode, Json<SuccessMany<T>>) {
    let count = data.len() as u64;
    (
        StatusCode::OK,
        Json(SuccessMany {
            data,
            meta: ReadMeta {
                count: Some(count),
                ..meta
            },
        }),
    )
}
