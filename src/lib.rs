pub mod appresult;
pub mod commands;
pub mod config;
pub mod db;
pub mod directory;
pub mod export;
pub mod model;
pub mod reconcile;
pub mod render;
pub mod res;
pub mod telegram;
pub mod token;
pub mod web;

use std::sync::Arc;

use axum::extract::FromRef;
use serde_json::Value;

pub use appresult::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: db::Store,
    pub config: Arc<config::Config>,
}

#[derive(Debug, thiserror::Error)]
#[error("expected {field} in {context}")]
pub struct MissingField {
    field: String,
    context: String,
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> Result<String, MissingField>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> Result<String, MissingField> {
        self.get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| MissingField {
                field: field.to_owned(),
                context: self.to_string(),
            })
    }
}
