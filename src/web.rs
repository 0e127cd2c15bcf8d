use std::sync::Arc;

use axum::{Json, Router, debug_handler, extract::State, http::Method, routing::get};
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    AppResult, AppState,
    config::Config,
    db::Store,
    export::{DirectoryDocument, build_document},
};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/directory.json", get(directory_json))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

#[debug_handler(state = AppState)]
async fn directory_json(
    State(store): State<Store>,
    State(config): State<Arc<Config>>,
) -> AppResult<Json<DirectoryDocument>> {
    let profiles = store.list_consented().await?;
    Ok(Json(build_document(
        &profiles,
        &config.viewer_base_url,
        OffsetDateTime::now_utc(),
    )))
}

async fn health() -> &'static str {
    "ok"
}
