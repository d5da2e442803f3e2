// Generic entity routes - one router serves every registered entity

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::Value;

use crate::{
    app_state::AppState,
    error::AppError,
    http::middleware::{request_context_middleware, Ctx},
    store::{Document, Filter},
};

pub async fn find_handler(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ctx: Ctx,
) -> Result<Json<Vec<Document>>, AppError> {
    let filter: Filter = params.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    let docs = state.service.find(&entity, &filter, &ctx).await?;
    Ok(Json(docs))
}

pub async fn create_handler(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    ctx: Ctx,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let ctx = ctx.0.with_body(body.clone());
    let doc = state.service.create(&entity, &body, &ctx).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    ctx: Ctx,
) -> Result<Json<Document>, AppError> {
    let doc = state.service.get(&entity, &id, &ctx).await?;
    Ok(Json(doc))
}

pub async fn update_handler(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    ctx: Ctx,
    Json(body): Json<Value>,
) -> Result<Json<Document>, AppError> {
    let ctx = ctx.0.with_body(body.clone());
    let doc = state.service.update(&entity, &id, &body, &ctx).await?;
    Ok(Json(doc))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    ctx: Ctx,
) -> Result<Json<Document>, AppError> {
    let doc = state.service.delete(&entity, &id, &ctx).await?;
    Ok(Json(doc))
}

pub fn create_entity_router(state: AppState) -> Router {
    Router::new()
        .route("/{entity}", get(find_handler).post(create_handler))
        .route(
            "/{entity}/{id}",
            get(get_handler).patch(update_handler).delete(delete_handler),
        )
        .layer(middleware::from_fn(request_context_middleware))
        .with_state(state)
}
