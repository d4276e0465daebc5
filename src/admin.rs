/// Administrative HTTP surface: client registry CRUD, mounted outside the
/// rate-limit layer.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::ratelimiter::RateLimiterStore;
use crate::storage::ClientRecord;

pub fn router(store: Arc<RateLimiterStore>) -> Router {
    Router::new()
        .route("/clients", get(list_clients).post(add_client))
        .route("/clients/:id", delete(delete_client))
        .with_state(store)
}

async fn list_clients(State(store): State<Arc<RateLimiterStore>>) -> Response {
    match store.list_clients().await {
        Ok(clients) => Json(clients).into_response(),
        Err(e) => internal_error(&e),
    }
}

async fn add_client(
    State(store): State<Arc<RateLimiterStore>>,
    Json(record): Json<ClientRecord>,
) -> Response {
    match store.add_client(record).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => internal_error(&e),
    }
}

async fn delete_client(
    State(store): State<Arc<RateLimiterStore>>,
    Path(id): Path<String>,
) -> Response {
    match store.delete_client(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(&e),
    }
}

fn internal_error(e: &crate::storage::RepoError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "code": 500, "message": e.to_string() })),
    )
        .into_response()
}
