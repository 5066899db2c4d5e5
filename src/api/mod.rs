// REST API endpoints for the user-context gateway

mod error;

pub use error::ApiError;

use axum::{
    Router,
    extract::State,
    middleware,
    response::Json,
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{AuthenticatedUser, TokenVerifier, optional_auth, require_auth};
use crate::db::UserContextStore;

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub user_contexts: UserContextStore,
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/users/context",
            get(get_user_context).post(create_user_context),
        )
        .route_layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            require_auth,
        ));

    let public = Router::new()
        .route("/", get(root))
        .route_layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            optional_auth,
        ))
        .route("/health", get(health_check));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn root(user: Option<AuthenticatedUser>) -> Json<Value> {
    let mut body = json!({
        "message": "Welcome to Chidi API",
        "docs": "/docs",
        "version": env!("CARGO_PKG_VERSION"),
    });
    if let Some(user) = user {
        body["user_id"] = json!(user.user_id());
    }
    Json(body)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "API is running",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_user_context(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let (record, created) = state.user_contexts.get_or_create(user.user_id()).await?;

    let message = if created {
        info!(user_id = %user.user_id(), "Initialized user context");
        "User context created successfully"
    } else {
        "User context retrieved successfully"
    };

    Ok(Json(json!({
        "message": message,
        "user_context": record,
        "created": created,
    })))
}

async fn get_user_context(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .user_contexts
        .get(user.user_id())
        .await?
        .ok_or_else(|| ApiError::NotFound("User context not found".to_string()))?;

    Ok(Json(json!(record)))
}
