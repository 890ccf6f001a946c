use axum::{middleware, Router};

use crate::auth::middleware::JwtSecret;
use crate::chat::{conversations, messages};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Conversation + messaging surface (JWT required — Claims extractor validates token)
    let conversation_routes = Router::new()
        .route(
            "/api/conversations",
            axum::routing::get(conversations::list_conversations),
        )
        .route(
            "/api/conversations",
            axum::routing::post(conversations::create_conversation),
        )
        .route(
            "/api/conversations/direct",
            axum::routing::post(conversations::direct_conversation),
        )
        .route(
            "/api/conversations/{id}",
            axum::routing::get(conversations::get_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            axum::routing::post(messages::send_message),
        )
        .route(
            "/api/conversations/{id}/participants",
            axum::routing::post(conversations::add_participant),
        )
        .route(
            "/api/conversations/{id}/leave",
            axum::routing::post(conversations::leave_conversation),
        )
        .route(
            "/api/sessions/{booking_id}/conversation",
            axum::routing::get(conversations::booking_conversation),
        );

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(conversation_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
