use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// Auth reuses the HTTP JWT, carried as ?token= on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Close code sent when the upgrade carries no valid identity.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. If no identity can be resolved from the
/// upgrade request, the connection is closed with a policy-violation code
/// and never registered. On success, spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = params
        .token
        .as_deref()
        .map(|token| jwt::validate_access_token(&state.jwt_secret, token));

    match claims {
        Some(Ok(claims)) => {
            tracing::info!(user_id = %claims.sub, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, claims.sub))
        }
        _ => {
            tracing::warn!("WebSocket upgrade rejected: no valid identity");

            // Upgrade the connection, then immediately close with the policy code
            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: CLOSE_POLICY_VIOLATION,
                    reason: "Authentication required".into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}
