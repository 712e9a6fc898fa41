use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AppError;
use crate::middleware::{auth::authenticate, AuthUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: String,
}

/// GET /ws?token=...
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Result<Response, AppError> {
    let user = authenticate(&state.auth.secret, &params.token)
        .map_err(|_| AppError::AuthenticationError("invalid or missing token".to_string()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: AuthUser) {
    let (session, mut mailbox) = state.hub.connect(user.user_id, user.open_id.clone());
    info!(user_id = %user.user_id, session_id = session.id(), "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    // Writer: drain the mailbox until the hub closes it
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = mailbox.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: only signaling frames are meaningful inbound
    let reader = async {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => {
                    let outcome = state.hub.relay_signal(&session, text.as_str());
                    debug!(user_id = %user.user_id, ?outcome, "Inbound frame handled");
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = reader => {}
        _ = &mut writer => {}
    }

    state.hub.unregister(&session);
    writer.abort();
    info!(user_id = %user.user_id, session_id = session.id(), "WebSocket disconnected");
}
