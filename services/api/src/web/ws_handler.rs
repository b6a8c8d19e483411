//! services/api/src/web/ws_handler.rs
//!
//! This is the entry point and control loop for a document's chat WebSocket.
//! Every socket on a document joins the same `ChatRoom`; room frames and frames
//! meant for this socket alone are written by a dedicated writer task.

use crate::web::{
    chat_room::ChatRoom,
    protocol::{decode_image, ClientMessage, ServerMessage},
    rest::port_error,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Upgrades `GET /documents/{id}/chat` to the chat WebSocket.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    app_state
        .registry
        .get_document(document_id)
        .await
        .map_err(|e| port_error("Fetching document", e))?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, document_id)))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, document_id: Uuid) {
    info!("Chat connection opened for document {}", document_id);

    let (mut sender, mut receiver) = socket.split();
    let (direct, mut outgoing) = mpsc::unbounded_channel::<ServerMessage>();
    let (room, mut shared) = app_state.join_chat(document_id).await;
    let _ = direct.send(room.history().await);
    let token = CancellationToken::new();

    // --- 1. Writer Task ---
    let writer = {
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = token.cancelled() => break,
                    frame = outgoing.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                    frame = shared.recv() => match frame {
                        Ok(frame) => frame,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Chat socket fell behind; {} frame(s) skipped", skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize server frame: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    warn!("Failed to write to the chat socket; closing writer.");
                    break;
                }
            }
        })
    };

    // --- 2. Main Message Loop ---
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(text.as_str(), &room, &direct).await;
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("Chat socket error: {}", e);
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    // The writer owns this socket's receiver; it must be gone before leaving the room.
    token.cancel();
    let _ = writer.await;
    app_state.leave_chat(&room).await;
    info!("Chat connection closed for document {}", document_id);
}

/// Helper function to handle the logic for different `ClientMessage` variants.
/// Rejections go to this socket only; everything else reaches the whole room.
async fn handle_text_message(
    text: &str,
    room: &ChatRoom,
    direct: &mpsc::UnboundedSender<ServerMessage>,
) {
    let reject = |message: &str| {
        let _ = direct.send(ServerMessage::Error {
            message: message.to_string(),
        });
    };

    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Send { prompt, image }) => {
            if prompt.trim().is_empty() && image.is_none() {
                reject("Prompt is empty.");
                return;
            }
            let image_bytes = match image.as_deref().map(decode_image).transpose() {
                Ok(bytes) => bytes,
                Err(e) => {
                    reject(&format!("Attached image is not valid base64: {}", e));
                    return;
                }
            };
            if !room.start_turn(prompt, image_bytes).await {
                reject("A response is still streaming; wait for it to finish.");
            }
        }
        Ok(ClientMessage::Clear) => room.clear().await,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            reject("Unrecognized message.");
        }
    }
}
