//! Transport layer for the real-time channel.
//!
//! Admission happens after the upgrade so a rejected client still gets a
//! close frame with a distinguishable code instead of a failed handshake.

use std::borrow::Cow;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::queue::socket::{ActiveSockets, WebSocketMessage};
use crate::util::extract::{Extension, Query, WebSocketUpgrade};

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub token: String,
}

pub async fn ws_init(
    Query(query): Query<WsQuery>,
    Extension(sockets): Extension<Arc<ActiveSockets>>,
    WebSocketUpgrade(ws): WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| accept_socket(socket, query, sockets))
}

async fn accept_socket(mut socket: WebSocket, query: WsQuery, sockets: Arc<ActiveSockets>) {
    let (sender, mut outbound) = mpsc::unbounded_channel();

    let connection = match sockets.connect(&query.user_id, &query.token, sender).await {
        Ok(connection) => connection,
        Err(error) => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: error.close_code(),
                    reason: Cow::from(error.to_string()),
                })))
                .await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    // Drains the registry's outbound queue into the socket. When the sink
    // dies this task ends, the channel closes, and the next registry send
    // to this connection fails, which evicts it.
    let mut write_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match message {
                WebSocketMessage::Text(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                WebSocketMessage::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Inbound frames are processed in arrival order by this single loop.
    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        sockets.handle_message(connection.id, &text);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Protocol-level pings are answered by axum itself.
                    Some(Ok(_)) => {}
                }
            }
            _ = &mut write_task => break,
        }
    }

    sockets.disconnect(connection.id);
    write_task.abort();
}
