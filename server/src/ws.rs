use crate::fanout::FanoutHub;
use crate::model::{WsEvent, WsRequest};
use crate::rest::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::debug;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<FanoutHub>) {
    let (id, mut events) = hub.add_subscriber();
    let (mut sink, mut stream) = socket.split();

    // Outbound: drain the hub queue into the socket.
    let send_task = tokio::spawn(async move {
        while let Some(message) = events.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Inbound: heartbeat probes get a direct pong; anything else is ignored.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<WsRequest>(&text) {
                Ok(WsRequest::Ping) => hub.send_to(id, &WsEvent::Pong),
                Err(e) => debug!("Ignoring unrecognized client message: {}", e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    hub.remove_subscriber(id);
    send_task.abort();
}
