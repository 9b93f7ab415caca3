//! WebSocket entrypoint and connection handler.
//!
//! Upgrades HTTP to WS and runs the per-connection read/write loops.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use locshare_core::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::server::GatewayState;
use crate::ws_protocol::{ClientEvent, ServerEvent};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: GatewayState) {
    let connection = ConnectionId::new();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    state.broadcaster.register(connection, tx.clone()).await;
    info!(connection = %connection, "WebSocket connection opened");

    // Forward queued events to the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, "failed to encode server event");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Decode frames and hand them to the protocol handler.
    let handler = state.handler.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => handler.handle(connection, event).await,
                    Err(e) => {
                        warn!(connection = %connection, error = %e, "invalid client frame");
                        let _ = tx.send(ServerEvent::Error {
                            message: format!("invalid message: {e}"),
                        });
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // If either task exits, abort the other.
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.handler.disconnect(connection).await;
    state.broadcaster.unregister(connection).await;
    debug!(connection = %connection, "connection state released");
    info!(connection = %connection, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

    use super::*;
    use crate::server::build_router;

    async fn next_event<S>(ws: &mut S) -> Value
    where
        S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed")
                .expect("socket error");
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn socket_round_trip_and_cleanup_on_close() {
        let state = GatewayState::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(state.clone(), None);
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        ws.send(WsMessage::Text("not json".into())).await.unwrap();
        let event = next_event(&mut ws).await;
        assert_eq!(event["event"], "error");
        assert!(event["data"]["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid message"));

        ws.send(WsMessage::Text(r#"{"event":"create-session"}"#.into()))
            .await
            .unwrap();
        let event = next_event(&mut ws).await;
        assert_eq!(event["event"], "session-created");
        let token = event["data"]["sessionId"].as_str().unwrap().to_string();

        ws.send(WsMessage::Text(r#"{"event":"ping"}"#.into()))
            .await
            .unwrap();
        assert_eq!(next_event(&mut ws).await["event"], "pong");

        ws.close(None).await.unwrap();

        let mut released = false;
        for _ in 0..200 {
            let unbound = state.relay.lock().await.connections.is_empty();
            if unbound && state.broadcaster.connection_count().await == 0 {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(released, "connection state was not released after close");

        // The sharer left, but the session waits for a reconnect.
        let relay = state.relay.lock().await;
        let session = relay.sessions.get(&token).unwrap();
        assert_eq!(session.sharer_connection, None);
        drop(relay);

        server.abort();
    }
}
