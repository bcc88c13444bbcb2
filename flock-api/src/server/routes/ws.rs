use crate::{
    server::{ServerError, ServerRouter},
    service::presence::{ConnectedPayload, PresenceConnection, PresenceRegistry, ServerEvent},
};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use axum_extra::routing::{RouterExt, TypedPath};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(connect)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/ws", rejection(ServerError))]
struct WsPath();

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
struct Handshake {
    token: Option<String>,
}

async fn connect(
    WsPath(): WsPath,
    State(presence): State<Arc<PresenceRegistry>>,
    Query(handshake): Query<Handshake>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| serve(socket, presence, handshake.token))
}

async fn serve(mut socket: WebSocket, presence: Arc<PresenceRegistry>, token: Option<String>) {
    let connection = match presence.connect(token.as_deref()).await {
        Ok(connection) => connection,
        Err(err) => {
            debug!(error = %err, "Closing unauthenticated socket");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let tag = connection.tag();
    let greeting = ServerEvent::Connected(ConnectedPayload {
        user_id: tag.user_id,
    });
    if send_event(&mut socket, &greeting).await {
        relay(socket, connection).await;
    }
    presence.disconnect(tag).await;
}

/// `false` once the socket is gone.
async fn send_event<S>(sink: &mut S, event: &ServerEvent) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(frame) => sink.send(Message::Text(frame.into())).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "Could not serialize event");
            true
        }
    }
}

/// Forwards pushed events until either side goes away.
async fn relay(socket: WebSocket, mut connection: PresenceConnection) {
    let (mut sender, mut incoming) = socket.split();

    loop {
        tokio::select! {
            event = connection.next_event() => {
                let Some(event) = event else {
                    debug!(user_id = %connection.tag().user_id, "Connection superseded");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };

                if !send_event(&mut sender, &event).await {
                    break;
                }
            }
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
