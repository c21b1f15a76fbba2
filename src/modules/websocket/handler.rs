/// WebSocket HTTP handler
///
/// Upgrades an authenticated request, registers the connection for the
/// caller and runs its read loop until the peer leaves or goes silent.
/// Outbound messages never pass through this loop: the notifier writes to
/// the registered connection directly.
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{Error, HttpRequest, HttpResponse, web};
use actix_ws::{Message, MessageStream};

use super::connection::{Connection, WsConnection};
use super::message::{ClientMessage, ServerMessage};
use super::registry::ConnectionRegistry;
use crate::api::error;
use crate::middlewares::get_claims;
use crate::ENV;
use crate::modules::message::{
    handle::MessageSvc, repository::MessageRepository, service::MessageService,
};

/// Endpoint: GET /ws
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    registry: web::Data<ConnectionRegistry>,
    message_service: web::Data<MessageSvc>,
) -> Result<HttpResponse, Error> {
    let user_id = get_claims(&req)?.sub;
    tracing::debug!("WebSocket upgrade request from user {} ({:?})", user_id, req.peer_addr());

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;
    let msg_stream = msg_stream.max_frame_size(ENV.ws_max_frame_size);

    let connection = Arc::new(WsConnection::new(session));
    if let Some(previous) =
        registry.register(user_id, connection.clone()).await.map_err(error::Error::from)?
    {
        tracing::debug!("Connection {} for user {} superseded", previous.id(), user_id);
    }

    actix_web::rt::spawn(run_connection(
        user_id,
        connection,
        msg_stream,
        registry.get_ref().clone(),
        message_service,
    ));

    Ok(response)
}

async fn run_connection(
    user_id: i64,
    connection: Arc<WsConnection>,
    mut msg_stream: MessageStream,
    registry: ConnectionRegistry,
    message_service: web::Data<MessageSvc>,
) {
    let client_timeout = Duration::from_secs(ENV.ws_client_timeout_secs);
    let mut heartbeat = tokio::time::interval(Duration::from_secs(ENV.ws_heartbeat_secs));
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            msg = msg_stream.recv() => {
                last_seen = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(user_id, &text, &*connection, message_service.get_ref())
                            .await;
                    }

                    Some(Ok(Message::Ping(data))) => {
                        if connection.pong(&data).await.is_err() {
                            break;
                        }
                    }

                    Some(Ok(Message::Pong(_))) => {}

                    Some(Ok(Message::Close(reason))) => {
                        tracing::debug!("User {} sent close frame: {:?}", user_id, reason);
                        break;
                    }

                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!("Binary frame from user {} ignored", user_id);
                    }

                    Some(Ok(Message::Continuation(_) | Message::Nop)) => {}

                    Some(Err(e)) => {
                        tracing::warn!("WebSocket protocol error for user {}: {}", user_id, e);
                        break;
                    }

                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > client_timeout {
                    tracing::info!("User {} timed out after {:?} of silence", user_id, client_timeout);
                    break;
                }
                if connection.ping().await.is_err() {
                    break;
                }
            }
        }
    }

    if let Err(e) = registry.remove_connection(user_id, connection.id()).await {
        tracing::error!("Failed to unregister user {}: {}", user_id, e);
    }
    connection.close().await;
}

/// Answers one text frame: `ping` gets `pong`, acks update the stored
/// status and only failures are answered.
async fn handle_client_frame<M>(
    user_id: i64,
    text: &str,
    connection: &dyn Connection,
    message_service: &MessageService<M>,
) where
    M: MessageRepository + Send + Sync,
{
    let reply = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => Some(ServerMessage::Pong),

        Ok(ClientMessage::Delivered { message_id }) => {
            message_service.mark_as_delivered(message_id).await.err().map(ack_error)
        }

        Ok(ClientMessage::Read { message_id }) => {
            message_service.mark_as_read(message_id, user_id).await.err().map(ack_error)
        }

        Err(e) => {
            tracing::debug!("Unparseable frame from user {}: {}", user_id, e);
            Some(ServerMessage::error("Invalid message format"))
        }
    };

    if let Some(frame) = reply {
        if let Err(e) = connection.send(&frame).await {
            tracing::debug!("Reply to user {} dropped: {}", user_id, e);
        }
    }
}

fn ack_error(e: error::SystemError) -> ServerMessage {
    match e {
        error::SystemError::NotFound(resource) => {
            ServerMessage::error(format!("{resource} not found"))
        }
        other => {
            tracing::error!("Acknowledgement failed: {}", other);
            ServerMessage::error("Failed to update message status")
        }
    }
}
