//! WebSocket connection handler
//!
//! Handles individual gateway connections: WebSocket handshake, request
//! parsing, forwarding to the room store, and pushing change feed events
//! back to the client.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, StoreError};
use crate::message::{ClientMessage, ClientRequest, ServerMessage};
use crate::server::StoreHandle;
use crate::store::RoomStore;
use crate::types::{ConnectionId, SubscriptionId};

/// Event forwarding tasks for one connection
type Forwarders = HashMap<SubscriptionId, JoinHandle<()>>;

/// Accept gateway connections forever
///
/// Each connection gets its own handler task sharing the one store.
pub async fn serve(listener: TcpListener, store: StoreHandle, outbound_buffer: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let store = store.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, store, outbound_buffer).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, serves store requests in arrival order,
/// and cancels the connection's subscriptions when it closes.
pub async fn handle_connection(
    stream: TcpStream,
    store: StoreHandle,
    outbound_buffer: usize,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} opened from {}", connection_id, peer_addr);

    // Send connection success message
    let connected_msg = ServerMessage::Connected {
        connection_id: connection_id.to_string(),
    };
    let json = serde_json::to_string(&connected_msg)?;
    ws_sender.send(Message::Text(json.into())).await?;

    // Channel for responses and change events -> client
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(outbound_buffer);

    // Spawn write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended");

        let _ = ws_sender.close().await;
    });
    let mut write_done = false;

    let mut forwarders = Forwarders::new();

    // Read loop (WebSocket -> RoomStore), until the peer or the writer goes away
    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                let Some(frame) = frame else {
                    break;
                };
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientRequest>(&text) {
                        Ok(request) => {
                            dispatch(&store, request, &msg_tx, &mut forwarders).await;
                        }
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", connection_id, e);
                            let _ = msg_tx.send(ServerMessage::invalid_message(e)).await;
                        }
                    },
                    Ok(Message::Close(_)) => {
                        debug!("Connection {} sent close frame", connection_id);
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                        // Pong replies are handled by tungstenite
                    }
                    Ok(_) => {
                        // Binary or other message types - ignore
                    }
                    Err(e) => {
                        error!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                }
            }
            _ = &mut write_task => {
                write_done = true;
                break;
            }
        }
    }

    // Leaving cancels every change feed this connection opened
    for (subscription_id, forwarder) in forwarders.drain() {
        forwarder.abort();
        let _ = store.unsubscribe(subscription_id).await;
    }

    drop(msg_tx);
    if !write_done {
        let _ = write_task.await;
    }

    info!("Connection {} closed", connection_id);

    Ok(())
}

/// Apply one request to the store and queue the response
async fn dispatch(
    store: &StoreHandle,
    request: ClientRequest,
    msg_tx: &mpsc::Sender<ServerMessage>,
    forwarders: &mut Forwarders,
) {
    let request_id = request.request_id;

    let response = match request.message {
        ClientMessage::CreateRoom {
            code,
            secret_code,
            name,
        } => store
            .create_room(code, secret_code, name)
            .await
            .map(|room| ServerMessage::Room { request_id, room }),
        ClientMessage::CreatePlayer {
            room_code,
            name,
            avatar_index,
        } => store
            .create_player(room_code, name, avatar_index)
            .await
            .map(|player| ServerMessage::Player { request_id, player }),
        ClientMessage::GetRoom { code } => store
            .get_room(code)
            .await
            .map(|room| ServerMessage::Room { request_id, room }),
        ClientMessage::ListPlayers { room_code } => store
            .list_players(room_code)
            .await
            .map(|players| ServerMessage::Players {
                request_id,
                players,
            }),
        ClientMessage::UpdatePlayerGuesses { player_id, guesses } => store
            .update_player_guesses(player_id, guesses)
            .await
            .map(|()| ServerMessage::Ack { request_id }),
        ClientMessage::SetRoomWinner {
            room_code,
            player_id,
        } => store
            .set_room_winner(room_code, player_id)
            .await
            .map(|room| ServerMessage::Room { request_id, room }),
        ClientMessage::DeletePlayer { player_id } => store
            .delete_player(player_id)
            .await
            .map(|()| ServerMessage::Ack { request_id }),
        ClientMessage::Subscribe { room_code } => {
            match store.subscribe_room_changes(room_code).await {
                Ok(mut subscription) => {
                    let subscription_id = subscription.id;

                    // The client must see `subscribed` before the first change
                    let _ = msg_tx
                        .send(ServerMessage::Subscribed {
                            request_id,
                            subscription_id,
                        })
                        .await;

                    let events_tx = msg_tx.clone();
                    let forwarder = tokio::spawn(async move {
                        while let Some(event) = subscription.recv().await {
                            let change = ServerMessage::Change {
                                subscription_id,
                                event,
                            };
                            if events_tx.send(change).await.is_err() {
                                break;
                            }
                        }
                        debug!("Forwarder for {} ended", subscription_id);
                    });
                    forwarders.insert(subscription_id, forwarder);
                    return;
                }
                Err(e) => Err(e),
            }
        }
        ClientMessage::Unsubscribe { subscription_id } => {
            // Only feeds opened on this connection can be cancelled from it
            match forwarders.remove(&subscription_id) {
                Some(forwarder) => {
                    forwarder.abort();
                    store
                        .unsubscribe(subscription_id)
                        .await
                        .map(|()| ServerMessage::Ack { request_id })
                }
                None => Err(StoreError::NotFound(format!(
                    "subscription {}",
                    subscription_id
                ))),
            }
        }
    };

    let msg = response.unwrap_or_else(|e| ServerMessage::from_store_error(request_id, e));
    let _ = msg_tx.send(msg).await;
}
