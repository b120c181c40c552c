//! Remote room store client
//!
//! Implements `RoomStore` over the gateway's WebSocket protocol. A writer
//! task serializes requests; a reader task matches responses to waiting
//! callers by request id and routes change events to their subscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::code::SecretCode;
use crate::error::{AppError, StoreError};
use crate::message::{ClientMessage, ClientRequest, ServerMessage};
use crate::room::{Player, Room};
use crate::scoring::GuessResult;
use crate::store::{ChangeEvent, RoomStore, Subscription};
use crate::types::{PlayerId, RoomCode, SubscriptionId};

/// Successful response payloads
#[derive(Debug)]
enum Reply {
    Room(Room),
    Player(Player),
    Players(Vec<Player>),
    Ack,
    Subscribed(SubscriptionId, mpsc::UnboundedReceiver<ChangeEvent>),
}

type Pending = HashMap<u64, oneshot::Sender<Result<Reply, StoreError>>>;
type Feeds = HashMap<SubscriptionId, mpsc::UnboundedSender<ChangeEvent>>;

/// State shared between callers and the reader task
#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
    feeds: Mutex<Feeds>,
    /// Set by the reader before it fails the pending requests
    closed: AtomicBool,
}

/// Room store reached through a gateway WebSocket
pub struct RemoteStore {
    outbound: mpsc::Sender<ClientRequest>,
    shared: Arc<Shared>,
    next_request: AtomicU64,
    reader: JoinHandle<()>,
}

impl RemoteStore {
    /// Connect to a gateway, e.g. `ws://127.0.0.1:8080`
    pub async fn connect(url: &str, outbound_buffer: usize) -> Result<Self, AppError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        info!("Connected to room store at {}", url);

        let (outbound, mut outbound_rx) = mpsc::channel::<ClientRequest>(outbound_buffer);
        let shared = Arc::new(Shared::default());

        // Writer: requests -> WebSocket; ends when the store handle is dropped
        tokio::spawn(async move {
            while let Some(request) = outbound_rx.recv().await {
                match serde_json::to_string(&request) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket send failed, ending writer");
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize request: {}", e),
                }
            }
            let _ = ws_sender.close().await;
        });

        // Reader: WebSocket -> waiting callers and subscriptions
        let reader_shared = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => route(&reader_shared, msg).await,
                        Err(e) => warn!("Invalid frame from store: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        error!("WebSocket error from store: {}", e);
                        break;
                    }
                }
            }

            // Fail everything still waiting and close every feed
            reader_shared.closed.store(true, Ordering::SeqCst);
            reader_shared.pending.lock().await.clear();
            reader_shared.feeds.lock().await.clear();
            info!("Disconnected from room store");
        });

        Ok(Self {
            outbound,
            shared,
            next_request: AtomicU64::new(1),
            reader,
        })
    }

    /// Send one request and wait for its response
    async fn request(&self, message: ClientMessage) -> Result<Reply, StoreError> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(request_id, tx);

        // Registered after the reader gave up: nobody will answer
        if self.shared.closed.load(Ordering::SeqCst) {
            self.shared.pending.lock().await.remove(&request_id);
            return Err(disconnected());
        }

        if self
            .outbound
            .send(ClientRequest {
                request_id,
                message,
            })
            .await
            .is_err()
        {
            self.shared.pending.lock().await.remove(&request_id);
            return Err(disconnected());
        }

        rx.await.map_err(|_| disconnected())?
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn disconnected() -> StoreError {
    StoreError::Connectivity("disconnected from room store".to_string())
}

fn unexpected(reply: Reply) -> StoreError {
    StoreError::Connectivity(format!("unexpected response from room store: {:?}", reply))
}

/// Deliver one server frame to whoever is waiting for it
async fn route(shared: &Shared, msg: ServerMessage) {
    let Some(request_id) = msg.request_id() else {
        match msg {
            ServerMessage::Connected { connection_id } => {
                debug!("Store connection id {}", connection_id);
            }
            ServerMessage::Change {
                subscription_id,
                event,
            } => {
                let mut feeds = shared.feeds.lock().await;
                let delivered = feeds
                    .get(&subscription_id)
                    .is_some_and(|feed| feed.send(event).is_ok());
                if !delivered {
                    feeds.remove(&subscription_id);
                }
            }
            ServerMessage::Error { code, message, .. } => {
                warn!("Store reported {:?}: {}", code, message);
            }
            _ => {}
        }
        return;
    };

    let result = match msg {
        ServerMessage::Room { room, .. } => Ok(Reply::Room(room)),
        ServerMessage::Player { player, .. } => Ok(Reply::Player(player)),
        ServerMessage::Players { players, .. } => Ok(Reply::Players(players)),
        ServerMessage::Ack { .. } => Ok(Reply::Ack),
        ServerMessage::Subscribed {
            subscription_id, ..
        } => {
            // Register before replying so no change frame can miss the feed
            let (tx, rx) = mpsc::unbounded_channel();
            shared.feeds.lock().await.insert(subscription_id, tx);
            Ok(Reply::Subscribed(subscription_id, rx))
        }
        ServerMessage::Error { code, message, .. } => Err(StoreError::from((code, message))),
        ServerMessage::Connected { .. } | ServerMessage::Change { .. } => return,
    };

    match shared.pending.lock().await.remove(&request_id) {
        Some(waiter) => {
            let _ = waiter.send(result);
        }
        None => debug!("Response for unknown request {}", request_id),
    }
}

#[async_trait]
impl RoomStore for RemoteStore {
    async fn create_room(
        &self,
        code: RoomCode,
        secret: SecretCode,
        name: String,
    ) -> Result<Room, StoreError> {
        match self
            .request(ClientMessage::CreateRoom {
                code,
                secret_code: secret,
                name,
            })
            .await?
        {
            Reply::Room(room) => Ok(room),
            other => Err(unexpected(other)),
        }
    }

    async fn create_player(
        &self,
        room_code: RoomCode,
        name: String,
        avatar_index: u8,
    ) -> Result<Player, StoreError> {
        match self
            .request(ClientMessage::CreatePlayer {
                room_code,
                name,
                avatar_index,
            })
            .await?
        {
            Reply::Player(player) => Ok(player),
            other => Err(unexpected(other)),
        }
    }

    async fn get_room(&self, code: RoomCode) -> Result<Room, StoreError> {
        match self.request(ClientMessage::GetRoom { code }).await? {
            Reply::Room(room) => Ok(room),
            other => Err(unexpected(other)),
        }
    }

    async fn list_players(&self, room_code: RoomCode) -> Result<Vec<Player>, StoreError> {
        match self.request(ClientMessage::ListPlayers { room_code }).await? {
            Reply::Players(players) => Ok(players),
            other => Err(unexpected(other)),
        }
    }

    async fn update_player_guesses(
        &self,
        player_id: PlayerId,
        guesses: Vec<GuessResult>,
    ) -> Result<(), StoreError> {
        match self
            .request(ClientMessage::UpdatePlayerGuesses { player_id, guesses })
            .await?
        {
            Reply::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn set_room_winner(
        &self,
        room_code: RoomCode,
        player_id: PlayerId,
    ) -> Result<Room, StoreError> {
        match self
            .request(ClientMessage::SetRoomWinner {
                room_code,
                player_id,
            })
            .await?
        {
            Reply::Room(room) => Ok(room),
            other => Err(unexpected(other)),
        }
    }

    async fn delete_player(&self, player_id: PlayerId) -> Result<(), StoreError> {
        match self.request(ClientMessage::DeletePlayer { player_id }).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn subscribe_room_changes(
        &self,
        room_code: RoomCode,
    ) -> Result<Subscription, StoreError> {
        match self
            .request(ClientMessage::Subscribe {
                room_code: room_code.clone(),
            })
            .await?
        {
            Reply::Subscribed(id, events) => Ok(Subscription {
                id,
                room_code,
                events,
            }),
            other => Err(unexpected(other)),
        }
    }

    async fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<(), StoreError> {
        self.shared.feeds.lock().await.remove(&subscription_id);
        match self
            .request(ClientMessage::Unsubscribe { subscription_id })
            .await?
        {
            Reply::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
