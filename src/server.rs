//! RoomStore Actor implementation
//!
//! The central actor that owns all shared game state: rooms, players and
//! change feed subscribers. Uses the Actor pattern with mpsc channels for
//! message passing; every command carries a oneshot channel for its reply.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::code::SecretCode;
use crate::error::StoreError;
use crate::room::{Player, Room};
use crate::scoring::GuessResult;
use crate::store::{ChangeEvent, RoomStore, Subscription};
use crate::subscriber::Subscriber;
use crate::types::{PlayerId, RoomCode, SubscriptionId};

/// Reply channel carried by each command
type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

/// Commands sent from store handles to the StoreServer actor
#[derive(Debug)]
pub enum StoreCommand {
    CreateRoom {
        code: RoomCode,
        secret: SecretCode,
        name: String,
        reply: Reply<Room>,
    },
    CreatePlayer {
        room_code: RoomCode,
        name: String,
        avatar_index: u8,
        reply: Reply<Player>,
    },
    GetRoom {
        code: RoomCode,
        reply: Reply<Room>,
    },
    ListPlayers {
        room_code: RoomCode,
        reply: Reply<Vec<Player>>,
    },
    UpdatePlayerGuesses {
        player_id: PlayerId,
        guesses: Vec<GuessResult>,
        reply: Reply<()>,
    },
    SetRoomWinner {
        room_code: RoomCode,
        player_id: PlayerId,
        reply: Reply<Room>,
    },
    DeletePlayer {
        player_id: PlayerId,
        reply: Reply<()>,
    },
    Subscribe {
        room_code: RoomCode,
        reply: Reply<Subscription>,
    },
    Unsubscribe {
        subscription_id: SubscriptionId,
        reply: Reply<()>,
    },
}

/// The room store actor
///
/// Manages all state and processes commands from store handles.
/// Players are kept per room in insertion order, which is join order.
pub struct StoreServer {
    /// All rooms: RoomCode -> Room
    rooms: HashMap<RoomCode, Room>,
    /// All players: PlayerId -> Player
    players: HashMap<PlayerId, Player>,
    /// Room membership in join order: RoomCode -> [PlayerId]
    room_players: HashMap<RoomCode, Vec<PlayerId>>,
    /// Change feed subscribers, in subscription order
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    next_subscription: u64,
    /// Command receiver channel
    receiver: mpsc::Receiver<StoreCommand>,
}

impl StoreServer {
    /// Create a new StoreServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<StoreCommand>) -> Self {
        Self {
            rooms: HashMap::new(),
            players: HashMap::new(),
            room_players: HashMap::new(),
            subscribers: BTreeMap::new(),
            next_subscription: 1,
            receiver,
        }
    }

    /// Start the actor on the current runtime and return a handle to it
    pub fn spawn(buffer: usize) -> StoreHandle {
        let (tx, rx) = mpsc::channel(buffer);
        tokio::spawn(StoreServer::new(rx).run());
        StoreHandle::new(tx)
    }

    /// Run the StoreServer event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("RoomStore started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("RoomStore shutting down");
    }

    /// Process a single command
    ///
    /// A dropped reply receiver only means the caller stopped waiting.
    fn handle_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::CreateRoom {
                code,
                secret,
                name,
                reply,
            } => {
                let _ = reply.send(self.handle_create_room(code, secret, name));
            }
            StoreCommand::CreatePlayer {
                room_code,
                name,
                avatar_index,
                reply,
            } => {
                let _ = reply.send(self.handle_create_player(room_code, name, avatar_index));
            }
            StoreCommand::GetRoom { code, reply } => {
                let _ = reply.send(self.handle_get_room(&code));
            }
            StoreCommand::ListPlayers { room_code, reply } => {
                let _ = reply.send(self.handle_list_players(&room_code));
            }
            StoreCommand::UpdatePlayerGuesses {
                player_id,
                guesses,
                reply,
            } => {
                let _ = reply.send(self.handle_update_guesses(player_id, guesses));
            }
            StoreCommand::SetRoomWinner {
                room_code,
                player_id,
                reply,
            } => {
                let _ = reply.send(self.handle_set_winner(&room_code, player_id));
            }
            StoreCommand::DeletePlayer { player_id, reply } => {
                let _ = reply.send(self.handle_delete_player(player_id));
            }
            StoreCommand::Subscribe { room_code, reply } => {
                let _ = reply.send(self.handle_subscribe(room_code));
            }
            StoreCommand::Unsubscribe {
                subscription_id,
                reply,
            } => {
                self.handle_unsubscribe(subscription_id);
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Handle room creation
    fn handle_create_room(
        &mut self,
        code: RoomCode,
        secret: SecretCode,
        name: String,
    ) -> Result<Room, StoreError> {
        if self.rooms.contains_key(&code) {
            warn!("Room code {} already in use", code);
            return Err(StoreError::DuplicateCode(code));
        }

        let room = Room::new(code.clone(), secret, name);
        self.rooms.insert(code.clone(), room.clone());
        self.room_players.insert(code.clone(), Vec::new());

        info!("Room {} created ('{}')", code, room.display_name);
        debug!(
            "Total rooms: {}, Total players: {}",
            self.rooms.len(),
            self.players.len()
        );

        Ok(room)
    }

    /// Handle a player joining a room
    fn handle_create_player(
        &mut self,
        room_code: RoomCode,
        name: String,
        avatar_index: u8,
    ) -> Result<Player, StoreError> {
        let Some(members) = self.room_players.get_mut(&room_code) else {
            return Err(StoreError::NotFound(room_code.to_string()));
        };

        let player = Player::new(room_code.clone(), name, avatar_index);
        members.push(player.id);
        self.players.insert(player.id, player.clone());

        info!(
            "Player {} ('{}') joined room {}",
            player.id, player.display_name, room_code
        );

        self.notify(ChangeEvent::PlayerInserted {
            player: player.clone(),
        });

        Ok(player)
    }

    fn handle_get_room(&self, code: &RoomCode) -> Result<Room, StoreError> {
        self.rooms
            .get(code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(code.to_string()))
    }

    fn handle_list_players(&self, room_code: &RoomCode) -> Result<Vec<Player>, StoreError> {
        let members = self
            .room_players
            .get(room_code)
            .ok_or_else(|| StoreError::NotFound(room_code.to_string()))?;

        Ok(members
            .iter()
            .filter_map(|id| self.players.get(id).cloned())
            .collect())
    }

    /// Handle a guess history write (last writer wins)
    fn handle_update_guesses(
        &mut self,
        player_id: PlayerId,
        guesses: Vec<GuessResult>,
    ) -> Result<(), StoreError> {
        let Some(player) = self.players.get_mut(&player_id) else {
            return Err(StoreError::NotFound(player_id.to_string()));
        };

        player.guesses = guesses;
        debug!(
            "Player {} now has {} guesses",
            player_id,
            player.guesses.len()
        );

        let player = player.clone();
        self.notify(ChangeEvent::PlayerUpdated { player });
        Ok(())
    }

    /// Handle a win claim (first writer wins)
    fn handle_set_winner(
        &mut self,
        room_code: &RoomCode,
        player_id: PlayerId,
    ) -> Result<Room, StoreError> {
        let Some(room) = self.rooms.get_mut(room_code) else {
            return Err(StoreError::NotFound(room_code.to_string()));
        };

        if !room.set_winner(player_id) {
            debug!(
                "Room {} already won, ignoring claim from {}",
                room_code, player_id
            );
            return Ok(room.clone());
        }

        info!("Player {} won room {}", player_id, room_code);
        let room = room.clone();
        self.notify(ChangeEvent::RoomUpdated { room: room.clone() });
        Ok(room)
    }

    /// Handle a player leaving
    ///
    /// Deleting an unknown player is acknowledged without effect.
    fn handle_delete_player(&mut self, player_id: PlayerId) -> Result<(), StoreError> {
        let Some(player) = self.players.remove(&player_id) else {
            return Ok(());
        };

        if let Some(members) = self.room_players.get_mut(&player.room_code) {
            members.retain(|id| *id != player_id);
        }

        info!("Player {} left room {}", player_id, player.room_code);

        self.notify(ChangeEvent::PlayerDeleted {
            player_id,
            room_code: player.room_code,
        });
        Ok(())
    }

    fn handle_subscribe(&mut self, room_code: RoomCode) -> Result<Subscription, StoreError> {
        if !self.rooms.contains_key(&room_code) {
            return Err(StoreError::NotFound(room_code.to_string()));
        }

        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .insert(id, Subscriber::new(id, room_code.clone(), tx));

        debug!("{} watching room {}", id, room_code);

        Ok(Subscription {
            id,
            room_code,
            events: rx,
        })
    }

    fn handle_unsubscribe(&mut self, subscription_id: SubscriptionId) {
        if self.subscribers.remove(&subscription_id).is_some() {
            debug!("{} cancelled", subscription_id);
        }
    }

    /// Helper: Push an event to every subscriber of its room
    ///
    /// Subscribers whose receiver is gone are dropped.
    fn notify(&mut self, event: ChangeEvent) {
        let mut closed = Vec::new();

        for sub in self.subscribers.values() {
            if sub.watches(event.room_code()) && sub.send(event.clone()).is_err() {
                closed.push(sub.id);
            }
        }

        for id in closed {
            self.subscribers.remove(&id);
            debug!("{} dropped (receiver closed)", id);
        }
    }
}

/// Cloneable handle to a running StoreServer
#[derive(Debug, Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    pub fn new(sender: mpsc::Sender<StoreCommand>) -> Self {
        Self { sender }
    }

    /// Helper: Send a command and wait for its reply
    async fn request<T, F>(&self, make: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnOnce(Reply<T>) -> StoreCommand + Send,
    {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| store_closed())?;
        response.await.map_err(|_| store_closed())?
    }
}

fn store_closed() -> StoreError {
    StoreError::Connectivity("room store is not running".to_string())
}

#[async_trait]
impl RoomStore for StoreHandle {
    async fn create_room(
        &self,
        code: RoomCode,
        secret: SecretCode,
        name: String,
    ) -> Result<Room, StoreError> {
        self.request(|reply| StoreCommand::CreateRoom {
            code,
            secret,
            name,
            reply,
        })
        .await
    }

    async fn create_player(
        &self,
        room_code: RoomCode,
        name: String,
        avatar_index: u8,
    ) -> Result<Player, StoreError> {
        self.request(|reply| StoreCommand::CreatePlayer {
            room_code,
            name,
            avatar_index,
            reply,
        })
        .await
    }

    async fn get_room(&self, code: RoomCode) -> Result<Room, StoreError> {
        self.request(|reply| StoreCommand::GetRoom { code, reply })
            .await
    }

    async fn list_players(&self, room_code: RoomCode) -> Result<Vec<Player>, StoreError> {
        self.request(|reply| StoreCommand::ListPlayers { room_code, reply })
            .await
    }

    async fn update_player_guesses(
        &self,
        player_id: PlayerId,
        guesses: Vec<GuessResult>,
    ) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::UpdatePlayerGuesses {
            player_id,
            guesses,
            reply,
        })
        .await
    }

    async fn set_room_winner(
        &self,
        room_code: RoomCode,
        player_id: PlayerId,
    ) -> Result<Room, StoreError> {
        self.request(|reply| StoreCommand::SetRoomWinner {
            room_code,
            player_id,
            reply,
        })
        .await
    }

    async fn delete_player(&self, player_id: PlayerId) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::DeletePlayer { player_id, reply })
            .await
    }

    async fn subscribe_room_changes(
        &self,
        room_code: RoomCode,
    ) -> Result<Subscription, StoreError> {
        self.request(|reply| StoreCommand::Subscribe { room_code, reply })
            .await
    }

    async fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::Unsubscribe {
            subscription_id,
            reply,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Guess;
    use crate::scoring::score;

    fn code(s: &str) -> RoomCode {
        RoomCode(s.to_string())
    }

    async fn store_with_room() -> (StoreHandle, Room) {
        let store = StoreServer::spawn(16);
        let room = store
            .create_room(code("123456"), "1234".parse().unwrap(), "Vayu Breeze".to_string())
            .await
            .unwrap();
        (store, room)
    }

    #[tokio::test]
    async fn test_duplicate_room_code() {
        let (store, _room) = store_with_room().await;
        let err = store
            .create_room(code("123456"), "5678".parse().unwrap(), "Agni Flame".to_string())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateCode(code("123456")));
    }

    #[tokio::test]
    async fn test_get_missing_room() {
        let store = StoreServer::spawn(16);
        let err = store.get_room(code("999999")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store
            .create_player(code("999999"), "Mira".to_string(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_players_listed_in_join_order() {
        let (store, room) = store_with_room().await;
        let a = store.create_player(room.code.clone(), "A".to_string(), 0).await.unwrap();
        let b = store.create_player(room.code.clone(), "B".to_string(), 1).await.unwrap();
        let c = store.create_player(room.code.clone(), "C".to_string(), 2).await.unwrap();

        store.delete_player(b.id).await.unwrap();

        let players = store.list_players(room.code.clone()).await.unwrap();
        let ids: Vec<_> = players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[tokio::test]
    async fn test_winner_first_write_wins() {
        let (store, room) = store_with_room().await;
        let a = store.create_player(room.code.clone(), "A".to_string(), 0).await.unwrap();
        let b = store.create_player(room.code.clone(), "B".to_string(), 1).await.unwrap();

        let after_a = store.set_room_winner(room.code.clone(), a.id).await.unwrap();
        let after_b = store.set_room_winner(room.code.clone(), b.id).await.unwrap();

        assert_eq!(after_a.winner_id, Some(a.id));
        assert_eq!(after_b.winner_id, Some(a.id));
        assert_eq!(store.get_room(room.code).await.unwrap().winner_id, Some(a.id));
    }

    #[tokio::test]
    async fn test_change_feed_order() {
        let (store, room) = store_with_room().await;
        let mut sub = store.subscribe_room_changes(room.code.clone()).await.unwrap();

        let player = store.create_player(room.code.clone(), "A".to_string(), 0).await.unwrap();
        let result = score(&Guess::parse("1234").unwrap(), &room.secret_code, 1);
        store
            .update_player_guesses(player.id, vec![result.clone()])
            .await
            .unwrap();
        store.set_room_winner(room.code.clone(), player.id).await.unwrap();
        store.delete_player(player.id).await.unwrap();

        assert!(matches!(sub.recv().await, Some(ChangeEvent::PlayerInserted { .. })));
        match sub.recv().await {
            Some(ChangeEvent::PlayerUpdated { player: p }) => assert_eq!(p.guesses, vec![result]),
            other => panic!("unexpected event: {:?}", other),
        }
        match sub.recv().await {
            Some(ChangeEvent::RoomUpdated { room: r }) => assert_eq!(r.winner_id, Some(player.id)),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(sub.recv().await, Some(ChangeEvent::PlayerDeleted { .. })));
    }

    #[tokio::test]
    async fn test_feed_is_per_room() {
        let (store, room) = store_with_room().await;
        let other = store
            .create_room(code("654321"), "9876".parse().unwrap(), "Surya Ray".to_string())
            .await
            .unwrap();
        let mut sub = store.subscribe_room_changes(room.code.clone()).await.unwrap();

        store.create_player(other.code.clone(), "X".to_string(), 0).await.unwrap();
        store.create_player(room.code.clone(), "Y".to_string(), 0).await.unwrap();

        match sub.recv().await {
            Some(ChangeEvent::PlayerInserted { player }) => assert_eq!(player.display_name, "Y"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (store, room) = store_with_room().await;
        let mut sub = store.subscribe_room_changes(room.code.clone()).await.unwrap();
        store.unsubscribe(sub.id).await.unwrap();

        store.create_player(room.code.clone(), "A".to_string(), 0).await.unwrap();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_player() {
        let (store, _room) = store_with_room().await;
        let err = store
            .update_player_guesses(PlayerId::new(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_closed_store_reports_connectivity() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let store = StoreHandle::new(tx);
        let err = store.get_room(code("123456")).await.unwrap_err();
        assert!(matches!(err, StoreError::Connectivity(_)));
    }
}
