//! Room store interface
//!
//! The durable side of multiplayer: rooms, players and a per-room change
//! feed. `StoreHandle` talks to the in-process store actor; `RemoteStore`
//! talks to a store served over WebSocket. The game controller only sees
//! this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::code::SecretCode;
use crate::error::StoreError;
use crate::room::{Player, Room};
use crate::scoring::GuessResult;
use crate::types::{PlayerId, RoomCode, SubscriptionId};

/// Row-level change in one room
///
/// Delivered to subscribers in the store's write order for that room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A player joined
    PlayerInserted { player: Player },
    /// A player's record changed (guess history)
    PlayerUpdated { player: Player },
    /// A player left
    PlayerDeleted {
        player_id: PlayerId,
        room_code: RoomCode,
    },
    /// The room record changed (winner)
    RoomUpdated { room: Room },
}

impl ChangeEvent {
    /// Room this event belongs to
    pub fn room_code(&self) -> &RoomCode {
        match self {
            ChangeEvent::PlayerInserted { player } | ChangeEvent::PlayerUpdated { player } => {
                &player.room_code
            }
            ChangeEvent::PlayerDeleted { room_code, .. } => room_code,
            ChangeEvent::RoomUpdated { room } => &room.code,
        }
    }
}

/// Live change feed for one room
///
/// Dropping it stops delivery; `RoomStore::unsubscribe` also releases the
/// store side.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub room_code: RoomCode,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    /// Wait for the next change; None once the feed has closed
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

/// Shared room and player storage with change notification
///
/// Mutations are single-record. Guess histories are last-writer-wins;
/// the room winner is first-writer-wins.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Create a room; fails with `DuplicateCode` if the code is taken
    async fn create_room(
        &self,
        code: RoomCode,
        secret: SecretCode,
        name: String,
    ) -> Result<Room, StoreError>;

    /// Add a player to an existing room
    async fn create_player(
        &self,
        room_code: RoomCode,
        name: String,
        avatar_index: u8,
    ) -> Result<Player, StoreError>;

    async fn get_room(&self, code: RoomCode) -> Result<Room, StoreError>;

    /// Players of a room, ordered by join time
    async fn list_players(&self, room_code: RoomCode) -> Result<Vec<Player>, StoreError>;

    /// Replace a player's whole guess history
    async fn update_player_guesses(
        &self,
        player_id: PlayerId,
        guesses: Vec<GuessResult>,
    ) -> Result<(), StoreError>;

    /// Set the winner if none is set yet
    ///
    /// Returns the room as stored afterwards, so a caller that lost the
    /// race sees who actually won.
    async fn set_room_winner(
        &self,
        room_code: RoomCode,
        player_id: PlayerId,
    ) -> Result<Room, StoreError>;

    async fn delete_player(&self, player_id: PlayerId) -> Result<(), StoreError>;

    async fn subscribe_room_changes(&self, room_code: RoomCode)
        -> Result<Subscription, StoreError>;

    async fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<(), StoreError>;
}
