//! Message protocol definitions
//!
//! JSON-based bidirectional protocol between the store gateway and remote
//! store clients, using Serde's tagged enums for type-safe
//! serialization/deserialization. Every request carries a `request_id`
//! that the matching response echoes back.

use serde::{Deserialize, Serialize};

use crate::code::SecretCode;
use crate::error::StoreError;
use crate::room::{Player, Room};
use crate::scoring::GuessResult;
use crate::store::ChangeEvent;
use crate::types::{PlayerId, RoomCode, SubscriptionId};

/// Client → Server frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    pub request_id: u64,
    #[serde(flatten)]
    pub message: ClientMessage,
}

/// Client → Server operation
///
/// One variant per room store operation. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        code: RoomCode,
        secret_code: SecretCode,
        name: String,
    },
    CreatePlayer {
        room_code: RoomCode,
        name: String,
        avatar_index: u8,
    },
    GetRoom {
        code: RoomCode,
    },
    ListPlayers {
        room_code: RoomCode,
    },
    UpdatePlayerGuesses {
        player_id: PlayerId,
        guesses: Vec<GuessResult>,
    },
    SetRoomWinner {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    DeletePlayer {
        player_id: PlayerId,
    },
    /// Start receiving change events for a room
    Subscribe {
        room_code: RoomCode,
    },
    Unsubscribe {
        subscription_id: SubscriptionId,
    },
}

/// Server → Client frame
///
/// Responses echo the request id; `Change` frames are pushed unprompted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted
    Connected { connection_id: String },
    Room { request_id: u64, room: Room },
    Player { request_id: u64, player: Player },
    Players {
        request_id: u64,
        players: Vec<Player>,
    },
    /// Operation applied, nothing to return
    Ack { request_id: u64 },
    Subscribed {
        request_id: u64,
        subscription_id: SubscriptionId,
    },
    /// Change feed event
    Change {
        subscription_id: SubscriptionId,
        event: ChangeEvent,
    },
    /// Error occurred
    Error {
        request_id: Option<u64>,
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    /// Request this frame answers, if any
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::Room { request_id, .. }
            | ServerMessage::Player { request_id, .. }
            | ServerMessage::Players { request_id, .. }
            | ServerMessage::Ack { request_id }
            | ServerMessage::Subscribed { request_id, .. } => Some(*request_id),
            ServerMessage::Error { request_id, .. } => *request_id,
            ServerMessage::Connected { .. } | ServerMessage::Change { .. } => None,
        }
    }

    /// Build an error frame for a failed request
    pub fn from_store_error(request_id: u64, err: StoreError) -> Self {
        let code = match &err {
            StoreError::NotFound(_) => ErrorCode::NotFound,
            StoreError::DuplicateCode(_) => ErrorCode::DuplicateCode,
            StoreError::Connectivity(_) => ErrorCode::Internal,
        };
        let message = match err {
            StoreError::NotFound(what) => what,
            StoreError::DuplicateCode(code) => code.to_string(),
            StoreError::Connectivity(reason) => reason,
        };
        ServerMessage::Error {
            request_id: Some(request_id),
            code,
            message,
        }
    }

    /// Build an error frame for an unparsable request
    pub fn invalid_message(detail: impl std::fmt::Display) -> Self {
        ServerMessage::Error {
            request_id: None,
            code: ErrorCode::InvalidMessage,
            message: format!("Invalid message format: {}", detail),
        }
    }
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Room or player does not exist
    NotFound,
    /// Room code already taken
    DuplicateCode,
    /// Invalid message format
    InvalidMessage,
    /// Store failure on the server side
    Internal,
}

/// Convert an error frame back into the store error it stands for
impl From<(ErrorCode, String)> for StoreError {
    fn from((code, message): (ErrorCode, String)) -> Self {
        match code {
            ErrorCode::NotFound => StoreError::NotFound(message),
            ErrorCode::DuplicateCode => StoreError::DuplicateCode(RoomCode(message)),
            ErrorCode::InvalidMessage | ErrorCode::Internal => StoreError::Connectivity(message),
        }
    }
}
