//! Error types for the game
//!
//! Defines guess validation errors, room store errors and
//! application-level errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::RoomCode;

/// Guess validation errors
///
/// Display strings are shown to the player as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuessError {
    /// Input is not exactly 4 characters
    #[error("Number must be 4 digits.")]
    WrongLength,

    /// A character is not one of 1-9
    #[error("Digits must be 1-9 (no zeroes).")]
    InvalidDigit,

    /// A digit appears more than once
    #[error("Digits cannot be repeated.")]
    DuplicateDigit,
}

/// Room store errors
///
/// Returned by every `RoomStore` implementation, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Room or player does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A room with this code already exists
    #[error("Room code {0} already in use")]
    DuplicateCode(RoomCode),

    /// Store unreachable, closed or misconfigured
    #[error("Store unavailable: {0}")]
    Connectivity(String),
}

/// Application-level errors
///
/// Covers user action errors (reported, then the player carries on) and
/// transport errors from the gateway and remote store plumbing.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed guess, never submitted
    #[error(transparent)]
    Validation(#[from] GuessError),

    /// Guess submitted out of turn
    #[error("It's not your turn!")]
    NotYourTurn,

    /// Game already has a winner
    #[error("The game is already over")]
    GameFinished,

    /// Room code does not exist on join
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Freshly generated room code collided with an existing room
    #[error("Room code {0} already in use")]
    DuplicateRoomCode(RoomCode),

    /// Store unreachable or misconfigured
    #[error("Connection problem: {0}")]
    Connectivity(String),

    /// Display name empty after trimming
    #[error("Please enter your name.")]
    InvalidName,

    /// Room code input is not 6 digits
    #[error("Invalid Room ID.")]
    InvalidRoomCode,

    /// Operation not available in the current mode
    #[error("Not available here: {0}")]
    InvalidAction(&'static str),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::RoomNotFound(what),
            StoreError::DuplicateCode(code) => AppError::DuplicateRoomCode(code),
            StoreError::Connectivity(reason) => AppError::Connectivity(reason),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable set to something unparsable
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Message send errors
///
/// Occurs when attempting to send through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_error_messages() {
        assert_eq!(GuessError::WrongLength.to_string(), "Number must be 4 digits.");
        assert_eq!(
            AppError::from(GuessError::DuplicateDigit).to_string(),
            "Digits cannot be repeated."
        );
    }

    #[test]
    fn test_store_error_mapping() {
        let err: AppError = StoreError::NotFound("123456".to_string()).into();
        assert!(matches!(err, AppError::RoomNotFound(code) if code == "123456"));

        let err: AppError = StoreError::Connectivity("closed".to_string()).into();
        assert!(matches!(err, AppError::Connectivity(_)));
    }
}
