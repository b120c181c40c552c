//! Room and player records
//!
//! These are the rows the room store holds and replicates to every client
//! in a room. A room owns its secret; players only reference their room by
//! code and are created and removed independently.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::code::SecretCode;
use crate::scoring::GuessResult;
use crate::types::{PlayerId, RoomCode};

/// Labels handed out to new rooms
pub const ROOM_NAMES: [&str; 10] = [
    "Garuda Wings",
    "Nandi Strength",
    "Airavata Trunk",
    "Shesha Coil",
    "Indra Thunder",
    "Agni Flame",
    "Varuna Tide",
    "Vayu Breeze",
    "Surya Ray",
    "Chandra Glow",
];

/// Number of avatar styles a player can be assigned
pub const AVATAR_COUNT: u8 = 8;

/// Longest display name kept, in characters
pub const MAX_NAME_LEN: usize = 20;

/// Multiplayer room
///
/// The secret is fixed at creation. The winner is set at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room code for identification
    pub code: RoomCode,
    pub secret_code: SecretCode,
    /// Mythological label shown to players
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    /// First player to crack the code
    pub winner_id: Option<PlayerId>,
}

impl Room {
    /// Create a new room with the given code, secret and label
    pub fn new(code: RoomCode, secret_code: SecretCode, display_name: String) -> Self {
        Self {
            code,
            secret_code,
            display_name,
            created_at: Utc::now(),
            winner_id: None,
        }
    }

    /// Check if someone has already won
    pub fn has_winner(&self) -> bool {
        self.winner_id.is_some()
    }

    /// Record the winner unless one is already set
    ///
    /// Returns true if this call set the winner.
    pub fn set_winner(&mut self, player_id: PlayerId) -> bool {
        if self.winner_id.is_some() {
            false
        } else {
            self.winner_id = Some(player_id);
            true
        }
    }
}

/// Participant in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Owning room (relation only)
    pub room_code: RoomCode,
    pub display_name: String,
    pub avatar_index: u8,
    /// Scored guesses, oldest first
    pub guesses: Vec<GuessResult>,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    /// Create a player who has just joined
    pub fn new(room_code: RoomCode, display_name: String, avatar_index: u8) -> Self {
        Self {
            id: PlayerId::new(),
            room_code,
            display_name,
            avatar_index,
            guesses: Vec::new(),
            joined_at: Utc::now(),
        }
    }

    /// Number of guesses made so far
    pub fn guess_count(&self) -> usize {
        self.guesses.len()
    }

    /// Sequence number the next guess will carry
    pub fn next_sequence(&self) -> u32 {
        self.guesses.len() as u32 + 1
    }
}

/// Pick a room label at random
pub fn random_room_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    ROOM_NAMES
        .choose(rng)
        .copied()
        .unwrap_or(ROOM_NAMES[0])
        .to_string()
}

/// Pick an avatar index at random
pub fn random_avatar<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(0..AVATAR_COUNT)
}

/// Normalize a display name
///
/// Trims surrounding whitespace and keeps at most `MAX_NAME_LEN` characters.
/// Returns None if nothing is left.
pub fn normalize_display_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_room() -> Room {
        Room::new(
            RoomCode("123456".to_string()),
            "1234".parse().unwrap(),
            "Agni Flame".to_string(),
        )
    }

    #[test]
    fn test_room_creation() {
        let room = test_room();
        assert_eq!(room.code.as_str(), "123456");
        assert!(!room.has_winner());
    }

    #[test]
    fn test_first_winner_is_final() {
        let mut room = test_room();
        let first = PlayerId::new();
        let second = PlayerId::new();

        assert!(room.set_winner(first));
        assert!(!room.set_winner(second));
        assert_eq!(room.winner_id, Some(first));
    }

    #[test]
    fn test_player_sequence() {
        let player = Player::new(RoomCode("123456".to_string()), "Asha".to_string(), 3);
        assert_eq!(player.guess_count(), 0);
        assert_eq!(player.next_sequence(), 1);
    }

    #[test]
    fn test_random_choices_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!(random_avatar(&mut rng) < AVATAR_COUNT);
            assert!(ROOM_NAMES.contains(&random_room_name(&mut rng).as_str()));
        }
    }

    #[test]
    fn test_normalize_display_name() {
        assert_eq!(normalize_display_name("  Ravi  "), Some("Ravi".to_string()));
        assert_eq!(normalize_display_name("   "), None);

        let long = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(normalize_display_name(long).unwrap().chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn test_room_round_trips_through_json() {
        let room = test_room();
        let json = serde_json::to_string(&room).unwrap();
        assert!(json.contains("\"secret_code\":\"1234\""));
        let back: Room = serde_json::from_str(&json).unwrap();
        assert_eq!(back, room);
    }
}
