//! Turn resolution
//!
//! Whose turn it is is never stored. Every client derives it from the
//! replicated player list (ordered by join time) and guess counts:
//! `turn_index = total guesses % player count`. After a player leaves the
//! turn falls to whoever now sits at the computed position.

use crate::room::{Player, Room};
use crate::types::PlayerId;

/// Compute the turn index from per-player guess counts
///
/// Returns 0 when there are no players.
pub fn turn_index_from_counts<I>(counts: I) -> usize
where
    I: IntoIterator<Item = usize>,
{
    let (players, total) = counts
        .into_iter()
        .fold((0usize, 0usize), |(n, sum), count| (n + 1, sum + count));
    if players == 0 {
        0
    } else {
        total % players
    }
}

/// Compute the turn index for players ordered by join time
pub fn turn_index(players: &[Player]) -> usize {
    turn_index_from_counts(players.iter().map(Player::guess_count))
}

/// Get the player whose turn it is
pub fn current_turn_player(players: &[Player]) -> Option<&Player> {
    players.get(turn_index(players))
}

/// Check whether a player may submit a guess now
///
/// Requires that nobody has won yet and that it is this player's turn.
pub fn can_submit(room: &Room, players: &[Player], player_id: PlayerId) -> bool {
    !room.has_winner() && current_turn_player(players).is_some_and(|p| p.id == player_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Guess;
    use crate::scoring::GuessResult;
    use crate::types::RoomCode;

    fn code() -> RoomCode {
        RoomCode("654321".to_string())
    }

    fn player_with_guesses(name: &str, count: usize) -> Player {
        let mut player = Player::new(code(), name.to_string(), 0);
        let input = Guess::parse("1234").unwrap();
        for i in 0..count {
            player.guesses.push(GuessResult {
                sequence: i as u32 + 1,
                input,
                count_match: 0,
                position_match: 0,
            });
        }
        player
    }

    #[test]
    fn test_no_players() {
        assert_eq!(turn_index(&[]), 0);
        assert!(current_turn_player(&[]).is_none());
    }

    #[test]
    fn test_three_players_five_guesses() {
        let players = vec![
            player_with_guesses("a", 2),
            player_with_guesses("b", 2),
            player_with_guesses("c", 1),
        ];
        assert_eq!(turn_index(&players), 2);
        assert_eq!(current_turn_player(&players).unwrap().display_name, "c");
    }

    #[test]
    fn test_depends_only_on_total() {
        assert_eq!(turn_index_from_counts([5, 0, 0]), turn_index_from_counts([0, 0, 5]));
        assert_eq!(turn_index_from_counts([2, 2, 1]), turn_index_from_counts([1, 3, 1]));
        assert_eq!(turn_index_from_counts([4, 3]), 1);
    }

    #[test]
    fn test_departure_shifts_turn() {
        let mut players = vec![
            player_with_guesses("a", 1),
            player_with_guesses("b", 1),
            player_with_guesses("c", 0),
        ];
        assert_eq!(current_turn_player(&players).unwrap().display_name, "c");

        // c leaves: 2 guesses over 2 players
        players.pop();
        assert_eq!(current_turn_player(&players).unwrap().display_name, "a");
    }

    #[test]
    fn test_can_submit() {
        let players = vec![player_with_guesses("a", 1), player_with_guesses("b", 0)];
        let mut room = Room::new(code(), "1234".parse().unwrap(), "Surya Ray".to_string());

        assert!(!can_submit(&room, &players, players[0].id));
        assert!(can_submit(&room, &players, players[1].id));
        assert!(!can_submit(&room, &players, PlayerId::new()));

        room.set_winner(players[0].id);
        assert!(!can_submit(&room, &players, players[1].id));
    }
}
