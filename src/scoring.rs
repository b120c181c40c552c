//! Guess scoring
//!
//! Compares a validated guess against the secret and reports how many
//! digits are shared (`count_match`) and how many sit in the right place
//! (`position_match`).

use serde::{Deserialize, Serialize};

use crate::code::{Guess, SecretCode, CODE_LEN};

/// One scored row of a player's guess history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessResult {
    /// 1-based, increasing per player
    pub sequence: u32,
    pub input: Guess,
    /// Distinct digits shared with the secret, any position
    pub count_match: u8,
    /// Digits matching the secret in value and position
    pub position_match: u8,
}

impl GuessResult {
    /// Check whether this guess cracked the code
    pub fn is_win(&self) -> bool {
        self.count_match == CODE_LEN as u8 && self.position_match == CODE_LEN as u8
    }
}

/// Score a guess against the secret
pub fn score(guess: &Guess, secret: &SecretCode, sequence: u32) -> GuessResult {
    let guess_digits = guess.digits();
    let secret_digits = secret.digits();

    let position_match = guess_digits
        .iter()
        .zip(secret_digits)
        .filter(|(g, s)| g == s)
        .count();

    // Set intersection over a bitmask of digits 1-9
    let mask = |digits: &[u8; CODE_LEN]| digits.iter().fold(0u16, |m, d| m | (1u16 << *d));
    let count_match = (mask(guess_digits) & mask(secret_digits)).count_ones();

    GuessResult {
        sequence,
        input: *guess,
        count_match: count_match as u8,
        position_match: position_match as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn guess(s: &str) -> Guess {
        Guess::parse(s).unwrap()
    }

    fn secret(s: &str) -> SecretCode {
        s.parse().unwrap()
    }

    #[test]
    fn test_swapped_digits() {
        let result = score(&guess("1243"), &secret("1234"), 1);
        assert_eq!(result.position_match, 2);
        assert_eq!(result.count_match, 4);
        assert!(!result.is_win());
    }

    #[test]
    fn test_exact_match_wins() {
        let result = score(&guess("4321"), &secret("4321"), 3);
        assert_eq!(result.position_match, 4);
        assert_eq!(result.count_match, 4);
        assert_eq!(result.sequence, 3);
        assert!(result.is_win());
    }

    #[test]
    fn test_no_shared_digits() {
        let result = score(&guess("5678"), &secret("1234"), 1);
        assert_eq!(result.count_match, 0);
        assert_eq!(result.position_match, 0);
    }

    #[test]
    fn test_partial_overlap() {
        // 1 in place, 3 present elsewhere
        let result = score(&guess("1359"), &secret("1234"), 1);
        assert_eq!(result.position_match, 1);
        assert_eq!(result.count_match, 2);
    }

    #[test]
    fn test_bounds_and_symmetry() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..500 {
            let a = SecretCode::generate_with(&mut rng);
            let b = SecretCode::generate_with(&mut rng);
            let ab = score(&Guess::from(a), &b, 1);
            let ba = score(&Guess::from(b), &a, 1);

            assert!(ab.position_match <= ab.count_match);
            assert!(ab.count_match <= 4);
            assert_eq!(ab.count_match, ba.count_match);
            assert_eq!(ab.position_match, ba.position_match);
            assert_eq!(a == b, ab.position_match == 4);
            assert_eq!(a == b, ab.is_win());
        }
    }

    #[test]
    fn test_self_score_is_win() {
        let mut rng = StdRng::seed_from_u64(5);
        let code = SecretCode::generate_with(&mut rng);
        assert!(score(&Guess::from(code), &code, 1).is_win());
    }
}
