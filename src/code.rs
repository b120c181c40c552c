//! Secret codes and guesses
//!
//! Both are 4 distinct digits drawn from 1-9. `SecretCode::generate` builds
//! a uniformly random code; `Guess::parse` validates user input.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GuessError;

/// Number of digits in a code
pub const CODE_LEN: usize = 4;

/// Digits a code may draw from (zero excluded)
const DIGIT_POOL: [u8; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 9];

/// Hidden code for a single-player session or a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretCode([u8; CODE_LEN]);

impl SecretCode {
    /// Generate a new random code using the thread RNG
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generate a code from the given random source
    ///
    /// Draws without replacement from the pool of nine digits, so every
    /// ordered selection of four is equally likely.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut pool = DIGIT_POOL.to_vec();
        let mut digits = [0u8; CODE_LEN];
        for slot in digits.iter_mut() {
            let index = rng.gen_range(0..pool.len());
            *slot = pool.remove(index);
        }
        Self(digits)
    }

    pub fn digits(&self) -> &[u8; CODE_LEN] {
        &self.0
    }
}

impl std::str::FromStr for SecretCode {
    type Err = GuessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_digits(s).map(Self)
    }
}

impl TryFrom<String> for SecretCode {
    type Error = GuessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecretCode> for String {
    fn from(code: SecretCode) -> Self {
        code.to_string()
    }
}

impl fmt::Display for SecretCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_digits(f, &self.0)
    }
}

/// A validated player guess
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guess([u8; CODE_LEN]);

impl Guess {
    /// Validate raw input
    ///
    /// Checks run in a fixed order so the user sees the first problem:
    /// length, then digit range, then repeats.
    pub fn parse(input: &str) -> Result<Self, GuessError> {
        parse_digits(input).map(Self)
    }

    pub fn digits(&self) -> &[u8; CODE_LEN] {
        &self.0
    }
}

impl From<SecretCode> for Guess {
    fn from(code: SecretCode) -> Self {
        Self(code.0)
    }
}

impl std::str::FromStr for Guess {
    type Err = GuessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Guess {
    type Error = GuessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Guess> for String {
    fn from(guess: Guess) -> Self {
        guess.to_string()
    }
}

impl fmt::Display for Guess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_digits(f, &self.0)
    }
}

fn parse_digits(input: &str) -> Result<[u8; CODE_LEN], GuessError> {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() != CODE_LEN {
        return Err(GuessError::WrongLength);
    }

    let mut digits = [0u8; CODE_LEN];
    for (slot, c) in digits.iter_mut().zip(&chars) {
        match c.to_digit(10) {
            Some(d @ 1..=9) => *slot = d as u8,
            _ => return Err(GuessError::InvalidDigit),
        }
    }

    for (i, d) in digits.iter().enumerate() {
        if digits[i + 1..].contains(d) {
            return Err(GuessError::DuplicateDigit);
        }
    }

    Ok(digits)
}

fn write_digits(f: &mut fmt::Formatter<'_>, digits: &[u8; CODE_LEN]) -> fmt::Result {
    for d in digits {
        write!(f, "{}", d)?;
    }
    Ok(())
}
