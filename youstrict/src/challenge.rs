//! Parent gate: an arithmetic question a young child cannot answer quickly.
//!
//! Challenges are single-use and expire after [`CHALLENGE_TTL_MS`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;

/// How long an issued challenge can be answered.
pub const CHALLENGE_TTL_MS: i64 = 5 * 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("unknown challenge")]
    Unknown,

    #[error("challenge expired")]
    Expired,

    #[error("wrong answer")]
    WrongAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Multiply,
}

impl Operation {
    pub const fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Multiply => '×',
        }
    }
}

/// One issued question.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: Uuid,
    pub left: u32,
    pub right: u32,
    pub operation: Operation,
    pub issued_at: i64,
}

impl Challenge {
    /// Draw a random question.
    pub fn generate(rng: &mut impl Rng, issued_at: i64) -> Self {
        let (operation, left, right) = if rng.random_bool(0.5) {
            (
                Operation::Add,
                rng.random_range(100..=999),
                rng.random_range(100..=999),
            )
        } else {
            (
                Operation::Multiply,
                rng.random_range(12..=29),
                rng.random_range(3..=9),
            )
        };
        Self {
            id: Uuid::now_v7(),
            left,
            right,
            operation,
            issued_at,
        }
    }

    pub fn question(&self) -> String {
        format!("{} {} {} = ?", self.left, self.operation.symbol(), self.right)
    }

    pub const fn answer(&self) -> u32 {
        match self.operation {
            Operation::Add => self.left + self.right,
            Operation::Multiply => self.left * self.right,
        }
    }
}

/// Outstanding challenges awaiting an answer.
pub struct ChallengeBook {
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<Uuid, Challenge>>,
}

impl std::fmt::Debug for ChallengeBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeBook").finish_non_exhaustive()
    }
}

impl ChallengeBook {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a new challenge, dropping any that have expired.
    pub fn issue(&self) -> Challenge {
        let now = self.clock.now_ms();
        let challenge = Challenge::generate(&mut rand::rng(), now);

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|_, c| now - c.issued_at < CHALLENGE_TTL_MS);
        pending.insert(challenge.id, challenge.clone());
        debug!(id = %challenge.id, outstanding = pending.len(), "Issued parent challenge");
        challenge
    }

    /// Check an answer. The challenge is consumed whatever the outcome.
    pub fn verify(&self, id: Uuid, answer: u32) -> Result<(), ChallengeError> {
        let challenge = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or(ChallengeError::Unknown)?;

        if self.clock.now_ms() - challenge.issued_at >= CHALLENGE_TTL_MS {
            return Err(ChallengeError::Expired);
        }
        if challenge.answer() != answer {
            return Err(ChallengeError::WrongAnswer);
        }
        Ok(())
    }
}
