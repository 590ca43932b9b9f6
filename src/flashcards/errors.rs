//! Flashcard error types

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::CardId;

/// Errors that can occur while scheduling, querying or storing cards
#[derive(Debug, Error)]
pub enum FlashcardError {
    #[error("Invalid grade: {0} (expected again, hard, good, easy or 1-4)")]
    InvalidGrade(String),

    #[error("Clock regression: now ({now}) is earlier than last review ({last_reviewed})")]
    ClockRegression {
        now: DateTime<Utc>,
        last_reviewed: DateTime<Utc>,
    },

    #[error("Card {card_id} was modified concurrently (expected reps {expected_reps}, found {actual_reps})")]
    ConcurrentModification {
        card_id: CardId,
        expected_reps: u32,
        actual_reps: u32,
    },

    #[error("Card not found: {0}")]
    NotFound(CardId),

    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    #[error("Due date {requested} is in the past (now {now})")]
    DueInPast {
        requested: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Due date {seconds}s after {from} is out of range")]
    DueOutOfRange { from: DateTime<Utc>, seconds: i64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid session operation: {0}")]
    InvalidSession(&'static str),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl FlashcardError {
    /// Whether a caller may retry the operation after re-reading the card
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

/// Result type alias for flashcard operations
pub type Result<T> = std::result::Result<T, FlashcardError>;
