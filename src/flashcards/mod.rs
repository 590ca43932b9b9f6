//! Flashcard collection and spaced repetition engine for Recall
//!
//! This module provides:
//! - Card scheduling state and lifecycle labels
//! - Learning-step / ease based scheduling policy
//! - Due queries with deck, tag and state filters
//! - A review session driver over a pluggable card store
//! - SQLite and in-memory card stores

pub mod algorithm;
pub mod clock;
pub mod config;
pub mod due;
pub mod errors;
pub mod models;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, SchedulerConfig, SessionConfig};
pub use due::CardFilter;
pub use errors::{FlashcardError, Result};
pub use models::*;
pub use session::{ReviewSession, SessionState, SessionSummary};
pub use storage::{CardStore, MemoryCardStore, SqliteCardStore};
