//! Recall: a personal flashcard collection with a spaced repetition
//! scheduler.
//!
//! The scheduling core lives in [`flashcards`]; the `recall-cli` binary
//! browses and reviews a SQLite collection on top of it.

pub mod flashcards;

pub use flashcards::{
    AppConfig, Card, CardFilter, CardStore, Clock, Deck, FlashcardError, Grade, Label,
    ReviewSession, SchedulerConfig, SchedulingState, SessionConfig, SessionState,
    SqliteCardStore, SystemClock,
};
