//! Data models for the flashcard system

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::FlashcardError;

pub type CardId = i64;
pub type DeckId = i64;
pub type CardTypeId = i64;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A deck in the collection tree. Decks without a parent hang off the
/// collection root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_deck_id: Option<DeckId>,
}

/// A note type: the named field layout its cards are edited with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardType {
    pub id: CardTypeId,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Reviewer feedback on how hard a card was to recall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy];

    /// Button number used by reviewers (1-4)
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Again => "again",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }
}

impl TryFrom<u8> for Grade {
    type Error = FlashcardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(FlashcardError::InvalidGrade(other.to_string())),
        }
    }
}

impl FromStr for Grade {
    type Err = FlashcardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "again" | "a" => Ok(Self::Again),
            "hard" | "h" => Ok(Self::Hard),
            "good" | "g" => Ok(Self::Good),
            "easy" | "e" => Ok(Self::Easy),
            digits => digits
                .parse::<u8>()
                .map_err(|_| FlashcardError::InvalidGrade(trimmed.to_string()))
                .and_then(Grade::try_from),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle label derived from a card's scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Label {
    /// Never graded and never scheduled
    New,
    /// Working through the learning steps for the first time
    Learning,
    /// Back in the learning steps after a lapse
    Relearning,
    /// Graduated and due now
    Review,
    /// Graduated, due in the future
    ReviewNotDue,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Relearning => "relearning",
            Self::Review => "review",
            Self::ReviewNotDue => "review (not due)",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spaced repetition state stored alongside every card.
///
/// The lifecycle phase is not stored; it is derived from `reps`,
/// `learning_step_index` and `next_due` by [`super::due::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingState {
    /// Completed reviews. Zero until the card first graduates.
    #[serde(default)]
    pub reps: u32,
    /// Position in the learning steps. For relearning cards the step is
    /// `learning_step_index - 1`.
    #[serde(default)]
    pub learning_step_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due: Option<DateTime<Utc>>,
    /// Long-term interval in days
    #[serde(default)]
    pub interval: f64,
    #[serde(default = "default_ease")]
    pub ease: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<DateTime<Utc>>,
}

fn default_ease() -> f64 {
    2.5
}

impl Default for SchedulingState {
    fn default() -> Self {
        Self::new(default_ease())
    }
}

impl SchedulingState {
    /// State of a card that has never been studied
    pub fn new(starting_ease: f64) -> Self {
        Self {
            reps: 0,
            learning_step_index: 0,
            next_due: None,
            interval: 0.0,
            ease: starting_ease,
            last_reviewed: None,
        }
    }

    /// The long-term interval as a duration, rounded to the second
    pub fn interval_duration(&self) -> Duration {
        days_to_duration(self.interval)
    }
}

/// Convert fractional days to a duration without truncating to whole days.
/// Saturates at the representable range.
pub fn days_to_duration(days: f64) -> Duration {
    let secs = (days * SECONDS_PER_DAY).round() as i64;
    Duration::try_seconds(secs).unwrap_or(if secs < 0 { Duration::MIN } else { Duration::MAX })
}

/// A card in the collection. Field contents are opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub deck_id: DeckId,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub state: SchedulingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_type_id: Option<CardTypeId>,
    /// Rendering templates, stored verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_front: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_back: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Card {
    pub fn new(id: CardId, deck_id: DeckId) -> Self {
        Self {
            id,
            deck_id,
            fields: serde_json::Map::new(),
            tags: Vec::new(),
            is_active: true,
            state: SchedulingState::default(),
            card_type_id: None,
            template_front: None,
            template_back: None,
        }
    }

    /// Exact (trimmed) tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.tags.iter().any(|t| t.trim() == tag)
    }

    /// First field value, cut to `max_chars`
    pub fn preview(&self, max_chars: usize) -> String {
        let text = match self.fields.values().next() {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        text.chars().take(max_chars).collect()
    }
}

/// Split a comma-separated tag column into trimmed, non-empty tags
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// A record of a single grading event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: Uuid,
    pub card_id: CardId,
    pub grade: Grade,
    /// Interval after the review (days)
    pub interval: f64,
    /// Ease after the review
    pub ease: f64,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn new(card_id: CardId, grade: Grade, state: &SchedulingState, reviewed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            grade,
            interval: state.interval,
            ease: state.ease,
            reviewed_at,
        }
    }
}

/// Card counts per lifecycle label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCounts {
    pub total: usize,
    pub new: usize,
    pub learning: usize,
    pub relearning: usize,
    pub review: usize,
    pub review_not_due: usize,
    /// Cards eligible for study right now (including new cards)
    pub due: usize,
}
