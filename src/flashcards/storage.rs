//! Card store backends
//!
//! The scheduler only ever reads a card, computes a new state and writes it
//! back guarded by the reps value it read. Stores make that write atomic.
//!
//! SQLite layout (times are UNIX seconds):
//! ```text
//! decks(id, name, parent_deck_id)
//! card_types(id, name, fields)
//! cards(id, deck_id, card_type_id, fields, template_front, template_back,
//!       tags, is_active, reps, interval, ease, learning_step_index,
//!       next_due, last_reviewed)
//! review_log(id, card_id, grade, interval, ease, reviewed_at)
//! ```
//! Collections missing the card type or template columns are upgraded in
//! place when opened.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::due::{due_order, CardFilter};
use super::errors::{FlashcardError, Result};
use super::models::{
    parse_tags, Card, CardId, CardType, CardTypeId, Deck, DeckId, ReviewRecord, SchedulingState,
};

/// Persistence boundary used by the review session driver
pub trait CardStore {
    /// Load one card with its scheduling state
    fn fetch(&self, card_id: CardId) -> Result<Card>;

    /// Replace a card's scheduling state, provided its stored `reps` still
    /// equals `expected_prior_reps`. Otherwise nothing is written and
    /// `ConcurrentModification` is returned.
    fn persist(&mut self, card_id: CardId, state: &SchedulingState, expected_prior_reps: u32) -> Result<()>;

    /// Active cards matching `filter`, in due order
    fn query(&self, filter: &CardFilter, now: DateTime<Utc>) -> Result<Vec<Card>>;

    /// Append to the review history
    fn log_review(&mut self, _record: &ReviewRecord) -> Result<()> {
        Ok(())
    }
}

fn filter_and_order(cards: impl IntoIterator<Item = Card>, filter: &CardFilter, now: DateTime<Utc>) -> Vec<Card> {
    let mut cards: Vec<Card> = cards
        .into_iter()
        .filter(|card| card.is_active && filter.matches(card, now))
        .collect();
    cards.sort_by(due_order);
    cards
}

// ==================== In-memory store ====================

/// Card store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryCardStore {
    decks: Vec<Deck>,
    cards: BTreeMap<CardId, Card>,
    reviews: Vec<ReviewRecord>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_deck(&mut self, deck: Deck) {
        self.decks.retain(|d| d.id != deck.id);
        self.decks.push(deck);
    }

    pub fn list_decks(&self) -> &[Deck] {
        &self.decks
    }

    /// Insert or replace a card
    pub fn insert(&mut self, card: Card) {
        self.cards.insert(card.id, card);
    }

    pub fn delete_card(&mut self, card_id: CardId) -> Result<()> {
        self.cards
            .remove(&card_id)
            .map(|_| ())
            .ok_or(FlashcardError::NotFound(card_id))
    }

    pub fn reviews(&self) -> &[ReviewRecord] {
        &self.reviews
    }
}

impl CardStore for MemoryCardStore {
    fn fetch(&self, card_id: CardId) -> Result<Card> {
        self.cards
            .get(&card_id)
            .cloned()
            .ok_or(FlashcardError::NotFound(card_id))
    }

    fn persist(&mut self, card_id: CardId, state: &SchedulingState, expected_prior_reps: u32) -> Result<()> {
        let card = self
            .cards
            .get_mut(&card_id)
            .ok_or(FlashcardError::NotFound(card_id))?;

        if card.state.reps != expected_prior_reps {
            return Err(FlashcardError::ConcurrentModification {
                card_id,
                expected_reps: expected_prior_reps,
                actual_reps: card.state.reps,
            });
        }

        card.state = state.clone();
        Ok(())
    }

    fn query(&self, filter: &CardFilter, now: DateTime<Utc>) -> Result<Vec<Card>> {
        Ok(filter_and_order(self.cards.values().cloned(), filter, now))
    }

    fn log_review(&mut self, record: &ReviewRecord) -> Result<()> {
        self.reviews.push(record.clone());
        Ok(())
    }
}

// ==================== SQLite store ====================

const CARD_COLUMNS: &str = "id, deck_id, fields, tags, is_active, reps, interval, ease, \
     IFNULL(learning_step_index, 0), next_due, last_reviewed, \
     card_type_id, template_front, template_back";

/// Columns added to `cards` after the first schema, with their definitions
const CARD_MIGRATIONS: &[(&str, &str)] = &[
    ("card_type_id", "INTEGER REFERENCES card_types(id)"),
    ("template_front", "TEXT"),
    ("template_back", "TEXT"),
];

/// Card store backed by a SQLite collection database
pub struct SqliteCardStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl SqliteCardStore {
    /// Open (creating if needed) the collection at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn,
            db_path: Some(db_path.to_path_buf()),
        };
        store.init_schema()?;
        log::info!("Opened collection at {:?}", db_path);
        Ok(store)
    }

    /// A throwaway collection that lives only as long as the store
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS decks (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                parent_deck_id INTEGER REFERENCES decks(id)
            );

            CREATE TABLE IF NOT EXISTS card_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                fields TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS cards (
                id INTEGER PRIMARY KEY,
                deck_id INTEGER NOT NULL REFERENCES decks(id),
                card_type_id INTEGER REFERENCES card_types(id),
                fields TEXT NOT NULL DEFAULT '{}',
                template_front TEXT,
                template_back TEXT,
                tags TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                reps INTEGER NOT NULL DEFAULT 0,
                interval REAL NOT NULL DEFAULT 0,
                ease REAL NOT NULL DEFAULT 2.5,
                learning_step_index INTEGER DEFAULT 0,
                next_due INTEGER,
                last_reviewed INTEGER
            );

            CREATE TABLE IF NOT EXISTS review_log (
                id TEXT PRIMARY KEY,
                card_id INTEGER NOT NULL,
                grade INTEGER NOT NULL,
                interval REAL NOT NULL,
                ease REAL NOT NULL,
                reviewed_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cards_deck_id ON cards(deck_id);
            CREATE INDEX IF NOT EXISTS idx_cards_next_due ON cards(next_due);
            CREATE INDEX IF NOT EXISTS idx_review_log_card_id ON review_log(card_id);
            "#,
        )?;
        self.migrate_cards()
    }

    fn migrate_cards(&self) -> Result<()> {
        let existing: BTreeSet<String> = self
            .conn
            .prepare("SELECT name FROM pragma_table_info('cards')")?
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<_>>()?;

        for (column, definition) in CARD_MIGRATIONS {
            if !existing.contains(*column) {
                self.conn.execute_batch(&format!(
                    "ALTER TABLE cards ADD COLUMN {} {}",
                    column, definition
                ))?;
                log::info!("Added column cards.{}", column);
            }
        }
        Ok(())
    }

    // ==================== Deck Operations ====================

    pub fn insert_deck(&self, name: &str, parent_deck_id: Option<DeckId>) -> Result<Deck> {
        self.conn.execute(
            "INSERT INTO decks (name, parent_deck_id) VALUES (?1, ?2)",
            params![name, parent_deck_id],
        )?;
        Ok(Deck {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            parent_deck_id,
        })
    }

    pub fn list_decks(&self) -> Result<Vec<Deck>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, parent_deck_id FROM decks ORDER BY name, id")?;
        let decks = stmt
            .query_map([], |row| {
                Ok(Deck {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    parent_deck_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decks)
    }

    // ==================== Card Type Operations ====================

    pub fn insert_card_type(&self, name: &str, fields: &[String]) -> Result<CardType> {
        self.conn.execute(
            "INSERT INTO card_types (name, fields) VALUES (?1, ?2)",
            params![name, serde_json::to_string(fields)?],
        )?;
        Ok(CardType {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            fields: fields.to_vec(),
        })
    }

    pub fn list_card_types(&self) -> Result<Vec<CardType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, fields FROM card_types ORDER BY name, id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, CardTypeId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut card_types = Vec::new();
        for row in rows {
            let (id, name, fields) = row?;
            let fields = match fields.as_deref() {
                None | Some("") => Vec::new(),
                Some(raw) => serde_json::from_str(raw)?,
            };
            card_types.push(CardType { id, name, fields });
        }
        Ok(card_types)
    }

    // ==================== Card Operations ====================

    /// Add a never-studied card
    pub fn insert_card(
        &self,
        deck_id: DeckId,
        fields: &serde_json::Map<String, serde_json::Value>,
        tags: &[String],
        starting_ease: f64,
    ) -> Result<Card> {
        let fields_json = serde_json::to_string(fields)?;
        self.conn.execute(
            "INSERT INTO cards (deck_id, fields, tags, ease) VALUES (?1, ?2, ?3, ?4)",
            params![deck_id, fields_json, tags.join(","), starting_ease],
        )?;

        let mut card = Card::new(self.conn.last_insert_rowid(), deck_id);
        card.fields = fields.clone();
        card.tags = tags.to_vec();
        card.state = SchedulingState::new(starting_ease);
        Ok(card)
    }

    /// Replace a card's content. Scheduling fields are left alone, so this
    /// never conflicts with a grade.
    pub fn update_fields(
        &self,
        card_id: CardId,
        fields: &serde_json::Map<String, serde_json::Value>,
        template_front: Option<&str>,
        template_back: Option<&str>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE cards SET fields = ?1, template_front = ?2, template_back = ?3 WHERE id = ?4",
            params![serde_json::to_string(fields)?, template_front, template_back, card_id],
        )?;
        if changed == 0 {
            return Err(FlashcardError::NotFound(card_id));
        }
        log::info!("Updated content of card {}", card_id);
        Ok(())
    }

    pub fn set_card_type(&self, card_id: CardId, card_type_id: Option<CardTypeId>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE cards SET card_type_id = ?1 WHERE id = ?2",
            params![card_type_id, card_id],
        )?;
        if changed == 0 {
            return Err(FlashcardError::NotFound(card_id));
        }
        Ok(())
    }

    pub fn delete_card(&self, card_id: CardId) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM cards WHERE id = ?1", params![card_id])?;
        if changed == 0 {
            return Err(FlashcardError::NotFound(card_id));
        }
        log::info!("Deleted card {}", card_id);
        Ok(())
    }

    /// Distinct tags across all cards, sorted
    pub fn list_tags(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tags FROM cards WHERE tags IS NOT NULL AND tags != ''")?;
        let mut tags = BTreeSet::new();
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for raw in rows {
            tags.extend(parse_tags(&raw?));
        }
        Ok(tags.into_iter().collect())
    }

    pub fn review_history(&self, card_id: CardId) -> Result<Vec<ReviewRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_id, grade, interval, ease, reviewed_at
             FROM review_log WHERE card_id = ?1 ORDER BY reviewed_at, id",
        )?;
        let rows = stmt.query_map(params![card_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, CardId>(1)?,
                row.get::<_, u8>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                timestamp_column(row, 5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, card_id, grade, interval, ease, reviewed_at) = row?;
            records.push(ReviewRecord {
                id: id.parse().map_err(|e| {
                    FlashcardError::Sqlite(rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    ))
                })?,
                card_id,
                grade: grade.try_into()?,
                interval,
                ease,
                reviewed_at: reviewed_at.ok_or(rusqlite::Error::InvalidColumnType(
                    5,
                    "reviewed_at".to_string(),
                    rusqlite::types::Type::Null,
                ))?,
            });
        }
        Ok(records)
    }

    /// Look up the stored reps after a guarded update touched no rows
    fn conflict_or_missing(&self, card_id: CardId, expected_prior_reps: u32) -> FlashcardError {
        let actual = self
            .conn
            .query_row(
                "SELECT reps FROM cards WHERE id = ?1",
                params![card_id],
                |row| row.get::<_, u32>(0),
            )
            .optional();

        match actual {
            Ok(Some(actual_reps)) => FlashcardError::ConcurrentModification {
                card_id,
                expected_reps: expected_prior_reps,
                actual_reps,
            },
            Ok(None) => FlashcardError::NotFound(card_id),
            Err(e) => e.into(),
        }
    }
}

fn to_timestamp(instant: Option<DateTime<Utc>>) -> Option<i64> {
    instant.map(|t| t.timestamp())
}

/// A nullable UNIX-seconds column. Values outside chrono's range are a
/// conversion error rather than a missing time.
fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        None => Ok(None),
        Some(secs) => DateTime::from_timestamp(secs, 0)
            .map(Some)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs)),
    }
}

fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    let id: CardId = row.get(0)?;
    let fields_json: Option<String> = row.get(2)?;
    let fields = match fields_json.as_deref() {
        None | Some("") => serde_json::Map::new(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            log::warn!("Card {} has unreadable fields: {}", id, e);
            serde_json::Map::new()
        }),
    };
    let tags: Option<String> = row.get(3)?;

    Ok(Card {
        id,
        deck_id: row.get(1)?,
        fields,
        tags: tags.as_deref().map(parse_tags).unwrap_or_default(),
        is_active: row.get(4)?,
        state: SchedulingState {
            reps: row.get(5)?,
            interval: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
            ease: row.get::<_, Option<f64>>(7)?.unwrap_or(2.5),
            learning_step_index: row.get(8)?,
            next_due: timestamp_column(row, 9)?,
            last_reviewed: timestamp_column(row, 10)?,
        },
        card_type_id: row.get(11)?,
        template_front: row.get(12)?,
        template_back: row.get(13)?,
    })
}

impl CardStore for SqliteCardStore {
    fn fetch(&self, card_id: CardId) -> Result<Card> {
        let sql = format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS);
        self.conn
            .query_row(&sql, params![card_id], card_from_row)
            .optional()?
            .ok_or(FlashcardError::NotFound(card_id))
    }

    fn persist(&mut self, card_id: CardId, state: &SchedulingState, expected_prior_reps: u32) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE cards
                SET reps = ?1, learning_step_index = ?2, next_due = ?3,
                    interval = ?4, ease = ?5, last_reviewed = ?6
              WHERE id = ?7 AND reps = ?8",
            params![
                state.reps,
                state.learning_step_index,
                to_timestamp(state.next_due),
                state.interval,
                state.ease,
                to_timestamp(state.last_reviewed),
                card_id,
                expected_prior_reps,
            ],
        )?;

        if changed == 0 {
            return Err(self.conflict_or_missing(card_id, expected_prior_reps));
        }
        Ok(())
    }

    fn query(&self, filter: &CardFilter, now: DateTime<Utc>) -> Result<Vec<Card>> {
        let mut sql = format!("SELECT {} FROM cards WHERE is_active = 1", CARD_COLUMNS);
        let mut values: Vec<Value> = Vec::new();

        if let Some(deck_ids) = &filter.deck_ids {
            if deck_ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; deck_ids.len()].join(",");
            sql.push_str(&format!(" AND deck_id IN ({})", placeholders));
            values.extend(deck_ids.iter().map(|id| Value::Integer(*id)));
        }

        // Coarse prefilter; exact membership is checked by the filter below
        if let Some(tag) = &filter.tag {
            sql.push_str(" AND tags LIKE ?");
            values.push(Value::Text(format!("%{}%", tag.trim())));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let cards = stmt
            .query_map(params_from_iter(values.iter()), card_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(filter_and_order(cards, filter, now))
    }

    fn log_review(&mut self, record: &ReviewRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO review_log (id, card_id, grade, interval, ease, reviewed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.to_string(),
                record.card_id,
                record.grade.as_u8(),
                record.interval,
                record.ease,
                record.reviewed_at.timestamp(),
            ],
        )?;
        Ok(())
    }
}
