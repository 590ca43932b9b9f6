//! Review session driver
//!
//! Drives one study pass over a card store:
//! `Idle -> Presenting(card) -> AwaitingGrade(card) -> Presenting(next) | Idle`.
//!
//! The driver never edits scheduling fields itself. Every grade goes through
//! [`algorithm::next_state`] and is written back with the reps value that was
//! read, so a competing writer is detected rather than overwritten.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::algorithm;
use super::clock::Clock;
use super::config::{SchedulerConfig, SessionConfig};
use super::due::{classify, is_due, CardFilter};
use super::errors::{FlashcardError, Result};
use super::models::{Card, CardId, Grade, Label, ReviewRecord, SchedulingState};
use super::storage::CardStore;

/// Where the session currently is
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Not studying. `exhausted` is set when the session ran out of cards.
    Idle { exhausted: bool },
    /// Showing the question side
    Presenting(Card),
    /// Answer shown, waiting for a grade
    AwaitingGrade(Card),
}

/// Running totals for one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub reviewed: usize,
    pub new_introduced: usize,
    pub again: usize,
    pub hard: usize,
    pub good: usize,
    pub easy: usize,
}

impl SessionSummary {
    fn record(&mut self, grade: Grade, was_new: bool) {
        self.reviewed += 1;
        if was_new {
            self.new_introduced += 1;
        }
        match grade {
            Grade::Again => self.again += 1,
            Grade::Hard => self.hard += 1,
            Grade::Good => self.good += 1,
            Grade::Easy => self.easy += 1,
        }
    }
}

pub struct ReviewSession<S: CardStore, C: Clock> {
    store: S,
    clock: C,
    scheduler: SchedulerConfig,
    options: SessionConfig,
    filter: CardFilter,
    rng: StdRng,
    state: SessionState,
    summary: SessionSummary,
    last_graded: Option<CardId>,
}

impl<S: CardStore, C: Clock> ReviewSession<S, C> {
    pub fn new(
        store: S,
        clock: C,
        scheduler: SchedulerConfig,
        options: SessionConfig,
        filter: CardFilter,
    ) -> Self {
        Self {
            store,
            clock,
            scheduler,
            options,
            filter,
            rng: StdRng::from_entropy(),
            state: SessionState::Idle { exhausted: false },
            summary: SessionSummary::default(),
            last_graded: None,
        }
    }

    /// Use a specific RNG for interval fuzz
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The card being presented or awaiting a grade
    pub fn current(&self) -> Option<&Card> {
        match &self.state {
            SessionState::Presenting(card) | SessionState::AwaitingGrade(card) => Some(card),
            SessionState::Idle { .. } => None,
        }
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Pull the due set and present its first card
    pub fn start(&mut self) -> Result<&SessionState> {
        if !matches!(self.state, SessionState::Idle { .. }) {
            return Err(FlashcardError::InvalidSession("session already started"));
        }

        self.summary = SessionSummary::default();
        self.last_graded = None;

        let now = self.clock.now();
        self.advance(now)?;
        log::info!(
            "Review session started ({})",
            match &self.state {
                SessionState::Presenting(card) => format!("first card {}", card.id),
                _ => "nothing due".to_string(),
            }
        );
        Ok(&self.state)
    }

    /// Show the answer side of the current card
    pub fn reveal(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::Idle { exhausted: false }) {
            SessionState::Presenting(card) => {
                self.state = SessionState::AwaitingGrade(card);
                Ok(())
            }
            other => {
                self.state = other;
                Err(FlashcardError::InvalidSession("no card is being presented"))
            }
        }
    }

    /// Delays each grade would give the current card
    pub fn preview(&self) -> Result<[(Grade, Duration); 4]> {
        let card = self
            .current()
            .ok_or(FlashcardError::InvalidSession("no current card"))?;
        algorithm::preview(&card.state, &self.scheduler, self.clock.now())
    }

    /// Grade the revealed card, persist the result and move on.
    ///
    /// On error the session stays on the same card and the stored state is
    /// unchanged. Once the grade is stored this returns `Ok`; if the next
    /// card cannot be loaded the session goes `Idle { exhausted: false }`
    /// and [`resume`](Self::resume) picks up from there.
    pub fn grade(&mut self, grade: Grade) -> Result<SchedulingState> {
        let card_id = match &self.state {
            SessionState::AwaitingGrade(card) => card.id,
            SessionState::Presenting(_) => {
                return Err(FlashcardError::InvalidSession("reveal the answer before grading"))
            }
            SessionState::Idle { .. } => {
                return Err(FlashcardError::InvalidSession("no card awaiting a grade"))
            }
        };

        let now = self.clock.now();
        let (before, after) = match self.apply_grade(card_id, grade, now) {
            Err(e) if e.is_retryable() => {
                log::warn!("Card {} changed underneath the session, retrying: {}", card_id, e);
                self.apply_grade(card_id, grade, now)?
            }
            other => other?,
        };

        let was_new = classify(&before, now) == Label::New;
        self.summary.record(grade, was_new);
        if let Err(e) = self
            .store
            .log_review(&ReviewRecord::new(card_id, grade, &after, now))
        {
            log::warn!("Failed to record review of card {}: {}", card_id, e);
        }
        self.last_graded = Some(card_id);

        log::info!(
            "Graded card {} {}: {} -> {}, next due {}",
            card_id,
            grade,
            classify(&before, now),
            classify(&after, now),
            after
                .next_due
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );

        // The grade is committed; the old card must not stay gradable
        self.state = SessionState::Idle { exhausted: false };
        if let Err(e) = self.advance(now) {
            log::warn!("Failed to load the card after {}: {}", card_id, e);
        }
        Ok(after)
    }

    /// Continue an idle session without resetting its summary
    pub fn resume(&mut self) -> Result<&SessionState> {
        if !matches!(self.state, SessionState::Idle { .. }) {
            return Err(FlashcardError::InvalidSession("session is not idle"));
        }
        let now = self.clock.now();
        self.advance(now)?;
        Ok(&self.state)
    }

    /// Stop without grading the current card
    pub fn cancel(&mut self) {
        if let Some(card) = self.current() {
            log::debug!("Session cancelled on card {}", card.id);
        }
        self.state = SessionState::Idle { exhausted: false };
    }

    /// Read, compute, write guarded by the reps value just read
    fn apply_grade(
        &mut self,
        card_id: CardId,
        grade: Grade,
        now: DateTime<Utc>,
    ) -> Result<(SchedulingState, SchedulingState)> {
        let card = self.store.fetch(card_id)?;
        let next = algorithm::next_state(&card.state, grade, &self.scheduler, now, &mut self.rng)?;
        self.store.persist(card_id, &next, card.state.reps)?;
        Ok((card.state, next))
    }

    fn advance(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.state = match self.next_card(now)? {
            Some(card) => SessionState::Presenting(card),
            None => {
                log::info!(
                    "Review session finished: {} reviewed, {} new",
                    self.summary.reviewed,
                    self.summary.new_introduced
                );
                SessionState::Idle { exhausted: true }
            }
        };
        Ok(())
    }

    /// Due cards first; when none are left, learning cards coming due within
    /// the learn-ahead window. The card graded last is only repeated when
    /// nothing else qualifies.
    fn next_card(&self, now: DateTime<Utc>) -> Result<Option<Card>> {
        let candidates = self.store.query(&self.filter, now)?;

        let new_allowed = self
            .options
            .new_card_limit
            .map_or(true, |limit| self.summary.new_introduced < limit);

        let mut pool: Vec<Card> = candidates
            .iter()
            .filter(|card| is_due(&card.state, now))
            .filter(|card| new_allowed || classify(&card.state, now) != Label::New)
            .cloned()
            .collect();

        if pool.is_empty() {
            let horizon = now + Duration::seconds(i64::from(self.options.learn_ahead_secs));
            pool = candidates
                .into_iter()
                .filter(|card| {
                    matches!(classify(&card.state, now), Label::Learning | Label::Relearning)
                        && card.state.next_due.map_or(false, |due| due <= horizon)
                })
                .collect();
        }

        let pick = pool
            .iter()
            .position(|card| Some(card.id) != self.last_graded)
            .unwrap_or(0);
        Ok(pool.into_iter().nth(pick))
    }
}
