//! Due queries: lifecycle classification, filtering and ordering
//!
//! Nothing here caches; calling again with a later `now` re-derives
//! everything from the stored card fields.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{Card, Deck, DeckId, Label, LabelCounts, SchedulingState};

/// Lifecycle label of a card at `now`
pub fn classify(state: &SchedulingState, now: DateTime<Utc>) -> Label {
    if state.reps == 0 {
        if state.learning_step_index == 0 && state.next_due.is_none() {
            Label::New
        } else {
            Label::Learning
        }
    } else if state.learning_step_index > 0 {
        Label::Relearning
    } else {
        match state.next_due {
            Some(due) if due > now => Label::ReviewNotDue,
            _ => Label::Review,
        }
    }
}

/// Whether a card can be studied at `now`. Unscheduled (new) cards always can.
pub fn is_due(state: &SchedulingState, now: DateTime<Utc>) -> bool {
    state.next_due.map_or(true, |due| due <= now)
}

/// Due order: earliest `next_due` first, unscheduled cards last, card id
/// breaking ties
pub fn due_order(a: &Card, b: &Card) -> Ordering {
    let key = |c: &Card| (c.state.next_due.is_none(), c.state.next_due, c.id);
    key(a).cmp(&key(b))
}

/// Conjunctive narrowing predicates. An empty filter matches every card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFilter {
    /// Allowed decks; `None` means the whole collection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck_ids: Option<BTreeSet<DeckId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

impl CardFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decks(mut self, deck_ids: BTreeSet<DeckId>) -> Self {
        self.deck_ids = Some(deck_ids);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn matches(&self, card: &Card, now: DateTime<Utc>) -> bool {
        if let Some(deck_ids) = &self.deck_ids {
            if !deck_ids.contains(&card.deck_id) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !card.has_tag(tag) {
                return false;
            }
        }
        if let Some(label) = self.label {
            if classify(&card.state, now) != label {
                return false;
            }
        }
        true
    }
}

/// Cards matching `filter`, in due order
pub fn select<'a, I>(cards: I, now: DateTime<Utc>, filter: &CardFilter) -> Vec<&'a Card>
where
    I: IntoIterator<Item = &'a Card>,
{
    let mut selected: Vec<&Card> = cards
        .into_iter()
        .filter(|card| filter.matches(card, now))
        .collect();
    selected.sort_by(|a, b| due_order(a, b));
    selected
}

/// Cards matching `filter` that can be studied at `now`, in due order
pub fn due<'a, I>(cards: I, now: DateTime<Utc>, filter: &CardFilter) -> Vec<&'a Card>
where
    I: IntoIterator<Item = &'a Card>,
{
    let mut selected = select(cards, now, filter);
    selected.retain(|card| is_due(&card.state, now));
    selected
}

/// Count cards per lifecycle label
pub fn count_labels<'a, I>(cards: I, now: DateTime<Utc>) -> LabelCounts
where
    I: IntoIterator<Item = &'a Card>,
{
    let mut counts = LabelCounts::default();

    for card in cards {
        counts.total += 1;
        match classify(&card.state, now) {
            Label::New => counts.new += 1,
            Label::Learning => counts.learning += 1,
            Label::Relearning => counts.relearning += 1,
            Label::Review => counts.review += 1,
            Label::ReviewNotDue => counts.review_not_due += 1,
        }
        if is_due(&card.state, now) {
            counts.due += 1;
        }
    }

    counts
}

/// The deck and all of its descendants. `None` selects every deck.
pub fn deck_subtree(decks: &[Deck], root: Option<DeckId>) -> BTreeSet<DeckId> {
    let Some(root) = root else {
        return decks.iter().map(|d| d.id).collect();
    };

    let mut children: HashMap<Option<DeckId>, Vec<DeckId>> = HashMap::new();
    for deck in decks {
        children.entry(deck.parent_deck_id).or_default().push(deck.id);
    }

    let mut result = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(deck_id) = stack.pop() {
        // Guard against parent cycles in hand-edited data
        if !result.insert(deck_id) {
            continue;
        }
        if let Some(kids) = children.get(&Some(deck_id)) {
            stack.extend(kids.iter().copied());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn card(id: i64, deck_id: i64, due_in: Option<i64>, reps: u32) -> Card {
        let mut card = Card::new(id, deck_id);
        card.state.reps = reps;
        card.state.next_due = due_in.map(|m| now() + Duration::minutes(m));
        card
    }

    fn deck(id: i64, parent: Option<i64>) -> Deck {
        Deck {
            id,
            name: format!("Deck {}", id),
            parent_deck_id: parent,
        }
    }

    #[test]
    fn test_classify_labels() {
        let new = SchedulingState::default();
        assert_eq!(classify(&new, now()), Label::New);

        let stepping = SchedulingState {
            learning_step_index: 1,
            ..SchedulingState::default()
        };
        assert_eq!(classify(&stepping, now()), Label::Learning);

        let scheduled_once = SchedulingState {
            next_due: Some(now() + Duration::minutes(1)),
            ..SchedulingState::default()
        };
        assert_eq!(classify(&scheduled_once, now()), Label::Learning);

        let lapsed = SchedulingState {
            reps: 3,
            learning_step_index: 1,
            next_due: Some(now()),
            ..SchedulingState::default()
        };
        assert_eq!(classify(&lapsed, now()), Label::Relearning);

        let review = SchedulingState {
            reps: 3,
            next_due: Some(now()),
            ..SchedulingState::default()
        };
        assert_eq!(classify(&review, now()), Label::Review);
        assert_eq!(classify(&review, now() - Duration::seconds(1)), Label::ReviewNotDue);
    }

    #[test]
    fn test_classify_is_repeatable() {
        let state = SchedulingState {
            reps: 2,
            next_due: Some(now()),
            ..SchedulingState::default()
        };
        assert_eq!(classify(&state, now()), classify(&state, now()));
    }

    #[test]
    fn test_due_ordering_puts_new_cards_last() {
        let cards = vec![
            card(5, 1, None, 0),
            card(3, 1, Some(-5), 2),
            card(4, 2, None, 0),
            card(1, 1, Some(-30), 1),
            card(2, 2, Some(-5), 1),
            card(6, 1, Some(30), 1),
        ];

        let ids: Vec<i64> = due(&cards, now(), &CardFilter::new()).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let all: Vec<i64> = select(&cards, now(), &CardFilter::new()).iter().map(|c| c.id).collect();
        assert_eq!(all, vec![1, 2, 3, 6, 4, 5]);
    }

    #[test]
    fn test_new_cards_last_under_every_filter() {
        let mut cards = Vec::new();
        for id in 0..24 {
            let due_in = if id % 3 == 0 { None } else { Some(-(id % 7)) };
            let mut c = card(id, id % 2, due_in, (id % 2) as u32);
            if id % 4 == 0 {
                c.tags.push("verbs".to_string());
            }
            cards.push(c);
        }

        let filters = [
            CardFilter::new(),
            CardFilter::new().with_tag("verbs"),
            CardFilter::new().with_decks([0].into_iter().collect()),
            CardFilter::new().with_decks([1].into_iter().collect()).with_tag("verbs"),
        ];
        for filter in &filters {
            let result = due(&cards, now(), filter);
            let first_unscheduled = result.iter().position(|c| c.state.next_due.is_none());
            if let Some(pos) = first_unscheduled {
                assert!(result[pos..].iter().all(|c| c.state.next_due.is_none()));
            }
            assert!(result.iter().all(|c| filter.matches(c, now())));
        }
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let mut a = card(1, 1, Some(-1), 1);
        a.tags = vec!["verbs".to_string()];
        let mut b = card(2, 2, Some(-1), 1);
        b.tags = vec!["verbs".to_string()];
        let c = card(3, 1, None, 0);
        let cards = vec![a, b, c];

        let filter = CardFilter::new()
            .with_decks([1].into_iter().collect())
            .with_tag("verbs")
            .with_label(Label::Review);
        let ids: Vec<i64> = select(&cards, now(), &filter).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1]);

        let new_only = CardFilter::new().with_label(Label::New);
        let ids: Vec<i64> = select(&cards, now(), &new_only).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_count_labels() {
        let cards = vec![
            card(1, 1, None, 0),
            card(2, 1, Some(-1), 0),
            card(3, 1, Some(-1), 4),
            card(4, 1, Some(60), 4),
        ];
        let counts = count_labels(&cards, now());
        assert_eq!(counts.total, 4);
        assert_eq!(counts.new, 1);
        assert_eq!(counts.learning, 1);
        assert_eq!(counts.review, 1);
        assert_eq!(counts.review_not_due, 1);
        assert_eq!(counts.due, 3);
    }

    #[test]
    fn test_deck_subtree() {
        let decks = vec![
            deck(1, None),
            deck(2, Some(1)),
            deck(3, Some(2)),
            deck(4, None),
            deck(5, Some(4)),
        ];

        let sub: Vec<i64> = deck_subtree(&decks, Some(1)).into_iter().collect();
        assert_eq!(sub, vec![1, 2, 3]);

        let leaf: Vec<i64> = deck_subtree(&decks, Some(3)).into_iter().collect();
        assert_eq!(leaf, vec![3]);

        assert_eq!(deck_subtree(&decks, None).len(), 5);
    }

    #[test]
    fn test_deck_subtree_survives_cycles() {
        let decks = vec![deck(1, Some(2)), deck(2, Some(1))];
        let sub: Vec<i64> = deck_subtree(&decks, Some(1)).into_iter().collect();
        assert_eq!(sub, vec![1, 2]);
    }
}
