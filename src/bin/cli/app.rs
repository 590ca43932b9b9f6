use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use recall_lib::flashcards::due::deck_subtree;
use recall_lib::flashcards::{CardTypeId, DeckId, Label};
use recall_lib::{AppConfig, CardFilter, Deck, SqliteCardStore};

/// Shared application state for CLI commands
pub struct App {
    pub config: AppConfig,
    pub store: SqliteCardStore,
}

impl App {
    /// Load the config and open the collection. `db_override` wins over the
    /// config's `database` key.
    pub fn new(db_override: Option<&Path>, config_override: Option<&Path>) -> Result<Self> {
        let config = match config_override {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => match AppConfig::default_path() {
                Some(path) => AppConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => AppConfig::default(),
            },
        };

        let db_path = match db_override {
            Some(path) => path.to_path_buf(),
            None => config
                .database_path()
                .context("Failed to get data directory")?,
        };

        let store = SqliteCardStore::open(&db_path)
            .with_context(|| format!("Failed to open collection {}", db_path.display()))?;

        Ok(Self { config, store })
    }

    /// Find a deck by name (case-insensitive prefix match)
    pub fn find_deck(&self, name: &str) -> Result<Deck> {
        let decks = self.store.list_decks().context("Failed to list decks")?;

        let name_lower = name.to_lowercase();

        // Exact match first
        if let Some(deck) = decks.iter().find(|d| d.name.to_lowercase() == name_lower) {
            return Ok(deck.clone());
        }

        let matches: Vec<&Deck> = decks
            .iter()
            .filter(|d| d.name.to_lowercase().starts_with(&name_lower))
            .collect();

        match matches.len() {
            0 => bail!("No deck matching '{}'. Available decks:\n{}", name,
                decks.iter().map(|d| format!("  - {}", d.name)).collect::<Vec<_>>().join("\n")),
            1 => Ok(matches[0].clone()),
            _ => bail!("Ambiguous deck name '{}'. Matches:\n{}", name,
                matches.iter().map(|d| format!("  - {}", d.name)).collect::<Vec<_>>().join("\n")),
        }
    }

    /// Build a filter from command-line narrowing options. A deck selects its
    /// whole subtree.
    pub fn filter(&self, deck: Option<&str>, tag: Option<&str>, label: Option<Label>) -> Result<CardFilter> {
        let mut filter = CardFilter::new();

        if let Some(name) = deck {
            let root = self.find_deck(name)?;
            let decks = self.store.list_decks().context("Failed to list decks")?;
            filter = filter.with_decks(deck_subtree(&decks, Some(root.id)));
        }
        if let Some(tag) = tag {
            filter = filter.with_tag(tag.trim());
        }
        if let Some(label) = label {
            filter = filter.with_label(label);
        }

        Ok(filter)
    }

    pub fn deck_names(&self) -> Result<HashMap<DeckId, String>> {
        let decks = self.store.list_decks().context("Failed to list decks")?;
        Ok(decks.into_iter().map(|d| (d.id, d.name)).collect())
    }

    pub fn card_type_names(&self) -> Result<HashMap<CardTypeId, String>> {
        let card_types = self.store.list_card_types().context("Failed to list card types")?;
        Ok(card_types.into_iter().map(|t| (t.id, t.name)).collect())
    }
}
