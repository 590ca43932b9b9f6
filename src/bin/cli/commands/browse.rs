use anyhow::{Context, Result};
use chrono::Utc;

use recall_lib::flashcards::due::{classify, is_due};
use recall_lib::{CardStore, Label};

use super::format_due;
use crate::app::App;
use crate::OutputFormat;

const PREVIEW_CHARS: usize = 50;

pub fn run(
    app: &App,
    deck: Option<&str>,
    tag: Option<&str>,
    label: Option<Label>,
    due_only: bool,
    limit: usize,
    format: &OutputFormat,
) -> Result<()> {
    let filter = app.filter(deck, tag, label)?;
    let deck_names = app.deck_names()?;
    let type_names = app.card_type_names()?;
    let now = Utc::now();

    let mut cards = app.store.query(&filter, now).context("Failed to query cards")?;
    if due_only {
        cards.retain(|c| is_due(&c.state, now));
    }
    let matched = cards.len();
    cards.truncate(limit);

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = cards.iter().map(|card| {
                serde_json::json!({
                    "id": card.id,
                    "deck": deck_names.get(&card.deck_id),
                    "cardType": card.card_type_id.and_then(|id| type_names.get(&id)),
                    "state": classify(&card.state, now),
                    "due": card.state.next_due.map(|d| d.to_rfc3339()),
                    "interval": card.state.interval,
                    "ease": card.state.ease,
                    "reps": card.state.reps,
                    "tags": card.tags,
                    "fields": card.fields,
                })
            }).collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if cards.is_empty() {
                println!("No cards found.");
                return Ok(());
            }

            let deck_width = cards
                .iter()
                .filter_map(|c| deck_names.get(&c.deck_id))
                .map(|n| n.chars().count())
                .max()
                .unwrap_or(4)
                .max(4);
            let type_width = cards
                .iter()
                .filter_map(|c| c.card_type_id.and_then(|id| type_names.get(&id)))
                .map(|n| n.chars().count())
                .max()
                .unwrap_or(4)
                .max(4);

            println!(
                "{:>6}  {:<16}  {:<14}  {:<dw$}  {:<tw$}  Front",
                "ID", "Due", "State", "Deck", "Type", dw = deck_width, tw = type_width
            );
            println!(
                "{}  {}  {}  {}  {}  {}",
                "\u{2500}".repeat(6),
                "\u{2500}".repeat(16),
                "\u{2500}".repeat(14),
                "\u{2500}".repeat(deck_width),
                "\u{2500}".repeat(type_width),
                "\u{2500}".repeat(PREVIEW_CHARS)
            );

            for card in &cards {
                let deck_name = deck_names.get(&card.deck_id).map(String::as_str).unwrap_or("?");
                let type_name = card
                    .card_type_id
                    .and_then(|id| type_names.get(&id))
                    .map(String::as_str)
                    .unwrap_or("");
                println!(
                    "{:>6}  {:<16}  {:<14}  {:<dw$}  {:<tw$}  {}",
                    card.id,
                    format_due(card.state.next_due),
                    classify(&card.state, now).as_str(),
                    deck_name,
                    type_name,
                    card.preview(PREVIEW_CHARS).replace('\n', " "),
                    dw = deck_width,
                    tw = type_width
                );
            }

            if matched > cards.len() {
                println!("\n{} of {} cards shown", cards.len(), matched);
            } else {
                println!("\n{} cards total", matched);
            }
        }
    }

    Ok(())
}
