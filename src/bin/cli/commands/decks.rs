use anyhow::{Context, Result};
use chrono::Utc;

use recall_lib::flashcards::due::{count_labels, deck_subtree};
use recall_lib::flashcards::LabelCounts;
use recall_lib::{CardFilter, CardStore, Deck};

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat) -> Result<()> {
    let decks = app.store.list_decks().context("Failed to list decks")?;
    let now = Utc::now();
    let cards = app
        .store
        .query(&CardFilter::new(), now)
        .context("Failed to query cards")?;

    // Counts cover each deck's whole subtree
    let subtree_counts = |deck: &Deck| -> LabelCounts {
        let ids = deck_subtree(&decks, Some(deck.id));
        count_labels(cards.iter().filter(|c| ids.contains(&c.deck_id)), now)
    };

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = decks.iter().map(|deck| {
                serde_json::json!({
                    "id": deck.id,
                    "name": deck.name,
                    "parentDeckId": deck.parent_deck_id,
                    "counts": subtree_counts(deck),
                })
            }).collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            let all = count_labels(&cards, now);
            println!("Collection ({} due / {})", all.due, all.total);

            let roots: Vec<&Deck> = decks
                .iter()
                .filter(|d| d.parent_deck_id.map_or(true, |p| !decks.iter().any(|o| o.id == p)))
                .collect();
            for (idx, deck) in roots.iter().enumerate() {
                print_deck(deck, &decks, "", idx + 1 == roots.len(), &subtree_counts);
            }
        }
    }

    Ok(())
}

fn print_deck(
    deck: &Deck,
    all_decks: &[Deck],
    prefix: &str,
    is_last: bool,
    counts: &dyn Fn(&Deck) -> LabelCounts,
) {
    let connector = if is_last { "\u{2514}\u{2500}\u{2500} " } else { "\u{251c}\u{2500}\u{2500} " };
    let c = counts(deck);
    println!("{}{}{} ({} due / {})", prefix, connector, deck.name, c.due, c.total);

    let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "\u{2502}   " });
    let children: Vec<&Deck> = all_decks
        .iter()
        .filter(|d| d.parent_deck_id == Some(deck.id) && d.id != deck.id)
        .collect();

    for (idx, child) in children.iter().enumerate() {
        print_deck(child, all_decks, &child_prefix, idx + 1 == children.len(), counts);
    }
}
