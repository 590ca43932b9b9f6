use anyhow::{Context, Result};

use recall_lib::CardStore;

use super::prompt;
use crate::app::App;

pub fn run(app: &App, card_id: i64, yes: bool) -> Result<()> {
    let card = app
        .store
        .fetch(card_id)
        .with_context(|| format!("Failed to load card {}", card_id))?;

    if !yes {
        let question = format!("Delete card {} \"{}\"? [y/N] ", card.id, card.preview(40));
        let confirmed = prompt(&question)?
            .map(|answer| answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
            .unwrap_or(false);
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    app.store
        .delete_card(card_id)
        .with_context(|| format!("Failed to delete card {}", card_id))?;
    println!("Deleted card {}", card_id);
    Ok(())
}
