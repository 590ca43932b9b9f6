use anyhow::{Context, Result};
use chrono::Utc;

use recall_lib::flashcards::due::count_labels;
use recall_lib::CardStore;

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, deck: Option<&str>, format: &OutputFormat) -> Result<()> {
    let filter = app.filter(deck, None, None)?;
    let now = Utc::now();
    let cards = app.store.query(&filter, now).context("Failed to query cards")?;
    let counts = count_labels(&cards, now);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        OutputFormat::Plain => {
            let rows = [
                ("New", counts.new),
                ("Learning", counts.learning),
                ("Relearning", counts.relearning),
                ("Review (due)", counts.review),
                ("Review (not due)", counts.review_not_due),
            ];

            println!("{:<17} Cards", "State");
            println!("{} {}", "\u{2500}".repeat(17), "\u{2500}".repeat(6));
            for (name, count) in rows {
                println!("{:<17} {}", name, count);
            }

            println!("\n{} due now, {} total", counts.due, counts.total);
        }
    }

    Ok(())
}
