use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;

use recall_lib::{CardFilter, CardStore};

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat) -> Result<()> {
    let names = app.store.list_tags().context("Failed to list tags")?;
    let cards = app
        .store
        .query(&CardFilter::new(), Utc::now())
        .context("Failed to query cards")?;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in cards.iter().flat_map(|c| c.tags.iter()) {
        *counts.entry(tag.as_str()).or_default() += 1;
    }

    // Inactive-only tags still appear, with a zero count
    let mut tags: Vec<(&str, usize)> = names
        .iter()
        .map(|t| (t.as_str(), counts.get(t.as_str()).copied().unwrap_or(0)))
        .collect();

    // Sort by count descending
    tags.sort_by(|a, b| b.1.cmp(&a.1));

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = tags.iter().map(|(tag, count)| {
                serde_json::json!({
                    "tag": tag,
                    "count": count,
                })
            }).collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if tags.is_empty() {
                println!("No tags found.");
                return Ok(());
            }

            let max_tag_len = tags.iter().map(|(t, _)| t.len()).max().unwrap_or(5).max(5);

            println!("{:<width$} Cards", "Tag", width = max_tag_len + 1);
            println!("{} {}", "\u{2500}".repeat(max_tag_len + 1), "\u{2500}".repeat(6));

            for (tag, count) in &tags {
                println!("#{:<width$} {}", tag, count, width = max_tag_len);
            }

            println!("\n{} tags total", tags.len());
        }
    }

    Ok(())
}
