use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use recall_lib::flashcards::algorithm::override_due;
use recall_lib::CardStore;

use super::format_due;
use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &mut App, card_id: i64, when: &str, format: &OutputFormat) -> Result<()> {
    let due = parse_when(when)?;
    let now = Utc::now();

    let card = app
        .store
        .fetch(card_id)
        .with_context(|| format!("Failed to load card {}", card_id))?;
    let next = override_due(&card.state, due, now)?;
    app.store
        .persist(card_id, &next, card.state.reps)
        .with_context(|| format!("Failed to update card {}", card_id))?;

    log::info!("Card {} due date set to {}", card_id, due.to_rfc3339());

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "id": card_id,
                "due": due.to_rfc3339(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Card {} now due {}", card_id, format_due(Some(due)));
        }
    }

    Ok(())
}

/// RFC 3339, or a local "YYYY-MM-DD HH:MM" / "YYYY-MM-DD" (midnight)
fn parse_when(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        dt
    } else if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0).context("Invalid time of day")?
    } else {
        bail!("Unrecognized date '{}'. Use YYYY-MM-DD, \"YYYY-MM-DD HH:MM\" or RFC 3339", input);
    };

    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("'{}' does not exist in the local time zone", input))?;
    Ok(local.with_timezone(&Utc))
}
