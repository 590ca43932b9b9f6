pub mod browse;
pub mod decks;
pub mod delete;
pub mod edit;
pub mod review;
pub mod set_due;
pub mod stats;
pub mod tags;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

/// Print `message` and read one line from stdin. `None` on end of input.
pub fn prompt(message: &str) -> Result<Option<String>> {
    print!("{}", message);
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Local wall-clock rendering of a due date; unscheduled cards show "new"
pub fn format_due(due: Option<DateTime<Utc>>) -> String {
    match due {
        Some(due) => due.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "new".to_string(),
    }
}
