use anyhow::{Context, Result};

use recall_lib::flashcards::algorithm::format_interval;
use recall_lib::flashcards::due::classify;
use recall_lib::flashcards::SessionSummary;
use recall_lib::{Card, Clock, Grade, ReviewSession, SessionState, SqliteCardStore, SystemClock};

use super::prompt;
use crate::app::App;
use crate::OutputFormat;

pub fn run(app: App, deck: Option<&str>, tag: Option<&str>, format: &OutputFormat) -> Result<()> {
    let filter = app.filter(deck, tag, None)?;
    let App { config, store } = app;

    let mut session = ReviewSession::new(store, SystemClock, config.scheduler, config.session, filter);
    session.start().context("Failed to start review session")?;

    loop {
        let card = match session.state() {
            SessionState::Idle { exhausted } => {
                if *exhausted {
                    println!("Nothing left to review.");
                }
                break;
            }
            SessionState::Presenting(card) | SessionState::AwaitingGrade(card) => card.clone(),
        };

        print_question(&card);
        if matches!(session.state(), SessionState::Presenting(_)) {
            match prompt("[Enter] show answer, [q] quit: ")? {
                Some(input) if input.eq_ignore_ascii_case("q") => {
                    session.cancel();
                    break;
                }
                None => {
                    session.cancel();
                    break;
                }
                Some(_) => {}
            }
            session.reveal()?;
        }

        print_answer(&card);
        if !grade_current(&mut session)? {
            session.cancel();
            break;
        }
    }

    print_summary(session.summary(), format)
}

/// Ask until a grade is accepted. `false` when the user quits.
fn grade_current<C: Clock>(session: &mut ReviewSession<SqliteCardStore, C>) -> Result<bool> {
    let choices = session
        .preview()?
        .iter()
        .map(|(grade, delay)| format!("[{}] {} ({})", grade.as_u8(), grade, format_interval(*delay)))
        .collect::<Vec<_>>()
        .join("  ");

    loop {
        let input = match prompt(&format!("{}  [q] quit: ", choices))? {
            Some(input) => input,
            None => return Ok(false),
        };
        if input.eq_ignore_ascii_case("q") {
            return Ok(false);
        }

        let grade: Grade = match input.parse() {
            Ok(grade) => grade,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        session
            .grade(grade)
            .with_context(|| format!("Failed to grade card as {}", grade))?;
        if matches!(session.state(), SessionState::Idle { exhausted: false }) {
            session.resume().context("Failed to load the next card")?;
        }
        return Ok(true);
    }
}

fn print_question(card: &Card) {
    let now = chrono::Utc::now();
    println!();
    println!("Card {} [{}]", card.id, classify(&card.state, now));
    if let Some((name, value)) = card.fields.iter().next() {
        println!("{}: {}", name, field_text(value));
    }
}

fn print_answer(card: &Card) {
    println!("{}", "\u{2500}".repeat(40));
    for (name, value) in card.fields.iter().skip(1) {
        println!("{}: {}", name, field_text(value));
    }
    if !card.tags.is_empty() {
        println!("tags: {}", card.tags.join(", "));
    }
}

fn field_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_summary(summary: &SessionSummary, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Plain => {
            println!();
            println!(
                "Reviewed {} cards ({} new): again {}, hard {}, good {}, easy {}",
                summary.reviewed,
                summary.new_introduced,
                summary.again,
                summary.hard,
                summary.good,
                summary.easy
            );
        }
    }
    Ok(())
}
