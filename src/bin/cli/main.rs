mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use recall_lib::Label;

#[derive(Parser)]
#[command(name = "recall-cli", about = "Recall flashcard browser and reviewer", version)]
struct Cli {
    /// Collection database (default: from config, then the data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (default: ~/.config/recall/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Lifecycle state filter
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StateArg {
    New,
    Learning,
    Relearning,
    Review,
    ReviewNotDue,
}

impl From<StateArg> for Label {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::New => Label::New,
            StateArg::Learning => Label::Learning,
            StateArg::Relearning => Label::Relearning,
            StateArg::Review => Label::Review,
            StateArg::ReviewNotDue => Label::ReviewNotDue,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List cards, earliest due first
    Browse {
        /// Deck name (case-insensitive prefix match); includes sub-decks
        #[arg(long)]
        deck: Option<String>,
        /// Only cards carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Only cards in this lifecycle state
        #[arg(long)]
        state: Option<StateArg>,
        /// Only cards that can be studied now
        #[arg(long)]
        due: bool,
        /// Maximum rows
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Study due cards interactively
    Review {
        /// Deck name (case-insensitive prefix match); includes sub-decks
        #[arg(long)]
        deck: Option<String>,
        /// Only cards carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Card counts per lifecycle state
    Stats {
        /// Deck name (case-insensitive prefix match); includes sub-decks
        #[arg(long)]
        deck: Option<String>,
    },

    /// Show the deck tree
    Decks,

    /// List tags in use
    Tags,

    /// Move a card's due date (RFC 3339, "YYYY-MM-DD HH:MM" or "YYYY-MM-DD", local time)
    SetDue {
        card_id: i64,
        when: String,
    },

    /// Edit a card's fields or templates
    Edit {
        card_id: i64,
        /// Field assignment NAME=VALUE (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        assignments: Vec<String>,
        /// Front template
        #[arg(long)]
        front: Option<String>,
        /// Back template
        #[arg(long)]
        back: Option<String>,
    },

    /// Delete a card
    Delete {
        card_id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut app = app::App::new(cli.db.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Command::Browse { deck, tag, state, due, limit } => {
            commands::browse::run(
                &app,
                deck.as_deref(),
                tag.as_deref(),
                state.map(Label::from),
                due,
                limit,
                &cli.format,
            )?;
        }
        Command::Review { deck, tag } => {
            commands::review::run(app, deck.as_deref(), tag.as_deref(), &cli.format)?;
        }
        Command::Stats { deck } => {
            commands::stats::run(&app, deck.as_deref(), &cli.format)?;
        }
        Command::Decks => {
            commands::decks::run(&app, &cli.format)?;
        }
        Command::Tags => {
            commands::tags::run(&app, &cli.format)?;
        }
        Command::SetDue { card_id, when } => {
            commands::set_due::run(&mut app, card_id, &when, &cli.format)?;
        }
        Command::Edit { card_id, assignments, front, back } => {
            commands::edit::run(
                &app,
                card_id,
                &assignments,
                front.as_deref(),
                back.as_deref(),
                &cli.format,
            )?;
        }
        Command::Delete { card_id, yes } => {
            commands::delete::run(&app, card_id, yes)?;
        }
    }

    Ok(())
}
