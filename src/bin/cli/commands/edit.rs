use anyhow::{bail, Context, Result};

use recall_lib::CardStore;

use crate::app::App;
use crate::OutputFormat;

/// Overwrite named fields and, when given, the templates. Everything not
/// mentioned keeps its stored value.
pub fn run(
    app: &App,
    card_id: i64,
    assignments: &[String],
    template_front: Option<&str>,
    template_back: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    if assignments.is_empty() && template_front.is_none() && template_back.is_none() {
        bail!("Nothing to change. Use --set NAME=VALUE, --front or --back");
    }

    let card = app
        .store
        .fetch(card_id)
        .with_context(|| format!("Failed to load card {}", card_id))?;

    let mut fields = card.fields.clone();
    for assignment in assignments {
        let (name, value) = parse_assignment(assignment)?;
        fields.insert(name.to_string(), value.into());
    }
    let front = template_front.or(card.template_front.as_deref());
    let back = template_back.or(card.template_back.as_deref());

    app.store
        .update_fields(card_id, &fields, front, back)
        .with_context(|| format!("Failed to update card {}", card_id))?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "id": card_id,
                "fields": fields,
                "templateFront": front,
                "templateBack": back,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Updated card {}", card_id);
        }
    }

    Ok(())
}

fn parse_assignment(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => bail!("Expected NAME=VALUE, got '{}'", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("Back=dog").unwrap(), ("Back", "dog"));
        assert_eq!(parse_assignment(" Back =a=b").unwrap(), ("Back", "a=b"));
        assert_eq!(parse_assignment("Back=").unwrap(), ("Back", ""));
        assert!(parse_assignment("=dog").is_err());
        assert!(parse_assignment("dog").is_err());
    }
}
