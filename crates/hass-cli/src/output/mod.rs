//! Output formatting utilities for the CLI
//!
//! Tables for entity listings, single-entity detail views, one-line event
//! summaries, and colored status messages.

use serde_json::Value;
use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use hass_core::config::AppConfig;
use hass_core::{EntityState, StateChangedEvent};

/// Format a list of entities as an ASCII table
///
/// Favorites are marked with `*`. The long view adds the last-changed
/// timestamp and the attribute count.
pub fn format_entities(entities: &[EntityState], app: &AppConfig, long: bool) -> String {
    if entities.is_empty() {
        return "No matching entities".to_string();
    }

    #[derive(Tabled)]
    struct EntityRow {
        #[tabled(rename = "")]
        favorite: &'static str,
        #[tabled(rename = "ENTITY")]
        entity_id: String,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "STATE")]
        state: String,
    }

    #[derive(Tabled)]
    struct EntityRowDetailed {
        #[tabled(rename = "")]
        favorite: &'static str,
        #[tabled(rename = "ENTITY")]
        entity_id: String,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "LAST CHANGED")]
        last_changed: String,
        #[tabled(rename = "ATTRS")]
        attributes: usize,
    }

    let marker = |e: &EntityState| if app.is_favorite(&e.entity_id) { "*" } else { "" };

    if long {
        let rows: Vec<EntityRowDetailed> = entities
            .iter()
            .map(|e| EntityRowDetailed {
                favorite: marker(e),
                entity_id: e.entity_id.clone(),
                name: truncate(e.friendly_name(), 32),
                state: format_state(e),
                last_changed: e.last_changed.clone().unwrap_or_else(|| "-".to_string()),
                attributes: e.attributes.len(),
            })
            .collect();

        Table::new(rows)
            .with(Style::rounded())
            .with(Width::wrap(120))
            .to_string()
    } else {
        let rows: Vec<EntityRow> = entities
            .iter()
            .map(|e| EntityRow {
                favorite: marker(e),
                entity_id: e.entity_id.clone(),
                name: truncate(e.friendly_name(), 32),
                state: format_state(e),
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    }
}

/// Format one entity with all of its attributes
pub fn format_entity(entity: &EntityState) -> String {
    let mut output = String::new();

    output.push_str(&format!("{} ({})\n", entity.friendly_name(), entity.entity_id));
    output.push_str(&format!("State: {}\n", format_state(entity)));
    if let Some(changed) = &entity.last_changed {
        output.push_str(&format!("Last changed: {}\n", changed));
    }
    if let Some(updated) = &entity.last_updated {
        output.push_str(&format!("Last updated: {}\n", updated));
    }

    if !entity.attributes.is_empty() {
        output.push_str("\nAttributes:\n");
        let mut keys: Vec<&String> = entity.attributes.keys().collect();
        keys.sort();
        for key in keys {
            output.push_str(&format!("  {}: {}\n", key, format_value(&entity.attributes[key])));
        }
    }

    output
}

/// One-line summary of a state change
pub fn format_state_change(change: &StateChangedEvent) -> String {
    let old = change
        .old_state
        .as_ref()
        .map(|s| s.state.as_str())
        .unwrap_or("(new)");
    let new = change
        .new_state
        .as_ref()
        .map(|s| s.state.as_str())
        .unwrap_or("(removed)");
    format!("{}: {} -> {}", change.entity_id, old, new)
}

/// One-line summary of an arbitrary event
pub fn format_event(event: &Value) -> String {
    if let Some(change) = StateChangedEvent::from_event(event) {
        return format_state_change(&change);
    }

    let event_type = event
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("event");
    match event.get("data") {
        Some(data) if !data.is_null() => format!("{}: {}", event_type, data),
        _ => event_type.to_string(),
    }
}

/// State with its unit when the entity reports one
fn format_state(entity: &EntityState) -> String {
    match entity
        .attributes
        .get("unit_of_measurement")
        .and_then(Value::as_str)
    {
        Some(unit) => format!("{} {}", entity.state, unit),
        None => entity.state.clone(),
    }
}

/// Strings without quotes, everything else as compact JSON
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
///
/// Outputs to stdout with green coloring for positive feedback to the user.
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr with red coloring for error feedback to the user.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan to stdout
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
