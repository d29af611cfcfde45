use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Text styles used outside of tables.
pub enum Tone {
    Heading,
    Key,
    Highlight,
    Muted,
}

pub fn paint(text: &str, tone: Tone) -> String {
    let styled = match tone {
        Tone::Heading => style(text).bold().underlined(),
        Tone::Key => style(text).bold(),
        Tone::Highlight => style(text).green().bold(),
        Tone::Muted => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a rounded, terminal-width table with bold cyan `headers`.
pub fn table_with_headers(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| {
            Cell::new(h)
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold)
        }));
    table
}

pub fn number_cell(value: impl ToString) -> Cell {
    Cell::new(value).set_alignment(CellAlignment::Right)
}

/// Number cell, or a grey "N/A" when there is no value.
pub fn optional_number_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    match value {
        Some(v) => number_cell(format_fn(v)),
        None => number_cell("N/A").fg(Color::DarkGrey),
    }
}

/// Percentage change, green when rising and red when falling.
pub fn change_cell(change: Option<f64>) -> Cell {
    match change {
        Some(c) if c < 0.0 => number_cell(format!("{c:.2}%")).fg(Color::Red),
        Some(c) => number_cell(format!("{c:+.2}%")).fg(Color::Green),
        None => optional_number_cell(None::<f64>, |_| String::new()),
    }
}

/// Outcome of one table in a refresh or processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Updated,
    Unchanged,
    Failed,
}

pub fn status_cell(status: Status) -> Cell {
    match status {
        Status::Ok => Cell::new("ok").fg(Color::Green),
        Status::Updated => Cell::new("updated").fg(Color::Green),
        Status::Unchanged => Cell::new("unchanged").fg(Color::DarkGrey),
        Status::Failed => Cell::new("failed").fg(Color::Red),
    }
}

/// Spinner ticking until the caller clears it.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
    {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn print_separator() {
    let width = console::Term::stdout()
        .size_checked()
        .map_or(80, |(_, w)| usize::from(w));
    println!("\n{}", "─".repeat(width));
}
