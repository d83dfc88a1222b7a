//! Output formatting: table or JSON, plus the stderr progress spinner.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde.

use std::io::{self, IsTerminal, Write};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use ledgerlink_core::model::LoanStatus;
use ledgerlink_core::{LoadingCoordinator, NotificationEvent, Subscription};

use crate::cli::OutputFormat;
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Color only when stdout is a terminal and `NO_COLOR` is unset.
pub fn should_color() -> bool {
    io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

pub fn loan_status(status: &LoanStatus, color: bool) -> String {
    let label = status.to_string();
    if !color {
        return label;
    }
    match status {
        LoanStatus::Approved => label.green().to_string(),
        LoanStatus::Rejected => label.red().to_string(),
        LoanStatus::Pending => label.yellow().to_string(),
        LoanStatus::Closed | LoanStatus::Unknown => label.dimmed().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(Table::new(rows).with(Style::rounded()).to_string())
        }
        OutputFormat::Json | OutputFormat::JsonCompact => render_json(format, data),
    }
}

/// Render a single item. Table mode uses `detail_fn` for a key/value view.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json | OutputFormat::JsonCompact => render_json(format, data),
    }
}

/// JSON in either layout; table mode falls back to pretty JSON.
pub fn render_json<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    let rendered = match format {
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Json | OutputFormat::Table => serde_json::to_string_pretty(data)?,
    };
    Ok(rendered)
}

/// Print rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// One notification, as a line for `watch`.
pub fn render_event(format: OutputFormat, event: &NotificationEvent, color: bool) -> String {
    match format {
        OutputFormat::Table => {
            let when = event.timestamp.as_deref().unwrap_or("-");
            if color {
                format!("{} {} {}", when.dimmed(), event.kind.cyan().bold(), event.message)
            } else {
                format!("{when} {} {}", event.kind, event.message)
            }
        }
        OutputFormat::Json | OutputFormat::JsonCompact => {
            serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
        }
    }
}

// ── Spinner ──────────────────────────────────────────────────────────

/// Show a spinner on stderr while the coordinator reports work in flight.
/// Returns `None` when stderr is not a terminal.
pub fn attach_spinner(loading: &LoadingCoordinator) -> Option<Subscription> {
    if !io::stderr().is_terminal() {
        return None;
    }

    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let active: Mutex<Option<ProgressBar>> = Mutex::new(None);

    Some(loading.subscribe(move |state| {
        let Ok(mut active) = active.lock() else {
            return;
        };
        if state.is_busy() {
            let bar = active.get_or_insert_with(|| {
                let bar = ProgressBar::new_spinner().with_style(style.clone());
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            });
            bar.set_message(state.message.clone().unwrap_or_else(|| "Working...".into()));
        } else if let Some(bar) = active.take() {
            bar.finish_and_clear();
        }
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Item {
        id: u32,
        name: &'static str,
    }

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: u32,
        #[tabled(rename = "Name")]
        name: &'static str,
    }

    fn items() -> Vec<Item> {
        vec![Item { id: 1, name: "alpha" }, Item { id: 2, name: "beta" }]
    }

    fn row(item: &Item) -> ItemRow {
        ItemRow {
            id: item.id,
            name: item.name,
        }
    }

    #[test]
    fn table_has_headers_and_rows() {
        let out = render_list(OutputFormat::Table, &items(), row).unwrap();
        assert!(out.contains("ID") && out.contains("Name"));
        assert!(out.contains("alpha") && out.contains("beta"));
    }

    #[test]
    fn compact_json_is_one_line() {
        let out = render_list(OutputFormat::JsonCompact, &items(), row).unwrap();
        assert_eq!(out, r#"[{"id":1,"name":"alpha"},{"id":2,"name":"beta"}]"#);
    }

    #[test]
    fn status_without_color_is_plain() {
        assert_eq!(loan_status(&LoanStatus::Approved, false), "APPROVED");
    }

    #[test]
    fn event_line_without_color() {
        let mut event = NotificationEvent::local("TRANSFER", "You received 50.00");
        event.timestamp = Some("2026-03-01T10:00:00Z".into());
        assert_eq!(
            render_event(OutputFormat::Table, &event, false),
            "2026-03-01T10:00:00Z TRANSFER You received 50.00"
        );
    }
}
