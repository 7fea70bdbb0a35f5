//! Human-readable rendering of events and errors for terminals/log files.
//!
//! Grounded on `weavegraph::telemetry` (`TelemetryFormatter`,
//! `PlainFormatter`, colorized line rendering). `tracing` remains the
//! structured logging path everywhere else in this crate; this module is
//! only for the optional pretty-print convenience the source repo offers
//! alongside it (`channels::errors::pretty_print`).

use std::io::IsTerminal;

use crate::event_bus::Event;

pub const CONTEXT_COLOR: &str = "\x1b[32m";
pub const LINE_COLOR: &str = "\x1b[35m";
pub const RESET_COLOR: &str = "\x1b[0m";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FormatterMode {
    #[default]
    Auto,
    Colored,
    Plain,
}

impl FormatterMode {
    fn colored(self) -> bool {
        match self {
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
            FormatterMode::Auto => std::io::stderr().is_terminal(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
}

pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::with_mode(FormatterMode::Auto)
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let line = if self.mode.colored() {
            format!("{LINE_COLOR}{event}{RESET_COLOR}\n")
        } else {
            format!("{event}\n")
        };
        EventRender {
            context: Some(event.channel_label().to_string()),
            lines: vec![line],
        }
    }
}

/// Render a slice of events as a single human-readable string, with
/// explicit color-mode control.
pub fn pretty_print_with_mode(events: &[Event], mode: FormatterMode) -> String {
    let formatter = PlainFormatter::with_mode(mode);
    events
        .iter()
        .map(|e| formatter.render_event(e).join_lines())
        .collect()
}

/// Render with auto-detected color support (stderr TTY check).
pub fn pretty_print(events: &[Event]) -> String {
    pretty_print_with_mode(events, FormatterMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_has_no_ansi_codes() {
        let events = vec![Event::queue_overflow("q1", 9)];
        let out = pretty_print_with_mode(&events, FormatterMode::Plain);
        assert!(!out.contains("\x1b["));
    }

    #[test]
    fn colored_mode_includes_ansi_codes() {
        let events = vec![Event::queue_overflow("q1", 9)];
        let out = pretty_print_with_mode(&events, FormatterMode::Colored);
        assert!(out.contains("\x1b["));
    }
}
