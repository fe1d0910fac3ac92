use chrono::{DateTime, Local};
use std::fmt;

/// Where a history line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Stdout,
    Stderr,
    System,
}

impl LineKind {
    pub fn label(&self) -> &'static str {
        match self {
            LineKind::Stdout => "stdout",
            LineKind::Stderr => "stderr",
            LineKind::System => "system",
        }
    }
}

/// A display line derived from run events
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub kind: LineKind,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl Line {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self::new_with_time(kind, text, Local::now())
    }

    /// Create a line with a specific timestamp (for tests)
    pub fn new_with_time(kind: LineKind, text: impl Into<String>, time: DateTime<Local>) -> Self {
        Self {
            kind,
            text: text.into(),
            timestamp: time,
        }
    }

    /// Timestamp formatted as HH:MM:SS
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }

    /// Text with ANSI escape sequences removed
    pub fn stripped_text(&self) -> String {
        let stripped = strip_ansi_escapes::strip(self.text.as_bytes());
        String::from_utf8_lossy(&stripped).into_owned()
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.formatted_timestamp(), self.text)
    }
}

/// Append-only, ordered line history of the current run
#[derive(Debug, Clone, Default)]
pub struct LineHistory {
    lines: Vec<Line>,
}

impl LineHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: Line) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Lines appended after the first `seen`
    pub fn since(&self, seen: usize) -> &[Line] {
        self.lines.get(seen..).unwrap_or(&[])
    }

    pub fn last(&self) -> Option<&Line> {
        self.lines.last()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
