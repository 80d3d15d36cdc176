// 📋 Error Log - Ordered discrepancy reporting
// Collects (name, message, details) entries in call order and writes
// them out as a tab-separated log at the end of a run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

// ============================================================================
// LOG ENTRY
// ============================================================================

/// One reported discrepancy. Entries are append-only and never deduplicated;
/// the log order is the call order.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Taxon name the entry is about
    pub name: String,

    /// Human-readable description of the discrepancy
    pub message: String,

    /// Optional detail values (e.g. the two values that disagree)
    pub details: Vec<String>,
}

impl LogEntry {
    /// Render as one tab-separated line
    pub fn as_tsv(&self) -> String {
        let mut fields = vec![self.name.clone(), self.message.clone()];
        fields.extend(self.details.iter().cloned());
        fields.join("\t")
    }
}

// ============================================================================
// ERROR LOG
// ============================================================================

/// Run-scoped discrepancy log. Constructed fresh per run and owned by the
/// driver; every reconciler appends through it.
pub struct ErrorLog {
    entries: Vec<LogEntry>,
    echo: bool,
    started_at: DateTime<Utc>,
}

impl ErrorLog {
    /// Create a new empty log. When `echo` is set, each entry is also
    /// printed to the console as it is recorded.
    pub fn new(echo: bool) -> Self {
        ErrorLog {
            entries: Vec::new(),
            echo,
            started_at: Utc::now(),
        }
    }

    /// Record an entry with no detail values
    pub fn log(&mut self, name: &str, message: &str) {
        self.log_with(name, message, &[]);
    }

    /// Record an entry with detail values. Missing values show as "-" so
    /// the columns of the written log stay aligned.
    pub fn log_with(&mut self, name: &str, message: &str, details: &[Option<&str>]) {
        let details: Vec<String> = details
            .iter()
            .map(|d| d.unwrap_or("-").to_string())
            .collect();
        let entry = LogEntry {
            name: name.to_string(),
            message: message.to_string(),
            details,
        };
        if self.echo {
            println!("{}", entry.as_tsv().replace('\t', " "));
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Count entries recorded for a given taxon name
    pub fn count_for(&self, name: &str) -> usize {
        self.entries.iter().filter(|e| e.name == name).count()
    }

    /// Write the log as a TSV file, one entry per line, in call order
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let lines: Vec<String> = self.entries.iter().map(|e| e.as_tsv()).collect();
        fs::write(path.as_ref(), lines.join("\n"))
            .with_context(|| format!("Failed to write log file: {:?}", path.as_ref()))?;
        Ok(())
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(false)
    }
}

// ============================================================================
// TESTS
// ============================================================================
