//! Writing merged entries to the terminal

use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use kubemerge_logs::{CompiledFilter, LogEntry};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `<pod>: <message>` lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    source: &'a str,
    timestamp: &'a DateTime<Utc>,
    message: &'a str,
}

/// Build the `--grep` filter, if one was requested
pub fn build_filter(pattern: Option<&str>, ignore_case: bool, invert: bool) -> Result<Option<CompiledFilter>> {
    let Some(pattern) = pattern else {
        return Ok(None);
    };

    let filter = if ignore_case {
        CompiledFilter::new_case_insensitive(pattern)
    } else {
        CompiledFilter::new(pattern)
    }
    .with_context(|| format!("Invalid --grep pattern '{}'", pattern))?;

    Ok(Some(if invert { filter.inverted() } else { filter }))
}

/// Writes entries and remembers the first write failure
///
/// A failed write (e.g. a closed pipe) cancels the run so that readers stop.
pub struct Renderer<W: Write> {
    out: W,
    format: OutputFormat,
    timestamps: bool,
    filter: Option<CompiledFilter>,
    cancel: CancellationToken,
    written: u64,
    error: Option<io::Error>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, format: OutputFormat, filter: Option<CompiledFilter>, cancel: CancellationToken) -> Self {
        Self {
            out,
            format,
            timestamps: false,
            filter,
            cancel,
            written: 0,
            error: None,
        }
    }

    /// Prefix text lines with the entry timestamp
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn write(&mut self, prefix: &str, entry: &LogEntry) {
        if self.error.is_some() {
            return;
        }
        if let Some(filter) = &self.filter {
            if !filter.matches(entry) {
                return;
            }
        }

        match self.write_line(prefix, entry) {
            Ok(()) => self.written += 1,
            Err(e) => {
                tracing::debug!("Output closed: {}", e);
                self.error = Some(e);
                self.cancel.cancel();
            }
        }
    }

    fn write_line(&mut self, prefix: &str, entry: &LogEntry) -> io::Result<()> {
        match self.format {
            OutputFormat::Text if self.timestamps => writeln!(
                self.out,
                "{}{} {}",
                prefix,
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                entry.message
            ),
            OutputFormat::Text => writeln!(self.out, "{}{}", prefix, entry.message),
            OutputFormat::Json => {
                let line = JsonLine {
                    source: source_name(prefix),
                    timestamp: &entry.timestamp,
                    message: &entry.message,
                };
                serde_json::to_writer(&mut self.out, &line)?;
                writeln!(self.out)
            }
        }
    }

    /// Flush the output and report the first write error, if any
    pub fn finish(mut self) -> Result<u64> {
        if let Some(e) = self.error.take() {
            // Downstream consumer went away (e.g. `| head`); not an error for us
            if e.kind() == io::ErrorKind::BrokenPipe {
                return Ok(self.written);
            }
            return Err(e).context("Failed to write logs");
        }
        self.out.flush().context("Failed to write logs")?;
        Ok(self.written)
    }
}

/// Pod name from an aligned `"<pod>:   "` prefix
fn source_name(prefix: &str) -> &str {
    let trimmed = prefix.trim_end();
    trimmed.strip_suffix(':').unwrap_or(trimmed)
}
