//! Console Reporter
//!
//! Renders usage events to a writer, either as aligned text with human
//! readable sizes or as one JSON object per line.

use crate::usage::{RunSummary, UsageEvent, UsageSink};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::str::FromStr;

/// Report format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Invalid output format: {}. Must be 'text' or 'json'", other)),
        }
    }
}

/// Format a byte count with binary units and three decimals
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.3} {}", value, UNITS[unit])
}

/// Usage sink writing a report to `W`
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Write the closing summary
    pub fn finish(&mut self, summary: &RunSummary) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(
                self.out,
                "total: {} across {} groups, {} registries, {} tags ({} failed)",
                format_size(summary.total_size),
                summary.groups,
                summary.registries,
                summary.tags,
                summary.failed_tags
            )?,
            OutputFormat::Json => {
                let value = serde_json::json!({ "kind": "summary", "summary": summary });
                writeln!(self.out, "{}", value)?;
            }
        }
        self.out.flush()
    }

    /// Consume the reporter and return the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_text(&mut self, event: &UsageEvent) -> std::io::Result<()> {
        match event {
            UsageEvent::Tag(t) => {
                let created = t
                    .tag
                    .created_at
                    .map(|c| c.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                writeln!(
                    self.out,
                    "    {}:{}  {}  {}",
                    t.registry,
                    t.tag.name,
                    format_size(t.tag.total_size),
                    created
                )
            }
            UsageEvent::TagFailed(f) => writeln!(
                self.out,
                "    {}:{}  FAILED  {}",
                f.registry,
                f.tag,
                f.error.replace('\n', " ")
            ),
            UsageEvent::Registry(r) => writeln!(
                self.out,
                "  registry {}: {} ({} tags, {} failed)",
                r.registry,
                format_size(r.total_size),
                r.tags,
                r.failed_tags
            ),
            UsageEvent::Group(g) => writeln!(
                self.out,
                "group {}: {} ({} registries)",
                g.group,
                format_size(g.total_size),
                g.registries
            ),
        }
    }

    fn write_json(&mut self, event: &UsageEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        writeln!(self.out, "{}", line)
    }
}

impl<W: Write> UsageSink for Reporter<W> {
    fn emit(&mut self, event: UsageEvent) {
        let result = match self.format {
            OutputFormat::Text => self.write_text(&event),
            OutputFormat::Json => self.write_json(&event),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to write usage report: {}", e);
        }
    }
}
