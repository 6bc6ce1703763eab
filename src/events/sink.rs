use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::events::{Level, Transition};

/// Publisher for event state changes.
pub trait EventSink {
    /// Announce the label events the agent can fire. Called on setup and label reset.
    fn declare_label_events(&mut self, _labels: &[String]) -> Result<()> {
        Ok(())
    }

    fn on_label_event(&mut self, label: &str, level: Level, at_ms: u64) -> Result<()>;

    fn on_compliance_event(&mut self, event: &str, level: Level, at_ms: u64) -> Result<()>;
}

/// Human-readable name for a label event.
pub fn display_name(label: &str) -> String {
    format!("Detection: {}", label)
}

/// Logs every transition through the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn declare_label_events(&mut self, labels: &[String]) -> Result<()> {
        for label in labels {
            log::debug!("declared event {} ({})", label, display_name(label));
        }
        Ok(())
    }

    fn on_label_event(&mut self, label: &str, level: Level, at_ms: u64) -> Result<()> {
        log::info!("label event {} -> {:?} at {}", label, level, at_ms);
        Ok(())
    }

    fn on_compliance_event(&mut self, event: &str, level: Level, at_ms: u64) -> Result<()> {
        log::info!("compliance event {} -> {:?} at {}", event, level, at_ms);
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum EventKind {
    Label,
    Compliance,
}

#[derive(Serialize)]
struct EventLine<'a> {
    kind: EventKind,
    name: &'a str,
    level: Level,
    timestamp: u64,
}

/// Writes one JSON object per transition.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &EventLine<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, line).context("failed to encode event")?;
        self.out
            .write_all(b"\n")
            .and_then(|_| self.out.flush())
            .context("failed to write event")?;
        Ok(())
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn on_label_event(&mut self, label: &str, level: Level, at_ms: u64) -> Result<()> {
        self.write_line(&EventLine {
            kind: EventKind::Label,
            name: label,
            level,
            timestamp: at_ms,
        })
    }

    fn on_compliance_event(&mut self, event: &str, level: Level, at_ms: u64) -> Result<()> {
        self.write_line(&EventLine {
            kind: EventKind::Compliance,
            name: event,
            level,
            timestamp: at_ms,
        })
    }
}

/// Kept in memory; used by tests and the offline tools.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub declared: Vec<String>,
    pub labels: Vec<(Transition, u64)>,
    pub compliance: Vec<(Transition, u64)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_transitions(&self) -> Vec<Transition> {
        self.labels.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn compliance_transitions(&self) -> Vec<Transition> {
        self.compliance.iter().map(|(t, _)| t.clone()).collect()
    }
}

impl EventSink for RecordingSink {
    fn declare_label_events(&mut self, labels: &[String]) -> Result<()> {
        self.declared = labels.to_vec();
        Ok(())
    }

    fn on_label_event(&mut self, label: &str, level: Level, at_ms: u64) -> Result<()> {
        self.labels.push((
            Transition {
                name: label.to_string(),
                level,
            },
            at_ms,
        ));
        Ok(())
    }

    fn on_compliance_event(&mut self, event: &str, level: Level, at_ms: u64) -> Result<()> {
        self.compliance.push((
            Transition {
                name: event.to_string(),
                level,
            },
            at_ms,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_sink_writes_one_object_per_event() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.on_label_event("Person", Level::High, 1000).unwrap();
        sink.on_compliance_event("NoHelmet", Level::Low, 2000)
            .unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "label");
        assert_eq!(first["name"], "Person");
        assert_eq!(first["level"], "high");
        assert_eq!(first["timestamp"], 1000);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["kind"], "compliance");
        assert_eq!(second["level"], "low");
    }

    #[test]
    fn display_name_prefixes_label() {
        assert_eq!(display_name("Hard_Hat"), "Detection: Hard_Hat");
    }
}
