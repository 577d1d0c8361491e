//! Per-area task tracker files.
//!
//! The tracker is markdown that doubles as the execution source of truth:
//!
//! ```text
//! # Tasks: backend
//!
//! [backend-1] Set up the HTTP server (depends on: shared-1)
//!   status: working
//!   priority: normal
//!   level: 1
//!   retries: 0
//!   worker: 019430-kobold-rust
//!   specialization: rust
//!   created: 2026-08-01T10:00:00.000Z
//!   updated: 2026-08-01T10:05:00.000Z
//! ```
//!
//! The parser and writer are lossless and deterministic: parsing a tracker and
//! serialising it immediately yields the original bytes in the task section.

use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::domain::{Analysis, Priority, TaskRecord, TaskStatus};

/// Fixed timestamp format so serialisation is byte-stable.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Missing tracker header")]
    MissingHeader,

    #[error("Malformed task line {line}: {text}")]
    MalformedTaskLine { line: usize, text: String },

    #[error("Malformed metadata at line {line}: {text}")]
    MalformedMetadata { line: usize, text: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// In-memory form of one area's tracker file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerFile {
    pub area: String,
    pub tasks: Vec<TaskRecord>,
}

impl TrackerFile {
    pub fn new(area: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            tasks: Vec::new(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Merge freshly analyzed tasks into this tracker.
    ///
    /// Existing task identifiers are retained untouched (status and assigned
    /// worker included); only genuinely new identifiers are appended. Tasks
    /// that vanished from the analysis stay in place.
    pub fn merge_from_analysis(&mut self, analysis: &Analysis) {
        let area_tasks = analysis.areas.iter().filter(|a| a.name == self.area);

        for area in area_tasks {
            for analyzed in &area.tasks {
                if self.task(&analyzed.id).is_some() {
                    debug!(task_id = %analyzed.id, "merge_from_analysis: id exists, keeping record");
                    continue;
                }

                let mut record = TaskRecord::new(&analyzed.id, &analyzed.name);
                record.deps = analyzed.deps.clone();
                record.priority = analyzed.priority;
                record.specialization = analyzed.specialization.clone();
                record.level = analyzed.level;
                self.tasks.push(record);
            }
        }
    }

    /// Parse a tracker document.
    pub fn parse(content: &str) -> Result<Self, TrackerError> {
        let task_line = task_line_regex();

        let mut area = None;
        let mut tasks: Vec<TaskRecord> = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;

            if let Some(rest) = line.strip_prefix("# Tasks: ") {
                area = Some(rest.to_string());
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            if let Some(caps) = task_line.captures(line) {
                let id = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
                let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                let (title, deps) = split_title_deps(rest);

                let mut record = TaskRecord::new(id, title);
                record.deps = deps;
                tasks.push(record);
                continue;
            }

            if let Some(meta) = line.strip_prefix("  ") {
                let record = tasks.last_mut().ok_or_else(|| TrackerError::MalformedMetadata {
                    line: line_no,
                    text: line.to_string(),
                })?;
                apply_metadata(record, meta, line_no)?;
                continue;
            }

            return Err(TrackerError::MalformedTaskLine {
                line: line_no,
                text: line.to_string(),
            });
        }

        let area = area.ok_or(TrackerError::MissingHeader)?;
        Ok(Self { area, tasks })
    }

    /// Serialise deterministically.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Tasks: {}\n", self.area));

        for task in &self.tasks {
            out.push('\n');
            out.push_str(&format!("[{}] {}", task.id, task.title));
            if !task.deps.is_empty() {
                out.push_str(&format!(" (depends on: {})", task.deps.join(", ")));
            }
            out.push('\n');

            out.push_str(&format!("  status: {}\n", task.status));
            out.push_str(&format!("  priority: {}\n", task.priority));
            out.push_str(&format!("  level: {}\n", task.level));
            out.push_str(&format!("  retries: {}\n", task.retries));
            if let Some(worker) = &task.worker {
                out.push_str(&format!("  worker: {}\n", worker));
            }
            if let Some(specialization) = &task.specialization {
                out.push_str(&format!("  specialization: {}\n", specialization));
            }
            if let Some(error) = &task.error {
                out.push_str(&format!("  error: {}\n", sanitize_line(error)));
            }
            out.push_str(&format!("  created: {}\n", task.created_at.format(TIME_FORMAT)));
            out.push_str(&format!("  updated: {}\n", task.updated_at.format(TIME_FORMAT)));
        }

        out
    }

    /// Load a tracker from disk.
    pub async fn load(path: &Path) -> Result<Self, TrackerError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }
}

fn task_line_regex() -> Regex {
    // [<task-id>] <title and optional deps suffix>
    Regex::new(r"^\[([A-Za-z0-9_-]+)\] (.*)$").expect("static regex")
}

/// Split `<title> (depends on: a, b)` into title and dependency list.
fn split_title_deps(rest: &str) -> (String, Vec<String>) {
    if rest.ends_with(')') {
        if let Some(pos) = rest.rfind(" (depends on: ") {
            let title = rest[..pos].to_string();
            let deps_str = &rest[pos + " (depends on: ".len()..rest.len() - 1];
            let deps = deps_str
                .split(", ")
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            return (title, deps);
        }
    }
    (rest.to_string(), Vec::new())
}

fn apply_metadata(record: &mut TaskRecord, meta: &str, line_no: usize) -> Result<(), TrackerError> {
    let (key, value) = meta.split_once(": ").ok_or_else(|| TrackerError::MalformedMetadata {
        line: line_no,
        text: meta.to_string(),
    })?;

    let malformed = || TrackerError::MalformedMetadata {
        line: line_no,
        text: meta.to_string(),
    };

    match key {
        "status" => record.status = TaskStatus::parse(value).ok_or_else(malformed)?,
        "priority" => record.priority = value.parse::<Priority>().map_err(|_| malformed())?,
        "level" => record.level = value.parse().map_err(|_| malformed())?,
        "retries" => record.retries = value.parse().map_err(|_| malformed())?,
        "worker" => record.worker = Some(value.to_string()),
        "specialization" => record.specialization = Some(value.to_string()),
        "error" => record.error = Some(value.to_string()),
        "created" => record.created_at = parse_time(value).ok_or_else(malformed)?,
        "updated" => record.updated_at = parse_time(value).ok_or_else(malformed)?,
        // Unknown keys are preserved-by-ignoring: they would break the
        // round-trip guarantee, so reject instead of dropping silently.
        _ => return Err(malformed()),
    }

    Ok(())
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.with_timezone(&Utc))
}

fn sanitize_line(text: &str) -> String {
    text.replace(['\n', '\r'], "; ")
}
