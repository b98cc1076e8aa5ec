//! Cron registry: the catalog of jobs a process schedules.
//!
//! Registration validates everything up front so a bad expression or an
//! ambiguous lease fails at boot, never on a tick.

use std::sync::Arc;

use gantry_core::{GantryError, Overlap, Result};

use crate::cron::Expression;
use crate::entry::{EntrySummary, JobKind, ScheduleEntry};
use crate::lease;

/// A validated entry with its parsed expression.
#[derive(Debug, Clone)]
pub(crate) struct Registered {
    pub entry: Arc<ScheduleEntry>,
    pub expression: Expression,
}

/// Registry of all jobs for this process.
#[derive(Debug, Clone, Default)]
pub struct CronRegistry {
    entries: Vec<Registered>,
    default_overlap: Overlap,
}

impl CronRegistry {
    /// Create an empty registry where overlapping runs are allowed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with a default overlap policy.
    pub fn with_overlap(default_overlap: Overlap) -> Self {
        Self {
            entries: Vec::new(),
            default_overlap,
        }
    }

    /// Validate and add an entry.
    pub fn register(&mut self, entry: ScheduleEntry) -> Result<()> {
        let expression = Expression::parse(&entry.expression)?;

        if entry.kind == JobKind::Distributed {
            if !lease::is_valid_name(&entry.job_name) {
                return Err(GantryError::config(format!(
                    "distributed job name '{}' must be a plain file name",
                    entry.job_name
                )));
            }
            // Holds are listed and reasoned about in whole seconds.
            if entry.hold.is_none_or(|h| h.is_zero() || h.subsec_nanos() != 0) {
                return Err(GantryError::config(format!(
                    "distributed job '{}' needs a hold of whole seconds, at least 1s",
                    entry.job_name
                )));
            }
            let taken = self.entries.iter().any(|r| {
                r.entry.kind == JobKind::Distributed && r.entry.job_name == entry.job_name
            });
            if taken {
                return Err(GantryError::DuplicateJob(entry.job_name));
            }
        }

        tracing::info!(
            "📅 Registered {} job '{}' ({})",
            entry.kind,
            entry.job_name,
            entry.expression
        );
        self.entries.push(Registered {
            entry: Arc::new(entry),
            expression,
        });
        Ok(())
    }

    /// List all entries in registration order.
    pub fn list(&self) -> Vec<&ScheduleEntry> {
        self.entries.iter().map(|r| r.entry.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_overlap(&self) -> Overlap {
        self.default_overlap
    }

    /// Serializable catalog rows.
    pub fn summaries(&self) -> Vec<EntrySummary> {
        self.entries
            .iter()
            .map(|r| EntrySummary::from(r.entry.as_ref()))
            .collect()
    }

    /// Render the catalog as an aligned text table.
    pub fn render_table(&self) -> String {
        let header = ["KIND", "EXPRESSION", "JOB", "LEASE", "HOLD", "DESCRIPTION"];
        let rows: Vec<[String; 6]> = self
            .summaries()
            .into_iter()
            .map(|s| {
                [
                    s.kind.to_string(),
                    s.expression,
                    s.job,
                    s.lease.unwrap_or_else(|| "-".into()),
                    s.hold_secs.map(|h| format!("{h}s")).unwrap_or_else(|| "-".into()),
                    s.description,
                ]
            })
            .collect();

        let mut widths = header.map(str::len);
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let mut push_line = |cells: &[&str]| {
            let line = cells
                .iter()
                .zip(widths)
                .map(|(cell, w)| format!("{cell:<w$}"))
                .collect::<Vec<_>>()
                .join("  ");
            out.push_str(line.trim_end());
            out.push('\n');
        };
        push_line(&header[..]);
        for row in &rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            push_line(&cells);
        }
        out
    }

    pub(crate) fn into_parts(self) -> (Vec<Registered>, Overlap) {
        (self.entries, self.default_overlap)
    }
}
