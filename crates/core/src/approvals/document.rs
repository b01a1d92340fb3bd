//! Mirror of decision dates into the application's detail document.
//!
//! The detail document is free-form JSON rendered by the portal front end. Its
//! `approvalLine` member holds one object per approval slot, keyed by arbitrary
//! field names, each carrying the approver `id` and optionally a `date`. The
//! step rows stay authoritative; this module only keeps the rendered line in
//! step with them.
//!
//! The same approver id may occupy several slots, so entries are correlated by
//! occurrence index: the Nth appearance of an id among the steps maps to the
//! Nth appearance of that id in `approvalLine`, regardless of field order.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use chrono::NaiveDate;
use serde_json::Value;

use crate::domain::application::ApprovalStep;
use crate::errors::DocumentSyncError;

pub const APPROVAL_LINE_KEY: &str = "approvalLine";
pub const DEFAULT_DATE_FORMAT: &str = "%Y.%m.%d";

/// Renders `date` with a strftime pattern. Patterns with unknown specifiers or
/// time-of-day fields fail instead of panicking.
pub fn format_date(date_format: &str, date: NaiveDate) -> Result<String, DocumentSyncError> {
    let mut rendered = String::new();
    write!(rendered, "{}", date.format(date_format))
        .map_err(|_| DocumentSyncError::Format(date_format.to_string()))?;
    Ok(rendered)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Empty document, or no `approvalLine` object in it.
    Skipped,
    /// The line exists but none of its entries correspond to the decided steps.
    Unchanged,
    Updated { document: String, entries: usize },
}

#[derive(Clone, Debug)]
pub struct DetailDocumentSynchronizer {
    date_format: String,
}

impl Default for DetailDocumentSynchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

impl DetailDocumentSynchronizer {
    pub fn new(date_format: impl Into<String>) -> Self {
        Self { date_format: date_format.into() }
    }

    pub fn synchronize(
        &self,
        document: Option<&str>,
        all_steps: &[ApprovalStep],
        decided_sequences: &[u32],
        today: NaiveDate,
    ) -> Result<SyncOutcome, DocumentSyncError> {
        let Some(raw) = document.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(SyncOutcome::Skipped);
        };

        let mut root: Value =
            serde_json::from_str(raw).map_err(|error| DocumentSyncError::Parse(error.to_string()))?;

        let Some(line) = root.get_mut(APPROVAL_LINE_KEY).and_then(Value::as_object_mut) else {
            return Ok(SyncOutcome::Skipped);
        };

        let targets = decided_occurrences(all_steps, decided_sequences);
        if targets.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }

        let date = format_date(&self.date_format, today)?;
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut entries = 0;

        for entry in line.values_mut() {
            let Some(slot) = entry.as_object_mut() else {
                continue;
            };
            let Some(id) = slot.get("id").and_then(Value::as_str).map(str::to_owned) else {
                continue;
            };

            let occurrence = seen.entry(id.clone()).or_insert(0);
            *occurrence += 1;

            let hit = targets.get(&id).is_some_and(|indexes| indexes.contains(occurrence));
            if hit {
                slot.insert("date".to_string(), Value::String(date.clone()));
                entries += 1;
            }
        }

        if entries == 0 {
            return Ok(SyncOutcome::Unchanged);
        }

        let document = serde_json::to_string(&root)
            .map_err(|error| DocumentSyncError::Serialize(error.to_string()))?;
        Ok(SyncOutcome::Updated { document, entries })
    }
}

/// Per approver id, the 1-based occurrence indexes of the decided steps.
fn decided_occurrences(
    all_steps: &[ApprovalStep],
    decided_sequences: &[u32],
) -> HashMap<String, BTreeSet<usize>> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut targets: HashMap<String, BTreeSet<usize>> = HashMap::new();

    for step in all_steps {
        let occurrence = seen.entry(step.approver_id.as_str()).or_insert(0);
        *occurrence += 1;

        if decided_sequences.contains(&step.sequence) {
            targets.entry(step.approver_id.clone()).or_default().insert(*occurrence);
        }
    }

    targets
}
