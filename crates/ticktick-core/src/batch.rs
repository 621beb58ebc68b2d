//! Batch operation executor and report rendering.
//!
//! Every mutating task tool accepts either a single object or an array
//! of objects. Items run sequentially in input order; one failure never
//! stops the rest, and the caller gets a per-item report either way.

use std::future::Future;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Single-or-many input shape for the mutating tools.
///
/// `Many` is listed first so a JSON array deserializes as a batch even
/// when the item type is a permissive value type.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchInput<T> {
    Many(Vec<T>),
    Single(T),
}

/// Whether the caller sent one item or a batch. Controls the report
/// shape: single mode keeps the original one-task wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    Single,
    Batch,
}

impl<T> BatchInput<T> {
    pub fn into_items(self) -> (Vec<T>, BatchMode) {
        match self {
            BatchInput::Many(items) => (items, BatchMode::Batch),
            BatchInput::Single(item) => (vec![item], BatchMode::Single),
        }
    }
}

/// The mutating operations that run through the batch executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Create,
    Update,
    Complete,
    Delete,
}

impl BatchAction {
    fn gerund(&self) -> &'static str {
        match self {
            BatchAction::Create => "creation",
            BatchAction::Update => "update",
            BatchAction::Complete => "completion",
            BatchAction::Delete => "deletion",
        }
    }

    fn past(&self) -> &'static str {
        match self {
            BatchAction::Create => "created",
            BatchAction::Update => "updated",
            BatchAction::Complete => "completed",
            BatchAction::Delete => "deleted",
        }
    }

    fn past_title(&self) -> &'static str {
        match self {
            BatchAction::Create => "Created",
            BatchAction::Update => "Updated",
            BatchAction::Complete => "Completed",
            BatchAction::Delete => "Deleted",
        }
    }

    fn infinitive(&self) -> &'static str {
        match self {
            BatchAction::Create => "create",
            BatchAction::Update => "update",
            BatchAction::Complete => "complete",
            BatchAction::Delete => "delete",
        }
    }
}

/// What a successful item contributes to the report.
#[derive(Debug, Clone)]
pub struct BatchSuccess {
    /// One-line entry for the batch report's success section.
    pub line: String,
    /// Full text used as the whole response in single mode.
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub index: usize,
    /// Item identifier for failure lines, e.g. `'Buy milk'` or `ID: abc`.
    pub label: String,
    pub outcome: std::result::Result<BatchSuccess, String>,
}

/// Ordered outcome of a batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub mode: BatchMode,
    pub action: BatchAction,
    pub noun: &'static str,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.len() - self.success_count()
    }

    /// Render the report text returned to the caller.
    pub fn render(&self) -> String {
        if self.mode == BatchMode::Single {
            let entry = &self.entries[0];
            return match &entry.outcome {
                Ok(success) => success.detail.clone(),
                Err(reason) => {
                    let noun_title = capitalize(self.noun);
                    format!(
                        "Failed to {} {}:\n{} 1 ({}): {}",
                        self.action.infinitive(),
                        self.noun,
                        noun_title,
                        entry.label,
                        reason
                    )
                }
            };
        }

        let mut out = format!(
            "Batch {} {} completed.\n\n",
            self.noun,
            self.action.gerund()
        );
        out.push_str(&format!(
            "Successfully {}: {} {}s\nFailed: {} {}s\n\n",
            self.action.past(),
            self.success_count(),
            self.noun,
            self.failure_count(),
            self.noun
        ));

        let successes: Vec<&BatchEntry> =
            self.entries.iter().filter(|e| e.outcome.is_ok()).collect();
        if !successes.is_empty() {
            out.push_str(&format!(
                "✅ Successfully {} {}s:\n",
                self.action.past_title(),
                capitalize(self.noun)
            ));
            for entry in successes {
                if let Ok(success) = &entry.outcome {
                    out.push_str(&success.line);
                    out.push('\n');
                }
            }
            out.push('\n');
        }

        let failures: Vec<&BatchEntry> =
            self.entries.iter().filter(|e| e.outcome.is_err()).collect();
        if !failures.is_empty() {
            out.push_str(&format!("❌ Failed {}s:\n", capitalize(self.noun)));
            for entry in failures {
                if let Err(reason) = &entry.outcome {
                    out.push_str(&format!(
                        "{} {} ({}): {}\n",
                        capitalize(self.noun),
                        entry.index + 1,
                        entry.label,
                        reason
                    ));
                }
            }
        }

        out.trim_end().to_string()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Run `op` over every item in order, collecting per-item outcomes.
///
/// Item failures land in the report; only an empty input is an error at
/// this level.
pub async fn execute_batch<T, L, F, Fut>(
    action: BatchAction,
    noun: &'static str,
    input: BatchInput<T>,
    label: L,
    mut op: F,
) -> Result<BatchReport>
where
    L: Fn(&T) -> String,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<BatchSuccess>>,
{
    let (items, mode) = input.into_items();
    if items.is_empty() {
        return Err(Error::Validation(format!(
            "No {noun}s provided for batch {}",
            action.gerund()
        )));
    }

    let mut entries = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let label = label(&item);
        let outcome = op(item).await.map_err(|e| e.to_string());
        if let Err(reason) = &outcome {
            tracing::warn!(index, label, reason, "batch item failed");
        }
        entries.push(BatchEntry {
            index,
            label,
            outcome,
        });
    }

    Ok(BatchReport {
        mode,
        action,
        noun,
        entries,
    })
}
