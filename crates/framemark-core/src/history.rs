//! Linear undo/redo history with merge and snapshot heuristics.
//!
//! Entries hold full before/after snapshots of the persistent document
//! (elements, selection, mode, layers). The cursor points at the last
//! applied entry; `None` is the initial state before any entry.

use crate::config::HistoryConfig;
use crate::document::HistorySnapshot;
use crate::error::HistoryError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// Use web-time on WASM, std::time otherwise
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Tag describing what kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AddElements,
    DeleteElements,
    UpdateElements,
    UpdateSelection,
    ChangeMode,
    ClearAll,
    Paste,
    Duplicate,
    Cut,
    Group,
    Ungroup,
    Align,
    Distribute,
    Reorder,
    Flip,
    Label,
    CreateLayer,
    DeleteLayer,
    UpdateLayer,
    ReorderLayers,
    DuplicateLayer,
    MoveToLayer,
    MarkSaved,
    LoadDocument,
}

impl Operation {
    /// Whether the operation gets a history entry. A save acknowledgement
    /// reflects the host's persisted state and is never undone.
    pub fn is_undoable(self) -> bool {
        !matches!(self, Operation::MarkSaved)
    }
}

/// One recorded step.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: Instant,
    pub operation: Operation,
    pub description: String,
    pub before: HistorySnapshot,
    pub after: HistorySnapshot,
    /// How many later operations were folded into this entry.
    pub merge_count: usize,
}

/// Lightweight description of an entry for history panels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntrySummary {
    pub index: usize,
    pub operation: Operation,
    pub description: String,
    pub merge_count: usize,
    /// Whether the entry is currently applied (at or before the cursor).
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_entries: usize,
    /// Cursor position; `None` before the first entry.
    pub position: Option<usize>,
    pub undo_available: usize,
    pub redo_available: usize,
    pub max_size: usize,
    pub enabled: bool,
}

/// What `record_operation` did with the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Snapshot,
    Merged,
    /// Recording disabled or a restore is in progress.
    Skipped,
}

/// History state machine.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    config: HistoryConfig,
    entries: Vec<HistoryEntry>,
    position: Option<usize>,
    applying: bool,
}

impl HistoryManager {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            position: None,
            applying: false,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// True while a snapshot is being replayed into the document.
    pub fn is_applying(&self) -> bool {
        self.applying
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record an operation that moved the document from `before` to `after`.
    pub fn record_operation(
        &mut self,
        operation: Operation,
        after: HistorySnapshot,
        description: impl Into<String>,
        before: HistorySnapshot,
    ) -> RecordOutcome {
        self.record_operation_at(operation, after, description, before, Instant::now())
    }

    /// [`Self::record_operation`] with an explicit timestamp.
    pub fn record_operation_at(
        &mut self,
        operation: Operation,
        after: HistorySnapshot,
        description: impl Into<String>,
        before: HistorySnapshot,
        now: Instant,
    ) -> RecordOutcome {
        if !self.config.enabled || self.applying || !operation.is_undoable() {
            return RecordOutcome::Skipped;
        }
        let description = description.into();

        if self.should_merge(operation, now) {
            if let Some(last) = self.entries.last_mut() {
                last.after = after;
                last.timestamp = now;
                last.description = description;
                last.merge_count += 1;
                log::debug!("History: merged {:?} (x{})", operation, last.merge_count);
                return RecordOutcome::Merged;
            }
        }

        // A new edit discards the redo branch.
        let keep = self.position.map_or(0, |p| p + 1);
        if keep < self.entries.len() {
            log::debug!("History: discarding {} redo entries", self.entries.len() - keep);
            self.entries.truncate(keep);
        }

        self.entries.push(HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: now,
            operation,
            description,
            before,
            after,
            merge_count: 0,
        });
        self.position = Some(self.entries.len() - 1);

        let max = self.config.max_size.max(1);
        if self.entries.len() > max {
            let excess = self.entries.len() - max;
            self.entries.drain(..excess);
            self.position = self.position.and_then(|p| p.checked_sub(excess));
            log::debug!("History: trimmed {} oldest entries", excess);
        }

        log::debug!("History: snapshot {:?} ({} entries)", operation, self.entries.len());
        RecordOutcome::Snapshot
    }

    fn should_merge(&self, operation: Operation, now: Instant) -> bool {
        if operation == Operation::AddElements
            || self.config.always_snapshot.contains(&operation)
            || !self.config.mergeable.contains(&operation)
        {
            return false;
        }
        // Only the entry at the tip can absorb new operations.
        let Some(position) = self.position else {
            return false;
        };
        if position + 1 != self.entries.len() {
            return false;
        }
        let Some(last) = self.entries.last() else {
            return false;
        };
        last.operation == operation
            && last.merge_count < self.config.force_snapshot_every
            && now.saturating_duration_since(last.timestamp) < Duration::from_millis(self.config.merge_interval_ms)
    }

    pub fn can_undo(&self) -> bool {
        self.position.is_some()
    }

    pub fn can_redo(&self) -> bool {
        match self.position {
            Some(p) => p + 1 < self.entries.len(),
            None => !self.entries.is_empty(),
        }
    }

    /// Step back one entry, returning the snapshot to restore.
    pub fn undo(&mut self) -> Result<HistorySnapshot, HistoryError> {
        let position = self.position.ok_or(HistoryError::NothingToUndo)?;
        let snapshot = self.entry(position)?.before.clone();
        self.position = position.checked_sub(1);
        Ok(snapshot)
    }

    /// Step forward one entry, returning the snapshot to restore.
    pub fn redo(&mut self) -> Result<HistorySnapshot, HistoryError> {
        if !self.can_redo() {
            return Err(HistoryError::NothingToRedo);
        }
        let next = self.position.map_or(0, |p| p + 1);
        let snapshot = self.entry(next)?.after.clone();
        self.position = Some(next);
        Ok(snapshot)
    }

    /// Jump to an arbitrary position (`None` = before the first entry).
    ///
    /// With no entries there is nothing to go back to: the initial state is
    /// already current.
    pub fn go_to_position(&mut self, target: Option<usize>) -> Result<HistorySnapshot, HistoryError> {
        let snapshot = match target {
            Some(index) if index >= self.entries.len() => return Err(HistoryError::OutOfRange(index)),
            Some(index) => self.entry(index)?.after.clone(),
            None if self.entries.is_empty() => return Err(HistoryError::NothingToUndo),
            None => self.entry(0)?.before.clone(),
        };
        self.position = target;
        Ok(snapshot)
    }

    fn entry(&self, index: usize) -> Result<&HistoryEntry, HistoryError> {
        self.entries.get(index).ok_or_else(|| {
            log::error!("History: no entry at position {} ({} entries)", index, self.entries.len());
            HistoryError::MissingEntry(index)
        })
    }

    /// Mark the start of a snapshot restore; recording is suppressed until
    /// [`Self::end_restore`].
    pub fn begin_restore(&mut self) -> Result<(), HistoryError> {
        if self.applying {
            return Err(HistoryError::Reentrant);
        }
        self.applying = true;
        Ok(())
    }

    pub fn end_restore(&mut self) {
        self.applying = false;
    }

    pub fn undo_preview(&self) -> Option<&str> {
        let position = self.position?;
        self.entries.get(position).map(|e| e.description.as_str())
    }

    pub fn redo_preview(&self) -> Option<&str> {
        let next = self.position.map_or(0, |p| p + 1);
        self.entries.get(next).map(|e| e.description.as_str())
    }

    pub fn stats(&self) -> HistoryStats {
        let undo_available = self.position.map_or(0, |p| p + 1);
        HistoryStats {
            total_entries: self.entries.len(),
            position: self.position,
            undo_available,
            redo_available: self.entries.len() - undo_available,
            max_size: self.config.max_size,
            enabled: self.config.enabled,
        }
    }

    pub fn summaries(&self) -> Vec<HistoryEntrySummary> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, e)| HistoryEntrySummary {
                index,
                operation: e.operation,
                description: e.description.clone(),
                merge_count: e.merge_count,
                applied: self.position.is_some_and(|p| index <= p),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.position = None;
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}
