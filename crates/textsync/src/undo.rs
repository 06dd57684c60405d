/// Local undo/redo history
///
/// Only the local participant's own edits are recorded. Entries keep the inverse as it
/// stood right after the edit; the session rebases it through everything applied since
/// before submitting it as a new edit.
use std::collections::VecDeque;

use crate::{LocalSubmission, Operation, OperationKind};

/// One undoable edit
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    pub operation: Operation,
    /// Reverts `operation`; defined on the document at `version_at_capture`
    pub inverse: OperationKind,
    /// Document version right after `operation` was applied
    pub version_at_capture: u64,
    /// Edits sharing a group are undone together
    pub group: u64,
}

impl UndoEntry {
    /// `None` when the edit cannot be reverted by a single operation
    pub fn from_submission(submission: &LocalSubmission, group: u64) -> Option<Self> {
        let inverse = submission.inverse.clone()?;
        Some(Self {
            operation: submission.operation.clone(),
            inverse,
            version_at_capture: submission.version,
            group,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UndoManager {
    undo_stack: VecDeque<UndoEntry>,
    redo_stack: VecDeque<UndoEntry>,
    /// Maximum number of groups per stack
    limit: usize,
    next_group: u64,
}

impl UndoManager {
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            limit,
            next_group: 0,
        }
    }

    /// Allocate a group id for the edits of one user gesture
    pub fn begin_group(&mut self) -> u64 {
        let group = self.next_group;
        self.next_group += 1;
        group
    }

    /// Record a fresh user edit; invalidates everything that could be redone
    pub fn record_edit(&mut self, entry: UndoEntry) {
        self.redo_stack.clear();
        self.push_undo(entry);
    }

    /// Record an edit produced by redo, keeping the redo stack
    pub fn push_undo(&mut self, entry: UndoEntry) {
        Self::push_bounded(&mut self.undo_stack, entry, self.limit);
    }

    pub fn push_redo(&mut self, entry: UndoEntry) {
        Self::push_bounded(&mut self.redo_stack, entry, self.limit);
    }

    /// Newest group, newest entry first
    pub fn pop_undo_group(&mut self) -> Vec<UndoEntry> {
        Self::pop_group(&mut self.undo_stack)
    }

    pub fn pop_redo_group(&mut self) -> Vec<UndoEntry> {
        Self::pop_group(&mut self.redo_stack)
    }

    /// Put back a group returned by `pop_undo_group`
    pub fn restore_undo_group(&mut self, group: Vec<UndoEntry>) {
        self.undo_stack.extend(group.into_iter().rev());
    }

    pub fn restore_redo_group(&mut self, group: Vec<UndoEntry>) {
        self.redo_stack.extend(group.into_iter().rev());
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Forget entries captured before `floor`; they can no longer be rebased
    pub fn discard_before(&mut self, floor: u64) -> usize {
        let before = self.undo_stack.len() + self.redo_stack.len();
        self.undo_stack.retain(|e| e.version_at_capture >= floor);
        self.redo_stack.retain(|e| e.version_at_capture >= floor);
        before - self.undo_stack.len() - self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn push_bounded(stack: &mut VecDeque<UndoEntry>, entry: UndoEntry, limit: usize) {
        stack.push_back(entry);
        while Self::group_count(stack) > limit {
            let oldest = match stack.front() {
                Some(e) => e.group,
                None => break,
            };
            while stack.front().map(|e| e.group) == Some(oldest) {
                stack.pop_front();
            }
        }
    }

    fn group_count(stack: &VecDeque<UndoEntry>) -> usize {
        let mut count = 0;
        let mut last = None;
        for entry in stack {
            if last != Some(entry.group) {
                count += 1;
                last = Some(entry.group);
            }
        }
        count
    }

    fn pop_group(stack: &mut VecDeque<UndoEntry>) -> Vec<UndoEntry> {
        let group = match stack.back() {
            Some(e) => e.group,
            None => return Vec::new(),
        };
        let mut entries = Vec::new();
        while stack.back().map(|e| e.group) == Some(group) {
            if let Some(entry) = stack.pop_back() {
                entries.push(entry);
            }
        }
        entries
    }
}
