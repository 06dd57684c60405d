/// Authoritative text buffer and caret positions
use serde::{Deserialize, Serialize};

use crate::OperationKind;

/// Character count of `text`
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of the character at `char_offset`, or the end of `text`
pub(crate) fn byte_offset(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Buffer plus monotonically increasing version.
///
/// Only the synchronization controller mutates it; everyone else reads snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentState {
    content: String,
    version: u64,
    len: usize,
}

impl DocumentState {
    pub fn new(content: impl Into<String>) -> Self {
        Self::at_version(content, 0)
    }

    pub fn at_version(content: impl Into<String>, version: u64) -> Self {
        let content = content.into();
        let len = char_len(&content);
        Self {
            content,
            version,
            len,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            content: self.content.clone(),
            version: self.version,
        }
    }

    /// Caret at `offset`, clamped to the document
    pub fn cursor_at(&self, offset: usize) -> CursorPosition {
        CursorPosition::at(&self.content, offset)
    }

    /// Apply a validated operation; every applied operation counts one version
    pub(crate) fn apply(&mut self, kind: &OperationKind) {
        if !kind.is_noop() {
            kind.apply_to(&mut self.content);
            self.len = char_len(&self.content);
        }
        self.version += 1;
    }

    pub(crate) fn reset(&mut self, snapshot: &DocumentSnapshot) {
        *self = Self::at_version(snapshot.content.clone(), snapshot.version);
    }
}

/// Read-only copy of the document handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub content: String,
    pub version: u64,
}

impl DocumentSnapshot {
    pub fn new(content: impl Into<String>, version: u64) -> Self {
        Self {
            content: content.into(),
            version,
        }
    }
}

/// Caret location; `offset` is canonical, `line`/`column` are derived for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Zero-based line
    pub line: usize,
    /// Zero-based column, in characters
    pub column: usize,
    /// Absolute character offset
    pub offset: usize,
}

impl CursorPosition {
    /// Position of `offset` within `content`, clamped to its length
    pub fn at(content: &str, offset: usize) -> Self {
        let mut line = 0;
        let mut column = 0;
        let mut clamped = 0;
        for ch in content.chars().take(offset) {
            clamped += 1;
            if ch == '\n' {
                line += 1;
                column = 0;
            } else {
                column += 1;
            }
        }
        Self {
            line,
            column,
            offset: clamped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionDirection {
    Forward,
    Backward,
}

/// Selected range; `start.offset <= end.offset` whichever way it was dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    start: CursorPosition,
    end: CursorPosition,
    direction: SelectionDirection,
}

impl SelectionRange {
    /// Selection from where the drag started (`anchor`) to the caret (`head`)
    pub fn new(anchor: CursorPosition, head: CursorPosition) -> Self {
        if anchor.offset <= head.offset {
            Self {
                start: anchor,
                end: head,
                direction: SelectionDirection::Forward,
            }
        } else {
            Self {
                start: head,
                end: anchor,
                direction: SelectionDirection::Backward,
            }
        }
    }

    pub fn from_offsets(content: &str, anchor: usize, head: usize) -> Self {
        Self::new(CursorPosition::at(content, anchor), CursorPosition::at(content, head))
    }

    pub fn start(&self) -> CursorPosition {
        self.start
    }

    pub fn end(&self) -> CursorPosition {
        self.end
    }

    pub fn direction(&self) -> SelectionDirection {
        self.direction
    }

    /// The end holding the caret
    pub fn head(&self) -> CursorPosition {
        match self.direction {
            SelectionDirection::Forward => self.end,
            SelectionDirection::Backward => self.start,
        }
    }

    pub fn anchor(&self) -> CursorPosition {
        match self.direction {
            SelectionDirection::Forward => self.start,
            SelectionDirection::Backward => self.end,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start.offset == self.end.offset
    }

    /// Same selection with both ends moved by `map`, re-derived against `content`
    pub(crate) fn remapped(&self, content: &str, map: impl Fn(usize) -> usize) -> Self {
        let start = CursorPosition::at(content, map(self.start.offset));
        let end = CursorPosition::at(content, map(self.end.offset));
        Self {
            start,
            end: if end.offset < start.offset { start } else { end },
            direction: self.direction,
        }
    }

    /// Clamp both ends to `content` and recompute line/column
    pub(crate) fn normalized(&self, content: &str) -> Self {
        self.remapped(content, |offset| offset)
    }
}
