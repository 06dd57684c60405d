/// Text operations exchanged between replicas
/// An operation is immutable once created; transformation always yields a new value
use serde::{Deserialize, Serialize};

use crate::document::{byte_offset, char_len};
use crate::{CollaboratorId, Result, SyncError};

/// Unique operation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub uuid::Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open character range `[start, start + len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The text mutation carried by an operation.
///
/// Offsets count Unicode scalar values, not bytes. A delete starts out as a single
/// span; transforming it against a concurrent insert that landed strictly inside the
/// deleted range splits it so the inserted text survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert { position: usize, content: String },
    Delete { spans: Vec<Span> },
}

impl OperationKind {
    pub fn insert(position: usize, content: impl Into<String>) -> Self {
        OperationKind::Insert {
            position,
            content: content.into(),
        }
    }

    pub fn delete(position: usize, length: usize) -> Self {
        OperationKind::Delete {
            spans: vec![Span::new(position, length)],
        }
    }

    /// Leftmost offset touched by the operation
    pub fn position(&self) -> usize {
        match self {
            OperationKind::Insert { position, .. } => *position,
            OperationKind::Delete { spans } => spans.first().map(|s| s.start).unwrap_or(0),
        }
    }

    /// Inserted or deleted character count
    pub fn length(&self) -> usize {
        match self {
            OperationKind::Insert { content, .. } => char_len(content),
            OperationKind::Delete { spans } => spans.iter().map(|s| s.len).sum(),
        }
    }

    /// True when applying the operation leaves the text unchanged
    pub fn is_noop(&self) -> bool {
        self.length() == 0
    }

    /// Reject operations that do not fit a document of `doc_len` characters
    pub fn validate(&self, doc_len: usize) -> Result<()> {
        match self {
            OperationKind::Insert { position, .. } => {
                if *position > doc_len {
                    return Err(SyncError::Validation(format!(
                        "insert position {} outside document of length {}",
                        position, doc_len
                    )));
                }
            }
            OperationKind::Delete { spans } => {
                let mut previous_end = 0;
                for (idx, span) in spans.iter().enumerate() {
                    let end = span.start.checked_add(span.len).ok_or_else(|| {
                        SyncError::Validation(format!("delete span {:?} overflows", span))
                    })?;
                    if end > doc_len {
                        return Err(SyncError::Validation(format!(
                            "delete range {}..{} outside document of length {}",
                            span.start, end, doc_len
                        )));
                    }
                    if idx > 0 && span.start < previous_end {
                        return Err(SyncError::Validation(format!(
                            "delete spans overlap or are unsorted at {}",
                            span.start
                        )));
                    }
                    previous_end = end;
                }
            }
        }
        Ok(())
    }

    /// Apply to `content`. The operation must already be validated against it.
    pub(crate) fn apply_to(&self, content: &mut String) {
        match self {
            OperationKind::Insert { position, content: text } => {
                let at = byte_offset(content, *position);
                content.insert_str(at, text);
            }
            OperationKind::Delete { spans } => {
                for span in spans.iter().rev().filter(|s| !s.is_empty()) {
                    let start = byte_offset(content, span.start);
                    let end = byte_offset(content, span.end());
                    content.replace_range(start..end, "");
                }
            }
        }
    }

    /// Operation that reverts this one, computed from the text it applies to.
    ///
    /// Returns `None` for split deletes: reverting one takes several inserts.
    pub fn invert(&self, before: &str) -> Option<OperationKind> {
        match self {
            OperationKind::Insert { position, content } => {
                Some(OperationKind::delete(*position, char_len(content)))
            }
            OperationKind::Delete { spans } => match spans.as_slice() {
                [] => Some(OperationKind::insert(0, "")),
                [span] => {
                    let start = byte_offset(before, span.start);
                    let end = byte_offset(before, span.end());
                    Some(OperationKind::insert(span.start, &before[start..end]))
                }
                _ => None,
            },
        }
    }

    /// Break a split delete into single-span deletes that can be applied one after
    /// another (rightmost first, so earlier offsets stay valid).
    pub fn into_sequential(self) -> Vec<OperationKind> {
        match self {
            OperationKind::Delete { spans } if spans.len() > 1 => spans
                .into_iter()
                .rev()
                .filter(|s| !s.is_empty())
                .map(|s| OperationKind::Delete { spans: vec![s] })
                .collect(),
            other => vec![other],
        }
    }
}

/// Text operation replicated across participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    id: OperationId,
    origin: CollaboratorId,
    base_version: u64,
    kind: OperationKind,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl Operation {
    pub fn new(origin: CollaboratorId, base_version: u64, kind: OperationKind) -> Self {
        Self {
            id: OperationId::new(),
            origin,
            base_version,
            kind,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn insert(
        origin: CollaboratorId,
        base_version: u64,
        position: usize,
        content: impl Into<String>,
    ) -> Self {
        Self::new(origin, base_version, OperationKind::insert(position, content))
    }

    pub fn delete(origin: CollaboratorId, base_version: u64, position: usize, length: usize) -> Self {
        Self::new(origin, base_version, OperationKind::delete(position, length))
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Participant that authored the operation
    pub fn origin(&self) -> &CollaboratorId {
        &self.origin
    }

    /// Document version the operation was computed against
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    pub fn is_noop(&self) -> bool {
        self.kind.is_noop()
    }

    /// Same operation identity with a transformed mutation
    pub fn with_kind(&self, kind: OperationKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Same operation identity and mutation, re-expressed against another version
    pub fn rebased(&self, base_version: u64) -> Self {
        Self {
            base_version,
            ..self.clone()
        }
    }
}
