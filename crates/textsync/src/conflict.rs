/// Conflict reporting for concurrent edits
///
/// Conflicts are resolved automatically and deterministically by the transform
/// engine. What lands here is a record of where that happened, for editors that want to
/// show a soft notification.
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::{CollaboratorId, Operation, TieBreak};

/// Unique conflict identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(pub uuid::Uuid);

impl ConflictId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

/// Types of conflicts that can occur
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Two participants inserted at the same offset
    ConcurrentInsert { position: usize },

    /// Two participants deleted overlapping ranges; `overlap` characters were removed once
    OverlappingDelete { overlap: usize },
}

/// A concurrent edit pair the transform engine had to order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub kind: ConflictKind,

    /// Operation already integrated on this replica
    pub local: Operation,

    /// Operation being integrated
    pub remote: Operation,

    /// Participant whose insert went first; `None` for overlapping deletes
    pub winner: Option<CollaboratorId>,

    pub detected_at: chrono::DateTime<chrono::Utc>,
}

impl Conflict {
    pub fn from_tie_break(tie_break: TieBreak, local: &Operation, remote: &Operation) -> Self {
        let (kind, winner) = match tie_break {
            TieBreak::ConcurrentInsert { position, winner } => {
                (ConflictKind::ConcurrentInsert { position }, Some(winner))
            }
            TieBreak::OverlappingDelete { overlap } => {
                (ConflictKind::OverlappingDelete { overlap }, None)
            }
        };

        Self {
            id: ConflictId::new(),
            kind,
            local: local.clone(),
            remote: remote.clone(),
            winner,
            detected_at: chrono::Utc::now(),
        }
    }
}

/// Bounded record of recent conflicts, oldest evicted first
#[derive(Debug, Clone)]
pub struct ConflictLog {
    entries: VecDeque<Conflict>,
    capacity: usize,
}

impl ConflictLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn record(&mut self, conflict: Conflict) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(conflict);
    }

    /// Newest last
    pub fn recent(&self) -> Vec<Conflict> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops() -> (Operation, Operation) {
        (
            Operation::insert(CollaboratorId::new("a"), 0, 1, "X"),
            Operation::insert(CollaboratorId::new("b"), 0, 1, "Y"),
        )
    }

    #[test]
    fn test_concurrent_insert_conflict() {
        let (local, remote) = ops();
        let conflict = Conflict::from_tie_break(
            TieBreak::ConcurrentInsert {
                position: 1,
                winner: CollaboratorId::new("a"),
            },
            &local,
            &remote,
        );

        assert_eq!(conflict.kind, ConflictKind::ConcurrentInsert { position: 1 });
        assert_eq!(conflict.winner, Some(CollaboratorId::new("a")));
        assert_eq!(conflict.local.id(), local.id());
    }

    #[test]
    fn test_log_evicts_oldest() {
        let (local, remote) = ops();
        let mut log = ConflictLog::new(2);
        for overlap in 1..=3 {
            log.record(Conflict::from_tie_break(
                TieBreak::OverlappingDelete { overlap },
                &local,
                &remote,
            ));
        }

        let kinds: Vec<_> = log.recent().into_iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ConflictKind::OverlappingDelete { overlap: 2 },
                ConflictKind::OverlappingDelete { overlap: 3 },
            ]
        );
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let (local, remote) = ops();
        let mut log = ConflictLog::new(0);
        log.record(Conflict::from_tie_break(
            TieBreak::OverlappingDelete { overlap: 1 },
            &local,
            &remote,
        ));
        assert!(log.is_empty());
    }
}
