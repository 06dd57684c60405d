/// Synchronization controller: the single owner of a replica's document state
///
/// The ordered delivery channel fixes one global sequence of operations, the canonical
/// order. Local edits apply optimistically and wait in an in-flight queue until the
/// channel acknowledges them; remote operations are transformed into local context
/// before they are applied. For every remote origin the controller keeps a bridge of
/// canonical operations that origin had not seen yet, so an operation based on any
/// earlier version can be brought up to date, whichever peer authored it.
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

use crate::{
    transform, transform_through, CollaboratorId, Conflict, DocumentSnapshot, DocumentState,
    Operation, OperationId, OperationKind, Result, SessionConfig, SyncError,
};

/// Controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing awaits acknowledgment
    Idle,
    /// Local operations await acknowledgment
    LocalEditPending,
    /// A remote operation is being transformed against pending local operations.
    /// Only held inside `receive_remote_operation`; callers see the pass through
    /// `RemoteOutcome::reconciled`
    Reconciling,
}

/// A local edit accepted by the controller
#[derive(Debug, Clone)]
pub struct LocalSubmission {
    pub operation: Operation,
    /// Operation that reverts this edit, defined on the state right after it
    pub inverse: Option<OperationKind>,
    /// Document version after the edit
    pub version: u64,
}

/// What integrating a remote operation did to the local replica
#[derive(Debug, Clone, Default)]
pub struct RemoteOutcome {
    /// Document version after integration
    pub version: u64,
    /// The operation as applied locally; `None` when the message only acknowledged
    /// local edits
    pub applied: Option<Operation>,
    pub conflicts: Vec<Conflict>,
    /// Local operations acknowledged while integrating, oldest first
    pub acknowledged: Vec<OperationId>,
    /// Pending local operations the remote operation was transformed past
    pub reconciled: usize,
}

/// Canonical operations a remote origin had not seen, in that origin's context
#[derive(Debug, Clone)]
struct Bridge {
    /// Canonical version the bridge started at
    floor: u64,
    /// Operations by this origin integrated since `floor`
    own_integrated: u64,
    /// Operations by anybody else made canonical since `floor`
    foreign_total: u64,
    /// How many of those the origin is known to have seen
    foreign_seen: u64,
    /// The remaining `foreign_total - foreign_seen` operations
    pending: VecDeque<Operation>,
    /// Entries were dropped to honour the history limit
    pruned: bool,
}

impl Bridge {
    fn from_history(floor: u64, history: &VecDeque<Operation>) -> Self {
        Self {
            floor,
            own_integrated: 0,
            foreign_total: history.len() as u64,
            foreign_seen: 0,
            pending: history.clone(),
            pruned: false,
        }
    }

    /// Returns true the first time the bridge overflows `limit`
    fn push(&mut self, op: Operation, limit: usize) -> bool {
        self.pending.push_back(op);
        self.foreign_total += 1;

        let was_pruned = self.pruned;
        while self.pending.len() > limit {
            self.pending.pop_front();
            self.foreign_seen += 1;
            self.pruned = true;
        }
        self.pruned && !was_pruned
    }
}

/// Owns the document for one replica and keeps it converging with its peers
#[derive(Debug)]
pub struct SyncController {
    local: CollaboratorId,
    document: DocumentState,
    state: SyncState,
    in_flight: VecDeque<Operation>,
    bridges: BTreeMap<CollaboratorId, Bridge>,
    /// Canonical operations, oldest first; `history[0]` has canonical index `history_floor`
    history: VecDeque<Operation>,
    history_floor: u64,
    /// Operations in local application order; `applied[0]` applied at `applied_floor`
    applied: VecDeque<Operation>,
    applied_floor: u64,
    max_in_flight: usize,
    max_history: usize,
}

impl SyncController {
    pub fn new(local: CollaboratorId, snapshot: DocumentSnapshot, config: &SessionConfig) -> Self {
        let version = snapshot.version;
        Self {
            local,
            document: DocumentState::at_version(snapshot.content, version),
            state: SyncState::Idle,
            in_flight: VecDeque::new(),
            bridges: BTreeMap::new(),
            history: VecDeque::new(),
            history_floor: version,
            applied: VecDeque::new(),
            applied_floor: version,
            max_in_flight: config.max_in_flight,
            max_history: config.max_history,
        }
    }

    pub fn local(&self) -> &CollaboratorId {
        &self.local
    }

    pub fn document(&self) -> &DocumentState {
        &self.document
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        self.document.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.document.version()
    }

    /// Operations the whole session has agreed on; local edits count once acknowledged
    pub fn canonical_version(&self) -> u64 {
        self.document.version() - self.in_flight.len() as u64
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Unacknowledged local operations in submission order, in their current form
    pub fn in_flight(&self) -> impl Iterator<Item = &Operation> {
        self.in_flight.iter()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Oldest local version `rebase` still accepts
    pub fn applied_floor(&self) -> u64 {
        self.applied_floor
    }

    /// Apply a local edit optimistically and queue it for acknowledgment
    pub fn submit_local_edit(&mut self, kind: OperationKind) -> Result<LocalSubmission> {
        if self.in_flight.len() >= self.max_in_flight {
            return Err(SyncError::PendingLimitExceeded {
                limit: self.max_in_flight,
            });
        }
        if let OperationKind::Delete { spans } = &kind {
            if spans.len() > 1 {
                return Err(SyncError::Validation(
                    "split deletes are submitted one span at a time".to_string(),
                ));
            }
        }
        kind.validate(self.document.len())?;

        let inverse = kind.invert(self.document.content());
        let operation = Operation::new(self.local.clone(), self.document.version(), kind);

        self.document.apply(operation.kind());
        self.in_flight.push_back(operation.clone());
        self.record_applied(operation.clone());
        self.state = SyncState::LocalEditPending;

        debug!(
            "Local operation {} applied at version {} ({} in flight)",
            operation.id(),
            self.document.version(),
            self.in_flight.len()
        );

        Ok(LocalSubmission {
            operation,
            inverse,
            version: self.document.version(),
        })
    }

    /// Integrate an operation delivered by the ordered channel
    pub fn receive_remote_operation(&mut self, op: Operation) -> Result<RemoteOutcome> {
        if op.origin() == &self.local {
            let acknowledged = self.acknowledge_local_edit(op.id());
            return Ok(RemoteOutcome {
                version: self.document.version(),
                applied: None,
                conflicts: Vec::new(),
                acknowledged,
                reconciled: 0,
            });
        }

        let base = op.base_version();
        if base > self.document.version() {
            return Err(SyncError::Validation(format!(
                "operation {} is based on version {} but the document is at {}",
                op.id(),
                base,
                self.document.version()
            )));
        }

        let fresh;
        let bridge = match self.bridges.get(op.origin()) {
            Some(bridge) => bridge,
            None => {
                fresh = Bridge::from_history(self.history_floor, &self.history);
                &fresh
            }
        };

        if base < bridge.floor {
            return Err(SyncError::StaleBaseVersion {
                base_version: base,
                floor: bridge.floor,
            });
        }
        let since_floor = base - bridge.floor;
        if since_floor < bridge.own_integrated {
            return Err(SyncError::Validation(format!(
                "operation {} is based on version {} but {} already integrated {} operations after {}",
                op.id(),
                base,
                op.origin(),
                bridge.own_integrated,
                bridge.floor
            )));
        }
        // Foreign operations the origin had applied when it created `op`
        let seen = since_floor - bridge.own_integrated;
        if seen < bridge.foreign_seen {
            if bridge.pruned {
                return Err(SyncError::StaleBaseVersion {
                    base_version: base,
                    floor: bridge.floor + bridge.own_integrated + bridge.foreign_seen,
                });
            }
            return Err(SyncError::Validation(format!(
                "operation {} from {} is based on an older version than its predecessor",
                op.id(),
                op.origin()
            )));
        }

        // The origin saw local operations whose acknowledgment is still on its way
        let implicit = seen.saturating_sub(bridge.foreign_total) as usize;
        if implicit > self.in_flight.len() {
            return Err(SyncError::Validation(format!(
                "operation {} claims {} unseen operations",
                op.id(),
                implicit - self.in_flight.len()
            )));
        }

        let skip = (seen - bridge.foreign_seen) as usize;
        let mut pending: VecDeque<Operation> = bridge
            .pending
            .iter()
            .chain(self.in_flight.iter().take(implicit))
            .skip(skip)
            .cloned()
            .collect();

        let slack: usize = pending
            .iter()
            .chain(self.in_flight.iter())
            .map(|entry| entry.kind().length())
            .sum();
        op.kind()
            .validate(self.document.len().saturating_add(slack))?;

        if !self.in_flight.is_empty() {
            self.state = SyncState::Reconciling;
        }

        let mut conflicts = Vec::new();

        // Bring the operation up to the canonical state
        let mut canonical = op.clone();
        for entry in pending.iter_mut() {
            let transformed = transform(&canonical, entry);
            if let Some(tie_break) = transformed.tie_break {
                conflicts.push(Conflict::from_tie_break(tie_break, entry, &canonical));
            }
            canonical = transformed.a;
            *entry = transformed.b;
        }
        let canonical_version = self.canonical_version() + implicit as u64;
        let canonical = canonical.rebased(canonical_version);

        // Then past the local operations still in flight
        let mut incoming = canonical.clone();
        let mut in_flight: VecDeque<Operation> =
            self.in_flight.iter().skip(implicit).cloned().collect();
        let reconciled = in_flight.len();
        for local in in_flight.iter_mut() {
            let transformed = transform(&incoming, local);
            if let Some(tie_break) = transformed.tie_break {
                conflicts.push(Conflict::from_tie_break(tie_break, local, &incoming));
            }
            incoming = transformed.a;
            let next_base = local.base_version() + 1;
            *local = transformed.b.rebased(next_base);
        }
        let incoming = incoming.rebased(self.document.version());

        if let Err(err) = incoming.kind().validate(self.document.len()) {
            self.state = self.settled_state();
            warn!("Rejected remote operation {}: {}", op.id(), err);
            return Err(err);
        }

        let updated = Bridge {
            floor: bridge.floor,
            own_integrated: bridge.own_integrated + 1,
            foreign_total: bridge.foreign_total + implicit as u64,
            foreign_seen: seen,
            pending,
            pruned: bridge.pruned,
        };

        // Commit
        let mut acknowledged = Vec::with_capacity(implicit);
        for _ in 0..implicit {
            if let Some(id) = self.retire_front() {
                acknowledged.push(id);
            }
        }
        if !acknowledged.is_empty() {
            debug!(
                "{} local operations acknowledged implicitly by {}",
                acknowledged.len(),
                op.origin()
            );
        }
        let origin = op.origin().clone();
        self.bridges.insert(origin.clone(), updated);
        self.record_canonical(canonical, Some(&origin));

        self.in_flight = in_flight;
        self.document.apply(incoming.kind());
        self.record_applied(incoming.clone());
        self.state = self.settled_state();

        debug!(
            "Remote operation {} from {} applied at version {}",
            incoming.id(),
            origin,
            self.document.version()
        );

        Ok(RemoteOutcome {
            version: self.document.version(),
            applied: Some(incoming),
            conflicts,
            acknowledged,
            reconciled,
        })
    }

    /// Retire local operations up to and including `id`.
    ///
    /// Unknown ids (duplicates included) are logged and ignored.
    pub fn acknowledge_local_edit(&mut self, id: OperationId) -> Vec<OperationId> {
        match self.try_acknowledge(id) {
            Ok(retired) => retired,
            Err(err) => {
                warn!("{}", err);
                Vec::new()
            }
        }
    }

    /// Like `acknowledge_local_edit` but reports unknown ids as `UnknownAck`
    pub fn try_acknowledge(&mut self, id: OperationId) -> Result<Vec<OperationId>> {
        let index = self
            .in_flight
            .iter()
            .position(|op| op.id() == id)
            .ok_or(SyncError::UnknownAck(id))?;

        let retired: Vec<OperationId> = (0..=index).filter_map(|_| self.retire_front()).collect();
        self.state = self.settled_state();
        debug!(
            "Acknowledged {} local operations ({} still in flight)",
            retired.len(),
            self.in_flight.len()
        );
        Ok(retired)
    }

    /// Re-express an operation defined at local version `since_version` against the
    /// current document
    pub fn rebase(&self, kind: &OperationKind, since_version: u64) -> Result<OperationKind> {
        if since_version < self.applied_floor {
            return Err(SyncError::StaleBaseVersion {
                base_version: since_version,
                floor: self.applied_floor,
            });
        }
        if since_version > self.document.version() {
            return Err(SyncError::Validation(format!(
                "cannot rebase from future version {}",
                since_version
            )));
        }

        let skip = (since_version - self.applied_floor) as usize;
        Ok(transform_through(kind, &self.local, self.applied.iter().skip(skip)))
    }

    /// Replace the replica with an authoritative snapshot.
    ///
    /// Pending local operations are superseded; operations based on anything older than
    /// the snapshot become stale.
    pub fn resync(&mut self, snapshot: &DocumentSnapshot) {
        info!(
            "Resynchronizing from version {} to snapshot version {} ({} local operations superseded)",
            self.document.version(),
            snapshot.version,
            self.in_flight.len()
        );

        self.document.reset(snapshot);
        self.in_flight.clear();
        self.bridges.clear();
        self.history.clear();
        self.history_floor = snapshot.version;
        self.applied.clear();
        self.applied_floor = snapshot.version;
        self.state = SyncState::Idle;
    }

    /// Drop every unacknowledged local operation; returns how many were dropped
    pub fn clear_in_flight(&mut self) -> usize {
        let dropped = self.in_flight.len();
        self.in_flight.clear();
        self.state = SyncState::Idle;
        dropped
    }

    fn settled_state(&self) -> SyncState {
        if self.in_flight.is_empty() {
            SyncState::Idle
        } else {
            SyncState::LocalEditPending
        }
    }

    /// Oldest in-flight operation becomes canonical
    fn retire_front(&mut self) -> Option<OperationId> {
        let op = self.in_flight.pop_front()?;
        let id = op.id();
        self.record_canonical(op, None);
        Some(id)
    }

    fn record_canonical(&mut self, op: Operation, author: Option<&CollaboratorId>) {
        for (origin, bridge) in self.bridges.iter_mut() {
            if Some(origin) == author {
                continue;
            }
            if bridge.push(op.clone(), self.max_history) {
                warn!(
                    "{} fell more than {} operations behind; its older operations will need a resync",
                    origin, self.max_history
                );
            }
        }

        self.history.push_back(op);
        while self.history.len() > self.max_history {
            self.history.pop_front();
            self.history_floor += 1;
        }
    }

    fn record_applied(&mut self, op: Operation) {
        self.applied.push_back(op);
        while self.applied.len() > self.max_history {
            self.applied.pop_front();
            self.applied_floor += 1;
        }
    }
}
