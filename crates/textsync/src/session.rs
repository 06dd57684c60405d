/// Editor-facing session handle
///
/// One handle per open document. It owns the synchronization controller, the
/// collaborator registry and the undo history, dispatches outbound messages through
/// an unbounded channel and reports changes to registered observers.
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    diff_edits, transform_kinds, Collaborator, CollaboratorId, CollaboratorPatch,
    CollaboratorRegistry, Conflict, ConflictLog, CursorPosition, DocumentSnapshot,
    LocalSubmission, Operation, OperationId, OperationKind, PresenceUpdate, RemoteOutcome,
    Result, SelectionRange, SessionConfig, SessionId, SweepReport, SyncController, SyncError,
    SyncMessage, SyncState, UndoEntry, UndoManager,
};

/// Receiving end of a session's outbound messages
pub type OutboundReceiver = mpsc::UnboundedReceiver<SyncMessage>;

/// Handle returned by `SessionHandle::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Notifications for the editor surface
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentChanged { version: u64, content: String },
    CollaboratorUpdated(Collaborator),
    CollaboratorRemoved { id: CollaboratorId },
    /// Soft notification: the edit still went through
    ConflictDetected(Conflict),
    /// The replica missed history and needs an authoritative snapshot
    ResyncRequired { base_version: u64, floor: u64 },
}

type Observer = Box<dyn FnMut(&SessionEvent) + Send>;

pub struct SessionHandle {
    session_id: SessionId,
    config: SessionConfig,
    controller: SyncController,
    registry: CollaboratorRegistry,
    undo: UndoManager,
    conflicts: ConflictLog,
    outbound: Option<mpsc::UnboundedSender<SyncMessage>>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
    closed: bool,
}

impl SessionHandle {
    /// Open a session on `snapshot` as participant `local`
    pub fn open(
        session_id: SessionId,
        local: CollaboratorId,
        name: impl Into<String>,
        snapshot: DocumentSnapshot,
        config: SessionConfig,
    ) -> Result<(Self, OutboundReceiver)> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut registry =
            CollaboratorRegistry::new(config.heartbeat_timeout(), config.grace_period());
        let me = registry.upsert(
            &local,
            CollaboratorPatch::new().name(name),
            chrono::Utc::now(),
        );

        info!(
            "Opened session {} as {} at version {}",
            session_id, local, snapshot.version
        );

        let handle = Self {
            session_id,
            controller: SyncController::new(local, snapshot, &config),
            registry,
            undo: UndoManager::new(config.undo_limit),
            conflicts: ConflictLog::new(config.conflict_log_capacity),
            outbound: Some(tx),
            observers: Vec::new(),
            next_subscription: 0,
            closed: false,
            config,
        };
        handle.send(SyncMessage::Presence {
            update: PresenceUpdate::Joined { collaborator: me },
        });

        Ok((handle, rx))
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn local_id(&self) -> &CollaboratorId {
        self.controller.local()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.controller.version()
    }

    pub fn state(&self) -> SyncState {
        self.controller.state()
    }

    pub fn in_flight_len(&self) -> usize {
        self.controller.in_flight_len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn document_snapshot(&self) -> DocumentSnapshot {
        self.controller.snapshot()
    }

    /// Submit the editor's whole buffer after a user edit.
    ///
    /// The change against the current document becomes at most a delete and an insert,
    /// undone together. Returns the id of the last operation, or `None` when the text
    /// did not change.
    pub fn submit_local_edit(
        &mut self,
        content: &str,
        cursor: Option<CursorPosition>,
        selection: Option<SelectionRange>,
    ) -> Result<Option<OperationId>> {
        self.ensure_open()?;

        let edits = diff_edits(self.controller.document().content(), content);
        self.reserve(edits.len())?;

        let mut last = None;
        if !edits.is_empty() {
            let group = self.undo.begin_group();
            for kind in edits {
                let submission = self.apply_local(kind)?;
                last = Some(submission.operation.id());
                if let Some(entry) = UndoEntry::from_submission(&submission, group) {
                    self.undo.record_edit(entry);
                }
            }
        }

        if cursor.is_some() || selection.is_some() {
            let mut patch = CollaboratorPatch::new();
            patch.cursor = cursor;
            patch.selection = selection;
            let local = self.local_id().clone();
            self.update_collaborator(&local, patch)?;
        }

        Ok(last)
    }

    /// Submit an operation built by the caller against the current document
    pub fn submit_operation(&mut self, kind: OperationKind) -> Result<Vec<OperationId>> {
        self.ensure_open()?;
        kind.validate(self.controller.document().len())?;

        let pieces: Vec<OperationKind> = kind
            .into_sequential()
            .into_iter()
            .filter(|piece| !piece.is_noop())
            .collect();
        self.reserve(pieces.len())?;

        let group = self.undo.begin_group();
        let mut ids = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let submission = self.apply_local(piece)?;
            ids.push(submission.operation.id());
            if let Some(entry) = UndoEntry::from_submission(&submission, group) {
                self.undo.record_edit(entry);
            }
        }
        Ok(ids)
    }

    /// Integrate a JSON-encoded operation from the channel
    pub fn receive_remote_operation(&mut self, serialized: &str) -> Result<RemoteOutcome> {
        self.ensure_open()?;
        let op = Operation::from_json(serialized)?;
        self.receive_operation(op)
    }

    pub fn receive_operation(&mut self, op: Operation) -> Result<RemoteOutcome> {
        self.ensure_open()?;
        let origin = op.origin().clone();

        let outcome = match self.controller.receive_remote_operation(op) {
            Ok(outcome) => outcome,
            Err(SyncError::StaleBaseVersion {
                base_version,
                floor,
            }) => {
                warn!(
                    "Operation from {} based on version {} predates retained history (floor {}); requesting resync",
                    origin, base_version, floor
                );
                self.emit(SessionEvent::ResyncRequired {
                    base_version,
                    floor,
                });
                self.send(SyncMessage::ResyncRequest {
                    session_id: self.session_id,
                    collaborator: self.local_id().clone(),
                    since_version: self.controller.version(),
                });
                return Err(SyncError::StaleBaseVersion {
                    base_version,
                    floor,
                });
            }
            Err(err) => return Err(err),
        };

        if let Some(applied) = &outcome.applied {
            let was_active = self
                .registry
                .get(&origin)
                .map(|c| c.is_active)
                .unwrap_or(false);
            let author = self
                .registry
                .upsert(&origin, CollaboratorPatch::new(), chrono::Utc::now());
            if !was_active {
                self.emit(SessionEvent::CollaboratorUpdated(author));
            }

            self.after_apply(applied.kind());
        }

        for conflict in &outcome.conflicts {
            debug!("Resolved conflict {:?} with {}", conflict.kind, origin);
            self.conflicts.record(conflict.clone());
            self.emit(SessionEvent::ConflictDetected(conflict.clone()));
        }

        Ok(outcome)
    }

    /// Handle any message delivered by the channel
    pub fn receive_message(&mut self, message: SyncMessage) -> Result<Option<RemoteOutcome>> {
        self.ensure_open()?;
        match message {
            SyncMessage::Operation { operation } => self.receive_operation(operation).map(Some),
            SyncMessage::OperationAck { operation_id } => {
                let acknowledged = self.acknowledge_local_edit(operation_id)?;
                Ok(Some(RemoteOutcome {
                    version: self.controller.version(),
                    applied: None,
                    conflicts: Vec::new(),
                    acknowledged,
                    reconciled: 0,
                }))
            }
            SyncMessage::Presence { update } => {
                if update.collaborator_id() != self.local_id() {
                    if let Some(collaborator) =
                        self.registry.apply_update(&update, chrono::Utc::now())
                    {
                        self.emit(SessionEvent::CollaboratorUpdated(collaborator));
                    }
                }
                Ok(None)
            }
            SyncMessage::ResyncRequest { collaborator, .. } => {
                debug!("Ignoring resync request from {}", collaborator);
                Ok(None)
            }
            SyncMessage::Resync { snapshot } => {
                self.resync(snapshot)?;
                Ok(None)
            }
        }
    }

    /// Channel confirmation that a local operation was sequenced. Idempotent.
    pub fn acknowledge_local_edit(&mut self, id: OperationId) -> Result<Vec<OperationId>> {
        self.ensure_open()?;
        Ok(self.controller.acknowledge_local_edit(id))
    }

    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.registry.all()
    }

    pub fn collaborator(&self, id: &CollaboratorId) -> Option<&Collaborator> {
        self.registry.get(id)
    }

    /// Merge presence data for `id`; updates for the local participant are broadcast
    pub fn update_collaborator(
        &mut self,
        id: &CollaboratorId,
        patch: CollaboratorPatch,
    ) -> Result<Collaborator> {
        self.ensure_open()?;
        let patch = patch.normalized(self.controller.document().content());
        let cursor = patch.cursor;
        let selection = patch.selection;
        let collaborator = self.registry.upsert(id, patch, chrono::Utc::now());

        if id == self.local_id() {
            let mut broadcast = false;
            if let Some(cursor) = cursor {
                self.send(SyncMessage::Presence {
                    update: PresenceUpdate::CursorMoved {
                        id: id.clone(),
                        cursor,
                    },
                });
                broadcast = true;
            }
            if let Some(selection) = selection {
                self.send(SyncMessage::Presence {
                    update: PresenceUpdate::SelectionChanged {
                        id: id.clone(),
                        selection,
                    },
                });
                broadcast = true;
            }
            if !broadcast {
                self.send(SyncMessage::Presence {
                    update: PresenceUpdate::Joined {
                        collaborator: collaborator.clone(),
                    },
                });
            }
        }

        self.emit(SessionEvent::CollaboratorUpdated(collaborator.clone()));
        Ok(collaborator)
    }

    /// Move the local caret
    pub fn move_cursor(&mut self, offset: usize) -> Result<Collaborator> {
        let local = self.local_id().clone();
        let cursor = self.controller.document().cursor_at(offset);
        self.update_collaborator(&local, CollaboratorPatch::new().cursor(cursor))
    }

    /// Disconnect notice for a remote participant
    pub fn collaborator_left(&mut self, id: &CollaboratorId) -> Result<()> {
        self.ensure_open()?;
        if let Some(collaborator) = self.registry.mark_inactive(id, chrono::Utc::now()) {
            self.emit(SessionEvent::CollaboratorUpdated(collaborator));
        }
        Ok(())
    }

    /// Tell peers the local participant is still here
    pub fn heartbeat(&mut self) -> Result<()> {
        self.ensure_open()?;
        let local = self.local_id().clone();
        self.registry.touch(&local, chrono::Utc::now());
        self.send(SyncMessage::Presence {
            update: PresenceUpdate::Heartbeat { id: local },
        });
        Ok(())
    }

    /// Apply heartbeat timeouts and grace periods as of `now`
    pub fn sweep_collaborators(&mut self, now: chrono::DateTime<chrono::Utc>) -> Result<SweepReport> {
        self.ensure_open()?;
        let local = self.local_id().clone();
        self.registry.touch(&local, now);

        let report = self.registry.sweep(now);
        for id in &report.deactivated {
            if let Some(collaborator) = self.registry.get(id).cloned() {
                self.emit(SessionEvent::CollaboratorUpdated(collaborator));
            }
        }
        for id in &report.removed {
            self.emit(SessionEvent::CollaboratorRemoved { id: id.clone() });
        }
        Ok(report)
    }

    pub fn can_undo(&self) -> bool {
        !self.closed && self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        !self.closed && self.undo.can_redo()
    }

    /// Revert the newest local edit group, whatever happened since
    pub fn undo(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let group = self.undo.pop_undo_group();
        if group.is_empty() {
            return Ok(false);
        }

        match self.replay(&group) {
            Ok(submissions) if submissions.is_empty() => {
                debug!("Undo of {} edits changed nothing", group.len());
                Ok(false)
            }
            Ok(submissions) => {
                let redo_group = self.undo.begin_group();
                for submission in &submissions {
                    if let Some(entry) = UndoEntry::from_submission(submission, redo_group) {
                        self.undo.push_redo(entry);
                    }
                }
                debug!("Undid {} edits with {} operations", group.len(), submissions.len());
                Ok(true)
            }
            Err(SyncError::StaleBaseVersion { .. }) => {
                warn!(
                    "Discarding {} undo entries older than the retained history",
                    group.len()
                );
                Ok(false)
            }
            Err(err) => {
                self.undo.restore_undo_group(group);
                Err(err)
            }
        }
    }

    /// Reapply the newest undone group
    pub fn redo(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let group = self.undo.pop_redo_group();
        if group.is_empty() {
            return Ok(false);
        }

        match self.replay(&group) {
            Ok(submissions) if submissions.is_empty() => {
                debug!("Redo of {} edits changed nothing", group.len());
                Ok(false)
            }
            Ok(submissions) => {
                let undo_group = self.undo.begin_group();
                for submission in &submissions {
                    if let Some(entry) = UndoEntry::from_submission(submission, undo_group) {
                        self.undo.push_undo(entry);
                    }
                }
                debug!("Redid {} edits with {} operations", group.len(), submissions.len());
                Ok(true)
            }
            Err(SyncError::StaleBaseVersion { .. }) => {
                warn!(
                    "Discarding {} redo entries older than the retained history",
                    group.len()
                );
                Ok(false)
            }
            Err(err) => {
                self.undo.restore_redo_group(group);
                Err(err)
            }
        }
    }

    /// Replace the document with an authoritative snapshot
    pub fn resync(&mut self, snapshot: DocumentSnapshot) -> Result<()> {
        self.ensure_open()?;
        self.controller.resync(&snapshot);
        self.undo.clear();

        let content = self.controller.document().content().to_string();
        // Carets keep their offsets, clamped to the new text
        for id in self.registry.remap(&OperationKind::insert(0, ""), &content) {
            if let Some(collaborator) = self.registry.get(&id).cloned() {
                self.emit(SessionEvent::CollaboratorUpdated(collaborator));
            }
        }
        self.emit(SessionEvent::DocumentChanged {
            version: self.controller.version(),
            content,
        });
        Ok(())
    }

    /// Conflicts resolved recently, oldest first
    pub fn recent_conflicts(&self) -> Vec<Conflict> {
        self.conflicts.recent()
    }

    /// Register an observer for session events
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// End the session: pending local operations are superseded, later calls fail
    /// with `SessionClosed`
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        let dropped = self.controller.clear_in_flight();
        let local = self.local_id().clone();
        self.send(SyncMessage::Presence {
            update: PresenceUpdate::Left { id: local },
        });
        self.outbound = None;
        self.observers.clear();
        self.closed = true;

        info!(
            "Closed session {} at version {} ({} unacknowledged operations dropped)",
            self.session_id,
            self.controller.version(),
            dropped
        );
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SyncError::SessionClosed);
        }
        Ok(())
    }

    fn reserve(&self, count: usize) -> Result<()> {
        if self.controller.in_flight_len() + count > self.config.max_in_flight {
            return Err(SyncError::PendingLimitExceeded {
                limit: self.config.max_in_flight,
            });
        }
        Ok(())
    }

    fn apply_local(&mut self, kind: OperationKind) -> Result<LocalSubmission> {
        let submission = self.controller.submit_local_edit(kind)?;
        self.after_apply(submission.operation.kind());
        self.send(SyncMessage::Operation {
            operation: submission.operation.clone(),
        });
        Ok(submission)
    }

    /// Rebase every entry of an undo/redo group to now and submit the result
    fn replay(&mut self, group: &[UndoEntry]) -> Result<Vec<LocalSubmission>> {
        let local = self.local_id().clone();
        let mut pieces: Vec<OperationKind> = Vec::new();

        for entry in group {
            let current = self
                .controller
                .rebase(&entry.inverse, entry.version_at_capture)?;
            // Earlier pieces of this group will be applied first
            let current = pieces.iter().fold(current, |kind, piece| {
                transform_kinds(&kind, &local, piece, &local).0
            });
            pieces.extend(
                current
                    .into_sequential()
                    .into_iter()
                    .filter(|piece| !piece.is_noop()),
            );
        }

        self.reserve(pieces.len())?;
        pieces
            .into_iter()
            .map(|kind| self.apply_local(kind))
            .collect()
    }

    fn after_apply(&mut self, kind: &OperationKind) {
        let discarded = self.undo.discard_before(self.controller.applied_floor());
        if discarded > 0 {
            debug!(
                "Dropped {} undo/redo entries older than version {}",
                discarded,
                self.controller.applied_floor()
            );
        }

        let content = self.controller.document().content().to_string();
        for id in self.registry.remap(kind, &content) {
            if let Some(collaborator) = self.registry.get(&id).cloned() {
                self.emit(SessionEvent::CollaboratorUpdated(collaborator));
            }
        }
        self.emit(SessionEvent::DocumentChanged {
            version: self.controller.version(),
            content,
        });
    }

    fn send(&self, message: SyncMessage) {
        if let Some(tx) = &self.outbound {
            if tx.send(message).is_err() {
                debug!("Outbound channel for session {} is closed", self.session_id);
            }
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn open(id: &str, text: &str) -> (SessionHandle, OutboundReceiver) {
        SessionHandle::open(
            SessionId::new(),
            CollaboratorId::new(id),
            id.to_uppercase(),
            DocumentSnapshot::new(text, 0),
            SessionConfig::default(),
        )
        .unwrap()
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<SyncMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_buffer_edit_is_dispatched() {
        let (mut session, mut rx) = open("alice", "hello");
        drain(&mut rx);

        let id = session
            .submit_local_edit("hello world", None, None)
            .unwrap()
            .unwrap();
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            SyncMessage::Operation { operation } => assert_eq!(operation.id(), id),
            other => panic!("unexpected message {:?}", other),
        }

        assert_eq!(session.submit_local_edit("hello world", None, None).unwrap(), None);
        assert_eq!(session.document_snapshot(), DocumentSnapshot::new("hello world", 1));
    }

    #[test]
    fn test_replacement_undoes_as_one_group() {
        let (mut session, _rx) = open("alice", "abcdef");
        session.submit_local_edit("abXYef", None, None).unwrap();
        assert_eq!(session.version(), 2);

        assert!(session.undo().unwrap());
        assert_eq!(session.document_snapshot().content, "abcdef");
        assert!(!session.can_undo());

        assert!(session.redo().unwrap());
        assert_eq!(session.document_snapshot().content, "abXYef");
        assert!(session.can_undo());
        assert!(!session.can_redo());
    }

    #[test]
    fn test_events_reach_subscribers() {
        let (mut session, _rx) = open("alice", "");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = session.subscribe(move |event| {
            if let SessionEvent::DocumentChanged { version, .. } = event {
                sink.lock().unwrap().push(*version);
            }
        });

        session.submit_operation(OperationKind::insert(0, "a")).unwrap();
        session.submit_operation(OperationKind::insert(1, "b")).unwrap();
        assert!(session.unsubscribe(subscription));
        session.submit_operation(OperationKind::insert(2, "c")).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_stale_operation_requests_resync() {
        let (mut session, mut rx) = open("alice", "abc");
        session
            .resync(DocumentSnapshot::new("abcdef", 5))
            .unwrap();
        drain(&mut rx);

        let required = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&required);
        session.subscribe(move |event| {
            if let SessionEvent::ResyncRequired { floor, .. } = event {
                *sink.lock().unwrap() = Some(*floor);
            }
        });

        let stale = Operation::insert(CollaboratorId::new("bob"), 2, 0, "x");
        let err = session.receive_operation(stale).unwrap_err();
        assert!(err.requires_resync());
        assert_eq!(*required.lock().unwrap(), Some(5));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [SyncMessage::ResyncRequest { since_version: 5, .. }]
        ));
    }

    #[test]
    fn test_closed_session_rejects_calls() {
        let (mut session, mut rx) = open("alice", "abc");
        session.submit_operation(OperationKind::insert(3, "d")).unwrap();
        session.close();

        assert!(session.is_closed());
        assert_eq!(session.in_flight_len(), 0);
        assert!(matches!(
            session.submit_operation(OperationKind::insert(0, "x")),
            Err(SyncError::SessionClosed)
        ));
        assert!(matches!(session.undo(), Err(SyncError::SessionClosed)));

        let messages = drain(&mut rx);
        assert!(matches!(
            messages.last(),
            Some(SyncMessage::Presence {
                update: PresenceUpdate::Left { .. }
            })
        ));
    }

    #[test]
    fn test_undo_history_follows_applied_floor() {
        let (mut session, _rx) = SessionHandle::open(
            SessionId::new(),
            CollaboratorId::new("alice"),
            "Alice".to_string(),
            DocumentSnapshot::new("abc", 0),
            SessionConfig {
                max_history: 2,
                ..SessionConfig::default()
            },
        )
        .unwrap();
        session.submit_operation(OperationKind::insert(3, "!")).unwrap();

        let bob = CollaboratorId::new("bob");
        for base in 0..2 {
            session
                .receive_operation(Operation::insert(bob.clone(), base, 0, "b"))
                .unwrap();
        }
        assert!(session.can_undo());

        session
            .receive_operation(Operation::insert(bob, 2, 0, "b"))
            .unwrap();
        assert!(!session.can_undo());
        assert!(!session.undo().unwrap());
        assert_eq!(session.document_snapshot().content, "bbbabc!");
    }

    #[test]
    fn test_undo_of_vanished_text_reports_nothing_done() {
        let (mut session, _rx) = open("alice", "abc");
        let ids = session.submit_operation(OperationKind::insert(3, "XY")).unwrap();
        session.acknowledge_local_edit(ids[0]).unwrap();

        // Bob saw the insert and removed it
        let removal = Operation::delete(CollaboratorId::new("bob"), 1, 3, 2);
        session.receive_operation(removal).unwrap();
        assert_eq!(session.document_snapshot().content, "abc");

        assert!(session.can_undo());
        assert!(!session.undo().unwrap());
        assert!(!session.can_undo());
        assert!(!session.can_redo());
        assert_eq!(session.document_snapshot(), DocumentSnapshot::new("abc", 2));
    }

    #[test]
    fn test_local_cursor_is_broadcast() {
        let (mut session, mut rx) = open("alice", "one\ntwo");
        drain(&mut rx);

        let me = session.move_cursor(5).unwrap();
        assert_eq!(me.cursor.unwrap().line, 1);
        assert_eq!(me.cursor.unwrap().column, 1);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [SyncMessage::Presence {
                update: PresenceUpdate::CursorMoved { .. }
            }]
        ));
    }
}
