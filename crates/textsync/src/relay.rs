/// In-memory ordered delivery channel
///
/// Sequences everything replicas publish into one log and lets each replica consume
/// it at its own pace. A replica's own operations come back as acknowledgments at
/// their position in the sequence, which is exactly the ordering the sync controller
/// relies on. Used by tests and the simulator; a networked relay provides the same
/// guarantees.
use std::collections::HashMap;
use tracing::debug;

use crate::{CollaboratorId, OutboundReceiver, Result, SessionHandle, SessionId, SyncMessage};

/// A message in the relay's global sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Sequenced {
    pub sequence: u64,
    pub author: CollaboratorId,
    pub message: SyncMessage,
}

#[derive(Debug, Default)]
pub struct LoopbackRelay {
    log: Vec<Sequenced>,
    cursors: HashMap<CollaboratorId, usize>,
    resync_requests: Vec<(SessionId, CollaboratorId, u64)>,
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering to `id` from the beginning of the sequence
    pub fn register(&mut self, id: CollaboratorId) {
        self.cursors.entry(id).or_insert(0);
    }

    /// Append a message to the global sequence
    pub fn publish(&mut self, author: CollaboratorId, message: SyncMessage) -> u64 {
        let sequence = self.log.len() as u64;
        self.log.push(Sequenced {
            sequence,
            author,
            message,
        });
        sequence
    }

    /// Move everything a session has sent so far into the sequence.
    ///
    /// Resync requests are kept aside for whoever can answer them with a snapshot.
    pub fn collect(&mut self, author: &CollaboratorId, outbound: &mut OutboundReceiver) -> usize {
        let mut collected = 0;
        while let Ok(message) = outbound.try_recv() {
            match message {
                SyncMessage::ResyncRequest {
                    session_id,
                    collaborator,
                    since_version,
                } => {
                    debug!("Resync requested by {} at version {}", collaborator, since_version);
                    self.resync_requests
                        .push((session_id, collaborator, since_version));
                }
                message => {
                    self.publish(author.clone(), message);
                    collected += 1;
                }
            }
        }
        collected
    }

    /// Deliver up to `max` pending messages to `session` (all when `None`).
    ///
    /// The session's own operations are delivered as acknowledgments and its own
    /// presence is skipped. A message that fails to integrate is still consumed.
    pub fn deliver(
        &mut self,
        session: &mut SessionHandle,
        max: Option<usize>,
    ) -> Result<usize> {
        let id = session.local_id().clone();
        let start = *self.cursors.entry(id.clone()).or_insert(0);
        let end = match max {
            Some(max) => (start + max).min(self.log.len()),
            None => self.log.len(),
        };

        for index in start..end {
            self.cursors.insert(id.clone(), index + 1);
            let entry = &self.log[index];
            let message = if entry.author == id {
                match &entry.message {
                    SyncMessage::Operation { operation } => SyncMessage::OperationAck {
                        operation_id: operation.id(),
                    },
                    _ => continue,
                }
            } else {
                entry.message.clone()
            };
            session.receive_message(message)?;
        }

        Ok(end - start)
    }

    /// Messages `id` has not consumed yet
    pub fn pending_for(&self, id: &CollaboratorId) -> usize {
        let cursor = self.cursors.get(id).copied().unwrap_or(0);
        self.log.len().saturating_sub(cursor)
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn messages(&self) -> &[Sequenced] {
        &self.log
    }

    /// Take the resync requests gathered so far
    pub fn take_resync_requests(&mut self) -> Vec<(SessionId, CollaboratorId, u64)> {
        std::mem::take(&mut self.resync_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentSnapshot, OperationKind, SessionConfig};

    #[test]
    fn test_own_operation_returns_as_ack() {
        let alice_id = CollaboratorId::new("alice");
        let (mut alice, mut outbound) = SessionHandle::open(
            SessionId::new(),
            alice_id.clone(),
            "Alice",
            DocumentSnapshot::new("", 0),
            SessionConfig::default(),
        )
        .unwrap();

        let mut relay = LoopbackRelay::new();
        relay.register(alice_id.clone());
        alice.submit_operation(OperationKind::insert(0, "hi")).unwrap();
        assert_eq!(relay.collect(&alice_id, &mut outbound), 2);
        assert_eq!(alice.in_flight_len(), 1);

        assert_eq!(relay.deliver(&mut alice, Some(1)).unwrap(), 1);
        assert_eq!(relay.pending_for(&alice_id), 1);
        relay.deliver(&mut alice, None).unwrap();
        assert_eq!(alice.in_flight_len(), 0);
        assert_eq!(relay.pending_for(&alice_id), 0);
    }
}
