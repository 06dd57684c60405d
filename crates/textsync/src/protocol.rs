/// Messages exchanged over the ordered delivery channel
use serde::{Deserialize, Serialize};

use crate::{
    CollaboratorId, DocumentSnapshot, Operation, OperationId, PresenceUpdate, Result, SessionId,
    SyncError,
};

/// Message types exchanged between replicas and the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    // Operation synchronization
    #[serde(rename = "operation")]
    Operation { operation: Operation },

    #[serde(rename = "operation_ack")]
    OperationAck { operation_id: OperationId },

    // Presence updates
    #[serde(rename = "presence")]
    Presence { update: PresenceUpdate },

    // Recovery
    #[serde(rename = "resync_request")]
    ResyncRequest {
        session_id: SessionId,
        collaborator: CollaboratorId,
        since_version: u64,
    },

    #[serde(rename = "resync")]
    Resync { snapshot: DocumentSnapshot },
}

impl SyncMessage {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}

impl Operation {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    /// Compact binary encoding for transports that do not need to be human readable
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}
