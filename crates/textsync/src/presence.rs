/// Collaborator presence for collaborative editing
/// Tracks who is in the document, where their caret is and whether they are still around
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{map_offset, CollaboratorId, CursorPosition, OperationKind, SelectionRange};

/// Color assigned to a collaborator for cursor/selection highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

const PALETTE: [CollaboratorColor; 8] = [
    CollaboratorColor::new(0xE5, 0x39, 0x35),
    CollaboratorColor::new(0x1E, 0x88, 0xE5),
    CollaboratorColor::new(0x43, 0xA0, 0x47),
    CollaboratorColor::new(0xFB, 0x8C, 0x00),
    CollaboratorColor::new(0x8E, 0x24, 0xAA),
    CollaboratorColor::new(0x00, 0x89, 0x7B),
    CollaboratorColor::new(0xD8, 0x1B, 0x60),
    CollaboratorColor::new(0x6D, 0x4C, 0x41),
];

impl CollaboratorColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Palette color picked by hashing the id (FNV-1a), identical on every replica
    pub fn from_id(id: &CollaboratorId) -> Self {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in id.as_str().bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        PALETTE[(hash as usize) % PALETTE.len()]
    }

    /// Convert to hex color string
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// A participant's current state in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: CollaboratorId,
    pub name: String,
    pub color: CollaboratorColor,
    pub cursor: Option<CursorPosition>,
    pub selection: Option<SelectionRange>,
    pub is_active: bool,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub inactive_since: Option<chrono::DateTime<chrono::Utc>>,
}

impl Collaborator {
    pub fn new(id: CollaboratorId, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            name: id.to_string(),
            color: CollaboratorColor::from_id(&id),
            id,
            cursor: None,
            selection: None,
            is_active: true,
            last_seen: now,
            inactive_since: None,
        }
    }

    /// Update last activity timestamp and reactivate
    pub fn touch(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.last_seen = now;
        self.is_active = true;
        self.inactive_since = None;
    }
}

/// Partial update merged into a collaborator entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorPatch {
    pub name: Option<String>,
    pub color: Option<CollaboratorColor>,
    pub cursor: Option<CursorPosition>,
    pub selection: Option<SelectionRange>,
}

impl CollaboratorPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn color(mut self, color: CollaboratorColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn cursor(mut self, cursor: CursorPosition) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn selection(mut self, selection: SelectionRange) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Clamp cursor and selection to `content`, recomputing line/column
    pub(crate) fn normalized(mut self, content: &str) -> Self {
        self.cursor = self.cursor.map(|c| CursorPosition::at(content, c.offset));
        self.selection = self.selection.map(|s| s.normalized(content));
        self
    }
}

/// Collaborators whose status changed during a sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub deactivated: Vec<CollaboratorId>,
    pub removed: Vec<CollaboratorId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.deactivated.is_empty() && self.removed.is_empty()
    }
}

/// Registry of every known participant, ordered by id
#[derive(Debug, Clone)]
pub struct CollaboratorRegistry {
    collaborators: BTreeMap<CollaboratorId, Collaborator>,
    heartbeat_timeout: chrono::Duration,
    grace_period: chrono::Duration,
}

impl CollaboratorRegistry {
    pub fn new(heartbeat_timeout: chrono::Duration, grace_period: chrono::Duration) -> Self {
        Self {
            collaborators: BTreeMap::new(),
            heartbeat_timeout,
            grace_period,
        }
    }

    /// Merge `patch` into the entry for `id`, creating it if needed
    pub fn upsert(
        &mut self,
        id: &CollaboratorId,
        patch: CollaboratorPatch,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Collaborator {
        let entry = self
            .collaborators
            .entry(id.clone())
            .or_insert_with(|| Collaborator::new(id.clone(), now));

        if let Some(name) = patch.name {
            entry.name = name;
        }
        if let Some(color) = patch.color {
            entry.color = color;
        }
        if let Some(cursor) = patch.cursor {
            entry.cursor = Some(cursor);
        }
        if let Some(selection) = patch.selection {
            entry.selection = Some(selection);
        }
        entry.touch(now);
        entry.clone()
    }

    /// Heartbeat from `id`; false when unknown
    pub fn touch(&mut self, id: &CollaboratorId, now: chrono::DateTime<chrono::Utc>) -> bool {
        match self.collaborators.get_mut(id) {
            Some(collaborator) => {
                collaborator.touch(now);
                true
            }
            None => false,
        }
    }

    /// Disconnect notice; the entry stays until the grace period elapses
    pub fn mark_inactive(
        &mut self,
        id: &CollaboratorId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Collaborator> {
        let collaborator = self.collaborators.get_mut(id)?;
        if collaborator.is_active {
            collaborator.is_active = false;
            collaborator.inactive_since = Some(now);
        }
        Some(collaborator.clone())
    }

    pub fn remove(&mut self, id: &CollaboratorId) -> Option<Collaborator> {
        self.collaborators.remove(id)
    }

    pub fn get(&self, id: &CollaboratorId) -> Option<&Collaborator> {
        self.collaborators.get(id)
    }

    pub fn all(&self) -> Vec<Collaborator> {
        self.collaborators.values().cloned().collect()
    }

    pub fn active(&self) -> Vec<Collaborator> {
        self.collaborators
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.collaborators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collaborators.is_empty()
    }

    /// Move every stored caret and selection across an applied operation.
    ///
    /// `content` is the text after the operation. Returns the collaborators whose
    /// position changed.
    pub fn remap(&mut self, kind: &OperationKind, content: &str) -> Vec<CollaboratorId> {
        let mut changed = Vec::new();
        for collaborator in self.collaborators.values_mut() {
            let cursor = collaborator
                .cursor
                .map(|c| CursorPosition::at(content, map_offset(c.offset, kind)));
            let selection = collaborator
                .selection
                .map(|s| s.remapped(content, |offset| map_offset(offset, kind)));

            if cursor != collaborator.cursor || selection != collaborator.selection {
                collaborator.cursor = cursor;
                collaborator.selection = selection;
                changed.push(collaborator.id.clone());
            }
        }
        changed
    }

    /// Deactivate silent collaborators and drop those inactive past the grace period
    pub fn sweep(&mut self, now: chrono::DateTime<chrono::Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for collaborator in self.collaborators.values_mut() {
            if collaborator.is_active && now - collaborator.last_seen > self.heartbeat_timeout {
                collaborator.is_active = false;
                collaborator.inactive_since = Some(now);
                report.deactivated.push(collaborator.id.clone());
            }
        }

        let grace_period = self.grace_period;
        self.collaborators.retain(|id, collaborator| {
            let expired = collaborator
                .inactive_since
                .map(|since| now - since > grace_period)
                .unwrap_or(false);
            if expired {
                report.removed.push(id.clone());
            }
            !expired
        });

        report
    }

    /// Apply a presence message from another replica
    pub fn apply_update(
        &mut self,
        update: &PresenceUpdate,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Collaborator> {
        match update {
            PresenceUpdate::Joined { collaborator } => {
                let patch = CollaboratorPatch {
                    name: Some(collaborator.name.clone()),
                    color: Some(collaborator.color),
                    cursor: collaborator.cursor,
                    selection: collaborator.selection,
                };
                Some(self.upsert(&collaborator.id, patch, now))
            }
            PresenceUpdate::Left { id } => self.mark_inactive(id, now),
            PresenceUpdate::CursorMoved { id, cursor } => {
                Some(self.upsert(id, CollaboratorPatch::new().cursor(*cursor), now))
            }
            PresenceUpdate::SelectionChanged { id, selection } => {
                Some(self.upsert(id, CollaboratorPatch::new().selection(*selection), now))
            }
            PresenceUpdate::Heartbeat { id } => {
                if self.touch(id, now) {
                    self.get(id).cloned()
                } else {
                    Some(self.upsert(id, CollaboratorPatch::new(), now))
                }
            }
        }
    }
}

/// Presence message exchanged over the sync channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PresenceUpdate {
    #[serde(rename = "joined")]
    Joined { collaborator: Collaborator },

    #[serde(rename = "left")]
    Left { id: CollaboratorId },

    #[serde(rename = "cursor_moved")]
    CursorMoved {
        id: CollaboratorId,
        cursor: CursorPosition,
    },

    #[serde(rename = "selection_changed")]
    SelectionChanged {
        id: CollaboratorId,
        selection: SelectionRange,
    },

    #[serde(rename = "heartbeat")]
    Heartbeat { id: CollaboratorId },
}

impl PresenceUpdate {
    /// Participant the message is about
    pub fn collaborator_id(&self) -> &CollaboratorId {
        match self {
            PresenceUpdate::Joined { collaborator } => &collaborator.id,
            PresenceUpdate::Left { id }
            | PresenceUpdate::CursorMoved { id, .. }
            | PresenceUpdate::SelectionChanged { id, .. }
            | PresenceUpdate::Heartbeat { id } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CollaboratorRegistry {
        CollaboratorRegistry::new(chrono::Duration::seconds(30), chrono::Duration::seconds(300))
    }

    #[test]
    fn test_color_is_deterministic() {
        let id = CollaboratorId::new("alice");
        let color = CollaboratorColor::from_id(&id);
        assert_eq!(color, CollaboratorColor::from_id(&CollaboratorId::new("alice")));

        let hex = color.to_hex();
        assert!(hex.starts_with('#'));
        assert_eq!(hex.len(), 7);
    }

    #[test]
    fn test_upsert_merges_patch() {
        let mut registry = registry();
        let now = chrono::Utc::now();
        let alice = CollaboratorId::new("alice");

        registry.upsert(&alice, CollaboratorPatch::new().name("Alice"), now);
        let text = "hello";
        let updated = registry.upsert(
            &alice,
            CollaboratorPatch::new().cursor(CursorPosition::at(text, 3)),
            now,
        );

        assert_eq!(updated.name, "Alice");
        assert_eq!(updated.cursor.unwrap().offset, 3);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remap_follows_cursor_rule() {
        let mut registry = registry();
        let now = chrono::Utc::now();
        let alice = CollaboratorId::new("alice");
        let bob = CollaboratorId::new("bob");

        registry.upsert(&alice, CollaboratorPatch::new().cursor(CursorPosition::at("abcdef", 2)), now);
        registry.upsert(&bob, CollaboratorPatch::new().cursor(CursorPosition::at("abcdef", 5)), now);

        // Insert at the caret pushes it right
        let changed = registry.remap(&OperationKind::insert(2, "XY"), "abXYcdef");
        assert_eq!(changed, vec![alice.clone(), bob.clone()]);
        assert_eq!(registry.get(&alice).unwrap().cursor.unwrap().offset, 4);
        assert_eq!(registry.get(&bob).unwrap().cursor.unwrap().offset, 7);

        // A delete spanning the caret clamps it to the range start
        registry.remap(&OperationKind::delete(5, 3), "abXYc");
        assert_eq!(registry.get(&bob).unwrap().cursor.unwrap().offset, 5);
        assert_eq!(registry.get(&alice).unwrap().cursor.unwrap().offset, 4);
    }

    #[test]
    fn test_remap_moves_selection_and_line() {
        let mut registry = registry();
        let now = chrono::Utc::now();
        let alice = CollaboratorId::new("alice");
        let before = "ab\ncd";
        registry.upsert(
            &alice,
            CollaboratorPatch::new().selection(SelectionRange::from_offsets(before, 3, 5)),
            now,
        );

        registry.remap(&OperationKind::insert(0, "\n"), "\nab\ncd");
        let selection = registry.get(&alice).unwrap().selection.unwrap();
        assert_eq!(selection.start().offset, 4);
        assert_eq!(selection.start().line, 2);
        assert_eq!(selection.end().offset, 6);
    }

    #[test]
    fn test_sweep_deactivates_then_removes() {
        let mut registry = registry();
        let start = chrono::Utc::now();
        let alice = CollaboratorId::new("alice");
        let bob = CollaboratorId::new("bob");
        registry.upsert(&alice, CollaboratorPatch::new(), start);
        registry.upsert(&bob, CollaboratorPatch::new(), start);

        // Bob keeps sending heartbeats
        let later = start + chrono::Duration::seconds(31);
        registry.touch(&bob, later);
        let report = registry.sweep(later);
        assert_eq!(report.deactivated, vec![alice.clone()]);
        assert!(report.removed.is_empty());
        assert_eq!(registry.active().len(), 1);

        let much_later = later + chrono::Duration::seconds(301);
        registry.touch(&bob, much_later);
        let report = registry.sweep(much_later);
        assert_eq!(report.removed, vec![alice.clone()]);
        assert!(registry.get(&alice).is_none());
        assert!(registry.get(&bob).unwrap().is_active);
    }

    #[test]
    fn test_left_then_return_reactivates() {
        let mut registry = registry();
        let now = chrono::Utc::now();
        let alice = CollaboratorId::new("alice");
        registry.upsert(&alice, CollaboratorPatch::new(), now);

        let left = registry
            .apply_update(&PresenceUpdate::Left { id: alice.clone() }, now)
            .unwrap();
        assert!(!left.is_active);

        let back = registry
            .apply_update(&PresenceUpdate::Heartbeat { id: alice.clone() }, now)
            .unwrap();
        assert!(back.is_active);
        assert!(back.inactive_since.is_none());
    }

    #[test]
    fn test_presence_update_json_is_tagged() {
        let update = PresenceUpdate::Heartbeat {
            id: CollaboratorId::new("bob"),
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains(r#""type":"heartbeat""#));
        let parsed: PresenceUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, update);
    }
}
