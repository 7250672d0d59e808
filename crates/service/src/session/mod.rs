pub mod registry;

use ahash::{HashMap, HashMapExt};

use relay_codec::control::SessionPreview;

pub type ConnectionId = u32;
pub type LocalId = u32;
pub type SessionId = u64;

/// One room (C4): host identity, configurable name/capacity, and a
/// bidirectional `connectionId <-> localId` mapping seeded with
/// `{hostConnectionId <-> 1}`.
///
/// `LocalId` assignment is monotonic for the session's whole lifetime
/// (`next_local_id` only ever grows) rather than recomputed from the
/// current member count, so a departing client's id is never handed to a
/// later joiner even though both describe themselves as "current member
/// count + 1" at the moment they're assigned — see DESIGN.md.
pub struct Session {
    session_id: SessionId,
    host_connection_id: ConnectionId,
    name: String,
    max_members: u32,
    by_connection: HashMap<ConnectionId, LocalId>,
    by_local: HashMap<LocalId, ConnectionId>,
    next_local_id: LocalId,
    /// Set while the session is being torn down so in-flight payloads
    /// arriving concurrently are dropped silently instead of racing the
    /// teardown (REDESIGN FLAGS: "session destruction with concurrent
    /// sends").
    tombstoned: bool,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        host_connection_id: ConnectionId,
        name: String,
        max_members: u32,
    ) -> Self {
        let mut by_connection = HashMap::with_capacity(max_members as usize);
        let mut by_local = HashMap::with_capacity(max_members as usize);
        by_connection.insert(host_connection_id, 1);
        by_local.insert(1, host_connection_id);

        Self {
            session_id,
            host_connection_id,
            name,
            max_members,
            by_connection,
            by_local,
            next_local_id: 2,
            tombstoned: false,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn host_connection_id(&self) -> ConnectionId {
        self.host_connection_id
    }

    pub fn member_count(&self) -> u32 {
        self.by_connection.len() as u32
    }

    /// `current = |BiMap|`, `current >= maxMembers`.
    pub fn is_full(&self) -> (bool, u32) {
        let current = self.member_count();
        (current >= self.max_members, current)
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned
    }

    pub fn tombstone(&mut self) {
        self.tombstoned = true;
    }

    /// Replace both `name` and `maxMembers` atomically. Lowering
    /// `maxMembers` below the current count is legal: no one is evicted,
    /// but no new joins are admitted until membership drops below the
    /// new cap (§4.3).
    pub fn modify_info(&mut self, name: String, max_members: u32) {
        self.name = name;
        self.max_members = max_members;
    }

    /// Admit a new client, assigning it the next never-reused `LocalId`.
    /// Returns `None` if the session is already full.
    pub fn join(&mut self, connection_id: ConnectionId) -> Option<LocalId> {
        if self.is_full().0 {
            return None;
        }

        let local_id = self.next_local_id;
        self.next_local_id += 1;

        self.by_connection.insert(connection_id, local_id);
        self.by_local.insert(local_id, connection_id);
        Some(local_id)
    }

    /// Remove a member (host or client) from the BiMap, returning its
    /// `LocalId` if it was present.
    pub fn remove_member(&mut self, connection_id: ConnectionId) -> Option<LocalId> {
        let local_id = self.by_connection.remove(&connection_id)?;
        self.by_local.remove(&local_id);
        Some(local_id)
    }

    pub fn connection_for_local(&self, local_id: LocalId) -> Option<ConnectionId> {
        self.by_local.get(&local_id).copied()
    }

    pub fn local_for_connection(&self, connection_id: ConnectionId) -> Option<LocalId> {
        self.by_connection.get(&connection_id).copied()
    }

    pub fn members(&self) -> impl Iterator<Item = (ConnectionId, LocalId)> + '_ {
        self.by_connection.iter().map(|(&c, &l)| (c, l))
    }

    pub fn to_preview(&self) -> SessionPreview {
        SessionPreview {
            session_id: self.session_id,
            name: self.name.clone(),
            max_members: self.max_members,
            current_members: self.member_count(),
        }
    }

    #[cfg(test)]
    fn name(&self) -> &str {
        &self.name
    }
}
