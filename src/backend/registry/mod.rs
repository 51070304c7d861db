//! Session Registry
//!
//! Process-wide map from connection to `(user, channel, doc)` plus the
//! two reverse indexes used for room fan-out. All mutations update the
//! session fields and the indexes under one lock, so a broadcaster can
//! never observe a session in a room it has already left.
//!
//! Fan-out is best-effort per socket: every session owns a bounded
//! outbound queue drained by its writer task. A queue that is full marks
//! the session for close through its out-of-band close signal (the frame
//! queue of a stalled client cannot accept anything more, including a
//! goodbye) and the fan-out continues to the rest of the room.
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::shared::Envelope;

/// Capacity of one session's outbound queue. A client that cannot drain
/// this many frames is closed rather than allowed to stall the room.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Close code for a server-side failure (overflow, invariant breach).
pub const CLOSE_SERVER_ERROR: u16 = 1011;
/// Close code for server shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code for a failed authentication handshake.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Immutable view of one session's registry state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub current_channel: Option<Uuid>,
    pub current_doc: Option<Uuid>,
}

/// One entry of a `channelUsers` presence listing: the user plus the doc
/// they are viewing, as a coarse presence cue.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub user_id: Uuid,
    pub current_doc: Option<Uuid>,
}

struct SessionEntry {
    user_id: Uuid,
    outbound: mpsc::Sender<Envelope>,
    close: watch::Sender<Option<u16>>,
    current_channel: Option<Uuid>,
    current_doc: Option<Uuid>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, SessionEntry>,
    channel_index: HashMap<Uuid, HashSet<Uuid>>,
    doc_index: HashMap<Uuid, HashSet<Uuid>>,
}

impl RegistryInner {
    fn detach_doc_locked(&mut self, session_id: Uuid) -> Option<Uuid> {
        let entry = self.sessions.get_mut(&session_id)?;
        let doc_id = entry.current_doc.take()?;
        if let Some(members) = self.doc_index.get_mut(&doc_id) {
            members.remove(&session_id);
            if members.is_empty() {
                self.doc_index.remove(&doc_id);
            }
        }
        Some(doc_id)
    }

    fn detach_channel_locked(&mut self, session_id: Uuid) -> Option<Uuid> {
        // Leaving a channel always implies leaving any doc inside it.
        self.detach_doc_locked(session_id);
        let entry = self.sessions.get_mut(&session_id)?;
        let channel_id = entry.current_channel.take()?;
        if let Some(members) = self.channel_index.get_mut(&channel_id) {
            members.remove(&session_id);
            if members.is_empty() {
                self.channel_index.remove(&channel_id);
            }
        }
        Some(channel_id)
    }
}

/// The registry. One per process; handlers share it behind an `Arc`.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly authenticated connection. Returns its session id.
    pub fn register(
        &self,
        user_id: Uuid,
        outbound: mpsc::Sender<Envelope>,
        close: watch::Sender<Option<u16>>,
    ) -> Uuid {
        let session_id = Uuid::new_v4();
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.sessions.insert(
            session_id,
            SessionEntry {
                user_id,
                outbound,
                close,
                current_channel: None,
                current_doc: None,
            },
        );
        session_id
    }

    /// Drop a closed connection from all rooms. Returns the rooms it was
    /// in so the caller can emit leave broadcasts and run last-viewer
    /// handling.
    pub fn unregister(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let snapshot = {
            let entry = inner.sessions.get(&session_id)?;
            SessionSnapshot {
                session_id,
                user_id: entry.user_id,
                current_channel: entry.current_channel,
                current_doc: entry.current_doc,
            }
        };
        inner.detach_channel_locked(session_id);
        inner.sessions.remove(&session_id);
        Some(snapshot)
    }

    pub fn snapshot(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.sessions.get(&session_id).map(|entry| SessionSnapshot {
            session_id,
            user_id: entry.user_id,
            current_channel: entry.current_channel,
            current_doc: entry.current_doc,
        })
    }

    /// Move the session into a channel room, leaving any previous channel
    /// (and doc) first.
    pub fn attach_channel(&self, session_id: Uuid, channel_id: Uuid) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.sessions.contains_key(&session_id) {
            return false;
        }
        inner.detach_channel_locked(session_id);
        if let Some(entry) = inner.sessions.get_mut(&session_id) {
            entry.current_channel = Some(channel_id);
        }
        inner
            .channel_index
            .entry(channel_id)
            .or_default()
            .insert(session_id);
        true
    }

    /// Leave the current channel room. Returns the channel left, if any.
    pub fn detach_channel(&self, session_id: Uuid) -> Option<Uuid> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.detach_channel_locked(session_id)
    }

    /// Move the session into a doc room. The session must already be in a
    /// channel; the caller has verified the doc belongs to it.
    pub fn attach_doc(&self, session_id: Uuid, doc_id: Uuid) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        match inner.sessions.get(&session_id) {
            Some(entry) if entry.current_channel.is_some() => {}
            _ => return false,
        }
        inner.detach_doc_locked(session_id);
        if let Some(entry) = inner.sessions.get_mut(&session_id) {
            entry.current_doc = Some(doc_id);
        }
        inner.doc_index.entry(doc_id).or_default().insert(session_id);
        true
    }

    /// Leave the current doc room. Returns the doc left, if any.
    pub fn detach_doc(&self, session_id: Uuid) -> Option<Uuid> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.detach_doc_locked(session_id)
    }

    /// Distinct users in a channel room, each with the doc they are
    /// viewing as a presence cue.
    pub fn channel_users(&self, channel_id: Uuid) -> Vec<PresenceUser> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut seen: HashMap<Uuid, Option<Uuid>> = HashMap::new();
        if let Some(members) = inner.channel_index.get(&channel_id) {
            for session_id in members {
                if let Some(entry) = inner.sessions.get(session_id) {
                    let slot = seen.entry(entry.user_id).or_insert(None);
                    if slot.is_none() {
                        *slot = entry.current_doc;
                    }
                }
            }
        }
        let mut users: Vec<PresenceUser> = seen
            .into_iter()
            .map(|(user_id, current_doc)| PresenceUser {
                user_id,
                current_doc,
            })
            .collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    /// Distinct users viewing a doc.
    pub fn doc_users(&self, doc_id: Uuid) -> Vec<Uuid> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut users: Vec<Uuid> = inner
            .doc_index
            .get(&doc_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|session_id| inner.sessions.get(session_id))
                    .map(|entry| entry.user_id)
                    .collect::<HashSet<_>>()
            })
            .unwrap_or_default()
            .into_iter()
            .collect();
        users.sort();
        users
    }

    pub fn doc_user_count(&self, doc_id: Uuid) -> usize {
        self.doc_users(doc_id).len()
    }

    /// Queue a frame for one session. Returns false when the session is
    /// gone or its queue is full.
    pub fn send_to(&self, session_id: Uuid, envelope: Envelope) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        match inner.sessions.get(&session_id) {
            Some(entry) => entry.outbound.try_send(envelope).is_ok(),
            None => false,
        }
    }

    /// Signal a session's writer to close the socket with `code`.
    pub fn kick(&self, session_id: Uuid, code: u16) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        match inner.sessions.get(&session_id) {
            Some(entry) => entry.close.send(Some(code)).is_ok(),
            None => false,
        }
    }

    /// Signal every session to close; used by shutdown.
    pub fn kick_all(&self, code: u16) {
        let inner = self.inner.read().expect("registry lock poisoned");
        for entry in inner.sessions.values() {
            let _ = entry.close.send(Some(code));
        }
    }

    /// Fan an envelope out to every session in a channel room.
    pub fn broadcast_to_channel(
        &self,
        channel_id: Uuid,
        envelope: &Envelope,
        exclude: Option<Uuid>,
    ) -> BroadcastReport {
        self.broadcast_room(RoomKind::Channel, channel_id, envelope, exclude)
    }

    /// Fan an envelope out to every session in a doc room.
    pub fn broadcast_to_doc(
        &self,
        doc_id: Uuid,
        envelope: &Envelope,
        exclude: Option<Uuid>,
    ) -> BroadcastReport {
        self.broadcast_room(RoomKind::Doc, doc_id, envelope, exclude)
    }

    fn broadcast_room(
        &self,
        kind: RoomKind,
        room_key: Uuid,
        envelope: &Envelope,
        exclude: Option<Uuid>,
    ) -> BroadcastReport {
        let inner = self.inner.read().expect("registry lock poisoned");
        let index = match kind {
            RoomKind::Channel => &inner.channel_index,
            RoomKind::Doc => &inner.doc_index,
        };
        let mut report = BroadcastReport::default();
        let Some(members) = index.get(&room_key) else {
            return report;
        };
        for session_id in members {
            if Some(*session_id) == exclude {
                continue;
            }
            let Some(entry) = inner.sessions.get(session_id) else {
                continue;
            };
            match entry.outbound.try_send(envelope.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // A receiver this far behind gets closed, not waited on.
                    let _ = entry.close.send(Some(CLOSE_SERVER_ERROR));
                    report.overflowed.push(*session_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    report.gone.push(*session_id);
                }
            }
        }
        report
    }

    /// Every live session id; used by shutdown.
    pub fn all_session_ids(&self) -> Vec<Uuid> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.sessions.keys().copied().collect()
    }

    /// Session ids currently attached to a doc room.
    pub fn sessions_in_doc(&self, doc_id: Uuid) -> Vec<Uuid> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .doc_index
            .get(&doc_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every doc id that currently has viewers.
    pub fn docs_with_viewers(&self) -> Vec<Uuid> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.doc_index.keys().copied().collect()
    }
}

enum RoomKind {
    Channel,
    Doc,
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Sessions whose queue was full; their close signal has been set.
    pub overflowed: Vec<Uuid>,
    /// Sessions whose writer has already gone away.
    pub gone: Vec<Uuid>,
}
