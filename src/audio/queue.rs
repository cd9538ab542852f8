use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{GuildId, UserId};
use std::{collections::VecDeque, sync::Arc};
use tracing::debug;

use crate::error::QueueError;

/// A single queued entry. Immutable once created except for its position in
/// the queue; the playable handle is produced later, when the playback loop
/// resolves the reference.
#[derive(Debug, Clone)]
pub struct TrackRequest {
    /// Raw user input: link, search term, or local file path.
    pub reference: String,
    /// Title known ahead of playback (playlist imports carry one).
    pub resolved_title: Option<String>,
    #[allow(dead_code)]
    pub requested_by: UserId,
    #[allow(dead_code)]
    pub added_at: DateTime<Utc>,
}

impl TrackRequest {
    pub fn new(reference: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            reference: reference.into(),
            resolved_title: None,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.resolved_title = Some(title.into());
        self
    }

    /// What a user sees in listings: the resolved title when known, the raw
    /// reference otherwise.
    pub fn display_title(&self) -> &str {
        self.resolved_title.as_deref().unwrap_or(&self.reference)
    }
}

/// Per-guild FIFO queues, safe under concurrent mutation from independent
/// command invocations. One lock per guild; operations for different guilds
/// never contend with each other.
///
/// Every operation is a single atomic step over the guild's queue, so an
/// index observed in a `snapshot` still means the same entry in a
/// `remove_at` issued right after (short of another mutation winning the
/// lock in between, which is inherent to the human-paced command surface).
#[derive(Debug, Default)]
pub struct GuildQueueStore {
    queues: DashMap<GuildId, Arc<Mutex<VecDeque<TrackRequest>>>>,
}

impl GuildQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// An absent queue and an empty queue are indistinguishable from the
    /// outside; the entry is created on first use and kept for the process
    /// lifetime.
    fn queue(&self, guild_id: GuildId) -> Arc<Mutex<VecDeque<TrackRequest>>> {
        self.queues.entry(guild_id).or_default().clone()
    }

    /// Appends to the tail. Returns the new length.
    pub fn append(&self, guild_id: GuildId, request: TrackRequest) -> usize {
        let queue = self.queue(guild_id);
        let mut queue = queue.lock();
        queue.push_back(request);
        debug!(guild = guild_id.get(), len = queue.len(), "queued track");
        queue.len()
    }

    /// Appends a batch preserving its order, as one atomic step. Returns the
    /// new length.
    pub fn append_bulk(&self, guild_id: GuildId, requests: Vec<TrackRequest>) -> usize {
        let queue = self.queue(guild_id);
        let mut queue = queue.lock();
        queue.extend(requests);
        debug!(guild = guild_id.get(), len = queue.len(), "queued batch");
        queue.len()
    }

    /// Removes the entry at `index`, bounds-checked against the length at
    /// the instant of removal.
    pub fn remove_at(&self, guild_id: GuildId, index: usize) -> Result<TrackRequest, QueueError> {
        let queue = self.queue(guild_id);
        let mut queue = queue.lock();
        let len = queue.len();
        queue
            .remove(index)
            .ok_or(QueueError::IndexOutOfRange { index, len })
    }

    /// Atomically removes and returns the head. This is the only way the
    /// playback loop consumes work, so no two consumers can dequeue the same
    /// entry.
    pub fn pop_front(&self, guild_id: GuildId) -> Result<TrackRequest, QueueError> {
        let queue = self.queue(guild_id);
        let mut queue = queue.lock();
        queue.pop_front().ok_or(QueueError::Empty)
    }

    /// Empties the queue. Succeeds even when already empty.
    pub fn clear(&self, guild_id: GuildId) {
        if let Some(queue) = self.queues.get(&guild_id) {
            queue.lock().clear();
        }
    }

    /// Copy-on-read view of the current order. Never aliases internal
    /// storage; the copy goes stale as soon as the queue is mutated.
    pub fn snapshot(&self, guild_id: GuildId) -> Vec<TrackRequest> {
        match self.queues.get(&guild_id) {
            Some(queue) => queue.lock().iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self, guild_id: GuildId) -> usize {
        self.queues
            .get(&guild_id)
            .map(|queue| queue.lock().len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, guild_id: GuildId) -> bool {
        self.len(guild_id) == 0
    }
}
