use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::info;

use crate::{
    audio::{
        controller::QueuePlaybackController,
        queue::{GuildQueueStore, TrackRequest},
        voice::VoiceConnector,
    },
    error::{PlayOutcome, PlaybackError, QueueError, VoiceError},
    sources::PlaylistEntry,
};

/// The operations the command surface calls. Thin by design: queue
/// mutations go straight to the store, playback control to the controller,
/// channel management to the voice connector.
pub struct AudioService {
    store: Arc<GuildQueueStore>,
    controller: Arc<QueuePlaybackController>,
    voice: Arc<dyn VoiceConnector>,
    playlist_cap: usize,
}

impl AudioService {
    pub fn new(
        store: Arc<GuildQueueStore>,
        controller: Arc<QueuePlaybackController>,
        voice: Arc<dyn VoiceConnector>,
        playlist_cap: usize,
    ) -> Self {
        Self {
            store,
            controller,
            voice,
            playlist_cap,
        }
    }

    /// Queues a single raw reference. Returns the new queue length.
    /// Deliberately uncapped, unlike playlist imports.
    pub fn add_track(&self, guild_id: GuildId, reference: &str, requested_by: UserId) -> usize {
        self.store
            .append(guild_id, TrackRequest::new(reference, requested_by))
    }

    /// Queues at most `playlist_cap` playlist entries in source order;
    /// excess entries are ignored. Returns the new queue length.
    pub fn add_playlist(
        &self,
        guild_id: GuildId,
        entries: Vec<PlaylistEntry>,
        requested_by: UserId,
    ) -> usize {
        let requests: Vec<TrackRequest> = entries
            .into_iter()
            .take(self.playlist_cap)
            .map(|entry| TrackRequest::new(entry.reference, requested_by).with_title(entry.title))
            .collect();
        info!(
            guild = guild_id.get(),
            count = requests.len(),
            "importing playlist"
        );
        self.store.append_bulk(guild_id, requests)
    }

    /// Bulk-queues pre-built requests without the playlist cap. Used for
    /// "play everything in the guild library".
    pub fn add_all(&self, guild_id: GuildId, requests: Vec<TrackRequest>) -> usize {
        self.store.append_bulk(guild_id, requests)
    }

    /// Display titles in play order.
    pub fn list_queue(&self, guild_id: GuildId) -> Vec<String> {
        self.store
            .snapshot(guild_id)
            .iter()
            .map(|request| request.display_title().to_string())
            .collect()
    }

    /// Removes the entry at `index` and returns its display title.
    pub fn remove_track(&self, guild_id: GuildId, index: usize) -> Result<String, QueueError> {
        self.store
            .remove_at(guild_id, index)
            .map(|removed| removed.display_title().to_string())
    }

    /// Empties the queue. An in-flight track is not touched; pair with
    /// `skip_current` or `stop` when the caller wants it gone too.
    pub fn clear_queue(&self, guild_id: GuildId) {
        self.store.clear(guild_id);
    }

    /// No-op when nothing is playing.
    pub fn skip_current(&self, guild_id: GuildId) {
        self.controller.skip(guild_id);
    }

    /// Starts (or reports an already-running) drain loop for the guild.
    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<PlayOutcome, PlaybackError> {
        self.controller.play(guild_id, channel_id).await
    }

    /// Stops playback and releases the channel; the queue stays intact.
    pub fn stop(&self, guild_id: GuildId) {
        self.controller.stop(guild_id);
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<String> {
        self.controller.now_playing(guild_id)
    }

    pub fn is_playing(&self, guild_id: GuildId) -> bool {
        self.controller.is_active(guild_id)
    }

    /// Joins without starting playback (the `join` command).
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        self.voice.join(guild_id, channel_id).await
    }

    /// Leaves the voice channel. When a session is live this stops it (the
    /// session's own teardown releases the channel); otherwise it leaves
    /// directly.
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        if self.controller.is_active(guild_id) {
            self.controller.stop(guild_id);
            Ok(())
        } else {
            self.voice.leave(guild_id).await
        }
    }
}
