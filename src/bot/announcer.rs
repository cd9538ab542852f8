use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::{audio::events::PlaybackEvents, ui::embeds};

/// Posts playback feedback into the text channel a guild last issued a
/// queue/playback command from. The HTTP handle arrives with the `ready`
/// event; anything fired before that only lands in the logs.
#[derive(Default)]
pub struct ChannelAnnouncer {
    http: OnceLock<Arc<Http>>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_http(&self, http: Arc<Http>) {
        let _ = self.http.set(http);
    }

    /// Remembers where a guild's feedback should go.
    pub fn bind(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }

    async fn post(&self, guild_id: GuildId, message: CreateMessage) {
        let Some(http) = self.http.get() else {
            debug!(guild = guild_id.get(), "announcer has no http handle yet");
            return;
        };
        let Some(channel_id) = self.channels.get(&guild_id).map(|c| *c) else {
            debug!(guild = guild_id.get(), "no announce channel bound");
            return;
        };

        if let Err(e) = channel_id.send_message(http, message).await {
            warn!(guild = guild_id.get(), error = %e, "failed to post announcement");
        }
    }
}

#[async_trait]
impl PlaybackEvents for ChannelAnnouncer {
    async fn now_playing(
        &self,
        guild_id: GuildId,
        title: &str,
        up_next: Option<&str>,
        remaining: usize,
    ) {
        let message =
            CreateMessage::new().embed(embeds::now_playing(title, up_next, remaining));
        self.post(guild_id, message).await;
    }

    async fn track_failed(&self, guild_id: GuildId, title: &str, reason: &str) {
        let message = CreateMessage::new().embed(embeds::error(format!(
            "Skipping **{title}**: {reason}"
        )));
        self.post(guild_id, message).await;
    }

    async fn queue_finished(&self, guild_id: GuildId) {
        let message = CreateMessage::new().embed(embeds::notice(
            "The queue is empty, leaving the voice channel. Add more songs with `/add`!",
        ));
        self.post(guild_id, message).await;
    }
}
