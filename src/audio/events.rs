use async_trait::async_trait;
use serenity::model::id::GuildId;
use tracing::{info, warn};

/// User-facing feedback from the playback loop. The controller stays
/// oblivious of Discord channels; the bot layer decides where these land.
#[async_trait]
pub trait PlaybackEvents: Send + Sync {
    /// A track started streaming. `up_next` peeks at the new queue head,
    /// `remaining` counts the entries waiting behind the current track.
    async fn now_playing(
        &self,
        guild_id: GuildId,
        title: &str,
        up_next: Option<&str>,
        remaining: usize,
    );

    /// A single entry failed (resolution or stream). The loop continues.
    async fn track_failed(&self, guild_id: GuildId, title: &str, reason: &str);

    /// The queue drained naturally and the bot is leaving the channel.
    async fn queue_finished(&self, guild_id: GuildId);
}

/// Log-only sink, used when no announcer is wired up.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct LogEvents;

#[async_trait]
impl PlaybackEvents for LogEvents {
    async fn now_playing(
        &self,
        guild_id: GuildId,
        title: &str,
        up_next: Option<&str>,
        remaining: usize,
    ) {
        info!(
            guild = guild_id.get(),
            title,
            up_next = up_next.unwrap_or("-"),
            remaining,
            "🎵 now playing"
        );
    }

    async fn track_failed(&self, guild_id: GuildId, title: &str, reason: &str) {
        warn!(guild = guild_id.get(), title, reason, "track failed");
    }

    async fn queue_finished(&self, guild_id: GuildId) {
        info!(guild = guild_id.get(), "queue finished");
    }
}
