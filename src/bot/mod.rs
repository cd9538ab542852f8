pub mod announcer;
pub mod commands;
pub mod handlers;

use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    audio::AudioService,
    config::Config,
    sources::{GuildLibrary, TrackResolver},
};

pub use announcer::ChannelAnnouncer;

/// The Discord event handler. Thin: every command lands in a handler that
/// delegates to [`AudioService`]; playback feedback flows back out through
/// the [`ChannelAnnouncer`].
pub struct QuaverBot {
    pub config: Arc<Config>,
    pub service: Arc<AudioService>,
    pub resolver: Arc<dyn TrackResolver>,
    pub library: Arc<GuildLibrary>,
    pub announcer: Arc<ChannelAnnouncer>,
}

impl QuaverBot {
    pub fn new(
        config: Arc<Config>,
        service: Arc<AudioService>,
        resolver: Arc<dyn TrackResolver>,
        library: Arc<GuildLibrary>,
        announcer: Arc<ChannelAnnouncer>,
    ) -> Self {
        Self {
            config,
            service,
            resolver,
            library,
            announcer,
        }
    }

    async fn register_commands(&self, ctx: &Context) {
        let result = match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!(guild = guild_id.get(), "registering guild commands");
                commands::register_guild_commands(ctx, guild_id).await
            }
            None => {
                info!("registering global commands");
                commands::register_global_commands(ctx).await
            }
        };

        if let Err(e) = result {
            error!(error = %e, "command registration failed");
        }
    }
}

#[async_trait]
impl EventHandler for QuaverBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "🤖 connected");

        self.announcer.attach_http(ctx.http.clone());
        self.register_commands(&ctx).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!(error = ?e, "command handling failed");
            }
        }
    }

    /// When the bot itself is kicked or dragged out of voice, the playback
    /// session must not keep draining into a dead connection.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        if new.user_id != bot_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!(guild = guild_id.get(), "🔌 disconnected from voice, stopping session");
                self.service.stop(guild_id);
            }
        }
    }
}
