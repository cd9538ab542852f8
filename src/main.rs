use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{
    AudioService, GuildQueueStore, QueuePlaybackController, SongbirdConnector, VoiceConnector,
};
use crate::bot::{ChannelAnnouncer, QuaverBot};
use crate::config::Config;
use crate::sources::{GuildLibrary, TrackResolver, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quaver=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 starting quaver v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Wiring: one store, one controller, one songbird instance shared with
    // the serenity client.
    let manager = Songbird::serenity();
    let http_client = reqwest::Client::new();

    let announcer = Arc::new(ChannelAnnouncer::new());
    let connector: Arc<dyn VoiceConnector> = Arc::new(SongbirdConnector::new(
        manager.clone(),
        http_client,
        config.default_volume,
    ));
    let resolver: Arc<dyn TrackResolver> = Arc::new(YtDlpResolver::new());
    let library = Arc::new(GuildLibrary::new(config.data_dir.clone()));

    let store = Arc::new(GuildQueueStore::new());
    let controller = Arc::new(QueuePlaybackController::new(
        store.clone(),
        connector.clone(),
        resolver.clone(),
        announcer.clone(),
    ));
    let service = Arc::new(AudioService::new(
        store,
        controller,
        connector,
        config.playlist_import_cap,
    ));

    let handler = QuaverBot::new(config.clone(), service, resolver, library, announcer);

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
        info!("⚠️ shutdown signal received, closing shards");
        shard_manager.shutdown_all().await;
    });

    if let Err(why) = client.start().await {
        error!(error = ?why, "client error");
    }

    Ok(())
}
