use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{File, Input, YoutubeDl},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::VoiceError;
use crate::sources::Playable;

/// How a stream run ended when the transport itself did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The track played to its end.
    Completed,
    /// The cancel signal fired and the stream was torn down early.
    Cancelled,
}

/// Voice-channel lifecycle and audio transport for one guild at a time.
/// At most one connection per guild; `leave` is idempotent.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError>;

    /// Leaving while not connected is a no-op, not an error.
    async fn leave(&self, guild_id: GuildId) -> Result<(), VoiceError>;

    /// Streams `playable` into the guild's connection until it finishes or
    /// `cancel` fires. Must honor `cancel` promptly so skip stays snappy.
    async fn stream(
        &self,
        guild_id: GuildId,
        playable: Playable,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome, VoiceError>;
}

/// Production connector backed by songbird's driver.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            manager,
            http,
            volume,
        }
    }

    fn input_for(&self, playable: Playable) -> Input {
        match playable {
            Playable::Remote { url } => YoutubeDl::new(self.http.clone(), url).into(),
            Playable::Local { path } => File::new(path).into(),
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(_call) => {
                info!(guild = guild_id.get(), channel = channel_id.get(), "🔊 joined voice channel");
                Ok(())
            }
            Err(e) => Err(map_join_error(e)),
        }
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        if self.manager.get(guild_id).is_none() {
            debug!(guild = guild_id.get(), "leave with no active call, ignoring");
            return Ok(());
        }

        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| VoiceError::Network(e.to_string()))?;
        info!(guild = guild_id.get(), "👋 left voice channel");
        Ok(())
    }

    async fn stream(
        &self,
        guild_id: GuildId,
        playable: Playable,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome, VoiceError> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or(VoiceError::ConnectionLost)?;

        let input = self.input_for(playable);

        let handle = {
            let mut call = call.lock().await;
            let handle = call.play_input(input);
            let _ = handle.set_volume(self.volume);
            handle
        };

        // The driver reports track termination through its event loop; a
        // bounded channel bridges it back into this future.
        let (tx, rx) = flume::bounded::<EndSignal>(2);
        handle
            .add_event(
                Event::Track(TrackEvent::End),
                EndNotifier {
                    tx: tx.clone(),
                    signal: EndSignal::Finished,
                },
            )
            .map_err(|e| VoiceError::Stream(e.to_string()))?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                EndNotifier {
                    tx,
                    signal: EndSignal::Errored,
                },
            )
            .map_err(|e| VoiceError::Stream(e.to_string()))?;

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = handle.stop();
                debug!(guild = guild_id.get(), "stream cancelled");
                Ok(StreamOutcome::Cancelled)
            }
            signal = rx.recv_async() => match signal {
                Ok(EndSignal::Finished) => Ok(StreamOutcome::Completed),
                Ok(EndSignal::Errored) => {
                    Err(VoiceError::Stream("playback driver reported a track error".to_string()))
                }
                // The driver dropped the event sender without reporting an
                // end; the call is gone.
                Err(_) => Err(VoiceError::ConnectionLost),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EndSignal {
    Finished,
    Errored,
}

struct EndNotifier {
    tx: flume::Sender<EndSignal>,
    signal: EndSignal,
}

#[async_trait]
impl VoiceEventHandler for EndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.tx.send(self.signal).is_err() {
            warn!("track end notification dropped, stream future already gone");
        }
        None
    }
}

fn map_join_error(err: JoinError) -> VoiceError {
    match err {
        JoinError::TimedOut => {
            VoiceError::Network("timed out waiting for the voice gateway".to_string())
        }
        other => VoiceError::Network(other.to_string()),
    }
}
