pub mod controller;
pub mod events;
pub mod queue;
pub mod service;
pub mod voice;

pub use controller::{QueuePlaybackController, SessionState};
pub use events::PlaybackEvents;
pub use queue::{GuildQueueStore, TrackRequest};
pub use service::AudioService;
pub use voice::{SongbirdConnector, StreamOutcome, VoiceConnector};
