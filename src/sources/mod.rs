pub mod library;
pub mod ytdlp;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::ResolveError;

pub use library::GuildLibrary;
pub use ytdlp::YtDlpResolver;

/// Opaque playable handle. The voice layer turns it into an actual audio
/// input; nothing else inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playable {
    /// Remote media, streamed through yt-dlp.
    Remote { url: String },
    /// A file from a guild's local media library.
    Local { path: PathBuf },
}

/// A fully resolved track: a display title plus the handle to stream.
#[derive(Debug, Clone)]
pub struct ResolvedTrack {
    pub title: String,
    pub playable: Playable,
}

/// One entry of an expanded playlist, in source order.
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub reference: String,
    pub title: String,
}

/// Resolution of user-supplied references (links, search terms, or local
/// file paths) into playable media.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves a single reference. Failures are per-track: the caller
    /// reports them and moves on.
    async fn resolve(&self, reference: &str) -> Result<ResolvedTrack, ResolveError>;

    /// Expands a playlist reference into at most `limit` entries, preserving
    /// the playlist's own order.
    async fn resolve_playlist(
        &self,
        reference: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistEntry>, ResolveError>;
}
