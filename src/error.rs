use thiserror::Error;

/// Failures of queue mutations. Per-track and always recoverable: the queue
/// is left exactly as it was.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("the queue is empty")]
    Empty,

    #[error("index {index} is out of range for a queue of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Failures while turning a user-supplied reference into playable media.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no playable media found for `{0}`")]
    NotFound(String),

    #[error("unsupported reference `{0}`")]
    Unsupported(String),

    #[error("network failure while resolving `{reference}`: {message}")]
    Network { reference: String, message: String },
}

/// Failures of the voice connection or the audio transport.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Only connectors that can tell this apart from a generic gateway
    /// failure report it; the songbird backend folds it into `Network`.
    #[allow(dead_code)]
    #[error("missing permission to join the voice channel")]
    PermissionDenied,

    #[allow(dead_code)]
    #[error("the voice channel is full")]
    ChannelFull,

    #[error("voice gateway failure: {0}")]
    Network(String),

    /// A single track failed to stream. The playback loop moves on to the
    /// next entry.
    #[error("audio stream failed: {0}")]
    Stream(String),

    /// The connection itself is unusable. Ends the whole playback session.
    #[error("the voice connection is no longer usable")]
    ConnectionLost,
}

impl VoiceError {
    /// Whether this failure invalidates the session rather than one track.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, VoiceError::ConnectionLost)
    }
}

/// Failures surfaced by `play`.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("could not join the voice channel: {0}")]
    Join(#[from] VoiceError),

    #[error("nothing is queued")]
    AlreadyEmpty,
}

/// Success-path outcomes of `play`. `AlreadyRunning` is informational, not a
/// failure: the existing loop keeps draining the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    AlreadyRunning,
}
