use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::{path::Path, sync::LazyLock};
use tracing::{debug, info};
use url::Url;

use super::{Playable, PlaylistEntry, ResolvedTrack, TrackResolver};
use crate::error::ResolveError;

static HTTP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://").expect("static pattern"));

/// Metadata line emitted by `yt-dlp --dump-json`.
#[derive(Debug, Deserialize)]
struct YtDlpTrack {
    title: String,
    webpage_url: Option<String>,
}

/// Flat-playlist entry line. `url` is absent for some extractors, which
/// only give the video id.
#[derive(Debug, Deserialize)]
struct YtDlpFlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
}

/// Resolves user references through yt-dlp: direct links and search terms
/// for remote media, plain file paths for the guild library.
pub struct YtDlpResolver {
    /// Bounds concurrent yt-dlp processes to avoid rate limiting.
    limiter: tokio::sync::Semaphore,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self {
            limiter: tokio::sync::Semaphore::new(3),
        }
    }

    async fn run_ytdlp(&self, reference: &str, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Network {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;

        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .map_err(|e| ResolveError::Network {
                reference: reference.to_string(),
                message: format!("failed to run yt-dlp: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(reference, %stderr, "yt-dlp failed");
            return Err(ResolveError::NotFound(reference.to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn probe(&self, reference: &str, target: &str) -> Result<ResolvedTrack, ResolveError> {
        let stdout = self
            .run_ytdlp(
                reference,
                &["--no-playlist", "--dump-json", "--no-warnings", target],
            )
            .await?;

        let line = stdout
            .lines()
            .next()
            .ok_or_else(|| ResolveError::NotFound(reference.to_string()))?;
        let track: YtDlpTrack = serde_json::from_str(line).map_err(|e| ResolveError::Network {
            reference: reference.to_string(),
            message: format!("unparseable yt-dlp output: {e}"),
        })?;

        info!(reference, title = %track.title, "resolved track");
        Ok(ResolvedTrack {
            playable: Playable::Remote {
                url: track
                    .webpage_url
                    .unwrap_or_else(|| reference.to_string()),
            },
            title: track.title,
        })
    }
}

#[async_trait::async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, reference: &str) -> Result<ResolvedTrack, ResolveError> {
        // Library entries are queued as plain file paths.
        let path = Path::new(reference);
        if tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
        {
            return Ok(ResolvedTrack {
                title: file_stem_title(path),
                playable: Playable::Local {
                    path: path.to_path_buf(),
                },
            });
        }

        if looks_like_url(reference) {
            if !is_http_url(reference) {
                return Err(ResolveError::Unsupported(reference.to_string()));
            }
            Url::parse(reference)
                .map_err(|_| ResolveError::Unsupported(reference.to_string()))?;
            return self.probe(reference, reference).await;
        }

        // Anything else is treated as a search term.
        let query = format!("ytsearch1:{reference}");
        self.probe(reference, &query).await
    }

    async fn resolve_playlist(
        &self,
        reference: &str,
        limit: usize,
    ) -> Result<Vec<PlaylistEntry>, ResolveError> {
        if !is_http_url(reference) {
            return Err(ResolveError::Unsupported(reference.to_string()));
        }

        let limit_arg = limit.to_string();
        let stdout = self
            .run_ytdlp(
                reference,
                &[
                    "--flat-playlist",
                    "--dump-json",
                    "--playlist-end",
                    &limit_arg,
                    "--no-warnings",
                    reference,
                ],
            )
            .await?;

        let entries: Vec<PlaylistEntry> = stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<YtDlpFlatEntry>(line).ok())
            .filter_map(flat_entry_to_playlist_entry)
            .take(limit)
            .collect();

        if entries.is_empty() {
            return Err(ResolveError::NotFound(reference.to_string()));
        }

        info!(reference, count = entries.len(), "expanded playlist");
        Ok(entries)
    }
}

fn looks_like_url(reference: &str) -> bool {
    reference.contains("://")
}

fn is_http_url(reference: &str) -> bool {
    HTTP_URL.is_match(reference)
}

fn file_stem_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn flat_entry_to_playlist_entry(entry: YtDlpFlatEntry) -> Option<PlaylistEntry> {
    let reference = entry
        .url
        .or_else(|| {
            entry
                .id
                .as_ref()
                .map(|id| format!("https://www.youtube.com/watch?v={id}"))
        })?;
    let title = entry.title.unwrap_or_else(|| reference.clone());
    Some(PlaylistEntry { reference, title })
}
