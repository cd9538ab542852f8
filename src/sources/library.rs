use anyhow::{Context, Result};
use serenity::model::id::GuildId;
use std::path::PathBuf;
use tracing::debug;

/// A file available for playback from a guild's media directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    /// The file stem, which is what users see and type.
    pub title: String,
    pub path: PathBuf,
}

/// Per-guild directory of downloaded media under `<root>/<guild_id>/`.
/// Backing for the `songs` listing and the play-everything bulk import.
#[derive(Debug)]
pub struct GuildLibrary {
    root: PathBuf,
}

impl GuildLibrary {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn guild_dir(&self, guild_id: GuildId) -> PathBuf {
        self.root.join(guild_id.get().to_string())
    }

    /// All files in the guild's directory, sorted by title. A missing
    /// directory is an empty library, not an error.
    pub async fn entries(&self, guild_id: GuildId) -> Result<Vec<LibraryEntry>> {
        let dir = self.guild_dir(guild_id);
        if tokio::fs::metadata(&dir).await.is_err() {
            debug!(guild = guild_id.get(), "no library directory");
            return Ok(Vec::new());
        }

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading library directory {}", dir.display()))?;

        let mut entries = Vec::new();
        while let Some(item) = reader.next_entry().await? {
            let path = item.path();
            if !item.file_type().await?.is_file() {
                continue;
            }
            let title = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| item.file_name().to_string_lossy().into_owned());
            entries.push(LibraryEntry { title, path });
        }

        entries.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(entries)
    }

    /// Just the titles, for listings.
    pub async fn titles(&self, guild_id: GuildId) -> Result<Vec<String>> {
        Ok(self
            .entries(guild_id)
            .await?
            .into_iter()
            .map(|entry| entry.title)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn scratch_library(name: &str) -> GuildLibrary {
        let root = std::env::temp_dir().join(format!("quaver-library-{name}-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&root).await;
        tokio::fs::create_dir_all(&root).await.unwrap();
        GuildLibrary::new(root)
    }

    #[tokio::test]
    async fn missing_guild_directory_is_an_empty_library() {
        let library = scratch_library("missing").await;
        assert_eq!(library.entries(GuildId::new(1)).await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn lists_file_stems_sorted() {
        let library = scratch_library("sorted").await;
        let guild = GuildId::new(2);
        let dir = library.guild_dir(guild);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        for name in ["b side.mp3", "a side.mp3", "closer.ogg"] {
            tokio::fs::write(dir.join(name), b"x").await.unwrap();
        }
        // Directories are not library entries.
        tokio::fs::create_dir(dir.join("nested")).await.unwrap();

        assert_eq!(
            library.titles(guild).await.unwrap(),
            vec!["a side", "b side", "closer"]
        );
    }

    #[tokio::test]
    async fn guild_libraries_are_separate() {
        let library = scratch_library("separate").await;
        let dir = library.guild_dir(GuildId::new(3));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("only-here.mp3"), b"x").await.unwrap();

        assert_eq!(
            library.titles(GuildId::new(3)).await.unwrap(),
            vec!["only-here"]
        );
        assert!(library.titles(GuildId::new(4)).await.unwrap().is_empty());
    }
}
