use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    /// Development guild for instant command registration.
    pub guild_id: Option<u64>,

    // Audio
    pub default_volume: f32,

    /// Root of the per-guild media library (`<data_dir>/<guild_id>/`).
    pub data_dir: PathBuf,

    /// Hard cap on a single playlist import. Repeated single adds are
    /// deliberately uncapped.
    pub playlist_import_cap: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,

            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),

            playlist_import_cap: std::env::var("PLAYLIST_IMPORT_CAP")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Sanity checks for values that would otherwise fail far from startup.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.playlist_import_cap == 0 {
            anyhow::bail!("Playlist import cap must be greater than 0");
        }

        Ok(())
    }

    /// Token-free summary for startup logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol\n  \
            Library: {}\n  \
            Limits: {} tracks per playlist import",
            self.application_id,
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.data_dir.display(),
            self.playlist_import_cap,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            default_volume: 0.5,
            data_dir: "./data".into(),
            playlist_import_cap: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_volume() {
        let config = Config {
            default_volume: 3.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_playlist_cap() {
        let config = Config {
            playlist_import_cap: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
