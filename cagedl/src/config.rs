use anyhow::{Context, Result};
use mediacage::{ProxyConfig, ResolutionSelector, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::DownloadArgs;

const APP_NAME: &str = "cagedl";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default output directory
    pub default_output_dir: Option<PathBuf>,

    /// Default resolution, exact label or regular expression
    pub default_resolution: Option<String>,

    /// Default request timeout in seconds
    pub default_timeout: u64,

    /// Default proxy URL (supports http, https, socks5)
    pub default_proxy: Option<String>,

    /// Default proxy username (if proxy requires authentication)
    pub default_proxy_username: Option<String>,

    /// Default proxy password (if proxy requires authentication)
    pub default_proxy_password: Option<String>,

    /// yt-dlp executable
    pub ytdlp_path: PathBuf,

    /// Fragments yt-dlp downloads in parallel
    pub concurrent_fragments: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_output_dir: None,
            default_resolution: None,
            default_timeout: 30,
            default_proxy: None,
            default_proxy_username: None,
            default_proxy_password: None,
            ytdlp_path: PathBuf::from("yt-dlp"),
            concurrent_fragments: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from file, or from the default location.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => {
                if path.exists() {
                    let content = std::fs::read_to_string(path)
                        .context("Failed to read configuration file")?;
                    toml::from_str(&content).context("Failed to parse configuration file")
                } else {
                    Ok(Self::default())
                }
            }
            None => confy::load(APP_NAME, None).context("Failed to load configuration"),
        }
    }

    /// Get default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        confy::get_configuration_file_path(APP_NAME, None).ok()
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, toml_string).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Reset configuration to defaults and save
    pub fn reset(config_path: Option<&Path>) -> Result<()> {
        let path = config_path
            .map(|p| p.to_path_buf())
            .or_else(Self::default_config_path)
            .context("No configuration path available")?;

        Self::default().save(&path)
    }

    /// Show current configuration as a formatted string
    pub fn show(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration for display")
    }

    /// Session settings for one download; command-line values win over the file.
    pub fn session_config(&self, args: &DownloadArgs) -> SessionConfig {
        let mut config = SessionConfig::default()
            .with_timeout(Duration::from_secs(args.timeout.unwrap_or(self.default_timeout)));

        if let Some(resolution) = args.resolution.as_ref().or(self.default_resolution.as_ref()) {
            config = config.with_resolution(ResolutionSelector::preferred(resolution.as_str()));
        }

        if let Some(url) = args.proxy.as_ref().or(self.default_proxy.as_ref()) {
            config = config.with_proxy(ProxyConfig {
                url: url.clone(),
                username: args
                    .proxy_username
                    .clone()
                    .or_else(|| self.default_proxy_username.clone()),
                password: args
                    .proxy_password
                    .clone()
                    .or_else(|| self.default_proxy_password.clone()),
            });
        }

        if let Some(seed) = args.seed {
            config = config.with_fingerprint_seed(seed);
        }

        config
    }

    pub fn output_dir(&self, args: &DownloadArgs) -> Option<PathBuf> {
        args.path.clone().or_else(|| self.default_output_dir.clone())
    }
}
