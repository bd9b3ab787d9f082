use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cagedl",
    about = "cagedl - download MediaCage protected videos through an authorized browser session",
    version,
    author
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize a session for an embed URL and download the video
    Download(DownloadArgs),

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Show configuration information
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

#[derive(ClapArgs, Debug)]
pub struct DownloadArgs {
    /// Embed URL of the video (https://iframe.mediadelivery.net/embed/{library}/{video})
    #[arg(short = 'u', long)]
    pub embed_url: String,

    /// URL of the page the video is embedded in
    #[arg(short, long)]
    pub referer: String,

    /// Output file name, without extension
    #[arg(short, long)]
    pub name: Option<String>,

    /// Output directory
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Resolution to download, exact label or regular expression (e.g. "1280x720", "720")
    #[arg(long)]
    pub resolution: Option<String>,

    /// Seed for the generated browser fingerprint
    #[arg(long)]
    pub seed: Option<u64>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Proxy URL (supports http, https, socks5)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Proxy username (if proxy requires authentication)
    #[arg(long)]
    pub proxy_username: Option<String>,

    /// Proxy password (if proxy requires authentication)
    #[arg(long)]
    pub proxy_password: Option<String>,
}
