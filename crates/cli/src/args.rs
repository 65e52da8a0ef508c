//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_DATABASE_PATH: &str = "./data/stobot.db";

/// stobot: Star Trek Online Discord news bot
#[derive(Parser, Debug)]
#[command(name = "stobot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub bot: BotArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags for the default long-running bot invocation. Every flag falls
/// back to an environment variable, then to its built-in default.
#[derive(Args, Debug, Clone)]
pub struct BotArgs {
    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN")]
    pub token: Option<String>,

    /// Time in seconds between checking for news
    #[arg(long, env = "POLL_PERIOD", default_value_t = 600)]
    pub poll_period: u64,

    /// Number of news items to poll in each period
    #[arg(long, env = "POLL_COUNT", default_value_t = 20)]
    pub poll_count: usize,

    /// Maximum age in seconds of news items considered fresh
    #[arg(long, env = "FRESH_SECONDS", default_value_t = 600)]
    pub fresh_seconds: u64,

    /// Number of Discord messages to check for duplicates
    #[arg(long, env = "MSG_COUNT", default_value_t = 10)]
    pub msg_count: usize,

    /// Path to channels file
    #[arg(long, env = "CHANNELS_PATH", default_value = "/data/channels.txt")]
    pub channels_path: PathBuf,

    /// Path to SQLite database
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    pub database_path: PathBuf,

    /// DEV/PROD channel filter; unset services all channels
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Populate the database with historical news to prevent re-posting
    /// old articles
    PopulateDb(PopulateArgs),

    /// Import channel configuration from a channels.txt file
    ImportChannels(ImportArgs),

    /// List registered channels in the database
    ListChannels(ListArgs),

    /// Mark all cached news as already posted to prevent re-sending old
    /// messages
    MarkAllPosted(MarkPostedArgs),
}

#[derive(Args, Debug)]
pub struct PopulateArgs {
    /// Path to SQLite database
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    pub database_path: PathBuf,

    /// Number of news items to fetch and mark as posted, per tag
    #[arg(long, env = "POLL_COUNT", default_value_t = 100)]
    pub count: usize,

    /// News tags to populate
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_values_t = ["star-trek-online".to_string(), "patch-notes".to_string()]
    )]
    pub tags: Vec<String>,

    /// Show what would be populated without making changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to SQLite database
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    pub database_path: PathBuf,

    /// Path to channels.txt file to import
    #[arg(long, env = "CHANNELS_PATH", default_value = "./channels.txt")]
    pub channels_file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Path to SQLite database
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    pub database_path: PathBuf,
}

#[derive(Args, Debug)]
pub struct MarkPostedArgs {
    /// Path to SQLite database
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    pub database_path: PathBuf,

    /// Show what would be marked without making changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}
