//! Bot configuration assembled from flags, environment, and defaults

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use secrecy::SecretString;
use stobot_domain::usecases::EngineConfig;
use stobot_domain::Environment;

use crate::args::BotArgs;

/// Validated configuration for the long-running bot.
#[derive(Debug)]
pub struct BotConfig {
    pub token: SecretString,
    pub poll_period: Duration,
    pub poll_count: usize,
    pub fresh_seconds: u64,
    pub msg_count: usize,
    pub channels_path: PathBuf,
    pub database_path: PathBuf,
    pub environment: Option<Environment>,
}

impl BotConfig {
    /// Builds and validates the configuration. Flag values already carry
    /// their environment-variable fallbacks, so validation here is the
    /// final gate before startup.
    pub fn from_args(args: BotArgs) -> Result<Self> {
        let token = match args.token {
            Some(token) if !token.is_empty() => SecretString::from(token),
            _ => bail!("discord token is required"),
        };
        if args.poll_period == 0 {
            bail!("poll period must be positive");
        }
        if args.poll_count == 0 {
            bail!("poll count must be positive");
        }
        if args.fresh_seconds == 0 {
            bail!("fresh seconds must be positive");
        }
        if args.msg_count == 0 {
            bail!("message count must be positive");
        }
        if args.database_path.as_os_str().is_empty() {
            bail!("database path is required");
        }

        // An unset or empty environment disables filtering.
        let environment = match args.environment.as_deref() {
            None | Some("") => None,
            Some(value) => Some(value.parse::<Environment>()?),
        };

        Ok(Self {
            token,
            poll_period: Duration::from_secs(args.poll_period),
            poll_count: args.poll_count,
            fresh_seconds: args.fresh_seconds,
            msg_count: args.msg_count,
            channels_path: args.channels_path,
            database_path: args.database_path,
            environment,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_count: self.poll_count,
            fresh_window: Duration::from_secs(self.fresh_seconds),
            recent_messages: self.msg_count,
            environment: self.environment,
        }
    }
}
