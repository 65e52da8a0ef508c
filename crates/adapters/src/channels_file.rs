//! channels.txt import parser
//!
//! One record per line: `channel:<numeric-id>|<platform>[,<platform>]*`.
//! Blank lines and `#` comments are skipped; malformed lines are logged
//! and skipped; an empty platform list falls back to the default set.

use std::path::Path;

use stobot_domain::DEFAULT_PLATFORMS;

/// A parsed channel record from an import file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelImport {
    pub channel_id: String,
    pub platforms: Vec<String>,
}

/// Reads and parses a channels file.
pub fn read_channels_file(path: impl AsRef<Path>) -> Result<Vec<ChannelImport>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_channels(&content))
}

/// Parses channel records out of file content, skipping invalid lines.
pub fn parse_channels(content: &str) -> Vec<ChannelImport> {
    let mut records = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(rest) = line.strip_prefix("channel:") else {
            tracing::warn!(line = %line, "skipping invalid line");
            continue;
        };

        let mut parts = rest.splitn(2, '|');
        let channel_id = parts.next().unwrap_or_default().trim();
        let Some(platforms_str) = parts.next() else {
            tracing::warn!(line = %line, "skipping malformed line");
            continue;
        };

        if channel_id.parse::<u64>().is_err() {
            tracing::warn!(line = %line, "skipping line with invalid channel id");
            continue;
        }

        let mut platforms: Vec<String> = platforms_str
            .split(',')
            .map(str::trim)
            .filter(|platform| !platform.is_empty())
            .map(str::to_string)
            .collect();

        if platforms.is_empty() {
            platforms = DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect();
        }

        records.push(ChannelImport {
            channel_id: channel_id.to_string(),
            platforms,
        });
    }

    records
}
