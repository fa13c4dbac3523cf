//! Command-line configuration.
//!
//! [`Cli`] is what `clap` parses; [`Config`] is the validated form the rest
//! of the program consumes.  Usage errors are reported by `main` with exit
//! status 1 rather than through clap's own exit path.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::source::FailurePolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one feed URI is required")]
    NoUris,

    #[error("--interval must be at least one second")]
    ZeroInterval,
}

#[derive(Parser, Debug)]
#[command(
    name = "feedstream",
    version,
    about = "Poll RSS and Atom feeds and print their entries until a deadline"
)]
pub struct Cli {
    /// Feed URIs to poll
    #[arg(value_name = "URI")]
    pub uris: Vec<String>,

    /// Seconds between polls of every URI
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub interval: u64,

    /// Seconds after which the pipeline shuts down
    #[arg(long, value_name = "SECS", default_value_t = 15)]
    pub deadline: u64,

    /// Per-request HTTP timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// What a failing feed does to the rest of the run
    #[arg(long = "on-error", value_enum, default_value_t = FailurePolicy::Isolate)]
    pub on_error: FailurePolicy,
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub uris: Vec<String>,
    pub interval: Duration,
    pub deadline: Duration,
    pub timeout: Duration,
    pub policy: FailurePolicy,
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.uris.is_empty() {
            return Err(ConfigError::NoUris);
        }
        if cli.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(Config {
            uris: cli.uris,
            interval: Duration::from_secs(cli.interval),
            deadline: Duration::from_secs(cli.deadline),
            timeout: Duration::from_secs(cli.timeout),
            policy: cli.on_error,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let cli = Cli::try_parse_from(std::iter::once("feedstream").chain(args.iter().copied()))
            .expect("arguments should parse");
        Config::try_from(cli)
    }

    #[test]
    fn defaults_match_reference_timings() {
        let config = parse(&["http://a/feed.atom"]).unwrap();
        assert_eq!(config.uris, vec!["http://a/feed.atom"]);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.deadline, Duration::from_secs(15));
        assert_eq!(config.policy, FailurePolicy::Isolate);
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--interval", "2", "--deadline", "60", "--on-error", "abort", "http://a", "http://b",
        ])
        .unwrap();
        assert_eq!(config.uris.len(), 2);
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.deadline, Duration::from_secs(60));
        assert_eq!(config.policy, FailurePolicy::Abort);
    }

    #[test]
    fn no_uris_is_a_usage_error() {
        assert_eq!(parse(&[]).unwrap_err(), ConfigError::NoUris);
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert_eq!(
            parse(&["--interval", "0", "http://a"]).unwrap_err(),
            ConfigError::ZeroInterval
        );
    }
}
