//! Command-line argument parsing

use crate::config::{CommandConfig, RegistryEndpoint, ReplicatorConfig, Scheme};
use crate::error::{ReplicatorError, Result};
use clap::Parser;
use std::time::Duration;

pub const ENV_VERBOSE: &str = "HARBOR_REPLICATOR_VERBOSE";
pub const ENV_TIMEOUT: &str = "HARBOR_REPLICATOR_TIMEOUT";

#[derive(Parser, Debug, Clone)]
#[command(name = "harbor-replicator")]
#[command(about = "Replicates newly pushed Harbor image tags to another registry")]
#[command(version)]
pub struct Args {
    /// Source Harbor registry address
    #[arg(
        long = "source",
        alias = "harbor",
        short = 's',
        help = "Source Harbor registry address (host[:port])"
    )]
    pub source: Option<String>,

    /// Source registry username
    #[arg(
        long = "source-user",
        alias = "huser",
        default_value = "",
        help = "Username for the source registry"
    )]
    pub source_user: String,

    /// Source registry password
    #[arg(
        long = "source-pass",
        alias = "hpass",
        default_value = "",
        help = "Password for the source registry"
    )]
    pub source_pass: String,

    /// Use http:// for the source catalog API
    #[arg(
        long = "insecure",
        short = 'k',
        help = "Use the http:// scheme for the source registry API"
    )]
    pub insecure: bool,

    /// Destination registry address
    #[arg(
        long = "destination",
        alias = "remote",
        short = 'd',
        help = "Destination registry address (host[:port])"
    )]
    pub destination: Option<String>,

    #[arg(
        long = "destination-user",
        alias = "remote-user",
        alias = "remote_user",
        default_value = "",
        help = "Username for the destination registry"
    )]
    pub destination_user: String,

    #[arg(
        long = "destination-pass",
        alias = "remote-pass",
        alias = "remote_pass",
        default_value = "",
        help = "Password for the destination registry"
    )]
    pub destination_pass: String,

    /// Projects to watch
    #[arg(
        long = "project",
        short = 'p',
        value_delimiter = ',',
        help = "Projects to watch, repeatable or comma separated (default: all projects)"
    )]
    pub projects: Vec<String>,

    /// Replicate tags created within this window before startup
    #[arg(
        long = "since",
        default_value = "30days",
        value_parser = parse_duration,
        help = "Only replicate tags created within this long before startup, e.g. 720h or 7days"
    )]
    pub since: Duration,

    #[arg(
        long = "poll-interval",
        default_value = "3s",
        value_parser = parse_duration,
        help = "Delay between catalog polls"
    )]
    pub poll_interval: Duration,

    /// Outer deadline per replication event
    #[arg(
        long = "event-deadline",
        default_value = "300s",
        value_parser = parse_duration,
        help = "Maximum time for one pull/tag/push sequence"
    )]
    pub event_deadline: Duration,

    #[arg(
        long = "command-timeout",
        default_value = "300s",
        value_parser = parse_duration,
        help = "Timeout for each pull or push command"
    )]
    pub command_timeout: Duration,

    #[arg(
        long = "quick-timeout",
        default_value = "10s",
        value_parser = parse_duration,
        help = "Timeout for login and tag commands"
    )]
    pub quick_timeout: Duration,

    #[arg(
        long = "http-timeout",
        default_value = "30s",
        value_parser = parse_duration,
        help = "Timeout for catalog API requests"
    )]
    pub http_timeout: Duration,

    #[arg(
        long = "queue-capacity",
        default_value = "1",
        help = "Pending event capacity, 0 for unbounded"
    )]
    pub queue_capacity: usize,

    /// Image tool
    #[arg(
        long = "docker",
        default_value = "docker",
        help = "docker compatible CLI used to pull, tag and push"
    )]
    pub docker: String,

    #[arg(long = "stream-output", help = "Mirror docker command output")]
    pub stream_output: bool,

    /// Verbose logging
    #[arg(long = "verbose", short = 'v', help = "Enable debug logging")]
    pub verbose: bool,
}

/// Parse a duration string for clap (e.g. "720h", "30days", "5m")
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| {
        format!(
            "Invalid duration format: '{}'. Use formats like '720h', '30days', '5m'. Error: {}",
            s, e
        )
    })
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Applies environment overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.with_env(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// An unparsable timeout override is an error rather than being ignored.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_VERBOSE) {
            let value = value.trim().to_lowercase();
            if value == "1" || value == "true" {
                self.stream_output = true;
            }
        }

        if let Some(value) = lookup(ENV_TIMEOUT) {
            self.command_timeout = humantime::parse_duration(value.trim()).map_err(|e| {
                ReplicatorError::Configuration(format!(
                    "Invalid {} value {:?}: {}",
                    ENV_TIMEOUT, value, e
                ))
            })?;
        }

        Ok(self)
    }

    /// Validate arguments and build the runtime configuration
    pub fn into_config(self) -> Result<ReplicatorConfig> {
        let source = match self.source.as_deref().map(str::trim) {
            Some(address) if !address.is_empty() => address.to_string(),
            _ => {
                return Err(ReplicatorError::Configuration(
                    "empty source registry address".to_string(),
                ));
            }
        };
        let destination = match self.destination.as_deref().map(str::trim) {
            Some(address) if !address.is_empty() => address.to_string(),
            _ => {
                return Err(ReplicatorError::Configuration(
                    "empty destination registry address".to_string(),
                ));
            }
        };

        let source = RegistryEndpoint::parse(
            &source,
            &self.source_user,
            &self.source_pass,
            Scheme::from_insecure(self.insecure),
        )?;
        let destination = RegistryEndpoint::parse(
            &destination,
            &self.destination_user,
            &self.destination_pass,
            Scheme::Https,
        )?;

        let mut config = ReplicatorConfig::new(source, destination);
        config.projects = self
            .projects
            .into_iter()
            .map(|p| p.trim().to_string())
            .collect();
        config.lookback = self.since;
        config.poll_interval = self.poll_interval;
        config.event_deadline = self.event_deadline;
        config.queue_capacity = (self.queue_capacity > 0).then_some(self.queue_capacity);
        config.http_timeout = self.http_timeout;
        config.command = CommandConfig {
            program: self.docker,
            quick_timeout: self.quick_timeout,
            transfer_timeout: self.command_timeout,
            stream_output: self.stream_output,
        };

        config.validate()?;
        Ok(config)
    }
}
