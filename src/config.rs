//! Configuration module: registry endpoints and the runtime settings shared by every component

use crate::error::{ReplicatorError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_EVENT_DEADLINE: Duration = Duration::from_secs(300);
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_QUICK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn from_insecure(insecure: bool) -> Self {
        if insecure { Scheme::Http } else { Scheme::Https }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters for one registry
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryEndpoint {
    host: String,
    username: String,
    password: String,
    scheme: Scheme,
}

impl RegistryEndpoint {
    /// Builds an endpoint from a user supplied address.
    ///
    /// The address is normally a bare `host[:port]`. An explicit `http://` or
    /// `https://` prefix is accepted too and overrides `default_scheme`.
    pub fn parse(
        address: &str,
        username: &str,
        password: &str,
        default_scheme: Scheme,
    ) -> Result<Self> {
        let address = address.trim();
        let (scheme, host) = if let Some(rest) = address.strip_prefix("https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = address.strip_prefix("http://") {
            (Scheme::Http, rest)
        } else {
            (default_scheme, address)
        };
        let host = host.trim_end_matches('/');

        if host.is_empty() {
            return Err(ReplicatorError::Configuration(
                "Registry address cannot be empty".to_string(),
            ));
        }
        if host.contains('/') {
            return Err(ReplicatorError::Configuration(format!(
                "Invalid registry address: {}. Expected host[:port] without a path",
                address
            )));
        }

        Ok(Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            scheme,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    /// Root URL of the registry's HTTP API, always ending in `/`
    pub fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!("{}://{}/", self.scheme, self.host))?)
    }

    /// Image reference of `repository:tag` on this registry
    pub fn image_reference(&self, repository: &str, tag: &str) -> String {
        format!("{}/{}:{}", self.host, repository, tag)
    }
}

// Never print the password.
impl fmt::Debug for RegistryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEndpoint")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Settings for the external image-management command
#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub program: String,
    /// Timeout for `login` and `tag`
    pub quick_timeout: Duration,
    /// Timeout for `pull` and `push`
    pub transfer_timeout: Duration,
    /// Mirror the command's stdout/stderr
    pub stream_output: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            quick_timeout: DEFAULT_QUICK_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            stream_output: false,
        }
    }
}

/// Complete runtime configuration, built once at startup
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    pub source: RegistryEndpoint,
    pub destination: RegistryEndpoint,
    /// Projects to watch. Empty means every project of the source registry.
    pub projects: Vec<String>,
    pub lookback: Duration,
    pub poll_interval: Duration,
    pub event_deadline: Duration,
    /// Event queue capacity, `None` for unbounded
    pub queue_capacity: Option<usize>,
    pub http_timeout: Duration,
    pub command: CommandConfig,
}

impl ReplicatorConfig {
    pub fn new(source: RegistryEndpoint, destination: RegistryEndpoint) -> Self {
        Self {
            source,
            destination,
            projects: Vec::new(),
            lookback: Duration::from_secs(720 * 3600),
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_deadline: DEFAULT_EVENT_DEADLINE,
            queue_capacity: Some(1),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            command: CommandConfig::default(),
        }
    }

    /// The "since" cutoff: tags created at or before it are never replicated
    pub fn watermark(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match chrono::Duration::from_std(self.lookback) {
            Ok(lookback) => now.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC),
            Err(_) => DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ReplicatorError::Configuration(
                "Poll interval must be greater than 0".to_string(),
            ));
        }
        if self.event_deadline.is_zero() {
            return Err(ReplicatorError::Configuration(
                "Event deadline must be greater than 0".to_string(),
            ));
        }
        if self.command.quick_timeout.is_zero() || self.command.transfer_timeout.is_zero() {
            return Err(ReplicatorError::Configuration(
                "Command timeouts must be greater than 0".to_string(),
            ));
        }
        if self.command.program.trim().is_empty() {
            return Err(ReplicatorError::Configuration(
                "Image tool program cannot be empty".to_string(),
            ));
        }
        if self.projects.iter().any(|p| p.trim().is_empty()) {
            return Err(ReplicatorError::Configuration(
                "Project names cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
