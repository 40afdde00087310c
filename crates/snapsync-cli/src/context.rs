//! Validated connection settings, built once and never mutated.

use std::borrow::Cow;
use std::fmt::{self, Debug, Display, Formatter};
use std::net::Ipv6Addr;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Default HTTPS port of the cluster management API.
pub(crate) const DEFAULT_API_PORT: u16 = 443;

/// Target relationship state requested by the trigger call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SyncMode {
    /// Actively mirroring from source to destination.
    Snapmirrored,
}

impl SyncMode {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Snapmirrored => "snapmirrored",
        }
    }
}

impl Display for SyncMode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identifier of an existing replication relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelationshipId(String);

impl RelationshipId {
    /// Accept a relationship identifier, dropping surrounding whitespace.
    ///
    /// Identifiers are UUIDs, so leading or trailing blanks can only come from
    /// shell quoting; the trimmed value is what goes into the request path.
    pub(crate) fn parse(raw: &str) -> SyncResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SyncError::invalid_input("uuid", "must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RelationshipId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Everything needed to reach and authenticate against one cluster.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    cluster: String,
    port: u16,
    username: String,
    password: String,
    mode: SyncMode,
    timeout: Option<Duration>,
    base_url: Url,
}

impl ConnectionContext {
    /// Validate the inputs and derive `https://{cluster}:{port}`.
    pub(crate) fn new(
        cluster: &str,
        port: u16,
        username: &str,
        password: &str,
        mode: SyncMode,
        timeout: Option<Duration>,
    ) -> SyncResult<Self> {
        let cluster = cluster.trim();
        if cluster.is_empty() {
            return Err(SyncError::invalid_input("cluster", "must not be empty"));
        }
        if cluster
            .chars()
            .any(|ch| matches!(ch, '/' | '?' | '#' | '@') || ch.is_whitespace())
        {
            return Err(SyncError::invalid_input(
                "cluster",
                format!("'{cluster}' is not a hostname"),
            ));
        }
        if port == 0 {
            return Err(SyncError::invalid_input(
                "api_port",
                "must be between 1 and 65535",
            ));
        }
        if timeout.is_some_and(|value| value.is_zero()) {
            return Err(SyncError::invalid_input("timeout", "must be at least one second"));
        }

        let host = url_host(cluster)?;
        let base_url = Url::parse(&format!("https://{host}:{port}"))
            .map_err(|err| SyncError::invalid_input("cluster", format!("'{cluster}': {err}")))?;

        Ok(Self {
            cluster: cluster.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            mode,
            timeout,
            base_url,
        })
    }

    pub(crate) fn cluster(&self) -> &str {
        &self.cluster
    }

    pub(crate) const fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub(crate) const fn mode(&self) -> SyncMode {
        self.mode
    }

    pub(crate) const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) const fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Bracket bare IPv6 literals; any other `:` means a port was glued to the host.
fn url_host(cluster: &str) -> SyncResult<Cow<'_, str>> {
    if cluster.parse::<Ipv6Addr>().is_ok() {
        return Ok(Cow::Owned(format!("[{cluster}]")));
    }
    let bracketed = cluster
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'));
    if let Some(inner) = bracketed {
        if inner.parse::<Ipv6Addr>().is_ok() {
            return Ok(Cow::Borrowed(cluster));
        }
        return Err(SyncError::invalid_input(
            "cluster",
            format!("'{cluster}' is not a valid IPv6 address"),
        ));
    }
    if cluster.contains(':') {
        return Err(SyncError::invalid_input(
            "cluster",
            format!("'{cluster}' must not include a port; pass it with --api_port"),
        ));
    }
    Ok(Cow::Borrowed(cluster))
}

impl Debug for ConnectionContext {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectionContext")
            .field("cluster", &self.cluster)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
