//! Bus configuration.
//!
//! Option structs passed by callers plus the constants the core relies on.

use std::time::Duration;

use serde::Deserialize;

/// Namespace root prepended to every bus prefix.
pub const NAMESPACE_ROOT: &str = "namedbus";
/// Reserved event name for liveness probe requests.
pub const PING_EVENT: &str = "ping";
/// Reserved event name for liveness probe responses.
pub const PONG_EVENT: &str = "pong";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "NAMEDBUS_LOG";
/// Default liveness probe timeout.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(3000);
/// Default number of peer responses a liveness probe requires.
pub const DEFAULT_PING_MIN_RESPONSES: usize = 1;

/// Options for creating a bus instance.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BusOptions {
    /// Caller-supplied prefix, prepended verbatim to the bus namespace.
    ///
    /// Two buses with the same name but different prefixes never
    /// cross-deliver.
    pub prefix: Option<String>,
    /// Options forwarded to the backend when opening connections.
    pub connect: ConnectOptions,
}

impl BusOptions {
    /// Options with a caller-supplied prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            connect: ConnectOptions::default(),
        }
    }
}

/// Options the backend receives when opening a connection.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Connection URL; backends fall back to their own default when absent.
    pub url: Option<String>,
    /// Channel-name prefix applied by the backend itself.
    ///
    /// The bus core namespaces channels with its own prefix and never sets
    /// this field on the connections it opens.
    pub prefix: Option<String>,
}

impl ConnectOptions {
    /// Options targeting a specific backend URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            prefix: None,
        }
    }
}

/// Options for a liveness probe.
#[derive(Clone, Copy, Debug)]
pub struct PingOptions {
    /// How long to wait for responses before resolving.
    pub timeout: Duration,
    /// Responses required beyond the caller's own mandatory self-response.
    pub min_responses: usize,
}

impl PingOptions {
    pub fn new(timeout: Duration, min_responses: usize) -> Self {
        Self {
            timeout,
            min_responses,
        }
    }
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PING_TIMEOUT,
            min_responses: DEFAULT_PING_MIN_RESPONSES,
        }
    }
}
