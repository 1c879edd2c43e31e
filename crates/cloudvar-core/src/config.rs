//! Session configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_ENDPOINT, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_READ_TIMEOUT_MS,
};

/// Options accepted when constructing a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// WebSocket URL of the cloud data server.
    pub endpoint: String,
    /// Extra headers sent with the upgrade request.
    pub headers: BTreeMap<String, String>,
    /// Cookies sent as a single `Cookie` header, in key order.
    pub cookies: BTreeMap<String, String>,
    /// `Origin` header override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Log at `info` once connected instead of `debug`.
    pub print_connect_message: bool,
    /// Cache poll interval used by `get_variable`, in milliseconds.
    pub poll_interval_ms: u64,
    /// How long `get_variable` waits for the first values, in milliseconds.
    pub read_timeout_ms: u64,
    /// Bound on opening the socket, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            origin: None,
            print_connect_message: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Default configuration pointed at another server.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// `poll_interval_ms` as a [`Duration`], never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// `read_timeout_ms` as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// `connect_timeout_ms` as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Value for the `Cookie` header, or `None` when no cookies are set.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        Some(pairs.join("; "))
    }
}
