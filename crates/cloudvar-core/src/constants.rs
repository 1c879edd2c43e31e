//! Protocol and connection defaults.

/// Prefix every cloud variable name carries on the wire.
pub const CLOUD_MARKER: &str = "☁ ";

/// Default cloud data server.
pub const DEFAULT_ENDPOINT: &str = "wss://clouddata.scratch.mit.edu/";

/// Interval between cache checks while `get_variable` waits for first values.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Upper bound on how long `get_variable` waits for the cache to fill.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on opening the socket and completing the upgrade.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
