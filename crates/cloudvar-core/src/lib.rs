//! # cloudvar-core
//!
//! Client for cloud variables: named values kept in sync between clients of
//! one project through a WebSocket server.
//!
//! - [`CloudSession`] owns the connection, sends the handshake, and exposes
//!   `get_variable`/`set_variable`
//! - [`Recorder`] caches inbound `set` notifications for one socket
//! - [`protocol`] holds the JSON wire types and name canonicalization
//!
//! # Usage
//!
//! ```no_run
//! use cloudvar_core::{CloudSession, SessionConfig};
//!
//! # async fn run() -> cloudvar_core::Result<()> {
//! let mut session = CloudSession::new("1194614729", "alice", SessionConfig::default());
//! session.connect().await?;
//! session.set_variable("Lives", 3).await?;
//! let score = session.get_variable("Score").await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod protocol;
pub mod recorder;
pub mod session;

pub use config::SessionConfig;
pub use constants::CLOUD_MARKER;
pub use errors::{CloudError, Result};
pub use protocol::{CloudValue, ProjectId, canonical_name, display_name};
pub use recorder::{Recorder, RecorderState};
pub use session::{CloudSession, ConnectionState};
