//! Cloud variable session: one logical connection to the cloud data server.
//!
//! A [`CloudSession`] owns at most one live socket. On [`connect`] it opens
//! the socket, sends the handshake, and hands the read half to a
//! [`Recorder`] that caches inbound values. The write half stays with the
//! session for [`set_variable`].
//!
//! State machine:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──handshake sent──▶ Connected
//!      ▲                        │                              │
//!      └────── open/handshake failure ◀──────┘      close / reconnect
//! ```
//!
//! [`connect`]: CloudSession::connect
//! [`set_variable`]: CloudSession::set_variable

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, header};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::errors::{CloudError, Result};
use crate::protocol::{ClientFrame, CloudValue, ProjectId, canonical_name};
use crate::recorder::Recorder;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Connection lifecycle of a [`CloudSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket opening or handshake in flight.
    Connecting,
    /// Handshake sent and recorder listening.
    Connected,
}

/// The single live socket and the recorder reading from it.
///
/// Replaced as a unit on reconnect, so a recorder never outlives its socket
/// inside the session.
struct Link {
    sink: WsSink,
    recorder: Option<Recorder>,
}

/// Client session for reading and writing the cloud variables of one project.
pub struct CloudSession {
    project_id: ProjectId,
    username: String,
    config: SessionConfig,
    state: ConnectionState,
    link: Option<Link>,
}

impl CloudSession {
    /// Create a disconnected session.
    pub fn new(
        project_id: impl Into<ProjectId>,
        username: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            username: username.into(),
            config,
            state: ConnectionState::Disconnected,
            link: None,
        }
    }

    /// Project this session is bound to.
    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Username sent with every frame.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether reads and writes are currently allowed.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.link.is_some()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Open a new connection, replacing any existing one.
    ///
    /// The handshake is sent only after the WebSocket upgrade completes. A
    /// failure to open, or to send the handshake, leaves the session
    /// disconnected. Nothing is retried.
    pub async fn connect(&mut self) -> Result<()> {
        self.teardown().await;
        self.state = ConnectionState::Connecting;

        match self.open().await {
            Ok(link) => {
                self.link = Some(link);
                self.state = ConnectionState::Connected;
                if self.config.print_connect_message {
                    info!(endpoint = %self.config.endpoint, project_id = %self.project_id, "connected to cloud server");
                } else {
                    debug!(endpoint = %self.config.endpoint, project_id = %self.project_id, "connected to cloud server");
                }
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                debug!(endpoint = %self.config.endpoint, error = %err, "cloud connection failed");
                Err(err)
            }
        }
    }

    /// Close the current connection, ignoring any failure, then connect again.
    ///
    /// Resolves once the new connection is established (or has failed).
    pub async fn reconnect(&mut self) -> Result<()> {
        debug!(endpoint = %self.config.endpoint, "reconnecting to cloud server");
        self.connect().await
    }

    /// Stop the recorder and close the socket. Never fails; safe to repeat.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    async fn open(&self) -> Result<Link> {
        let request = self.build_request()?;
        let endpoint = &self.config.endpoint;

        // rustls 0.23 needs a process-level provider before any wss:// dial
        let _ = rustls::crypto::ring::default_provider().install_default();

        let (ws, _response) = tokio::time::timeout(self.config.connect_timeout(), connect_async(request))
            .await
            .map_err(|_| CloudError::Transport {
                endpoint: endpoint.clone(),
                reason: format!("timed out after {}ms", self.config.connect_timeout_ms),
            })?
            .map_err(|e| CloudError::Transport {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let (mut sink, stream) = ws.split();

        let handshake = ClientFrame::Handshake {
            user: self.username.clone(),
            project_id: self.project_id.clone(),
        }
        .to_text()?;
        sink.send(Message::text(handshake))
            .await
            .map_err(|e| CloudError::Handshake {
                reason: e.to_string(),
            })?;

        let mut recorder = Recorder::new(Box::pin(stream));
        recorder.start();

        Ok(Link {
            sink,
            recorder: Some(recorder),
        })
    }

    async fn teardown(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Some(mut recorder) = link.recorder.take() {
                recorder.disconnect();
            }
            match tokio::time::timeout(self.config.connect_timeout(), link.sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(error = %err, "ignoring cloud socket close failure"),
                Err(_) => debug!("cloud socket close timed out"),
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Upgrade request carrying the configured headers, cookies, and origin.
    fn build_request(&self) -> Result<Request> {
        let mut request = self
            .config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| CloudError::InvalidRequest {
                reason: format!("endpoint {}: {e}", self.config.endpoint),
            })?;

        let headers = request.headers_mut();
        for (name, value) in &self.config.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| CloudError::InvalidRequest {
                    reason: format!("header name {name:?}: {e}"),
                })?;
            let _ = headers.insert(header_name, header_value(name, value)?);
        }
        if let Some(cookie) = self.config.cookie_header() {
            let _ = headers.insert(header::COOKIE, header_value("Cookie", &cookie)?);
        }
        if let Some(origin) = &self.config.origin {
            let _ = headers.insert(header::ORIGIN, header_value("Origin", origin)?);
        }

        Ok(request)
    }

    // ─── Variables ───────────────────────────────────────────────────────

    /// Send a new value for `name`. No acknowledgement is awaited.
    pub async fn set_variable(&mut self, name: &str, value: impl Into<CloudValue>) -> Result<()> {
        if !self.is_connected() {
            return Err(CloudError::NotConnected);
        }
        let text = ClientFrame::Set {
            name: canonical_name(name),
            value: value.into(),
            user: self.username.clone(),
            project_id: self.project_id.clone(),
        }
        .to_text()?;

        let link = self.link.as_mut().ok_or(CloudError::NotConnected)?;
        link.sink
            .send(Message::text(text))
            .await
            .map_err(|e| CloudError::Send {
                reason: e.to_string(),
            })
    }

    /// Latest known value of `name`.
    ///
    /// Right after connecting the cache may still be empty, so this first
    /// polls until any variable has arrived or the read timeout elapses. It
    /// does not wait for `name` specifically; use
    /// [`wait_for_variable`](Self::wait_for_variable) for that.
    pub async fn get_variable(&self, name: &str) -> Result<Option<CloudValue>> {
        let recorder = self.active_recorder()?;
        let name = canonical_name(name);
        self.wait_until_populated(recorder).await;
        Ok(recorder.get_variable(&name))
    }

    /// Wait until `name` itself has a value, up to `timeout`.
    pub async fn wait_for_variable(&self, name: &str, timeout: Duration) -> Result<CloudValue> {
        let recorder = self.active_recorder()?;
        let name = canonical_name(name);
        recorder
            .wait_for_variable(&name, timeout)
            .await
            .ok_or_else(|| CloudError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                context: format!("waiting for {name}"),
            })
    }

    /// Snapshot of every cached variable, after the same initial wait as
    /// [`get_variable`](Self::get_variable).
    pub async fn variables(&self) -> Result<HashMap<String, CloudValue>> {
        let recorder = self.active_recorder()?;
        self.wait_until_populated(recorder).await;
        Ok(recorder.get_all_variables())
    }

    /// The active recorder, if any.
    pub fn recorder(&self) -> Option<&Recorder> {
        self.link.as_ref().and_then(|link| link.recorder.as_ref())
    }

    /// Detach the recorder, leaving a write-only session.
    pub fn take_recorder(&mut self) -> Option<Recorder> {
        self.link.as_mut().and_then(|link| link.recorder.take())
    }

    fn active_recorder(&self) -> Result<&Recorder> {
        let link = match (&self.link, self.state) {
            (Some(link), ConnectionState::Connected) => link,
            _ => return Err(CloudError::NotConnected),
        };
        link.recorder.as_ref().ok_or(CloudError::RecorderUninitialized)
    }

    async fn wait_until_populated(&self, recorder: &Recorder) {
        let deadline = Instant::now() + self.config.read_timeout();
        while recorder.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| CloudError::InvalidRequest {
        reason: format!("header {name}: {e}"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn session_with(config: SessionConfig) -> CloudSession {
        CloudSession::new("1194614729", "tester", config)
    }

    fn session() -> CloudSession {
        session_with(SessionConfig::default())
    }

    // ── Preconditions ───────────────────────────────────────────────

    #[test]
    fn new_session_is_disconnected() {
        let session = session();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.is_connected());
        assert!(session.recorder().is_none());
        assert_eq!(session.username(), "tester");
        assert_eq!(session.project_id(), &ProjectId::from("1194614729"));
    }

    #[tokio::test]
    async fn set_before_connect_is_not_connected() {
        let mut session = session();
        let err = session.set_variable("Lives", 3).await.unwrap_err();
        assert_matches!(err, CloudError::NotConnected);
    }

    #[tokio::test]
    async fn get_before_connect_is_not_connected() {
        let session = session();
        let err = session.get_variable("Score").await.unwrap_err();
        assert_matches!(err, CloudError::NotConnected);
    }

    #[tokio::test]
    async fn wait_and_snapshot_before_connect_are_not_connected() {
        let session = session();
        assert_matches!(
            session
                .wait_for_variable("Score", Duration::from_millis(10))
                .await,
            Err(CloudError::NotConnected)
        );
        assert_matches!(session.variables().await, Err(CloudError::NotConnected));
    }

    #[tokio::test]
    async fn close_without_connect_is_harmless() {
        let mut session = session();
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn take_recorder_when_disconnected_is_none() {
        let mut session = session();
        assert!(session.take_recorder().is_none());
    }

    // ── Request building ────────────────────────────────────────────

    #[test]
    fn request_carries_headers_cookies_and_origin() {
        let mut config = SessionConfig::with_endpoint("ws://127.0.0.1:9/");
        let _ = config.headers.insert("User-Agent".into(), "cloudvar-test".into());
        let _ = config.cookies.insert("scratchsessionsid".into(), "abc".into());
        config.origin = Some("https://scratch.mit.edu".into());

        let request = session_with(config).build_request().unwrap();
        let headers = request.headers();
        assert_eq!(headers["user-agent"], "cloudvar-test");
        assert_eq!(headers["cookie"], "scratchsessionsid=abc");
        assert_eq!(headers["origin"], "https://scratch.mit.edu");
        assert_eq!(request.uri(), "ws://127.0.0.1:9/");
    }

    #[test]
    fn request_without_extras_has_no_cookie_or_origin() {
        let request = session_with(SessionConfig::with_endpoint("ws://127.0.0.1:9/"))
            .build_request()
            .unwrap();
        assert!(request.headers().get("cookie").is_none());
        assert!(request.headers().get("origin").is_none());
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let mut config = SessionConfig::with_endpoint("ws://127.0.0.1:9/");
        let _ = config.headers.insert("bad header".into(), "x".into());
        let err = session_with(config).build_request().unwrap_err();
        assert_matches!(err, CloudError::InvalidRequest { .. });
    }

    #[test]
    fn invalid_cookie_value_is_rejected() {
        let mut config = SessionConfig::with_endpoint("ws://127.0.0.1:9/");
        let _ = config.cookies.insert("session".into(), "line\nbreak".into());
        let err = session_with(config).build_request().unwrap_err();
        assert_matches!(err, CloudError::InvalidRequest { .. });
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let err = session_with(SessionConfig::with_endpoint("not a url"))
            .build_request()
            .unwrap_err();
        assert_matches!(err, CloudError::InvalidRequest { .. });
    }

    // ── Connection failures ─────────────────────────────────────────

    #[tokio::test]
    async fn connect_to_closed_port_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut session = session_with(SessionConfig::with_endpoint(format!("ws://127.0.0.1:{port}/")));
        let err = session.connect().await.unwrap_err();
        assert_matches!(err, CloudError::Transport { .. });
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_matches!(
            session.get_variable("x").await,
            Err(CloudError::NotConnected)
        );
    }

    #[tokio::test]
    async fn secure_endpoint_failure_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _peer = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                drop(tcp);
            }
        });

        let mut session = session_with(SessionConfig {
            connect_timeout_ms: 1_000,
            ..SessionConfig::with_endpoint(format!("wss://localhost:{port}/"))
        });
        let err = session.connect().await.unwrap_err();
        assert_matches!(err, CloudError::Transport { .. });
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.recorder().is_none());
    }

    #[tokio::test]
    async fn connect_with_invalid_request_opens_nothing() {
        let mut session = session_with(SessionConfig::with_endpoint("not a url"));
        let err = session.connect().await.unwrap_err();
        assert_matches!(err, CloudError::InvalidRequest { .. });
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
