//! Inbound cache of cloud variable values.
//!
//! A [`Recorder`] owns the read half of one socket. While listening, a
//! background task parses every text frame and applies `set` notifications to
//! an in-memory map, latest value wins. Lookups never touch the socket.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::{CloudValue, InboundFrame, parse_frames};

/// Read half of a cloud socket.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Whether a recorder is currently consuming frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    /// Constructed or stopped; frames queue up on the socket unread.
    Idle,
    /// A listener task is applying inbound frames.
    Listening,
}

/// Cache plus change counter, shared with the listener task.
struct Shared {
    values: RwLock<HashMap<String, CloudValue>>,
    revision: watch::Sender<u64>,
}

impl Shared {
    /// Apply one text frame. Returns how many variables were updated.
    fn ingest(&self, text: &str) -> usize {
        let mut applied = 0;
        for frame in parse_frames(text) {
            match frame {
                Ok(InboundFrame::Set { name, value }) => {
                    trace!(%name, %value, "cloud variable set");
                    let _ = self.values.write().insert(name, value);
                    applied += 1;
                }
                Ok(InboundFrame::Other { method }) => {
                    trace!(%method, "ignoring cloud frame");
                }
                Err(err) => {
                    warn!(error = %err, "cloud variable parse error");
                }
            }
        }
        if applied > 0 {
            self.revision.send_modify(|rev| *rev += 1);
        }
        applied
    }
}

struct Listener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Accumulates `set` notifications for the lifetime of one socket.
pub struct Recorder {
    source: Arc<Mutex<FrameStream>>,
    shared: Arc<Shared>,
    listener: Option<Listener>,
}

impl Recorder {
    /// Bind a recorder to the read half of a socket. Starts idle.
    pub fn new(source: FrameStream) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            source: Arc::new(Mutex::new(source)),
            shared: Arc::new(Shared {
                values: RwLock::new(HashMap::new()),
                revision,
            }),
            listener: None,
        }
    }

    /// Current state. A listener whose socket ended reports `Idle`.
    pub fn state(&self) -> RecorderState {
        match &self.listener {
            Some(listener) if !listener.handle.is_finished() => RecorderState::Listening,
            _ => RecorderState::Idle,
        }
    }

    /// Spawn the listener task. No-op while already listening.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.state() == RecorderState::Listening {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listen(
            Arc::clone(&self.source),
            Arc::clone(&self.shared),
            cancel.clone(),
        ));
        self.listener = Some(Listener { cancel, handle });
    }

    /// Stop applying frames. The cache is kept.
    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.cancel.cancel();
            listener.handle.abort();
        }
    }

    /// Same as [`stop`](Self::stop).
    pub fn disconnect(&mut self) {
        self.stop();
    }

    /// Latest value seen for `name`, matched exactly as it appeared on the wire.
    pub fn get_variable(&self, name: &str) -> Option<CloudValue> {
        self.shared.values.read().get(name).cloned()
    }

    /// Copy of every variable seen so far.
    pub fn get_all_variables(&self) -> HashMap<String, CloudValue> {
        self.shared.values.read().clone()
    }

    /// Number of distinct variables seen.
    pub fn len(&self) -> usize {
        self.shared.values.read().len()
    }

    /// Whether no variable has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.shared.values.read().is_empty()
    }

    /// Counter bumped once per frame that updated the cache.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Wait until `name` has a value, or `timeout` elapses.
    pub async fn wait_for_variable(&self, name: &str, timeout: Duration) -> Option<CloudValue> {
        let mut revisions = self.subscribe();
        let wait = async {
            loop {
                if let Some(value) = self.get_variable(name) {
                    return Some(value);
                }
                if revisions.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    #[cfg(test)]
    fn ingest(&self, text: &str) -> usize {
        self.shared.ingest(text)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn listen(source: Arc<Mutex<FrameStream>>, shared: Arc<Shared>, cancel: CancellationToken) {
    let mut stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        guard = source.lock() => guard,
    };

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                if cancel.is_cancelled() {
                    break;
                }
                let _ = shared.ingest(text.as_str());
            }
            Some(Ok(Message::Close(close))) => {
                debug!(?close, "cloud server closed the connection");
                break;
            }
            // ping, pong, binary
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(error = %err, "cloud socket read failed");
                break;
            }
            None => {
                debug!("cloud socket stream ended");
                break;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
