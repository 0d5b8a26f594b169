//! Duplex channel abstraction.
//!
//! A [`Transport`] opens a [`TransportLink`]: a pair of channels to a task
//! that owns the real connection. Text frames go out on one channel and
//! [`TransportSignal`]s come back on the other. This is a thin layer; framing
//! and acknowledgement bookkeeping live in [`crate::Session`].
//!
//! Reconnection belongs to the transport. A link that loses its connection
//! reports [`TransportSignal::Closed`] and, if it reconnects, a fresh
//! [`TransportSignal::Open`].

use std::time::Duration;

use parley_proto::Frame;
use serde_json::Value;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

/// Capacity of the channels between a link and its connection task.
pub const LINK_CAPACITY: usize = 64;

/// Time a closing link's task gets to flush queued frames before it is aborted.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection task is gone.
    #[error("link closed")]
    LinkClosed,

    /// Outgoing queue is full.
    #[error("outgoing queue full")]
    Backpressure,

    /// Endpoint address could not be used.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Frame could not be encoded.
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// Connection progress reported by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// Connection established or re-established.
    Open,
    /// Connection lost.
    Closed {
        /// Why, as reported by the transport.
        reason: String,
    },
    /// Connection attempt failed.
    OpenFailed {
        /// Why, as reported by the transport.
        reason: String,
    },
    /// Text frame from the peer.
    Frame(String),
}

/// Opens links to a peer.
pub trait Transport: Send + 'static {
    /// Start a connection task and return its link.
    ///
    /// Progress, including the initial open, is reported as signals.
    fn open(&mut self) -> TransportLink;
}

/// Client end of a connection task.
///
/// Dropping the link aborts the task; [`TransportLink::close`] lets it flush
/// first.
#[derive(Debug)]
pub struct TransportLink {
    outgoing: mpsc::Sender<String>,
    signals: mpsc::Receiver<TransportSignal>,
    task: Option<JoinHandle<()>>,
}

impl TransportLink {
    /// Assemble a link from its channels and the task driving them.
    pub fn new(
        outgoing: mpsc::Sender<String>,
        signals: mpsc::Receiver<TransportSignal>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { outgoing, signals, task }
    }

    /// Queue a text frame.
    ///
    /// # Errors
    ///
    /// - `TransportError::Backpressure` if the outgoing queue is full
    /// - `TransportError::LinkClosed` if the connection task ended
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outgoing.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::LinkClosed,
        })
    }

    /// Next signal, or `None` once the connection task has ended.
    pub async fn next_signal(&mut self) -> Option<TransportSignal> {
        self.signals.recv().await
    }

    /// Close the link, letting the task deliver frames already queued.
    ///
    /// The task sees the outgoing channel end once the queue is drained and
    /// shuts the connection down. It is aborted if still running after
    /// [`CLOSE_GRACE`].
    pub async fn close(mut self) {
        let task = self.task.take();
        drop(self);

        if let Some(mut task) = task {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                tracing::warn!("connection task did not finish closing, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// In-process transport.
///
/// Every [`Transport::open`] hands a [`MemoryPeer`] to the paired
/// [`MemoryListener`]; the peer plays the server side of that link.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    accept: mpsc::UnboundedSender<MemoryPeer>,
}

/// Receives the server side of each link a [`MemoryTransport`] opens.
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Create a connected transport/listener pair.
pub fn memory_transport() -> (MemoryTransport, MemoryListener) {
    let (accept, incoming) = mpsc::unbounded_channel();
    (MemoryTransport { accept }, MemoryListener { incoming })
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> TransportLink {
        let (outgoing, from_client) = mpsc::channel(LINK_CAPACITY);
        let (to_client, signals) = mpsc::channel(LINK_CAPACITY);
        let failed = to_client.clone();

        if self.accept.send(MemoryPeer { from_client, to_client }).is_err() {
            // Fresh channel, cannot be full.
            let _ = failed.try_send(TransportSignal::OpenFailed { reason: "listener closed".into() });
        }
        TransportLink::new(outgoing, signals, None)
    }
}

impl MemoryListener {
    /// Wait for the next link.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }
}

/// Server side of an in-process link.
///
/// The peer models a reconnecting channel: it can report the connection open,
/// drop it and open it again without the client reopening the link.
#[derive(Debug)]
pub struct MemoryPeer {
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<TransportSignal>,
}

impl MemoryPeer {
    /// Report the connection open.
    pub async fn open(&self) -> Result<(), TransportError> {
        self.signal(TransportSignal::Open).await
    }

    /// Report a failed connection attempt.
    pub async fn fail_open(&self, reason: &str) -> Result<(), TransportError> {
        self.signal(TransportSignal::OpenFailed { reason: reason.to_owned() }).await
    }

    /// Report the connection lost.
    pub async fn drop_connection(&self, reason: &str) -> Result<(), TransportError> {
        self.signal(TransportSignal::Closed { reason: reason.to_owned() }).await
    }

    /// Push a named event to the client.
    pub async fn push(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.send_frame(&Frame::event(event, data)).await
    }

    /// Acknowledge request `id`.
    pub async fn ack(&self, id: u64, data: Value) -> Result<(), TransportError> {
        self.send_frame(&Frame::ack(id, data)).await
    }

    /// Next frame sent by the client. Undecodable text is skipped.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let text = self.from_client.recv().await?;
            match Frame::decode(&text) {
                Ok(frame) => return Some(frame),
                Err(error) => tracing::warn!(%error, "peer skipped undecodable frame"),
            }
        }
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let text = frame.encode().map_err(|e| TransportError::Encode(e.to_string()))?;
        self.signal(TransportSignal::Frame(text)).await
    }

    async fn signal(&self, signal: TransportSignal) -> Result<(), TransportError> {
        self.to_client.send(signal).await.map_err(|_| TransportError::LinkClosed)
    }
}
