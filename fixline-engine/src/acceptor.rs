/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Acceptor supervisor.
//!
//! Listens on a TCP endpoint; every inbound connection is sniffed until
//! the first well-formed frame, the session identity is derived by
//! reversing the wire CompIDs, and the stream is handed to the matching
//! registered session. Unknown identities and second connections for an
//! already-connected session are refused without disturbing anything.

use crate::initiator::framer_for;
use crate::registry::{SessionRegistry, graceful_shutdown, spawn_ticker};
use bytes::BytesMut;
use fixline_core::types::{CompId, FixVersion, SessionId};
use fixline_core::tags;
use fixline_transport::{run_connection_buffered, scan_message};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long an inbound connection may take to produce its first frame.
const SNIFF_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on bytes buffered while sniffing.
const SNIFF_LIMIT: usize = 64 * 1024;

/// Supervisor for inbound (listening) sessions.
pub struct Acceptor {
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
    tick_interval: Duration,
    tasks: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Acceptor {
    /// Creates a supervisor over the given registry.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            cancel: CancellationToken::new(),
            tick_interval: Duration::from_secs(1),
            tasks: Vec::new(),
            local_addr: None,
        }
    }

    /// Sets the tick cadence.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Binds the listener and spawns the accept and ticker tasks.
    ///
    /// # Errors
    /// Returns the bind error.
    ///
    /// # Returns
    /// The bound address (useful with port 0).
    pub async fn start(&mut self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        info!(%local_addr, "acceptor listening");

        self.tasks.push(spawn_ticker(
            Arc::clone(&self.registry),
            self.tick_interval,
            self.cancel.clone(),
        ));
        self.tasks.push(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            self.cancel.clone(),
        )));
        Ok(local_addr)
    }

    /// Returns the bound address once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Graceful stop: Logout to logged-on sessions, wait up to their
    /// LogoutTimeout, force-disconnect, then cancel the worker tasks.
    pub async fn stop(&mut self) {
        graceful_shutdown(&self.registry).await;
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("acceptor stopped");
    }
}

/// Accepts connections until cancellation.
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "inbound connection");
                        let registry = Arc::clone(&registry);
                        let connection_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            handle_inbound(stream, registry, connection_cancel).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

/// Sniffs the first frame, routes the connection to its session, refuses
/// strangers and duplicate connections.
async fn handle_inbound(
    mut stream: TcpStream,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
) {
    let mut buf = BytesMut::with_capacity(4 * 1024);
    let sniffed = tokio::time::timeout(SNIFF_TIMEOUT, async {
        loop {
            if scan_message(&buf).is_some() {
                return true;
            }
            if buf.len() > SNIFF_LIMIT {
                return false;
            }
            match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }
        }
    })
    .await;
    if !matches!(sniffed, Ok(true)) {
        warn!("inbound connection closed before a well-formed message");
        return;
    }

    let Some(wire_id) = derive_wire_session_id(&buf) else {
        warn!("inbound connection's first message has no usable identity");
        return;
    };
    let local_id = wire_id.reverse();
    let Some(handle) = registry.lookup(&local_id) else {
        warn!(session = %local_id, "no session accepts this identity, refusing");
        return;
    };

    let framer = {
        let session = handle.lock().await;
        if session.has_responder() {
            warn!(session = %local_id, "session already has a connection, refusing another");
            return;
        }
        framer_for(session.config())
    };

    if let Err(e) = run_connection_buffered(stream, handle, framer, cancel, buf).await {
        warn!(session = %local_id, error = %e, "connection ended with error");
    }
}

/// Extracts the identity fields of the first frame, as they appear on the
/// wire (the caller reverses them to find the local session).
fn derive_wire_session_id(frame: &[u8]) -> Option<SessionId> {
    let version: FixVersion = header_field(frame, tags::BEGIN_STRING)?.parse().ok()?;
    let sender = CompId::new(header_field(frame, tags::SENDER_COMP_ID)?)?;
    let target = CompId::new(header_field(frame, tags::TARGET_COMP_ID)?)?;

    let mut id = SessionId::new(version, sender, target);
    if let Some(sub) = header_field(frame, tags::SENDER_SUB_ID).and_then(CompId::new) {
        id = id.with_sender_sub_id(sub);
    }
    if let Some(sub) = header_field(frame, tags::TARGET_SUB_ID).and_then(CompId::new) {
        id = id.with_target_sub_id(sub);
    }
    if let Some(loc) = header_field(frame, tags::SENDER_LOCATION_ID).and_then(CompId::new) {
        id = id.with_sender_location_id(loc);
    }
    if let Some(loc) = header_field(frame, tags::TARGET_LOCATION_ID).and_then(CompId::new) {
        id = id.with_target_location_id(loc);
    }
    Some(id)
}

/// Finds `tag=` in a raw frame and returns its value.
fn header_field(frame: &[u8], tag: u32) -> Option<&str> {
    let prefix = format!("{tag}=");
    frame.split(|b| *b == 0x01).find_map(|field| {
        std::str::from_utf8(field)
            .ok()
            .and_then(|f| f.strip_prefix(prefix.as_str()))
    })
}
