/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Initiator supervisor.
//!
//! Owns the reconnect loop: every sweep it finds registered initiator
//! sessions that are disconnected, enabled, inside their session window
//! and past their `ReconnectInterval`, then dials their address list in
//! order and hands the established stream to the session. A ticker task
//! drives every session's timer logic.

use crate::registry::{SessionRegistry, graceful_shutdown, spawn_ticker};
use fixline_core::types::{SessionId, UtcTimestamp};
use fixline_session::config::SessionConfig;
use fixline_session::session::SessionHandle;
use fixline_session::state::ConnectionState;
use fixline_transport::{Framer, run_connection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Supervisor for outbound (dialing) sessions.
pub struct Initiator {
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
    tick_interval: Duration,
    connect_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl Initiator {
    /// Creates a supervisor over the given registry.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            cancel: CancellationToken::new(),
            tick_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            tasks: Vec::new(),
        }
    }

    /// Sets the tick and reconnect-sweep cadence.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the per-address connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Spawns the ticker and reconnect tasks.
    pub fn start(&mut self) {
        self.tasks.push(spawn_ticker(
            Arc::clone(&self.registry),
            self.tick_interval,
            self.cancel.clone(),
        ));
        self.tasks.push(tokio::spawn(reconnect_loop(
            Arc::clone(&self.registry),
            self.cancel.clone(),
            self.tick_interval,
            self.connect_timeout,
        )));
    }

    /// Graceful stop: Logout to logged-on sessions, wait up to their
    /// LogoutTimeout, force-disconnect, then cancel the worker tasks.
    pub async fn stop(&mut self) {
        graceful_shutdown(&self.registry).await;
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("initiator stopped");
    }
}

/// Periodically sweeps the registry and dials sessions that are due a
/// connection attempt; runs until cancellation.
async fn reconnect_loop(
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
    sweep_interval: Duration,
    connect_timeout: Duration,
) {
    let mut last_attempt: HashMap<SessionId, Instant> = HashMap::new();
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(sweep_interval) => {}
        }

        for handle in registry.handles() {
            let (id, addrs, reconnect_interval) = {
                let session = handle.lock().await;
                if !due_for_connect(session.config(), session.state().connection, session.state().enabled) {
                    continue;
                }
                (
                    session.session_id().clone(),
                    session.config().socket_connect.clone(),
                    session.config().reconnect_interval,
                )
            };

            if let Some(at) = last_attempt.get(&id) {
                if at.elapsed() < reconnect_interval {
                    continue;
                }
            }
            last_attempt.insert(id.clone(), Instant::now());
            handle.lock().await.set_pending();

            let connection_cancel = cancel.child_token();
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                connect_and_run(handle, id, addrs, connect_timeout, connection_cancel).await;
            });
        }
    }
}

/// An initiator session wants a connection when it is enabled,
/// disconnected, has somewhere to dial, and is inside its window.
fn due_for_connect(config: &SessionConfig, connection: ConnectionState, enabled: bool) -> bool {
    config.is_initiator()
        && enabled
        && connection == ConnectionState::Disconnected
        && !config.socket_connect.is_empty()
        && config.schedule.is_session_time(UtcTimestamp::now())
}

/// Dials the failover list in order; on success runs the connection to
/// completion, otherwise returns the session to the disconnected state
/// for the next sweep.
async fn connect_and_run(
    handle: SessionHandle,
    id: SessionId,
    addrs: Vec<(String, u16)>,
    connect_timeout: Duration,
    cancel: CancellationToken,
) {
    for (host, port) in addrs {
        let attempt = tokio::time::timeout(
            connect_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await;
        let stream = match attempt {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(session = %id, host, port, error = %e, "connect failed");
                continue;
            }
            Err(_) => {
                warn!(session = %id, host, port, "connect timed out");
                continue;
            }
        };

        info!(session = %id, host, port, "connected");
        let framer = {
            let session = handle.lock().await;
            framer_for(session.config())
        };
        if let Err(e) = run_connection(stream, Arc::clone(&handle), framer, cancel).await {
            warn!(session = %id, error = %e, "connection ended with error");
        }
        return;
    }

    // every address refused: next sweep retries after ReconnectInterval
    let mut session = handle.lock().await;
    if session.state().connection == ConnectionState::Pending {
        if let Err(e) = session.disconnect("all connect attempts failed").await {
            warn!(session = %id, error = %e, "post-connect cleanup failed");
        }
    }
}

/// Builds the framer matching a session's validation settings.
pub(crate) fn framer_for(config: &SessionConfig) -> Framer {
    Framer::new()
        .with_max_message_size(config.max_message_size)
        .with_checksum_validation(config.validate_length_and_checksum)
}
