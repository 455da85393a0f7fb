/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! TCP connection plumbing.
//!
//! A connection pairs a reader loop (bytes in, frames out, fed to the
//! session under its mutex) with a writer task driven by an unbounded
//! command channel. The session only ever sees the [`ChannelResponder`]
//! half, so dropping a connection never leaves a dangling reference into
//! the transport.

use crate::codec::{CodecError, FramedEvent, Framer};
use bytes::{Bytes, BytesMut};
use fixline_session::session::SessionHandle;
use fixline_session::Responder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Commands the session pushes at the writer task.
#[derive(Debug)]
enum TransportCommand {
    /// Write these bytes to the socket.
    Send(Bytes),
    /// Shut the socket down and stop the writer.
    Disconnect,
}

/// Responder backed by the writer task's command channel.
#[derive(Debug)]
pub struct ChannelResponder {
    tx: mpsc::UnboundedSender<TransportCommand>,
}

impl Responder for ChannelResponder {
    fn send_bytes(&self, bytes: Bytes) -> bool {
        self.tx.send(TransportCommand::Send(bytes)).is_ok()
    }

    fn disconnect(&self) {
        let _ = self.tx.send(TransportCommand::Disconnect);
    }
}

/// Runs one established connection to completion: attaches a responder,
/// pumps inbound frames into the session, and tears everything down when
/// the stream ends, the session disconnects, or `cancel` fires.
pub async fn run_connection(
    stream: TcpStream,
    session: SessionHandle,
    framer: Framer,
    cancel: CancellationToken,
) -> Result<(), CodecError> {
    run_connection_buffered(stream, session, framer, cancel, BytesMut::new()).await
}

/// [`run_connection`] variant for acceptors that already read bytes while
/// sniffing the first frame; `initial` is processed before the socket is
/// read again.
pub async fn run_connection_buffered(
    stream: TcpStream,
    session: SessionHandle,
    framer: Framer,
    cancel: CancellationToken,
    initial: BytesMut,
) -> Result<(), CodecError> {
    let (mut read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(write_loop(write_half, rx));
    {
        let mut guard = session.lock().await;
        guard.set_responder(std::sync::Arc::new(ChannelResponder { tx }));
    }

    let mut framer = framer;
    let mut buf = initial;
    let mut early = None;
    if !buf.is_empty() {
        match pump_frames(&mut framer, &mut buf, &session).await {
            Ok(()) => {
                if !session.lock().await.has_responder() {
                    early = Some(Ok(()));
                }
            }
            Err(e) => early = Some(Err(e)),
        }
    }
    let result = if let Some(result) = early {
        result
    } else {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("connection cancelled");
                    break Ok(());
                }
                read = read_half.read_buf(&mut buf) => {
                    match read {
                        Ok(0) => break Ok(()),
                        Ok(_) => {
                            if let Err(e) = pump_frames(&mut framer, &mut buf, &session).await {
                                break Err(e);
                            }
                            // the session may have dropped the transport
                            if !session.lock().await.has_responder() {
                                break Ok(());
                            }
                        }
                        Err(e) => break Err(CodecError::Io(e)),
                    }
                }
            }
        }
    };

    {
        let mut guard = session.lock().await;
        if guard.has_responder() {
            if let Err(e) = guard.disconnect("transport closed").await {
                error!(error = %e, "disconnect after transport close failed");
            }
        }
    }
    writer.abort();
    result
}

/// Decodes every complete frame in `buf` and feeds it to the session.
async fn pump_frames(
    framer: &mut Framer,
    buf: &mut BytesMut,
    session: &SessionHandle,
) -> Result<(), CodecError> {
    while let Some(event) = framer.decode(buf)? {
        match event {
            FramedEvent::Frame(frame) => {
                let mut guard = session.lock().await;
                if let Err(e) = guard.on_message(&frame).await {
                    // protocol-fatal; the session already disconnected
                    warn!(error = %e, "session terminated the connection");
                    return Ok(());
                }
            }
            FramedEvent::Garbled { reason } => {
                warn!(reason, "discarded garbled bytes");
            }
        }
    }
    Ok(())
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<TransportCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            TransportCommand::Send(bytes) => {
                if let Err(e) = write_half.write_all(&bytes).await {
                    error!(error = %e, "socket write failed");
                    break;
                }
            }
            TransportCommand::Disconnect => break,
        }
    }
    let _ = write_half.shutdown().await;
}
