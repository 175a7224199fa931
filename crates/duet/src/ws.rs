//! WebSocket transport for the server wrapper.
//!
//! The session runtime wants synchronous, non-blocking sends
//! ([`Connection::send`]), while a `tokio-tungstenite` sink is async and
//! single-owner. The bridge is a pump task per connection: the
//! [`WsConnection`] handle pushes frames onto an unbounded channel, and
//! the pump drains it into the sink. The read half stays with the
//! per-connection handler as a [`WsInbound`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use duet_session::Connection;

use crate::DuetError;

/// Counter for connection ids used in logs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Accepts WebSocket connections on a TCP listener.
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    /// Binds the listener.
    pub async fn bind(addr: &str) -> Result<Self, DuetError> {
        let listener = TcpListener::bind(addr).await.map_err(DuetError::Bind)?;
        tracing::info!(addr, "listening for WebSocket connections");
        Ok(Self { listener })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and upgrades the next connection, returning the outbound
    /// handle and the inbound frame stream.
    pub async fn accept(&self) -> Result<(WsConnection, WsInbound), DuetError> {
        let (stream, addr) = self.listener.accept().await.map_err(DuetError::Accept)?;
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(DuetError::Handshake)?;

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(conn = id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_outbound(id, sink, outbound_rx, Arc::clone(&open)));

        let conn = WsConnection { id, outbound: outbound_tx, open: Arc::clone(&open) };
        let inbound = WsInbound { id, stream, open };
        Ok((conn, inbound))
    }
}

/// Drains the outbound channel into the WebSocket sink.
async fn pump_outbound(
    id: u64,
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    open: Arc<AtomicBool>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = sink.send(message).await {
            debug!(conn = id, %err, "outbound send failed");
            break;
        }
        if closing {
            break;
        }
    }
    open.store(false, Ordering::SeqCst);
}

/// Outbound handle to one WebSocket peer. Implements the runtime's
/// [`Connection`] seam; sends after close are silently dropped.
#[derive(Clone)]
pub struct WsConnection {
    id: u64,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
}

impl WsConnection {
    /// Connection id used in logs.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Connection for WsConnection {
    fn send(&self, text: &str) {
        if self.is_open() {
            let _ = self.outbound.send(Message::Text(text.into()));
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(Message::Close(None));
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }
}

/// The inbound half of one WebSocket peer.
pub struct WsInbound {
    id: u64,
    stream: SplitStream<WsStream>,
    open: Arc<AtomicBool>,
}

impl WsInbound {
    /// Returns the next text frame, or `None` once the peer is gone.
    /// Control frames are skipped; binary frames are accepted when they
    /// hold valid UTF-8 (some clients send text as binary).
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => {
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => return Some(text),
                        Err(_) => {
                            debug!(conn = self.id, "dropping non-utf8 binary frame");
                            continue;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.open.store(false, Ordering::SeqCst);
                    return None;
                }
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(err)) => {
                    debug!(conn = self.id, %err, "receive error");
                    self.open.store(false, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }
}
