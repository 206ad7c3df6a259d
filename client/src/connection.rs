//! WebSocket transport to the relay server.
//!
//! The socket lives on a tokio task. The render domain only sees a
//! [`Connection`], which exchanges packets with that task over unbounded
//! channels and never blocks.

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{Packet, ProtocolError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Idle time after which the watchdog closes the connection.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Packet(Packet),
    Closed,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection is not open")]
    NotOpen,
    #[error("failed to encode packet: {0}")]
    Encode(#[from] ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Close requested, waiting for the transport to confirm.
    Closing,
    Closed,
}

#[derive(Debug)]
pub enum Outbound {
    Text(String),
    Close,
}

pub struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    state: ConnectionState,
}

impl Connection {
    /// Starts connecting to `url` on `runtime`. Events arrive through [`poll`](Self::poll).
    pub fn open(runtime: &Handle, url: &str) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        runtime.spawn(drive(url.to_string(), outbound_rx, event_tx));
        Self::from_channels(outbound_tx, event_rx)
    }

    /// In-memory connection with the far end handed back to the caller.
    pub fn pair() -> (Self, ConnectionPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self::from_channels(outbound_tx, event_rx),
            ConnectionPeer {
                outbound: outbound_rx,
                events: event_tx,
            },
        )
    }

    fn from_channels(
        outbound: mpsc::UnboundedSender<Outbound>,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> Self {
        Self {
            outbound,
            events,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Queues a packet. Refused unless the socket is open.
    pub fn send(&self, packet: &Packet) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::NotOpen);
        }
        let text = packet.encode()?;
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| ConnectionError::NotOpen)
    }

    pub fn poll(&mut self) -> Option<ConnectionEvent> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        let event = match self.events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => ConnectionEvent::Closed,
        };
        match event {
            ConnectionEvent::Opened if self.state == ConnectionState::Connecting => {
                self.state = ConnectionState::Open
            }
            ConnectionEvent::Opened => {}
            ConnectionEvent::Closed => self.state = ConnectionState::Closed,
            ConnectionEvent::Packet(_) => {}
        }
        Some(event)
    }

    /// Everything received so far. `Closed` is reported once and is always last.
    pub fn drain(&mut self) -> Vec<ConnectionEvent> {
        std::iter::from_fn(|| self.poll()).collect()
    }

    /// Asks the transport to close. Sends are refused from here on; the
    /// `Closed` event still comes through [`poll`](Self::poll).
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if self.outbound.send(Outbound::Close).is_err() {
            debug!("Transport already gone");
        }
        self.state = ConnectionState::Closing;
    }
}

/// Far end of [`Connection::pair`], standing in for the socket task
pub struct ConnectionPeer {
    outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionPeer {
    pub fn open(&self) {
        self.emit(ConnectionEvent::Opened);
    }

    pub fn deliver(&self, packet: Packet) {
        self.emit(ConnectionEvent::Packet(packet));
    }

    pub fn close(&self) {
        self.emit(ConnectionEvent::Closed);
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events.send(event) {
            error!("Connection dropped, lost {:?}", e.0);
        }
    }

    /// Packets sent by the connection since the last call.
    pub fn sent(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(outbound) = self.outbound.try_recv() {
            if let Outbound::Text(text) = outbound {
                match Packet::decode(&text) {
                    Ok(packet) => packets.push(packet),
                    Err(e) => error!("Connection sent bad packet: {}", e),
                }
            }
        }
        packets
    }

    /// True once the connection asked to close.
    pub fn close_requested(&mut self) -> bool {
        let mut requested = false;
        while let Ok(outbound) = self.outbound.try_recv() {
            requested |= matches!(outbound, Outbound::Close);
        }
        requested
    }
}

fn forward(events: &mpsc::UnboundedSender<ConnectionEvent>, decoded: Result<Packet, ProtocolError>) -> bool {
    match decoded {
        Ok(packet) => events.send(ConnectionEvent::Packet(packet)).is_ok(),
        Err(e) => {
            debug!("Ignoring message: {}", e);
            true
        }
    }
}

async fn drive(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    info!("Connecting to {}", url);
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", url, e);
            let _ = events.send(ConnectionEvent::Closed);
            return;
        }
    };
    info!("Connected to {}", url);
    if events.send(ConnectionEvent::Opened).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        warn!("Failed to send message: {}", e);
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("Close frame not sent: {}", e);
                    }
                    break;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !forward(&events, Packet::decode(&text)) {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if !forward(&events, Packet::decode_bytes(&bytes)) {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            },
        }
    }

    info!("Disconnected from {}", url);
    let _ = events.send(ConnectionEvent::Closed);
}

/// Fires once when no qualifying input arrives within the timeout
#[derive(Debug, Clone)]
pub struct InactivityWatchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Default for InactivityWatchdog {
    fn default() -> Self {
        Self::new(INACTIVITY_TIMEOUT)
    }
}

impl InactivityWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Pushes the deadline back. No effect while disarmed.
    pub fn touch(&mut self, now: Instant) {
        if self.deadline.is_some() {
            self.arm(now);
        }
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Opens connections for the session, initially and on every reconnect
pub trait Connector {
    fn connect(&mut self) -> Connection;
}

impl<F> Connector for F
where
    F: FnMut() -> Connection,
{
    fn connect(&mut self) -> Connection {
        self()
    }
}

pub struct WebSocketConnector {
    runtime: Handle,
    url: String,
}

impl WebSocketConnector {
    pub fn new(runtime: Handle, url: impl Into<String>) -> Self {
        Self {
            runtime,
            url: url.into(),
        }
    }
}

impl Connector for WebSocketConnector {
    fn connect(&mut self) -> Connection {
        Connection::open(&self.runtime, &self.url)
    }
}
