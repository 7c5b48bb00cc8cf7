//! Live session client over the relay websocket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::Instrument;

use super::events::{InboundEvent, SessionEvent};
use super::protocol::{routing_directive, setup_frame, OutboundMessage};
use super::sink::{dispatch, EventSink};
use super::state::{ConnectionState, StateCell};
use super::tools::ToolResult;
use crate::config::SessionConfig;
use crate::error::{LiveError, Result};

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type EventSender = mpsc::UnboundedSender<SessionEvent>;

struct SessionRuntime {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// A duplex live session with the relay.
///
/// Commands take `&self`, so a session can be shared behind an `Arc` between
/// the event loop and whatever answers tool calls.
pub struct LiveSession {
    config: Arc<SessionConfig>,
    session_id: String,
    state: Arc<StateCell>,
    events_tx: EventSender,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    media: MediaSender,
    outbound_rx: Mutex<Option<mpsc::Receiver<OutboundMessage>>>,
    runtime: Mutex<Option<SessionRuntime>>,
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("session_id", &self.session_id)
            .field("state", &self.state.get())
            .field("relay_url", &self.config.relay_url)
            .finish()
    }
}

impl LiveSession {
    /// Create a session in the `Idle` state (does not connect yet).
    pub fn new(config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let state = Arc::new(StateCell::new());
        let media = MediaSender {
            outbound: outbound_tx,
            state: Arc::clone(&state),
            dropped: Arc::new(AtomicU64::new(0)),
        };

        Self {
            config: Arc::new(config),
            session_id: uuid::Uuid::new_v4().to_string(),
            state,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            media,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            runtime: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Take the event stream. Only the first call returns `Some`.
    ///
    /// Events are buffered only for a consumer taken before `connect`. If the
    /// stream is still unclaimed at connect time it is dropped and later
    /// events are discarded.
    pub fn take_events(&self) -> Option<SessionEvents> {
        lock(&self.events_rx)
            .take()
            .map(|rx| SessionEvents { rx })
    }

    /// Cloneable, non-blocking handle for capture pipelines.
    pub fn media_sender(&self) -> MediaSender {
        self.media.clone()
    }

    /// Number of media chunks dropped because the session was not open or
    /// the outbound queue was full.
    pub fn dropped_media_chunks(&self) -> u64 {
        self.media.dropped()
    }

    /// Dial the relay and send the routing directive and setup frames.
    ///
    /// The session becomes `Open` once the remote acknowledges setup. A
    /// transport failure is reported both as the returned error and as
    /// `Error` + `StateChanged(Closed)` events.
    pub async fn connect(&self) -> Result<()> {
        match self.state.get() {
            ConnectionState::Idle => {}
            ConnectionState::Closed => {
                return Err(LiveError::InvalidState(
                    "Session is closed; create a new session to reconnect".into(),
                ))
            }
            ConnectionState::Connecting | ConnectionState::Open => {
                return Err(LiveError::InvalidState(
                    "Session is already connected".into(),
                ))
            }
        }

        self.config.validate()?;
        let handshake = [routing_directive(&self.config)?, setup_frame(&self.config)?];

        let outbound_rx = lock(&self.outbound_rx)
            .take()
            .ok_or_else(|| LiveError::InvalidState("Session is already connected".into()))?;
        if lock(&self.events_rx).take().is_some() {
            tracing::debug!("no event consumer; session events will be discarded");
        }
        set_state(&self.state, &self.events_tx, ConnectionState::Connecting);

        let socket = match open_relay(&self.config.relay_url, &handshake).await {
            Ok(socket) => socket,
            Err(error) => {
                tracing::debug!(session_id = %self.session_id, error = %error, "relay connect failed");
                let _ = self.events_tx.send(SessionEvent::error(error.to_string()));
                set_state(&self.state, &self.events_tx, ConnectionState::Closed);
                return Err(error);
            }
        };
        if self.state.get() != ConnectionState::Connecting {
            let mut socket = socket;
            let _ = socket.close(None).await;
            return Err(LiveError::InvalidState(
                "Session was closed while connecting".into(),
            ));
        }
        tracing::debug!(
            session_id = %self.session_id,
            relay = %self.config.relay_url,
            "relay connected, handshake sent"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let span = tracing::debug_span!("live_session", session_id = %self.session_id);
        let task = tokio::spawn(
            run_connection(
                socket,
                outbound_rx,
                self.events_tx.clone(),
                Arc::clone(&self.state),
                shutdown_rx,
                self.config.heartbeat_interval(),
            )
            .instrument(span),
        );
        *lock(&self.runtime) = Some(SessionRuntime { shutdown_tx, task });
        Ok(())
    }

    /// Close the connection. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        let runtime = lock(&self.runtime).take();
        match runtime {
            Some(runtime) => {
                let _ = runtime.shutdown_tx.send(true);
                runtime.task.await.map_err(|error| {
                    LiveError::InvalidState(format!("Session runtime task failed: {error}"))
                })?;
            }
            None => {
                lock(&self.outbound_rx).take();
                set_state(&self.state, &self.events_tx, ConnectionState::Closed);
            }
        }
        Ok(())
    }

    /// Send a complete user text turn.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.enqueue(OutboundMessage::ClientText(text.into()))
    }

    /// Queue a base64 PCM16 audio chunk. Dropped when not open.
    pub fn send_audio(&self, chunk: impl Into<String>) -> bool {
        self.media.send_audio(chunk)
    }

    /// Queue a base64 JPEG frame. Dropped when not open.
    pub fn send_video(&self, frame: impl Into<String>) -> bool {
        self.media.send_video(frame)
    }

    /// Answer a prior tool call with all of its results in one frame.
    pub fn send_tool_response(&self, results: Vec<ToolResult>) -> Result<()> {
        self.enqueue(OutboundMessage::ToolResponse(results))
    }

    fn enqueue(&self, message: OutboundMessage) -> Result<()> {
        if !self.state.is_open() {
            return Err(LiveError::NotConnected);
        }
        self.media
            .outbound
            .try_send(message)
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => {
                    LiveError::Connection("Outbound queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => LiveError::NotConnected,
            })
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(runtime) = lock(&self.runtime).take() {
            let _ = runtime.shutdown_tx.send(true);
            runtime.task.abort();
        }
    }
}

/// Non-blocking media hand-off into a session's outbound queue.
///
/// Safe to call from device callbacks: it never waits and never takes a
/// blocking lock. Chunks offered while the session is not open, or while
/// the queue is full, are dropped.
#[derive(Debug, Clone)]
pub struct MediaSender {
    outbound: mpsc::Sender<OutboundMessage>,
    state: Arc<StateCell>,
    dropped: Arc<AtomicU64>,
}

impl MediaSender {
    pub fn send_audio(&self, chunk: impl Into<String>) -> bool {
        self.offer(OutboundMessage::RealtimeAudio(chunk.into()))
    }

    pub fn send_video(&self, frame: impl Into<String>) -> bool {
        self.offer(OutboundMessage::RealtimeVideo(frame.into()))
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn offer(&self, message: OutboundMessage) -> bool {
        if self.state.is_open() && self.outbound.try_send(message).is_ok() {
            return true;
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        false
    }
}

/// Caller-owned stream of session events, in arrival order.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    /// Wait for the next event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }

    /// Dispatch events into `sink` until the session closes.
    pub async fn forward_to<S>(&mut self, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        while let Some(event) = self.rx.recv().await {
            dispatch(sink, &event);
            if event == SessionEvent::StateChanged(ConnectionState::Closed) {
                break;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_state(state: &StateCell, events_tx: &EventSender, next: ConnectionState) {
    if state.transition(next) {
        tracing::debug!(state = %next, "connection state changed");
        let _ = events_tx.send(SessionEvent::StateChanged(next));
    }
}

async fn open_relay(relay_url: &str, handshake: &[String]) -> Result<RelaySocket> {
    let request = relay_url.into_client_request().map_err(|error| {
        LiveError::Configuration(format!("Invalid relay websocket URL: {error}"))
    })?;
    let (mut socket, _) = connect_async(request).await.map_err(map_connect_error)?;

    for frame in handshake {
        socket
            .send(Message::Text(frame.clone().into()))
            .await
            .map_err(|error| LiveError::Connection(format!("Relay handshake send failed: {error}")))?;
    }
    Ok(socket)
}

fn map_connect_error(error: WsError) -> LiveError {
    match error {
        WsError::Http(response) => LiveError::Connection(format!(
            "Relay websocket handshake failed with status {}",
            response.status().as_u16()
        )),
        WsError::Url(error) => {
            LiveError::Configuration(format!("Invalid relay websocket URL: {error}"))
        }
        other => LiveError::Connection(format!("Relay websocket connect failed: {other}")),
    }
}

async fn run_connection(
    mut socket: RelaySocket,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
    events_tx: EventSender,
    state: Arc<StateCell>,
    mut shutdown_rx: watch::Receiver<bool>,
    heartbeat_interval: Option<Duration>,
) {
    let mut heartbeat = heartbeat_interval.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = socket.close(None).await;
                    break;
                }
            }
            Some(message) = outbound_rx.recv() => {
                let frame = match message.to_frame() {
                    Ok(frame) => frame,
                    Err(error) => {
                        let _ = events_tx.send(SessionEvent::error(format!(
                            "Failed to encode outbound frame: {error}"
                        )));
                        continue;
                    }
                };
                if let Err(error) = socket.send(Message::Text(frame.into())).await {
                    let _ = events_tx.send(SessionEvent::error(format!(
                        "Relay send failed: {error}"
                    )));
                    break;
                }
            }
            _ = next_heartbeat(&mut heartbeat) => {
                if let Err(error) = socket.send(Message::Ping(Default::default())).await {
                    let _ = events_tx.send(SessionEvent::error(format!(
                        "Relay heartbeat failed: {error}"
                    )));
                    break;
                }
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => handle_payload(&text, &events_tx, &state),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => handle_payload(&text, &events_tx, &state),
                        Err(_) => {
                            let _ = events_tx.send(SessionEvent::error(
                                "Relay sent a binary frame that is not UTF-8",
                            ));
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(error) = socket.send(Message::Pong(payload)).await {
                            let _ = events_tx.send(SessionEvent::error(format!(
                                "Relay pong failed: {error}"
                            )));
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(reason))) => {
                        tracing::debug!(?reason, "relay closed the connection");
                        break;
                    }
                    Some(Err(error)) => {
                        let _ = events_tx.send(SessionEvent::error(format!(
                            "Relay receive failed: {error}"
                        )));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    outbound_rx.close();
    set_state(&state, &events_tx, ConnectionState::Closed);
}

async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn handle_payload(payload: &str, events_tx: &EventSender, state: &StateCell) {
    let frame = match serde_json::from_str::<Value>(payload) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::warn!(error = %error, "relay frame is not JSON");
            let _ = events_tx.send(SessionEvent::error(format!(
                "Failed to parse relay frame: {error}"
            )));
            return;
        }
    };

    let event = InboundEvent::classify(&frame);
    match &event {
        InboundEvent::SetupComplete => set_state(state, events_tx, ConnectionState::Open),
        InboundEvent::Unrecognized { .. } => {
            tracing::debug!("relay frame matched no known shape");
        }
        _ => {}
    }
    let _ = events_tx.send(SessionEvent::Inbound(event));
}
