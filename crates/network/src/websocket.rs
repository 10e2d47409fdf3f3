// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! WebSocket implementation of the [`Transport`] seam.
//!
//! Frames are JSON text messages of the form `{"event": <channel>, "data": <payload>}`.
//!
//! A single controller task per transport owns the socket. It connects, pumps reads and writes
//! until the session ends, then retries with exponential backoff until the configured
//! number of reconnection attempts is spent, at which point it raises
//! [`TransportEvent::ReconnectFailed`] and stops for good. Outbound messages reach the
//! controller through an unbounded channel, so [`Transport::emit`] never blocks.

use std::{
    fmt::Debug,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Duration,
};

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde_json::Value;
use tokio::{
    net::TcpStream,
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::{Instant, Interval},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::{
    MUTEX_POISONED,
    backoff::ExponentialBackoff,
    config::ConnectionConfig,
    error::{TransportError, TransportResult},
    observer::ObserverList,
    state::ConnectionState,
    tls::install_cryptographic_provider,
    transport::{
        ChannelRouter, EventHandler, LifecycleHandler, ListenerId, Transport, TransportEvent,
        TransportFactory, WireFrame,
    },
};

type MessageWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type MessageReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type SharedWriter = Arc<Mutex<Option<UnboundedSender<Message>>>>;

/// How a connected session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The transport was asked to disconnect or close.
    Cancelled,
    /// The connection failed or was closed by the server.
    Lost,
}

/// A [`Transport`] over a tokio-tungstenite WebSocket with bounded automatic reconnection.
pub struct WebSocketTransport {
    url: String,
    config: ConnectionConfig,
    backoff: ExponentialBackoff,
    runtime: Handle,
    state: Arc<AtomicU8>,
    closed: AtomicBool,
    router: Arc<ChannelRouter>,
    lifecycle: Arc<ObserverList<TransportEvent>>,
    writer_tx: SharedWriter,
    cancel_token: Mutex<Option<CancellationToken>>,
    controller_task: Mutex<Option<JoinHandle<()>>>,
    controller_active: Arc<AtomicBool>,
}

impl Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(WebSocketTransport))
            .field("url", &self.url)
            .field("state", &self.state())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl WebSocketTransport {
    /// Creates a new [`WebSocketTransport`] driven by the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a tokio runtime or the configuration is invalid.
    pub fn new(config: ConnectionConfig) -> TransportResult<Self> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        Self::with_runtime(config, runtime)
    }

    /// Creates a new [`WebSocketTransport`] whose tasks are spawned on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_runtime(config: ConnectionConfig, runtime: Handle) -> TransportResult<Self> {
        config
            .validate()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        let backoff = config
            .backoff()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        if config.secure {
            install_cryptographic_provider();
        }

        let url = config.server_url();
        let lifecycle = Arc::new(ObserverList::new(format!("{url}-lifecycle")));

        Ok(Self {
            url,
            config,
            backoff,
            runtime,
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected.as_u8())),
            closed: AtomicBool::new(false),
            router: Arc::new(ChannelRouter::new()),
            lifecycle,
            writer_tx: Arc::new(Mutex::new(None)),
            cancel_token: Mutex::new(None),
            controller_task: Mutex::new(None),
            controller_active: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the transport-level connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_atomic(&self.state)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns true while a controller owns the connection.
    ///
    /// A controller stops counting as running before it raises its final lifecycle event,
    /// so handlers reacting to that event may connect again.
    fn controller_running(&self) -> bool {
        self.controller_active.load(Ordering::SeqCst)
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut controller_task = self.controller_task.lock().expect(MUTEX_POISONED);
        if self.controller_running() {
            tracing::debug!("Controller already running for {}", self.url);
            return Ok(());
        }

        let cancel_token = CancellationToken::new();
        *self.cancel_token.lock().expect(MUTEX_POISONED) = Some(cancel_token.clone());
        self.state
            .store(ConnectionState::Connecting.as_u8(), Ordering::SeqCst);

        let controller = Controller {
            url: self.url.clone(),
            connect_timeout: self.config.reconnect_timeout(),
            reconnection_attempts: self.config.reconnection_attempts,
            heartbeat: self.config.heartbeat_secs.map(Duration::from_secs),
            backoff: self.backoff.clone(),
            state: self.state.clone(),
            router: self.router.clone(),
            lifecycle: self.lifecycle.clone(),
            writer_tx: self.writer_tx.clone(),
            cancel_token,
            active: self.controller_active.clone(),
        };
        self.controller_active.store(true, Ordering::SeqCst);

        tracing::debug!("Connecting to {}", self.url);
        *controller_task = Some(self.runtime.spawn(controller.run()));
        Ok(())
    }

    fn disconnect(&self) {
        let cancel_token = self.cancel_token.lock().expect(MUTEX_POISONED).take();

        match cancel_token {
            Some(token) if self.controller_running() => {
                tracing::debug!("Disconnecting from {}", self.url);
                self.state
                    .store(ConnectionState::Disconnecting.as_u8(), Ordering::SeqCst);
                token.cancel();
            }
            _ => {
                // Nothing to tear down, still report completion asynchronously
                self.state
                    .store(ConnectionState::Disconnected.as_u8(), Ordering::SeqCst);
                let lifecycle = self.lifecycle.clone();
                self.runtime.spawn(async move {
                    lifecycle.fire(&TransportEvent::Disconnect);
                });
            }
        }
    }

    fn is_connected(&self) -> bool {
        !self.is_closed() && self.state().can_transmit()
    }

    fn emit(&self, channel: &str, payload: Value) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let frame = WireFrame {
            event: channel.to_string(),
            data: payload,
        };
        let text =
            serde_json::to_string(&frame).map_err(|e| TransportError::Encode(e.to_string()))?;

        let writer_tx = self.writer_tx.lock().expect(MUTEX_POISONED);
        let Some(writer_tx) = writer_tx.as_ref() else {
            return Err(TransportError::NotConnected);
        };

        tracing::trace!("Sending text: {text}");
        writer_tx
            .send(Message::text(text))
            .map_err(|_| TransportError::NotConnected)
    }

    fn on(&self, channel: &str, handler: EventHandler) -> ListenerId {
        self.router.add(channel, handler)
    }

    fn off(&self, channel: &str, id: ListenerId) -> bool {
        self.router.remove(channel, id)
    }

    fn on_lifecycle(&self, handler: LifecycleHandler) {
        self.lifecycle.register(handler);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(token) = self.cancel_token.lock().expect(MUTEX_POISONED).take() {
            token.cancel();
        }
        if let Some(task) = self.controller_task.lock().expect(MUTEX_POISONED).take()
            && !task.is_finished()
        {
            task.abort();
            tracing::debug!("Aborted task 'controller'");
        }

        self.controller_active.store(false, Ordering::SeqCst);
        self.writer_tx.lock().expect(MUTEX_POISONED).take();
        self.router.clear();
        self.lifecycle.clear();
        self.state
            .store(ConnectionState::Disconnected.as_u8(), Ordering::SeqCst);
        tracing::debug!("Closed transport for {}", self.url);
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// State moved into the controller task.
struct Controller {
    url: String,
    connect_timeout: Duration,
    reconnection_attempts: u32,
    heartbeat: Option<Duration>,
    backoff: ExponentialBackoff,
    state: Arc<AtomicU8>,
    router: Arc<ChannelRouter>,
    lifecycle: Arc<ObserverList<TransportEvent>>,
    writer_tx: SharedWriter,
    cancel_token: CancellationToken,
    active: Arc<AtomicBool>,
}

impl Controller {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Releases the transport before raising the final event of this controller.
    fn finish(&self, event: &TransportEvent) {
        self.set_state(ConnectionState::Disconnected);
        self.active.store(false, Ordering::SeqCst);
        self.lifecycle.fire(event);
        tracing::debug!("Completed task 'controller'");
    }

    async fn run(mut self) {
        tracing::debug!("Started task 'controller'");

        let mut attempt: u32 = 0;
        let mut connected_before = false;

        loop {
            let connect = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()));
            let result = tokio::select! {
                () = self.cancel_token.cancelled() => break,
                result = connect => result,
            };

            match result {
                Ok(Ok((stream, _response))) => {
                    self.backoff.reset();
                    attempt = 0;

                    let (writer, reader) = stream.split();
                    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
                    *self.writer_tx.lock().expect(MUTEX_POISONED) = Some(writer_tx);
                    self.set_state(ConnectionState::Connected);

                    let event = if connected_before {
                        TransportEvent::Reconnect
                    } else {
                        TransportEvent::Connect
                    };
                    connected_before = true;
                    tracing::debug!("Connected to {}", self.url);
                    self.lifecycle.fire(&event);

                    let end = self.run_session(writer, reader, writer_rx).await;
                    self.writer_tx.lock().expect(MUTEX_POISONED).take();

                    if end == SessionEnd::Cancelled {
                        break;
                    }

                    self.set_state(ConnectionState::Connecting);
                    self.lifecycle.fire(&TransportEvent::Disconnect);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Connection to {} failed: {e}", self.url);
                    self.lifecycle
                        .fire(&TransportEvent::ConnectError(e.to_string()));
                }
                Err(_) => {
                    let message = format!(
                        "Connection to {} timed out after {}s",
                        self.url,
                        self.connect_timeout.as_secs_f64()
                    );
                    tracing::warn!("{message}");
                    self.lifecycle.fire(&TransportEvent::ConnectError(message));
                }
            }

            if attempt >= self.reconnection_attempts {
                tracing::error!(
                    "Reconnection to {} failed after {attempt} attempt(s)",
                    self.url
                );
                self.finish(&TransportEvent::ReconnectFailed);
                return;
            }

            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            self.lifecycle
                .fire(&TransportEvent::Reconnecting { attempt });

            let delay = self.backoff.next_duration();
            tracing::debug!("Reconnect attempt {attempt} to {} in {delay:?}", self.url);
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.finish(&TransportEvent::Disconnect);
    }

    async fn run_session(
        &self,
        mut writer: MessageWriter,
        mut reader: MessageReader,
        mut writer_rx: UnboundedReceiver<Message>,
    ) -> SessionEnd {
        let mut heartbeat = self
            .heartbeat
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    if let Err(e) = writer.send(Message::Close(None)).await {
                        tracing::debug!("Failed to send close frame: {e}");
                    }
                    return SessionEnd::Cancelled;
                }
                Some(message) = writer_rx.recv() => {
                    if let Err(e) = writer.send(message).await {
                        tracing::error!("Failed to send message: {e}");
                        return SessionEnd::Lost;
                    }
                }
                message = reader.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!("Received message: {}", text.as_str());
                        self.dispatch(text.as_str());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        tracing::trace!("Ignoring binary message, {} bytes", data.len());
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!("Received close message - terminating");
                        return SessionEnd::Lost;
                    }
                    Some(Err(e)) => {
                        tracing::error!("Received error message - terminating: {e}");
                        return SessionEnd::Lost;
                    }
                    None => {
                        tracing::debug!("No message received - terminating");
                        return SessionEnd::Lost;
                    }
                },
                () = next_heartbeat(&mut heartbeat) => {
                    tracing::trace!("Sending heartbeat");
                    if let Err(e) = writer.send(Message::Ping(Default::default())).await {
                        tracing::error!("Failed to send heartbeat: {e}");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<WireFrame>(text) {
            Ok(frame) => {
                if self.router.dispatch(&frame.event, &frame.data) == 0 {
                    tracing::trace!("No listener for {}", frame.event);
                }
            }
            Err(e) => tracing::warn!("Failed to parse frame: {e}"),
        }
    }
}

async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Builds a [`WebSocketTransport`] per connector.
#[derive(Clone, Debug, Default)]
pub struct WebSocketTransportFactory {
    runtime: Option<Handle>,
}

impl WebSocketTransportFactory {
    /// Creates a factory using the tokio runtime current at each `create` call.
    #[must_use]
    pub const fn new() -> Self {
        Self { runtime: None }
    }

    /// Creates a factory spawning every transport's tasks on `runtime`.
    #[must_use]
    pub const fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
        }
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn create(&self, config: &ConnectionConfig) -> TransportResult<Arc<dyn Transport>> {
        let transport = match &self.runtime {
            Some(runtime) => WebSocketTransport::with_runtime(config.clone(), runtime.clone())?,
            None => WebSocketTransport::new(config.clone())?,
        };
        Ok(Arc::new(transport))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rstest::rstest;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::{manager::ConnectionManager, testing::wait_until_async};

    const WAIT: Duration = Duration::from_secs(5);

    /// Serves echo sessions, closing the first `drop_first` connections right after the handshake.
    async fn start_echo_server(drop_first: usize) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let accepted_clone = accepted.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = accepted_clone.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(stream).await else {
                        return;
                    };
                    if index < drop_first {
                        let _ = ws.close(None).await;
                        return;
                    }
                    while let Some(Ok(message)) = ws.next().await {
                        if message.is_text() && ws.send(message).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        (port, accepted)
    }

    fn fast_config(port: u16, reconnection_attempts: u32) -> ConnectionConfig {
        ConnectionConfig {
            reconnection_attempts,
            reconnect_timeout_ms: 2_000,
            reconnect_delay_initial_ms: 10,
            reconnect_delay_max_ms: 50,
            reconnect_jitter_ms: 0,
            ..ConnectionConfig::new("127.0.0.1", port, false)
        }
    }

    fn recording_lifecycle(transport: &WebSocketTransport) -> Arc<Mutex<Vec<TransportEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        transport.on_lifecycle(Arc::new(move |event: &TransportEvent| {
            events_clone.lock().unwrap().push(event.clone());
        }));
        events
    }

    #[rstest]
    fn test_new_outside_runtime_fails() {
        let result = WebSocketTransport::new(ConnectionConfig::default());
        assert!(matches!(result, Err(TransportError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_new_with_invalid_config_fails() {
        let config = ConnectionConfig {
            reconnection_attempts: 0,
            ..ConnectionConfig::default()
        };
        let result = WebSocketTransport::new(config);
        assert!(matches!(result, Err(TransportError::Config(_))));
    }

    #[tokio::test]
    async fn test_emit_when_not_connected() {
        let transport = WebSocketTransport::new(ConnectionConfig::default()).unwrap();
        assert!(!transport.is_connected());
        assert_eq!(
            transport.emit("subscribe/timestamp", json!({})),
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_connect_emit_and_receive() {
        let (port, _) = start_echo_server(0).await;
        let transport = WebSocketTransport::new(fast_config(port, 3)).unwrap();
        let events = recording_lifecycle(&transport);

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        transport.on(
            "subscribe/symbols",
            Arc::new(move |payload: &Value| {
                received_clone.lock().unwrap().push(payload.clone());
            }),
        );

        transport.connect().unwrap();
        wait_until_async(|| transport.is_connected(), WAIT).await;
        assert_eq!(*events.lock().unwrap(), vec![TransportEvent::Connect]);

        transport
            .emit("subscribe/symbols", json!({"symbols": ["TSLA"]}))
            .unwrap();
        wait_until_async(|| !received.lock().unwrap().is_empty(), WAIT).await;
        assert_eq!(
            *received.lock().unwrap(),
            vec![json!({"symbols": ["TSLA"]})]
        );

        transport.disconnect();
        wait_until_async(
            || events.lock().unwrap().last() == Some(&TransportEvent::Disconnect),
            WAIT,
        )
        .await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_server_close_triggers_reconnect() {
        let (port, accepted) = start_echo_server(1).await;
        let transport = WebSocketTransport::new(fast_config(port, 3)).unwrap();
        let events = recording_lifecycle(&transport);

        transport.connect().unwrap();
        wait_until_async(
            || events.lock().unwrap().contains(&TransportEvent::Reconnect),
            WAIT,
        )
        .await;

        let events = events.lock().unwrap().clone();
        assert_eq!(events[0], TransportEvent::Connect);
        assert_eq!(events[1], TransportEvent::Disconnect);
        assert_eq!(events[2], TransportEvent::Reconnecting { attempt: 1 });
        assert_eq!(events.last(), Some(&TransportEvent::Reconnect));
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert!(transport.is_connected());
        transport.close();
    }

    #[tokio::test]
    async fn test_reconnect_budget_exhausted() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = WebSocketTransport::new(fast_config(port, 2)).unwrap();
        let events = recording_lifecycle(&transport);

        transport.connect().unwrap();
        wait_until_async(
            || events.lock().unwrap().contains(&TransportEvent::ReconnectFailed),
            WAIT,
        )
        .await;

        let events = events.lock().unwrap().clone();
        let reconnecting: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, TransportEvent::Reconnecting { .. }))
            .cloned()
            .collect();
        assert_eq!(
            reconnecting,
            vec![
                TransportEvent::Reconnecting { attempt: 1 },
                TransportEvent::Reconnecting { attempt: 2 },
            ]
        );
        assert_eq!(events.last(), Some(&TransportEvent::ReconnectFailed));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_from_disconnect_handler() {
        let (port, accepted) = start_echo_server(0).await;
        let transport = Arc::new(WebSocketTransport::new(fast_config(port, 3)).unwrap());
        let events = recording_lifecycle(&transport);

        let reconnected = Arc::new(AtomicBool::new(false));
        let owner = Arc::downgrade(&transport);
        let reconnected_clone = reconnected.clone();
        transport.on_lifecycle(Arc::new(move |event: &TransportEvent| {
            if *event == TransportEvent::Disconnect
                && !reconnected_clone.swap(true, Ordering::SeqCst)
                && let Some(transport) = owner.upgrade()
            {
                transport.connect().unwrap();
            }
        }));

        transport.connect().unwrap();
        wait_until_async(|| transport.is_connected(), WAIT).await;

        transport.disconnect();
        wait_until_async(|| accepted.load(Ordering::SeqCst) == 2, WAIT).await;
        wait_until_async(|| transport.is_connected(), WAIT).await;

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                TransportEvent::Connect,
                TransportEvent::Disconnect,
                TransportEvent::Connect,
            ]
        );
        transport.close();
    }

    #[tokio::test]
    async fn test_manager_reconnects_after_disconnect() {
        let (port, accepted) = start_echo_server(0).await;
        let manager = Arc::new(
            ConnectionManager::new(
                fast_config(port, 3),
                Arc::new(WebSocketTransportFactory::new()),
            )
            .unwrap(),
        );

        let reconnected = Arc::new(AtomicBool::new(false));
        let owner = Arc::downgrade(&manager);
        let reconnected_clone = reconnected.clone();
        manager.register_state_observer(Arc::new(move |state: &ConnectionState| {
            if *state == ConnectionState::Disconnected
                && !reconnected_clone.swap(true, Ordering::SeqCst)
                && let Some(manager) = owner.upgrade()
            {
                assert!(manager.request_connect());
            }
        }));

        manager.connect().unwrap();
        wait_until_async(|| manager.state() == ConnectionState::Connected, WAIT).await;

        manager.disconnect().unwrap();
        wait_until_async(|| reconnected.load(Ordering::SeqCst), WAIT).await;
        wait_until_async(|| manager.state() == ConnectionState::Connected, WAIT).await;

        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(manager.replacement_count(), 0);
        manager.dispose();
    }

    #[tokio::test]
    async fn test_disconnect_during_backoff() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = ConnectionConfig {
            reconnect_delay_initial_ms: 10_000,
            reconnect_delay_max_ms: 20_000,
            ..fast_config(port, 5)
        };
        let transport = WebSocketTransport::new(config).unwrap();
        let events = recording_lifecycle(&transport);

        transport.connect().unwrap();
        wait_until_async(
            || {
                events
                    .lock()
                    .unwrap()
                    .contains(&TransportEvent::Reconnecting { attempt: 2 })
            },
            WAIT,
        )
        .await;

        transport.disconnect();
        wait_until_async(
            || events.lock().unwrap().last() == Some(&TransportEvent::Disconnect),
            WAIT,
        )
        .await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(!events.lock().unwrap().contains(&TransportEvent::ReconnectFailed));

        // The next controller starts a fresh attempt cycle
        let seen = events.lock().unwrap().len();
        transport.connect().unwrap();
        wait_until_async(
            || {
                events.lock().unwrap()[seen..]
                    .iter()
                    .any(|event| matches!(event, TransportEvent::ConnectError(_)))
            },
            WAIT,
        )
        .await;
        transport.close();
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let transport = WebSocketTransport::new(ConnectionConfig::default()).unwrap();
        transport.close();
        transport.close();

        assert_eq!(transport.connect(), Err(TransportError::Closed));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_factory_creates_transports() {
        let factory = WebSocketTransportFactory::new();
        let transport = factory.create(&ConnectionConfig::default()).unwrap();
        assert!(!transport.is_connected());
    }
}
