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

//! The transport connector.
//!
//! A [`Connector`] owns exactly one [`Transport`] for its whole lifetime and wraps it with:
//! - Inbound message sequencing for diagnostics.
//! - Best-effort sends which drop (and count) messages while disconnected.
//! - Request/response correlation over the reserved `response` channel.
//! - Translation of raw transport lifecycle events into [`ConnectorEvent`]s.
//!
//! Disposal is terminal: once disposed every operation except [`Connector::dispose`] fails
//! with [`ConnectorError::Disposed`] and late transport events are ignored.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use serde::Serialize;
use serde_json::Value;
use strum::Display;

use crate::{
    correlator::{Correlation, Correlator, RESPONSE_CHANNEL, ReplyCallback},
    error::{ConnectorError, ConnectorResult},
    observer::{Observer, ObserverId, ObserverList},
    transport::{EventHandler, ListenerId, Transport, TransportEvent},
};

/// Coarse-grained connector lifecycle events reported to the owner.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ConnectorEvent {
    /// The transport connected.
    Connected,
    /// The transport lost its connection and is retrying.
    Reconnecting,
    /// An automatic reconnection succeeded.
    Reconnected,
    /// The transport disconnected.
    Disconnected,
    /// The transport spent its reconnection budget. Terminal for this connector.
    ReconnectExhausted,
}

impl ConnectorEvent {
    /// Translates a raw transport event, `None` for events which only warrant logging.
    #[must_use]
    pub const fn from_transport(event: &TransportEvent) -> Option<Self> {
        match event {
            TransportEvent::Connect => Some(Self::Connected),
            TransportEvent::Reconnecting { .. } => Some(Self::Reconnecting),
            TransportEvent::Reconnect => Some(Self::Reconnected),
            TransportEvent::Disconnect => Some(Self::Disconnected),
            TransportEvent::ReconnectFailed => Some(Self::ReconnectExhausted),
            TransportEvent::ConnectError(_) => None,
        }
    }
}

/// Message counters shared by the connectors of one owner.
#[derive(Debug, Default)]
pub struct ConnectorStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    received: AtomicU64,
    orphaned: AtomicU64,
}

impl ConnectorStats {
    /// Returns the number of messages handed to a connected transport.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Returns the number of messages dropped because the transport was not connected.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the number of inbound messages delivered to listeners.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Returns the number of responses which matched no pending request.
    #[must_use]
    pub fn orphaned(&self) -> u64 {
        self.orphaned.load(Ordering::Relaxed)
    }
}

/// Owns one transport and adds sequencing, correlation and lifecycle translation.
pub struct Connector {
    id: u64,
    transport: Arc<dyn Transport>,
    disposed: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
    stats: Arc<ConnectorStats>,
    correlator: Arc<Correlator>,
    events: Arc<ObserverList<ConnectorEvent>>,
}

impl Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Connector))
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("disposed", &self.is_disposed())
            .field("pending_requests", &self.correlator.len())
            .finish()
    }
}

impl Connector {
    /// Creates a new [`Connector`] owning `transport`.
    #[must_use]
    pub fn new(id: u64, transport: Arc<dyn Transport>, stats: Arc<ConnectorStats>) -> Self {
        let disposed = Arc::new(AtomicBool::new(false));
        let sequence = Arc::new(AtomicU64::new(0));
        let correlator = Arc::new(Correlator::new());
        let events = Arc::new(ObserverList::new(format!("connector-{id}-events")));

        let lifecycle_handler = {
            let disposed = disposed.clone();
            let events = events.clone();
            Arc::new(move |event: &TransportEvent| {
                if disposed.load(Ordering::SeqCst) {
                    tracing::debug!("Connector {id} ignoring {event:?} after dispose");
                    return;
                }

                match ConnectorEvent::from_transport(event) {
                    Some(connector_event) => {
                        tracing::debug!("Connector {id} transport event {event}");
                        events.fire(&connector_event);
                    }
                    None => {
                        tracing::warn!("Connector {id} transport event {event:?}");
                    }
                }
            })
        };
        transport.on_lifecycle(lifecycle_handler);

        let response_handler: EventHandler = {
            let disposed = disposed.clone();
            let sequence = sequence.clone();
            let stats = stats.clone();
            let correlator = correlator.clone();
            Arc::new(move |payload: &Value| {
                if disposed.load(Ordering::SeqCst) {
                    return;
                }

                let seq = sequence.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!("Connector {id} received message {seq} on {RESPONSE_CHANNEL}");
                tracing::trace!("Payload for message {seq}: {payload}");

                match correlator.complete(payload) {
                    Correlation::Completed(request_id) => {
                        tracing::debug!("Connector {id} completed request {request_id}");
                    }
                    Correlation::Orphaned(request_id) => {
                        stats.orphaned.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            "Received response without corresponding request {request_id}"
                        );
                    }
                    Correlation::Malformed => {
                        stats.orphaned.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("Received response without a request id: {payload}");
                    }
                }
            })
        };
        transport.on(RESPONSE_CHANNEL, response_handler);

        tracing::debug!("Connector {id} created");

        Self {
            id,
            transport,
            disposed,
            sequence,
            stats,
            correlator,
            events,
        }
    }

    /// Returns the connector id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the shared message counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<ConnectorStats> {
        &self.stats
    }

    /// Returns true once [`Connector::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Returns true if the transport can currently transmit.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.is_disposed() && self.transport.is_connected()
    }

    /// Returns the number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.correlator.len()
    }

    fn ensure_active(&self) -> ConnectorResult<()> {
        if self.is_disposed() {
            return Err(ConnectorError::Disposed(self.id));
        }
        Ok(())
    }

    /// Instructs the transport to begin connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector is disposed or the transport refuses.
    pub fn connect(&self) -> ConnectorResult<()> {
        self.ensure_active()?;
        tracing::debug!("Connector {} starting connection attempt", self.id);
        self.transport.connect()?;
        Ok(())
    }

    /// Instructs the transport to begin disconnecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector is disposed.
    pub fn disconnect(&self) -> ConnectorResult<()> {
        self.ensure_active()?;
        tracing::debug!("Connector {} starting disconnect", self.id);
        self.transport.disconnect();
        Ok(())
    }

    /// Sends `payload` on `channel`, best-effort.
    ///
    /// While the transport is not connected the message is dropped and counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector is disposed.
    pub fn send(&self, channel: &str, payload: Value) -> ConnectorResult<()> {
        self.ensure_active()?;

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.transport.is_connected() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Connector {} dropped message {seq} to {channel}, not connected",
                self.id
            );
            return Ok(());
        }

        tracing::debug!("Connector {} sending message {seq} to {channel}", self.id);
        tracing::trace!("Payload for message {seq}: {payload}");

        match self.transport.emit(channel, payload) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Connector {} dropped message {seq}: {e}", self.id);
            }
        }
        Ok(())
    }

    /// Sends a correlated request and stores `callback` for the matching response.
    ///
    /// The payload is wrapped as `{"requestId": <uuid>, "request": <payload>}`. Returns the
    /// generated request id. There is no timeout: a request whose response never arrives
    /// stays pending until the connector is disposed, at which point it is abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector is disposed or `payload` fails to serialize, in
    /// which case the callback is neither stored nor invoked and nothing is sent.
    pub fn request_reply<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        payload: &T,
        callback: ReplyCallback,
    ) -> ConnectorResult<String> {
        self.ensure_active()?;

        let request = serde_json::to_value(payload)?;
        let request_id = Correlator::next_request_id();
        let envelope = Correlator::envelope(&request_id, request);

        self.correlator.insert(request_id.clone(), callback);
        self.send(channel, envelope)?;

        Ok(request_id)
    }

    /// Registers `handler` for inbound messages on `channel`.
    ///
    /// Every delivered message increments the connector's message sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector is disposed.
    pub fn on_event(&self, channel: &str, handler: EventHandler) -> ConnectorResult<ListenerId> {
        self.ensure_active()?;

        let id = self.id;
        let channel_name = channel.to_string();
        let disposed = self.disposed.clone();
        let sequence = self.sequence.clone();
        let stats = self.stats.clone();

        let wrapped: EventHandler = Arc::new(move |payload: &Value| {
            if disposed.load(Ordering::SeqCst) {
                return;
            }

            let seq = sequence.fetch_add(1, Ordering::Relaxed) + 1;
            stats.received.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Connector {id} received message {seq} on {channel_name}");
            tracing::trace!("Payload for message {seq}: {payload}");

            handler(payload);
        });

        tracing::debug!("Connector {id} registering listener for {channel}");
        Ok(self.transport.on(channel, wrapped))
    }

    /// Removes a listener registered through [`Connector::on_event`].
    ///
    /// # Errors
    ///
    /// Returns an error if the connector is disposed.
    pub fn off_event(&self, channel: &str, listener: ListenerId) -> ConnectorResult<bool> {
        self.ensure_active()?;
        Ok(self.transport.off(channel, listener))
    }

    /// Registers an observer of [`ConnectorEvent`]s.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector is disposed.
    pub fn register_event_observer(
        &self,
        observer: Observer<ConnectorEvent>,
    ) -> ConnectorResult<ObserverId> {
        self.ensure_active()?;
        Ok(self.events.register(observer))
    }

    /// Removes an observer registered through [`Connector::register_event_observer`].
    pub fn unregister_event_observer(&self, id: ObserverId) -> bool {
        self.events.unregister(id)
    }

    /// Disposes the connector, closing the transport. Idempotent.
    ///
    /// Pending request callbacks are abandoned without being invoked.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let abandoned = self.correlator.clear();
        if abandoned > 0 {
            tracing::debug!(
                "Connector {} abandoned {abandoned} pending request(s)",
                self.id
            );
        }

        self.events.clear();
        self.transport.close();
        tracing::debug!("Connector {} disposed", self.id);
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.dispose();
    }
}
