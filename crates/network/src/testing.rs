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

//! In-memory transports for driving the connection layer from tests.
//!
//! [`MockTransport`] records every outbound message and call, and never raises events on
//! its own: tests fire lifecycle events and deliver inbound messages explicitly.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use serde_json::Value;

use crate::{
    MUTEX_POISONED,
    config::ConnectionConfig,
    error::{TransportError, TransportResult},
    observer::ObserverList,
    transport::{
        ChannelRouter, EventHandler, LifecycleHandler, ListenerId, Transport, TransportEvent,
        TransportFactory,
    },
};

/// A scriptable in-memory [`Transport`].
#[derive(Debug)]
pub struct MockTransport {
    index: usize,
    connected: AtomicBool,
    closed: AtomicBool,
    router: ChannelRouter,
    lifecycle: ObserverList<TransportEvent>,
    emitted: Mutex<Vec<(String, Value)>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockTransport {
    /// Creates a new [`MockTransport`], `index` identifies it among a factory's transports.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            router: ChannelRouter::new(),
            lifecycle: ObserverList::new(format!("mock-{index}-lifecycle")),
            emitted: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Returns the creation index of this transport.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Fires a lifecycle event, updating the connected flag first.
    pub fn fire_lifecycle(&self, event: &TransportEvent) {
        match event {
            TransportEvent::Connect | TransportEvent::Reconnect => {
                self.connected.store(true, Ordering::SeqCst);
            }
            TransportEvent::Disconnect
            | TransportEvent::Reconnecting { .. }
            | TransportEvent::ReconnectFailed => {
                self.connected.store(false, Ordering::SeqCst);
            }
            TransportEvent::ConnectError(_) => {}
        }
        self.lifecycle.fire(event);
    }

    /// Simulates a successful initial connection.
    pub fn simulate_connect(&self) {
        self.fire_lifecycle(&TransportEvent::Connect);
    }

    /// Simulates a lost connection.
    pub fn simulate_disconnect(&self) {
        self.fire_lifecycle(&TransportEvent::Disconnect);
    }

    /// Simulates the start of an automatic reconnection attempt.
    pub fn simulate_reconnecting(&self, attempt: u32) {
        self.fire_lifecycle(&TransportEvent::Reconnecting { attempt });
    }

    /// Simulates a successful automatic reconnection.
    pub fn simulate_reconnect(&self) {
        self.fire_lifecycle(&TransportEvent::Reconnect);
    }

    /// Simulates exhaustion of the automatic reconnection budget.
    pub fn simulate_reconnect_failed(&self) {
        self.fire_lifecycle(&TransportEvent::ReconnectFailed);
    }

    /// Delivers an inbound message to the handlers of `channel`.
    pub fn deliver(&self, channel: &str, payload: Value) -> usize {
        self.router.dispatch(channel, &payload)
    }

    /// Returns every message emitted while connected, in order.
    #[must_use]
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().expect(MUTEX_POISONED).clone()
    }

    /// Returns the payloads emitted on `channel`, in order.
    #[must_use]
    pub fn emitted_on(&self, channel: &str) -> Vec<Value> {
        self.emitted
            .lock()
            .expect(MUTEX_POISONED)
            .iter()
            .filter(|(name, _)| name == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Forgets the recorded outbound messages.
    pub fn clear_emitted(&self) {
        self.emitted.lock().expect(MUTEX_POISONED).clear();
    }

    /// Returns the number of handlers registered for `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.router.listener_count(channel)
    }

    /// Returns how many times `connect` was called.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Returns how many times `disconnect` was called.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Returns how many times `close` was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Returns true once the transport has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn connect(&self) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        !self.is_closed() && self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, channel: &str, payload: Value) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.emitted
            .lock()
            .expect(MUTEX_POISONED)
            .push((channel.to_string(), payload));
        Ok(())
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
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.router.clear();
        self.lifecycle.clear();
    }
}

/// A [`TransportFactory`] producing [`MockTransport`]s and keeping a handle to each.
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    created: Mutex<Vec<Arc<MockTransport>>>,
    fail_next: AtomicUsize,
}

impl MockTransportFactory {
    /// Creates a new [`MockTransportFactory`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `create` fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Returns every transport created so far, in creation order.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().expect(MUTEX_POISONED).clone()
    }

    /// Returns the number of transports created.
    #[must_use]
    pub fn count(&self) -> usize {
        self.created.lock().expect(MUTEX_POISONED).len()
    }

    /// Returns the transport created at `index`.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `index + 1` transports were created.
    #[must_use]
    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.created.lock().expect(MUTEX_POISONED)[index].clone()
    }

    /// Returns the most recently created transport.
    ///
    /// # Panics
    ///
    /// Panics if no transport was created.
    #[must_use]
    pub fn latest(&self) -> Arc<MockTransport> {
        self.created
            .lock()
            .expect(MUTEX_POISONED)
            .last()
            .cloned()
            .expect("no transport created")
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, _config: &ConnectionConfig) -> TransportResult<Arc<dyn Transport>> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::NoRuntime);
        }

        let mut created = self.created.lock().expect(MUTEX_POISONED);
        let transport = Arc::new(MockTransport::new(created.len()));
        created.push(transport.clone());
        Ok(transport)
    }
}

/// Polls until `condition` holds.
///
/// # Panics
///
/// Panics if the condition does not hold within `timeout`.
pub async fn wait_until_async<F>(mut condition: F, timeout: Duration)
where
    F: FnMut() -> bool,
{
    let start_time = Instant::now();

    loop {
        if condition() {
            break;
        }

        assert!(
            start_time.elapsed() <= timeout,
            "Timeout waiting for condition"
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
