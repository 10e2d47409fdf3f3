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

//! The connection manager.
//!
//! A [`ConnectionManager`] presents a single long-lived connection despite the underlying
//! [`Connector`] being replaced. When the current connector reports
//! [`ConnectorEvent::ReconnectExhausted`] the manager builds a fresh one through its
//! [`TransportFactory`], replays the subscription registry against it and, if the connection
//! was wanted, connects it straight away.
//!
//! Connection state, the current connector and the registry live behind one mutex. Connector
//! and transport calls are made while holding it, which is sound because transports never
//! call back synchronously. State observers are always notified after the lock is released.

use std::{
    fmt::Debug,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::Serialize;
use serde_json::Value;

use crate::{
    MUTEX_POISONED,
    config::ConnectionConfig,
    connector::{Connector, ConnectorEvent, ConnectorStats},
    correlator::ReplyCallback,
    error::{ConnectionError, ConnectionResult},
    observer::{Observer, ObserverId, ObserverList},
    registry::{RegistrationKey, Subscription, SubscriptionRegistry, Unregister},
    state::ConnectionState,
    transport::{EventHandler, TransportFactory},
};

/// Owns the connection state machine and a replaceable [`Connector`].
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ConnectionConfig,
    factory: Arc<dyn TransportFactory>,
    stats: Arc<ConnectorStats>,
    next_connector_id: AtomicU64,
    state: Mutex<ManagerState>,
    state_observers: ObserverList<ConnectionState>,
    self_ref: Weak<Self>,
}

struct ManagerState {
    connection_state: ConnectionState,
    connector: Arc<Connector>,
    registry: SubscriptionRegistry,
    replacements: u64,
    disposed: bool,
}

impl ManagerState {
    /// Applies an event-driven transition, returning the new state if it changed.
    ///
    /// Transitions to the current state and transitions outside the table are ignored.
    fn apply_event(&mut self, target: ConnectionState) -> Option<ConnectionState> {
        let current = self.connection_state;
        if current == target {
            return None;
        }

        if !current.can_transition_to(target) {
            tracing::debug!("Ignoring connection change from {current} to {target}");
            return None;
        }

        self.connection_state = target;
        Some(target)
    }
}

impl Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().expect(MUTEX_POISONED);
        f.debug_struct(stringify!(ConnectionManager))
            .field("url", &self.inner.config.server_url())
            .field("state", &state.connection_state)
            .field("connector", &state.connector.id())
            .field("registry", &state.registry)
            .field("replacements", &state.replacements)
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a new [`ConnectionManager`], building its first connector immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the first transport cannot be built.
    pub fn new(
        config: ConnectionConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> ConnectionResult<Self> {
        config.validate()?;

        let stats = Arc::new(ConnectorStats::default());
        let transport = factory.create(&config)?;
        let connector = Arc::new(Connector::new(1, transport, stats.clone()));
        let url = config.server_url();

        let inner = Arc::new_cyclic(|self_ref| ManagerInner {
            config,
            factory,
            stats,
            next_connector_id: AtomicU64::new(2),
            state: Mutex::new(ManagerState {
                connection_state: ConnectionState::Disconnected,
                connector: connector.clone(),
                registry: SubscriptionRegistry::new(),
                replacements: 0,
                disposed: false,
            }),
            state_observers: ObserverList::new(format!("{url}-state")),
            self_ref: self_ref.clone(),
        });
        inner.observe(&connector)?;

        tracing::debug!("Connection manager created for {url}");
        Ok(Self { inner })
    }

    /// Returns the connection configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().connection_state
    }

    /// Returns the message counters shared by every connector of this manager.
    #[must_use]
    pub fn stats(&self) -> Arc<ConnectorStats> {
        self.inner.stats.clone()
    }

    /// Returns the id of the current connector.
    #[must_use]
    pub fn connector_id(&self) -> u64 {
        self.inner.lock().connector.id()
    }

    /// Returns how many times the connector has been replaced.
    #[must_use]
    pub fn replacement_count(&self) -> u64 {
        self.inner.lock().replacements
    }

    /// Returns the number of listener registrations.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    /// Returns true once [`ConnectionManager::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Transitions to `Connecting` and starts the current connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not legal from the current state, the manager
    /// is disposed, or the connector refuses to start.
    pub fn connect(&self) -> ConnectionResult<()> {
        self.inner.transition(ConnectionState::Connecting)
    }

    /// Transitions to `Disconnecting` and stops the current connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not legal from the current state or the
    /// manager is disposed.
    pub fn disconnect(&self) -> ConnectionResult<()> {
        self.inner.transition(ConnectionState::Disconnecting)
    }

    /// Like [`ConnectionManager::connect`] but returns `false` instead of failing.
    pub fn request_connect(&self) -> bool {
        self.inner.request(ConnectionState::Connecting)
    }

    /// Like [`ConnectionManager::disconnect`] but returns `false` instead of failing.
    pub fn request_disconnect(&self) -> bool {
        self.inner.request(ConnectionState::Disconnecting)
    }

    /// Registers `handler` for inbound messages on `channel`.
    ///
    /// The registration survives connector replacement. Registering the same handler
    /// (by identity) for the same channel again returns a handle to the same registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager is disposed.
    pub fn register_listener(
        &self,
        channel: &str,
        handler: EventHandler,
    ) -> ConnectionResult<Subscription> {
        let key = {
            let mut state = self.inner.lock();
            if state.disposed {
                return Err(ConnectionError::Disposed);
            }
            let connector = state.connector.clone();
            state.registry.register(channel, handler, &connector)?
        };

        let owner: Weak<dyn Unregister> = self.inner.self_ref.clone();
        Ok(Subscription::new(key, channel, owner))
    }

    /// Sends `payload` on `channel` through the current connector, best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager is disposed.
    pub fn send(&self, channel: &str, payload: Value) -> ConnectionResult<()> {
        let state = self.inner.lock();
        if state.disposed {
            return Err(ConnectionError::Disposed);
        }
        state.connector.send(channel, payload)?;
        Ok(())
    }

    /// Sends a correlated request through the current connector, returning its request id.
    ///
    /// If the connector is replaced before the response arrives the request is abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager is disposed or `payload` fails to serialize.
    pub fn request_reply<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        payload: &T,
        callback: ReplyCallback,
    ) -> ConnectionResult<String> {
        let state = self.inner.lock();
        if state.disposed {
            return Err(ConnectionError::Disposed);
        }
        Ok(state.connector.request_reply(channel, payload, callback)?)
    }

    /// Registers an observer of connection state changes.
    ///
    /// Observers run after the manager lock is released, so transitions raced from several
    /// threads may be observed out of order. Read [`ConnectionManager::state`] for the
    /// current value.
    pub fn register_state_observer(&self, observer: Observer<ConnectionState>) -> ObserverId {
        self.inner.state_observers.register(observer)
    }

    /// Removes an observer registered through [`ConnectionManager::register_state_observer`].
    pub fn unregister_state_observer(&self, id: ObserverId) -> bool {
        self.inner.state_observers.unregister(id)
    }

    /// Disposes the manager and its current connector. Idempotent.
    pub fn dispose(&self) {
        let changed = {
            let mut state = self.inner.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.connector.dispose();

            let changed = state.connection_state != ConnectionState::Disconnected;
            state.connection_state = ConnectionState::Disconnected;
            changed
        };

        if changed {
            self.inner
                .state_observers
                .fire(&ConnectionState::Disconnected);
        }
        self.inner.state_observers.clear();
        tracing::debug!("Connection manager disposed");
    }
}

impl ManagerInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().expect(MUTEX_POISONED)
    }

    fn notify(&self, changed: Option<ConnectionState>) {
        if let Some(state) = changed {
            tracing::debug!("Connection state changed to {state}");
            self.state_observers.fire(&state);
        }
    }

    fn observe(&self, connector: &Connector) -> ConnectionResult<()> {
        let owner = self.self_ref.clone();
        let connector_id = connector.id();
        connector.register_event_observer(Arc::new(move |event: &ConnectorEvent| {
            if let Some(inner) = owner.upgrade() {
                inner.on_connector_event(connector_id, *event);
            }
        }))?;
        Ok(())
    }

    fn build_connector(&self) -> ConnectionResult<Arc<Connector>> {
        let transport = self.factory.create(&self.config)?;
        let id = self.next_connector_id.fetch_add(1, Ordering::Relaxed);
        let connector = Arc::new(Connector::new(id, transport, self.stats.clone()));
        self.observe(&connector)?;
        Ok(connector)
    }

    /// Strict transition initiated by the application.
    fn transition(&self, target: ConnectionState) -> ConnectionResult<()> {
        {
            let mut state = self.lock();
            if state.disposed {
                return Err(ConnectionError::Disposed);
            }

            let from = state.connection_state;
            if !from.can_transition_to(target) {
                return Err(ConnectionError::IllegalTransition { from, to: target });
            }

            state.connection_state = target;
            let result = match target {
                ConnectionState::Connecting => state.connector.connect(),
                _ => state.connector.disconnect(),
            };

            if let Err(e) = result {
                state.connection_state = from;
                return Err(e.into());
            }
        }

        self.notify(Some(target));
        Ok(())
    }

    /// Tolerant transition, a request for the current or an illegal state is a no-op.
    fn request(&self, target: ConnectionState) -> bool {
        let current = self.lock().connection_state;
        if current == target {
            return false;
        }

        match self.transition(target) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Ignoring request for {target}: {e}");
                false
            }
        }
    }

    fn on_connector_event(&self, connector_id: u64, event: ConnectorEvent) {
        let target = match event {
            ConnectorEvent::Connected | ConnectorEvent::Reconnected => ConnectionState::Connected,
            ConnectorEvent::Reconnecting => ConnectionState::Connecting,
            ConnectorEvent::Disconnected => ConnectionState::Disconnected,
            ConnectorEvent::ReconnectExhausted => {
                self.replace_connector(connector_id);
                return;
            }
        };

        let changed = {
            let mut state = self.lock();
            if state.disposed || state.connector.id() != connector_id {
                tracing::debug!("Ignoring {event} from stale connector {connector_id}");
                return;
            }
            state.apply_event(target)
        };

        self.notify(changed);
    }

    fn replace_connector(&self, exhausted_id: u64) {
        {
            let state = self.lock();
            if state.disposed || state.connector.id() != exhausted_id {
                tracing::debug!("Ignoring exhaustion of stale connector {exhausted_id}");
                return;
            }
        }

        tracing::warn!("Connector {exhausted_id} exhausted its reconnection attempts, replacing");

        let replacement = match self.build_connector() {
            Ok(connector) => connector,
            Err(e) => {
                tracing::error!("Failed to replace connector {exhausted_id}: {e}");
                let changed = {
                    let mut state = self.lock();
                    if state.connector.id() != exhausted_id {
                        return;
                    }
                    state.apply_event(ConnectionState::Disconnected)
                };
                self.notify(changed);
                return;
            }
        };

        let changed = {
            let mut state = self.lock();
            if state.disposed || state.connector.id() != exhausted_id {
                replacement.dispose();
                return;
            }

            let previous = std::mem::replace(&mut state.connector, replacement.clone());
            previous.dispose();

            let replayed = state.registry.replay(&replacement);
            state.replacements += 1;
            tracing::debug!(
                "Connector {} replaced connector {exhausted_id}, replayed {replayed} listener(s)",
                replacement.id()
            );

            match state.connection_state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    let changed = state.apply_event(ConnectionState::Connecting);
                    if let Err(e) = replacement.connect() {
                        tracing::error!("Failed to connect connector {}: {e}", replacement.id());
                    }
                    changed
                }
                // The exhausted connector will not report completion of a pending disconnect
                ConnectionState::Disconnecting | ConnectionState::Disconnected => {
                    state.apply_event(ConnectionState::Disconnected)
                }
            }
        };

        self.notify(changed);
    }
}

impl Unregister for ManagerInner {
    fn unregister(&self, key: RegistrationKey) {
        let mut state = self.lock();
        let connector = state.connector.clone();
        if state.registry.unregister(key, &connector) {
            tracing::debug!("Unregistered listener {key:?}");
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::{
        correlator::RESPONSE_CHANNEL, error::ConfigError, testing::MockTransportFactory,
    };

    struct Harness {
        factory: Arc<MockTransportFactory>,
        manager: ConnectionManager,
        states: Arc<Mutex<Vec<ConnectionState>>>,
    }

    #[fixture]
    fn harness() -> Harness {
        let factory = Arc::new(MockTransportFactory::new());
        let manager =
            ConnectionManager::new(ConnectionConfig::new("localhost", 8080, false), factory.clone())
                .unwrap();

        let states = Arc::new(Mutex::new(Vec::new()));
        let states_clone = states.clone();
        manager.register_state_observer(Arc::new(move |state: &ConnectionState| {
            states_clone.lock().unwrap().push(*state);
        }));

        Harness {
            factory,
            manager,
            states,
        }
    }

    fn connected_harness() -> Harness {
        let harness = harness();
        harness.manager.connect().unwrap();
        harness.factory.latest().simulate_connect();
        harness
    }

    fn counting_handler() -> (EventHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let handler: EventHandler = Arc::new(move |_: &Value| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[rstest]
    fn test_invalid_config_rejected() {
        let factory = Arc::new(MockTransportFactory::new());
        let result = ConnectionManager::new(ConnectionConfig::new("", 80, false), factory.clone());

        assert!(matches!(
            result,
            Err(ConnectionError::Config(ConfigError::MissingHost))
        ));
        assert_eq!(factory.count(), 0);
    }

    #[rstest]
    fn test_initial_state(harness: Harness) {
        assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
        assert_eq!(harness.factory.count(), 1);
        assert_eq!(harness.manager.replacement_count(), 0);
    }

    #[rstest]
    fn test_connect_flow(harness: Harness) {
        harness.manager.connect().unwrap();
        assert_eq!(harness.manager.state(), ConnectionState::Connecting);
        assert_eq!(harness.factory.latest().connect_calls(), 1);

        harness.factory.latest().simulate_connect();
        assert_eq!(harness.manager.state(), ConnectionState::Connected);
        assert_eq!(
            *harness.states.lock().unwrap(),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[rstest]
    fn test_strict_connect_twice_fails(harness: Harness) {
        harness.manager.connect().unwrap();

        assert_eq!(
            harness.manager.connect(),
            Err(ConnectionError::IllegalTransition {
                from: ConnectionState::Connecting,
                to: ConnectionState::Connecting,
            })
        );
        assert_eq!(harness.factory.latest().connect_calls(), 1);
    }

    #[rstest]
    fn test_tolerant_requests(harness: Harness) {
        assert!(!harness.manager.request_disconnect());
        assert!(harness.manager.request_connect());
        assert!(!harness.manager.request_connect());

        assert_eq!(harness.factory.latest().connect_calls(), 1);
        assert_eq!(harness.factory.latest().disconnect_calls(), 0);
    }

    #[rstest]
    fn test_disconnect_flow() {
        let harness = connected_harness();

        harness.manager.disconnect().unwrap();
        assert_eq!(harness.manager.state(), ConnectionState::Disconnecting);
        assert_eq!(harness.factory.latest().disconnect_calls(), 1);

        harness.factory.latest().simulate_disconnect();
        assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
    }

    #[rstest]
    fn test_disconnect_when_disconnected_is_illegal(harness: Harness) {
        assert_eq!(
            harness.manager.disconnect(),
            Err(ConnectionError::IllegalTransition {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Disconnecting,
            })
        );
    }

    #[rstest]
    fn test_connected_event_while_disconnected_is_ignored(harness: Harness) {
        harness.factory.latest().simulate_connect();

        assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
        assert!(harness.states.lock().unwrap().is_empty());
    }

    #[rstest]
    fn test_transport_reconnect_cycle() {
        let harness = connected_harness();
        let transport = harness.factory.latest();

        transport.simulate_disconnect();
        transport.simulate_reconnecting(1);
        assert_eq!(harness.manager.state(), ConnectionState::Connecting);

        transport.simulate_reconnect();
        assert_eq!(harness.manager.state(), ConnectionState::Connected);
        assert_eq!(
            *harness.states.lock().unwrap(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
    }

    #[rstest]
    fn test_last_notification_matches_state() {
        let harness = connected_harness();
        let transport = harness.factory.latest();

        transport.simulate_disconnect();
        transport.simulate_reconnecting(1);
        harness.manager.disconnect().unwrap();
        transport.simulate_disconnect();

        let states = harness.states.lock().unwrap();
        assert_eq!(states.last(), Some(&harness.manager.state()));
        assert!(
            states
                .windows(2)
                .all(|pair| pair[0].can_transition_to(pair[1]))
        );
    }

    #[rstest]
    fn test_exhaustion_replaces_connector_and_replays_listeners() {
        let harness = connected_harness();
        let (handler, count) = counting_handler();
        harness
            .manager
            .register_listener("quote/snapshot", handler)
            .unwrap();
        let first_connector = harness.manager.connector_id();

        harness.factory.transport(0).simulate_reconnect_failed();

        assert_eq!(harness.factory.count(), 2);
        assert_ne!(harness.manager.connector_id(), first_connector);
        assert_eq!(harness.manager.replacement_count(), 1);
        assert_eq!(harness.manager.state(), ConnectionState::Connecting);

        let old = harness.factory.transport(0);
        let new = harness.factory.transport(1);
        assert!(old.is_closed());
        assert_eq!(new.connect_calls(), 1);
        assert_eq!(new.listener_count("quote/snapshot"), 1);
        assert_eq!(new.listener_count(RESPONSE_CHANNEL), 1);

        new.simulate_connect();
        new.deliver("quote/snapshot", json!({"symbol": "TSLA"}));
        assert_eq!(harness.manager.state(), ConnectionState::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_repeated_exhaustion_preserves_subscriptions() {
        let harness = connected_harness();
        let (snapshot_handler, _) = counting_handler();
        let (delta_handler, _) = counting_handler();
        harness
            .manager
            .register_listener("quote/snapshot", snapshot_handler)
            .unwrap();
        harness
            .manager
            .register_listener("quote/delta", delta_handler)
            .unwrap();

        for _ in 0..3 {
            harness.factory.latest().simulate_reconnect_failed();
        }
        let latest = harness.factory.latest();
        latest.simulate_connect();

        assert_eq!(harness.factory.count(), 4);
        assert_eq!(harness.manager.replacement_count(), 3);
        assert_eq!(harness.manager.state(), ConnectionState::Connected);
        assert_eq!(harness.manager.listener_count(), 2);
        assert_eq!(latest.listener_count("quote/snapshot"), 1);
        assert_eq!(latest.listener_count("quote/delta"), 1);
        assert!(latest.emitted().is_empty());
    }

    #[rstest]
    fn test_exhaustion_while_disconnected_does_not_connect(harness: Harness) {
        harness.factory.transport(0).simulate_reconnect_failed();

        assert_eq!(harness.factory.count(), 2);
        assert_eq!(harness.factory.transport(1).connect_calls(), 0);
        assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
    }

    #[rstest]
    fn test_exhaustion_while_disconnecting_settles_disconnected() {
        let harness = connected_harness();
        harness.manager.disconnect().unwrap();

        harness.factory.transport(0).simulate_reconnect_failed();

        assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
        assert_eq!(harness.manager.replacement_count(), 1);
        assert_eq!(harness.factory.transport(1).connect_calls(), 0);
        assert_eq!(
            harness.states.lock().unwrap().last(),
            Some(&ConnectionState::Disconnected)
        );

        harness.manager.connect().unwrap();
        harness.factory.transport(1).simulate_connect();
        assert_eq!(harness.manager.state(), ConnectionState::Connected);
    }

    #[rstest]
    fn test_concurrent_use_during_replacements() {
        const THREADS: usize = 4;
        const ITERATIONS: usize = 200;

        let harness = connected_harness();
        let manager = &harness.manager;
        let factory = &harness.factory;
        let kept = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let kept = &kept;
                scope.spawn(move || {
                    for i in 0..ITERATIONS {
                        manager
                            .send("subscribe/timestamp", json!({"thread": thread, "i": i}))
                            .unwrap();

                        let channel = format!("quote/{thread}/{i}");
                        let (handler, _) = counting_handler();
                        let subscription = manager.register_listener(&channel, handler).unwrap();
                        if i % 2 == 0 {
                            subscription.dispose();
                        } else {
                            kept.lock().unwrap().push(channel);
                        }
                    }
                });
            }

            scope.spawn(move || {
                for _ in 0..50 {
                    let transport = factory.latest();
                    transport.simulate_connect();
                    transport.simulate_reconnect_failed();
                }
                factory.latest().simulate_connect();
            });
        });

        let kept = kept.into_inner().unwrap();
        let current = factory.latest();
        let stats = manager.stats();

        assert_eq!(manager.listener_count(), kept.len());
        assert_eq!(kept.len(), THREADS * ITERATIONS / 2);
        assert!(kept.iter().all(|channel| current.listener_count(channel) == 1));
        assert_eq!(
            stats.sent() + stats.dropped(),
            (THREADS * ITERATIONS) as u64
        );
        let emitted: usize = (0..factory.count())
            .map(|i| factory.transport(i).emitted_on("subscribe/timestamp").len())
            .sum();
        assert_eq!(emitted as u64, stats.sent());
    }

    #[rstest]
    fn test_events_from_replaced_connector_are_ignored() {
        let harness = connected_harness();
        let old = harness.factory.transport(0);
        old.simulate_reconnect_failed();

        old.simulate_connect();
        old.simulate_reconnect_failed();

        assert_eq!(harness.manager.state(), ConnectionState::Connecting);
        assert_eq!(harness.factory.count(), 2);
    }

    #[rstest]
    fn test_factory_failure_on_replacement() {
        let harness = connected_harness();
        let connector_id = harness.manager.connector_id();
        harness.factory.fail_next(1);

        harness.factory.latest().simulate_reconnect_failed();

        assert_eq!(harness.manager.connector_id(), connector_id);
        assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
        assert_eq!(harness.manager.replacement_count(), 0);
    }

    #[rstest]
    fn test_duplicate_registration_shares_handles(harness: Harness) {
        let (handler, _) = counting_handler();
        let first = harness
            .manager
            .register_listener("timestamp", handler.clone())
            .unwrap();
        let second = harness
            .manager
            .register_listener("timestamp", handler)
            .unwrap();
        let transport = harness.factory.latest();

        assert_eq!(first.key(), second.key());
        assert_eq!(transport.listener_count("timestamp"), 1);

        first.dispose();
        assert_eq!(transport.listener_count("timestamp"), 0);
        assert_eq!(harness.manager.listener_count(), 0);

        second.dispose();
        first.dispose();
        assert!(first.is_disposed());
        assert!(second.is_disposed());
    }

    #[rstest]
    fn test_dispose_handle_after_replacement() {
        let harness = connected_harness();
        let (handler, count) = counting_handler();
        let subscription = harness
            .manager
            .register_listener("timestamp", handler)
            .unwrap();

        harness.factory.latest().simulate_reconnect_failed();
        let current = harness.factory.latest();
        assert_eq!(current.listener_count("timestamp"), 1);

        subscription.dispose();
        assert_eq!(current.listener_count("timestamp"), 0);

        current.deliver("timestamp", json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn test_send_while_disconnected_is_dropped(harness: Harness) {
        harness.manager.send("subscribe/timestamp", json!({})).unwrap();

        assert!(harness.factory.latest().emitted().is_empty());
        assert_eq!(harness.manager.stats().dropped(), 1);
    }

    #[rstest]
    fn test_request_reply_through_current_connector() {
        let harness = connected_harness();
        let replies = Arc::new(Mutex::new(Vec::new()));
        let replies_clone = replies.clone();

        let request_id = harness
            .manager
            .request_reply(
                "request/profile",
                &json!({"symbol": "TSLA"}),
                Box::new(move |value| replies_clone.lock().unwrap().push(value)),
            )
            .unwrap();

        harness.factory.latest().deliver(
            RESPONSE_CHANNEL,
            json!({"requestId": request_id, "response": {"name": "Tesla"}}),
        );
        assert_eq!(*replies.lock().unwrap(), vec![json!({"name": "Tesla"})]);
    }

    #[rstest]
    fn test_dispose() {
        let harness = connected_harness();

        harness.manager.dispose();
        harness.manager.dispose();

        assert!(harness.manager.is_disposed());
        assert!(harness.factory.latest().is_closed());
        assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
        assert_eq!(harness.manager.connect(), Err(ConnectionError::Disposed));
        assert_eq!(
            harness.manager.send("timestamp", json!({})),
            Err(ConnectionError::Disposed)
        );
        assert!(matches!(
            harness
                .manager
                .register_listener("timestamp", Arc::new(|_: &Value| {})),
            Err(ConnectionError::Disposed)
        ));
        assert_eq!(
            harness.states.lock().unwrap().last(),
            Some(&ConnectionState::Disconnected)
        );
    }
}
