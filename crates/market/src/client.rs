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

//! The market data client.
//!
//! [`MarketClient`] multiplexes application observers onto one managed connection:
//! - Quote and price change observers per symbol, with subscribe and unsubscribe messages
//!   sent only when a symbol gains its first or loses its last observer.
//! - A quote cache replaced by snapshots and updated in place by deltas.
//! - Server timestamp observers.
//! - Instrument profiles, requested once and cached.
//!
//! Each time the connection becomes connected the client announces the timestamp
//! subscription (subscribe when observed, unsubscribe otherwise) and every subscribed
//! symbol, in one batched message per subscription kind.

use std::{
    fmt::Debug,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use quotestream_network::{
    ConnectionConfig, ConnectionManager, ConnectionState, MUTEX_POISONED, Subscription,
    error::ConnectionError,
    observer::{Observer, ObserverId, ObserverList},
    transport::TransportFactory,
    websocket::WebSocketTransportFactory,
};
use serde_json::{Value, json};
use ustr::Ustr;

use crate::{
    channel::MarketChannel,
    error::{MarketError, MarketResult},
    profile::Profile,
    quote::Quote,
    subscription::{SubscriptionKind, SymbolObservers},
    synchronizer::{QuoteSynchronizer, QuoteUpdate},
};

/// Observer of quote synchronizers for one symbol.
pub type QuoteObserver = Observer<QuoteSynchronizer>;

/// Observer of server timestamps.
pub type TimestampObserver = Observer<String>;

type InboundHandler = fn(&MarketInner, &Value);

/// A streaming market data client over a managed, self-healing connection.
pub struct MarketClient {
    inner: Arc<MarketInner>,
}

struct MarketInner {
    manager: ConnectionManager,
    quotes: DashMap<Ustr, Quote>,
    profiles: DashMap<Ustr, Profile>,
    quote_observers: Mutex<SymbolObservers<QuoteSynchronizer>>,
    price_observers: Mutex<SymbolObservers<QuoteSynchronizer>>,
    timestamp_guard: Mutex<()>,
    timestamp_observers: ObserverList<String>,
    listeners: Mutex<Vec<Subscription>>,
    state_observer: Mutex<Option<ObserverId>>,
}

impl Debug for MarketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(MarketClient))
            .field("manager", &self.inner.manager)
            .field("quotes", &self.quote_symbols())
            .field("price_changes", &self.price_change_symbols())
            .field("timestamp_observers", &self.inner.timestamp_observers.len())
            .finish()
    }
}

impl MarketClient {
    /// Creates a new [`MarketClient`] connecting over WebSockets.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or no tokio runtime is available.
    pub fn new(config: ConnectionConfig) -> MarketResult<Self> {
        Self::with_factory(config, Arc::new(WebSocketTransportFactory::new()))
    }

    /// Creates a new [`MarketClient`] whose transports are built by `factory`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the first transport cannot be built.
    pub fn with_factory(
        config: ConnectionConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> MarketResult<Self> {
        let manager = ConnectionManager::new(config, factory)?;
        let inner = Arc::new(MarketInner {
            manager,
            quotes: DashMap::new(),
            profiles: DashMap::new(),
            quote_observers: Mutex::new(SymbolObservers::new(SubscriptionKind::Quotes)),
            price_observers: Mutex::new(SymbolObservers::new(SubscriptionKind::PriceChanges)),
            timestamp_guard: Mutex::new(()),
            timestamp_observers: ObserverList::new("timestampUpdate"),
            listeners: Mutex::new(Vec::new()),
            state_observer: Mutex::new(None),
        });
        MarketInner::install(&inner)?;

        Ok(Self { inner })
    }

    /// Returns the underlying connection manager.
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.inner.manager
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.manager.state()
    }

    /// Starts connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not disconnected or the client is disposed.
    pub fn connect(&self) -> MarketResult<()> {
        Ok(self.inner.manager.connect()?)
    }

    /// Starts disconnecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is neither connecting nor connected, or the
    /// client is disposed.
    pub fn disconnect(&self) -> MarketResult<()> {
        Ok(self.inner.manager.disconnect()?)
    }

    /// Starts connecting unless already connecting, returning `false` when nothing was done.
    pub fn request_connect(&self) -> bool {
        self.inner.manager.request_connect()
    }

    /// Starts disconnecting if possible, returning `false` when nothing was done.
    pub fn request_disconnect(&self) -> bool {
        self.inner.manager.request_disconnect()
    }

    /// Registers an observer of connection state changes.
    pub fn register_state_observer(&self, observer: Observer<ConnectionState>) -> ObserverId {
        self.inner.manager.register_state_observer(observer)
    }

    /// Removes an observer registered through [`MarketClient::register_state_observer`].
    pub fn unregister_state_observer(&self, id: ObserverId) -> bool {
        self.inner.manager.unregister_state_observer(id)
    }

    /// Subscribes `observer` to every quote snapshot and delta of `symbol`.
    ///
    /// If a quote for `symbol` is already cached, the observer first receives a
    /// [`QuoteSynchronizer::Copy`] of it.
    ///
    /// # Errors
    ///
    /// Returns an error if `symbol` is empty or the client is disposed.
    pub fn subscribe_to_quotes(
        &self,
        symbol: &str,
        observer: QuoteObserver,
    ) -> MarketResult<MarketSubscription> {
        self.subscribe_symbol(SubscriptionKind::Quotes, symbol, observer)
    }

    /// Subscribes `observer` to price changes (quote snapshots) of `symbol`.
    ///
    /// If a quote for `symbol` is already cached, the observer first receives a
    /// [`QuoteSynchronizer::Copy`] of it.
    ///
    /// # Errors
    ///
    /// Returns an error if `symbol` is empty or the client is disposed.
    pub fn subscribe_to_price_changes(
        &self,
        symbol: &str,
        observer: QuoteObserver,
    ) -> MarketResult<MarketSubscription> {
        self.subscribe_symbol(SubscriptionKind::PriceChanges, symbol, observer)
    }

    fn subscribe_symbol(
        &self,
        kind: SubscriptionKind,
        symbol: &str,
        observer: QuoteObserver,
    ) -> MarketResult<MarketSubscription> {
        let symbol = parse_symbol(symbol)?;
        self.inner.ensure_active()?;

        let cached = self.inner.quotes.get(&symbol).map(|quote| quote.clone());
        if let Some(quote) = cached {
            observer(&QuoteSynchronizer::Copy(Box::new(quote)));
        }

        let id = {
            let mut table = self.inner.table(kind).lock().expect(MUTEX_POISONED);
            let (id, payload) = table.add(symbol, observer);
            if let Some(payload) = payload {
                self.inner
                    .send(MarketChannel::ChangeSymbolSubscription, payload);
            }
            id
        };

        tracing::debug!("Subscribed observer {} to {kind} for {symbol}", id.value());
        Ok(MarketSubscription::new(
            SubscriptionTarget::Symbol { kind, symbol, id },
            Arc::downgrade(&self.inner),
        ))
    }

    /// Subscribes `observer` to the server timestamp stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is disposed.
    pub fn subscribe_to_timestamp(
        &self,
        observer: TimestampObserver,
    ) -> MarketResult<MarketSubscription> {
        self.inner.ensure_active()?;

        let id = {
            let _guard = self.inner.timestamp_guard.lock().expect(MUTEX_POISONED);
            let was_empty = self.inner.timestamp_observers.is_empty();
            let id = self.inner.timestamp_observers.register(observer);
            if was_empty {
                self.inner
                    .send(MarketChannel::SubscribeTimestamp, json!({}));
            }
            id
        };

        Ok(MarketSubscription::new(
            SubscriptionTarget::Timestamp(id),
            Arc::downgrade(&self.inner),
        ))
    }

    /// Requests the profile of `symbol`, invoking `callback` once it is known.
    ///
    /// A cached profile is delivered immediately. Otherwise a correlated request is sent
    /// and the reply is cached before `callback` runs. A request whose reply never
    /// arrives is abandoned without invoking `callback`.
    ///
    /// # Errors
    ///
    /// Returns an error if `symbol` is empty or the client is disposed.
    pub fn request_profile<F>(&self, symbol: &str, callback: F) -> MarketResult<()>
    where
        F: FnOnce(Profile) + Send + 'static,
    {
        let symbol = parse_symbol(symbol)?;

        let cached = self.inner.profiles.get(&symbol).map(|profile| profile.clone());
        if let Some(profile) = cached {
            callback(profile);
            return Ok(());
        }

        let owner = Arc::downgrade(&self.inner);
        let request_id = self.inner.manager.request_reply(
            MarketChannel::RequestProfile.name(),
            &json!({"symbol": symbol.as_str()}),
            Box::new(move |response: Value| {
                let profile = Profile::from_payload(symbol, &response);
                if let Some(inner) = owner.upgrade() {
                    inner.profiles.insert(symbol, profile.clone());
                }
                callback(profile);
            }),
        )?;

        tracing::debug!("Requested profile for {symbol} ({request_id})");
        Ok(())
    }

    /// Returns a copy of the cached quote for `symbol`.
    #[must_use]
    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.inner
            .quotes
            .get(&Ustr::from(symbol))
            .map(|quote| quote.clone())
    }

    /// Returns a copy of the cached profile for `symbol`.
    #[must_use]
    pub fn profile(&self, symbol: &str) -> Option<Profile> {
        self.inner
            .profiles
            .get(&Ustr::from(symbol))
            .map(|profile| profile.clone())
    }

    /// Returns the symbols with quote observers, sorted.
    #[must_use]
    pub fn quote_symbols(&self) -> Vec<Ustr> {
        self.inner
            .quote_observers
            .lock()
            .expect(MUTEX_POISONED)
            .symbols()
    }

    /// Returns the symbols with price change observers, sorted.
    #[must_use]
    pub fn price_change_symbols(&self) -> Vec<Ustr> {
        self.inner
            .price_observers
            .lock()
            .expect(MUTEX_POISONED)
            .symbols()
    }

    /// Disposes the client and its connection. Idempotent.
    pub fn dispose(&self) {
        let listeners = std::mem::take(&mut *self.inner.listeners.lock().expect(MUTEX_POISONED));
        for listener in &listeners {
            listener.dispose();
        }

        if let Some(id) = self.inner.state_observer.lock().expect(MUTEX_POISONED).take() {
            self.inner.manager.unregister_state_observer(id);
        }

        self.inner.manager.dispose();
        self.inner.timestamp_observers.clear();
    }
}

impl MarketInner {
    fn install(inner: &Arc<Self>) -> MarketResult<()> {
        let handlers: [(MarketChannel, InboundHandler); 4] = [
            (MarketChannel::Timestamp, Self::on_timestamp),
            (MarketChannel::ProfileSnapshot, Self::on_profile_snapshot),
            (MarketChannel::QuoteSnapshot, Self::on_quote_snapshot),
            (MarketChannel::QuoteDelta, Self::on_quote_delta),
        ];

        let mut listeners = Vec::with_capacity(handlers.len());
        for (channel, handler) in handlers {
            let owner = Arc::downgrade(inner);
            let listener = inner.manager.register_listener(
                channel.name(),
                Arc::new(move |payload: &Value| {
                    if let Some(inner) = owner.upgrade() {
                        handler(&inner, payload);
                    }
                }),
            )?;
            listeners.push(listener);
        }
        *inner.listeners.lock().expect(MUTEX_POISONED) = listeners;

        let owner = Arc::downgrade(inner);
        let id = inner
            .manager
            .register_state_observer(Arc::new(move |state: &ConnectionState| {
                if let Some(inner) = owner.upgrade() {
                    inner.on_state_changed(*state);
                }
            }));
        *inner.state_observer.lock().expect(MUTEX_POISONED) = Some(id);

        Ok(())
    }

    fn ensure_active(&self) -> MarketResult<()> {
        if self.manager.is_disposed() {
            return Err(MarketError::Connection(ConnectionError::Disposed));
        }
        Ok(())
    }

    const fn table(&self, kind: SubscriptionKind) -> &Mutex<SymbolObservers<QuoteSynchronizer>> {
        match kind {
            SubscriptionKind::Quotes => &self.quote_observers,
            SubscriptionKind::PriceChanges => &self.price_observers,
        }
    }

    fn send(&self, channel: MarketChannel, payload: Value) {
        match self.manager.send(channel.name(), payload) {
            Ok(()) => {}
            Err(ConnectionError::Disposed) => {
                tracing::debug!("Not sending to {channel}, connection disposed");
            }
            Err(e) => tracing::warn!("Failed to send to {channel}: {e}"),
        }
    }

    fn on_state_changed(&self, state: ConnectionState) {
        if state != ConnectionState::Connected {
            return;
        }

        {
            let _guard = self.timestamp_guard.lock().expect(MUTEX_POISONED);
            if self.timestamp_observers.is_empty() {
                self.send(MarketChannel::UnsubscribeTimestamp, json!({}));
            } else {
                self.send(MarketChannel::SubscribeTimestamp, json!({}));
            }
        }

        for kind in [SubscriptionKind::Quotes, SubscriptionKind::PriceChanges] {
            let table = self.table(kind).lock().expect(MUTEX_POISONED);
            if let Some(payload) = table.resubscribe_payload() {
                tracing::debug!("Re-announcing {} {kind} subscription(s)", table.symbols().len());
                self.send(MarketChannel::ChangeSymbolSubscription, payload);
            }
        }
    }

    fn unsubscribe(&self, target: &SubscriptionTarget) {
        match *target {
            SubscriptionTarget::Symbol { kind, symbol, id } => {
                let mut table = self.table(kind).lock().expect(MUTEX_POISONED);
                if let Some(payload) = table.remove(symbol, id) {
                    self.send(MarketChannel::ChangeSymbolSubscription, payload);
                }
            }
            SubscriptionTarget::Timestamp(id) => {
                let _guard = self.timestamp_guard.lock().expect(MUTEX_POISONED);
                let was_empty = self.timestamp_observers.is_empty();
                self.timestamp_observers.unregister(id);
                if !was_empty && self.timestamp_observers.is_empty() {
                    self.send(MarketChannel::UnsubscribeTimestamp, json!({}));
                }
            }
        }
    }

    fn on_timestamp(&self, payload: &Value) {
        match payload.get("timestamp").and_then(Value::as_str) {
            Some(timestamp) => self.timestamp_observers.fire(&timestamp.to_string()),
            None => tracing::warn!(
                "Unable to extract \"timestamp\" property from {}",
                MarketChannel::Timestamp
            ),
        }
    }

    fn on_profile_snapshot(&self, payload: &Value) {
        let symbol = payload
            .get("symbol")
            .and_then(Value::as_str)
            .filter(|symbol| !symbol.is_empty());

        match symbol {
            Some(symbol) => {
                let symbol = Ustr::from(symbol);
                self.profiles
                    .insert(symbol, Profile::from_payload(symbol, payload));
            }
            None => tracing::warn!(
                "Dropping {} due to missing symbol",
                MarketChannel::ProfileSnapshot
            ),
        }
    }

    fn on_quote_snapshot(&self, payload: &Value) {
        let Some(update) = QuoteUpdate::from_payload(payload) else {
            tracing::warn!("Dropping {} due to missing symbol", MarketChannel::QuoteSnapshot);
            return;
        };

        let symbol = update.symbol();
        let synchronizer = QuoteSynchronizer::Update(update);
        self.quotes.insert(symbol, synchronizer.to_quote());

        let quote_observers = self
            .quote_observers
            .lock()
            .expect(MUTEX_POISONED)
            .observers(&symbol);
        let price_observers = self
            .price_observers
            .lock()
            .expect(MUTEX_POISONED)
            .observers(&symbol);

        if let Some(observers) = quote_observers {
            observers.fire(&synchronizer);
        }
        if let Some(observers) = price_observers {
            observers.fire(&synchronizer);
        }
    }

    fn on_quote_delta(&self, payload: &Value) {
        let Some(update) = QuoteUpdate::from_payload(payload) else {
            tracing::warn!("Dropping {} due to missing symbol", MarketChannel::QuoteDelta);
            return;
        };

        let symbol = update.symbol();
        let synchronizer = QuoteSynchronizer::Update(update);

        if let Some(mut quote) = self.quotes.get_mut(&symbol)
            && let Err(e) = synchronizer.synchronize(&mut quote)
        {
            tracing::warn!("Failed to apply delta for {symbol}: {e}");
        }

        let observers = self
            .quote_observers
            .lock()
            .expect(MUTEX_POISONED)
            .observers(&symbol);
        if let Some(observers) = observers {
            observers.fire(&synchronizer);
        }
    }
}

fn parse_symbol(symbol: &str) -> MarketResult<Ustr> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(MarketError::MissingSymbol);
    }
    Ok(Ustr::from(symbol))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubscriptionTarget {
    Symbol {
        kind: SubscriptionKind,
        symbol: Ustr,
        id: ObserverId,
    },
    Timestamp(ObserverId),
}

/// Disposal handle for a quote, price change or timestamp subscription.
///
/// Disposal is idempotent. Dropping the handle does not dispose it.
pub struct MarketSubscription {
    target: SubscriptionTarget,
    owner: Weak<MarketInner>,
    disposed: AtomicBool,
}

impl Debug for MarketSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(MarketSubscription))
            .field("target", &self.target)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl MarketSubscription {
    const fn new(target: SubscriptionTarget, owner: Weak<MarketInner>) -> Self {
        Self {
            target,
            owner,
            disposed: AtomicBool::new(false),
        }
    }

    /// Returns the subscribed symbol, `None` for timestamp subscriptions.
    #[must_use]
    pub const fn symbol(&self) -> Option<Ustr> {
        match self.target {
            SubscriptionTarget::Symbol { symbol, .. } => Some(symbol),
            SubscriptionTarget::Timestamp(_) => None,
        }
    }

    /// Returns true once this handle has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Removes the observer, unsubscribing on the wire if it was the last one. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(owner) = self.owner.upgrade() {
            owner.unsubscribe(&self.target);
        }
    }
}
