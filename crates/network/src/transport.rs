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

//! The message transport seam consumed by [`crate::connector::Connector`].
//!
//! A transport carries named-channel JSON messages and owns its own bounded reconnection
//! policy. Implementations must never invoke handlers synchronously from inside
//! `connect`, `disconnect`, `emit`, `on`, `off` or `close`, so callers may hold locks
//! across these calls.

use std::{
    fmt::Debug,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use ustr::Ustr;

use crate::{
    MUTEX_POISONED, config::ConnectionConfig, error::TransportResult, observer::Observer,
};

/// Handler invoked with the payload of an inbound channel message.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handler invoked with transport lifecycle events.
pub type LifecycleHandler = Observer<TransportEvent>;

/// Identifies a channel listener registered with a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Raw lifecycle events raised by a transport.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum TransportEvent {
    /// The initial connection was established.
    Connect,
    /// An automatic reconnection attempt is starting.
    Reconnecting {
        /// One-based attempt number.
        attempt: u32,
    },
    /// An automatic reconnection attempt succeeded.
    Reconnect,
    /// The connection was closed, manually or through failure.
    Disconnect,
    /// A connection attempt failed.
    ConnectError(String),
    /// The automatic reconnection budget was spent, the transport will not retry again.
    ReconnectFailed,
}

/// A named-channel message transport.
pub trait Transport: Send + Sync + Debug {
    /// Begins connecting. Completion is signalled through [`TransportEvent::Connect`].
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot start connecting.
    fn connect(&self) -> TransportResult<()>;

    /// Begins disconnecting. Completion is signalled through [`TransportEvent::Disconnect`].
    fn disconnect(&self);

    /// Returns true if the transport can currently transmit.
    fn is_connected(&self) -> bool;

    /// Sends `payload` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not connected or the frame cannot be encoded.
    fn emit(&self, channel: &str, payload: Value) -> TransportResult<()>;

    /// Registers a handler for messages arriving on `channel`.
    fn on(&self, channel: &str, handler: EventHandler) -> ListenerId;

    /// Removes a handler registered through [`Transport::on`].
    fn off(&self, channel: &str, id: ListenerId) -> bool;

    /// Registers a handler for lifecycle events.
    fn on_lifecycle(&self, handler: LifecycleHandler);

    /// Closes the transport permanently, releasing every handler.
    fn close(&self);
}

/// Builds transports for a connection configuration.
///
/// The connection manager calls the factory once at construction and again every time a
/// connector is replaced after its reconnection budget is exhausted.
pub trait TransportFactory: Send + Sync + Debug {
    /// Creates a fresh, unconnected transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be created.
    fn create(&self, config: &ConnectionConfig) -> TransportResult<Arc<dyn Transport>>;
}

/// The JSON text frame exchanged with the server: `{"event": <channel>, "data": <payload>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    /// The channel name.
    pub event: String,
    /// The message payload.
    #[serde(default)]
    pub data: Value,
}

type ChannelListeners = Arc<Vec<(ListenerId, EventHandler)>>;

/// Routes inbound channel messages to registered handlers.
///
/// Handler lists are copy-on-write so dispatch never holds the lock while calling out.
pub struct ChannelRouter {
    next_id: AtomicU64,
    channels: Mutex<AHashMap<Ustr, ChannelListeners>>,
}

impl Debug for ChannelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.channels.lock().expect(MUTEX_POISONED);
        f.debug_struct(stringify!(ChannelRouter))
            .field("channels", &channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRouter {
    /// Creates a new empty [`ChannelRouter`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            channels: Mutex::new(AHashMap::new()),
        }
    }

    /// Adds a handler for `channel`.
    pub fn add(&self, channel: &str, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut channels = self.channels.lock().expect(MUTEX_POISONED);
        let entry = channels.entry(Ustr::from(channel)).or_default();

        let mut copy = Vec::with_capacity(entry.len() + 1);
        copy.extend(entry.iter().cloned());
        copy.push((id, handler));
        *entry = Arc::new(copy);
        id
    }

    /// Removes the handler with the given id from `channel`.
    pub fn remove(&self, channel: &str, id: ListenerId) -> bool {
        let key = Ustr::from(channel);
        let mut channels = self.channels.lock().expect(MUTEX_POISONED);

        let Some(entry) = channels.get_mut(&key) else {
            return false;
        };

        if !entry.iter().any(|(existing, _)| *existing == id) {
            return false;
        }

        let copy: Vec<_> = entry
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();

        if copy.is_empty() {
            channels.remove(&key);
        } else {
            *entry = Arc::new(copy);
        }
        true
    }

    /// Returns the number of handlers registered for `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .expect(MUTEX_POISONED)
            .get(&Ustr::from(channel))
            .map_or(0, |listeners| listeners.len())
    }

    /// Invokes every handler registered for `channel`, returning how many were called.
    pub fn dispatch(&self, channel: &str, payload: &Value) -> usize {
        let listeners = self
            .channels
            .lock()
            .expect(MUTEX_POISONED)
            .get(&Ustr::from(channel))
            .cloned();

        match listeners {
            Some(listeners) => {
                for (_, handler) in listeners.iter() {
                    handler(payload);
                }
                listeners.len()
            }
            None => 0,
        }
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.channels.lock().expect(MUTEX_POISONED).clear();
    }
}
