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

//! Durable record of channel listener registrations.
//!
//! The registry is owned by the connection manager and outlives any single connector.
//! Registrations are keyed by (channel, listener identity): registering the same pair twice
//! yields the same key and a single transport-level registration. After a connector is
//! replaced the registry is replayed against the new one, listener registration only.

use std::{
    fmt::Debug,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use ahash::AHashMap;
use ustr::Ustr;

use crate::{
    connector::Connector,
    error::ConnectorResult,
    transport::{EventHandler, ListenerId},
};

/// Identifies a registration within a [`SubscriptionRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationKey(u64);

struct Registration {
    channel: Ustr,
    handler: EventHandler,
    listener: Option<ListenerId>,
}

/// The (channel, listener) set of a connection manager.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_key: u64,
    entries: AHashMap<RegistrationKey, Registration>,
}

impl Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(SubscriptionRegistry))
            .field("channels", &self.channels())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates a new empty [`SubscriptionRegistry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key of an existing registration for (channel, handler identity).
    #[must_use]
    pub fn find(&self, channel: &str, handler: &EventHandler) -> Option<RegistrationKey> {
        let channel = Ustr::from(channel);
        self.entries
            .iter()
            .find(|(_, entry)| entry.channel == channel && Arc::ptr_eq(&entry.handler, handler))
            .map(|(key, _)| *key)
    }

    /// Registers `handler` for `channel`, attaching it to `connector`.
    ///
    /// Idempotent per (channel, handler identity).
    ///
    /// # Errors
    ///
    /// Returns an error if `connector` rejects the listener, in which case nothing is recorded.
    pub fn register(
        &mut self,
        channel: &str,
        handler: EventHandler,
        connector: &Connector,
    ) -> ConnectorResult<RegistrationKey> {
        if let Some(key) = self.find(channel, &handler) {
            return Ok(key);
        }

        let listener = connector.on_event(channel, handler.clone())?;

        self.next_key += 1;
        let key = RegistrationKey(self.next_key);
        self.entries.insert(
            key,
            Registration {
                channel: Ustr::from(channel),
                handler,
                listener: Some(listener),
            },
        );
        Ok(key)
    }

    /// Removes the registration, detaching it from `connector`.
    ///
    /// Returns `false` if the key was not registered.
    pub fn unregister(&mut self, key: RegistrationKey, connector: &Connector) -> bool {
        let Some(entry) = self.entries.remove(&key) else {
            return false;
        };

        if let Some(listener) = entry.listener
            && let Err(e) = connector.off_event(&entry.channel, listener)
        {
            tracing::debug!("Listener for {} not detached: {e}", entry.channel);
        }
        true
    }

    /// Attaches every registration to `connector`, returning how many were replayed.
    ///
    /// Used after connector replacement: previous listener ids are discarded.
    pub fn replay(&mut self, connector: &Connector) -> usize {
        let mut replayed = 0;

        for entry in self.entries.values_mut() {
            match connector.on_event(&entry.channel, entry.handler.clone()) {
                Ok(listener) => {
                    entry.listener = Some(listener);
                    replayed += 1;
                }
                Err(e) => {
                    entry.listener = None;
                    tracing::error!("Failed to replay listener for {}: {e}", entry.channel);
                }
            }
        }

        replayed
    }

    /// Returns true if the key is registered.
    #[must_use]
    pub fn contains(&self, key: RegistrationKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Returns the registered channel names, sorted, one per registration.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .entries
            .values()
            .map(|entry| entry.channel.to_string())
            .collect();
        channels.sort();
        channels
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes registrations on behalf of a [`Subscription`] handle.
pub(crate) trait Unregister: Send + Sync {
    fn unregister(&self, key: RegistrationKey);
}

/// Disposal handle for a listener registration.
///
/// Disposing detaches the listener from whichever connector is current at that time.
/// Disposal is idempotent, and handles for the same registration all remove it.
/// Dropping the handle does not dispose it.
pub struct Subscription {
    key: RegistrationKey,
    channel: Ustr,
    owner: Weak<dyn Unregister>,
    disposed: AtomicBool,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Subscription))
            .field("key", &self.key)
            .field("channel", &self.channel)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(key: RegistrationKey, channel: &str, owner: Weak<dyn Unregister>) -> Self {
        Self {
            key,
            channel: Ustr::from(channel),
            owner,
            disposed: AtomicBool::new(false),
        }
    }

    /// Returns the registration key.
    #[must_use]
    pub const fn key(&self) -> RegistrationKey {
        self.key
    }

    /// Returns the channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        self.channel.as_str()
    }

    /// Returns true once this handle has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Removes the registration. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(owner) = self.owner.upgrade() {
            owner.unregister(self.key);
        }
    }
}
