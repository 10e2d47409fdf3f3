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

//! Per-symbol observer multiplexing.
//!
//! A [`SymbolObservers`] table keeps one observer list per symbol for one
//! [`SubscriptionKind`]. Only the transitions of a symbol between no observers and some
//! observers produce a wire message, and a symbol leaves the table once its last observer
//! is removed.

use std::sync::Arc;

use ahash::AHashMap;
use quotestream_network::observer::{Observer, ObserverId, ObserverList};
use serde_json::{Value, json};
use strum::{AsRefStr, Display};
use ustr::Ustr;

/// The kind of symbol subscription, each negotiated separately with the server.
#[derive(Clone, Copy, Debug, Display, Hash, PartialEq, Eq, AsRefStr)]
pub enum SubscriptionKind {
    /// Every quote snapshot and delta.
    Quotes,
    /// Price changes only.
    PriceChanges,
}

impl SubscriptionKind {
    /// Returns the payload flag toggling this kind of subscription.
    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::Quotes => "subscribeToQuotes",
            Self::PriceChanges => "subscribeToPrices",
        }
    }

    /// Builds a `subscribe/symbols` payload for `symbols`.
    #[must_use]
    pub fn payload<S: AsRef<str>>(self, symbols: &[S], subscribe: bool) -> Value {
        let symbols: Vec<&str> = symbols.iter().map(|symbol| symbol.as_ref()).collect();
        json!({
            "symbols": symbols,
            self.flag(): subscribe,
        })
    }
}

/// Observer lists keyed by symbol for one [`SubscriptionKind`].
pub struct SymbolObservers<T> {
    kind: SubscriptionKind,
    symbols: AHashMap<Ustr, Arc<ObserverList<T>>>,
}

impl<T> std::fmt::Debug for SymbolObservers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(SymbolObservers))
            .field("kind", &self.kind)
            .field("symbols", &self.symbols())
            .finish()
    }
}

impl<T> SymbolObservers<T> {
    /// Creates a new empty table for `kind`.
    #[must_use]
    pub fn new(kind: SubscriptionKind) -> Self {
        Self {
            kind,
            symbols: AHashMap::new(),
        }
    }

    /// Returns the subscription kind.
    #[must_use]
    pub const fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Adds `observer` for `symbol`.
    ///
    /// Returns the observer id, and the subscribe payload to send if the symbol had no
    /// observers before.
    pub fn add(&mut self, symbol: Ustr, observer: Observer<T>) -> (ObserverId, Option<Value>) {
        let observers = self.symbols.entry(symbol).or_insert_with(|| {
            Arc::new(ObserverList::new(format!("{symbol} {}", self.kind)))
        });

        let was_empty = observers.is_empty();
        let id = observers.register(observer);
        let payload = was_empty.then(|| self.kind.payload(&[symbol], true));
        (id, payload)
    }

    /// Removes the observer `id` from `symbol`.
    ///
    /// Returns the unsubscribe payload to send if this removed the last observer.
    pub fn remove(&mut self, symbol: Ustr, id: ObserverId) -> Option<Value> {
        let observers = self.symbols.get(&symbol)?;
        if !observers.unregister(id) || !observers.is_empty() {
            return None;
        }

        self.symbols.remove(&symbol);
        Some(self.kind.payload(&[symbol], false))
    }

    /// Returns the observers of `symbol`, if any.
    #[must_use]
    pub fn observers(&self, symbol: &Ustr) -> Option<Arc<ObserverList<T>>> {
        self.symbols.get(symbol).cloned()
    }

    /// Returns the number of observers of `symbol`.
    #[must_use]
    pub fn observer_count(&self, symbol: &Ustr) -> usize {
        self.symbols.get(symbol).map_or(0, |observers| observers.len())
    }

    /// Returns the subscribed symbols, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<Ustr> {
        let mut symbols: Vec<Ustr> = self.symbols.keys().copied().collect();
        symbols.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        symbols
    }

    /// Returns true if no symbol is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Builds the single batched payload re-announcing every subscribed symbol.
    #[must_use]
    pub fn resubscribe_payload(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        let symbols = self.symbols();
        Some(self.kind.payload(&symbols[..], true))
    }
}
