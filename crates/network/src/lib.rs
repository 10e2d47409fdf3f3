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

//! Connection machinery for the quotestream market data client.
//!
//! The `quotestream-network` crate maintains a single logical, subscription oriented connection
//! to a streaming server over an unreliable auto-reconnecting transport:
//!
//! - A connection state machine with a static transition table ([`state`]).
//! - A transport seam with a WebSocket implementation ([`transport`], [`websocket`]).
//! - A connector owning one transport instance, with request/response correlation
//!   ([`connector`], [`correlator`]).
//! - A connection manager which replaces the connector when its reconnection budget is
//!   exhausted, replaying the subscription registry against the replacement ([`manager`],
//!   [`registry`]).
//!
//! # Feature flags
//!
//! - `testing`: Exposes the in-memory `testing::MockTransport` used to drive the connection
//!   layer deterministically from tests in dependent crates.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backoff;
pub mod config;
pub mod connector;
pub mod correlator;
pub mod error;
pub mod manager;
pub mod observer;
pub mod registry;
pub mod state;
pub mod tls;
pub mod transport;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use crate::{
    config::ConnectionConfig,
    connector::{Connector, ConnectorEvent, ConnectorStats},
    manager::ConnectionManager,
    registry::Subscription,
    state::ConnectionState,
};

/// Message for when a mutex guard cannot be acquired due to poisoning.
///
/// Mutex guards should use `expect` rather than handle poison errors.
/// A poisoned mutex indicates a thread panicked while holding the lock,
/// meaning protected data may be in an inconsistent state.
pub const MUTEX_POISONED: &str = "Mutex poisoned";
