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

//! Market data subscriptions for the quotestream streaming client.
//!
//! The `quotestream-market` crate builds on the connection machinery in `quotestream-network`:
//!
//! - Per-symbol quote and price change subscriptions, reference counted so that only the
//!   first observer and the last removal of a symbol generate wire traffic ([`subscription`]).
//! - A quote cache kept current by snapshot and delta messages, applied through
//!   synchronizers ([`quote`], [`synchronizer`]).
//! - Server timestamp subscriptions and cached instrument profile requests ([`client`],
//!   [`profile`]).
//!
//! Every active symbol is re-announced in one batched message per subscription kind each
//! time the connection becomes connected.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod client;
pub mod error;
pub mod profile;
pub mod quote;
pub mod subscription;
pub mod synchronizer;

// Re-exports
pub use crate::{
    channel::MarketChannel,
    client::{MarketClient, MarketSubscription},
    profile::Profile,
    quote::Quote,
    synchronizer::{QuoteSynchronizer, QuoteUpdate},
};
