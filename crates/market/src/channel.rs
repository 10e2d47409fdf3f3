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

//! Named channels of the market data protocol.

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// A named message channel exchanged with the market data server.
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    Hash,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
pub enum MarketChannel {
    /// Outbound: starts the server timestamp stream.
    #[strum(serialize = "subscribe/timestamp")]
    SubscribeTimestamp,
    /// Outbound: stops the server timestamp stream.
    #[strum(serialize = "unsubscribe/timestamp")]
    UnsubscribeTimestamp,
    /// Inbound: `{"timestamp": <string>}`.
    #[strum(serialize = "timestamp")]
    Timestamp,
    /// Outbound: `{"symbols": [..], "subscribeToQuotes": <bool>, "subscribeToPrices": <bool>}`.
    #[strum(serialize = "subscribe/symbols")]
    ChangeSymbolSubscription,
    /// Inbound: a full quote for one symbol.
    #[strum(serialize = "quote/snapshot")]
    QuoteSnapshot,
    /// Inbound: the changed fields of a quote for one symbol.
    #[strum(serialize = "quote/delta")]
    QuoteDelta,
    /// Inbound: an instrument profile pushed by the server.
    #[strum(serialize = "profile/snapshot")]
    ProfileSnapshot,
    /// Outbound: a correlated request for an instrument profile, `{"symbol": <string>}`.
    #[strum(serialize = "request/profile")]
    RequestProfile,
}

impl MarketChannel {
    /// Returns the wire name of the channel.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}
