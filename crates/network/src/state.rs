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

//! Connection lifecycle states and the static table of legal transitions between them.
//!
//! | from            | legal targets                                |
//! |-----------------|----------------------------------------------|
//! | `Connecting`    | `Connected`, `Disconnecting`, `Disconnected` |
//! | `Connected`     | `Disconnecting`, `Disconnected`, `Connecting`|
//! | `Disconnecting` | `Disconnected`                               |
//! | `Disconnected`  | `Connecting`                                 |

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Lifecycle state of a logical connection.
///
/// The initial state is [`ConnectionState::Disconnected`], every other state is reachable
/// from it through the transition table.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    Hash,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConnectionState {
    /// A connection attempt (initial or automatic reconnect) is in progress.
    Connecting = 0,
    /// The transport is connected and messages can be transmitted.
    Connected = 1,
    /// A manual disconnect has been requested and is in progress.
    Disconnecting = 2,
    /// No connection is open and none is being attempted.
    #[default]
    Disconnected = 3,
}

const FROM_CONNECTING: &[ConnectionState] = &[
    ConnectionState::Connected,
    ConnectionState::Disconnecting,
    ConnectionState::Disconnected,
];
const FROM_CONNECTED: &[ConnectionState] = &[
    ConnectionState::Disconnecting,
    ConnectionState::Disconnected,
    ConnectionState::Connecting,
];
const FROM_DISCONNECTING: &[ConnectionState] = &[ConnectionState::Disconnected];
const FROM_DISCONNECTED: &[ConnectionState] = &[ConnectionState::Connecting];

impl ConnectionState {
    /// Returns the states which may legally follow this one.
    #[must_use]
    pub const fn transitions(self) -> &'static [Self] {
        match self {
            Self::Connecting => FROM_CONNECTING,
            Self::Connected => FROM_CONNECTED,
            Self::Disconnecting => FROM_DISCONNECTING,
            Self::Disconnected => FROM_DISCONNECTED,
        }
    }

    /// Returns true if the table permits moving from this state to `target`.
    ///
    /// A state never transitions to itself; callers treat `target == current` as a no-op.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Connecting,
                Self::Connected | Self::Disconnecting | Self::Disconnected
            ) | (
                Self::Connected,
                Self::Disconnecting | Self::Disconnected | Self::Connecting
            ) | (Self::Disconnecting, Self::Disconnected)
                | (Self::Disconnected, Self::Connecting)
        )
    }

    /// Returns true if a connect may be initiated from this state.
    #[inline]
    #[must_use]
    pub const fn can_connect(self) -> bool {
        self.can_transition_to(Self::Connecting)
    }

    /// Returns true if a disconnect may be initiated from this state.
    #[inline]
    #[must_use]
    pub const fn can_disconnect(self) -> bool {
        self.can_transition_to(Self::Disconnecting)
    }

    /// Returns true if outbound messages can be transmitted in this state.
    #[inline]
    #[must_use]
    pub const fn can_transmit(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Convert a u8 to [`ConnectionState`], useful when loading from an `AtomicU8`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Connecting),
            1 => Some(Self::Connected),
            2 => Some(Self::Disconnecting),
            3 => Some(Self::Disconnected),
            _ => None,
        }
    }

    /// Loads the state held by `value`, values outside the enumeration read as `Disconnected`.
    #[inline]
    pub fn from_atomic(value: &AtomicU8) -> Self {
        Self::from_u8(value.load(Ordering::SeqCst)).unwrap_or_default()
    }

    /// Convert a [`ConnectionState`] to a u8, useful when storing to an `AtomicU8`.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Returns true if the transition table permits `from -> to`.
#[inline]
#[must_use]
pub const fn can_transition(from: ConnectionState, to: ConnectionState) -> bool {
    from.can_transition_to(to)
}
