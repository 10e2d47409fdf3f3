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

//! Property-based tests for the connection state transition table.

use proptest::prelude::*;
use quotestream_network::state::{ConnectionState, can_transition};
use strum::IntoEnumIterator;

fn any_state() -> impl Strategy<Value = ConnectionState> {
    prop::sample::select(ConnectionState::iter().collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn no_state_transitions_to_itself(state in any_state()) {
        prop_assert!(!can_transition(state, state));
    }

    #[test]
    fn table_agrees_with_transitions_list(from in any_state(), to in any_state()) {
        prop_assert_eq!(can_transition(from, to), from.transitions().contains(&to));
    }

    #[test]
    fn every_walk_from_disconnected_reaches_connected_through_connecting(
        walk in prop::collection::vec(any_state(), 0..20),
    ) {
        let mut current = ConnectionState::Disconnected;
        let mut previous = None;

        for target in walk {
            if can_transition(current, target) {
                if target == ConnectionState::Connected {
                    prop_assert_eq!(current, ConnectionState::Connecting);
                }
                previous = Some(current);
                current = target;
            }
        }

        if current == ConnectionState::Disconnecting {
            prop_assert!(matches!(
                previous,
                Some(ConnectionState::Connecting | ConnectionState::Connected)
            ));
        }
    }

    #[test]
    fn atomic_round_trip(state in any_state()) {
        prop_assert_eq!(ConnectionState::from_u8(state.as_u8()), Some(state));
    }
}
