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

//! Property-based tests for the reconnection backoff.

use std::time::Duration;

use proptest::prelude::*;
use quotestream_network::backoff::ExponentialBackoff;

fn backoff_params() -> impl Strategy<Value = (Duration, Duration, f64, u64)> {
    (1u64..=5_000, 1u64..=60_000, 1.0f64..=10.0, 0u64..=1_000)
        .prop_filter("max >= initial", |(initial_ms, max_ms, _, _)| {
            max_ms >= initial_ms
        })
        .prop_map(|(initial_ms, max_ms, factor, jitter_ms)| {
            (
                Duration::from_millis(initial_ms),
                Duration::from_millis(max_ms),
                factor,
                jitter_ms,
            )
        })
}

proptest! {
    #[test]
    fn delays_stay_within_max_plus_jitter(
        (initial, max, factor, jitter_ms) in backoff_params(),
        iterations in 1usize..=30,
    ) {
        let mut backoff = ExponentialBackoff::new(initial, max, factor, jitter_ms, false).unwrap();

        for _ in 0..iterations {
            let base = backoff.current_delay();
            let delay = backoff.next_duration();

            prop_assert!(base <= max);
            prop_assert!(delay >= base);
            prop_assert!(delay <= base + Duration::from_millis(jitter_ms));
        }
    }

    #[test]
    fn base_delay_never_decreases(
        (initial, max, factor, _jitter_ms) in backoff_params(),
        iterations in 1usize..=30,
    ) {
        let mut backoff = ExponentialBackoff::new(initial, max, factor, 0, false).unwrap();
        let mut previous = backoff.current_delay();

        for _ in 0..iterations {
            let _ = backoff.next_duration();
            let current = backoff.current_delay();
            prop_assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn reset_restores_initial_behavior(
        (initial, max, factor, _jitter_ms) in backoff_params(),
        immediate_first in any::<bool>(),
        iterations in 0usize..=10,
    ) {
        let mut backoff =
            ExponentialBackoff::new(initial, max, factor, 0, immediate_first).unwrap();

        for _ in 0..iterations {
            let _ = backoff.next_duration();
        }
        backoff.reset();

        let expected = if immediate_first { Duration::ZERO } else { initial };
        prop_assert_eq!(backoff.next_duration(), expected);
    }
}
