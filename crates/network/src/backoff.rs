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

//! Exponential backoff with jitter, used to space out the WebSocket transport's automatic
//! reconnection attempts.
//!
//! The delay grows by a constant factor up to a configurable maximum, with random jitter
//! added on top. An "immediate first" flag lets the first reconnect attempt run without delay.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

const FACTOR_MAX: f64 = 100.0;

/// An exponential backoff mechanism with optional jitter and immediate-first behavior.
///
/// Starts from an initial delay and multiplies it by a factor on each iteration,
/// capping the delay at a maximum value.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    /// The initial backoff delay.
    delay_initial: Duration,
    /// The maximum delay to cap the backoff.
    delay_max: Duration,
    /// The current backoff delay.
    delay_current: Duration,
    /// The factor to multiply the delay on each iteration.
    factor: f64,
    /// The maximum random jitter to add (in milliseconds).
    jitter_ms: u64,
    /// If true, the first call to `next_duration()` returns zero delay.
    immediate_first: bool,
    /// Tracks whether the immediate reconnect has been consumed.
    immediate_pending: bool,
}

impl ExponentialBackoff {
    /// Creates a new [`ExponentialBackoff`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `delay_initial` is zero.
    /// - `delay_max` is less than `delay_initial`.
    /// - `factor` is not within [1.0, 100.0].
    pub fn new(
        delay_initial: Duration,
        delay_max: Duration,
        factor: f64,
        jitter_ms: u64,
        immediate_first: bool,
    ) -> ConfigResult<Self> {
        if delay_initial.is_zero() {
            return Err(ConfigError::InvalidBackoff(
                "delay_initial must be non-zero".to_string(),
            ));
        }

        if delay_max < delay_initial {
            return Err(ConfigError::InvalidBackoff(format!(
                "delay_max {delay_max:?} is less than delay_initial {delay_initial:?}"
            )));
        }

        if !factor.is_finite() || !(1.0..=FACTOR_MAX).contains(&factor) {
            return Err(ConfigError::InvalidBackoff(format!(
                "factor {factor} must be within [1.0, {FACTOR_MAX}]"
            )));
        }

        Ok(Self {
            delay_initial,
            delay_max,
            delay_current: delay_initial,
            factor,
            jitter_ms,
            immediate_first,
            immediate_pending: immediate_first,
        })
    }

    /// Return the next backoff delay with jitter and update the internal state.
    ///
    /// If `immediate_first` is set and no delay has been handed out since construction
    /// or the last reset, returns `Duration::ZERO`.
    pub fn next_duration(&mut self) -> Duration {
        if self.immediate_pending {
            self.immediate_pending = false;
            return Duration::ZERO;
        }

        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random_range(0..=self.jitter_ms)
        };
        let delay_with_jitter = self.delay_current + Duration::from_millis(jitter);

        // Prepare the next delay
        let current_nanos = self.delay_current.as_nanos() as f64;
        let max_nanos = self.delay_max.as_nanos() as f64;
        let next_nanos = (current_nanos * self.factor).min(max_nanos);
        self.delay_current = Duration::from_nanos(next_nanos as u64);

        delay_with_jitter
    }

    /// Reset the backoff to its initial state.
    pub const fn reset(&mut self) {
        self.delay_current = self.delay_initial;
        self.immediate_pending = self.immediate_first;
    }

    /// Returns the current base delay without jitter.
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.delay_current
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_no_jitter_exponential_growth() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(1600);
        let mut backoff = ExponentialBackoff::new(initial, max, 2.0, 0, false).unwrap();

        let delays: Vec<_> = (0..6).map(|_| backoff.next_duration()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
                Duration::from_millis(1600),
            ]
        );
    }

    #[rstest]
    fn test_reset() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(1600);
        let mut backoff = ExponentialBackoff::new(initial, max, 2.0, 0, false).unwrap();

        let _ = backoff.next_duration(); // current_delay becomes 200ms
        backoff.reset();
        assert_eq!(backoff.next_duration(), Duration::from_millis(100));
    }

    #[rstest]
    fn test_jitter_within_bounds() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        let jitter = 50;

        for _ in 0..10 {
            let mut backoff = ExponentialBackoff::new(initial, max, 2.0, jitter, false).unwrap();
            let base = backoff.current_delay();
            let delay = backoff.next_duration();
            assert!(delay >= base, "Delay {delay:?} is below {base:?}");
            assert!(
                delay <= base + Duration::from_millis(jitter),
                "Delay {delay:?} exceeds jitter bound"
            );
        }
    }

    #[rstest]
    fn test_immediate_first_then_reset() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        let mut backoff = ExponentialBackoff::new(initial, max, 2.0, 0, true).unwrap();

        assert_eq!(backoff.next_duration(), Duration::ZERO);
        assert_eq!(backoff.next_duration(), Duration::from_millis(100));
        assert_eq!(backoff.next_duration(), Duration::from_millis(200));

        backoff.reset();
        assert_eq!(backoff.next_duration(), Duration::ZERO);
        assert_eq!(backoff.next_duration(), Duration::from_millis(100));
    }

    #[rstest]
    fn test_factor_less_than_two() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(200);
        let mut backoff = ExponentialBackoff::new(initial, max, 1.5, 0, false).unwrap();

        assert_eq!(backoff.next_duration(), Duration::from_millis(100));
        assert_eq!(backoff.next_duration(), Duration::from_millis(150));
        assert_eq!(backoff.next_duration(), Duration::from_millis(200));
        assert_eq!(backoff.next_duration(), Duration::from_millis(200));
    }

    #[rstest]
    #[case(Duration::ZERO, Duration::from_millis(100), 2.0)]
    #[case(Duration::from_millis(200), Duration::from_millis(100), 2.0)]
    #[case(Duration::from_millis(100), Duration::from_millis(200), 0.5)]
    #[case(Duration::from_millis(100), Duration::from_millis(200), 101.0)]
    #[case(Duration::from_millis(100), Duration::from_millis(200), f64::NAN)]
    fn test_invalid_parameters_rejected(
        #[case] initial: Duration,
        #[case] max: Duration,
        #[case] factor: f64,
    ) {
        let result = ExponentialBackoff::new(initial, max, factor, 0, false);
        assert!(matches!(result, Err(ConfigError::InvalidBackoff(_))));
    }
}
