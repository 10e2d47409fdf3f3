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

//! Configuration for streaming server connections.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    backoff::ExponentialBackoff,
    error::{ConfigError, ConfigResult},
};

/// Configuration for a streaming server connection.
///
/// Every connector built by a [`crate::manager::ConnectionManager`] uses the same
/// configuration, so a replacement connector targets the same host, port and security.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    /// The server host name or address.
    pub host: String,
    /// The server TCP port.
    pub port: u16,
    /// If the connection uses TLS (`wss`).
    pub secure: bool,
    /// The request path on the server.
    pub path: String,
    /// The number of automatic reconnection attempts before the transport gives up.
    pub reconnection_attempts: u32,
    /// The timeout (milliseconds) for a single connection attempt.
    pub reconnect_timeout_ms: u64,
    /// The initial reconnection delay (milliseconds) for reconnects.
    pub reconnect_delay_initial_ms: u64,
    /// The maximum reconnect delay (milliseconds) for exponential backoff.
    pub reconnect_delay_max_ms: u64,
    /// The exponential backoff factor for reconnection delays.
    pub reconnect_backoff_factor: f64,
    /// The maximum jitter (milliseconds) added to reconnection delays.
    pub reconnect_jitter_ms: u64,
    /// The optional heartbeat interval (seconds).
    pub heartbeat_secs: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 80,
            secure: false,
            path: "/".to_string(),
            reconnection_attempts: 5,
            reconnect_timeout_ms: 10_000,
            reconnect_delay_initial_ms: 1_000,
            reconnect_delay_max_ms: 5_000,
            reconnect_backoff_factor: 1.5,
            reconnect_jitter_ms: 500,
            heartbeat_secs: None,
        }
    }
}

impl ConnectionConfig {
    /// Creates a new [`ConnectionConfig`] for the given endpoint with default reconnect settings.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
            ..Default::default()
        }
    }

    /// Parses and validates a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or fails [`Self::validate`].
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is empty, the reconnection attempt ceiling is zero,
    /// or the backoff parameters are inconsistent.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }

        if self.reconnection_attempts == 0 {
            return Err(ConfigError::InvalidReconnectionAttempts(
                self.reconnection_attempts,
            ));
        }

        self.backoff().map(|_| ())
    }

    /// Returns the WebSocket URL of the server.
    #[must_use]
    pub fn server_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{scheme}://{}:{}{path}", self.host.trim(), self.port)
    }

    /// Builds the reconnection backoff described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backoff parameters are inconsistent.
    pub fn backoff(&self) -> ConfigResult<ExponentialBackoff> {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect_delay_initial_ms),
            Duration::from_millis(self.reconnect_delay_max_ms),
            self.reconnect_backoff_factor,
            self.reconnect_jitter_ms,
            true, // immediate-first
        )
    }

    /// Returns the timeout for a single connection attempt.
    #[must_use]
    pub const fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }
}
