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

//! Error types for configuration, transport, connector and connection manager operations.

use thiserror::Error;

use crate::state::ConnectionState;

/// Result alias for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Result alias for connection manager operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Invalid construction parameters, fatal at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The host was empty or whitespace.
    #[error("The host is required")]
    MissingHost,

    /// The reconnection attempt ceiling must be a positive integer.
    #[error("Reconnection attempts must be positive, was {0}")]
    InvalidReconnectionAttempts(u32),

    /// Reconnect backoff parameters are inconsistent.
    #[error("Invalid backoff: {0}")]
    InvalidBackoff(String),

    /// The configuration source could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Failure reported by a [`crate::transport::Transport`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No tokio runtime was available to drive the transport.
    #[error("No tokio runtime available")]
    NoRuntime,

    /// The transport has been closed and cannot be reused.
    #[error("Transport closed")]
    Closed,

    /// The transport is not currently connected.
    #[error("Transport not connected")]
    NotConnected,

    /// The transport could not be built from the connection configuration.
    #[error("Invalid transport configuration: {0}")]
    Config(String),

    /// The outbound frame could not be encoded.
    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

/// Error type for [`crate::connector::Connector`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectorError {
    /// The connector has been disposed, only `dispose` remains callable.
    #[error("Connector {0} disposed")]
    Disposed(u64),

    /// Failed to serialize a payload while building a request envelope.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Underlying transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ConnectorError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Error type for [`crate::manager::ConnectionManager`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    /// The requested state change is not permitted by the transition table.
    #[error("Unable to change connection from {from} to {to}")]
    IllegalTransition {
        /// The state at the time of the request.
        from: ConnectionState,
        /// The requested target state.
        to: ConnectionState,
    },

    /// The manager has been disposed.
    #[error("Connection manager disposed")]
    Disposed,

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The current connector rejected the operation.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Building a transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_illegal_transition_message() {
        let error = ConnectionError::IllegalTransition {
            from: ConnectionState::Disconnected,
            to: ConnectionState::Connected,
        };
        assert_eq!(
            error.to_string(),
            "Unable to change connection from DISCONNECTED to CONNECTED"
        );
    }

    #[rstest]
    fn test_connector_error_wraps_transport() {
        let error: ConnectionError = ConnectorError::from(TransportError::Closed).into();
        assert_eq!(error.to_string(), "Transport error: Transport closed");
    }
}
