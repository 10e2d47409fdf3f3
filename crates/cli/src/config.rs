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

//! Resolution of the connection configuration from file, environment and flags.

use anyhow::Context;
use quotestream_network::ConnectionConfig;

use crate::opt::ServerConfig;

/// Builds the connection configuration for `server`.
///
/// The TOML file named by `--config` is loaded first (defaults otherwise), then any
/// host, port or TLS flag overrides it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the result is invalid.
pub fn resolve_config(server: &ServerConfig) -> anyhow::Result<ConnectionConfig> {
    let mut config = match &server.config {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration {}", path.display()))?;
            ConnectionConfig::from_toml_str(&source)
                .with_context(|| format!("Invalid configuration {}", path.display()))?
        }
        None => ConnectionConfig::default(),
    };

    if let Some(host) = &server.host {
        config.host.clone_from(host);
    }
    if let Some(port) = server.port {
        config.port = port;
    }
    if let Some(secure) = server.secure {
        config.secure = secure;
    }

    config.validate()?;
    Ok(config)
}
