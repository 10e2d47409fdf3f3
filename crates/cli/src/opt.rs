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

use std::path::PathBuf;

use clap::Parser;

/// Main CLI structure for parsing command-line arguments and options.
///
/// This is the entry point for the quotestream command-line interface.
#[derive(Debug, Parser)]
#[clap(version, about, author)]
pub struct QuoteStreamCli {
    /// Log filter directives (e.g. `info`, `quotestream_network=debug`).
    #[arg(long, env = "QUOTESTREAM_LOG", default_value = "info", global = true)]
    pub log: String,
    #[clap(subcommand)]
    pub command: Commands,
}

/// Available top-level commands for the quotestream CLI.
#[derive(Parser, Debug)]
pub enum Commands {
    /// Streams quotes, price changes and server timestamps until interrupted.
    Stream(StreamOpt),
    /// Requests the profile of a symbol and prints it.
    Profile(ProfileOpt),
}

/// Server connection parameters, overriding the configuration file when given.
#[derive(Parser, Debug, Clone, Default)]
pub struct ServerConfig {
    /// Path to a TOML connection configuration.
    #[arg(long, env = "QUOTESTREAM_CONFIG")]
    pub config: Option<PathBuf>,
    /// Host name or address of the streaming server.
    #[arg(long, env = "QUOTESTREAM_HOST")]
    pub host: Option<String>,
    /// Port number of the streaming server.
    #[arg(long, env = "QUOTESTREAM_PORT")]
    pub port: Option<u16>,
    /// Connect using TLS (`wss`).
    #[arg(long, env = "QUOTESTREAM_SECURE")]
    pub secure: Option<bool>,
}

/// Options for the `stream` command.
#[derive(Parser, Debug, Clone)]
#[command(about = "Stream market data", long_about = None)]
pub struct StreamOpt {
    /// Symbols to subscribe to full quote updates for.
    #[arg(long, value_delimiter = ',', default_value = "^EURUSD")]
    pub quotes: Vec<String>,
    /// Symbols to subscribe to price changes for.
    #[arg(long, value_delimiter = ',', default_value = "TSLA")]
    pub prices: Vec<String>,
    /// Also subscribe to the server timestamp.
    #[arg(long)]
    pub timestamp: bool,
    /// Request and print the profile of this symbol once connected.
    #[arg(long)]
    pub profile: Option<String>,
    /// Server options.
    #[clap(flatten)]
    pub server: ServerConfig,
}

/// Options for the `profile` command.
#[derive(Parser, Debug, Clone)]
#[command(about = "Request an instrument profile", long_about = None)]
pub struct ProfileOpt {
    /// The symbol to request the profile for.
    pub symbol: String,
    /// Seconds to wait for the reply.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
    /// Server options.
    #[clap(flatten)]
    pub server: ServerConfig,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_stream_defaults() {
        let cli = QuoteStreamCli::try_parse_from(["quotestream", "stream"]).unwrap();

        assert_eq!(cli.log, "info");
        let Commands::Stream(opt) = cli.command else {
            panic!("expected stream command");
        };
        assert_eq!(opt.quotes, vec!["^EURUSD"]);
        assert_eq!(opt.prices, vec!["TSLA"]);
        assert!(!opt.timestamp);
        assert!(opt.profile.is_none());
    }

    #[rstest]
    fn test_stream_symbol_lists() {
        let cli = QuoteStreamCli::try_parse_from([
            "quotestream",
            "stream",
            "--quotes",
            "TSLA,AAPL",
            "--timestamp",
            "--host",
            "quotes.example.com",
            "--port",
            "443",
            "--secure",
            "true",
        ])
        .unwrap();

        let Commands::Stream(opt) = cli.command else {
            panic!("expected stream command");
        };
        assert_eq!(opt.quotes, vec!["TSLA", "AAPL"]);
        assert!(opt.timestamp);
        assert_eq!(opt.server.host.as_deref(), Some("quotes.example.com"));
        assert_eq!(opt.server.port, Some(443));
        assert_eq!(opt.server.secure, Some(true));
    }

    #[rstest]
    fn test_profile_requires_symbol() {
        assert!(QuoteStreamCli::try_parse_from(["quotestream", "profile"]).is_err());

        let cli = QuoteStreamCli::try_parse_from(["quotestream", "profile", "TSLA"]).unwrap();
        let Commands::Profile(opt) = cli.command else {
            panic!("expected profile command");
        };
        assert_eq!(opt.symbol, "TSLA");
        assert_eq!(opt.timeout_secs, 10);
    }
}
