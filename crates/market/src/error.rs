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

//! Error types for quote synchronization and market client operations.

use quotestream_network::error::ConnectionError;
use thiserror::Error;

/// Result alias for quote synchronization.
pub type QuoteResult<T> = Result<T, QuoteError>;

/// Result alias for market client operations.
pub type MarketResult<T> = Result<T, MarketError>;

/// Failure applying a synchronizer to a quote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    /// The synchronizer was built for a different symbol than the target quote.
    #[error("The synchronizer for {expected} does not apply to the target (target symbol: {actual})")]
    SymbolMismatch {
        /// The symbol of the synchronizer.
        expected: String,
        /// The symbol of the target quote.
        actual: String,
    },
}

/// Error type for [`crate::client::MarketClient`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    /// The symbol argument was empty.
    #[error("The symbol is required")]
    MissingSymbol,

    /// The underlying connection rejected the operation.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
