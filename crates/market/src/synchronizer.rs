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

//! Quote synchronizers: deferred updates handed to quote observers.
//!
//! An observer receives a [`QuoteSynchronizer`] rather than a quote, and applies it to a
//! quote of its own. [`QuoteSynchronizer::Update`] carries the raw fields of a snapshot or
//! delta message. [`QuoteSynchronizer::Copy`] carries a full copy of a cached quote and is
//! what a new observer receives first.

use serde_json::{Map, Value};
use ustr::Ustr;

use crate::{
    error::{QuoteError, QuoteResult},
    quote::Quote,
};

const LAST_PRICE: &str = "lastPrice";
const PREVIOUS_PRICE: &str = "previousPrice";

/// The raw fields of one quote snapshot or delta message.
#[derive(Clone, Debug, PartialEq)]
pub struct QuoteUpdate {
    symbol: Ustr,
    fields: Map<String, Value>,
}

impl QuoteUpdate {
    /// Creates a new [`QuoteUpdate`].
    #[must_use]
    pub const fn new(symbol: Ustr, fields: Map<String, Value>) -> Self {
        Self { symbol, fields }
    }

    /// Builds an update from an inbound message payload.
    ///
    /// Returns `None` if the payload is not an object with a non-empty string `symbol`.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let fields = payload.as_object()?;
        let symbol = fields
            .get("symbol")
            .and_then(Value::as_str)
            .filter(|symbol| !symbol.is_empty())?;
        Some(Self::new(Ustr::from(symbol), fields.clone()))
    }

    /// Returns the symbol the update applies to.
    #[must_use]
    pub const fn symbol(&self) -> Ustr {
        self.symbol
    }

    /// Returns the raw fields of the update.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn apply(&self, target: &mut Quote) {
        for (name, value) in &self.fields {
            if !target.apply_field(name, value) {
                tracing::trace!("Skipping field {name} for {}", self.symbol);
            }
        }

        if self.fields.contains_key(LAST_PRICE) || self.fields.contains_key(PREVIOUS_PRICE) {
            target.update_price_change();
        }
    }
}

/// A deferred change to a [`Quote`].
#[derive(Clone, Debug, PartialEq)]
pub enum QuoteSynchronizer {
    /// Apply the fields of a snapshot or delta message.
    Update(QuoteUpdate),
    /// Overwrite every field with a stored quote.
    Copy(Box<Quote>),
}

impl QuoteSynchronizer {
    /// Returns the symbol the synchronizer applies to.
    #[must_use]
    pub fn symbol(&self) -> Ustr {
        match self {
            Self::Update(update) => update.symbol(),
            Self::Copy(quote) => quote.symbol,
        }
    }

    /// Applies the synchronizer to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is a quote for another symbol, in which case it is left
    /// unchanged.
    pub fn synchronize(&self, target: &mut Quote) -> QuoteResult<()> {
        let symbol = self.symbol();
        if symbol != target.symbol {
            return Err(QuoteError::SymbolMismatch {
                expected: symbol.to_string(),
                actual: target.symbol.to_string(),
            });
        }

        match self {
            Self::Update(update) => update.apply(target),
            Self::Copy(quote) => target.clone_from(quote),
        }
        Ok(())
    }

    /// Builds a new quote by applying the synchronizer to an empty quote.
    #[must_use]
    pub fn to_quote(&self) -> Quote {
        match self {
            Self::Update(update) => {
                let mut quote = Quote::new(update.symbol());
                update.apply(&mut quote);
                quote
            }
            Self::Copy(quote) => (**quote).clone(),
        }
    }
}
