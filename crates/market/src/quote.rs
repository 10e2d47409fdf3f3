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

//! The quote model and its declarative field setter table.

#![deny(missing_docs)]

use std::sync::LazyLock;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ustr::Ustr;

/// Applies one JSON field value to a quote.
pub type FieldSetter = fn(&mut Quote, &Value);

/// The latest known market state of one symbol.
///
/// Every field other than the symbol is optional: a quote is built up incrementally
/// from snapshot and delta messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// The instrument symbol.
    pub symbol: Ustr,
    /// The server sequence number of the last applied update.
    pub sequence: Option<i64>,
    /// If the instrument is currently trading.
    pub online: Option<bool>,
    /// The quote flag reported by the server.
    pub flag: Option<String>,
    /// The quote mode reported by the server.
    pub mode: Option<String>,
    /// The trading session code.
    pub session: Option<String>,
    /// The trading day code.
    pub day: Option<String>,
    /// The trading day number.
    pub day_num: Option<i64>,
    /// The most recent price.
    pub last_price: Option<f64>,
    /// The previous session settlement or close price.
    pub previous_price: Option<f64>,
    /// Derived: `last_price - previous_price`.
    pub price_change: Option<f64>,
    /// Derived: `price_change / previous_price`, as a fraction.
    pub price_change_percent: Option<f64>,
    /// The price of the last trade.
    pub trade_price: Option<f64>,
    /// The size of the last trade.
    pub trade_size: Option<i64>,
    /// The best bid price.
    pub bid_price: Option<f64>,
    /// The size at the best bid.
    pub bid_size: Option<i64>,
    /// The best ask price.
    pub ask_price: Option<f64>,
    /// The size at the best ask.
    pub ask_size: Option<i64>,
    /// The session open price.
    pub open_price: Option<f64>,
    /// The session high price.
    pub high_price: Option<f64>,
    /// The session low price.
    pub low_price: Option<f64>,
    /// The settlement price.
    pub settlement_price: Option<f64>,
    /// The session volume.
    pub volume: Option<i64>,
    /// The open interest.
    pub open_interest: Option<i64>,
    /// The server time of the last update.
    pub time: Option<String>,
    /// The server time of the last update, formatted for display.
    pub time_display: Option<String>,
}

impl Quote {
    /// Creates a new empty [`Quote`] for `symbol`.
    #[must_use]
    pub const fn new(symbol: Ustr) -> Self {
        Self {
            symbol,
            sequence: None,
            online: None,
            flag: None,
            mode: None,
            session: None,
            day: None,
            day_num: None,
            last_price: None,
            previous_price: None,
            price_change: None,
            price_change_percent: None,
            trade_price: None,
            trade_size: None,
            bid_price: None,
            bid_size: None,
            ask_price: None,
            ask_size: None,
            open_price: None,
            high_price: None,
            low_price: None,
            settlement_price: None,
            volume: None,
            open_interest: None,
            time: None,
            time_display: None,
        }
    }

    /// Applies the wire field `name`, returning `false` if the field is not a quote field.
    ///
    /// Values which cannot be read as the field's type clear the field.
    pub fn apply_field(&mut self, name: &str, value: &Value) -> bool {
        match FIELD_SETTERS.get(name) {
            Some(setter) => {
                setter(self, value);
                true
            }
            None => false,
        }
    }

    /// Recomputes the derived price change fields from the last and previous prices.
    pub fn update_price_change(&mut self) {
        match (self.last_price, self.previous_price) {
            (Some(last), Some(previous)) => {
                let change = last - previous;
                self.price_change = Some(change);
                self.price_change_percent = (previous != 0.0).then(|| change / previous);
            }
            _ => {
                self.price_change = None;
                self.price_change_percent = None;
            }
        }
    }
}

/// Returns true if `name` is a wire field applied to quotes.
#[must_use]
pub fn is_quote_field(name: &str) -> bool {
    FIELD_SETTERS.contains_key(name)
}

macro_rules! setter {
    ($field:ident, $parse:ident) => {
        |quote: &mut Quote, value: &Value| quote.$field = $parse(value)
    };
}

static FIELD_SETTERS: LazyLock<AHashMap<&'static str, FieldSetter>> = LazyLock::new(|| {
    let setters: [(&'static str, FieldSetter); 23] = [
        ("sequence", setter!(sequence, parse_i64)),
        ("flag", setter!(flag, parse_string)),
        ("online", setter!(online, parse_bool)),
        ("mode", setter!(mode, parse_string)),
        ("session", setter!(session, parse_string)),
        ("day", setter!(day, parse_string)),
        ("dayNum", setter!(day_num, parse_i64)),
        ("lastPrice", setter!(last_price, parse_f64)),
        ("previousPrice", setter!(previous_price, parse_f64)),
        ("tradePrice", setter!(trade_price, parse_f64)),
        ("tradeSize", setter!(trade_size, parse_i64)),
        ("bidPrice", setter!(bid_price, parse_f64)),
        ("bidSize", setter!(bid_size, parse_i64)),
        ("askPrice", setter!(ask_price, parse_f64)),
        ("askSize", setter!(ask_size, parse_i64)),
        ("openPrice", setter!(open_price, parse_f64)),
        ("highPrice", setter!(high_price, parse_f64)),
        ("lowPrice", setter!(low_price, parse_f64)),
        ("settlementPrice", setter!(settlement_price, parse_f64)),
        ("volume", setter!(volume, parse_i64)),
        ("openInterest", setter!(open_interest, parse_i64)),
        ("time", setter!(time, parse_string)),
        ("timeDisplay", setter!(time_display, parse_string)),
    ];
    setters.into_iter().collect()
});

fn parse_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|v| v as i64)
            })
        }
        _ => None,
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text.eq_ignore_ascii_case("true") => Some(true),
        Value::String(text) if text.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn parse_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
