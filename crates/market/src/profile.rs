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

//! Instrument profiles.

#![deny(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ustr::Ustr;

/// Static reference data for an instrument.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// The instrument symbol.
    pub symbol: Ustr,
    /// The instrument description.
    pub name: Option<String>,
    /// The listing exchange.
    pub exchange: Option<String>,
    /// The price format code.
    pub unit_code: Option<String>,
    /// The value of one point, as text.
    pub point_value: Option<String>,
    /// The minimum price increment, as text.
    pub tick_increment: Option<String>,
    /// The contract root, for futures.
    pub root: Option<String>,
    /// The contract month, for futures.
    pub month: Option<String>,
    /// The contract year, for futures.
    pub year: Option<String>,
}

impl Profile {
    /// Builds a profile for `symbol` from a response or snapshot payload.
    ///
    /// Missing fields are left empty, numbers are kept in their textual form.
    #[must_use]
    pub fn from_payload(symbol: Ustr, payload: &Value) -> Self {
        let field = |name: &str| match payload.get(name) {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Number(number)) => Some(number.to_string()),
            Some(Value::Bool(flag)) => Some(flag.to_string()),
            _ => None,
        };

        Self {
            symbol,
            name: field("name"),
            exchange: field("exchange"),
            unit_code: field("unitCode"),
            point_value: field("pointValue"),
            tick_increment: field("tickIncrement"),
            root: field("root"),
            month: field("month"),
            year: field("year"),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn test_from_payload() {
        let profile = Profile::from_payload(
            Ustr::from("ESZ5"),
            &json!({
                "name": "E-Mini S&P 500",
                "exchange": "CME",
                "unitCode": "A",
                "pointValue": 50,
                "tickIncrement": "25",
                "root": "ES",
                "month": "Z",
                "year": 2025,
            }),
        );

        assert_eq!(profile.symbol, Ustr::from("ESZ5"));
        assert_eq!(profile.name.as_deref(), Some("E-Mini S&P 500"));
        assert_eq!(profile.point_value.as_deref(), Some("50"));
        assert_eq!(profile.year.as_deref(), Some("2025"));
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!(null))]
    fn test_from_empty_payload(#[case] payload: Value) {
        let profile = Profile::from_payload(Ustr::from("TSLA"), &payload);

        assert_eq!(profile.symbol, Ustr::from("TSLA"));
        assert!(profile.name.is_none());
        assert!(profile.exchange.is_none());
    }
}
