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

//! Request/response correlation.
//!
//! Outbound requests are wrapped in `{"requestId": <id>, "request": <payload>}` and the
//! server replies on the reserved [`RESPONSE_CHANNEL`] with
//! `{"requestId": <id>, "response": <payload>}`. Each pending callback is consumed at most
//! once, callbacks still pending when the correlator is cleared are dropped without being
//! invoked.

use std::{fmt::Debug, sync::Mutex};

use ahash::AHashMap;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::MUTEX_POISONED;

/// The reserved channel carrying correlated responses.
pub const RESPONSE_CHANNEL: &str = "response";

/// Single-use callback receiving the inner response payload.
pub type ReplyCallback = Box<dyn FnOnce(Value) + Send>;

/// Outcome of handling an inbound response frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Correlation {
    /// The pending callback was found and invoked.
    Completed(String),
    /// No request is pending under the id.
    Orphaned(String),
    /// The frame carried no request id.
    Malformed,
}

/// Maps request ids to pending reply callbacks.
pub struct Correlator {
    pending: Mutex<AHashMap<String, ReplyCallback>>,
}

impl Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Correlator))
            .field("pending", &self.len())
            .finish()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Creates a new empty [`Correlator`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(AHashMap::new()),
        }
    }

    /// Generates a fresh request id (UUID v4).
    #[must_use]
    pub fn next_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Builds the outbound request envelope.
    #[must_use]
    pub fn envelope(request_id: &str, request: Value) -> Value {
        json!({
            "requestId": request_id,
            "request": request,
        })
    }

    /// Stores `callback` under `request_id`.
    pub fn insert(&self, request_id: String, callback: ReplyCallback) {
        self.pending
            .lock()
            .expect(MUTEX_POISONED)
            .insert(request_id, callback);
    }

    /// Removes the callback pending under `request_id` without invoking it.
    pub fn remove(&self, request_id: &str) -> Option<ReplyCallback> {
        self.pending.lock().expect(MUTEX_POISONED).remove(request_id)
    }

    /// Returns true if a callback is pending under `request_id`.
    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        self.pending
            .lock()
            .expect(MUTEX_POISONED)
            .contains_key(request_id)
    }

    /// Matches an inbound response frame to its pending request.
    ///
    /// The callback is removed under the lock and invoked after the lock is released,
    /// with the inner `response` value (`null` when absent).
    pub fn complete(&self, frame: &Value) -> Correlation {
        let Some(request_id) = frame.get("requestId").and_then(Value::as_str) else {
            return Correlation::Malformed;
        };

        let callback = self.remove(request_id);

        match callback {
            Some(callback) => {
                let response = frame.get("response").cloned().unwrap_or(Value::Null);
                callback(response);
                Correlation::Completed(request_id.to_string())
            }
            None => Correlation::Orphaned(request_id.to_string()),
        }
    }

    /// Drops every pending callback without invoking it, returning how many were abandoned.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock().expect(MUTEX_POISONED);
        let count = pending.len();
        pending.clear();
        count
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().expect(MUTEX_POISONED).len()
    }

    /// Returns true if no requests are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
