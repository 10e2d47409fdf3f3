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

//! Copy-on-write observer lists.
//!
//! Registration and removal swap in a new snapshot under a short lock, while firing iterates
//! the snapshot current at the time of the call without holding any lock. Observers may
//! therefore register or unregister (themselves included) from inside a notification.

use std::{
    fmt::Debug,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::MUTEX_POISONED;

/// A shared callback notified with a borrowed value.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies a registered observer within its [`ObserverList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Returns the raw identifier value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

type Snapshot<T> = Arc<Vec<(ObserverId, Observer<T>)>>;

/// An ordered set of observers with copy-on-write snapshots.
///
/// Observers are deduplicated by identity: registering the same `Arc` twice returns the
/// identifier of the existing registration.
pub struct ObserverList<T> {
    name: String,
    next_id: AtomicU64,
    observers: Mutex<Snapshot<T>>,
}

impl<T> Debug for ObserverList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ObserverList))
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

impl<T> ObserverList<T> {
    /// Creates a new empty [`ObserverList`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
            observers: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Returns the name of the list, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an observer, returning its identifier.
    pub fn register(&self, observer: Observer<T>) -> ObserverId {
        let mut guard = self.observers.lock().expect(MUTEX_POISONED);

        if let Some((id, _)) = guard
            .iter()
            .find(|(_, existing)| Arc::ptr_eq(existing, &observer))
        {
            return *id;
        }

        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut copy = Vec::with_capacity(guard.len() + 1);
        copy.extend(guard.iter().cloned());
        copy.push((id, observer));
        *guard = Arc::new(copy);
        id
    }

    /// Unregisters the observer with the given identifier.
    ///
    /// Returns `true` if an observer was removed.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut guard = self.observers.lock().expect(MUTEX_POISONED);

        if !guard.iter().any(|(existing, _)| *existing == id) {
            return false;
        }

        let copy: Vec<_> = guard
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        *guard = Arc::new(copy);
        true
    }

    /// Returns true if the observer with the given identifier is registered.
    #[must_use]
    pub fn contains(&self, id: ObserverId) -> bool {
        self.snapshot().iter().any(|(existing, _)| *existing == id)
    }

    /// Removes every observer.
    pub fn clear(&self) {
        *self.observers.lock().expect(MUTEX_POISONED) = Arc::new(Vec::new());
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns true if no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Notifies every observer registered at the time of the call, in registration order.
    pub fn fire(&self, value: &T) {
        let snapshot = self.snapshot();
        for (_, observer) in snapshot.iter() {
            observer(value);
        }
    }

    fn snapshot(&self) -> Snapshot<T> {
        Arc::clone(&self.observers.lock().expect(MUTEX_POISONED))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn recording() -> (Observer<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let observer: Observer<u32> = Arc::new(move |value: &u32| {
            seen_clone.lock().unwrap().push(*value);
        });
        (observer, seen)
    }

    #[rstest]
    fn test_fire_in_registration_order() {
        let list = ObserverList::<u32>::new("test");
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let order = order.clone();
            list.register(Arc::new(move |_: &u32| order.lock().unwrap().push(tag)));
        }

        list.fire(&1);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[rstest]
    fn test_register_same_observer_is_deduplicated() {
        let list = ObserverList::new("test");
        let (observer, seen) = recording();

        let first = list.register(observer.clone());
        let second = list.register(observer);

        assert_eq!(first, second);
        assert_eq!(list.len(), 1);

        list.fire(&7);
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[rstest]
    fn test_unregister() {
        let list = ObserverList::new("test");
        let (observer, seen) = recording();
        let id = list.register(observer);

        assert!(list.contains(id));
        assert!(list.unregister(id));
        assert!(!list.unregister(id));
        assert!(list.is_empty());

        list.fire(&1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[rstest]
    fn test_observer_can_unregister_itself_while_firing() {
        let list = Arc::new(ObserverList::<u32>::new("test"));
        let id_slot = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let observer: Observer<u32> = {
            let list = list.clone();
            let id_slot = id_slot.clone();
            let calls = calls.clone();
            Arc::new(move |_: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *id_slot.lock().unwrap() {
                    list.unregister(id);
                }
            })
        };
        *id_slot.lock().unwrap() = Some(list.register(observer));

        list.fire(&1);
        list.fire(&2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(list.is_empty());
    }

    #[rstest]
    fn test_registration_during_fire_applies_to_next_fire() {
        let list = Arc::new(ObserverList::<u32>::new("test"));
        let (late, seen) = recording();

        let list_clone = list.clone();
        list.register(Arc::new(move |_: &u32| {
            list_clone.register(late.clone());
        }));

        list.fire(&1);
        assert!(seen.lock().unwrap().is_empty());

        list.fire(&2);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }
}
