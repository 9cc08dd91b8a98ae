//! # Tablebook Testing
//!
//! Testing utilities and in-memory adapters for tablebook.
//!
//! This crate provides:
//! - Deterministic clocks
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - [`InMemoryReservationStore`], a complete `ReservationStore` + `AuditLog`
//!   that also backs single-process deployments
//! - Notifiers that record, fail or hang
//! - proptest strategies for domain values
//!
//! ## Example
//!
//! ```ignore
//! use tablebook_testing::{InMemoryReservationStore, test_clock};
//!
//! #[tokio::test]
//! async fn booking_flow() {
//!     let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4), (6, 2)]));
//!     let mutator = ReservationMutator::new(store.clone(), venue(), Arc::new(test_clock()));
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use tablebook_core::environment::Clock;

mod in_memory;
mod notifiers;

pub use in_memory::InMemoryReservationStore;
pub use notifiers::{FailingNotifier, HangingNotifier, RecordingNotifier};
pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tablebook_testing::mocks::FixedClock;
    /// use tablebook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock whose time the test moves forward by hand
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            if let Ok(mut guard) = self.time.write() {
                *guard = time;
            }
        }

        /// Move forward by `delta`
        pub fn advance(&self, delta: chrono::Duration) {
            if let Ok(mut guard) = self.time.write() {
                *guard += delta;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .read()
                .map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
        }
    }

    /// Create a default fixed clock for tests (2025-06-01 09:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-06-01T09:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use tablebook_core::table::TableId;

    /// Table ids drawn from a small room so sequences revisit tables
    pub fn table_id(room_size: u32) -> impl Strategy<Value = TableId> {
        (1..=room_size.max(1)).prop_map(TableId::new)
    }

    /// Arbitrary click sequences over a room of `room_size` tables
    pub fn clicks(room_size: u32, max_len: usize) -> impl Strategy<Value = Vec<TableId>> {
        prop::collection::vec(table_id(room_size), 0..=max_len)
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_manual_clock_advances_all_clones() {
        let clock = ManualClock::new(test_clock().now());
        let shared = clock.clone();

        clock.advance(chrono::Duration::minutes(30));

        assert_eq!(shared.now(), test_clock().now() + chrono::Duration::minutes(30));
    }
}
