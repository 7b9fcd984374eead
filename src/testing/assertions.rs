//! Assertions for reader and sink tests.

use crate::driver::MemoryDriver;
use crate::record::{Record, Value};
use std::fmt::Debug;

/// Assert every connection and cursor opened through `driver` was released.
///
/// # Panics
///
/// Panics naming the counts when anything is still open.
pub fn assert_no_leaks(driver: &MemoryDriver) {
    let (connections, cursors) = (driver.open_connections(), driver.open_cursors());
    assert!(
        connections == 0 && cursors == 0,
        "Resources leaked:\n  Open connections: {connections}\n  Open cursors: {cursors}"
    );
}

/// Values of one column across `records`, in order.
///
/// # Panics
///
/// Panics if a record has no field `name`.
#[must_use]
pub fn column_values(records: &[Record], name: &str) -> Vec<Value> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.get(name)
                .cloned()
                .unwrap_or_else(|| panic!("Record {i} has no field '{name}': {r:?}"))
        })
        .collect()
}

/// Assert `actual` and `expected` are equal in order and content.
///
/// # Panics
///
/// Panics at the first differing index, or on a length mismatch.
pub fn assert_values_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a, e, "Mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}");
    }
}
