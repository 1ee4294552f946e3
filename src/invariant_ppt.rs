//! Runtime invariants with contract-test bookkeeping
//!
//! Controllers assert their state invariants every frame through
//! [`assert_invariant!`]. Each checked invariant is recorded per thread so
//! contract tests can prove the checks actually ran.
//!
//! ```rust,ignore
//! use ipa3a::invariant_ppt::*;
//!
//! assert_invariant!(
//!     position >= previous,
//!     "AF scan position never decreases within a scan",
//!     "af"
//! );
//!
//! #[test]
//! fn contract_af_scan() {
//!     // drive a scan, then
//!     contract_test("af scan", &["AF scan position never decreases within a scan"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::thread_local;

/// Scan position is non-decreasing inside one scan episode
pub const AF_SCAN_MONOTONIC: &str = "AF scan position never decreases within a scan";
/// The filtered exposure is bounded by the longest shutter at the highest gain
pub const AGC_FILTERED_BOUNDED: &str = "AGC filtered exposure stays within [0, max shutter x max gain]";
/// The split never leaves the configured shutter and gain ranges
pub const AGC_SPLIT_IN_RANGE: &str = "AGC shutter and gain stay within their session limits";

thread_local! {
    static INVARIANT_LOG: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Assert an invariant and log it for contract testing.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    INVARIANT_LOG.with(|log| {
        if !log.borrow().contains(message) {
            log.borrow_mut().insert(message.to_string());
        }
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Check that specific invariants were verified on this thread.
///
/// # Panics
/// Panics if any required invariant was not checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = INVARIANT_LOG.with(|log| {
        let log = log.borrow();
        required_invariants
            .iter()
            .copied()
            .filter(|invariant| !log.contains(*invariant))
            .collect()
    });

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Clear the invariant log
pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().clear();
    });
}
