//! Runtime invariant checks with contract-test bookkeeping.
//!
//! Muxer and state-machine code states its invariants with
//! [`check_invariant!`]. Every evaluated invariant is recorded per thread so
//! tests can assert, through [`contract_test`], that the paths they drove
//! actually exercised the checks they rely on.
//!
//! ```rust,ignore
//! check_invariant!(high_point < 2 * ram_size, "Ring cursor stays below twice the buffer size");
//!
//! #[test]
//! fn contract_ring_buffer() {
//!     // ... drive the muxer ...
//!     contract_test("ring buffer", &["Ring cursor stays below twice the buffer size"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread_local;

thread_local! {
    static CHECKED: RefCell<HashMap<&'static str, u64>> = RefCell::new(HashMap::new());
}

/// Check an invariant, recording that it was evaluated.
///
/// Panics with the message when the condition is false.
#[macro_export]
macro_rules! check_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariants::__check_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariants::__check_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __check_invariant_impl(condition: bool, message: &'static str, context: Option<&str>) {
    CHECKED.with(|log| {
        *log.borrow_mut().entry(message).or_insert(0) += 1;
    });

    if !condition {
        panic!(
            "invariant violated [{}]: {}",
            context.unwrap_or("unknown"),
            message
        );
    }
}

/// How many times `message` was checked on this thread
pub fn times_checked(message: &str) -> u64 {
    CHECKED.with(|log| log.borrow().get(message).copied().unwrap_or(0))
}

/// Panic unless every listed invariant was checked on this thread
pub fn contract_test(test_name: &str, required: &[&str]) {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|m| times_checked(m) == 0)
        .collect();

    if !missing.is_empty() {
        panic!(
            "contract [{}] not exercised:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

pub fn clear_invariant_log() {
    CHECKED.with(|log| log.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_invariants_are_counted() {
        clear_invariant_log();
        check_invariant!(true, "always holds");
        check_invariant!(1 + 1 == 2, "always holds", "test");
        assert_eq!(times_checked("always holds"), 2);
        contract_test("counting", &["always holds"]);
    }

    #[test]
    #[should_panic(expected = "not exercised")]
    fn test_contract_reports_missing() {
        clear_invariant_log();
        contract_test("missing", &["never checked"]);
    }

    #[test]
    #[should_panic(expected = "invariant violated [ctx]: broken")]
    fn test_violation_panics() {
        check_invariant!(false, "broken", "ctx");
    }
}
