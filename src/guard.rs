//! Generation fencing for asynchronous continuations.
//!
//! Every triggering event takes a fresh [`Generation`]. Background work
//! carries the token it started under and may only write the identity if
//! that token is still current and no logout is in progress. Nothing is
//! cancelled; stale results are simply dropped on arrival.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fencing token handed to a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Monotonic generation counter plus logging-out flag.
///
/// Owned by the resolution engine's task; not shared.
#[derive(Debug, Default)]
pub struct GenerationGuard {
    generation: u64,
    logging_out: bool,
}

impl GenerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the generation and return the new token.
    pub fn begin_operation(&mut self) -> Generation {
        self.generation += 1;
        Generation(self.generation)
    }

    pub fn is_current(&self, token: Generation) -> bool {
        token.0 == self.generation && !self.logging_out
    }

    /// Fence out everything in flight and hold the fence until `end_logout`.
    pub fn begin_logout(&mut self) -> Generation {
        self.logging_out = true;
        self.begin_operation()
    }

    pub fn end_logout(&mut self) {
        self.logging_out = false;
    }

    pub fn current(&self) -> Generation {
        Generation(self.generation)
    }

    pub fn is_logging_out(&self) -> bool {
        self.logging_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let guard = GenerationGuard::new();
        assert_eq!(guard.current().value(), 0);
        assert!(!guard.is_logging_out());
    }

    #[test]
    fn test_begin_operation_is_monotonic() {
        let mut guard = GenerationGuard::new();
        let first = guard.begin_operation();
        let second = guard.begin_operation();
        assert!(second > first);
        assert!(!guard.is_current(first));
        assert!(guard.is_current(second));
    }

    #[test]
    fn test_logout_fences_prior_work() {
        let mut guard = GenerationGuard::new();
        let before = guard.begin_operation();

        let during = guard.begin_logout();
        assert!(!guard.is_current(before));
        // even the logout's own token is not current while logging out
        assert!(!guard.is_current(during));

        guard.end_logout();
        assert!(!guard.is_current(before));
        assert!(guard.is_current(during));
    }

    #[test]
    fn test_new_operation_during_logout_waits_for_end() {
        let mut guard = GenerationGuard::new();
        guard.begin_logout();
        let token = guard.begin_operation();
        assert!(!guard.is_current(token));
        guard.end_logout();
        assert!(guard.is_current(token));
    }

    #[test]
    fn test_display() {
        let mut guard = GenerationGuard::new();
        assert_eq!(guard.begin_operation().to_string(), "g1");
    }
}
