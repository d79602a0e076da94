// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A process-wide, memory-bounded allocation counter.
//!
//! An atomic byte counter with a fixed budget: callers reserve bytes before
//! an allocation-heavy operation and the reservation is released on drop.
//! Exposed as an explicit reservation handle rather than a
//! `std::alloc::Allocator` implementation, since the shape actually needed
//! is "reserve/release bytes, fail over budget," not "be a drop-in
//! allocator".

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared, atomically updated byte counter with a fixed budget.
#[derive(Clone)]
pub struct MemoryLimit {
    inner: Arc<Inner>,
}

struct Inner {
    limit: u64,
    used: AtomicU64,
}

impl MemoryLimit {
    /// Creates a new limit of `bytes` bytes.
    #[must_use]
    pub fn new(bytes: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit: bytes,
                used: AtomicU64::new(0),
            }),
        }
    }

    /// The configured budget, in bytes.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.inner.limit
    }

    /// Bytes currently reserved.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.inner.used.load(Ordering::Relaxed)
    }

    /// Bytes still available under the budget.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.inner.limit.saturating_sub(self.used())
    }

    /// Attempts to reserve `bytes`. On success, returns a RAII guard whose
    /// `Drop` releases the reservation; on failure, returns
    /// [`Error::MemoryLimit`] and reserves nothing.
    pub fn try_reserve(&self, bytes: u64) -> Result<ReservationGuard> {
        loop {
            let used = self.inner.used.load(Ordering::Relaxed);
            let new_used = used.saturating_add(bytes);
            if new_used > self.inner.limit {
                return Err(Error::MemoryLimit {
                    requested: bytes,
                    available: self.inner.limit.saturating_sub(used),
                });
            }
            if self
                .inner
                .used
                .compare_exchange_weak(used, new_used, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(ReservationGuard {
                    limit: self.clone(),
                    bytes,
                });
            }
        }
    }
}

/// A held reservation against a [`MemoryLimit`]; releases its bytes when
/// dropped.
pub struct ReservationGuard {
    limit: MemoryLimit,
    bytes: u64,
}

impl ReservationGuard {
    /// Bytes held by this reservation.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        self.limit.inner.used.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn reserve_and_release() {
        let limit = MemoryLimit::new(1_000);
        {
            let guard = limit.try_reserve(400).unwrap();
            assert_eq!(limit.used(), 400);
            assert_eq!(guard.bytes(), 400);
        }
        assert_eq!(limit.used(), 0, "dropping the guard releases the reservation");
    }

    #[test]
    fn reserve_over_budget_fails() {
        let limit = MemoryLimit::new(100);
        let _guard = limit.try_reserve(80).unwrap();
        let err = limit.try_reserve(50).unwrap_err();
        assert!(matches!(err, Error::MemoryLimit { .. }));
    }

    #[test]
    fn zero_budget_rejects_any_reservation() {
        let limit = MemoryLimit::new(0);
        assert!(limit.try_reserve(1).is_err());
    }
}
