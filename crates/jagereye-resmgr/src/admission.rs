//! Worker admission.
//!
//! Decides whether another worker may be created. A slot is taken when a
//! creation is accepted and given back when that creation fails or the
//! running worker is removed.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Capacity gate for new workers.
pub trait Admission: Send + Sync {
    /// Takes a slot. Returns false if none is free.
    fn try_admit(&self) -> bool;

    /// Gives a slot back.
    fn release(&self);

    /// Number of slots in use, when tracked.
    fn in_use(&self) -> Option<usize> {
        None
    }
}

/// Admits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAdmit;

impl Admission for AlwaysAdmit {
    fn try_admit(&self) -> bool {
        true
    }

    fn release(&self) {}
}

/// Admits up to a fixed number of live workers.
///
/// Reservation is increment-then-check, so concurrent requests can never
/// jointly exceed the limit.
#[derive(Debug)]
pub struct CapacityAdmission {
    max_workers: usize,
    in_use: AtomicUsize,
}

impl CapacityAdmission {
    /// Creates a gate with `max_workers` slots.
    #[must_use]
    pub const fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            in_use: AtomicUsize::new(0),
        }
    }
}

impl Admission for CapacityAdmission {
    fn try_admit(&self) -> bool {
        let previous = self.in_use.fetch_add(1, Ordering::AcqRel);
        if previous >= self.max_workers {
            self.in_use.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(max_workers = self.max_workers, "admission refused");
            return false;
        }
        true
    }

    fn release(&self) {
        // Never wraps below zero on a stray release.
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn in_use(&self) -> Option<usize> {
        Some(self.in_use.load(Ordering::Acquire))
    }
}
