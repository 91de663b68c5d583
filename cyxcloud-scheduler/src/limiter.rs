//! Operator limiter
//!
//! Counts in-flight operators per kind flag. Shared by every scheduler the
//! driver runs, so it must tolerate concurrent access.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::operator::{OpKind, Operator};

/// In-flight operator counts, per kind flag
#[derive(Debug, Default)]
pub struct Limiter {
    counts: Mutex<HashMap<OpKind, u64>>,
}

impl Limiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly dispatched operator
    pub fn add_operator(&self, op: &Operator) {
        let mut counts = self.counts.lock();
        for flag in op.kind().flags() {
            *counts.entry(flag).or_default() += 1;
        }
    }

    /// Record a finished or cancelled operator
    pub fn remove_operator(&self, op: &Operator) {
        let mut counts = self.counts.lock();
        for flag in op.kind().flags() {
            if let Some(count) = counts.get_mut(&flag) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Replace all counts with those of `operators`
    pub fn update_counts<'a>(&self, operators: impl IntoIterator<Item = &'a Operator>) {
        let mut fresh: HashMap<OpKind, u64> = HashMap::new();
        for op in operators {
            for flag in op.kind().flags() {
                *fresh.entry(flag).or_default() += 1;
            }
        }
        *self.counts.lock() = fresh;
    }

    /// In-flight operators carrying `kind`
    pub fn operator_count(&self, kind: OpKind) -> u64 {
        self.counts.lock().get(&kind).copied().unwrap_or(0)
    }
}
