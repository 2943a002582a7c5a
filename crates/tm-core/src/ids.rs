//! Job identifiers.
//!
//! Job ids are assigned from a monotonic counter and never reused, so they
//! double as a submission-order key. [`JobIdGenerator`] hands them out and
//! can be seeded past ids recovered from persisted history.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a mix job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Wrap a raw id value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw id value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(Self)
    }
}

impl From<JobId> for u64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Thread-safe source of fresh, strictly increasing [`JobId`]s.
#[derive(Debug)]
pub struct JobIdGenerator {
    next: AtomicU64,
}

impl JobIdGenerator {
    /// Start handing out ids at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Start handing out ids after `last`. `None` when `last` is the largest
    /// representable id.
    pub fn starting_after(last: JobId) -> Option<Self> {
        let next = last.0.checked_add(1)?;
        Some(Self {
            next: AtomicU64::new(next),
        })
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> JobId {
        JobId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for JobIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_are_strictly_increasing() {
        let ids = JobIdGenerator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert!(b > a);
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
    }

    #[test]
    fn starting_after_skips_recovered_ids() {
        let ids = JobIdGenerator::starting_after(JobId::from_raw(41)).unwrap();
        assert_eq!(ids.next_id(), JobId::from_raw(42));
    }

    #[test]
    fn starting_after_max_id_is_refused() {
        assert!(JobIdGenerator::starting_after(JobId::from_raw(u64::MAX)).is_none());
        assert!(JobIdGenerator::starting_after(JobId::from_raw(u64::MAX - 1)).is_some());
    }

    #[test]
    fn display_and_from_str() {
        let id = JobId::from_raw(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!("7".parse::<JobId>().unwrap(), id);
        assert_eq!("#7".parse::<JobId>().unwrap(), id);
        assert!("seven".parse::<JobId>().is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let id = JobId::from_raw(12);
        assert_eq!(serde_json::to_string(&id).unwrap(), "12");
        let back: JobId = serde_json::from_str("12").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let ids = Arc::new(JobIdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
