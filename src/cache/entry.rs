//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support and
//! access metadata.

use std::time::{Duration, Instant};

// == Cache Entry ==
/// A single cached value with its lifetime and access metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// When the entry was inserted (or last replaced)
    pub created_at: Instant,
    /// How long the entry stays valid after `created_at`
    pub ttl: Duration,
    /// Number of successful reads since insertion
    pub access_count: u64,
    /// Last successful read, or insertion time if never read
    pub last_accessed_at: Instant,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry valid for `ttl`.
    pub fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once its age reaches the TTL, so a zero TTL is
    /// expired immediately.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    /// Marks a successful read.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Instant::now();
    }

    /// Time since insertion.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    // == Time To Live ==
    /// Returns remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.age())
    }
}

// == Entry Info ==
/// Metadata snapshot of an entry, without the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub age: Duration,
    pub ttl_remaining: Duration,
    pub access_count: u64,
    pub idle: Duration,
}

impl<V> From<&CacheEntry<V>> for EntryInfo {
    fn from(entry: &CacheEntry<V>) -> Self {
        Self {
            age: entry.age(),
            ttl_remaining: entry.ttl_remaining(),
            access_count: entry.access_count,
            idle: entry.last_accessed_at.elapsed(),
        }
    }
}
