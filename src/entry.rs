//! Managed Entry Module
//!
//! Defines the canonical stored record (payload + creation time + expiration),
//! the clock abstraction used to evaluate expiration, and TTL validation.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Payload stored under a key. Opaque to the core.
pub type Document = serde_json::Map<String, serde_json::Value>;

// == Clock ==
/// Source of wall-clock time for expiration checks.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to simulate expiry.
#[derive(Debug)]
pub struct ManualClock {
    start: DateTime<Utc>,
    offset_ms: AtomicI64,
}

impl ManualClock {
    /// Creates a manual clock frozen at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a manual clock frozen at `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            offset_ms: AtomicI64::new(0),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: StdDuration) {
        self.offset_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Moves the clock forward by a number of (possibly fractional) seconds.
    pub fn advance_secs(&self, secs: f64) {
        self.offset_ms
            .fetch_add((secs * 1000.0).round() as i64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.start + Duration::milliseconds(self.offset_ms.load(Ordering::SeqCst))
    }
}

// == Managed Entry ==
/// A stored value with its creation time and expiration metadata.
///
/// Serialized as a flat record:
/// `{ value, created_at, ttl_seconds, expires_at }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedEntry {
    /// The stored payload
    pub value: Document,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Requested lifetime in seconds, None = never expires
    pub ttl_seconds: Option<f64>,
    /// `created_at + ttl_seconds`, None = never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl ManagedEntry {
    // == Constructor ==
    /// Creates a new entry, computing `expires_at` from `ttl_seconds`.
    ///
    /// The TTL is expected to have passed [`prepare_ttl`] already.
    pub fn new(value: Document, ttl_seconds: Option<f64>, now: DateTime<Utc>) -> Result<Self> {
        let expires_at = match ttl_seconds {
            Some(ttl) => Some(expiry_from(now, ttl)?),
            None => None,
        };

        Ok(Self {
            value,
            created_at: now,
            ttl_seconds,
            expires_at,
        })
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now >= expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns the remaining lifetime in seconds at `now`.
    ///
    /// - `None` if the entry never expires
    /// - `Some(0.0)` once it has expired
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Option<f64> {
        self.expires_at.map(|expires| {
            let remaining_ms = (expires - now).num_milliseconds();
            if remaining_ms > 0 {
                remaining_ms as f64 / 1000.0
            } else {
                0.0
            }
        })
    }

    // == Serialization ==
    /// Serializes the entry as its flat JSON record.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| KvError::Serialization(e.to_string()))
    }

    /// Decodes an entry from its flat JSON record.
    ///
    /// `expires_at` is re-derived from `created_at + ttl_seconds` whenever
    /// a TTL is present, so a stale stored expiry is never trusted.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut entry: ManagedEntry =
            serde_json::from_str(json).map_err(|e| KvError::Deserialization(e.to_string()))?;

        if let Some(ttl) = entry.ttl_seconds {
            entry.expires_at = Some(
                expiry_from(entry.created_at, ttl)
                    .map_err(|e| KvError::Deserialization(e.to_string()))?,
            );
        }

        Ok(entry)
    }
}

fn expiry_from(start: DateTime<Utc>, ttl_seconds: f64) -> Result<DateTime<Utc>> {
    let ms = ((ttl_seconds * 1000.0).floor() as i64).clamp(-i64::MAX, i64::MAX);
    start
        .checked_add_signed(Duration::milliseconds(ms))
        .ok_or_else(|| KvError::InvalidTtl(format!("{ttl_seconds} is out of range")))
}

/// Returns the size in bytes of the value's JSON encoding.
pub fn estimate_serialized_size(value: &Document) -> Result<usize> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(|e| KvError::Serialization(e.to_string()))
}

// == TTL Preparation ==
/// Validates a TTL for a put.
///
/// `None` passes through. Zero, negative, NaN, infinite and sub-millisecond
/// values (which round down to a non-positive lifetime) are rejected.
pub fn prepare_ttl(ttl: Option<f64>) -> Result<Option<f64>> {
    match ttl {
        None => Ok(None),
        Some(t) if !t.is_finite() => Err(KvError::InvalidTtl(format!("{t} is not finite"))),
        Some(t) if (t * 1000.0).floor() < 1.0 => Err(KvError::InvalidTtl(format!(
            "{t} must be at least 0.001 seconds"
        ))),
        Some(t) => Ok(Some(t)),
    }
}

/// TTL argument of a batch put.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchTtl {
    /// One TTL (or none) applied to every key
    Uniform(Option<f64>),
    /// One TTL per key, aligned by position
    PerKey(Vec<Option<f64>>),
}

impl Default for BatchTtl {
    fn default() -> Self {
        BatchTtl::Uniform(None)
    }
}

impl From<Option<f64>> for BatchTtl {
    fn from(ttl: Option<f64>) -> Self {
        BatchTtl::Uniform(ttl)
    }
}

impl From<Vec<Option<f64>>> for BatchTtl {
    fn from(ttls: Vec<Option<f64>>) -> Self {
        BatchTtl::PerKey(ttls)
    }
}

impl BatchTtl {
    /// Applies `f` to every TTL while keeping the shape.
    pub fn map<F>(&self, mut f: F) -> Result<BatchTtl>
    where
        F: FnMut(Option<f64>) -> Result<Option<f64>>,
    {
        Ok(match self {
            BatchTtl::Uniform(ttl) => BatchTtl::Uniform(f(*ttl)?),
            BatchTtl::PerKey(ttls) => BatchTtl::PerKey(
                ttls.iter().map(|t| f(*t)).collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

/// Expands and validates a batch TTL into one TTL per key.
pub fn prepare_ttls(ttl: &BatchTtl, count: usize) -> Result<Vec<Option<f64>>> {
    match ttl {
        BatchTtl::Uniform(t) => {
            let t = prepare_ttl(*t)?;
            Ok(vec![t; count])
        }
        BatchTtl::PerKey(ttls) => {
            if ttls.len() != count {
                return Err(KvError::BatchLengthMismatch {
                    what: "ttl values",
                    expected: count,
                    actual: ttls.len(),
                });
            }
            ttls.iter().map(|t| prepare_ttl(*t)).collect()
        }
    }
}
