//! Store-side timestamps.
//!
//! Timestamps are truncated to microseconds so they survive a round trip
//! through fixed-width RFC 3339 text columns, and a [`MonotonicClock`] never
//! hands out the same instant twice.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SubsecRound as _, TimeDelta, Utc};

/// The current time at microsecond precision.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

/// A clock whose readings are strictly increasing, even when the wall clock
/// stalls or steps backwards.
#[derive(Debug, Default)]
pub struct MonotonicClock {
  last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
  pub fn new() -> Self { Self::default() }

  pub fn tick(&self) -> DateTime<Utc> {
    let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
    let now = now();
    let next = match *last {
      Some(prev) if now <= prev => prev + TimeDelta::microseconds(1),
      _ => now,
    };
    *last = Some(next);
    next
  }
}
