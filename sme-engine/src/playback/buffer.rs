//! Output buffer
//!
//! Bounded, time-ordered window of decoded units around the presentation
//! time. Entries are kept strictly increasing by timestamp; an insert whose
//! timestamp is already present is dropped, and overflow evicts the oldest
//! entries.

use crate::media::BufferedUnit;
use serde::Serialize;
use sme_common::time::{approx_eq, TIME_EPSILON};
use std::collections::VecDeque;

/// Time span covered by the buffer: `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferRange {
    pub start: f64,
    pub end: f64,
}

impl BufferRange {
    pub const EMPTY: BufferRange = BufferRange {
        start: 0.0,
        end: 0.0,
    };

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start - TIME_EPSILON && time < self.end - TIME_EPSILON
    }
}

#[derive(Debug)]
pub struct OutputBuffer {
    units: VecDeque<BufferedUnit>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            units: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert in timestamp order.
    ///
    /// Returns false when a unit with the same timestamp is already buffered.
    pub fn insert(&mut self, unit: BufferedUnit) -> bool {
        let idx = self
            .units
            .partition_point(|u| u.timestamp < unit.timestamp - TIME_EPSILON);
        if let Some(existing) = self.units.get(idx) {
            if approx_eq(existing.timestamp, unit.timestamp) {
                return false;
            }
        }

        self.units.insert(idx, unit);
        while self.units.len() > self.capacity {
            self.units.pop_front();
        }
        true
    }

    /// Unit to present at `time`.
    ///
    /// Strict lookups only return a unit whose interval contains `time`.
    /// Otherwise the latest unit starting at or before `time` is returned,
    /// or the first unit when `time` precedes everything buffered.
    pub fn find_at(&self, time: f64, strict: bool) -> Option<&BufferedUnit> {
        let upper = time + TIME_EPSILON;
        let idx = self.units.partition_point(|u| u.timestamp <= upper);

        if idx == 0 {
            return if strict { None } else { self.units.front() };
        }

        let candidate = &self.units[idx - 1];
        if !strict || candidate.contains(time) {
            Some(candidate)
        } else {
            None
        }
    }

    /// Evict units that ended at or before `time - keep_past`.
    ///
    /// Returns the number of units removed.
    pub fn trim_before(&mut self, time: f64, keep_past: f64) -> usize {
        let cutoff = time - keep_past + TIME_EPSILON;
        let before = self.units.len();
        self.units.retain(|u| u.end() > cutoff);
        before - self.units.len()
    }

    /// `[first timestamp, last end)`, or `None` when empty
    pub fn range(&self) -> Option<BufferRange> {
        let first = self.units.front()?;
        Some(BufferRange {
            start: first.timestamp,
            end: self.last_end().unwrap_or(first.end()),
        })
    }

    /// End of the latest buffered unit
    pub fn last_end(&self) -> Option<f64> {
        self.units.back().map(|u| u.end())
    }

    pub fn contains_timestamp(&self, timestamp: f64) -> bool {
        let idx = self
            .units
            .partition_point(|u| u.timestamp < timestamp - TIME_EPSILON);
        self.units
            .get(idx)
            .is_some_and(|u| approx_eq(u.timestamp, timestamp))
    }

    /// Whether `time` falls inside the buffered range
    pub fn covers(&self, time: f64) -> bool {
        self.range().is_some_and(|r| r.contains(time))
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.units.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedUnit> {
        self.units.iter()
    }
}
