// src/types/zset.rs

//! # Sorted Set Type Support
//!
//! A sorted set keeps two views of the same members:
//! - `scores`: member -> score, for O(1) score lookup
//! - `ordered`: `(score, member)` in a `BTreeSet`, so iteration yields members
//!   by ascending score with ties broken by byte-wise member comparison
//!
//! Both views are updated together inside a single `Keyspace::update` call,
//! i.e. under the key's shard lock, so no reader ever sees them disagree.
//!
//! Supported commands:
//! - `ZADD`
//! - `ZREM`
//! - `ZSCORE`
//! - `ZINCRBY`
//! - `ZCARD`
//! - `ZRANK`
//! - `ZRANGE`

use std::collections::{BTreeSet, HashMap};

use ordered_float::OrderedFloat;

use crate::engine::kv::{Keyspace, slot_value};
use crate::error::{Result, StoreError};
use crate::types::{Value, normalize_range};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    scores: HashMap<Vec<u8>, f64>,
    ordered: BTreeSet<(OrderedFloat<f64>, Vec<u8>)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Insert `member` or move it to `score`. Returns `true` if the member is new.
    pub fn insert(&mut self, member: Vec<u8>, score: f64) -> bool {
        debug_assert!(!score.is_nan(), "NaN scores must be rejected before insert");
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                if old != score {
                    self.ordered.remove(&(OrderedFloat(old), member.clone()));
                    self.ordered.insert((OrderedFloat(score), member));
                }
                false
            }
            None => {
                self.ordered.insert((OrderedFloat(score), member));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(OrderedFloat(score), member.to_vec()));
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Add `delta` to the member's score (missing members start at 0).
    pub fn incr(&mut self, member: Vec<u8>, delta: f64) -> Result<f64> {
        let score = self.score(&member).unwrap_or(0.0) + delta;
        if score.is_nan() {
            return Err(StoreError::InvalidArgument(
                "resulting score is not a number (NaN)".into(),
            ));
        }
        self.insert(member, score);
        Ok(score)
    }

    /// Zero-based position of `member` in score order
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        let key = (OrderedFloat(score), member.to_vec());
        Some(self.ordered.range(..key).count())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], f64)> {
        self.ordered.iter().map(|(s, m)| (m.as_slice(), s.into_inner()))
    }

    pub fn range(&self, start: i64, stop: i64) -> Vec<(Vec<u8>, f64)> {
        match normalize_range(start, stop, self.len()) {
            Some((s, e)) => self
                .iter()
                .skip(s)
                .take(e - s + 1)
                .map(|(m, score)| (m.to_vec(), score))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// ZADD key score member [score member ...]
/// Returns the number of newly added members; existing members are re-scored.
pub fn zadd(ks: &Keyspace, key: &[u8], pairs: Vec<(f64, Vec<u8>)>) -> Result<i64> {
    ks.update(key, |slot| {
        let zset = slot_value(slot, || Value::SortedSet(SortedSet::new())).as_sorted_set_mut()?;
        let mut added = 0;
        for (score, member) in pairs {
            if zset.insert(member, score) {
                added += 1;
            }
        }
        Ok(added)
    })
}

/// ZREM key member [member ...]
pub fn zrem(ks: &Keyspace, key: &[u8], members: &[Vec<u8>]) -> Result<i64> {
    ks.update(key, |slot| {
        let Some(entry) = slot.as_mut() else {
            return Ok(0);
        };
        let zset = entry.value.as_sorted_set_mut()?;
        Ok(members.iter().filter(|m| zset.remove(m)).count() as i64)
    })
}

/// ZSCORE key member
pub fn zscore(ks: &Keyspace, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_sorted_set()?.score(member)),
        None => Ok(None),
    })
}

/// ZINCRBY key delta member
pub fn zincrby(ks: &Keyspace, key: &[u8], delta: f64, member: Vec<u8>) -> Result<f64> {
    ks.update(key, |slot| {
        slot_value(slot, || Value::SortedSet(SortedSet::new()))
            .as_sorted_set_mut()?
            .incr(member, delta)
    })
}

/// ZCARD key
pub fn zcard(ks: &Keyspace, key: &[u8]) -> Result<i64> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_sorted_set()?.len() as i64),
        None => Ok(0),
    })
}

/// ZRANK key member
pub fn zrank(ks: &Keyspace, key: &[u8], member: &[u8]) -> Result<Option<i64>> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_sorted_set()?.rank(member).map(|r| r as i64)),
        None => Ok(None),
    })
}

/// ZRANGE key start stop
pub fn zrange(ks: &Keyspace, key: &[u8], start: i64, stop: i64) -> Result<Vec<(Vec<u8>, f64)>> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_sorted_set()?.range(start, stop)),
        None => Ok(Vec::new()),
    })
}
