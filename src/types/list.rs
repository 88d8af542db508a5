// src/types/list.rs

//! # List Type Support
//!
//! Lists are stored as a `VecDeque<Vec<u8>>`, giving O(1) push and pop at both
//! ends. Pushing to a missing key creates the list; popping the last element
//! deletes the key.
//!
//! Supported commands:
//! - `LPUSH` / `RPUSH`
//! - `LPOP` / `RPOP`
//! - `LLEN`
//! - `LRANGE`
//! - `LINDEX`
//! - `LSET`

use std::collections::VecDeque;

use crate::engine::kv::{Keyspace, slot_value};
use crate::error::{Result, StoreError};
use crate::types::{Value, normalize_range};

/// Which end of the list a push or pop applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Left,
    Right,
}

/// Resolve a possibly negative index against `len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { len + index } else { index };
    (0..len).contains(&idx).then_some(idx as usize)
}

/// Execute LPUSH / RPUSH:
/// Push every element of `values` onto `end` of the list at `key`, in argument
/// order (so `LPUSH k a b` leaves `b` at the head).
///
/// # Returns
///
/// The new length of the list.
///
/// # Errors
///
/// `WrongType` if `key` holds a non-list value.
pub fn push(ks: &Keyspace, key: &[u8], values: Vec<Vec<u8>>, end: End) -> Result<i64> {
    ks.update(key, |slot| {
        let list = slot_value(slot, || Value::List(VecDeque::new())).as_list_mut()?;
        for v in values {
            match end {
                End::Left => list.push_front(v),
                End::Right => list.push_back(v),
            }
        }
        Ok(list.len() as i64)
    })
}

/// Execute LPOP / RPOP:
/// Remove and return the element at `end`, or `None` if the list is empty or
/// does not exist.
pub fn pop(ks: &Keyspace, key: &[u8], end: End) -> Result<Option<Vec<u8>>> {
    ks.update(key, |slot| {
        let Some(entry) = slot.as_mut() else {
            return Ok(None);
        };
        let list = entry.value.as_list_mut()?;
        Ok(match end {
            End::Left => list.pop_front(),
            End::Right => list.pop_back(),
        })
    })
}

pub fn len(ks: &Keyspace, key: &[u8]) -> Result<i64> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_list()?.len() as i64),
        None => Ok(0),
    })
}

/// Execute LRANGE:
/// Return the elements in `[start, stop]`, supporting negative indices
/// (counting from the end). Out-of-range bounds are clamped; an empty
/// intersection yields an empty vector.
pub fn range(ks: &Keyspace, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
    ks.view(key, |value| {
        let Some(v) = value else {
            return Ok(Vec::new());
        };
        let list = v.as_list()?;
        Ok(match normalize_range(start, stop, list.len()) {
            Some((s, e)) => list.range(s..=e).cloned().collect(),
            None => Vec::new(),
        })
    })
}

/// Execute LINDEX: element at `index`, `None` when out of range.
pub fn index(ks: &Keyspace, key: &[u8], index: i64) -> Result<Option<Vec<u8>>> {
    ks.view(key, |value| match value {
        Some(v) => {
            let list = v.as_list()?;
            Ok(resolve_index(index, list.len()).map(|i| list[i].clone()))
        }
        None => Ok(None),
    })
}

/// Execute LSET: overwrite the element at `index`.
///
/// # Errors
///
/// `NoSuchKey` for a missing key, `OutOfRange` for a bad index.
pub fn set(ks: &Keyspace, key: &[u8], index: i64, value: Vec<u8>) -> Result<()> {
    ks.update(key, |slot| {
        let entry = slot.as_mut().ok_or(StoreError::NoSuchKey)?;
        let list = entry.value.as_list_mut()?;
        let i = resolve_index(index, list.len())
            .ok_or_else(|| StoreError::OutOfRange("index out of range".into()))?;
        list[i] = value;
        Ok(())
    })
}
