// src/types/set.rs

//! # Set Type Support
//!
//! Sets are stored as a `HashSet<Vec<u8>>`, providing O(1) insertion,
//! removal, and membership checks. Removing the last member deletes the key.
//!
//! Supported commands:
//! - `SADD`
//! - `SREM`
//! - `SMEMBERS`
//! - `SISMEMBER`
//! - `SCARD`

use std::collections::HashSet;

use crate::engine::kv::{Keyspace, slot_value};
use crate::error::Result;
use crate::types::Value;

/// Execute the SADD command:
/// Add each of `members` to the set stored at `key`.
///
/// # Returns
///
/// The number of members that were not already present.
pub fn sadd(ks: &Keyspace, key: &[u8], members: Vec<Vec<u8>>) -> Result<i64> {
    ks.update(key, |slot| {
        let set = slot_value(slot, || Value::Set(HashSet::new())).as_set_mut()?;
        Ok(members.into_iter().filter(|m| set.insert(m.clone())).count() as i64)
    })
}

/// Execute the SREM command:
/// Remove each of `members` from the set stored at `key`.
///
/// # Returns
///
/// The number of members that existed and were removed.
pub fn srem(ks: &Keyspace, key: &[u8], members: &[Vec<u8>]) -> Result<i64> {
    ks.update(key, |slot| {
        let Some(entry) = slot.as_mut() else {
            return Ok(0);
        };
        let set = entry.value.as_set_mut()?;
        Ok(members.iter().filter(|m| set.remove(m.as_slice())).count() as i64)
    })
}

/// Execute the SMEMBERS command:
/// All members of the set, in no particular order. Empty if the key is missing.
pub fn smembers(ks: &Keyspace, key: &[u8]) -> Result<Vec<Vec<u8>>> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_set()?.iter().cloned().collect()),
        None => Ok(Vec::new()),
    })
}

/// Execute the SISMEMBER command.
pub fn sismember(ks: &Keyspace, key: &[u8], member: &[u8]) -> Result<bool> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_set()?.contains(member)),
        None => Ok(false),
    })
}

/// Execute the SCARD command.
pub fn scard(ks: &Keyspace, key: &[u8]) -> Result<i64> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_set()?.len() as i64),
        None => Ok(0),
    })
}
