// src/engine/kv.rs

//! The key space: key -> (value, optional deadline).
//!
//! Entries live in a `DashMap` split into `shard_count` shards, so commands on
//! keys in different shards never contend. A single-key command runs entirely
//! inside one shard guard (`view` / `update`), which makes every
//! read-modify-write atomic with respect to other commands on the same key.
//!
//! Operations that write several keys at once (`rename`, `set_many`,
//! `delete_many`, `keys`, `flush`) take the store-wide `structure` lock
//! exclusively; everything else holds it shared. `view_many` holds the shared
//! lock across all of its keys, so it never observes half of a batch.
//! Lock order is always `structure` -> shard -> expiry index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::expire::{ExpiryManager, deadline_after, is_expired, now_ms};
use crate::types::Value;

/// One stored key: its value and optional absolute deadline (unix millis)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub expire_at: Option<u64>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Entry { value, expire_at: None }
    }
}

/// Return the value in `slot`, creating it with `init` if the key is absent.
pub(crate) fn slot_value(slot: &mut Option<Entry>, init: impl FnOnce() -> Value) -> &mut Value {
    &mut slot.get_or_insert_with(|| Entry::new(init())).value
}

pub struct Keyspace {
    pub(crate) entries: DashMap<Vec<u8>, Entry>,
    pub(crate) expiry: ExpiryManager,
    pub(crate) structure: RwLock<()>,
    version: AtomicU64,
    expired: AtomicU64,
}

impl Keyspace {
    pub fn new(cfg: &StoreConfig) -> Self {
        let shards = cfg.shard_count.max(2).next_power_of_two();
        Keyspace {
            entries: DashMap::with_shard_amount(shards),
            expiry: ExpiryManager::new(cfg),
            structure: RwLock::new(()),
            version: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Monotonic modification counter, bumped by every mutating operation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn bump(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Total keys reclaimed by lazy or active expiry since startup
    pub fn expired_keys(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    pub(crate) fn note_expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    /// Read-only access to a live value. An expired entry is reclaimed and
    /// reported as absent.
    ///
    /// `f` runs while the shard is read-locked and must not call back into
    /// the key space.
    pub fn view<R>(&self, key: &[u8], f: impl FnOnce(Option<&Value>) -> R) -> R {
        let _structure = self.structure.read();
        self.view_locked(key, now_ms(), f)
    }

    /// `view` over several keys under one hold of the structure lock.
    pub fn view_many<R>(&self, keys: &[Vec<u8>], mut f: impl FnMut(Option<&Value>) -> R) -> Vec<R> {
        let _structure = self.structure.read();
        let now = now_ms();
        keys.iter().map(|key| self.view_locked(key, now, &mut f)).collect()
    }

    /// Caller holds `structure`.
    fn view_locked<R>(&self, key: &[u8], now: u64, f: impl FnOnce(Option<&Value>) -> R) -> R {
        match self.entries.get(key) {
            Some(entry) if !is_expired(&entry, now) => return f(Some(&entry.value)),
            Some(_) => {}
            None => return f(None),
        }
        self.remove_expired(key, now);
        f(None)
    }

    /// Read-modify-write on one key under its shard's write lock.
    ///
    /// `f` sees `None` for absent or expired keys. Whatever `f` leaves in the
    /// slot is stored back; `None` or an emptied aggregate deletes the key.
    pub fn update<R>(&self, key: &[u8], f: impl FnOnce(&mut Option<Entry>) -> R) -> R {
        let _structure = self.structure.read();
        let now = now_ms();
        let result = match self.entries.entry(key.to_vec()) {
            MapEntry::Occupied(mut occ) => {
                let had_ttl = occ.get().expire_at.is_some();
                let mut slot = if is_expired(occ.get(), now) {
                    self.note_expired(1);
                    debug!(key = %String::from_utf8_lossy(key), "lazily expired key");
                    None
                } else {
                    Some(std::mem::take(occ.get_mut()))
                };
                let result = f(&mut slot);
                match slot.filter(|e| !e.value.is_empty_aggregate()) {
                    Some(entry) => {
                        let has_ttl = entry.expire_at.is_some();
                        *occ.get_mut() = entry;
                        if has_ttl && !had_ttl {
                            self.expiry.track(key);
                        } else if had_ttl && !has_ttl {
                            self.expiry.untrack(key);
                        }
                    }
                    None => {
                        occ.remove();
                        if had_ttl {
                            self.expiry.untrack(key);
                        }
                    }
                }
                result
            }
            MapEntry::Vacant(vac) => {
                let mut slot = None;
                let result = f(&mut slot);
                if let Some(entry) = slot.filter(|e| !e.value.is_empty_aggregate()) {
                    if entry.expire_at.is_some() {
                        self.expiry.track(key);
                    }
                    vac.insert(entry);
                }
                result
            }
        };
        self.bump();
        result
    }

    /// Snapshot of the live value stored at `key`
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.view(key, |value| value.cloned())
    }

    /// Snapshot of the live entry at `key`, deadline included
    pub fn entry(&self, key: &[u8]) -> Option<Entry> {
        let _structure = self.structure.read();
        let now = now_ms();
        match self.entries.get(key) {
            Some(entry) if !is_expired(&entry, now) => return Some(entry.clone()),
            Some(_) => {}
            None => return None,
        }
        self.remove_expired(key, now);
        None
    }

    /// Store `value` at `key`, replacing whatever was there (any type).
    pub fn set(&self, key: &[u8], value: Value, ttl: Option<Duration>) {
        let now = now_ms();
        let expire_at = ttl.and_then(|d| deadline_after(now, d));
        self.update(key, |slot| {
            *slot = Some(Entry { value, expire_at });
        });
    }

    /// Remove `key`. Returns whether a live entry was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.update(key, |slot| slot.take().is_some())
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.view(key, |value| value.is_some())
    }

    /// Store every pair as one atomic batch; no reader sees part of it.
    /// A key repeated in `pairs` ends up with its last value.
    pub fn set_many(&self, pairs: Vec<(Vec<u8>, Value)>) {
        let _structure = self.structure.write();
        for (key, value) in pairs {
            let old = self.entries.insert(key.clone(), Entry::new(value));
            if old.is_some_and(|e| e.expire_at.is_some()) {
                self.expiry.untrack(&key);
            }
        }
        self.bump();
    }

    /// Remove every key in `keys` as one atomic batch. Returns how many live
    /// entries were removed; a key listed twice counts once.
    pub fn delete_many(&self, keys: &[Vec<u8>]) -> usize {
        let _structure = self.structure.write();
        let now = now_ms();
        let mut removed = 0;
        for key in keys {
            if self.remove_expired(key, now) {
                continue;
            }
            if let Some((_, entry)) = self.entries.remove(key) {
                if entry.expire_at.is_some() {
                    self.expiry.untrack(key);
                }
                removed += 1;
            }
        }
        if removed > 0 {
            self.bump();
        }
        removed
    }

    /// Move `src` to `dst`, overwriting `dst`. The TTL travels with the value.
    pub fn rename(&self, src: &[u8], dst: &[u8]) -> Result<()> {
        self.rename_inner(src, dst, false).map(|_| ())
    }

    /// Like `rename`, but leaves an existing `dst` alone and returns `false`.
    pub fn rename_nx(&self, src: &[u8], dst: &[u8]) -> Result<bool> {
        self.rename_inner(src, dst, true)
    }

    fn rename_inner(&self, src: &[u8], dst: &[u8], only_if_absent: bool) -> Result<bool> {
        let _structure = self.structure.write();
        let now = now_ms();
        self.remove_expired(src, now);
        self.remove_expired(dst, now);

        if !self.entries.contains_key(src) {
            return Err(StoreError::NoSuchKey);
        }
        if src == dst {
            return Ok(!only_if_absent);
        }
        if only_if_absent && self.entries.contains_key(dst) {
            return Ok(false);
        }

        let (_, entry) = self.entries.remove(src).ok_or(StoreError::NoSuchKey)?;
        if entry.expire_at.is_some() {
            self.expiry.untrack(src);
            self.expiry.track(dst);
        } else {
            self.expiry.untrack(dst);
        }
        self.entries.insert(dst.to_vec(), entry);
        self.bump();
        debug!(src = %String::from_utf8_lossy(src), dst = %String::from_utf8_lossy(dst), "renamed key");
        Ok(true)
    }

    /// Live keys matching a glob `pattern`, captured atomically.
    ///
    /// The result is a finite snapshot; call again for a fresh one.
    pub fn keys(&self, pattern: &[u8]) -> KeysSnapshot {
        let _structure = self.structure.write();
        let now = now_ms();
        let keys: Vec<Vec<u8>> = self
            .entries
            .iter()
            .filter(|e| !is_expired(e.value(), now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        KeysSnapshot { keys: keys.into_iter(), version: self.version() }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let _structure = self.structure.read();
        let now = now_ms();
        self.entries.iter().filter(|e| !is_expired(e.value(), now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key
    pub fn flush(&self) {
        let _structure = self.structure.write();
        self.entries.clear();
        self.expiry.clear();
        self.bump();
    }

    /// Remove `key` if its entry is expired at `now`. Caller holds `structure`.
    pub(crate) fn remove_expired(&self, key: &[u8], now: u64) -> bool {
        let removed = self.entries.remove_if(key, |_, e| {
            let expired = is_expired(e, now);
            if expired {
                self.expiry.untrack(key);
            }
            expired
        });
        if removed.is_some() {
            self.bump();
            self.note_expired(1);
            debug!(key = %String::from_utf8_lossy(key), "lazily expired key");
            true
        } else {
            false
        }
    }
}

/// Keys captured by `Keyspace::keys`, tagged with the modification counter
/// at capture time.
#[derive(Debug)]
pub struct KeysSnapshot {
    keys: std::vec::IntoIter<Vec<u8>>,
    version: u64,
}

impl KeysSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True if the key space has been modified since the snapshot was taken
    pub fn is_stale(&self, ks: &Keyspace) -> bool {
        ks.version() != self.version
    }
}

impl Iterator for KeysSnapshot {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.keys.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl ExactSizeIterator for KeysSnapshot {}

/// Redis-style glob match over raw bytes: `*`, `?`, `[...]` classes with
/// ranges and `^` negation, and `\` escapes.
pub fn glob_match(pattern: &[u8], input: &[u8]) -> bool {
    let (mut p, mut s) = (0usize, 0usize);
    // position after the last '*' seen, and where the input resumes from it
    let mut backtrack: Option<(usize, usize)> = None;

    while s < input.len() {
        let step = match pattern.get(p).copied() {
            Some(b'*') => {
                backtrack = Some((p + 1, s));
                p += 1;
                continue;
            }
            Some(b'?') => Some(p + 1),
            Some(b'[') => match_class(pattern, p, input[s]),
            Some(b'\\') if p + 1 < pattern.len() => {
                (pattern[p + 1] == input[s]).then_some(p + 2)
            }
            Some(c) => (c == input[s]).then_some(p + 1),
            None => None,
        };

        match (step, backtrack) {
            (Some(next), _) => {
                p = next;
                s += 1;
            }
            (None, Some((star_p, star_s))) => {
                backtrack = Some((star_p, star_s + 1));
                p = star_p;
                s = star_s + 1;
            }
            (None, None) => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Match `c` against the class starting at `pattern[open]` (`[`).
/// Returns the pattern index after the class on success.
fn match_class(pattern: &[u8], open: usize, c: u8) -> Option<usize> {
    let mut i = open + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }
    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == c;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= pattern[i] == c;
            i += 1;
        }
    }
    // an unterminated class behaves as if closed at the end of the pattern
    let end = (i + 1).min(pattern.len());
    (matched != negate).then_some(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn keyspace() -> Keyspace {
        Keyspace::new(&StoreConfig::default())
    }

    fn sorted(snapshot: KeysSnapshot) -> Vec<Vec<u8>> {
        let mut keys: Vec<_> = snapshot.collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_set_get_every_variant() {
        let ks = keyspace();
        let values = vec![
            (b"s".to_vec(), Value::string(b"a\0b".to_vec())),
            (b"empty".to_vec(), Value::string("")),
            (b"l".to_vec(), Value::list([b"x\0".to_vec(), Vec::new()])),
            (b"h".to_vec(), Value::hash([(b"\0f".to_vec(), b"v".to_vec())])),
            (b"set".to_vec(), Value::set(["m1", "m2"])),
            (b"z".to_vec(), Value::sorted_set([("a", 1.5), ("b", -2.0)])),
            (b"k\0ey".to_vec(), Value::string("nul in key")),
        ];
        for (k, v) in &values {
            ks.set(k, v.clone(), None);
        }
        for (k, v) in &values {
            assert_eq!(ks.get(k).as_ref(), Some(v));
        }
        assert_eq!(ks.len(), values.len());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let ks = keyspace();
        ks.set(b"k", Value::string("v"), None);
        assert!(ks.exists(b"k"));
        assert!(ks.delete(b"k"));
        assert!(!ks.delete(b"k"));
        assert!(!ks.exists(b"k"));
        assert_eq!(ks.get(b"k"), None);
    }

    #[test]
    fn test_overwrite_with_other_type() {
        let ks = keyspace();
        ks.set(b"k", Value::list(["a"]), None);
        ks.set(b"k", Value::string("now a string"), None);
        assert_eq!(ks.get(b"k"), Some(Value::string("now a string")));
    }

    #[test]
    fn test_update_drops_emptied_aggregate() {
        let ks = keyspace();
        ks.set(b"l", Value::list(["only"]), None);
        let popped = ks.update(b"l", |slot| {
            slot.as_mut().and_then(|e| match &mut e.value {
                Value::List(l) => l.pop_front(),
                _ => None,
            })
        });
        assert_eq!(popped, Some(b"only".to_vec()));
        assert!(!ks.exists(b"l"));

        // creating an empty aggregate stores nothing
        ks.update(b"never", |slot| *slot = Some(Entry::new(Value::List(VecDeque::new()))));
        assert!(!ks.exists(b"never"));
    }

    #[test]
    fn test_set_many_and_delete_many() {
        let ks = keyspace();
        ks.set(b"a", Value::list(["old"]), Some(Duration::from_secs(60)));
        ks.set_many(vec![
            (b"a".to_vec(), Value::string("1")),
            (b"b".to_vec(), Value::string("2")),
            (b"b".to_vec(), Value::string("3")),
        ]);
        assert_eq!(ks.get(b"a"), Some(Value::string("1")));
        assert_eq!(ks.get(b"b"), Some(Value::string("3")));
        // overwriting drops the old TTL
        assert_eq!(ks.entry(b"a").and_then(|e| e.expire_at), None);
        assert_eq!(ks.expiry.tracked(), 0);

        let got = ks.view_many(&[b"a".to_vec(), b"nope".to_vec(), b"b".to_vec()], |v| v.cloned());
        assert_eq!(got, vec![Some(Value::string("1")), None, Some(Value::string("3"))]);

        let v = ks.version();
        assert_eq!(ks.delete_many(&[b"a".to_vec(), b"a".to_vec(), b"nope".to_vec(), b"b".to_vec()]), 2);
        assert!(ks.is_empty());
        assert!(ks.version() > v);

        // nothing removed, nothing bumped
        let v = ks.version();
        assert_eq!(ks.delete_many(&[b"a".to_vec()]), 0);
        assert_eq!(ks.version(), v);
    }

    #[test]
    fn test_rename() {
        let ks = keyspace();
        ks.set(b"a", Value::string("1"), None);
        ks.set(b"b", Value::list(["old"]), None);

        ks.rename(b"a", b"b").unwrap();
        assert!(!ks.exists(b"a"));
        assert_eq!(ks.get(b"b"), Some(Value::string("1")));

        assert_eq!(ks.rename(b"missing", b"x"), Err(StoreError::NoSuchKey));

        ks.set(b"c", Value::string("2"), None);
        assert_eq!(ks.rename_nx(b"c", b"b"), Ok(false));
        assert_eq!(ks.rename_nx(b"c", b"d"), Ok(true));
        assert_eq!(ks.get(b"d"), Some(Value::string("2")));

        // same name is a no-op
        ks.rename(b"d", b"d").unwrap();
        assert!(ks.exists(b"d"));
    }

    #[test]
    fn test_version_bumps_on_mutation() {
        let ks = keyspace();
        let v0 = ks.version();
        ks.set(b"a", Value::string("1"), None);
        let v1 = ks.version();
        assert!(v1 > v0);

        // reads do not bump
        let _ = ks.get(b"a");
        let _ = ks.exists(b"a");
        assert_eq!(ks.version(), v1);

        ks.delete(b"a");
        assert!(ks.version() > v1);
    }

    #[test]
    fn test_keys_snapshot() {
        let ks = keyspace();
        for k in ["user:1", "user:2", "order:1", "user:10"] {
            ks.set(k.as_bytes(), Value::string("x"), None);
        }
        let snap = ks.keys(b"user:?");
        assert!(!snap.is_stale(&ks));
        assert_eq!(sorted(snap), vec![b"user:1".to_vec(), b"user:2".to_vec()]);

        let snap = ks.keys(b"*");
        assert_eq!(snap.len(), 4);
        ks.set(b"user:3", Value::string("y"), None);
        assert!(snap.is_stale(&ks));
        // the old snapshot is unaffected; a fresh query sees the new key
        assert_eq!(snap.count(), 4);
        assert_eq!(ks.keys(b"user:*").count(), 4);
    }

    #[test]
    fn test_flush() {
        let ks = keyspace();
        ks.set(b"a", Value::string("1"), Some(Duration::from_secs(60)));
        ks.set(b"b", Value::set(["x"]), None);
        ks.flush();
        assert!(ks.is_empty());
        assert_eq!(ks.expiry.tracked(), 0);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(!glob_match(b"h?llo", b"hllo"));
        assert!(glob_match(b"h[ae]llo", b"hallo"));
        assert!(!glob_match(b"h[ae]llo", b"hillo"));
        assert!(glob_match(b"h[^e]llo", b"hallo"));
        assert!(!glob_match(b"h[^e]llo", b"hello"));
        assert!(glob_match(b"h[a-c]llo", b"hbllo"));
        assert!(glob_match(b"h[c-a]llo", b"hbllo"));
        assert!(!glob_match(b"h[a-c]llo", b"hzllo"));
        assert!(glob_match(b"a*b*c", b"aXXbYYc"));
        assert!(!glob_match(b"a*b*c", b"aXXbYY"));
        assert!(glob_match(b"\\*lit", b"*lit"));
        assert!(!glob_match(b"\\*lit", b"xlit"));
        assert!(glob_match(b"[\\]]", b"]"));
        assert!(glob_match(b"k\0*", b"k\0ey"));
        assert!(glob_match(b"**x", b"abcx"));
    }
}
