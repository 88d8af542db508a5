// src/types/mod.rs

//! # Value types
//!
//! A single tagged `Value` covers the five data shapes the store knows about.
//! The variant of a stored value never changes in place: commands either
//! operate on the variant they expect or fail with `WrongType`, and only an
//! explicit overwrite (e.g. `SET`) replaces a value with one of another kind.
//!
//! Each submodule holds the command handlers for one variant. Handlers run
//! against the key space through `Keyspace::view` (reads) and
//! `Keyspace::update` (read-modify-write under the key's shard lock).

pub mod hash;
pub mod list;
pub mod set;
pub mod string;
pub mod zset;

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Result, StoreError};

pub use zset::SortedSet;

/// Discriminant of a `Value`, reported by `TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    List,
    Hash,
    Set,
    SortedSet,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::List => "list",
            ValueType::Hash => "hash",
            ValueType::Set => "set",
            ValueType::SortedSet => "zset",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Hash(HashMap<Vec<u8>, Vec<u8>>),
    Set(HashSet<Vec<u8>>),
    SortedSet(SortedSet),
}

impl Default for Value {
    fn default() -> Self {
        Value::String(Vec::new())
    }
}

impl Value {
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Value::String(bytes.into())
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn hash<I, F, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        Value::Hash(pairs.into_iter().map(|(f, v)| (f.into(), v.into())).collect())
    }

    pub fn set<I, T>(members: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        Value::Set(members.into_iter().map(Into::into).collect())
    }

    pub fn sorted_set<I, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
        T: Into<Vec<u8>>,
    {
        let mut zset = SortedSet::new();
        for (member, score) in pairs {
            zset.insert(member.into(), score);
        }
        Value::SortedSet(zset)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::List(_) => ValueType::List,
            Value::Hash(_) => ValueType::Hash,
            Value::Set(_) => ValueType::Set,
            Value::SortedSet(_) => ValueType::SortedSet,
        }
    }

    /// Type check used before any type-specific operation
    pub fn is_type(&self, expected: ValueType) -> bool {
        self.value_type() == expected
    }

    /// True for an aggregate with no elements left. Strings are never
    /// considered empty: `SET k ""` is a real value.
    pub fn is_empty_aggregate(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
        }
    }

    pub fn as_string(&self) -> Result<&Vec<u8>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_string_mut(&mut self) -> Result<&mut Vec<u8>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Vec<u8>>> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Vec<u8>>> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Vec<u8>, Vec<u8>>> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Vec<u8>, Vec<u8>>> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Vec<u8>>> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Vec<u8>>> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_sorted_set(&self) -> Result<&SortedSet> {
        match self {
            Value::SortedSet(z) => Ok(z),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_sorted_set_mut(&mut self) -> Result<&mut SortedSet> {
        match self {
            Value::SortedSet(z) => Ok(z),
            _ => Err(StoreError::WrongType),
        }
    }
}

/// Resolve a possibly negative `[start, stop]` range against `len`.
/// Returns `None` when the clamped range is empty.
pub(crate) fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
