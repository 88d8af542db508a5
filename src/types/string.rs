// src/types/string.rs

//! String 类型的存取操作
//!
//! - SET key value [EX|PX] [NX|XX] → 写入（任意旧类型都会被覆盖），旧 TTL 被清除
//! - GET key → 返回 value；key 不存在时返回 None（不是错误）
//! - INCR/DECR/INCRBY/DECRBY → 在 key 的分片锁内完成读-改-写，天然原子
//! - APPEND / STRLEN / GETSET / MSET / MGET

use std::time::Duration;

use crate::engine::kv::{Entry, Keyspace, slot_value};
use crate::error::{Result, StoreError};
use crate::expire::{deadline_after, now_ms};
use crate::types::Value;

/// SET 的写入条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    #[default]
    Always,
    /// NX：仅当 key 不存在
    IfAbsent,
    /// XX：仅当 key 已存在
    IfPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub condition: SetCondition,
}

/// 写入一个字符串，已有值（无论类型）会被覆盖。
///
/// # 返回
/// - Ok(true)  – 已写入
/// - Ok(false) – NX/XX 条件不满足，未写入
pub fn set(ks: &Keyspace, key: &[u8], value: Vec<u8>, opts: SetOptions) -> Result<bool> {
    let expire_at = opts.ttl.and_then(|d| deadline_after(now_ms(), d));
    Ok(ks.update(key, |slot| {
        let allowed = match opts.condition {
            SetCondition::Always => true,
            SetCondition::IfAbsent => slot.is_none(),
            SetCondition::IfPresent => slot.is_some(),
        };
        if allowed {
            *slot = Some(Entry { value: Value::String(value), expire_at });
        }
        allowed
    }))
}

/// 读取一个字符串。
///
/// # 返回
/// - Ok(Some(value)) – key 存在
/// - Ok(None)        – key 不存在
///
/// # 错误
/// - key 持有非字符串类型时返回 `WrongType`
pub fn get(ks: &Keyspace, key: &[u8]) -> Result<Option<Vec<u8>>> {
    ks.view(key, |value| match value {
        Some(v) => Ok(Some(v.as_string()?.clone())),
        None => Ok(None),
    })
}

/// 写入新值并返回旧值；TTL 被清除
pub fn getset(ks: &Keyspace, key: &[u8], value: Vec<u8>) -> Result<Option<Vec<u8>>> {
    ks.update(key, |slot| {
        let old = match slot.take() {
            Some(entry) => match entry.value {
                Value::String(s) => Some(s),
                other => {
                    // 类型不符：原样放回
                    *slot = Some(Entry { value: other, expire_at: entry.expire_at });
                    return Err(StoreError::WrongType);
                }
            },
            None => None,
        };
        *slot = Some(Entry::new(Value::String(value)));
        Ok(old)
    })
}

/// 一次性写入全部 key，读者不会看到写了一半的结果
pub fn mset(ks: &Keyspace, pairs: Vec<(Vec<u8>, Vec<u8>)>) {
    ks.set_many(pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect());
}

/// 批量读取（同一快照）；不存在或类型不符的 key 返回 None
pub fn mget(ks: &Keyspace, keys: &[Vec<u8>]) -> Vec<Option<Vec<u8>>> {
    ks.view_many(keys, |value| match value {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    })
}

/// 原子地加 `delta`：
/// - key 不存在时视为 0
/// - 保留原有 TTL
/// - 非整数内容或溢出返回 `InvalidArgument`
pub fn incr_by(ks: &Keyspace, key: &[u8], delta: i64) -> Result<i64> {
    ks.update(key, |slot| {
        let bytes = slot_value(slot, || Value::String(b"0".to_vec())).as_string_mut()?;
        let old = std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(StoreError::not_integer)?;
        let new = old.checked_add(delta).ok_or_else(|| {
            StoreError::InvalidArgument("increment or decrement would overflow".into())
        })?;
        *bytes = new.to_string().into_bytes();
        Ok(new)
    })
}

/// 追加到字符串末尾，返回新长度
pub fn append(ks: &Keyspace, key: &[u8], suffix: &[u8]) -> Result<i64> {
    ks.update(key, |slot| {
        let bytes = slot_value(slot, || Value::String(Vec::new())).as_string_mut()?;
        bytes.extend_from_slice(suffix);
        Ok(bytes.len() as i64)
    })
}

pub fn strlen(ks: &Keyspace, key: &[u8]) -> Result<i64> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_string()?.len() as i64),
        None => Ok(0),
    })
}
