// src/types/hash.rs

//! 支持 Hash 类型：field -> value 的映射，field 与 value 均为任意字节
//! 删除最后一个 field 时 key 随之删除

use std::collections::HashMap;

use crate::engine::kv::{Keyspace, slot_value};
use crate::error::Result;
use crate::types::Value;

/// HSET key field value [field value ...]
/// 返回新建的 field 数量；已存在的 field 被覆盖，不计入
pub fn hset(ks: &Keyspace, key: &[u8], pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<i64> {
    ks.update(key, |slot| {
        let map = slot_value(slot, || Value::Hash(HashMap::new())).as_hash_mut()?;
        let mut created = 0;
        for (field, value) in pairs {
            if map.insert(field, value).is_none() {
                created += 1;
            }
        }
        Ok(created)
    })
}

/// HGET key field
/// field 或 key 不存在时返回 None
pub fn hget(ks: &Keyspace, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_hash()?.get(field).cloned()),
        None => Ok(None),
    })
}

/// HDEL key field [field ...]
/// 返回实际删除的 field 数量
pub fn hdel(ks: &Keyspace, key: &[u8], fields: &[Vec<u8>]) -> Result<i64> {
    ks.update(key, |slot| {
        let Some(entry) = slot.as_mut() else {
            return Ok(0);
        };
        let map = entry.value.as_hash_mut()?;
        Ok(fields.iter().filter(|f| map.remove(f.as_slice()).is_some()).count() as i64)
    })
}

/// HEXISTS key field
pub fn hexists(ks: &Keyspace, key: &[u8], field: &[u8]) -> Result<bool> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_hash()?.contains_key(field)),
        None => Ok(false),
    })
}

/// HLEN key
pub fn hlen(ks: &Keyspace, key: &[u8]) -> Result<i64> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v.as_hash()?.len() as i64),
        None => Ok(0),
    })
}

/// HGETALL key
/// 返回所有 (field, value)，顺序不保证；key 不存在时返回空
pub fn hgetall(ks: &Keyspace, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    ks.view(key, |value| match value {
        Some(v) => Ok(v
            .as_hash()?
            .iter()
            .map(|(f, val)| (f.clone(), val.clone()))
            .collect()),
        None => Ok(Vec::new()),
    })
}

/// HKEYS key
pub fn hkeys(ks: &Keyspace, key: &[u8]) -> Result<Vec<Vec<u8>>> {
    Ok(hgetall(ks, key)?.into_iter().map(|(f, _)| f).collect())
}

/// HVALS key
pub fn hvals(ks: &Keyspace, key: &[u8]) -> Result<Vec<Vec<u8>>> {
    Ok(hgetall(ks, key)?.into_iter().map(|(_, v)| v).collect())
}
