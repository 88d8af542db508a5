// src/engine/mod.rs

//! # 引擎模块
//!
//! `engine` 模块是服务器的核心。对每个请求依次执行：
//! - Parse：`command::Command::parse` 把命令名（大小写不敏感）和参数解析成类型化的命令
//! - Validate：各类型处理函数在修改前检查 key 的现有类型（`WrongType`）
//! - Execute：在 key 所在分片的锁内完成读-改-写
//! - Reply：返回 `Reply`，由网络层决定如何序列化
//!
//! 所有错误都在这里被转换成 `Reply::Error`，引擎本身从不写任何输出通道。
pub mod command;
pub mod kv;

pub use command::Command;
pub use kv::{Entry, Keyspace, KeysSnapshot};

use std::sync::Arc;

use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::expire::TtlStatus;
use crate::monitor::{Metrics, info};
use crate::reply::Reply;
use crate::types::list;
use crate::types::{hash, set, string, zset};

/// 命令引擎：共享的 key space + 指标
///
/// `Clone` 只复制 `Arc`，可以交给每个连接任务各持一份。
#[derive(Clone)]
pub struct CommandEngine {
    keyspace: Arc<Keyspace>,
    metrics: Arc<Metrics>,
}

impl CommandEngine {
    pub fn new(cfg: &StoreConfig) -> Self {
        Self::with_parts(Arc::new(Keyspace::new(cfg)), Arc::new(Metrics::new()))
    }

    pub fn with_parts(keyspace: Arc<Keyspace>, metrics: Arc<Metrics>) -> Self {
        CommandEngine { keyspace, metrics }
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// 执行单个客户端命令
    ///
    /// # 参数
    ///
    /// * `name` - 命令名，大小写不敏感
    /// * `args` - 命令参数（不含命令名），任意字节
    pub fn execute(&self, name: &str, args: Vec<Vec<u8>>) -> Reply {
        let cmd = match Command::parse(name, args) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!(command = name, error = %e, "rejected command");
                self.metrics.record_rejected();
                return e.into();
            }
        };

        let cmd_name = cmd.name();
        let reply = self.apply(cmd).unwrap_or_else(Reply::from);
        self.metrics.record_command(cmd_name, reply.is_error());
        debug!(command = cmd_name, error = reply.is_error(), "executed command");
        reply
    }

    /// 按命令类型分派到 types/* 与 key space
    pub fn apply(&self, cmd: Command) -> Result<Reply> {
        let ks = self.keyspace.as_ref();
        let reply = match cmd {
            // --- 通用命令 ---
            Command::Ping(None) => Reply::Status("PONG".into()),
            Command::Ping(Some(msg)) | Command::Echo(msg) => Reply::bulk(msg),
            // 多个 key 的 DEL 整体原子
            Command::Del(keys) => Reply::Integer(match keys.as_slice() {
                [key] => ks.delete(key) as i64,
                _ => ks.delete_many(&keys) as i64,
            }),
            Command::Exists(keys) => Reply::Integer(
                ks.view_many(&keys, |v| v.is_some()).into_iter().filter(|&hit| hit).count() as i64,
            ),
            Command::Type(key) => {
                let name = ks.view(&key, |v| v.map_or("none", |v| v.value_type().name()));
                Reply::Status(name.into())
            }
            Command::Rename { src, dst, only_if_absent: false } => {
                ks.rename(&src, &dst)?;
                Reply::ok()
            }
            Command::Rename { src, dst, only_if_absent: true } => {
                Reply::from_bool(ks.rename_nx(&src, &dst)?)
            }
            Command::Keys(pattern) => Reply::array_of_bulks(ks.keys(&pattern)),
            Command::DbSize => Reply::Integer(ks.len() as i64),
            Command::FlushDb => {
                ks.flush();
                Reply::ok()
            }

            // --- 过期命令 ---
            Command::Expire { key, ttl, .. } => Reply::from_bool(ks.set_ttl(&key, ttl)),
            Command::Ttl { key, millis } => Reply::Integer(match ks.ttl(&key) {
                TtlStatus::Missing => -2,
                TtlStatus::Persistent => -1,
                TtlStatus::Remaining(d) if millis => d.as_millis() as i64,
                // 向上取整到秒
                TtlStatus::Remaining(d) => d.as_millis().div_ceil(1000) as i64,
            }),
            Command::Persist(key) => Reply::from_bool(ks.persist(&key)),
            Command::Info(section) => {
                Reply::bulk(info::build_info_response(section.as_deref(), ks, &self.metrics))
            }

            // --- String ---
            Command::Set { key, value, opts } => {
                if string::set(ks, &key, value, opts)? {
                    Reply::ok()
                } else {
                    Reply::null()
                }
            }
            Command::Get(key) => Reply::optional(string::get(ks, &key)?),
            Command::GetSet { key, value } => Reply::optional(string::getset(ks, &key, value)?),
            Command::MSet(pairs) => {
                string::mset(ks, pairs);
                Reply::ok()
            }
            Command::MGet(keys) => Reply::Array(
                string::mget(ks, &keys).into_iter().map(Reply::optional).collect(),
            ),
            Command::Incr(key) => Reply::Integer(string::incr_by(ks, &key, 1)?),
            Command::Decr(key) => Reply::Integer(string::incr_by(ks, &key, -1)?),
            Command::IncrBy { key, delta } => Reply::Integer(string::incr_by(ks, &key, delta)?),
            Command::DecrBy { key, delta } => {
                let delta = delta
                    .checked_neg()
                    .ok_or_else(|| StoreError::InvalidArgument("decrement would overflow".into()))?;
                Reply::Integer(string::incr_by(ks, &key, delta)?)
            }
            Command::Append { key, value } => Reply::Integer(string::append(ks, &key, &value)?),
            Command::StrLen(key) => Reply::Integer(string::strlen(ks, &key)?),

            // --- List ---
            Command::Push { key, values, end } => Reply::Integer(list::push(ks, &key, values, end)?),
            Command::Pop { key, end } => Reply::optional(list::pop(ks, &key, end)?),
            Command::LLen(key) => Reply::Integer(list::len(ks, &key)?),
            Command::LRange { key, start, stop } => {
                Reply::array_of_bulks(list::range(ks, &key, start, stop)?)
            }
            Command::LIndex { key, index } => Reply::optional(list::index(ks, &key, index)?),
            Command::LSet { key, index, value } => {
                list::set(ks, &key, index, value)?;
                Reply::ok()
            }

            // --- Hash ---
            Command::HSet { key, pairs } => Reply::Integer(hash::hset(ks, &key, pairs)?),
            Command::HGet { key, field } => Reply::optional(hash::hget(ks, &key, &field)?),
            Command::HDel { key, fields } => Reply::Integer(hash::hdel(ks, &key, &fields)?),
            Command::HExists { key, field } => Reply::from_bool(hash::hexists(ks, &key, &field)?),
            Command::HLen(key) => Reply::Integer(hash::hlen(ks, &key)?),
            Command::HKeys(key) => Reply::array_of_bulks(hash::hkeys(ks, &key)?),
            Command::HVals(key) => Reply::array_of_bulks(hash::hvals(ks, &key)?),
            Command::HGetAll(key) => Reply::array_of_bulks(
                hash::hgetall(ks, &key)?
                    .into_iter()
                    .flat_map(|(f, v)| [f, v]),
            ),

            // --- Set ---
            Command::SAdd { key, members } => Reply::Integer(set::sadd(ks, &key, members)?),
            Command::SRem { key, members } => Reply::Integer(set::srem(ks, &key, &members)?),
            Command::SMembers(key) => Reply::array_of_bulks(set::smembers(ks, &key)?),
            Command::SIsMember { key, member } => {
                Reply::from_bool(set::sismember(ks, &key, &member)?)
            }
            Command::SCard(key) => Reply::Integer(set::scard(ks, &key)?),

            // --- Sorted set ---
            Command::ZAdd { key, pairs } => Reply::Integer(zset::zadd(ks, &key, pairs)?),
            Command::ZRem { key, members } => Reply::Integer(zset::zrem(ks, &key, &members)?),
            Command::ZScore { key, member } => match zset::zscore(ks, &key, &member)? {
                Some(score) => Reply::score(score),
                None => Reply::null(),
            },
            Command::ZIncrBy { key, delta, member } => {
                Reply::score(zset::zincrby(ks, &key, delta, member)?)
            }
            Command::ZCard(key) => Reply::Integer(zset::zcard(ks, &key)?),
            Command::ZRank { key, member } => match zset::zrank(ks, &key, &member)? {
                Some(rank) => Reply::Integer(rank),
                None => Reply::null(),
            },
            Command::ZRange { key, start, stop, with_scores } => {
                let items = zset::zrange(ks, &key, start, stop)?;
                let mut out = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
                for (member, score) in items {
                    out.push(Reply::bulk(member));
                    if with_scores {
                        out.push(Reply::score(score));
                    }
                }
                Reply::Array(out)
            }
        };
        Ok(reply)
    }
}
