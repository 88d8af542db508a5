// src/engine/command.rs

//! Parse stage: command name + raw arguments -> typed `Command`.
//!
//! Names are matched case-insensitively against `COMMAND_TABLE`. Arity uses
//! the Redis convention: it counts the command name itself, and a negative
//! value means "at least that many".

use std::time::Duration;

use crate::error::{Result, StoreError};
use crate::expire::ttl_from_arg;
use crate::types::list::End;
use crate::types::string::{SetCondition, SetOptions};

/// (name, arity)
pub const COMMAND_TABLE: &[(&str, i32)] = &[
    // keyspace
    ("PING", -1),
    ("ECHO", 2),
    ("DEL", -2),
    ("EXISTS", -2),
    ("TYPE", 2),
    ("RENAME", 3),
    ("RENAMENX", 3),
    ("KEYS", 2),
    ("DBSIZE", 1),
    ("FLUSHDB", 1),
    ("EXPIRE", 3),
    ("PEXPIRE", 3),
    ("TTL", 2),
    ("PTTL", 2),
    ("PERSIST", 2),
    ("INFO", -1),
    // string
    ("SET", -3),
    ("GET", 2),
    ("GETSET", 3),
    ("MSET", -3),
    ("MGET", -2),
    ("INCR", 2),
    ("DECR", 2),
    ("INCRBY", 3),
    ("DECRBY", 3),
    ("APPEND", 3),
    ("STRLEN", 2),
    // list
    ("LPUSH", -3),
    ("RPUSH", -3),
    ("LPOP", 2),
    ("RPOP", 2),
    ("LLEN", 2),
    ("LRANGE", 4),
    ("LINDEX", 3),
    ("LSET", 4),
    // hash
    ("HSET", -4),
    ("HGET", 3),
    ("HDEL", -3),
    ("HEXISTS", 3),
    ("HLEN", 2),
    ("HKEYS", 2),
    ("HVALS", 2),
    ("HGETALL", 2),
    // set
    ("SADD", -3),
    ("SREM", -3),
    ("SMEMBERS", 2),
    ("SISMEMBER", 3),
    ("SCARD", 2),
    // sorted set
    ("ZADD", -4),
    ("ZREM", -3),
    ("ZSCORE", 3),
    ("ZINCRBY", 4),
    ("ZCARD", 2),
    ("ZRANK", 3),
    ("ZRANGE", -4),
];

type Key = Vec<u8>;

/// A fully parsed request. Every variant carries owned arguments so it can be
/// executed without touching the raw request again.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<Vec<u8>>),
    Echo(Vec<u8>),
    Del(Vec<Key>),
    Exists(Vec<Key>),
    Type(Key),
    Rename { src: Key, dst: Key, only_if_absent: bool },
    Keys(Vec<u8>),
    DbSize,
    FlushDb,
    Expire { key: Key, ttl: Duration, millis: bool },
    Ttl { key: Key, millis: bool },
    Persist(Key),
    Info(Option<String>),

    Set { key: Key, value: Vec<u8>, opts: SetOptions },
    Get(Key),
    GetSet { key: Key, value: Vec<u8> },
    MSet(Vec<(Key, Vec<u8>)>),
    MGet(Vec<Key>),
    Incr(Key),
    Decr(Key),
    IncrBy { key: Key, delta: i64 },
    DecrBy { key: Key, delta: i64 },
    Append { key: Key, value: Vec<u8> },
    StrLen(Key),

    Push { key: Key, values: Vec<Vec<u8>>, end: End },
    Pop { key: Key, end: End },
    LLen(Key),
    LRange { key: Key, start: i64, stop: i64 },
    LIndex { key: Key, index: i64 },
    LSet { key: Key, index: i64, value: Vec<u8> },

    HSet { key: Key, pairs: Vec<(Vec<u8>, Vec<u8>)> },
    HGet { key: Key, field: Vec<u8> },
    HDel { key: Key, fields: Vec<Vec<u8>> },
    HExists { key: Key, field: Vec<u8> },
    HLen(Key),
    HKeys(Key),
    HVals(Key),
    HGetAll(Key),

    SAdd { key: Key, members: Vec<Vec<u8>> },
    SRem { key: Key, members: Vec<Vec<u8>> },
    SMembers(Key),
    SIsMember { key: Key, member: Vec<u8> },
    SCard(Key),

    ZAdd { key: Key, pairs: Vec<(f64, Vec<u8>)> },
    ZRem { key: Key, members: Vec<Vec<u8>> },
    ZScore { key: Key, member: Vec<u8> },
    ZIncrBy { key: Key, delta: f64, member: Vec<u8> },
    ZCard(Key),
    ZRank { key: Key, member: Vec<u8> },
    ZRange { key: Key, start: i64, stop: i64, with_scores: bool },
}

/// Look up a command name (any case). Returns the canonical name and arity.
pub fn lookup(name: &str) -> Option<(&'static str, i32)> {
    COMMAND_TABLE
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .copied()
}

fn check_arity(name: &str, arity: i32, argc: usize) -> Result<()> {
    // argc excludes the command name
    let total = argc as i32 + 1;
    let ok = if arity >= 0 { total == arity } else { total >= -arity };
    if ok {
        Ok(())
    } else {
        Err(StoreError::Arity(name.to_ascii_lowercase()))
    }
}

pub(crate) fn parse_int(arg: &[u8]) -> Result<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(StoreError::not_integer)
}

/// IEEE-754 double, accepting `inf` / `-inf`; NaN is rejected
pub(crate) fn parse_float(arg: &[u8]) -> Result<f64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or_else(StoreError::not_float)
}

/// Group a flat argument list into pairs; an odd count is an arity error.
fn pairs(name: &str, args: Vec<Vec<u8>>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(StoreError::Arity(name.to_ascii_lowercase()));
    }
    let mut out = Vec::with_capacity(args.len() / 2);
    let mut it = args.into_iter();
    while let (Some(a), Some(b)) = (it.next(), it.next()) {
        out.push((a, b));
    }
    Ok(out)
}

fn parse_set_options(args: &[Vec<u8>]) -> Result<SetOptions> {
    let mut opts = SetOptions::default();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].to_ascii_uppercase();
        match flag.as_slice() {
            b"NX" | b"XX" => {
                if opts.condition != SetCondition::Always {
                    return Err(StoreError::syntax());
                }
                opts.condition = if flag == b"NX" {
                    SetCondition::IfAbsent
                } else {
                    SetCondition::IfPresent
                };
                i += 1;
            }
            b"EX" | b"PX" => {
                let amount = args.get(i + 1).ok_or_else(StoreError::syntax)?;
                if opts.ttl.is_some() {
                    return Err(StoreError::syntax());
                }
                let amount = parse_int(amount)?;
                if amount <= 0 {
                    return Err(StoreError::InvalidArgument(
                        "invalid expire time in 'set' command".into(),
                    ));
                }
                let unit = if flag == b"EX" { 1000 } else { 1 };
                opts.ttl = Some(ttl_from_arg(amount, unit)?);
                i += 2;
            }
            _ => return Err(StoreError::syntax()),
        }
    }
    Ok(opts)
}

impl Command {
    /// Parse `name` + `args` (not including the name).
    ///
    /// # Errors
    ///
    /// `UnknownCommand` for names outside the table, `Arity` for a wrong
    /// argument count, `InvalidArgument` for malformed numbers or options.
    pub fn parse(name: &str, args: Vec<Vec<u8>>) -> Result<Command> {
        let (canonical, arity) =
            lookup(name).ok_or_else(|| StoreError::UnknownCommand(name.to_string()))?;
        check_arity(canonical, arity, args.len())?;

        let mut it = args.into_iter();
        // arity has been checked, so the positional arguments are present
        let mut next = || it.next().unwrap_or_default();

        let cmd = match canonical {
            "PING" => {
                let mut rest: Vec<Vec<u8>> = it.collect();
                if rest.len() > 1 {
                    return Err(StoreError::Arity("ping".into()));
                }
                Command::Ping(rest.pop())
            }
            "ECHO" => Command::Echo(next()),
            "DEL" => Command::Del(it.collect()),
            "EXISTS" => Command::Exists(it.collect()),
            "TYPE" => Command::Type(next()),
            "RENAME" | "RENAMENX" => Command::Rename {
                src: next(),
                dst: next(),
                only_if_absent: canonical == "RENAMENX",
            },
            "KEYS" => Command::Keys(next()),
            "DBSIZE" => Command::DbSize,
            "FLUSHDB" => Command::FlushDb,
            "EXPIRE" | "PEXPIRE" => {
                let key = next();
                let millis = canonical == "PEXPIRE";
                let ttl = ttl_from_arg(parse_int(&next())?, if millis { 1 } else { 1000 })?;
                Command::Expire { key, ttl, millis }
            }
            "TTL" | "PTTL" => Command::Ttl { key: next(), millis: canonical == "PTTL" },
            "PERSIST" => Command::Persist(next()),
            "INFO" => {
                let rest: Vec<Vec<u8>> = it.collect();
                match rest.as_slice() {
                    [] => Command::Info(None),
                    [section] => Command::Info(Some(
                        String::from_utf8_lossy(section).to_ascii_lowercase(),
                    )),
                    _ => return Err(StoreError::syntax()),
                }
            }

            "SET" => {
                let key = next();
                let value = next();
                let rest: Vec<Vec<u8>> = it.collect();
                Command::Set { key, value, opts: parse_set_options(&rest)? }
            }
            "GET" => Command::Get(next()),
            "GETSET" => Command::GetSet { key: next(), value: next() },
            "MSET" => Command::MSet(pairs(canonical, it.collect())?),
            "MGET" => Command::MGet(it.collect()),
            "INCR" => Command::Incr(next()),
            "DECR" => Command::Decr(next()),
            "INCRBY" => {
                let key = next();
                Command::IncrBy { key, delta: parse_int(&next())? }
            }
            "DECRBY" => {
                let key = next();
                Command::DecrBy { key, delta: parse_int(&next())? }
            }
            "APPEND" => Command::Append { key: next(), value: next() },
            "STRLEN" => Command::StrLen(next()),

            "LPUSH" | "RPUSH" => {
                let key = next();
                let end = if canonical == "LPUSH" { End::Left } else { End::Right };
                Command::Push { key, values: it.collect(), end }
            }
            "LPOP" => Command::Pop { key: next(), end: End::Left },
            "RPOP" => Command::Pop { key: next(), end: End::Right },
            "LLEN" => Command::LLen(next()),
            "LRANGE" => {
                let key = next();
                let start = parse_int(&next())?;
                let stop = parse_int(&next())?;
                Command::LRange { key, start, stop }
            }
            "LINDEX" => {
                let key = next();
                Command::LIndex { key, index: parse_int(&next())? }
            }
            "LSET" => {
                let key = next();
                let index = parse_int(&next())?;
                Command::LSet { key, index, value: next() }
            }

            "HSET" => {
                let key = next();
                Command::HSet { key, pairs: pairs(canonical, it.collect())? }
            }
            "HGET" => Command::HGet { key: next(), field: next() },
            "HDEL" => {
                let key = next();
                Command::HDel { key, fields: it.collect() }
            }
            "HEXISTS" => Command::HExists { key: next(), field: next() },
            "HLEN" => Command::HLen(next()),
            "HKEYS" => Command::HKeys(next()),
            "HVALS" => Command::HVals(next()),
            "HGETALL" => Command::HGetAll(next()),

            "SADD" => {
                let key = next();
                Command::SAdd { key, members: it.collect() }
            }
            "SREM" => {
                let key = next();
                Command::SRem { key, members: it.collect() }
            }
            "SMEMBERS" => Command::SMembers(next()),
            "SISMEMBER" => Command::SIsMember { key: next(), member: next() },
            "SCARD" => Command::SCard(next()),

            "ZADD" => {
                let key = next();
                let pairs = pairs(canonical, it.collect())?
                    .into_iter()
                    .map(|(score, member)| Ok((parse_float(&score)?, member)))
                    .collect::<Result<Vec<_>>>()?;
                Command::ZAdd { key, pairs }
            }
            "ZREM" => {
                let key = next();
                Command::ZRem { key, members: it.collect() }
            }
            "ZSCORE" => Command::ZScore { key: next(), member: next() },
            "ZINCRBY" => {
                let key = next();
                let delta = parse_float(&next())?;
                Command::ZIncrBy { key, delta, member: next() }
            }
            "ZCARD" => Command::ZCard(next()),
            "ZRANK" => Command::ZRank { key: next(), member: next() },
            "ZRANGE" => {
                let key = next();
                let start = parse_int(&next())?;
                let stop = parse_int(&next())?;
                let rest: Vec<Vec<u8>> = it.collect();
                let with_scores = match rest.as_slice() {
                    [] => false,
                    [flag] if flag.eq_ignore_ascii_case(b"WITHSCORES") => true,
                    _ => return Err(StoreError::syntax()),
                };
                Command::ZRange { key, start, stop, with_scores }
            }

            other => return Err(StoreError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }

    /// Canonical upper-case name, used for metrics and logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Echo(_) => "ECHO",
            Command::Del(_) => "DEL",
            Command::Exists(_) => "EXISTS",
            Command::Type(_) => "TYPE",
            Command::Rename { only_if_absent: false, .. } => "RENAME",
            Command::Rename { only_if_absent: true, .. } => "RENAMENX",
            Command::Keys(_) => "KEYS",
            Command::DbSize => "DBSIZE",
            Command::FlushDb => "FLUSHDB",
            Command::Expire { millis: false, .. } => "EXPIRE",
            Command::Expire { millis: true, .. } => "PEXPIRE",
            Command::Ttl { millis: false, .. } => "TTL",
            Command::Ttl { millis: true, .. } => "PTTL",
            Command::Persist(_) => "PERSIST",
            Command::Info(_) => "INFO",
            Command::Set { .. } => "SET",
            Command::Get(_) => "GET",
            Command::GetSet { .. } => "GETSET",
            Command::MSet(_) => "MSET",
            Command::MGet(_) => "MGET",
            Command::Incr(_) => "INCR",
            Command::Decr(_) => "DECR",
            Command::IncrBy { .. } => "INCRBY",
            Command::DecrBy { .. } => "DECRBY",
            Command::Append { .. } => "APPEND",
            Command::StrLen(_) => "STRLEN",
            Command::Push { end: End::Left, .. } => "LPUSH",
            Command::Push { end: End::Right, .. } => "RPUSH",
            Command::Pop { end: End::Left, .. } => "LPOP",
            Command::Pop { end: End::Right, .. } => "RPOP",
            Command::LLen(_) => "LLEN",
            Command::LRange { .. } => "LRANGE",
            Command::LIndex { .. } => "LINDEX",
            Command::LSet { .. } => "LSET",
            Command::HSet { .. } => "HSET",
            Command::HGet { .. } => "HGET",
            Command::HDel { .. } => "HDEL",
            Command::HExists { .. } => "HEXISTS",
            Command::HLen(_) => "HLEN",
            Command::HKeys(_) => "HKEYS",
            Command::HVals(_) => "HVALS",
            Command::HGetAll(_) => "HGETALL",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SMembers(_) => "SMEMBERS",
            Command::SIsMember { .. } => "SISMEMBER",
            Command::SCard(_) => "SCARD",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZScore { .. } => "ZSCORE",
            Command::ZIncrBy { .. } => "ZINCRBY",
            Command::ZCard(_) => "ZCARD",
            Command::ZRank { .. } => "ZRANK",
            Command::ZRange { .. } => "ZRANGE",
        }
    }
}
