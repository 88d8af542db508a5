// tests/integration_types.rs

use anyhow::Result;

use crab_kv::{CommandEngine, ErrorKind, Reply, StoreConfig};

/// 辅助：按空格切分的命令交给引擎执行
fn exec(engine: &CommandEngine, line: &str) -> Reply {
    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default();
    engine.execute(name, parts.map(|s| s.as_bytes().to_vec()).collect())
}

fn bulks(items: &[&str]) -> Reply {
    Reply::array_of_bulks(items.iter().map(|s| s.as_bytes().to_vec()))
}

/// 把数组回复里的 bulk 收集成排序后的字符串，便于比较无序结果
fn sorted_strings(reply: Reply) -> Vec<String> {
    let Reply::Array(items) = reply else {
        panic!("expected array reply, got {:?}", reply);
    };
    let mut out: Vec<String> = items
        .into_iter()
        .map(|r| match r {
            Reply::Bulk(Some(b)) => String::from_utf8_lossy(&b).into_owned(),
            other => panic!("expected bulk, got {:?}", other),
        })
        .collect();
    out.sort();
    out
}

fn error_kind(reply: &Reply) -> Option<ErrorKind> {
    match reply {
        Reply::Error { kind, .. } => Some(*kind),
        _ => None,
    }
}

#[test]
fn test_types_integration() -> Result<()> {
    let engine = CommandEngine::new(&StoreConfig::default());

    //
    // -------- String --------
    //
    assert_eq!(exec(&engine, "SET key val"), Reply::ok(), "SET 应返回 OK");
    assert_eq!(exec(&engine, "GET key"), Reply::bulk("val"), "GET 应返回刚设的值");
    assert_eq!(exec(&engine, "DEL key"), Reply::Integer(1), "DEL 应返回删除数量");
    assert_eq!(exec(&engine, "GET key"), Reply::null(), "GET 不存在的 key 应返回 null");
    assert_eq!(exec(&engine, "APPEND key abc"), Reply::Integer(3));
    assert_eq!(exec(&engine, "STRLEN key"), Reply::Integer(3));
    assert_eq!(exec(&engine, "MSET a 1 b 2"), Reply::ok());
    assert_eq!(
        exec(&engine, "MGET a nope b"),
        Reply::Array(vec![Reply::bulk("1"), Reply::null(), Reply::bulk("2")])
    );
    assert_eq!(exec(&engine, "GETSET a 9"), Reply::bulk("1"));

    //
    // -------- Hash --------
    //
    assert_eq!(exec(&engine, "HSET h f1 v1"), Reply::Integer(1), "HSET 新 field 应返回 1");
    assert_eq!(exec(&engine, "HSET h f1 v2"), Reply::Integer(0), "HSET 覆盖已有 field 应返回 0");
    assert_eq!(exec(&engine, "HGET h f1"), Reply::bulk("v2"), "HGET 应返回覆盖后的值");
    assert_eq!(exec(&engine, "HSET h f2 v3"), Reply::Integer(1));
    assert_eq!(sorted_strings(exec(&engine, "HKEYS h")), vec!["f1", "f2"]);
    assert_eq!(sorted_strings(exec(&engine, "HVALS h")), vec!["v2", "v3"]);
    assert_eq!(sorted_strings(exec(&engine, "HGETALL h")), vec!["f1", "f2", "v2", "v3"]);
    assert_eq!(exec(&engine, "HLEN h"), Reply::Integer(2));
    assert_eq!(exec(&engine, "HDEL h f1 f2"), Reply::Integer(2));
    assert_eq!(exec(&engine, "EXISTS h"), Reply::Integer(0), "空 hash 应被删除");

    //
    // -------- List --------
    //
    assert_eq!(exec(&engine, "LPUSH l a b c"), Reply::Integer(3));
    assert_eq!(exec(&engine, "RPUSH l z"), Reply::Integer(4));
    assert_eq!(exec(&engine, "LRANGE l 0 -1"), bulks(&["c", "b", "a", "z"]));
    assert_eq!(exec(&engine, "LRANGE l -100 100"), bulks(&["c", "b", "a", "z"]));
    assert_eq!(exec(&engine, "LRANGE l 3 1"), bulks(&[]));
    assert_eq!(exec(&engine, "LINDEX l -1"), Reply::bulk("z"));
    assert_eq!(exec(&engine, "LSET l 0 C"), Reply::ok());
    assert_eq!(exec(&engine, "LPOP l"), Reply::bulk("C"));
    assert_eq!(exec(&engine, "RPOP l"), Reply::bulk("z"));
    assert_eq!(exec(&engine, "LLEN l"), Reply::Integer(2));
    exec(&engine, "RPOP l");
    exec(&engine, "RPOP l");
    assert_eq!(exec(&engine, "RPOP l"), Reply::null(), "空列表 POP 应返回 null");
    assert_eq!(exec(&engine, "TYPE l"), Reply::Status("none".into()));

    //
    // -------- Set --------
    //
    assert_eq!(exec(&engine, "SADD s x y x"), Reply::Integer(2));
    assert_eq!(exec(&engine, "SADD s x"), Reply::Integer(0), "重复成员不计入");
    assert_eq!(sorted_strings(exec(&engine, "SMEMBERS s")), vec!["x", "y"]);
    assert_eq!(exec(&engine, "SREM s x nope"), Reply::Integer(1));
    assert_eq!(exec(&engine, "SISMEMBER s x"), Reply::Integer(0));
    assert_eq!(exec(&engine, "SCARD s"), Reply::Integer(1));

    //
    // -------- Sorted set --------
    //
    assert_eq!(exec(&engine, "ZADD z 3 a 1 b 2 c"), Reply::Integer(3));
    assert_eq!(exec(&engine, "ZRANGE z 0 -1"), bulks(&["b", "c", "a"]));
    assert_eq!(exec(&engine, "ZADD z 5 b"), Reply::Integer(0), "更新分数不算新增");
    assert_eq!(exec(&engine, "ZRANGE z 0 -1"), bulks(&["c", "a", "b"]));
    // 同分按成员字典序
    assert_eq!(exec(&engine, "ZADD z 2 bb"), Reply::Integer(1));
    assert_eq!(exec(&engine, "ZRANGE z 0 1"), bulks(&["bb", "c"]));
    assert_eq!(exec(&engine, "ZADD z inf top -inf bottom"), Reply::Integer(2));
    assert_eq!(
        exec(&engine, "ZRANGE z 0 0 WITHSCORES"),
        bulks(&["bottom", "-inf"])
    );
    assert_eq!(exec(&engine, "ZSCORE z top"), Reply::bulk("inf"));
    assert_eq!(exec(&engine, "ZREM z top bottom bb"), Reply::Integer(3));
    assert_eq!(exec(&engine, "ZCARD z"), Reply::Integer(3));

    Ok(())
}

#[test]
fn test_wrong_type_never_coerces() {
    let engine = CommandEngine::new(&StoreConfig::default());
    exec(&engine, "SET str hello");

    for cmd in [
        "LPUSH str a",
        "RPOP str",
        "LRANGE str 0 -1",
        "HSET str f v",
        "HGET str f",
        "SADD str m",
        "SMEMBERS str",
        "ZADD str 1 m",
        "ZRANGE str 0 -1",
    ] {
        assert_eq!(error_kind(&exec(&engine, cmd)), Some(ErrorKind::WrongType), "{}", cmd);
    }
    assert_eq!(exec(&engine, "GET str"), Reply::bulk("hello"));

    // SET 无条件覆盖其他类型
    exec(&engine, "RPUSH list a");
    assert_eq!(error_kind(&exec(&engine, "GET list")), Some(ErrorKind::WrongType));
    assert_eq!(exec(&engine, "SET list now-a-string"), Reply::ok());
    assert_eq!(exec(&engine, "GET list"), Reply::bulk("now-a-string"));
}

#[test]
fn test_binary_safe_arguments() {
    let engine = CommandEngine::new(&StoreConfig::default());
    let key = b"bin\0key".to_vec();
    let value = vec![0u8, 0xff, b'\r', b'\n', 0];

    assert_eq!(engine.execute("SET", vec![key.clone(), value.clone()]), Reply::ok());
    assert_eq!(engine.execute("GET", vec![key.clone()]), Reply::Bulk(Some(value)));
    assert_eq!(engine.execute("SET", vec![b"empty".to_vec(), Vec::new()]), Reply::ok());
    assert_eq!(engine.execute("GET", vec![b"empty".to_vec()]), Reply::bulk(Vec::new()));
    assert_eq!(engine.execute("KEYS", vec![b"bin\0*".to_vec()]), Reply::array_of_bulks([key]));
}
