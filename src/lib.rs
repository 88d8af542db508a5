// src/lib.rs
//! crab-kv 库：types / engine / expire / reply / server / monitor

pub mod config;   // 配置加载
pub mod engine;   // key space + 命令引擎
pub mod error;    // 错误类型
pub mod expire;   // 过期策略
pub mod monitor;  // 监控 & 诊断
pub mod reply;    // 类型化回复 + RESP 编码
pub mod server;   // 网络层 & 命令分发
pub mod types;    // String / List / Hash / Set / SortedSet 数据结构

pub use config::{Config, StoreConfig};
pub use engine::{CommandEngine, Keyspace};
pub use error::{ErrorKind, StoreError};
pub use reply::Reply;
pub use types::Value;
