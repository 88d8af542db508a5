// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crab_kv::monitor::{self, Metrics};
use crab_kv::{CommandEngine, Keyspace, config, expire, server};

/// crab-kv：内存型多类型 KV 服务
#[derive(Parser, Debug)]
#[command(name = "crab-kv", version, about)]
struct Args {
    /// 配置文件路径（不存在时写入默认配置）
    #[arg(short, long, default_value = "crab-kv.json")]
    config: String,

    /// 覆盖配置中的监听地址
    #[arg(short, long)]
    bind: Option<String>,

    /// 覆盖配置中的日志级别
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1) 读取配置，命令行参数优先
    let mut cfg = config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.bind = bind;
    }
    if let Some(level) = args.log_level {
        cfg.log_level = level;
    }

    // 2) 日志：RUST_LOG 优先，否则使用配置中的级别
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
    info!(config = %args.config, "crab-kv v{}", env!("CARGO_PKG_VERSION"));

    // 3) key space + 指标
    let keyspace = Arc::new(Keyspace::new(&cfg.store));
    let metrics = Arc::new(Metrics::new());
    let engine = CommandEngine::with_parts(keyspace.clone(), metrics.clone());

    // 4) 后台过期清理
    tokio::spawn(expire::start_cleaner(
        keyspace.clone(),
        Duration::from_millis(cfg.store.sweep_interval_ms),
    ));

    // 5) 可选的 Prometheus 端点
    if cfg.metrics_enabled {
        tokio::spawn(monitor::serve_metrics(metrics, keyspace, cfg.metrics_port));
    }

    // 6) 启动 TCP 服务
    server::start(&cfg.bind, engine).await
}
