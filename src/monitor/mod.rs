// src/monitor/mod.rs
//! 监控与诊断模块：命令计数、INFO 报告、Prometheus 导出
pub mod info;
mod metrics;

use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use std::time::{Duration, Instant};
use dashmap::DashMap;
use tracing::info;
use warp::Filter;

use crate::engine::kv::Keyspace;

pub use metrics::Metrics;

/// 以 Prometheus 文本格式在 `0.0.0.0:<port>/metrics` 暴露指标
pub async fn serve_metrics(metrics: Arc<Metrics>, keyspace: Arc<Keyspace>, port: u16) {
    let route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            warp::reply::with_header(
                metrics.to_prometheus(&keyspace),
                "content-type",
                "text/plain; version=0.0.4",
            )
        });

    info!(port, "metrics endpoint listening");
    warp::serve(route).run(([0, 0, 0, 0], port)).await;
}
