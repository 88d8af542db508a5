use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::Path
};
use anyhow::{Context, Result, bail};
use tracing::{info, warn};


/// 进程启动后，从配置文件中读到的全局配置
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// TCP 监听地址
    pub bind: String,
    /// 默认日志级别（可被 RUST_LOG 覆盖）
    pub log_level: String,
    /// 存储引擎参数
    pub store: StoreConfig,
    // 监控配置
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

/// 存储引擎的构造参数：采样大小、过期比例阈值、分片数
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// 每轮主动清理最多采样的带 TTL 的 key 数
    pub sample_size: usize,
    /// 一轮采样中过期比例低于该值时停止本次清理
    pub expired_ratio_threshold: f64,
    /// key space 分片数（必须是 2 的幂）
    pub shard_count: usize,
    /// 后台清理周期（毫秒）
    pub sweep_interval_ms: u64,
    /// 每个周期最多执行的采样轮数
    pub max_sweep_rounds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:6380".into(),
            log_level: "info".into(),
            store: StoreConfig::default(),
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            sample_size: 20,
            expired_ratio_threshold: 0.25,
            shard_count: 32,
            sweep_interval_ms: 100,
            max_sweep_rounds: 16,
        }
    }
}

impl StoreConfig {
    /// 校验参数；不合法的分片数向上取整到 2 的幂
    pub fn validate(mut self) -> Result<Self> {
        if self.sample_size == 0 {
            bail!("store.sample_size must be greater than 0");
        }
        if !(self.expired_ratio_threshold > 0.0 && self.expired_ratio_threshold <= 1.0) {
            bail!(
                "store.expired_ratio_threshold must be in (0, 1], got {}",
                self.expired_ratio_threshold
            );
        }
        if self.max_sweep_rounds == 0 {
            bail!("store.max_sweep_rounds must be greater than 0");
        }
        if self.sweep_interval_ms == 0 {
            bail!("store.sweep_interval_ms must be greater than 0");
        }
        let shards = self.shard_count.max(2).next_power_of_two();
        if shards != self.shard_count {
            warn!(requested = self.shard_count, using = shards, "shard_count rounded up to a power of two");
            self.shard_count = shards;
        }
        Ok(self)
    }
}

/// 从指定路径读取并反序列化 JSON 配置
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();

    // 如果配置文件不存在，创建默认配置
    if !path_ref.exists() {
        let default_cfg = Config::default();
        let default_json = serde_json::to_string_pretty(&default_cfg)?;
        fs::write(path_ref, default_json)
            .with_context(|| format!("Failed to write default config {:?}", path_ref))?;
        info!(path = ?path_ref, "config file not found, wrote default configuration");
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file {:?}", path_ref))?;
    let mut cfg: Config = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse config file {:?}", path_ref))?;
    cfg.store = cfg.store.validate()?;
    Ok(cfg)
}
