//! 过期策略：惰性删除 + 周期性采样清理
//!
//! - 每个 entry 自带绝对过期时间（UNIX 毫秒），读写时先判断是否已过期（惰性删除）
//! - `ExpiryManager` 维护所有带 TTL 的 key 的索引，支持 O(1) 随机采样
//! - 后台任务每个周期随机采样一批带 TTL 的 key，删除已过期者；
//!   若本批过期比例仍高于阈值则继续下一批，直到比例降低或轮数预算耗尽

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry as MapEntry;
use parking_lot::Mutex;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::engine::kv::{Entry, Keyspace};
use crate::error::{Result, StoreError};

/// 返回当前的 UNIX 毫秒
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// 给定时刻 `now`，entry 是否已逻辑过期
pub fn is_expired(entry: &Entry, now: u64) -> bool {
    matches!(entry.expire_at, Some(deadline) if deadline <= now)
}

/// 计算 `now + ttl` 的绝对过期时间。
///
/// 过期时间必须严格晚于 `now`；不满足时在 debug 构建中直接 panic，
/// release 构建中退化为“无 TTL”。
pub fn deadline_after(now: u64, ttl: Duration) -> Option<u64> {
    let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    let deadline = now.saturating_add(ms);
    debug_assert!(deadline > now, "TTL must be positive, got {:?}", ttl);
    (deadline > now).then_some(deadline)
}

/// `TTL` / `PTTL` 的查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// key 不存在（或已过期）
    Missing,
    /// key 存在但没有 TTL
    Persistent,
    /// 剩余存活时间
    Remaining(Duration),
}

/// 一次采样清理的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub sampled: usize,
    pub reclaimed: usize,
}

/// 一个清理周期（多轮采样）的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub rounds: usize,
    pub sampled: usize,
    pub reclaimed: usize,
}

/// 带 TTL 的 key 的集合：Vec + 下标索引，插入/删除/随机采样均为 O(1)
#[derive(Default)]
struct VolatileKeys {
    keys: Vec<Vec<u8>>,
    slots: HashMap<Vec<u8>, usize>,
}

impl VolatileKeys {
    fn insert(&mut self, key: &[u8]) {
        if self.slots.contains_key(key) {
            return;
        }
        self.slots.insert(key.to_vec(), self.keys.len());
        self.keys.push(key.to_vec());
    }

    fn remove(&mut self, key: &[u8]) {
        let Some(idx) = self.slots.remove(key) else {
            return;
        };
        self.keys.swap_remove(idx);
        // 被换到 idx 位置的 key 需要更新下标
        if let Some(moved) = self.keys.get(idx) {
            self.slots.insert(moved.clone(), idx);
        }
    }

    fn sample(&self, amount: usize) -> Vec<Vec<u8>> {
        let amount = amount.min(self.keys.len());
        let mut rng = rand::thread_rng();
        rand::seq::index::sample(&mut rng, self.keys.len(), amount)
            .into_iter()
            .map(|i| self.keys[i].clone())
            .collect()
    }
}

/// 过期管理器：TTL 索引 + 清理预算
pub struct ExpiryManager {
    volatile: Mutex<VolatileKeys>,
    sample_size: usize,
    expired_ratio_threshold: f64,
    max_rounds: usize,
}

impl ExpiryManager {
    pub fn new(cfg: &StoreConfig) -> Self {
        ExpiryManager {
            volatile: Mutex::new(VolatileKeys::default()),
            sample_size: cfg.sample_size.max(1),
            expired_ratio_threshold: cfg.expired_ratio_threshold,
            max_rounds: cfg.max_sweep_rounds.max(1),
        }
    }

    pub(crate) fn track(&self, key: &[u8]) {
        self.volatile.lock().insert(key);
    }

    pub(crate) fn untrack(&self, key: &[u8]) {
        self.volatile.lock().remove(key);
    }

    pub(crate) fn clear(&self) {
        *self.volatile.lock() = VolatileKeys::default();
    }

    /// 当前带 TTL 的 key 数量
    pub fn tracked(&self) -> usize {
        self.volatile.lock().keys.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    fn sample(&self) -> Vec<Vec<u8>> {
        self.volatile.lock().sample(self.sample_size)
    }

    /// 本轮之后是否继续采样
    fn keep_sweeping(&self, round: usize, stats: &SweepStats) -> bool {
        if round >= self.max_rounds || stats.sampled == 0 {
            return false;
        }
        (stats.reclaimed as f64 / stats.sampled as f64) >= self.expired_ratio_threshold
    }
}

impl Keyspace {
    /// 设置 key 的过期时间。返回 key 是否存在。
    ///
    /// `ttl` 为 0 时直接删除该 key。
    pub fn set_ttl(&self, key: &[u8], ttl: Duration) -> bool {
        if ttl.as_millis() == 0 {
            return self.delete(key);
        }
        let deadline = deadline_after(now_ms(), ttl);
        self.update(key, |slot| match slot.as_mut() {
            Some(entry) => {
                entry.expire_at = deadline;
                true
            }
            None => false,
        })
    }

    /// 移除 key 的过期属性。仅当 key 存在且原本带 TTL 时返回 true
    pub fn persist(&self, key: &[u8]) -> bool {
        self.update(key, |slot| match slot.as_mut() {
            Some(entry) => entry.expire_at.take().is_some(),
            None => false,
        })
    }

    /// 查询 key 的剩余存活时间（惰性清理已过期的 key）
    pub fn ttl(&self, key: &[u8]) -> TtlStatus {
        let _structure = self.structure.read();
        let now = now_ms();
        let status = match self.entries.get(key) {
            None => return TtlStatus::Missing,
            Some(entry) => match entry.expire_at {
                None => TtlStatus::Persistent,
                Some(deadline) if deadline > now => {
                    TtlStatus::Remaining(Duration::from_millis(deadline - now))
                }
                Some(_) => TtlStatus::Missing,
            },
        };
        if status == TtlStatus::Missing {
            self.remove_expired(key, now);
        }
        status
    }

    /// 单轮主动清理：随机采样至多 `sample_size` 个带 TTL 的 key，删除其中已过期的。
    ///
    /// 每个 key 的检查和删除都在其分片锁内完成；索引中残留的
    /// （已删除或已 PERSIST 的）key 顺带移出索引。
    pub fn sweep(&self, now: u64) -> SweepStats {
        let batch = self.expiry.sample();
        let _structure = self.structure.read();
        let mut stats = SweepStats { sampled: batch.len(), reclaimed: 0 };

        for key in batch {
            match self.entries.entry(key) {
                MapEntry::Occupied(occ) => {
                    if is_expired(occ.get(), now) {
                        self.expiry.untrack(occ.key());
                        occ.remove();
                        stats.reclaimed += 1;
                    } else if occ.get().expire_at.is_none() {
                        self.expiry.untrack(occ.key());
                    }
                }
                MapEntry::Vacant(vac) => self.expiry.untrack(vac.key()),
            }
        }
        if stats.reclaimed > 0 {
            self.bump();
            self.note_expired(stats.reclaimed as u64);
        }
        stats
    }

    /// 一个完整的清理周期：反复 `sweep`，直到本轮过期比例低于阈值或轮数耗尽
    pub fn active_expire_cycle(&self, now: u64) -> CycleStats {
        let mut cycle = CycleStats::default();
        while self.expire_round(now, &mut cycle) {}
        cycle
    }

    /// 周期中的一轮：`sweep` 一次并累计到 `cycle`，返回是否应继续下一轮
    fn expire_round(&self, now: u64, cycle: &mut CycleStats) -> bool {
        let stats = self.sweep(now);
        cycle.rounds += 1;
        cycle.sampled += stats.sampled;
        cycle.reclaimed += stats.reclaimed;
        self.expiry.keep_sweeping(cycle.rounds, &stats)
    }
}

/// 解析 EXPIRE/PEXPIRE 的时长参数；非正数表示“立即过期”
pub(crate) fn ttl_from_arg(amount: i64, unit_ms: u64) -> Result<Duration> {
    if amount <= 0 {
        return Ok(Duration::ZERO);
    }
    (amount as u64)
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| StoreError::InvalidArgument("invalid expire time".into()))
}

/// 后台定时清理任务
///
/// 每个 tick 执行一个清理周期；两轮采样之间 `yield_now`，
/// 不会长时间占用 key space 的锁。
pub async fn start_cleaner(keyspace: Arc<Keyspace>, period: Duration) {
    let mut iv = interval(period);
    iv.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(period_ms = period.as_millis() as u64, "expire cleaner started");
    loop {
        iv.tick().await;
        let now = now_ms();
        let mut cycle = CycleStats::default();
        while keyspace.expire_round(now, &mut cycle) {
            tokio::task::yield_now().await;
        }
        if cycle.reclaimed > 0 {
            debug!(rounds = cycle.rounds, sampled = cycle.sampled, reclaimed = cycle.reclaimed, "expire cycle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn keyspace(sample_size: usize) -> Keyspace {
        Keyspace::new(&StoreConfig { sample_size, ..StoreConfig::default() })
    }

    fn entry_with(expire_at: Option<u64>) -> Entry {
        Entry { value: Value::string("v"), expire_at }
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let e = entry_with(None);
        for now in [0, 1, now_ms(), u64::MAX] {
            assert!(!is_expired(&e, now));
        }
    }

    #[test]
    fn test_ttl_boundary() {
        let t0 = 1_000_000;
        let d = Duration::from_millis(1500);
        let e = entry_with(deadline_after(t0, d));
        assert!(!is_expired(&e, t0));
        assert!(!is_expired(&e, t0 + 1499));
        assert!(is_expired(&e, t0 + 1500));
        assert!(is_expired(&e, t0 + 10_000));
    }

    #[test]
    fn test_volatile_keys_index() {
        let mut v = VolatileKeys::default();
        v.insert(b"a");
        v.insert(b"b");
        v.insert(b"c");
        v.insert(b"a");
        assert_eq!(v.keys.len(), 3);

        v.remove(b"a");
        v.remove(b"zzz");
        assert_eq!(v.keys.len(), 2);
        for (i, k) in v.keys.iter().enumerate() {
            assert_eq!(v.slots[k], i);
        }
        let mut s = v.sample(10);
        s.sort();
        assert_eq!(s, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_expire_persist_ttl() {
        let ks = keyspace(20);
        assert!(!ks.set_ttl(b"nope", Duration::from_secs(10)));
        assert_eq!(ks.ttl(b"nope"), TtlStatus::Missing);

        ks.set(b"k", Value::string("v"), None);
        assert_eq!(ks.ttl(b"k"), TtlStatus::Persistent);
        assert!(ks.set_ttl(b"k", Duration::from_secs(100)));
        match ks.ttl(b"k") {
            TtlStatus::Remaining(d) => assert!(d <= Duration::from_secs(100) && d > Duration::from_secs(98)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ks.expiry.tracked(), 1);

        assert!(ks.persist(b"k"));
        assert!(!ks.persist(b"k"));
        assert_eq!(ks.ttl(b"k"), TtlStatus::Persistent);
        assert_eq!(ks.expiry.tracked(), 0);

        // 0 -> 立即删除
        assert!(ks.set_ttl(b"k", Duration::ZERO));
        assert!(!ks.exists(b"k"));
    }

    #[test]
    fn test_lazy_expiry_on_read() {
        let ks = keyspace(20);
        ks.set(b"k", Value::string("v"), Some(Duration::from_millis(20)));
        assert!(ks.exists(b"k"));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(ks.get(b"k"), None);
        // 读取的副作用：物理删除
        assert!(ks.entries.get(&b"k"[..]).is_none());
        assert_eq!(ks.expiry.tracked(), 0);
    }

    #[test]
    fn test_lazy_expiry_on_write_is_counted() {
        let ks = keyspace(20);
        ks.set(b"k", Value::string("v"), Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));
        // 覆盖一个已过期的 key 也算一次过期回收
        ks.set(b"k", Value::string("w"), None);
        assert_eq!(ks.expired_keys(), 1);
        assert_eq!(ks.get(b"k"), Some(Value::string("w")));
        assert_eq!(ks.expiry.tracked(), 0);

        ks.set(b"n", Value::string("1"), Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));
        ks.update(b"n", |slot| assert!(slot.is_none()));
        assert_eq!(ks.expired_keys(), 2);
    }

    #[test]
    fn test_sweep_is_bounded_by_sample_size() {
        let ks = keyspace(5);
        for i in 0..50 {
            ks.set(format!("k{}", i).as_bytes(), Value::string("v"), Some(Duration::from_millis(10)));
        }
        let later = now_ms() + 60_000;

        let stats = ks.sweep(later);
        assert_eq!(stats.sampled, 5);
        assert_eq!(stats.reclaimed, 5);
        assert_eq!(ks.entries.len(), 45);
        assert_eq!(ks.expiry.tracked(), 45);
        assert_eq!(ks.expired_keys(), 5);
    }

    #[test]
    fn test_sweep_ignores_live_keys() {
        let ks = keyspace(10);
        for i in 0..10 {
            ks.set(format!("live{}", i).as_bytes(), Value::string("v"), Some(Duration::from_secs(600)));
        }
        ks.set(b"plain", Value::string("v"), None);
        let stats = ks.sweep(now_ms());
        assert_eq!(stats, SweepStats { sampled: 10, reclaimed: 0 });
        assert_eq!(ks.entries.len(), 11);
    }

    #[test]
    fn test_cycle_stops_at_round_budget() {
        let cfg = StoreConfig { sample_size: 4, max_sweep_rounds: 3, ..StoreConfig::default() };
        let ks = Keyspace::new(&cfg);
        for i in 0..100 {
            ks.set(format!("k{}", i).as_bytes(), Value::string("v"), Some(Duration::from_millis(10)));
        }
        let cycle = ks.active_expire_cycle(now_ms() + 60_000);
        // 每轮全部过期，比例始终 >= 阈值，只能被轮数预算截断
        assert_eq!(cycle, CycleStats { rounds: 3, sampled: 12, reclaimed: 12 });
        assert_eq!(ks.entries.len(), 88);
    }

    #[test]
    fn test_cycle_stops_when_ratio_drops() {
        let cfg = StoreConfig { sample_size: 10, max_sweep_rounds: 50, ..StoreConfig::default() };
        let ks = Keyspace::new(&cfg);
        for i in 0..10 {
            ks.set(format!("live{}", i).as_bytes(), Value::string("v"), Some(Duration::from_secs(600)));
        }
        let cycle = ks.active_expire_cycle(now_ms());
        assert_eq!(cycle.rounds, 1);
        assert_eq!(cycle.reclaimed, 0);
    }

    #[test]
    fn test_expire_round_shares_stop_rule() {
        let cfg = StoreConfig { sample_size: 2, max_sweep_rounds: 2, ..StoreConfig::default() };
        let ks = Keyspace::new(&cfg);
        for i in 0..10 {
            ks.set(format!("k{}", i).as_bytes(), Value::string("v"), Some(Duration::from_millis(10)));
        }
        let later = now_ms() + 60_000;
        let mut cycle = CycleStats::default();
        assert!(ks.expire_round(later, &mut cycle));
        assert!(!ks.expire_round(later, &mut cycle));
        assert_eq!(cycle, CycleStats { rounds: 2, sampled: 4, reclaimed: 4 });
        // 完整周期走同一条规则
        assert_eq!(ks.active_expire_cycle(later), cycle);
    }

    #[test]
    fn test_ttl_from_arg() {
        assert_eq!(ttl_from_arg(-5, 1000).unwrap(), Duration::ZERO);
        assert_eq!(ttl_from_arg(0, 1).unwrap(), Duration::ZERO);
        assert_eq!(ttl_from_arg(3, 1000).unwrap(), Duration::from_secs(3));
        assert!(ttl_from_arg(i64::MAX, 1000).is_err());
    }

    #[tokio::test]
    async fn test_background_cleaner_reclaims() {
        let ks = Arc::new(keyspace(20));
        for i in 0..30 {
            ks.set(format!("k{}", i).as_bytes(), Value::string("v"), Some(Duration::from_millis(20)));
        }
        let handle = tokio::spawn(start_cleaner(ks.clone(), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();
        // 没有任何读操作，key 也应被后台任务回收
        assert_eq!(ks.entries.len(), 0);
        assert_eq!(ks.expiry.tracked(), 0);
    }
}
