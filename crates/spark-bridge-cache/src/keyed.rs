//! # AsyncKeyedCache：按键去重的异步记忆化缓存
//!
//! ## 核心意图（Why）
//! - 远端服务句柄的创建代价高（建连、握手），同一端点的并发请求必须共享一次创建；
//! - 创建失败不应被“记住”：下一次查询必须重新尝试，而不是回放旧错误。
//!
//! ## 行为契约（What）
//! - `join`/`get`：首次查询时在**同步阶段**把“进行中的结果”登记到表中，再交给调用方等待；
//!   因此任何在结算前到达的同键查询都会拿到同一个 [`SharedOutcome`]，工厂只会被调用一次；
//! - 所有共享同一次尝试的调用方得到同一个值（克隆）或同一个 `Arc<E>` 错误；
//! - 失败时，条目在结果交付之前就被移除（按代际号比对，绝不会误删之后的新尝试）；
//! - `evict` 对任意值类型可用；`invalidate` 仅在 `V: Disposable` 时可用，并在移除后释放已结算的值；
//!   被移除时仍在创建中的值，会在其结算后由分离任务释放；
//! - 工厂 panic 与失败同样处理：条目先被移除，随后 panic 才传播给等待者。
//!
//! ## 并发模型（How）
//! - 表结构使用 `DashMap`，所有操作只在同步区间内持有分片锁，绝不跨 `.await` 持锁；
//! - 尝试本身是惰性的 `Shared` Future：第一次被轮询时才调用工厂；若当前处于 Tokio 运行时，
//!   额外派生一个分离任务驱动它，保证即便所有调用方放弃等待，工厂也会运行到结束。
//!
//! ## 风险提示（Trade-offs）
//! - 缓存无法中止进行中的工厂调用；
//! - 工厂返回的 Future 内若再次同步查询同一键，会直接加入自身的尝试并永远等待，调用方需避免这种自引用。

use std::{
    fmt,
    future::Future,
    hash::Hash,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::dispose::Disposable;

/// 一次尝试的结算结果：值或共享错误。
pub type CacheOutcome<V, E> = Result<V, Arc<E>>;

/// 可被多个等待者共同轮询的进行中结果。
pub type SharedOutcome<V, E> = Shared<BoxFuture<'static, CacheOutcome<V, E>>>;

/// 按键创建值的异步工厂。
///
/// - **契约 (What)**：返回的 Future 必须是 `'static`，因为它会脱离调用方的生命周期独立运行；
/// - 任意 `Fn(K) -> impl Future<Output = Result<V, E>>` 闭包都自动实现该 trait。
pub trait KeyedFactory<K, V, E>: Send + Sync + 'static {
    /// 为 `key` 创建值。
    fn create(&self, key: K) -> BoxFuture<'static, Result<V, E>>;
}

impl<K, V, E, F, Fut> KeyedFactory<K, V, E> for F
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    fn create(&self, key: K) -> BoxFuture<'static, Result<V, E>> {
        (self)(key).boxed()
    }
}

/// 条目在外部可观测的状态。
///
/// 失败条目在结算的同一步被移除，因此不存在可观测的 `Failed` 状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// 工厂尚未结算。
    Pending,
    /// 已得到值。
    Resolved,
}

/// 被移出缓存的条目。
#[derive(Debug)]
pub enum Evicted<V, E> {
    /// 移除时尚未结算；携带进行中的结果，已加入该尝试的调用方仍会收到它。
    Pending(SharedOutcome<V, E>),
    /// 已结算的值。
    Resolved(V),
}

struct CacheSlot<V, E> {
    generation: u64,
    outcome: SharedOutcome<V, E>,
}

/// 按键去重的异步记忆化缓存。
///
/// # 教案式注释
/// - **意图 (Why)**：把“同键只创建一次、失败不缓存”的规则集中在一处，上层只需提供工厂；
/// - **契约 (What)**：
///   - `K` 为已规范化的键（URL 场景请使用 [`EndpointKey`](crate::EndpointKey)）；
///   - `V` 需可克隆，通常是 `Arc<Handle>`；
///   - `E` 为工厂错误，以 `Arc<E>` 共享给全部等待者。
pub struct AsyncKeyedCache<K, V, E> {
    label: &'static str,
    entries: Arc<DashMap<K, CacheSlot<V, E>>>,
    factory: Arc<dyn KeyedFactory<K, V, E>>,
    generations: AtomicU64,
}

impl<K, V, E> AsyncKeyedCache<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    /// 使用工厂构造缓存。
    pub fn new(factory: impl KeyedFactory<K, V, E>) -> Self {
        Self::named("keyed", factory)
    }

    /// 构造带日志标签的缓存，标签会出现在所有 `tracing` 事件的 `cache` 字段中。
    pub fn named(label: &'static str, factory: impl KeyedFactory<K, V, E>) -> Self {
        Self {
            label,
            entries: Arc::new(DashMap::new()),
            factory: Arc::new(factory),
            generations: AtomicU64::new(0),
        }
    }

    /// 查询并等待 `key` 对应的值。
    pub async fn get(&self, key: K) -> CacheOutcome<V, E> {
        self.join(key).await
    }

    /// 返回 `key` 对应的进行中（或已结算）结果，必要时登记新的尝试。
    ///
    /// # 教案式注释
    /// - **执行逻辑 (How)**：
    ///   1. 在分片锁内检查条目：命中则克隆已有的 `Shared`；
    ///   2. 未命中则分配代际号、构造惰性尝试并立即插入；
    ///   3. 释放锁之后再派生分离驱动任务，避免驱动任务在我们持锁时争用同一分片。
    /// - **后置条件 (What)**：返回前条目已在表中，同键的并发调用必然拿到同一个 `Shared`
    ///   （可用 `Shared::ptr_eq` 验证）。
    pub fn join(&self, key: K) -> SharedOutcome<V, E> {
        let (outcome, fresh) = match self.entries.entry(key) {
            Entry::Occupied(occupied) => {
                debug!(cache = self.label, key = ?occupied.key(), "joined existing cache entry");
                (occupied.get().outcome.clone(), false)
            }
            Entry::Vacant(vacant) => {
                let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                let outcome = self.attempt(vacant.key().clone(), generation);
                debug!(cache = self.label, key = ?vacant.key(), generation, "cache miss");
                vacant.insert(CacheSlot {
                    generation,
                    outcome: outcome.clone(),
                });
                (outcome, true)
            }
        };

        if fresh {
            drive_detached(outcome.clone());
        }
        outcome
    }

    fn attempt(&self, key: K, generation: u64) -> SharedOutcome<V, E> {
        let factory = Arc::clone(&self.factory);
        let entries = Arc::downgrade(&self.entries);
        let label = self.label;

        async move {
            // 先移除再交付，保证等待者醒来时下一次查询已能发起新尝试。
            let discard = || {
                if let Some(entries) = entries.upgrade() {
                    entries.remove_if(&key, |_, slot| slot.generation == generation);
                }
            };
            let created = AssertUnwindSafe(async { factory.create(key.clone()).await })
                .catch_unwind()
                .await;
            match created {
                Ok(Ok(value)) => {
                    debug!(cache = label, key = ?key, generation, "cache entry resolved");
                    Ok(value)
                }
                Ok(Err(err)) => {
                    discard();
                    debug!(
                        cache = label,
                        key = ?key,
                        generation,
                        error = %err,
                        "cache factory failed; entry discarded"
                    );
                    Err(Arc::new(err))
                }
                Err(payload) => {
                    discard();
                    warn!(
                        cache = label,
                        key = ?key,
                        generation,
                        "cache factory panicked; entry discarded"
                    );
                    panic::resume_unwind(payload)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// 查询条目状态；未缓存返回 `None`。
    pub fn state(&self, key: &K) -> Option<EntryState> {
        self.entries
            .get(key)
            .map(|slot| match slot.outcome.peek() {
                Some(Ok(_)) => EntryState::Resolved,
                _ => EntryState::Pending,
            })
    }

    /// 移除条目但不释放其值。
    pub fn evict(&self, key: &K) -> Option<Evicted<V, E>> {
        let (_, slot) = self.entries.remove(key)?;
        debug!(cache = self.label, key = ?key, generation = slot.generation, "cache entry evicted");
        Some(match slot.outcome.peek() {
            Some(Ok(value)) => Evicted::Resolved(value.clone()),
            _ => Evicted::Pending(slot.outcome),
        })
    }

    /// 移除全部条目，返回每个键及其移除时的状态。
    pub fn drain(&self) -> Vec<(K, Evicted<V, E>)> {
        let keys: Vec<K> = self.entries.iter().map(|slot| slot.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.evict(&key).map(|evicted| (key, evicted)))
            .collect()
    }

    /// 当前条目数（含进行中）。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V, E> AsyncKeyedCache<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Disposable + Clone + Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    /// 移除条目，并在值已结算时释放它。
    ///
    /// - **契约 (What)**：返回是否确有条目被移除；释放失败记录为 `warn` 日志后丢弃，
    ///   不影响返回值，也不会阻断调用方继续释放其他条目；
    /// - 进行中的条目被移出表后交给 [`dispose_when_settled`](Self::dispose_when_settled)，
    ///   结算成功的值随后被释放。
    pub async fn invalidate(&self, key: &K) -> bool {
        match self.evict(key) {
            Some(Evicted::Resolved(value)) => {
                if let Err(err) = value.dispose().await {
                    warn!(
                        cache = self.label,
                        key = ?key,
                        code = err.code(),
                        error = %err,
                        "dispose failed during invalidation"
                    );
                }
                true
            }
            Some(Evicted::Pending(outcome)) => {
                self.dispose_when_settled(key.clone(), outcome).await;
                true
            }
            None => false,
        }
    }

    /// 释放一个已被移出缓存、仍在创建中的值。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：工厂无法被中止，它产出的句柄不再受缓存管理，必须有人负责归还；
    /// - **执行逻辑 (How)**：处于 Tokio 运行时中时派生分离任务等待结算，调用方不被阻塞；
    ///   否则就地等待；
    /// - **契约 (What)**：结算失败无需释放；释放失败记录 `warn` 日志。
    pub(crate) async fn dispose_when_settled(&self, key: K, outcome: SharedOutcome<V, E>) {
        let label = self.label;
        let release = async move {
            let Ok(value) = outcome.await else {
                return;
            };
            match value.dispose().await {
                Ok(()) => debug!(cache = label, key = ?key, "evicted pending value disposed"),
                Err(err) => warn!(
                    cache = label,
                    key = ?key,
                    code = err.code(),
                    error = %err,
                    "dispose failed for evicted pending value"
                ),
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release);
            }
            Err(_) => release.await,
        }
    }
}

impl<K, V, E> fmt::Debug for AsyncKeyedCache<K, V, E>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncKeyedCache")
            .field("label", &self.label)
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn drive_detached<V, E>(outcome: SharedOutcome<V, E>)
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let _ = outcome.await;
        });
    }
}
