//! 组件目录与查找服务
//!
//! - register：同步插入 / 覆盖（默认后写者胜，静默），并唤醒等待该键的查找
//! - lookup：已存在则让出一次调度后返回；否则按轮询间隔复查，直到出现或超时返回 None
//! - 每次 lookup 独立计时、独立轮询，互不共享进度
//!
//! 等待者除了按间隔轮询，还挂在按键划分的 Notify 上，注册会直接唤醒它们；
//! 超时仍是最终结果，可选的 CancellationToken 提供显式取消。
//! 目录是显式构造的对象（不是进程级静态表），clear() 即拆除。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::{ComponentError, ComponentHandle, ComponentKey};

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 默认查找超时
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(5000);

/// 同一键重复注册时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// 后写者胜，不给调用方任何反馈
    #[default]
    Replace,
    /// 仍然覆盖，但输出 warn 日志
    Warn,
    /// 拒绝第二次注册，保留第一个句柄
    Reject,
}

/// 目录配置
#[derive(Debug, Clone, Copy)]
pub struct DirectorySettings {
    pub poll_interval: Duration,
    pub default_timeout: Duration,
    pub duplicates: DuplicatePolicy,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_timeout: DEFAULT_LOOKUP_TIMEOUT,
            duplicates: DuplicatePolicy::default(),
        }
    }
}

/// 单次查找的参数
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// 为空时使用目录默认超时
    pub timeout: Option<Duration>,
    /// 为空时使用目录默认轮询间隔
    pub poll_interval: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl LookupOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// 查找结果
#[derive(Clone)]
pub enum LookupOutcome {
    Found(ComponentHandle),
    TimedOut,
    Cancelled,
}

impl std::fmt::Debug for LookupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupOutcome::Found(h) => write!(f, "Found({})", h.describe()),
            LookupOutcome::TimedOut => write!(f, "TimedOut"),
            LookupOutcome::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// 查找报告：结果 + 复查次数 + 耗时
#[derive(Debug, Clone)]
pub struct LookupReport {
    pub outcome: LookupOutcome,
    /// 轮询 / 唤醒后的复查次数（已存在时为 0）
    pub checks: u32,
    pub elapsed: Duration,
}

impl LookupReport {
    pub fn into_handle(self) -> Option<ComponentHandle> {
        match self.outcome {
            LookupOutcome::Found(handle) => Some(handle),
            LookupOutcome::TimedOut | LookupOutcome::Cancelled => None,
        }
    }
}

enum Wake {
    Tick,
    Registered,
    Cancelled,
}

/// 组件键 → 句柄
pub struct Directory {
    entries: RwLock<HashMap<ComponentKey, ComponentHandle>>,
    waiters: RwLock<HashMap<ComponentKey, Arc<Notify>>>,
    settings: DirectorySettings,
}

impl Directory {
    pub fn new() -> Self {
        Self::with_settings(DirectorySettings::default())
    }

    pub fn with_settings(settings: DirectorySettings) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            waiters: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &DirectorySettings {
        &self.settings
    }

    /// 插入或覆盖；只有 Reject 策略下才可能返回 DuplicateKey
    pub fn register(&self, key: ComponentKey, handle: ComponentHandle) -> Result<(), ComponentError> {
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            // 同一实例重新挂载不算重复
            if let Some(existing) = entries.get(&key).filter(|e| !e.same_instance(&handle)) {
                match self.settings.duplicates {
                    DuplicatePolicy::Replace => {}
                    DuplicatePolicy::Warn => {
                        tracing::warn!(
                            key = %key,
                            previous = %existing.describe(),
                            "Duplicate component key, replacing previous handle"
                        );
                    }
                    DuplicatePolicy::Reject => {
                        return Err(ComponentError::DuplicateKey(key.to_string()));
                    }
                }
            }
            entries.insert(key.clone(), handle);
        }

        tracing::info!(key = %key, "Component registered");
        if let Some(notify) = self.waiters.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            notify.notify_waiters();
        }
        Ok(())
    }

    /// 显式移除（默认行为从不移除，需调用方主动选择）
    pub fn unregister(&self, key: &ComponentKey) -> Option<ComponentHandle> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            tracing::info!(key = %key, "Component unregistered");
        }
        removed
    }

    /// 仅当目录中的条目仍是 handle 本身时移除，避免误删同键的新实例
    pub fn unregister_if_same(&self, key: &ComponentKey, handle: &ComponentHandle) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(current) if current.same_instance(handle) => {
                entries.remove(key);
                tracing::info!(key = %key, "Component unregistered");
                true
            }
            _ => false,
        }
    }

    /// 同步读取
    pub fn get(&self, key: &ComponentKey) -> Option<ComponentHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn keys(&self) -> Vec<ComponentKey> {
        let mut keys: Vec<ComponentKey> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 拆除：清空全部条目（也断开句柄 ↔ 目录之间的引用环）
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.waiters.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// 超时返回 None；timeout 为空时使用默认超时
    pub async fn lookup(&self, key: &ComponentKey, timeout: Option<Duration>) -> Option<ComponentHandle> {
        let options = LookupOptions {
            timeout,
            ..Default::default()
        };
        self.lookup_with(key, options).await.into_handle()
    }

    /// `lookup(type, id, timeout)` 形式
    pub async fn lookup_component(
        &self,
        component_type: &str,
        instance_id: &str,
        timeout: Option<Duration>,
    ) -> Option<ComponentHandle> {
        self.lookup(&ComponentKey::new(component_type, instance_id), timeout).await
    }

    /// 完整形式：可指定轮询间隔与取消令牌，返回查找报告
    pub async fn lookup_with(&self, key: &ComponentKey, options: LookupOptions) -> LookupReport {
        let start = Instant::now();
        let timeout = options.timeout.unwrap_or(self.settings.default_timeout);
        let poll = options
            .poll_interval
            .unwrap_or(self.settings.poll_interval)
            .max(Duration::from_millis(1));
        let deadline = deadline_after(start, timeout);

        if let Some(handle) = self.get(key) {
            tokio::task::yield_now().await;
            return LookupReport {
                outcome: LookupOutcome::Found(handle),
                checks: 0,
                elapsed: start.elapsed(),
            };
        }

        let notify = self.waiter(key);
        let mut checks = 0u32;
        let mut next_tick = deadline_after(start, poll).min(deadline);

        let outcome = loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // 上一次读取与 enable 之间发生的注册不会触发唤醒，这里补看一眼（不计入复查次数）
            if let Some(handle) = self.get(key) {
                break LookupOutcome::Found(handle);
            }

            let wake = tokio::select! {
                biased;
                _ = cancelled(options.cancel.as_ref()) => Wake::Cancelled,
                _ = &mut notified => Wake::Registered,
                _ = sleep_until(next_tick) => Wake::Tick,
            };

            if let Wake::Cancelled = wake {
                tracing::debug!(key = %key, checks, "Lookup cancelled");
                break LookupOutcome::Cancelled;
            }

            checks += 1;
            tracing::debug!(key = %key, checks, "Lookup poll");
            if let Some(handle) = self.get(key) {
                break LookupOutcome::Found(handle);
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    key = %key,
                    timeout_ms = timeout.as_millis() as u64,
                    "Lookup timed out"
                );
                break LookupOutcome::TimedOut;
            }
            if let Wake::Tick = wake {
                next_tick = deadline_after(next_tick, poll).min(deadline);
            }
        };

        drop(notify);
        self.release_waiter(key);

        LookupReport {
            outcome,
            checks,
            elapsed: start.elapsed(),
        }
    }

    fn waiter(&self, key: &ComponentKey) -> Arc<Notify> {
        if let Some(n) = self.waiters.read().unwrap_or_else(PoisonError::into_inner).get(key) {
            return Arc::clone(n);
        }
        let mut waiters = self.waiters.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(waiters.entry(key.clone()).or_insert_with(|| Arc::new(Notify::new())))
    }

    /// 没有其他等待者时回收 Notify
    fn release_waiter(&self, key: &ComponentKey) {
        let mut waiters = self.waiters.write().unwrap_or_else(PoisonError::into_inner);
        if waiters.get(key).is_some_and(|n| Arc::strong_count(n) == 1) {
            waiters.remove(key);
        }
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

/// 约 30 年，`Instant` 溢出时的截止时间
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(start: Instant, span: Duration) -> Instant {
    start.checked_add(span).unwrap_or_else(|| start + FAR_FUTURE)
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
