//! 错误存储：进程级、容量有限的失败记录
//!
//! 最新记录在前，超出容量的旧记录被截断；snapshot 返回副本，读者不会观察到写入中途的状态。
//! 多线程下由 RwLock 保护。

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 默认容量
pub const DEFAULT_ERROR_CAPACITY: usize = 10;

/// 单条失败记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Unix 毫秒时间戳，record 时写入
    pub timestamp: i64,
    pub component_name: String,
    /// 失败发生的边界，如 postMessage / renderPart / connectedCallback
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorRecord {
    pub fn new(component_name: impl Into<String>, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: 0,
            component_name: component_name.into(),
            source: source.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// 环形错误日志
#[derive(Debug)]
pub struct ErrorStore {
    records: RwLock<VecDeque<ErrorRecord>>,
    capacity: usize,
}

impl ErrorStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ERROR_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// 写入时间戳，放到最前面，截断超出容量的部分；同时输出一条 error 日志
    pub fn record(&self, mut entry: ErrorRecord) -> ErrorRecord {
        entry.timestamp = chrono::Utc::now().timestamp_millis();
        tracing::error!(
            component = %entry.component_name,
            source = %entry.source,
            "{}",
            entry.message
        );

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.push_front(entry.clone());
        records.truncate(self.capacity);
        entry
    }

    /// 最新在前的副本
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 按来源统计（测试与诊断用）
    pub fn count_source(&self, source: &str) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.source == source)
            .count()
    }
}

impl Default for ErrorStore {
    fn default() -> Self {
        Self::new()
    }
}
