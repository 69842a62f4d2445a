//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NODEDECK__*` 覆盖（双下划线表示嵌套，如 `NODEDECK__DIRECTORY__POLL_INTERVAL_MS=50`）。
//! 缺省值与内置常量一致，没有配置文件时行为不变。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::directory::{DEFAULT_LOOKUP_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::core::error_store::DEFAULT_ERROR_CAPACITY;
use crate::core::{DirectorySettings, DuplicatePolicy};
use crate::render::{RebindPolicy, RenderSettings, DEFAULT_FRAME_TIMEOUT};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub directory: DirectorySection,
    pub errors: ErrorsSection,
    pub render: RenderSection,
    pub dispatch: DispatchSection,
}

/// [directory] 段：查找轮询、超时、重复键策略
#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    #[serde(default)]
    pub duplicate_keys: DuplicatePolicy,
    /// 断开时移除目录条目（默认保留）
    #[serde(default)]
    pub evict_on_disconnect: bool,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_lookup_timeout_ms() -> u64 {
    DEFAULT_LOOKUP_TIMEOUT.as_millis() as u64
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            duplicate_keys: DuplicatePolicy::default(),
            evict_on_disconnect: false,
        }
    }
}

impl DirectorySection {
    pub fn settings(&self) -> DirectorySettings {
        DirectorySettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            default_timeout: Duration::from_millis(self.lookup_timeout_ms),
            duplicates: self.duplicate_keys,
        }
    }
}

/// [errors] 段：错误历史容量
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorsSection {
    #[serde(default = "default_error_capacity")]
    pub capacity: usize,
}

fn default_error_capacity() -> usize {
    DEFAULT_ERROR_CAPACITY
}

impl Default for ErrorsSection {
    fn default() -> Self {
        Self {
            capacity: default_error_capacity(),
        }
    }
}

/// [render] 段：帧等待超时、控制器重新绑定策略
#[derive(Debug, Clone, Deserialize)]
pub struct RenderSection {
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
    #[serde(default)]
    pub rebind: RebindPolicy,
}

fn default_frame_timeout_ms() -> u64 {
    DEFAULT_FRAME_TIMEOUT.as_millis() as u64
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            frame_timeout_ms: default_frame_timeout_ms(),
            rebind: RebindPolicy::default(),
        }
    }
}

impl RenderSection {
    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            frame_timeout: Duration::from_millis(self.frame_timeout_ms),
            rebind: self.rebind,
        }
    }
}

/// [dispatch] 段：未设置 timeout_ms 时处理器不限时
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchSection {
    pub timeout_ms: Option<u64>,
}

impl DispatchSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl AppConfig {
    /// 拒绝会让运行时失效的取值
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.directory.poll_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "directory.poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.errors.capacity == 0 {
            return Err(config::ConfigError::Message("errors.capacity must be greater than 0".into()));
        }
        if self.dispatch.timeout_ms == Some(0) {
            return Err(config::ConfigError::Message("dispatch.timeout_ms must be greater than 0".into()));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 NODEDECK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NODEDECK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NODEDECK")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

/// 重新从磁盘与环境变量加载配置；已创建的 Dashboard 不受影响，调用方决定是否用新配置重建
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
