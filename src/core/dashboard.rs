//! 仪表盘环境：显式构造、注入到每个组件的共享资源
//!
//! 目录与错误存储是仅有的两个共享可变资源；渲染目标由宿主环境提供。
//! 测试可以各自创建独立的 Dashboard，互不共享进程状态。

use std::sync::Arc;
use std::time::Duration;

use super::directory::DirectorySettings;
use super::host::{ComponentHost, HostOptions, Widget};
use super::{Directory, ErrorStore};
use crate::config::AppConfig;
use crate::render::{RenderSettings, RenderTarget};

/// 运行时设置
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardSettings {
    pub render: RenderSettings,
    /// dispatch 超时；None 表示不限时
    pub dispatch_timeout: Option<Duration>,
    /// 断开时是否从目录移除（默认保留）
    pub evict_on_disconnect: bool,
}

#[derive(Clone)]
pub struct Dashboard {
    directory: Arc<Directory>,
    errors: Arc<ErrorStore>,
    surface: Arc<dyn RenderTarget>,
    settings: DashboardSettings,
}

impl Dashboard {
    pub fn new(surface: Arc<dyn RenderTarget>) -> Self {
        Self::builder(surface).build()
    }

    pub fn builder(surface: Arc<dyn RenderTarget>) -> DashboardBuilder {
        DashboardBuilder {
            surface,
            directory: DirectorySettings::default(),
            error_capacity: super::error_store::DEFAULT_ERROR_CAPACITY,
            settings: DashboardSettings::default(),
        }
    }

    /// 按配置文件构建
    pub fn from_config(cfg: &AppConfig, surface: Arc<dyn RenderTarget>) -> Self {
        Self::builder(surface)
            .directory(cfg.directory.settings())
            .error_capacity(cfg.errors.capacity)
            .render(cfg.render.settings())
            .dispatch_timeout(cfg.dispatch.timeout())
            .evict_on_disconnect(cfg.directory.evict_on_disconnect)
            .build()
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn errors(&self) -> &Arc<ErrorStore> {
        &self.errors
    }

    pub fn surface(&self) -> &Arc<dyn RenderTarget> {
        &self.surface
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    /// 创建一个组件实例（Constructing 阶段）
    pub fn host<W: Widget>(&self, widget: W, options: HostOptions) -> ComponentHost<W> {
        ComponentHost::new(self, widget, options)
    }

    /// 拆除：清空目录，断开句柄对环境的引用环
    pub fn teardown(&self) {
        self.directory.clear();
        tracing::info!("Dashboard torn down");
    }
}

pub struct DashboardBuilder {
    surface: Arc<dyn RenderTarget>,
    directory: DirectorySettings,
    error_capacity: usize,
    settings: DashboardSettings,
}

impl DashboardBuilder {
    pub fn directory(mut self, settings: DirectorySettings) -> Self {
        self.directory = settings;
        self
    }

    pub fn error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    pub fn render(mut self, render: RenderSettings) -> Self {
        self.settings.render = render;
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.dispatch_timeout = timeout;
        self
    }

    pub fn evict_on_disconnect(mut self, evict: bool) -> Self {
        self.settings.evict_on_disconnect = evict;
        self
    }

    pub fn build(self) -> Dashboard {
        Dashboard {
            directory: Arc::new(Directory::with_settings(self.directory)),
            errors: Arc::new(ErrorStore::with_capacity(self.error_capacity)),
            surface: self.surface,
            settings: self.settings,
        }
    }
}
