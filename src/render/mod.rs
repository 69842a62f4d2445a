//! 渲染编排：模板 → 标记 → 渲染目标 → 控制器重新绑定

pub mod controller;
pub mod markup;
pub mod orchestrator;
pub mod selector;
pub mod surface;
pub mod template;

use std::time::Duration;

use serde::Deserialize;

pub use controller::{Controller, ControllerContext};
pub use markup::{to_html, Element, Markup, Node};
pub use orchestrator::{RenderOptions, UpdateAction, UpdateOptions};
pub use selector::Selector;
pub use surface::{Event, EventHandler, FrameMode, InsertMode, MemorySurface, NodeId, Patch, RenderTarget};
pub use template::{TemplateContext, TemplateFn, TemplateTable};

/// 等待一帧的兜底超时
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(100);

/// 控制器重新绑定策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebindPolicy {
    /// 每次渲染都 teardown + init
    #[default]
    Always,
    /// 只有渲染目标的结构代数变化时才重新绑定
    OnChange,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub frame_timeout: Duration,
    pub rebind: RebindPolicy,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            rebind: RebindPolicy::default(),
        }
    }
}
