//! 组件宿主：驱动单个组件实例的生命周期
//!
//! attach：Attaching →（加载样式 + 骨架屏）→ ready 钩子 → Ready → 计算键并注册 → Registered。
//! 缺少实例 ID 只让本实例失败：记录错误、渲染内联错误、不写目录，不向外传播。
//! disconnect / adopt / attribute_changed 分别调用组件的对应钩子。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::FutureExt;

use super::dashboard::Dashboard;
use super::handle::{panic_message, Core, Endpoint};
use super::{ComponentError, ComponentHandle, ComponentKey, Message, Payload, Phase, Repertoire, State};
use crate::render::controller::ControllerSlot;
use crate::render::{Controller, TemplateTable};

/// 挂载失败写入 ErrorStore 时使用的来源
pub const ATTACH_SOURCE: &str = "connectedCallback";

/// 具体组件类型（业务逻辑）
///
/// 只有实现了本 trait 的具体类型才能被宿主实例化，抽象基类本身无法构造。
#[async_trait]
pub trait Widget: Send + Sync + 'static {
    /// 声明的消息集合
    type Request: Repertoire;

    /// 类型标签，也是目录键的前半部分
    const TYPE: &'static str;

    fn templates(&self) -> TemplateTable;

    /// 组件样式，挂载时按类型加载一次
    fn stylesheet(&self) -> Option<&'static str> {
        None
    }

    fn initial_state(&self) -> State {
        State::new()
    }

    /// 每个实例的控制器；None 表示没有事件绑定
    fn controller(&self) -> Option<Box<dyn Controller>> {
        None
    }

    /// 挂载钩子，返回错误或 panic 时实例渲染内联错误
    async fn ready(&self, _handle: &ComponentHandle) -> Result<(), ComponentError> {
        Ok(())
    }

    /// 断开钩子：停止定时器、释放外部订阅（控制器由宿主销毁）
    async fn disconnected(&self, _handle: &ComponentHandle) {}

    async fn adopted(&self, _handle: &ComponentHandle) {}

    async fn attribute_changed(
        &self,
        _handle: &ComponentHandle,
        _name: &str,
        _old: Option<&str>,
        _new: Option<&str>,
    ) {
    }

    /// 处理一条已解码的消息
    async fn handle(&self, handle: &ComponentHandle, request: Self::Request) -> Result<Payload, ComponentError>;
}

struct WidgetEndpoint<W: Widget> {
    widget: Arc<W>,
}

#[async_trait]
impl<W: Widget> Endpoint for WidgetEndpoint<W> {
    fn tags(&self) -> &'static [&'static str] {
        W::Request::TAGS
    }

    async fn call(&self, handle: &ComponentHandle, message: &Message) -> Result<Payload, ComponentError> {
        let request = W::Request::decode(message)?;
        tracing::debug!(component = W::TYPE, tag = request.tag(), "Handling message");
        self.widget.handle(handle, request).await
    }
}

/// 宿主选项（对应元素上的属性）
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// 外部分配的实例 ID
    pub instance_id: Option<String>,
    /// 标记为 no-render：不加载样式、不显示骨架屏
    pub no_render: bool,
    /// 排除在模板化之外
    pub exclude_templating: bool,
    /// 宿主节点标签，默认与类型标签相同
    pub tag: Option<String>,
}

impl HostOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn no_render(mut self) -> Self {
        self.no_render = true;
        self
    }

    pub fn exclude_templating(mut self) -> Self {
        self.exclude_templating = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// 组件宿主
pub struct ComponentHost<W: Widget> {
    widget: Arc<W>,
    handle: ComponentHandle,
    options: HostOptions,
}

impl<W: Widget> ComponentHost<W> {
    /// 构造（Constructing）：在渲染目标上创建宿主节点，尚未挂载
    pub fn new(dashboard: &Dashboard, widget: W, options: HostOptions) -> Self {
        let widget = Arc::new(widget);
        let tag = options.tag.clone().unwrap_or_else(|| W::TYPE.to_string());
        let mount = dashboard.surface().mount(&tag);

        let core = Core {
            component_type: W::TYPE,
            instance_id: options.instance_id.clone(),
            state: RwLock::new(widget.initial_state()),
            phase: RwLock::new(Phase::Constructing),
            loading: AtomicBool::new(false),
            templates: widget.templates(),
            controller: tokio::sync::Mutex::new(ControllerSlot::new(widget.controller())),
            render_gate: tokio::sync::Mutex::new(()),
            mount,
            dashboard: dashboard.clone(),
        };
        let endpoint = Arc::new(WidgetEndpoint {
            widget: Arc::clone(&widget),
        });

        Self {
            widget,
            handle: ComponentHandle::new(core, endpoint),
            options,
        }
    }

    pub fn handle(&self) -> &ComponentHandle {
        &self.handle
    }

    pub fn widget(&self) -> &Arc<W> {
        &self.widget
    }

    pub fn phase(&self) -> Phase {
        self.handle.phase()
    }

    fn templated(&self) -> bool {
        !self.options.no_render && !self.options.exclude_templating
    }

    /// 进入渲染树；返回最终阶段（Registered 或 Failed），从不向外抛错
    pub async fn attach(&self) -> Phase {
        if let Err(err) = self.handle.transition(Phase::Attaching) {
            tracing::warn!(component = %self.handle.describe(), "Attach ignored: {}", err);
            return self.phase();
        }

        {
            let mut slot = self.handle.core.controller.lock().await;
            if !slot.is_present() {
                slot.install(self.widget.controller());
            }
        }

        if self.templated() {
            if let Some(css) = self.widget.stylesheet() {
                self.handle.surface().adopt_stylesheet(W::TYPE, css);
            }
            self.handle.show_skeleton().await;
        }

        let connected = AssertUnwindSafe(self.connect())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ComponentError::HandlerPanicked(panic_message(panic))));
        match connected {
            Ok(key) => {
                tracing::info!(key = %key, "Component attached");
                Phase::Registered
            }
            Err(err) => {
                self.handle.report(ATTACH_SOURCE, &err, None);
                if let Err(e) = self.handle.transition(Phase::Failed) {
                    tracing::warn!(component = %self.handle.describe(), "{}", e);
                }
                self.handle.render_error(&err.to_string()).await;
                Phase::Failed
            }
        }
    }

    async fn connect(&self) -> Result<ComponentKey, ComponentError> {
        self.widget.ready(&self.handle).await?;
        self.handle.transition(Phase::Ready)?;

        let key = self.handle.key()?;
        self.handle
            .directory()
            .register(key.clone(), self.handle.clone())?;
        self.handle.transition(Phase::Registered)?;
        Ok(key)
    }

    /// 离开渲染树：调用 disconnected 钩子并销毁控制器；目录条目默认保留
    pub async fn disconnect(&self) -> Phase {
        if let Err(err) = self.handle.transition(Phase::Disconnected) {
            tracing::warn!(component = %self.handle.describe(), "Disconnect ignored: {}", err);
            return self.phase();
        }

        self.widget.disconnected(&self.handle).await;
        self.handle
            .core
            .controller
            .lock()
            .await
            .destroy(self.handle.surface().as_ref());

        if self.handle.dashboard().settings().evict_on_disconnect {
            if let Ok(key) = self.handle.key() {
                self.handle.directory().unregister_if_same(&key, &self.handle);
            }
        }
        tracing::info!(component = %self.handle.describe(), "Component disconnected");
        Phase::Disconnected
    }

    /// 移入另一个渲染上下文：只调用 adopted 钩子，目录不变
    pub async fn adopt(&self) -> Phase {
        if let Err(err) = self.handle.transition(Phase::Adopted) {
            tracing::warn!(component = %self.handle.describe(), "Adopt ignored: {}", err);
            return self.phase();
        }
        self.widget.adopted(&self.handle).await;
        Phase::Adopted
    }

    /// 属性变化：ready 之前的变化被丢弃，返回是否调用了钩子
    pub async fn attribute_changed(&self, name: &str, old: Option<&str>, new: Option<&str>) -> bool {
        if !self.phase().hooks_enabled() {
            tracing::debug!(component = %self.handle.describe(), name, "Attribute change before ready, skipped");
            return false;
        }
        self.widget.attribute_changed(&self.handle, name, old, new).await;
        true
    }
}
