//! 组件句柄：目录里存放的、指向一个活动组件实例的不透明引用
//!
//! 句柄持有实例的私有状态、生命周期阶段、模板表、控制器槽位与加载标记，
//! 并通过类型擦除的 Endpoint 把消息分发给具体组件类型的处理器。
//! dispatch 永远不会把错误抛给调用方：失败转为 `success: false` 并写入 ErrorStore。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{Map, Value};

use super::dashboard::Dashboard;
use super::{ComponentError, ComponentKey, Directory, ErrorRecord, ErrorStore, Message, Payload, Phase, Response};
use crate::render::controller::ControllerSlot;
use crate::render::{NodeId, RenderTarget, TemplateTable};

/// 组件私有状态：任意键值文档
pub type State = Map<String, Value>;

/// dispatch 失败写入 ErrorStore 时使用的来源
pub const DISPATCH_SOURCE: &str = "postMessage";

/// 类型擦除后的消息入口
#[async_trait]
pub(crate) trait Endpoint: Send + Sync {
    fn tags(&self) -> &'static [&'static str];

    async fn call(&self, handle: &ComponentHandle, message: &Message) -> Result<Payload, ComponentError>;
}

pub(crate) struct Core {
    pub(crate) component_type: &'static str,
    pub(crate) instance_id: Option<String>,
    pub(crate) state: RwLock<State>,
    pub(crate) phase: RwLock<Phase>,
    pub(crate) loading: AtomicBool,
    pub(crate) templates: TemplateTable,
    pub(crate) controller: tokio::sync::Mutex<ControllerSlot>,
    /// 同一实例的渲染互斥
    pub(crate) render_gate: tokio::sync::Mutex<()>,
    pub(crate) mount: NodeId,
    pub(crate) dashboard: Dashboard,
}

/// 组件句柄（克隆廉价，指向同一实例）
#[derive(Clone)]
pub struct ComponentHandle {
    pub(crate) core: Arc<Core>,
    endpoint: Arc<dyn Endpoint>,
}

impl ComponentHandle {
    pub(crate) fn new(core: Core, endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            core: Arc::new(core),
            endpoint,
        }
    }

    pub fn component_type(&self) -> &'static str {
        self.core.component_type
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.core.instance_id.as_deref()
    }

    /// 由类型标签与实例 ID 计算注册键；实例 ID 缺失是唯一的致命错误
    pub fn key(&self) -> Result<ComponentKey, ComponentError> {
        ComponentKey::for_instance(self.core.component_type, self.instance_id())
    }

    /// 日志用描述
    pub fn describe(&self) -> String {
        format!("{}:{}", self.component_type(), self.instance_id().unwrap_or("<no id>"))
    }

    /// 该组件类型声明的全部消息标签
    pub fn message_types(&self) -> &'static [&'static str] {
        self.endpoint.tags()
    }

    pub fn same_instance(&self, other: &ComponentHandle) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub fn phase(&self) -> Phase {
        *self.core.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// 校验并迁移生命周期阶段
    pub(crate) fn transition(&self, next: Phase) -> Result<Phase, ComponentError> {
        let mut phase = self.core.phase.write().unwrap_or_else(PoisonError::into_inner);
        let from = *phase;
        if !from.can_transition(next) {
            return Err(ComponentError::InvalidTransition { from, to: next });
        }
        *phase = next;
        tracing::debug!(component = %self.describe(), ?from, to = ?next, "Lifecycle transition");
        Ok(from)
    }

    pub fn state(&self) -> State {
        self.core.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn state_value(&self, field: &str) -> Option<Value> {
        self.core
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(field)
            .cloned()
    }

    /// 浅合并：传入的键覆盖已有键；不触发渲染
    pub fn merge_state(&self, partial: State) -> State {
        let mut state = self.core.state.write().unwrap_or_else(PoisonError::into_inner);
        for (k, v) in partial {
            state.insert(k, v);
        }
        state.clone()
    }

    /// 在同一把写锁内读改写状态；并发的 dispatch 不会互相覆盖
    pub fn update_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.core.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn is_loading(&self) -> bool {
        self.core.loading.load(Ordering::SeqCst)
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.core.loading.store(loading, Ordering::SeqCst);
    }

    pub fn templates(&self) -> &TemplateTable {
        &self.core.templates
    }

    /// 组件在渲染目标中的宿主节点
    pub fn mount(&self) -> NodeId {
        self.core.mount
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.core.dashboard
    }

    pub fn surface(&self) -> &Arc<dyn RenderTarget> {
        self.core.dashboard.surface()
    }

    pub fn directory(&self) -> &Arc<Directory> {
        self.core.dashboard.directory()
    }

    pub fn errors(&self) -> &Arc<ErrorStore> {
        self.core.dashboard.errors()
    }

    /// 控制器自创建以来被重新绑定的次数
    pub async fn controller_rebinds(&self) -> u64 {
        self.core.controller.lock().await.rebinds()
    }

    pub async fn has_controller(&self) -> bool {
        self.core.controller.lock().await.is_present()
    }

    /// 以本组件的类型名写入 ErrorStore
    pub fn report(&self, source: &str, error: &ComponentError, details: Option<Value>) {
        let mut record = ErrorRecord::new(self.component_type(), source, error.to_string());
        if let Some(details) = details {
            record = record.with_details(details);
        }
        self.errors().record(record);
    }

    /// 在目录中查找兄弟组件（超时为空时使用目录默认值）
    pub async fn lookup(&self, component_type: &str, instance_id: &str, timeout: Option<Duration>) -> Option<ComponentHandle> {
        self.directory()
            .lookup_component(component_type, instance_id, timeout)
            .await
    }

    /// 消息分发入口
    ///
    /// - 未声明的标签：`{success:false, error:"Unknown message type", availableTypes:[...]}`
    /// - 处理器返回错误或 panic：`{success:false, error}`，并以 postMessage 来源写入 ErrorStore
    /// - 配置了 dispatch 超时且超时：同上
    pub async fn dispatch(&self, message: Message) -> Response {
        let tags = self.endpoint.tags();
        if !tags.contains(&message.kind.as_str()) {
            tracing::debug!(component = %self.describe(), kind = %message.kind, "Unknown message type");
            return Response::unknown_type(tags);
        }

        let request_id = uuid::Uuid::new_v4();
        tracing::debug!(component = %self.describe(), kind = %message.kind, %request_id, "Dispatch");

        let call = AssertUnwindSafe(self.endpoint.call(self, &message)).catch_unwind();
        let outcome = match self.dashboard().settings().dispatch_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(ComponentError::DispatchTimeout(limit.as_millis() as u64))),
            },
            None => call.await,
        };

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(ComponentError::HandlerPanicked(panic_message(panic))),
        };

        match result {
            Ok(payload) => Response::ok_with(payload),
            Err(err) => {
                self.report(
                    DISPATCH_SOURCE,
                    &err,
                    Some(serde_json::json!({ "type": message.kind, "requestId": request_id.to_string() })),
                );
                Response::failure(err.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("component", &self.describe())
            .field("phase", &self.phase())
            .field("loading", &self.is_loading())
            .finish()
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{dashboard, mounted};
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatch_known_type() {
        let (_surface, dash) = dashboard();
        let host = mounted(&dash, "p").await;
        let resp = host
            .handle()
            .dispatch(Message::with_data("ECHO", json!({ "text": "hi" })))
            .await;
        assert!(resp.success);
        assert_eq!(resp.get("echo"), Some(&json!("hi")));
        assert!(dash.errors().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_is_not_recorded() {
        let (_surface, dash) = dashboard();
        let host = mounted(&dash, "p").await;
        let resp = host.handle().dispatch(Message::new("NOPE")).await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("Unknown message type"));
        assert_eq!(
            resp.available_types.as_deref(),
            Some(&["ECHO".to_string(), "FAIL".to_string(), "PANIC".to_string(), "SLEEP".to_string()][..])
        );
        assert!(dash.errors().is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_is_recorded() {
        let (_surface, dash) = dashboard();
        let host = mounted(&dash, "p").await;
        let resp = host
            .handle()
            .dispatch(Message::with_data("FAIL", json!({ "reason": "disk on fire" })))
            .await;
        assert_eq!(resp, Response::failure("disk on fire"));

        let records = dash.errors().snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].component_name, "probe");
        assert_eq!(records[0].source, DISPATCH_SOURCE);
        assert_eq!(records[0].message, "disk on fire");
        assert_eq!(records[0].details.as_ref().and_then(|d| d.get("type")), Some(&json!("FAIL")));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_failure() {
        let (_surface, dash) = dashboard();
        let host = mounted(&dash, "p").await;
        let resp = host.handle().dispatch(Message::new("PANIC")).await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("Handler panicked: probe exploded"));
        assert_eq!(dash.errors().count_source(DISPATCH_SOURCE), 1);

        // 实例在 panic 之后仍可用
        let resp = host
            .handle()
            .dispatch(Message::with_data("ECHO", json!({ "text": "still here" })))
            .await;
        assert!(resp.success);
    }

    #[tokio::test]
    async fn test_invalid_payload() {
        let (_surface, dash) = dashboard();
        let host = mounted(&dash, "p").await;
        let resp = host
            .handle()
            .dispatch(Message::with_data("ECHO", json!({ "words": 1 })))
            .await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().starts_with("Invalid payload for ECHO"));
        assert_eq!(dash.errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_timeout() {
        let surface = Arc::new(crate::render::MemorySurface::new());
        let dash = Dashboard::builder(surface)
            .dispatch_timeout(Some(Duration::from_millis(50)))
            .build();
        let host = mounted(&dash, "p").await;

        let resp = host
            .handle()
            .dispatch(Message::with_data("SLEEP", json!({ "ms": 200 })))
            .await;
        assert_eq!(resp.error.as_deref(), Some("Dispatch timed out after 50ms"));

        let resp = host
            .handle()
            .dispatch(Message::with_data("SLEEP", json!({ "ms": 10 })))
            .await;
        assert!(resp.success);
    }

    #[tokio::test]
    async fn test_merge_state_is_shallow() {
        let (_surface, dash) = dashboard();
        let host = mounted(&dash, "p").await;
        let handle = host.handle();
        handle.merge_state(crate::core::payload(json!({ "a": 1, "nested": { "x": 1, "y": 2 } })));
        let state = handle.merge_state(crate::core::payload(json!({ "nested": { "x": 9 } })));
        assert_eq!(state.get("a"), Some(&json!(1)));
        assert_eq!(state.get("nested"), Some(&json!({ "x": 9 })));
        assert_eq!(handle.state_value("nested"), Some(json!({ "x": 9 })));
    }

    #[tokio::test]
    async fn test_key_requires_instance_id() {
        let (_surface, dash) = dashboard();
        let host = dash.host(crate::core::testing::Probe::default(), crate::core::HostOptions::new());
        assert_eq!(
            host.handle().key(),
            Err(ComponentError::MissingInstanceId("probe".into()))
        );
        assert_eq!(host.handle().describe(), "probe:<no id>");
    }
}
