//! 组件错误类型
//!
//! 所有边界（dispatch / render / attach）都把 ComponentError 转成 Response、bool 或内联错误标记，
//! 并写入 ErrorStore；调用方永远看不到未处理的失败。

use thiserror::Error;

/// 组件运行过程中可能出现的错误（注册、模板、选择器、消息处理、外部协作者等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    /// 唯一对单个实例致命的错误：缺少实例 ID，无法计算注册键
    #[error("Missing instance id for component '{0}'")]
    MissingInstanceId(String),

    /// 重复键且目录策略为 Reject
    #[error("Component key already registered: {0}")]
    DuplicateKey(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("No target selector given")]
    MissingTargetSelector,

    #[error("No element matches selector: {0}")]
    TargetNotFound(String),

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("{0}")]
    Handler(String),

    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("Dispatch timed out after {0}ms")]
    DispatchTimeout(u64),

    #[error("Lifecycle hook failed: {0}")]
    Hook(String),

    #[error("Invalid lifecycle transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::core::Phase,
        to: crate::core::Phase,
    },

    #[error("Render target error: {0}")]
    Surface(String),

    /// 外部传输 / DHT 提供者返回的错误
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ComponentError {
    /// 便捷构造：处理器内部的业务失败
    pub fn handler(msg: impl Into<String>) -> Self {
        ComponentError::Handler(msg.into())
    }
}
