//! Nodedeck - P2P 节点仪表盘组件底座
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 组件键、目录与查找、消息分发、生命周期、错误存储
//! - **observability**: tracing 初始化
//! - **render**: 模板、渲染目标、渲染编排与控制器
//! - **widgets**: 节点控制面板、DHT 面板、地址列表与传输层抽象

pub mod config;
pub mod core;
pub mod observability;
pub mod render;
pub mod widgets;

pub use crate::core::{ComponentHandle, ComponentHost, Dashboard, HostOptions, Message, Response, Widget};
