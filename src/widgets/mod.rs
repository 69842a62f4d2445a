//! 仪表盘组件：节点控制面板、DHT 面板、地址列表
//!
//! 组件之间不直接持有引用，而是通过目录按 `type:id` 查找并发送消息。

pub mod address_list;
pub mod dht_manager;
pub mod node_control;
pub mod transport;

pub use address_list::{AddressList, AddressListRequest};
pub use dht_manager::{DhtManager, DhtManagerRequest};
pub use node_control::{NodeControl, NodeControlRequest};
pub use transport::{DhtStats, InMemoryTransport, NodeStatus, PeerInfo, Transport, TransportError};

use crate::core::{ComponentHandle, Message};

/// 在事件处理函数里发起 dispatch：事件回调是同步的，消息在当前 runtime 上异步处理
pub(crate) fn dispatch_detached(handle: &ComponentHandle, message: Message) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(component = %handle.describe(), kind = %message.kind, "No runtime, event dropped");
        return;
    };
    let handle = handle.clone();
    runtime.spawn(async move {
        let kind = message.kind.clone();
        let response = handle.dispatch(message).await;
        if !response.success {
            tracing::debug!(component = %handle.describe(), %kind, error = ?response.error, "Event dispatch failed");
        }
    });
}

/// 从 State 中读字符串数组
pub(crate) fn string_list(state: &crate::core::State, field: &str) -> Vec<String> {
    state
        .get(field)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
