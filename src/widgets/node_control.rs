//! 节点控制面板（node-control）
//!
//! 启动 / 停止节点、拨号对端。节点运行后通过目录找到同页的 address-list 实例，
//! 把监听地址逐条以 ADD_ADDRESS 发过去；停止时发送 CLEAR。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::address_list::AddressList;
use super::dispatch_detached;
use super::transport::{NodeStatus, Transport};
use crate::core::{payload, ComponentError, ComponentHandle, Message, Payload, Repertoire, State, Widget};
use crate::render::{Controller, ControllerContext, Element, Markup, Selector, TemplateTable};

const STYLESHEET: &str = "\
.node-control .status.running { color: #2e7d32; }
.node-control .status.stopped { color: #9e9e9e; }
.node-control .actions button { margin-right: 4px; }";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeControlRequest {
    GetStatus,
    StartNode,
    StopNode,
    Dial { addr: String },
}

impl Repertoire for NodeControlRequest {
    const TAGS: &'static [&'static str] = &["GET_STATUS", "START_NODE", "STOP_NODE", "DIAL"];

    fn tag(&self) -> &'static str {
        match self {
            Self::GetStatus => "GET_STATUS",
            Self::StartNode => "START_NODE",
            Self::StopNode => "STOP_NODE",
            Self::Dial { .. } => "DIAL",
        }
    }
}

pub struct NodeControl {
    transport: Arc<dyn Transport>,
    /// 同页 address-list 的实例 ID
    address_list: Option<String>,
    /// 查找 address-list 的超时；None 使用目录默认值
    lookup_timeout: Option<Duration>,
}

impl NodeControl {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            address_list: None,
            lookup_timeout: None,
        }
    }

    pub fn with_address_list(mut self, instance_id: impl Into<String>) -> Self {
        self.address_list = Some(instance_id.into());
        self
    }

    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    async fn sibling(&self, handle: &ComponentHandle) -> Option<ComponentHandle> {
        let id = self.address_list.as_deref()?;
        let found = handle.lookup(AddressList::TYPE, id, self.lookup_timeout).await;
        if found.is_none() {
            tracing::warn!(component = %handle.describe(), address_list = id, "Address list not found");
        }
        found
    }

    /// 把监听地址推给 address-list，返回成功条数
    async fn publish(&self, handle: &ComponentHandle, addrs: &[String]) -> usize {
        if addrs.is_empty() {
            return 0;
        }
        let Some(list) = self.sibling(handle).await else {
            return 0;
        };
        let mut published = 0;
        for addr in addrs {
            let response = list
                .dispatch(Message::with_data("ADD_ADDRESS", json!({ "address": addr })))
                .await;
            if response.success {
                published += 1;
            }
        }
        published
    }

    async fn show(&self, handle: &ComponentHandle, status: &NodeStatus) -> Result<(), ComponentError> {
        handle.full_render(status_state(status)?).await;
        Ok(())
    }
}

fn status_state(status: &NodeStatus) -> Result<State, ComponentError> {
    match serde_json::to_value(status) {
        Ok(value) => Ok(payload(value)),
        Err(e) => Err(ComponentError::handler(format!("Cannot encode node status: {e}"))),
    }
}

fn panel(state: &State) -> Markup {
    let running = state.get("running").and_then(|v| v.as_bool()).unwrap_or(false);
    let peer_id = state.get("peerId").and_then(|v| v.as_str()).unwrap_or("-");
    let peers = super::string_list(state, "connectedPeers");

    vec![Element::new("section")
        .class("node-control")
        .flag("data-running", running)
        .child(
            Element::new("header").child(Element::new("h3").text("Node")).child(
                Element::new("span")
                    .class("status")
                    .class(if running { "running" } else { "stopped" })
                    .text(if running { "running" } else { "stopped" }),
            ),
        )
        .child(
            Element::new("dl")
                .child(Element::new("dt").text("Peer ID"))
                .child(Element::new("dd").class("peer-id").text(peer_id)),
        )
        .child(
            Element::new("div")
                .class("actions")
                .child(Element::new("button").id("start").flag("disabled", running).text("Start"))
                .child(Element::new("button").id("stop").flag("disabled", !running).text("Stop")),
        )
        .child(
            Element::new("div")
                .class("dial")
                .child(Element::new("input").id("dial-addr").attr("placeholder", "/ip4/.../p2p/..."))
                .child(Element::new("button").id("dial").flag("disabled", !running).text("Dial")),
        )
        .child(
            Element::new("ul")
                .class("peers")
                .children(peers.iter().map(|p| Element::new("li").class("peer").text(p.as_str()))),
        )
        .into()]
}

struct PanelButtons;

impl Controller for PanelButtons {
    fn init(&mut self, ctx: &mut ControllerContext<'_>) -> Result<(), ComponentError> {
        let handle = ctx.handle().clone();
        ctx.on("#start", "click", move |_| dispatch_detached(&handle, Message::new("START_NODE")))?;

        let handle = ctx.handle().clone();
        ctx.on("#stop", "click", move |_| dispatch_detached(&handle, Message::new("STOP_NODE")))?;

        let handle = ctx.handle().clone();
        let input = Selector::parse("input#dial-addr")?;
        ctx.on("#dial", "click", move |_| {
            let surface = handle.surface();
            let addr = surface
                .query(handle.mount(), &input)
                .and_then(|node| surface.attribute(node, "value"))
                .unwrap_or_default();
            dispatch_detached(&handle, Message::with_data("DIAL", json!({ "addr": addr })));
        })?;
        Ok(())
    }
}

#[async_trait]
impl Widget for NodeControl {
    type Request = NodeControlRequest;

    const TYPE: &'static str = "node-control";

    fn templates(&self) -> TemplateTable {
        TemplateTable::new().with("default", |state, _| panel(state))
    }

    fn stylesheet(&self) -> Option<&'static str> {
        Some(STYLESHEET)
    }

    fn controller(&self) -> Option<Box<dyn Controller>> {
        Some(Box::new(PanelButtons))
    }

    async fn ready(&self, handle: &ComponentHandle) -> Result<(), ComponentError> {
        let status = self.transport.status().await?;
        self.show(handle, &status).await?;
        if status.running {
            let published = self.publish(handle, &status.listen_addrs).await;
            tracing::info!(component = %handle.describe(), published, "Listen addresses published");
        }
        Ok(())
    }

    async fn disconnected(&self, handle: &ComponentHandle) {
        tracing::debug!(component = %handle.describe(), "Node control detached");
    }

    async fn handle(&self, handle: &ComponentHandle, request: NodeControlRequest) -> Result<Payload, ComponentError> {
        match request {
            NodeControlRequest::GetStatus => {
                let status = self.transport.status().await?;
                Ok(payload(json!({ "status": status_state(&status)? })))
            }
            NodeControlRequest::StartNode => {
                let status = self.transport.start().await?;
                self.show(handle, &status).await?;
                let published = self.publish(handle, &status.listen_addrs).await;
                Ok(payload(json!({ "status": status_state(&status)?, "published": published })))
            }
            NodeControlRequest::StopNode => {
                self.transport.stop().await?;
                let status = self.transport.status().await?;
                self.show(handle, &status).await?;
                if let Some(list) = self.sibling(handle).await {
                    list.dispatch(Message::new("CLEAR")).await;
                }
                Ok(payload(json!({ "status": status_state(&status)? })))
            }
            NodeControlRequest::Dial { addr } => {
                let peer = self.transport.dial(&addr).await?;
                let status = self.transport.status().await?;
                self.show(handle, &status).await?;
                Ok(payload(json!({ "peerId": peer.peer_id, "addrs": peer.addrs })))
            }
        }
    }
}
