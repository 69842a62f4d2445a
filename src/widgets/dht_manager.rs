//! DHT 面板（dht-manager）
//!
//! 路由表统计、按 peer id 查找、手动刷新。查找结果用 render_part 插到结果列表顶部，
//! `compact` 属性变化时切换面板的 class。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::dispatch_detached;
use super::transport::{DhtStats, Transport};
use crate::core::{payload, ComponentError, ComponentHandle, Message, Payload, Repertoire, State, Widget};
use crate::render::{
    Controller, ControllerContext, Element, InsertMode, Markup, RenderOptions, Selector, TemplateTable, UpdateAction,
    UpdateOptions,
};

pub const RESULT_TEMPLATE: &str = "peer-result";
pub const MISSING_TEMPLATE: &str = "peer-missing";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DhtManagerRequest {
    GetStats,
    FindPeer {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    Refresh,
}

impl Repertoire for DhtManagerRequest {
    const TAGS: &'static [&'static str] = &["GET_STATS", "FIND_PEER", "REFRESH"];

    fn tag(&self) -> &'static str {
        match self {
            Self::GetStats => "GET_STATS",
            Self::FindPeer { .. } => "FIND_PEER",
            Self::Refresh => "REFRESH",
        }
    }
}

pub struct DhtManager {
    transport: Arc<dyn Transport>,
}

impl DhtManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

fn stats_state(stats: &DhtStats) -> State {
    payload(json!({
        "routingTableSize": stats.routing_table_size,
        "refreshes": stats.refreshes,
        "lastRefresh": stats.last_refresh,
    }))
}

fn field(state: &State, name: &str) -> String {
    match state.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

fn panel(state: &State) -> Markup {
    let last_refresh = state
        .get("lastRefresh")
        .and_then(|v| v.as_i64())
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    vec![Element::new("section")
        .class("dht-manager")
        .child(Element::new("h3").text("DHT"))
        .child(
            Element::new("dl")
                .child(Element::new("dt").text("Routing table"))
                .child(Element::new("dd").class("routing-size").text(field(state, "routingTableSize")))
                .child(Element::new("dt").text("Refreshes"))
                .child(Element::new("dd").class("refreshes").text(field(state, "refreshes")))
                .child(Element::new("dt").text("Last refresh"))
                .child(Element::new("dd").class("last-refresh").text(last_refresh)),
        )
        .child(
            Element::new("div")
                .class("query")
                .child(Element::new("input").id("peer-query").attr("placeholder", "peer id"))
                .child(Element::new("button").id("find").text("Find"))
                .child(Element::new("button").id("refresh").text("Refresh")),
        )
        .child(Element::new("ul").class("results"))
        .into()]
}

fn result_row(state: &State) -> Markup {
    let peer = field(state, "peerId");
    let addrs = super::string_list(state, "addrs");
    vec![Element::new("li")
        .class("peer")
        .attr("data-peer", peer.as_str())
        .child(Element::new("code").text(peer.as_str()))
        .child(Element::new("span").class("addrs").text(addrs.join(", ")))
        .into()]
}

fn missing_row(state: &State) -> Markup {
    vec![Element::new("li")
        .class("peer missing")
        .text(format!("Not found: {}", field(state, "peerId")))
        .into()]
}

struct QueryButtons;

impl Controller for QueryButtons {
    fn init(&mut self, ctx: &mut ControllerContext<'_>) -> Result<(), ComponentError> {
        let handle = ctx.handle().clone();
        ctx.on("#refresh", "click", move |_| dispatch_detached(&handle, Message::new("REFRESH")))?;

        let handle = ctx.handle().clone();
        let input = Selector::parse("input#peer-query")?;
        ctx.on("#find", "click", move |_| {
            let surface = handle.surface();
            let peer_id = surface
                .query(handle.mount(), &input)
                .and_then(|node| surface.attribute(node, "value"))
                .unwrap_or_default();
            if peer_id.trim().is_empty() {
                return;
            }
            dispatch_detached(&handle, Message::with_data("FIND_PEER", json!({ "peerId": peer_id })));
        })?;
        Ok(())
    }
}

#[async_trait]
impl Widget for DhtManager {
    type Request = DhtManagerRequest;

    const TYPE: &'static str = "dht-manager";

    fn templates(&self) -> TemplateTable {
        TemplateTable::new()
            .with("default", |state, _| panel(state))
            .with(RESULT_TEMPLATE, |state, _| result_row(state))
            .with(MISSING_TEMPLATE, |state, _| missing_row(state))
    }

    fn controller(&self) -> Option<Box<dyn Controller>> {
        Some(Box::new(QueryButtons))
    }

    async fn ready(&self, handle: &ComponentHandle) -> Result<(), ComponentError> {
        let stats = self.transport.dht_stats().await?;
        handle.full_render(stats_state(&stats)).await;
        Ok(())
    }

    async fn attribute_changed(&self, handle: &ComponentHandle, name: &str, _old: Option<&str>, new: Option<&str>) {
        if name != "compact" {
            return;
        }
        let action = if new.is_some() {
            UpdateAction::Add
        } else {
            UpdateAction::Remove
        };
        handle
            .update_element(UpdateOptions::new("section.dht-manager", action).value("compact"))
            .await;
    }

    async fn handle(&self, handle: &ComponentHandle, request: DhtManagerRequest) -> Result<Payload, ComponentError> {
        match request {
            DhtManagerRequest::GetStats => {
                let stats = self.transport.dht_stats().await?;
                handle.merge_state(stats_state(&stats));
                handle
                    .update_element(
                        UpdateOptions::new("dd.routing-size", UpdateAction::Set).value(stats.routing_table_size),
                    )
                    .await;
                Ok(payload(json!({ "stats": stats_state(&stats) })))
            }
            DhtManagerRequest::Refresh => {
                let stats = self.transport.refresh().await?;
                handle.full_render(stats_state(&stats)).await;
                Ok(payload(json!({ "stats": stats_state(&stats) })))
            }
            DhtManagerRequest::FindPeer { peer_id } => {
                let found = self.transport.find_peer(&peer_id).await?;
                let (template, row) = match &found {
                    Some(peer) => (RESULT_TEMPLATE, json!({ "peerId": peer.peer_id, "addrs": peer.addrs })),
                    None => (MISSING_TEMPLATE, json!({ "peerId": peer_id })),
                };
                handle
                    .render_part(
                        RenderOptions::new("ul.results")
                            .template(template)
                            .state(payload(row))
                            .mode(InsertMode::Prepend),
                    )
                    .await;
                Ok(payload(json!({
                    "found": found.is_some(),
                    "addrs": found.map(|p| p.addrs).unwrap_or_default(),
                })))
            }
        }
    }
}
