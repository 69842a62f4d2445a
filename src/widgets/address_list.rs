//! 地址列表组件（address-list）
//!
//! 展示节点的监听地址。新增地址走 render_part 追加一行并用 update_element 刷新计数，
//! 删除与清空走整体重绘。每行的删除按钮由控制器绑定。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::transport::validate_multiaddr;
use super::{dispatch_detached, string_list};
use crate::core::{payload, ComponentError, ComponentHandle, Message, Payload, Repertoire, State, Widget};
use crate::render::{
    Controller, ControllerContext, Element, InsertMode, Markup, RenderOptions, TemplateTable, UpdateAction,
    UpdateOptions,
};

pub const ROW_TEMPLATE: &str = "address-row";

const STYLESHEET: &str = "\
.address-list ul { list-style: none; padding: 0; }
.address-list li { display: flex; justify-content: space-between; }
.address-list .count { border-radius: 8px; padding: 0 6px; }";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressListRequest {
    GetAddresses,
    AddAddress { address: String },
    RemoveAddress { address: String },
    Clear,
}

impl Repertoire for AddressListRequest {
    const TAGS: &'static [&'static str] = &["GET_ADDRESSES", "ADD_ADDRESS", "REMOVE_ADDRESS", "CLEAR"];

    fn tag(&self) -> &'static str {
        match self {
            Self::GetAddresses => "GET_ADDRESSES",
            Self::AddAddress { .. } => "ADD_ADDRESS",
            Self::RemoveAddress { .. } => "REMOVE_ADDRESS",
            Self::Clear => "CLEAR",
        }
    }
}

#[derive(Debug, Default)]
pub struct AddressList;

fn row(address: &str) -> Element {
    Element::new("li")
        .class("address")
        .attr("data-address", address)
        .child(Element::new("code").text(address))
        .child(
            Element::new("button")
                .class("remove")
                .attr("data-address", address)
                .attr("aria-label", format!("Remove {address}"))
                .text("remove"),
        )
}

fn list_view(state: &State) -> Markup {
    let addresses = string_list(state, "addresses");
    vec![Element::new("section")
        .class("address-list")
        .child(
            Element::new("header")
                .child(Element::new("h3").text("Listen addresses"))
                .child(Element::new("span").class("count").text(addresses.len().to_string())),
        )
        .child(
            Element::new("ul")
                .class("addresses")
                .children(addresses.iter().map(|a| row(a))),
        )
        .into()]
}

fn row_view(state: &State) -> Markup {
    match state.get("address").and_then(|v| v.as_str()) {
        Some(address) => vec![row(address).into()],
        None => Vec::new(),
    }
}

struct RemoveButtons;

impl Controller for RemoveButtons {
    fn init(&mut self, ctx: &mut ControllerContext<'_>) -> Result<(), ComponentError> {
        let handle = ctx.handle().clone();
        ctx.on("button.remove", "click", move |event| {
            let Some(address) = handle.surface().attribute(event.current, "data-address") else {
                return;
            };
            dispatch_detached(
                &handle,
                Message::with_data("REMOVE_ADDRESS", json!({ "address": address })),
            );
        })?;
        Ok(())
    }
}

impl AddressList {
    async fn add(&self, handle: &ComponentHandle, address: String) -> Result<Payload, ComponentError> {
        validate_multiaddr(&address)?;
        let (added, count) = handle.update_state(|state| {
            let mut addresses = string_list(state, "addresses");
            let added = !addresses.contains(&address);
            if added {
                addresses.push(address.clone());
                state.insert("addresses".to_string(), json!(addresses));
            }
            (added, addresses.len())
        });
        if !added {
            return Ok(payload(json!({ "added": false, "count": count })));
        }

        // 首次渲染之前没有列表节点，直接整体重绘
        let appended = !handle.is_loading()
            && handle
                .render_part(
                    RenderOptions::new("ul.addresses")
                        .template(ROW_TEMPLATE)
                        .state(payload(json!({ "address": address })))
                        .mode(InsertMode::Append),
                )
                .await;
        if appended {
            // 并发新增时以最新状态为准
            let latest = string_list(&handle.state(), "addresses").len();
            handle
                .update_element(UpdateOptions::new("span.count", UpdateAction::Set).value(latest))
                .await;
        } else {
            handle.full_render(State::new()).await;
        }
        Ok(payload(json!({ "added": true, "count": count })))
    }

    async fn remove(&self, handle: &ComponentHandle, address: &str) -> Result<Payload, ComponentError> {
        let (removed, count) = handle.update_state(|state| {
            let mut addresses = string_list(state, "addresses");
            let before = addresses.len();
            addresses.retain(|a| a != address);
            let removed = addresses.len() != before;
            if removed {
                state.insert("addresses".to_string(), json!(addresses));
            }
            (removed, addresses.len())
        });
        if removed {
            handle.full_render(State::new()).await;
        }
        Ok(payload(json!({ "removed": removed, "count": count })))
    }
}

#[async_trait]
impl Widget for AddressList {
    type Request = AddressListRequest;

    const TYPE: &'static str = "address-list";

    fn templates(&self) -> TemplateTable {
        TemplateTable::new()
            .with("default", |state, _| list_view(state))
            .with(ROW_TEMPLATE, |state, _| row_view(state))
    }

    fn stylesheet(&self) -> Option<&'static str> {
        Some(STYLESHEET)
    }

    fn initial_state(&self) -> State {
        payload(json!({ "addresses": [] }))
    }

    fn controller(&self) -> Option<Box<dyn Controller>> {
        Some(Box::new(RemoveButtons))
    }

    async fn ready(&self, handle: &ComponentHandle) -> Result<(), ComponentError> {
        handle.full_render(State::new()).await;
        Ok(())
    }

    async fn handle(&self, handle: &ComponentHandle, request: AddressListRequest) -> Result<Payload, ComponentError> {
        match request {
            AddressListRequest::GetAddresses => {
                let addresses = string_list(&handle.state(), "addresses");
                Ok(payload(json!({ "count": addresses.len(), "addresses": addresses })))
            }
            AddressListRequest::AddAddress { address } => self.add(handle, address).await,
            AddressListRequest::RemoveAddress { address } => self.remove(handle, &address).await,
            AddressListRequest::Clear => {
                let cleared = handle.update_state(|state| {
                    let cleared = string_list(state, "addresses").len();
                    state.insert("addresses".to_string(), json!([]));
                    cleared
                });
                handle.full_render(State::new()).await;
                Ok(payload(json!({ "cleared": cleared })))
            }
        }
    }
}
