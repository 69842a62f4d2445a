//! 单元测试共用的探针组件

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    payload, ComponentError, ComponentHandle, ComponentHost, Dashboard, HostOptions, Message, Payload, Repertoire, State,
    Widget,
};
use crate::render::{Controller, ControllerContext, Element, MemorySurface, TemplateTable};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum ProbeRequest {
    Echo { text: String },
    Fail { reason: String },
    Panic,
    Sleep { ms: u64 },
}

impl Repertoire for ProbeRequest {
    const TAGS: &'static [&'static str] = &["ECHO", "FAIL", "PANIC", "SLEEP"];

    fn tag(&self) -> &'static str {
        match self {
            Self::Echo { .. } => "ECHO",
            Self::Fail { .. } => "FAIL",
            Self::Panic => "PANIC",
            Self::Sleep { .. } => "SLEEP",
        }
    }
}

/// 点击 `button#bump` 计数；ready 可配置为失败或 panic
///
/// 默认模板在 `state.explode` 为 true 时 panic，"boom" 模板总是 panic。
#[derive(Default)]
pub(crate) struct Probe {
    pub clicks: Arc<AtomicUsize>,
    pub fail_ready: bool,
    pub panic_in_ready: bool,
    pub panic_in_skeleton: bool,
    pub attribute_calls: Arc<AtomicUsize>,
}

impl Probe {
    pub fn failing() -> Self {
        Self {
            fail_ready: true,
            ..Default::default()
        }
    }
}

struct Bump {
    clicks: Arc<AtomicUsize>,
}

impl Controller for Bump {
    fn init(&mut self, ctx: &mut ControllerContext<'_>) -> Result<(), ComponentError> {
        let clicks = Arc::clone(&self.clicks);
        ctx.on("button#bump", "click", move |_| {
            clicks.fetch_add(1, Ordering::SeqCst);
        })?;
        Ok(())
    }
}

#[async_trait]
impl Widget for Probe {
    type Request = ProbeRequest;

    const TYPE: &'static str = "probe";

    fn templates(&self) -> TemplateTable {
        let table = TemplateTable::new()
            .with("default", |state: &State, _| {
                if state.get("explode").and_then(|v| v.as_bool()).unwrap_or(false) {
                    panic!("template exploded");
                }
                let label = state.get("label").and_then(|v| v.as_str()).unwrap_or("");
                vec![Element::new("div")
                    .class("probe")
                    .child(Element::new("span").id("label").text(label))
                    .child(Element::new("button").id("bump").text("+"))
                    .child(Element::new("ul").class("items").child(Element::new("li").id("anchor").text("anchor")))
                    .into()]
            })
            .with("item", |state: &State, _| {
                let label = state.get("label").and_then(|v| v.as_str()).unwrap_or("");
                vec![Element::new("li").class("item").text(label).into()]
            })
            .with("alt", |_: &State, _| vec![Element::new("p").class("alt").text("alt").into()])
            .with("boom", |_: &State, _| -> crate::render::Markup { panic!("boom") });
        if self.panic_in_skeleton {
            table.with("skeleton", |_: &State, _| -> crate::render::Markup { panic!("skeleton exploded") })
        } else {
            table
        }
    }

    fn stylesheet(&self) -> Option<&'static str> {
        Some(".probe { display: block; }")
    }

    fn controller(&self) -> Option<Box<dyn Controller>> {
        Some(Box::new(Bump {
            clicks: Arc::clone(&self.clicks),
        }))
    }

    async fn ready(&self, _handle: &ComponentHandle) -> Result<(), ComponentError> {
        if self.panic_in_ready {
            panic!("ready exploded");
        }
        if self.fail_ready {
            return Err(ComponentError::Hook("probe refused to start".into()));
        }
        Ok(())
    }

    async fn attribute_changed(&self, _handle: &ComponentHandle, _name: &str, _old: Option<&str>, _new: Option<&str>) {
        self.attribute_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn handle(&self, _handle: &ComponentHandle, request: ProbeRequest) -> Result<Payload, ComponentError> {
        match request {
            ProbeRequest::Echo { text } => Ok(payload(json!({ "echo": text }))),
            ProbeRequest::Fail { reason } => Err(ComponentError::handler(reason)),
            ProbeRequest::Panic => panic!("probe exploded"),
            ProbeRequest::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Payload::new())
            }
        }
    }
}

pub(crate) fn dashboard() -> (Arc<MemorySurface>, Dashboard) {
    let surface = Arc::new(MemorySurface::new());
    let dashboard = Dashboard::new(surface.clone());
    (surface, dashboard)
}

/// 已挂载（Registered）的探针
pub(crate) async fn mounted(dashboard: &Dashboard, id: &str) -> ComponentHost<Probe> {
    let host = dashboard.host(Probe::default(), HostOptions::new().id(id));
    host.attach().await;
    host
}

/// 按 TAGS 的顺序给出每个标签的样例消息与期望解码结果
pub(crate) fn assert_tags_decode<R>(cases: &[(Message, R)])
where
    R: Repertoire + PartialEq + std::fmt::Debug,
{
    let tags: Vec<&str> = cases.iter().map(|(_, expected)| expected.tag()).collect();
    assert_eq!(tags, R::TAGS);
    for (message, expected) in cases {
        assert_eq!(message.kind, expected.tag());
        assert_eq!(&R::decode(message).unwrap(), expected);
    }
}
