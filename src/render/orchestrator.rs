//! 渲染编排器
//!
//! - full_render：浅合并状态 → 解析模板（回退到 "default"）→ 替换组件根内容 → 等一帧 → 重新绑定控制器 → 清除加载标记
//! - render_part：按名称渲染模板并以五种方式之一插入到选择器命中的元素
//! - update_element：对单个元素做声明式的单属性补丁
//!
//! 三个入口都不会向调用方抛错：失败写入 ErrorStore，只以 bool 体现。
//! 同一句柄上的渲染通过渲染门串行执行。

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::surface::{InsertMode, NodeId, Patch};
use super::template::{error_markup, skeleton_markup, TemplateContext, TemplateFn, SKELETON_TEMPLATE};
use super::{Markup, Selector};
use crate::core::handle::panic_message;
use crate::core::{ComponentError, ComponentHandle, State};

pub const RENDER_SOURCE: &str = "render";
pub const RENDER_PART_SOURCE: &str = "renderPart";
pub const UPDATE_ELEMENT_SOURCE: &str = "updateElement";
pub const CONTROLLER_SOURCE: &str = "controller";

/// render_part 参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// 为空时使用模板表的默认模板名
    #[serde(default)]
    pub template_name: Option<String>,
    /// 叠加在当前状态之上参与本次渲染，不写回组件状态
    #[serde(default)]
    pub state: Option<State>,
    #[serde(default)]
    pub target_selector: Option<String>,
    #[serde(default)]
    pub insert_mode: InsertMode,
}

impl RenderOptions {
    pub fn new(target_selector: impl Into<String>) -> Self {
        Self {
            target_selector: Some(target_selector.into()),
            ..Default::default()
        }
    }

    pub fn template(mut self, name: impl Into<String>) -> Self {
        self.template_name = Some(name.into());
        self
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn mode(mut self, mode: InsertMode) -> Self {
        self.insert_mode = mode;
        self
    }
}

/// update_element 的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    #[default]
    Set,
    Append,
    Prepend,
    Toggle,
    Add,
    Remove,
}

/// update_element 参数
///
/// | action | property 为空 | property 指定 |
/// |---|---|---|
/// | set | 文本内容 | `style` 对象合并样式；`dataset` 对象写 `data-*`；布尔值开关属性；其他写属性值 |
/// | append / prepend | 追加文本 | 拼接到属性值 |
/// | toggle | 错误 | `class` 时切换 value 指定的 class，否则翻转布尔属性 |
/// | add / remove | 操作 class | 操作该多值属性 |
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    pub target_selector: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub action: UpdateAction,
}

impl UpdateOptions {
    pub fn new(target_selector: impl Into<String>, action: UpdateAction) -> Self {
        Self {
            target_selector: target_selector.into(),
            action,
            ..Default::default()
        }
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }
}

impl ComponentHandle {
    fn template_context(&self, loading: bool) -> TemplateContext<'_> {
        TemplateContext {
            component_type: self.component_type(),
            instance_id: self.instance_id(),
            loading,
        }
    }

    /// 合并状态并用默认模板整体重绘
    pub async fn full_render(&self, partial: State) -> bool {
        self.full_render_with(partial, None).await
    }

    /// 合并状态并用指定模板整体重绘；模板不存在时回退到 "default"
    pub async fn full_render_with(&self, partial: State, template_name: Option<&str>) -> bool {
        let _gate = self.core.render_gate.lock().await;
        let state = self.merge_state(partial);

        let Some((name, template)) = self.templates().resolve(template_name) else {
            let wanted = template_name.unwrap_or(self.templates().default_name());
            self.report(RENDER_SOURCE, &ComponentError::TemplateNotFound(wanted.to_string()), None);
            return false;
        };
        tracing::debug!(component = %self.describe(), template = name, "Full render");

        let markup = match run_template(template, &state, &self.template_context(self.is_loading())) {
            Ok(markup) => markup,
            Err(err) => {
                self.report(RENDER_SOURCE, &err, Some(serde_json::json!({ "templateName": name })));
                return false;
            }
        };
        if let Err(err) = self.surface().replace_children(self.mount(), &markup) {
            self.report(RENDER_SOURCE, &err, None);
            return false;
        }

        let bound = self.settle().await;
        self.set_loading(false);
        bound
    }

    /// 渲染一个命名模板并插入到目标元素
    pub async fn render_part(&self, options: RenderOptions) -> bool {
        let _gate = self.core.render_gate.lock().await;

        if let Err(err) = self.apply_part(&options) {
            self.report(
                RENDER_PART_SOURCE,
                &err,
                Some(serde_json::json!({
                    "templateName": options.template_name,
                    "targetSelector": options.target_selector,
                })),
            );
            return false;
        }
        self.settle().await
    }

    fn apply_part(&self, options: &RenderOptions) -> Result<(), ComponentError> {
        let templates = self.templates();
        let name = options
            .template_name
            .as_deref()
            .unwrap_or(templates.default_name());
        let template = templates
            .get(name)
            .ok_or_else(|| ComponentError::TemplateNotFound(name.to_string()))?;

        let selector = options
            .target_selector
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ComponentError::MissingTargetSelector)?;
        let target = self.resolve_target(selector)?;

        let mut state = self.state();
        if let Some(overlay) = &options.state {
            for (k, v) in overlay {
                state.insert(k.clone(), v.clone());
            }
        }
        let markup = run_template(template, &state, &self.template_context(self.is_loading()))?;
        self.surface().insert(target, &markup, options.insert_mode)
    }

    /// 单元素属性补丁；不重新绑定控制器
    pub async fn update_element(&self, options: UpdateOptions) -> bool {
        let _gate = self.core.render_gate.lock().await;

        let result = self
            .resolve_target(&options.target_selector)
            .and_then(|target| {
                for patch in self.patches_for(target, &options)? {
                    self.surface().patch(target, &patch)?;
                }
                Ok(())
            });

        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    component = %self.describe(),
                    selector = %options.target_selector,
                    "update_element failed: {}",
                    err
                );
                self.report(
                    UPDATE_ELEMENT_SOURCE,
                    &err,
                    Some(serde_json::json!({
                        "targetSelector": options.target_selector,
                        "action": options.action,
                    })),
                );
                false
            }
        }
    }

    fn resolve_target(&self, selector: &str) -> Result<NodeId, ComponentError> {
        if selector.trim().is_empty() {
            return Err(ComponentError::MissingTargetSelector);
        }
        let parsed = Selector::parse(selector)?;
        self.surface()
            .query(self.mount(), &parsed)
            .ok_or_else(|| ComponentError::TargetNotFound(selector.to_string()))
    }

    fn patches_for(&self, target: NodeId, options: &UpdateOptions) -> Result<Vec<Patch>, ComponentError> {
        let value = &options.value;
        let property = options.property.as_deref();

        let patches = match (options.action, property) {
            (UpdateAction::Set, None) => vec![Patch::SetText(value_text(value))],
            (UpdateAction::Set, Some("style")) => {
                let entries = object(value, "style")?
                    .iter()
                    .map(|(k, v)| (k.clone(), value_text(v)))
                    .collect::<BTreeMap<_, _>>();
                vec![Patch::SetStyle(entries)]
            }
            (UpdateAction::Set, Some("dataset")) => object(value, "dataset")?
                .iter()
                .map(|(k, v)| Patch::SetAttribute {
                    name: format!("data-{}", kebab(k)),
                    value: value_text(v),
                })
                .collect(),
            (UpdateAction::Set, Some(name)) => match value {
                Value::Bool(true) => vec![Patch::SetAttribute {
                    name: name.to_string(),
                    value: String::new(),
                }],
                Value::Bool(false) | Value::Null => vec![Patch::RemoveAttribute(name.to_string())],
                other => vec![Patch::SetAttribute {
                    name: name.to_string(),
                    value: value_text(other),
                }],
            },
            (UpdateAction::Append, None) => vec![Patch::AppendText(value_text(value))],
            (UpdateAction::Prepend, None) => vec![Patch::PrependText(value_text(value))],
            (action @ (UpdateAction::Append | UpdateAction::Prepend), Some(name)) => {
                let current = self.surface().attribute(target, name).unwrap_or_default();
                let joined = if action == UpdateAction::Append {
                    format!("{current}{}", value_text(value))
                } else {
                    format!("{}{current}", value_text(value))
                };
                vec![Patch::SetAttribute {
                    name: name.to_string(),
                    value: joined,
                }]
            }
            (UpdateAction::Toggle, None) => {
                return Err(ComponentError::InvalidUpdate("toggle requires a property".into()));
            }
            (UpdateAction::Toggle, Some("class")) => vec![Patch::ToggleToken {
                name: "class".to_string(),
                token: non_empty(value_text(value), "toggle class")?,
            }],
            (UpdateAction::Toggle, Some(name)) => vec![Patch::ToggleAttribute(name.to_string())],
            (UpdateAction::Add | UpdateAction::Remove, property) => {
                let name = property.unwrap_or("class").to_string();
                let tokens = tokens(value);
                if tokens.is_empty() {
                    return Err(ComponentError::InvalidUpdate(format!(
                        "{:?} needs at least one token",
                        options.action
                    )));
                }
                if options.action == UpdateAction::Add {
                    vec![Patch::AddTokens { name, tokens }]
                } else {
                    vec![Patch::RemoveTokens { name, tokens }]
                }
            }
        };
        Ok(patches)
    }

    /// 等一帧（超时兜底）后重新绑定控制器；控制器初始化失败返回 false
    async fn settle(&self) -> bool {
        let settings = self.dashboard().settings().render;
        if tokio::time::timeout(settings.frame_timeout, self.surface().next_frame())
            .await
            .is_err()
        {
            tracing::debug!(component = %self.describe(), "No frame before timeout, continuing");
        }

        let mut slot = self.core.controller.lock().await;
        match slot.rebind(self, settings.rebind) {
            Ok(_) => true,
            Err(err) => {
                self.report(CONTROLLER_SOURCE, &err, None);
                false
            }
        }
    }

    /// 挂载时的骨架屏（组件可提供 "skeleton" 模板覆盖内置样式）
    pub(crate) async fn show_skeleton(&self) {
        let _gate = self.core.render_gate.lock().await;
        self.set_loading(true);
        let custom = self
            .templates()
            .get(SKELETON_TEMPLATE)
            .map(|template| run_template(template, &self.state(), &self.template_context(true)));
        let markup: Markup = match custom {
            Some(Ok(markup)) => markup,
            Some(Err(err)) => {
                self.report(RENDER_SOURCE, &err, Some(serde_json::json!({ "templateName": SKELETON_TEMPLATE })));
                skeleton_markup(self.component_type())
            }
            None => skeleton_markup(self.component_type()),
        };
        if let Err(err) = self.surface().replace_children(self.mount(), &markup) {
            self.report(RENDER_SOURCE, &err, None);
        }
    }

    /// 实例级失败：状态写入 `{error}` 并渲染内联错误
    pub(crate) async fn render_error(&self, message: &str) {
        let _gate = self.core.render_gate.lock().await;
        let mut partial = State::new();
        partial.insert("error".to_string(), Value::String(message.to_string()));
        self.merge_state(partial);
        if let Err(err) = self.surface().replace_children(self.mount(), &error_markup(message)) {
            tracing::error!(component = %self.describe(), "Failed to render inline error: {}", err);
        }
        self.set_loading(false);
    }
}

/// 模板函数 panic 转为错误
fn run_template(template: &TemplateFn, state: &State, ctx: &TemplateContext<'_>) -> Result<Markup, ComponentError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| template(state, ctx)))
        .map_err(|panic| ComponentError::HandlerPanicked(panic_message(panic)))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn object<'v>(value: &'v Value, property: &str) -> Result<&'v serde_json::Map<String, Value>, ComponentError> {
    value
        .as_object()
        .ok_or_else(|| ComponentError::InvalidUpdate(format!("{property} expects an object value")))
}

fn non_empty(s: String, what: &str) -> Result<String, ComponentError> {
    if s.trim().is_empty() {
        Err(ComponentError::InvalidUpdate(format!("{what} needs a value")))
    } else {
        Ok(s.trim().to_string())
    }
}

fn tokens(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_text).filter(|s| !s.is_empty()).collect(),
        other => value_text(other).split_whitespace().map(str::to_string).collect(),
    }
}

/// camelCase → kebab-case（dataset 键）
fn kebab(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
