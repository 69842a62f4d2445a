//! 模板表：模板名 → 纯函数 `(state, ctx) -> Markup`
//!
//! 查找顺序：指定名称（未指定则用默认模板名）→ 字面量 "default"。
//! 另提供内置的骨架屏与内联错误标记。

use std::collections::HashMap;
use std::sync::Arc;

use super::markup::{Element, Markup};
use crate::core::State;

/// 模板在 "default" 之外找不到时的兜底名称
pub const FALLBACK_TEMPLATE: &str = "default";
/// 组件自定义骨架屏时使用的模板名
pub const SKELETON_TEMPLATE: &str = "skeleton";

/// 模板调用时可见的组件信息
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub component_type: &'a str,
    pub instance_id: Option<&'a str>,
    pub loading: bool,
}

pub type TemplateFn = Arc<dyn Fn(&State, &TemplateContext<'_>) -> Markup + Send + Sync>;

/// 组件的命名模板集合
#[derive(Clone)]
pub struct TemplateTable {
    templates: HashMap<String, TemplateFn>,
    default_name: String,
}

impl TemplateTable {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            default_name: FALLBACK_TEMPLATE.to_string(),
        }
    }

    pub fn with<F>(mut self, name: impl Into<String>, template: F) -> Self
    where
        F: Fn(&State, &TemplateContext<'_>) -> Markup + Send + Sync + 'static,
    {
        self.templates.insert(name.into(), Arc::new(template));
        self
    }

    /// 指定未传模板名时使用的模板
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// 严格按名称查找（render_part 使用，不做回退）
    pub fn get(&self, name: &str) -> Option<&TemplateFn> {
        self.templates.get(name)
    }

    /// full_render 的查找：请求名 / 默认名，不存在时回退到 "default"；返回实际命中的名称
    pub fn resolve(&self, requested: Option<&str>) -> Option<(&str, &TemplateFn)> {
        let wanted = requested.unwrap_or(self.default_name.as_str());
        self.templates
            .get_key_value(wanted)
            .or_else(|| self.templates.get_key_value(FALLBACK_TEMPLATE))
            .map(|(name, f)| (name.as_str(), f))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TemplateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateTable")
            .field("templates", &self.names())
            .field("default_name", &self.default_name)
            .finish()
    }
}

/// 内置骨架屏
pub fn skeleton_markup(component_type: &str) -> Markup {
    vec![Element::new("div")
        .class("skeleton")
        .attr("aria-busy", "true")
        .attr("data-component", component_type)
        .children((0..3).map(|_| Element::new("div").class("skeleton-line")))
        .into()]
}

/// 内置内联错误
pub fn error_markup(message: &str) -> Markup {
    vec![Element::new("div")
        .class("component-error")
        .attr("role", "alert")
        .text(message)
        .into()]
}
