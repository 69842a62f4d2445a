//! 模板产出的标记树
//!
//! 模板函数返回 Markup（节点列表），渲染目标把它落到自己的节点树里。
//! `id` 与 `class` 也是普通属性，class 以空格分隔。

use std::collections::BTreeMap;

/// 标记节点
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// 元素节点
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    /// 追加一个或多个 class（空格分隔）
    pub fn class(mut self, class: &str) -> Self {
        let mut classes = class_list(self.attributes.get("class").map(String::as_str));
        for c in class.split_whitespace() {
            if !classes.iter().any(|existing| existing == c) {
                classes.push(c.to_string());
            }
        }
        self.attributes.insert("class".to_string(), classes.join(" "));
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// 布尔属性：true 时写入空值，false 时移除
    pub fn flag(mut self, name: &str, on: bool) -> Self {
        if on {
            self.attributes.insert(name.to_string(), String::new());
        } else {
            self.attributes.remove(name);
        }
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Node::Text(text.into()))
    }
}

impl From<Element> for Node {
    fn from(e: Element) -> Self {
        Node::Element(e)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Text(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Text(s)
    }
}

/// 模板输出
pub type Markup = Vec<Node>;

/// 拆分 class 属性
pub fn class_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// 序列化为 HTML 文本（演示与测试用）
pub fn to_html(markup: &[Node]) -> String {
    let mut out = String::new();
    for node in markup {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.push_str(&escape(text)),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attributes {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&escape(value));
                    out.push('"');
                }
            }
            out.push('>');
            for child in &el.children {
                write_node(out, child);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_html() {
        let markup: Markup = vec![Element::new("ul")
            .class("addresses")
            .class("compact addresses")
            .child(Element::new("li").attr("data-addr", "/ip4/1").text("a<b"))
            .into()];
        assert_eq!(
            to_html(&markup),
            "<ul class=\"addresses compact\"><li data-addr=\"/ip4/1\">a&lt;b</li></ul>"
        );
    }

    #[test]
    fn test_flag_attribute() {
        let el = Element::new("button").flag("disabled", true);
        assert_eq!(el.attributes.get("disabled").map(String::as_str), Some(""));
        let el = el.flag("disabled", false);
        assert!(!el.attributes.contains_key("disabled"));
    }
}
