//! 渲染目标
//!
//! RenderTarget 抽象了组件标记写入的"类 DOM"表面：每个组件挂载一个宿主节点，查询限定在宿主之内
//! （与 shadow root 语义一致）。MemorySurface 是进程内实现：节点树、五种插入方式、属性补丁、
//! 事件监听（监听器绑定在具体节点上，节点被替换后监听器随之消失）、样式表与帧信号。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::markup::{self, class_list, Element, Node};
use super::selector::Selector;
use crate::core::ComponentError;

pub type NodeId = u64;

/// 事件处理函数
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// 派发给监听器的事件
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: String,
    /// 事件最初的目标节点
    pub target: NodeId,
    /// 当前正在处理的节点（冒泡时变化）
    pub current: NodeId,
    pub detail: Value,
}

/// render_part 的五种插入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    /// 替换目标的全部子节点
    #[default]
    #[serde(alias = "replace-contents")]
    Replace,
    Append,
    Prepend,
    /// 作为目标的前一个兄弟插入
    #[serde(alias = "insert-before")]
    Before,
    #[serde(alias = "insert-after")]
    After,
}

/// 单元素补丁（update_element 的底层操作）
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    SetText(String),
    AppendText(String),
    PrependText(String),
    SetAttribute { name: String, value: String },
    RemoveAttribute(String),
    /// 布尔属性取反
    ToggleAttribute(String),
    /// 多值属性（如 class）中加入 token
    AddTokens { name: String, tokens: Vec<String> },
    RemoveTokens { name: String, tokens: Vec<String> },
    ToggleToken { name: String, token: String },
    /// 合并到 style 属性
    SetStyle(BTreeMap<String, String>),
}

/// 类 DOM 渲染目标
#[async_trait]
pub trait RenderTarget: Send + Sync {
    /// 在文档根下创建一个组件宿主节点
    fn mount(&self, tag: &str) -> NodeId;

    /// scope 之内（不含 scope 自身）按文档顺序第一个匹配
    fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId>;

    fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId>;

    fn replace_children(&self, node: NodeId, markup: &[Node]) -> Result<(), ComponentError>;

    fn insert(&self, target: NodeId, markup: &[Node], mode: InsertMode) -> Result<(), ComponentError>;

    fn patch(&self, target: NodeId, patch: &Patch) -> Result<(), ComponentError>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// 元素下全部文本拼接
    fn text(&self, node: NodeId) -> Option<String>;

    /// 子节点序列化
    fn inner_html(&self, node: NodeId) -> String;

    /// 按名称加载样式表；已存在时返回 false
    fn adopt_stylesheet(&self, name: &str, css: &str) -> bool;

    fn listen(&self, node: NodeId, event: &str, handler: EventHandler) -> Option<ListenerId>;

    fn unlisten(&self, id: ListenerId) -> bool;

    /// 结构代数：任何增删节点的操作都会递增
    fn generation(&self) -> u64;

    /// 等待下一帧
    async fn next_frame(&self);
}

/// 帧时钟
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    /// 让出一次调度即视为出帧
    #[default]
    Immediate,
    /// 从不出帧（无头环境），渲染只能靠超时兜底
    Stalled,
}

#[derive(Debug)]
enum NodeKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug)]
struct SurfaceNode {
    parent: Option<NodeId>,
    kind: NodeKind,
    children: Vec<NodeId>,
}

struct Listener {
    id: ListenerId,
    node: NodeId,
    event: String,
    handler: EventHandler,
}

struct Tree {
    nodes: HashMap<NodeId, SurfaceNode>,
    root: NodeId,
    next_id: u64,
    generation: u64,
    listeners: Vec<Listener>,
    stylesheets: BTreeMap<String, String>,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            0,
            SurfaceNode {
                parent: None,
                kind: NodeKind::Element {
                    tag: "body".to_string(),
                    attributes: BTreeMap::new(),
                },
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root: 0,
            next_id: 1,
            generation: 0,
            listeners: Vec::new(),
            stylesheets: BTreeMap::new(),
        }
    }

    fn alloc(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            SurfaceNode {
                parent: Some(parent),
                kind,
                children: Vec::new(),
            },
        );
        id
    }

    /// 构建 markup 对应的节点（尚未挂到 parent.children），返回顶层节点 ID
    fn build(&mut self, parent: NodeId, markup: &[Node]) -> Vec<NodeId> {
        markup
            .iter()
            .map(|node| match node {
                Node::Text(text) => self.alloc(parent, NodeKind::Text(text.clone())),
                Node::Element(el) => {
                    let id = self.alloc(
                        parent,
                        NodeKind::Element {
                            tag: el.tag.to_ascii_lowercase(),
                            attributes: el.attributes.clone(),
                        },
                    );
                    let children = self.build(id, &el.children);
                    if let Some(n) = self.nodes.get_mut(&id) {
                        n.children = children;
                    }
                    id
                }
            })
            .collect()
    }

    /// 删除子树并丢弃挂在这些节点上的监听器
    fn remove_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
        let nodes = &self.nodes;
        self.listeners.retain(|l| nodes.contains_key(&l.node));
    }

    fn element(&self, id: NodeId) -> Result<&SurfaceNode, ComponentError> {
        match self.nodes.get(&id) {
            Some(node @ SurfaceNode { kind: NodeKind::Element { .. }, .. }) => Ok(node),
            Some(_) => Err(ComponentError::Surface(format!("node {id} is not an element"))),
            None => Err(ComponentError::Surface(format!("node {id} does not exist"))),
        }
    }

    fn attributes_mut(&mut self, id: NodeId) -> Result<&mut BTreeMap<String, String>, ComponentError> {
        match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Element { attributes, .. }) => Ok(attributes),
            Some(_) => Err(ComponentError::Surface(format!("node {id} is not an element"))),
            None => Err(ComponentError::Surface(format!("node {id} does not exist"))),
        }
    }

    fn matches(&self, id: NodeId, scope: NodeId, selector: &Selector) -> bool {
        let Some(SurfaceNode {
            kind: NodeKind::Element { tag, attributes },
            parent,
            ..
        }) = self.nodes.get(&id)
        else {
            return false;
        };
        if !selector.subject().matches(tag, attributes) {
            return false;
        }

        let mut cursor = *parent;
        'ancestors: for compound in selector.ancestors() {
            while let Some(ancestor) = cursor {
                if ancestor == scope {
                    return false;
                }
                let node = &self.nodes[&ancestor];
                cursor = node.parent;
                if let NodeKind::Element { tag, attributes } = &node.kind {
                    if compound.matches(tag, attributes) {
                        continue 'ancestors;
                    }
                }
            }
            return false;
        }
        true
    }

    /// scope 的后代，先序遍历
    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(&scope)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn text_of(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.nodes.get(&id) {
            match &node.kind {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element { .. } => {
                    for child in &node.children {
                        self.text_of(*child, out);
                    }
                }
            }
        }
    }

    fn to_markup(&self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get(&id)?;
        Some(match &node.kind {
            NodeKind::Text(text) => Node::Text(text.clone()),
            NodeKind::Element { tag, attributes } => Node::Element(Element {
                tag: tag.clone(),
                attributes: attributes.clone(),
                children: node.children.iter().filter_map(|c| self.to_markup(*c)).collect(),
            }),
        })
    }

    fn set_children_text(&mut self, id: NodeId, text: String, position: TextPosition) -> Result<(), ComponentError> {
        self.element(id)?;
        if position == TextPosition::Replace {
            let old = self.nodes.get_mut(&id).map(|n| std::mem::take(&mut n.children)).unwrap_or_default();
            for child in old {
                self.remove_subtree(child);
            }
        }
        let text_id = self.alloc(id, NodeKind::Text(text));
        if let Some(node) = self.nodes.get_mut(&id) {
            match position {
                TextPosition::Prepend => node.children.insert(0, text_id),
                TextPosition::Replace | TextPosition::Append => node.children.push(text_id),
            }
        }
        self.generation += 1;
        Ok(())
    }
}

#[derive(PartialEq)]
enum TextPosition {
    Replace,
    Append,
    Prepend,
}

/// 进程内渲染目标
pub struct MemorySurface {
    tree: RwLock<Tree>,
    frames: FrameMode,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::with_frames(FrameMode::default())
    }

    pub fn with_frames(frames: FrameMode) -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            frames,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> NodeId {
        self.read().root
    }

    /// 整个文档的 HTML
    pub fn document_html(&self) -> String {
        let root = self.root();
        self.inner_html(root)
    }

    pub fn stylesheet(&self, name: &str) -> Option<String> {
        self.read().stylesheets.get(name).cloned()
    }

    pub fn listener_count(&self) -> usize {
        self.read().listeners.len()
    }

    /// 向 node 派发事件并沿祖先冒泡，返回被调用的处理函数数量
    pub fn dispatch_event(&self, node: NodeId, kind: &str, detail: Value) -> usize {
        let handlers: Vec<(NodeId, EventHandler)> = {
            let tree = self.read();
            let mut path = Vec::new();
            let mut cursor = tree.nodes.get(&node).map(|_| node);
            while let Some(id) = cursor {
                path.push(id);
                cursor = tree.nodes.get(&id).and_then(|n| n.parent);
            }
            path.iter()
                .flat_map(|id| {
                    tree.listeners
                        .iter()
                        .filter(move |l| l.node == *id && l.event == kind)
                        .map(|l| (l.node, Arc::clone(&l.handler)))
                })
                .collect()
        };

        for (current, handler) in &handlers {
            let event = Event {
                kind: kind.to_string(),
                target: node,
                current: *current,
                detail: detail.clone(),
            };
            handler(&event);
        }
        handlers.len()
    }

    /// 在 scope 内按选择器找到第一个元素并派发事件；没有匹配返回 0
    pub fn fire(&self, scope: NodeId, selector: &str, kind: &str) -> usize {
        let Ok(selector) = Selector::parse(selector) else {
            return 0;
        };
        match self.query(scope, &selector) {
            Some(node) => self.dispatch_event(node, kind, Value::Null),
            None => 0,
        }
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderTarget for MemorySurface {
    fn mount(&self, tag: &str) -> NodeId {
        let mut tree = self.write();
        let root = tree.root;
        let id = tree.alloc(
            root,
            NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attributes: BTreeMap::new(),
            },
        );
        if let Some(node) = tree.nodes.get_mut(&root) {
            node.children.push(id);
        }
        tree.generation += 1;
        id
    }

    fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        let tree = self.read();
        tree.descendants(scope)
            .into_iter()
            .find(|id| tree.matches(*id, scope, selector))
    }

    fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let tree = self.read();
        tree.descendants(scope)
            .into_iter()
            .filter(|id| tree.matches(*id, scope, selector))
            .collect()
    }

    fn replace_children(&self, node: NodeId, markup: &[Node]) -> Result<(), ComponentError> {
        let mut tree = self.write();
        tree.element(node)?;
        let old = tree
            .nodes
            .get_mut(&node)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in old {
            tree.remove_subtree(child);
        }
        let fresh = tree.build(node, markup);
        if let Some(n) = tree.nodes.get_mut(&node) {
            n.children = fresh;
        }
        tree.generation += 1;
        Ok(())
    }

    fn insert(&self, target: NodeId, markup: &[Node], mode: InsertMode) -> Result<(), ComponentError> {
        if mode == InsertMode::Replace {
            return self.replace_children(target, markup);
        }

        let mut tree = self.write();
        tree.element(target)?;
        match mode {
            InsertMode::Append | InsertMode::Prepend => {
                let fresh = tree.build(target, markup);
                if let Some(n) = tree.nodes.get_mut(&target) {
                    if mode == InsertMode::Append {
                        n.children.extend(fresh);
                    } else {
                        n.children.splice(0..0, fresh);
                    }
                }
            }
            InsertMode::Before | InsertMode::After => {
                let parent = tree.nodes[&target]
                    .parent
                    .ok_or_else(|| ComponentError::Surface("cannot insert beside the document root".into()))?;
                let fresh = tree.build(parent, markup);
                if let Some(p) = tree.nodes.get_mut(&parent) {
                    let index = p.children.iter().position(|c| *c == target).unwrap_or(p.children.len());
                    let at = if mode == InsertMode::Before { index } else { index + 1 };
                    p.children.splice(at..at, fresh);
                }
            }
            InsertMode::Replace => unreachable!("handled above"),
        }
        tree.generation += 1;
        Ok(())
    }

    fn patch(&self, target: NodeId, patch: &Patch) -> Result<(), ComponentError> {
        let mut tree = self.write();
        match patch {
            Patch::SetText(text) => tree.set_children_text(target, text.clone(), TextPosition::Replace),
            Patch::AppendText(text) => tree.set_children_text(target, text.clone(), TextPosition::Append),
            Patch::PrependText(text) => tree.set_children_text(target, text.clone(), TextPosition::Prepend),
            Patch::SetAttribute { name, value } => {
                tree.attributes_mut(target)?.insert(name.clone(), value.clone());
                Ok(())
            }
            Patch::RemoveAttribute(name) => {
                tree.attributes_mut(target)?.remove(name);
                Ok(())
            }
            Patch::ToggleAttribute(name) => {
                let attributes = tree.attributes_mut(target)?;
                if attributes.remove(name).is_none() {
                    attributes.insert(name.clone(), String::new());
                }
                Ok(())
            }
            Patch::AddTokens { name, tokens } => {
                let attributes = tree.attributes_mut(target)?;
                let mut list = class_list(attributes.get(name).map(String::as_str));
                for token in tokens {
                    if !list.contains(token) {
                        list.push(token.clone());
                    }
                }
                attributes.insert(name.clone(), list.join(" "));
                Ok(())
            }
            Patch::RemoveTokens { name, tokens } => {
                let attributes = tree.attributes_mut(target)?;
                let list: Vec<String> = class_list(attributes.get(name).map(String::as_str))
                    .into_iter()
                    .filter(|t| !tokens.contains(t))
                    .collect();
                attributes.insert(name.clone(), list.join(" "));
                Ok(())
            }
            Patch::ToggleToken { name, token } => {
                let attributes = tree.attributes_mut(target)?;
                let mut list = class_list(attributes.get(name).map(String::as_str));
                match list.iter().position(|t| t == token) {
                    Some(i) => {
                        list.remove(i);
                    }
                    None => list.push(token.clone()),
                }
                attributes.insert(name.clone(), list.join(" "));
                Ok(())
            }
            Patch::SetStyle(entries) => {
                let attributes = tree.attributes_mut(target)?;
                let mut style = parse_style(attributes.get("style").map(String::as_str).unwrap_or_default());
                for (k, v) in entries {
                    if v.is_empty() {
                        style.remove(k);
                    } else {
                        style.insert(k.clone(), v.clone());
                    }
                }
                attributes.insert("style".to_string(), format_style(&style));
                Ok(())
            }
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.read().nodes.get(&node)?.kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).cloned(),
            NodeKind::Text(_) => None,
        }
    }

    fn text(&self, node: NodeId) -> Option<String> {
        let tree = self.read();
        tree.element(node).ok()?;
        let mut out = String::new();
        tree.text_of(node, &mut out);
        Some(out)
    }

    fn inner_html(&self, node: NodeId) -> String {
        let tree = self.read();
        let children: Vec<Node> = tree
            .nodes
            .get(&node)
            .map(|n| n.children.iter().filter_map(|c| tree.to_markup(*c)).collect())
            .unwrap_or_default();
        markup::to_html(&children)
    }

    fn adopt_stylesheet(&self, name: &str, css: &str) -> bool {
        let mut tree = self.write();
        if tree.stylesheets.contains_key(name) {
            return false;
        }
        tree.stylesheets.insert(name.to_string(), css.to_string());
        true
    }

    fn listen(&self, node: NodeId, event: &str, handler: EventHandler) -> Option<ListenerId> {
        let mut tree = self.write();
        tree.element(node).ok()?;
        let id = ListenerId(tree.next_id);
        tree.next_id += 1;
        tree.listeners.push(Listener {
            id,
            node,
            event: event.to_string(),
            handler,
        });
        Some(id)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        let mut tree = self.write();
        let before = tree.listeners.len();
        tree.listeners.retain(|l| l.id != id);
        tree.listeners.len() != before
    }

    fn generation(&self) -> u64 {
        self.read().generation
    }

    async fn next_frame(&self) {
        match self.frames {
            FrameMode::Immediate => tokio::task::yield_now().await,
            FrameMode::Stalled => std::future::pending::<()>().await,
        }
    }
}

fn parse_style(style: &str) -> BTreeMap<String, String> {
    style
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let (k, v) = (k.trim(), v.trim());
            (!k.is_empty()).then(|| (k.to_string(), v.to_string()))
        })
        .collect()
}

fn format_style(style: &BTreeMap<String, String>) -> String {
    style
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    fn list_surface() -> (MemorySurface, NodeId) {
        let surface = MemorySurface::new();
        let host = surface.mount("address-list");
        surface
            .replace_children(
                host,
                &[Element::new("ul")
                    .class("addresses")
                    .child(Element::new("li").id("b").text("b"))
                    .into()],
            )
            .unwrap();
        (surface, host)
    }

    #[test]
    fn test_insert_modes() {
        let (surface, host) = list_surface();
        let ul = surface.query(host, &sel("ul.addresses")).unwrap();
        let b = surface.query(host, &sel("#b")).unwrap();

        surface.insert(ul, &[Element::new("li").text("c").into()], InsertMode::Append).unwrap();
        surface.insert(ul, &[Element::new("li").text("a").into()], InsertMode::Prepend).unwrap();
        surface.insert(b, &[Element::new("li").text("b-").into()], InsertMode::Before).unwrap();
        surface.insert(b, &[Element::new("li").text("b+").into()], InsertMode::After).unwrap();
        assert_eq!(
            surface.inner_html(ul),
            "<li>a</li><li>b-</li><li id=\"b\">b</li><li>b+</li><li>c</li>"
        );

        surface.insert(ul, &["empty".into()], InsertMode::Replace).unwrap();
        assert_eq!(surface.inner_html(ul), "empty");
    }

    #[test]
    fn test_query_is_scoped_to_host() {
        let (surface, host) = list_surface();
        let other = surface.mount("dht-manager");
        assert!(surface.query(other, &sel("li")).is_none());
        assert!(surface.query(host, &sel("address-list li")).is_none());
        assert_eq!(surface.query_all(host, &sel("ul li")).len(), 1);
    }

    #[test]
    fn test_listeners_die_with_replaced_nodes() {
        let (surface, host) = list_surface();
        let hits = Arc::new(AtomicUsize::new(0));
        let b = surface.query(host, &sel("#b")).unwrap();
        let counter = Arc::clone(&hits);
        surface
            .listen(b, "click", Arc::new(move |_: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert_eq!(surface.fire(host, "#b", "click"), 1);
        surface.replace_children(host, &[Element::new("li").id("b").into()]).unwrap();
        assert_eq!(surface.fire(host, "#b", "click"), 0);
        assert_eq!(surface.listener_count(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_events_bubble_to_ancestors() {
        let (surface, host) = list_surface();
        let ul = surface.query(host, &sel("ul")).unwrap();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let log = Arc::clone(&seen);
        surface.listen(ul, "click", Arc::new(move |e: &Event| log.write().unwrap().push((e.target, e.current))));

        let b = surface.query(host, &sel("#b")).unwrap();
        assert_eq!(surface.dispatch_event(b, "click", Value::Null), 1);
        assert_eq!(*seen.read().unwrap(), vec![(b, ul)]);
    }

    #[test]
    fn test_patches() {
        let (surface, host) = list_surface();
        let b = surface.query(host, &sel("#b")).unwrap();

        surface.patch(b, &Patch::AppendText("!".into())).unwrap();
        surface.patch(b, &Patch::PrependText(">".into())).unwrap();
        assert_eq!(surface.text(b).as_deref(), Some(">b!"));

        surface.patch(b, &Patch::ToggleAttribute("hidden".into())).unwrap();
        assert_eq!(surface.attribute(b, "hidden").as_deref(), Some(""));
        surface.patch(b, &Patch::ToggleAttribute("hidden".into())).unwrap();
        assert_eq!(surface.attribute(b, "hidden"), None);

        surface
            .patch(b, &Patch::AddTokens { name: "class".into(), tokens: vec!["x".into(), "y".into()] })
            .unwrap();
        surface
            .patch(b, &Patch::RemoveTokens { name: "class".into(), tokens: vec!["x".into()] })
            .unwrap();
        assert_eq!(surface.attribute(b, "class").as_deref(), Some("y"));

        let style = BTreeMap::from([("color".to_string(), "red".to_string())]);
        surface.patch(b, &Patch::SetStyle(style)).unwrap();
        let style = BTreeMap::from([("width".to_string(), "2px".to_string())]);
        surface.patch(b, &Patch::SetStyle(style)).unwrap();
        assert_eq!(surface.attribute(b, "style").as_deref(), Some("color: red; width: 2px"));
    }

    #[test]
    fn test_generation_tracks_structure_only() {
        let (surface, host) = list_surface();
        let before = surface.generation();
        let b = surface.query(host, &sel("#b")).unwrap();
        surface.patch(b, &Patch::SetAttribute { name: "title".into(), value: "t".into() }).unwrap();
        assert_eq!(surface.generation(), before);
        surface.replace_children(host, &[]).unwrap();
        assert!(surface.generation() > before);
    }

    #[test]
    fn test_stylesheets_adopted_once() {
        let surface = MemorySurface::new();
        assert!(surface.adopt_stylesheet("dht-manager", ".stats {}"));
        assert!(!surface.adopt_stylesheet("dht-manager", ".other {}"));
        assert_eq!(surface.stylesheet("dht-manager").as_deref(), Some(".stats {}"));
    }

    #[tokio::test]
    async fn test_stalled_frames_never_resolve() {
        let surface = MemorySurface::with_frames(FrameMode::Stalled);
        let waited = tokio::time::timeout(std::time::Duration::from_millis(10), surface.next_frame()).await;
        assert!(waited.is_err());
        MemorySurface::new().next_frame().await;
    }
}
