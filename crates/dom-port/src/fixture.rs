//! In-memory DOM implementing [`DomPort`], suitable for unit tests and
//! early integration. Supports a small selector subset: tag, `#id`,
//! `.class`, compound simple selectors, and the descendant combinator.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::api::DomPort;
use crate::errors::DomError;
use crate::model::{ElementHandle, LayoutInfo, Viewport};

#[derive(Clone, Debug)]
struct Node {
    tag: String,
    attrs: HashMap<String, String>,
    styles: HashMap<String, String>,
    properties: HashMap<String, Value>,
    html: String,
    layout: LayoutInfo,
    parent: Option<u64>,
    children: Vec<u64>,
}

impl Node {
    fn new(tag: &str, parent: Option<u64>) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: HashMap::new(),
            styles: HashMap::new(),
            properties: HashMap::new(),
            html: String::new(),
            layout: LayoutInfo::default(),
            parent,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct DomState {
    nodes: HashMap<u64, Node>,
    roots: Vec<u64>,
    next_id: u64,
    viewport: Option<Viewport>,
    user_agent: Option<String>,
    device_pixel_ratio: Option<f64>,
}

#[derive(Clone, Debug)]
struct EventRecord {
    name: String,
    detail: Value,
}

pub struct FixtureDom {
    state: RwLock<DomState>,
    events: broadcast::Sender<EventRecord>,
}

impl Default for FixtureDom {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureDom {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: RwLock::new(DomState::default()),
            events,
        }
    }

    /// Insert an element under `parent`, or as a document root.
    pub fn insert(&self, parent: Option<ElementHandle>, tag: &str) -> ElementHandle {
        let mut state = self.state.write();
        let id = state.next_id;
        state.next_id += 1;
        let parent_id = parent.map(|p| p.0);
        state.nodes.insert(id, Node::new(tag, parent_id));
        match parent_id {
            Some(pid) => {
                if let Some(node) = state.nodes.get_mut(&pid) {
                    node.children.push(id);
                }
            }
            None => state.roots.push(id),
        }
        ElementHandle(id)
    }

    pub fn set_attr(&self, el: ElementHandle, name: &str, value: &str) {
        if let Some(node) = self.state.write().nodes.get_mut(&el.0) {
            node.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&self, el: ElementHandle, name: &str) {
        if let Some(node) = self.state.write().nodes.get_mut(&el.0) {
            node.attrs.remove(name);
        }
    }

    pub fn set_style(&self, el: ElementHandle, property: &str, value: &str) {
        if let Some(node) = self.state.write().nodes.get_mut(&el.0) {
            node.styles.insert(property.to_string(), value.to_string());
        }
    }

    pub fn set_property(&self, el: ElementHandle, key: &str, value: Value) {
        if let Some(node) = self.state.write().nodes.get_mut(&el.0) {
            node.properties.insert(key.to_string(), value);
        }
    }

    pub fn set_html(&self, el: ElementHandle, html: &str) {
        if let Some(node) = self.state.write().nodes.get_mut(&el.0) {
            node.html = html.to_string();
        }
    }

    pub fn set_layout(&self, el: ElementHandle, layout: LayoutInfo) {
        if let Some(node) = self.state.write().nodes.get_mut(&el.0) {
            node.layout = layout;
        }
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.write().viewport = Some(viewport);
    }

    pub fn set_user_agent(&self, ua: &str) {
        self.state.write().user_agent = Some(ua.to_string());
    }

    pub fn set_device_pixel_ratio(&self, dpr: f64) {
        self.state.write().device_pixel_ratio = Some(dpr);
    }

    /// Fire a custom event; anything currently awaiting it resolves.
    pub fn emit(&self, name: &str, detail: Value) {
        let _ = self.events.send(EventRecord {
            name: name.to_string(),
            detail,
        });
    }

    fn node<'a>(state: &'a DomState, el: ElementHandle) -> Result<&'a Node, DomError> {
        state.nodes.get(&el.0).ok_or(DomError::ElementGone(el.0))
    }

    fn document_order(state: &DomState) -> Vec<u64> {
        let mut out = Vec::new();
        for root in &state.roots {
            Self::collect_subtree(state, *root, &mut out);
        }
        out
    }

    fn collect_subtree(state: &DomState, id: u64, out: &mut Vec<u64>) {
        out.push(id);
        if let Some(node) = state.nodes.get(&id) {
            for child in &node.children {
                Self::collect_subtree(state, *child, out);
            }
        }
    }

    fn matches_chain(state: &DomState, id: u64, parts: &[SimpleSelector]) -> bool {
        let (last, ancestors) = match parts.split_last() {
            Some(split) => split,
            None => return false,
        };
        let node = match state.nodes.get(&id) {
            Some(node) => node,
            None => return false,
        };
        if !last.matches(node) {
            return false;
        }
        // Remaining parts must match some ancestor chain, right to left.
        let mut current = node.parent;
        let mut remaining = ancestors.len();
        while remaining > 0 {
            let pid = match current {
                Some(pid) => pid,
                None => return false,
            };
            let parent = match state.nodes.get(&pid) {
                Some(parent) => parent,
                None => return false,
            };
            if ancestors[remaining - 1].matches(parent) {
                remaining -= 1;
            }
            current = parent.parent;
        }
        true
    }

    fn query_ids(&self, within: Option<ElementHandle>, selector: &str) -> Vec<ElementHandle> {
        let parts = parse_selector(selector);
        if parts.is_empty() {
            return Vec::new();
        }
        let state = self.state.read();
        let candidates = match within {
            Some(scope) => {
                let mut out = Vec::new();
                if let Some(node) = state.nodes.get(&scope.0) {
                    for child in &node.children {
                        Self::collect_subtree(&state, *child, &mut out);
                    }
                }
                out
            }
            None => Self::document_order(&state),
        };
        candidates
            .into_iter()
            .filter(|id| Self::matches_chain(&state, *id, &parts))
            .map(ElementHandle)
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl SimpleSelector {
    fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if node.tag != *tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.attrs.get("id") != Some(id) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = node.attrs.get("class").map(String::as_str).unwrap_or("");
            let have: Vec<&str> = class_attr.split_whitespace().collect();
            if !self.classes.iter().all(|c| have.contains(&c.as_str())) {
                return false;
            }
        }
        true
    }
}

fn parse_selector(selector: &str) -> Vec<SimpleSelector> {
    selector
        .split_whitespace()
        .map(parse_simple)
        .collect()
}

fn parse_simple(part: &str) -> SimpleSelector {
    let mut simple = SimpleSelector::default();
    let mut rest = part;
    // Leading tag name, if any.
    let tag_end = rest
        .find(|c| c == '#' || c == '.')
        .unwrap_or(rest.len());
    if tag_end > 0 {
        simple.tag = Some(rest[..tag_end].to_ascii_lowercase());
    }
    rest = &rest[tag_end..];
    while !rest.is_empty() {
        let (marker, tail) = rest.split_at(1);
        let seg_end = tail
            .find(|c| c == '#' || c == '.')
            .unwrap_or(tail.len());
        let (segment, next) = tail.split_at(seg_end);
        match marker {
            "#" => simple.id = Some(segment.to_string()),
            "." => simple.classes.push(segment.to_string()),
            _ => {}
        }
        rest = next;
    }
    simple
}

#[async_trait]
impl DomPort for FixtureDom {
    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>, DomError> {
        Ok(self.query_ids(None, selector))
    }

    async fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DomError> {
        Ok(self.query_ids(Some(scope), selector))
    }

    async fn inner_html(&self, el: ElementHandle) -> Result<String, DomError> {
        let state = self.state.read();
        Ok(Self::node(&state, el)?.html.clone())
    }

    async fn attribute(
        &self,
        el: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DomError> {
        let state = self.state.read();
        Ok(Self::node(&state, el)?.attrs.get(name).cloned())
    }

    async fn property(&self, el: ElementHandle, key: &str) -> Result<Option<Value>, DomError> {
        let state = self.state.read();
        Ok(Self::node(&state, el)?.properties.get(key).cloned())
    }

    async fn computed_style(
        &self,
        el: ElementHandle,
        property: &str,
    ) -> Result<Option<String>, DomError> {
        let state = self.state.read();
        Ok(Self::node(&state, el)?.styles.get(property).cloned())
    }

    async fn layout(&self, el: ElementHandle) -> Result<LayoutInfo, DomError> {
        let state = self.state.read();
        Ok(Self::node(&state, el)?.layout.clone())
    }

    async fn child_index(&self, el: ElementHandle) -> Result<Option<usize>, DomError> {
        let state = self.state.read();
        let node = Self::node(&state, el)?;
        let parent = match node.parent {
            Some(pid) => pid,
            None => return Ok(None),
        };
        let siblings = &state
            .nodes
            .get(&parent)
            .ok_or(DomError::ElementGone(parent))?
            .children;
        Ok(siblings.iter().position(|id| *id == el.0))
    }

    async fn viewport(&self) -> Result<Viewport, DomError> {
        Ok(self.state.read().viewport.unwrap_or_default())
    }

    async fn user_agent(&self) -> Result<String, DomError> {
        Ok(self
            .state
            .read()
            .user_agent
            .clone()
            .unwrap_or_else(|| "bullseye-fixture/1.0".to_string()))
    }

    async fn device_pixel_ratio(&self) -> Result<f64, DomError> {
        Ok(self.state.read().device_pixel_ratio.unwrap_or(1.0))
    }

    async fn wait_event(&self, name: &str) -> Result<Value, DomError> {
        let mut rx = self.events.subscribe();
        loop {
            match rx.recv().await {
                Ok(record) if record.name == name => return Ok(record.detail),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(DomError::EventChannelClosed(name.to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn seeded() -> (FixtureDom, ElementHandle, Vec<ElementHandle>) {
        let dom = FixtureDom::new();
        let list = dom.insert(None, "ul");
        dom.set_attr(list, "class", "nav");
        let mut items = Vec::new();
        for n in 0..3 {
            let li = dom.insert(Some(list), "li");
            dom.set_html(li, &format!("item {n}"));
            items.push(li);
        }
        (dom, list, items)
    }

    #[tokio::test]
    async fn queries_by_tag_class_and_id() {
        let (dom, list, items) = seeded();
        dom.set_attr(items[1], "id", "middle");
        dom.set_attr(items[1], "class", "active");

        assert_eq!(dom.query("li").await.unwrap().len(), 3);
        assert_eq!(dom.query("ul.nav").await.unwrap(), vec![list]);
        assert_eq!(dom.query("#middle").await.unwrap(), vec![items[1]]);
        assert_eq!(dom.query("li.active").await.unwrap(), vec![items[1]]);
        assert_eq!(dom.query("ul.nav li").await.unwrap().len(), 3);
        assert!(dom.query("ol li").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_within_is_scoped_to_descendants() {
        let (dom, list, _) = seeded();
        let other = dom.insert(None, "div");
        dom.insert(Some(other), "li");

        assert_eq!(dom.query("li").await.unwrap().len(), 4);
        assert_eq!(dom.query_within(list, "li").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reads_attributes_and_child_index() {
        let (dom, list, items) = seeded();
        dom.set_attr(items[2], "data-end", "");

        assert_eq!(
            dom.attribute(items[2], "data-end").await.unwrap(),
            Some(String::new())
        );
        assert_eq!(dom.attribute(items[0], "data-end").await.unwrap(), None);
        assert_eq!(dom.child_index(items[2]).await.unwrap(), Some(2));
        assert_eq!(dom.child_index(list).await.unwrap(), None);
    }

    #[tokio::test]
    async fn gone_element_reports_error() {
        let dom = FixtureDom::new();
        let err = dom.inner_html(ElementHandle(99)).await.unwrap_err();
        assert!(matches!(err, DomError::ElementGone(99)));
    }

    #[tokio::test]
    async fn wait_event_resolves_with_detail() {
        let dom = std::sync::Arc::new(FixtureDom::new());
        let waiter = {
            let dom = std::sync::Arc::clone(&dom);
            tokio::spawn(async move { dom.wait_event("ready").await })
        };
        tokio::task::yield_now().await;
        dom.emit("other", json!(1));
        dom.emit("ready", json!({"ok": true}));

        let detail = waiter.await.unwrap().unwrap();
        assert_eq!(detail, json!({"ok": true}));
    }
}
