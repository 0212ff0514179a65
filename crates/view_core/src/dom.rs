//! In-process element tree that views render into.
//!
//! Nodes live in an arena addressed by [`NodeId`]. Freed slots are recycled
//! under a new generation, so a stale id stops resolving instead of aliasing
//! the node that took its place.

use std::{collections::BTreeMap, fmt};

use quick_xml::{escape::escape, events::Event, Reader};

use crate::{
    error::{Result, ViewError},
    events::Delegations,
    selector::Selector,
};

const TEXT_TAG: &str = "#text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    fn text(text: &str) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            attrs: BTreeMap::new(),
            text: text.to_string(),
            parent: None,
            children: Vec::new(),
        }
    }
}

pub struct Document {
    nodes: Vec<Slot>,
    free: Vec<usize>,
    body: NodeId,
    overlay: NodeId,
    pub(crate) delegations: Delegations,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Id of the persistent element dialogs are attached to.
    pub const OVERLAY_ID: &'static str = "modal-root";

    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            body: NodeId { index: 0, generation: 0 },
            overlay: NodeId { index: 0, generation: 0 },
            delegations: Delegations::default(),
        };
        doc.body = doc.alloc(Node::element("body"));
        let overlay = doc.alloc(Node::element("div"));
        doc.set_attr(overlay, "id", Self::OVERLAY_ID);
        doc.overlay = overlay;
        doc.link(doc.body, overlay);
        doc
    }

    /// Builds a document whose body holds `markup`, keeping the overlay root
    /// as the last child.
    pub fn from_markup(markup: &str) -> Result<Self> {
        let mut doc = Self::new();
        let body = doc.body;
        let overlay = doc.overlay;
        for node in doc.parse_fragment(markup)? {
            doc.insert_before(body, node, overlay)?;
        }
        Ok(doc)
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn overlay(&self) -> NodeId {
        self.overlay
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.nodes[index];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        self.nodes.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index: self.nodes.len() - 1,
            generation: 0,
        }
    }

    /// Frees the slot behind `id` and bumps its generation.
    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .nodes
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn require(&self, id: NodeId) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| ViewError::MissingElement(id.to_string()))
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live (not freed) nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// Arena slots in use or waiting to be recycled.
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(Node::element(tag))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(Node::text(text))
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|node| node.tag.as_str())
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| node.tag == TEXT_TAG)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .and_then(|node| node.attrs.get(name))
            .map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.node_mut(id) {
            node.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.node_mut(id) {
            node.attrs.remove(name);
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let classes = match self.attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", &classes);
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(existing) = self.attr(id, "class") else {
            return;
        };
        let remaining = existing
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr(id, "class", &remaining);
    }

    /// Current value of a form control.
    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.attr(id, "value")
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) {
        self.set_attr(id, "value", value);
    }

    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.attr(id, "hidden").is_some()
    }

    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        if hidden {
            self.set_attr(id, "hidden", "hidden");
        } else {
            self.remove_attr(id, "hidden");
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        if node.tag == TEXT_TAG {
            out.push_str(&node.text);
            return;
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.clear_children(id)?;
        let text = self.create_text(text);
        self.append_child(id, text)
    }

    /// `true` when the node is reachable from the body.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_descendant(id, self.body)
    }

    /// `true` when `ancestor` is `id` itself or one of its ancestors.
    pub fn is_descendant(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !self.contains(current) {
                return false;
            }
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Moves `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.require(parent)?;
        self.require(child)?;
        if self.is_descendant(parent, child) {
            return Err(ViewError::Markup(format!(
                "cannot append {child} inside its own subtree"
            )));
        }
        self.detach(child);
        self.link(parent, child);
        Ok(())
    }

    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) -> Result<()> {
        self.require(parent)?;
        self.require(child)?;
        if self.is_descendant(parent, child) {
            return Err(ViewError::Markup(format!(
                "cannot insert {child} inside its own subtree"
            )));
        }
        self.detach(child);
        let position = self
            .children(parent)
            .iter()
            .position(|candidate| *candidate == reference);
        match position {
            Some(index) => {
                if let Some(node) = self.node_mut(child) {
                    node.parent = Some(parent);
                }
                if let Some(node) = self.node_mut(parent) {
                    node.children.insert(index, child);
                }
            }
            None => self.link(parent, child),
        }
        Ok(())
    }

    /// Unlinks a node from its parent. The subtree stays alive.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|child| *child != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    /// Detaches and frees a whole subtree. Freed ids never resolve again.
    pub fn remove_node(&mut self, id: NodeId) {
        if !self.contains(id) {
            return;
        }
        self.detach(id);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.release(current) {
                stack.extend(node.children);
            }
        }
    }

    pub fn clear_children(&mut self, id: NodeId) -> Result<()> {
        let children = self.require(id)?.children.clone();
        for child in children {
            self.remove_node(child);
        }
        Ok(())
    }

    /// Makes `child` the only child of `parent`, freeing whatever was there.
    pub fn replace_children(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.require(child)?;
        let previous = self.require(parent)?.children.clone();
        for existing in previous {
            if existing != child {
                self.remove_node(existing);
            }
        }
        if self.parent(child) != Some(parent) {
            self.append_child(parent, child)?;
        }
        Ok(())
    }

    /// Replaces the children of `id` with the nodes parsed from `markup`.
    pub fn set_inner_markup(&mut self, id: NodeId, markup: &str) -> Result<()> {
        self.require(id)?;
        let fresh = self.parse_fragment(markup)?;
        self.clear_children(id)?;
        for node in fresh {
            self.link(id, node);
        }
        Ok(())
    }

    /// Parses XHTML markup into detached top-level nodes.
    pub fn parse_fragment(&mut self, markup: &str) -> Result<Vec<NodeId>> {
        let mut reader = Reader::from_str(markup);
        let mut roots = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut created = Vec::new();

        let outcome = (|| -> Result<()> {
            loop {
                match reader.read_event() {
                    Ok(Event::Start(start)) => {
                        let id = self.element_from(&start)?;
                        created.push(id);
                        self.place(&mut stack, &mut roots, id);
                        stack.push(id);
                    }
                    Ok(Event::Empty(start)) => {
                        let id = self.element_from(&start)?;
                        created.push(id);
                        self.place(&mut stack, &mut roots, id);
                    }
                    Ok(Event::End(_)) => {
                        if stack.pop().is_none() {
                            return Err(ViewError::Markup("unbalanced closing tag".into()));
                        }
                    }
                    Ok(Event::Text(text)) => {
                        let text = text
                            .unescape()
                            .map_err(|err| ViewError::Markup(err.to_string()))?;
                        if !text.trim().is_empty() {
                            let id = self.create_text(&text);
                            created.push(id);
                            self.place(&mut stack, &mut roots, id);
                        }
                    }
                    Ok(Event::CData(data)) => {
                        let text = String::from_utf8_lossy(&data).into_owned();
                        let id = self.create_text(&text);
                        created.push(id);
                        self.place(&mut stack, &mut roots, id);
                    }
                    Ok(Event::Eof) => break,
                    Ok(_) => {}
                    Err(err) => return Err(ViewError::Markup(err.to_string())),
                }
            }
            if let Some(open) = stack.last() {
                return Err(ViewError::Markup(format!(
                    "unclosed <{}>",
                    self.tag(*open).unwrap_or_default()
                )));
            }
            Ok(())
        })();

        if let Err(err) = outcome {
            for id in created {
                self.release(id);
            }
            return Err(err);
        }
        Ok(roots)
    }

    fn element_from(&mut self, start: &quick_xml::events::BytesStart<'_>) -> Result<NodeId> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut node = Node::element(&tag);
        for attr in start.attributes() {
            let attr = attr.map_err(|err| ViewError::Markup(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| ViewError::Markup(err.to_string()))?
                .into_owned();
            node.attrs.insert(key, value);
        }
        Ok(self.alloc(node))
    }

    fn place(&mut self, stack: &mut [NodeId], roots: &mut Vec<NodeId>, id: NodeId) {
        match stack.last() {
            Some(parent) => self.link(*parent, id),
            None => roots.push(id),
        }
    }

    pub fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if selector.matches(self, current) {
                return Some(current);
            }
            stack.extend(self.children(current).iter().rev().copied());
        }
        None
    }

    pub fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if selector.matches(self, current) {
                found.push(current);
            }
            stack.extend(self.children(current).iter().rev().copied());
        }
        found
    }

    /// First descendant of `scope` matching `selector`.
    pub fn find(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.query(scope, &Selector::parse(selector)?))
    }

    pub fn find_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        Ok(self.query_all(scope, &Selector::parse(selector)?))
    }

    /// Serialises a subtree back to markup.
    pub fn render_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        if node.tag == TEXT_TAG {
            out.push_str(&escape(node.text.as_str()));
            return;
        }
        out.push('<');
        out.push_str(&node.tag);
        for (key, value) in &node.attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if node.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &node.children {
            self.write_markup(*child, out);
        }
        out.push_str("</");
        out.push_str(&node.tag);
        out.push('>');
    }

    /// Indented, human readable outline of the visible part of a subtree.
    pub fn outline(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_outline(id, 0, &mut out);
        out
    }

    fn write_outline(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        if node.attrs.contains_key("hidden") {
            return;
        }
        let indent = "  ".repeat(depth);
        if node.tag == TEXT_TAG {
            let text = node.text.trim();
            if !text.is_empty() {
                out.push_str(&format!("{indent}\"{text}\"\n"));
            }
            return;
        }

        let mut label = node.tag.clone();
        if let Some(id) = node.attrs.get("id") {
            label.push('#');
            label.push_str(id);
        }
        if let Some(classes) = node.attrs.get("class") {
            for class in classes.split_whitespace() {
                label.push('.');
                label.push_str(class);
            }
        }
        for key in ["name", "value", "type"] {
            if let Some(value) = node.attrs.get(key) {
                label.push_str(&format!("[{key}={value}]"));
            }
        }
        out.push_str(&format!("{indent}{label}\n"));
        for child in &node.children {
            self.write_outline(*child, depth + 1, out);
        }
    }
}
