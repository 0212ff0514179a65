//! Declarative event tables and delegated dispatch.
//!
//! A bound view registers its table against its own element. Dispatch walks
//! from the event target up to the document root and delivers to every
//! binding whose selector matches a node on that path, innermost first.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::debug;

use crate::{
    dom::{Document, NodeId},
    error::Result,
    selector::Selector,
};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of something that owns delegated bindings (a view or a dialog
/// controller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    pub fn next() -> Self {
        Self(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    Change,
    Input,
    Keydown,
    Submit,
}

impl EventKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "click" => Some(EventKind::Click),
            "change" => Some(EventKind::Change),
            "input" | "keyup" => Some(EventKind::Input),
            "keydown" => Some(EventKind::Keydown),
            "submit" => Some(EventKind::Submit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Tab,
    Char(char),
}

impl Key {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "enter" | "return" => Some(Key::Enter),
            "escape" | "esc" => Some(Key::Escape),
            "tab" => Some(Key::Tab),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Key::Char(c)),
                    _ => None,
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DomEvent {
    pub kind: EventKind,
    pub target: NodeId,
    pub key: Option<Key>,
    propagation_stopped: bool,
    default_prevented: bool,
}

impl DomEvent {
    pub fn new(kind: EventKind, target: NodeId) -> Self {
        Self {
            kind,
            target,
            key: None,
            propagation_stopped: false,
            default_prevented: false,
        }
    }

    pub fn click(target: NodeId) -> Self {
        Self::new(EventKind::Click, target)
    }

    pub fn change(target: NodeId) -> Self {
        Self::new(EventKind::Change, target)
    }

    pub fn keydown(target: NodeId, key: Key) -> Self {
        Self {
            key: Some(key),
            ..Self::new(EventKind::Keydown, target)
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// One row of a declarative event table: `kind selector -> action`.
/// A binding without a selector fires for events reaching the owner's own
/// element.
#[derive(Debug, Clone)]
pub struct EventBinding {
    pub kind: EventKind,
    pub selector: Option<Selector>,
    pub action: String,
}

impl EventBinding {
    pub fn new(kind: EventKind, selector: Option<&str>, action: &str) -> Result<Self> {
        Ok(Self {
            kind,
            selector: selector.map(Selector::parse).transpose()?,
            action: action.to_string(),
        })
    }

    /// Parses a Backbone style key such as `"click button[name=save]"`.
    pub fn parse(spec: &str, action: &str) -> Result<Self> {
        let spec = spec.trim();
        let (kind, selector) = match spec.split_once(char::is_whitespace) {
            Some((kind, selector)) => (kind, Some(selector.trim())),
            None => (spec, None),
        };
        let kind = EventKind::parse(kind)
            .ok_or_else(|| crate::error::ViewError::Selector(spec.to_string()))?;
        Self::new(kind, selector, action)
    }
}

/// Receiver of delegated events.
pub trait EventTarget {
    fn handle_event(
        &mut self,
        _doc: &mut Document,
        _action: &str,
        _event: &mut DomEvent,
    ) -> Result<()> {
        Ok(())
    }
}

struct Delegation {
    owner: ViewId,
    root: NodeId,
    bindings: Vec<EventBinding>,
    target: Weak<RefCell<dyn EventTarget>>,
}

#[derive(Default)]
pub(crate) struct Delegations {
    entries: Vec<Delegation>,
}

struct Delivery {
    owner: ViewId,
    depth: usize,
    action: String,
    target: Weak<RefCell<dyn EventTarget>>,
}

impl Document {
    /// Registers `bindings` for `owner` rooted at `root`, replacing any
    /// earlier registration of the same owner.
    pub fn delegate(
        &mut self,
        owner: ViewId,
        root: NodeId,
        bindings: Vec<EventBinding>,
        target: Weak<RefCell<dyn EventTarget>>,
    ) {
        self.undelegate(owner);
        if bindings.is_empty() {
            return;
        }
        debug!(owner = owner.get(), %root, count = bindings.len(), "delegating events");
        self.delegations.entries.push(Delegation {
            owner,
            root,
            bindings,
            target,
        });
    }

    pub fn undelegate(&mut self, owner: ViewId) {
        self.delegations.entries.retain(|entry| entry.owner != owner);
    }

    pub fn is_delegated(&self, owner: ViewId) -> bool {
        self.delegations
            .entries
            .iter()
            .any(|entry| entry.owner == owner)
    }

    /// Number of owners with live bindings.
    pub fn delegation_count(&self) -> usize {
        self.delegations.entries.len()
    }

    fn deliveries(&self, event: &DomEvent) -> Vec<Delivery> {
        let mut path = Vec::new();
        let mut cursor = Some(event.target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.parent(node);
        }

        let mut deliveries = Vec::new();
        for (depth, node) in path.iter().enumerate() {
            for entry in &self.delegations.entries {
                if !self.is_descendant(*node, entry.root) {
                    continue;
                }
                for binding in entry.bindings.iter().filter(|b| b.kind == event.kind) {
                    let hit = match &binding.selector {
                        None => *node == entry.root,
                        Some(selector) => *node != entry.root && selector.matches(self, *node),
                    };
                    if hit {
                        deliveries.push(Delivery {
                            owner: entry.owner,
                            depth,
                            action: binding.action.clone(),
                            target: entry.target.clone(),
                        });
                    }
                }
            }
        }
        deliveries
    }
}

/// Delivers `event` to the bound handlers on its propagation path and
/// returns how many ran. Handlers at the node where propagation was stopped
/// still run; outer ones do not.
pub fn dispatch(doc: &mut Document, event: &mut DomEvent) -> Result<usize> {
    let deliveries = doc.deliveries(event);
    let mut delivered = 0;
    let mut stopped_at: Option<usize> = None;

    for delivery in deliveries {
        if stopped_at.is_some_and(|depth| delivery.depth > depth) {
            break;
        }
        // An earlier handler may have torn this owner down.
        if !doc.is_delegated(delivery.owner) {
            continue;
        }
        let Some(target) = delivery.target.upgrade() else {
            doc.undelegate(delivery.owner);
            continue;
        };
        target
            .borrow_mut()
            .handle_event(doc, &delivery.action, event)?;
        delivered += 1;
        if event.propagation_stopped() && stopped_at.is_none() {
            stopped_at = Some(delivery.depth);
        }
    }

    Ok(delivered)
}

/// Convenience for binding a concrete handler held in an `Rc`.
pub fn delegate_to<T: EventTarget + 'static>(
    doc: &mut Document,
    owner: ViewId,
    root: NodeId,
    bindings: Vec<EventBinding>,
    target: &Rc<RefCell<T>>,
) {
    let weak: Weak<RefCell<T>> = Rc::downgrade(target);
    let weak: Weak<RefCell<dyn EventTarget>> = weak;
    doc.delegate(owner, root, bindings, weak);
}
