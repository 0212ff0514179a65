//! The view contract.
//!
//! Views compose a [`ViewCore`] instead of inheriting behaviour. The core
//! owns the lazily created element, the template id, the declarative event
//! table and the bus subscriptions, and tears all of them down in
//! [`ViewCore::teardown`].

use std::{cell::RefCell, rc::Rc};

use serde_json::Value;
use tracing::debug;

use crate::{
    bus::{Listeners, Subscription},
    dom::{Document, NodeId},
    error::{Result, ViewError},
    events::{delegate_to, EventBinding, EventTarget, ViewId},
    template::TemplateRegistry,
};

pub struct ViewCore {
    id: ViewId,
    tag: String,
    class: Option<String>,
    templates: Rc<TemplateRegistry>,
    template: Option<String>,
    events: Vec<(String, String)>,
    element: Option<NodeId>,
    listeners: Listeners,
    removed: bool,
}

impl ViewCore {
    pub fn new(templates: Rc<TemplateRegistry>) -> Self {
        Self {
            id: ViewId::next(),
            tag: "div".to_string(),
            class: None,
            templates,
            template: None,
            events: Vec::new(),
            element: None,
            listeners: Listeners::new(),
            removed: false,
        }
    }

    pub fn tag_name(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }

    pub fn class_name(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    pub fn template(mut self, id: &str) -> Self {
        self.template = Some(id.to_string());
        self
    }

    /// Adds a row to the event table, e.g. `.on("click button[name=save]", "save")`.
    /// Rows are parsed when the view is bound, so a bad selector fails the
    /// `show` that binds it.
    pub fn on(mut self, binding: &str, action: &str) -> Self {
        self.events.push((binding.to_string(), action.to_string()));
        self
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn element(&self) -> Option<NodeId> {
        self.element
    }

    pub fn templates(&self) -> &Rc<TemplateRegistry> {
        &self.templates
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn bindings(&self) -> Result<Vec<EventBinding>> {
        self.events
            .iter()
            .map(|(binding, action)| EventBinding::parse(binding, action))
            .collect()
    }

    /// Returns the element, creating it on first use.
    pub fn ensure_element(&mut self, doc: &mut Document) -> Result<NodeId> {
        if self.removed {
            return Err(ViewError::lifecycle("a removed view cannot be rendered again"));
        }
        if let Some(element) = self.element.filter(|element| doc.contains(*element)) {
            return Ok(element);
        }
        let element = doc.create_element(&self.tag);
        if let Some(class) = &self.class {
            doc.set_attr(element, "class", class);
        }
        self.element = Some(element);
        Ok(element)
    }

    /// Renders the view's template with `data` into its element. Calling it
    /// again re-renders in place.
    pub fn render_template(&mut self, doc: &mut Document, data: &Value) -> Result<NodeId> {
        let element = self.ensure_element(doc)?;
        if let Some(template) = &self.template {
            let markup = self.templates.render(template, data)?;
            doc.set_inner_markup(element, &markup)?;
        }
        Ok(element)
    }

    /// First descendant of the element matching `selector`.
    pub fn find(&self, doc: &Document, selector: &str) -> Result<Option<NodeId>> {
        match self.element {
            Some(element) => doc.find(element, selector),
            None => Ok(None),
        }
    }

    pub fn require(&self, doc: &Document, selector: &str) -> Result<NodeId> {
        self.find(doc, selector)?
            .ok_or_else(|| ViewError::MissingElement(selector.to_string()))
    }

    pub fn listen(&mut self, subscription: Subscription) {
        self.listeners.listen(subscription);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Unbinds delegated events, drops bus subscriptions and frees the
    /// element. The view cannot be rendered afterwards.
    pub fn teardown(&mut self, doc: &mut Document) {
        if self.removed {
            return;
        }
        doc.undelegate(self.id);
        self.listeners.stop_listening();
        if let Some(element) = self.element.take() {
            doc.remove_node(element);
        }
        self.removed = true;
        debug!(view = self.id.get(), "view removed");
    }
}

pub trait View: EventTarget {
    fn core(&self) -> &ViewCore;

    fn core_mut(&mut self) -> &mut ViewCore;

    /// Produces the element. May be called repeatedly.
    fn render(&mut self, doc: &mut Document) -> Result<NodeId>;

    /// Runs after the element is attached and its events are bound.
    fn on_shown(&mut self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, doc: &mut Document) -> Result<()> {
        self.core_mut().teardown(doc);
        Ok(())
    }
}

/// Registers the view's event table rooted at its element.
pub fn bind_events<V: View + 'static>(doc: &mut Document, view: &Rc<RefCell<V>>) -> Result<()> {
    let (owner, root, bindings) = {
        let view = view.borrow();
        let core = view.core();
        let root = core
            .element()
            .ok_or_else(|| ViewError::lifecycle("events bound before render"))?;
        (core.id(), root, core.bindings()?)
    };
    delegate_to(doc, owner, root, bindings, view);
    Ok(())
}

/// A view that renders its template from a fixed JSON value and handles no
/// events. Used for static panes such as headers and empty placeholders.
pub struct StaticView {
    core: ViewCore,
    data: Value,
}

impl StaticView {
    pub fn new(core: ViewCore, data: Value) -> Self {
        Self { core, data }
    }
}

impl EventTarget for StaticView {}

impl View for StaticView {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn render(&mut self, doc: &mut Document) -> Result<NodeId> {
        self.core.render_template(doc, &self.data)
    }
}
