//! Dialog lifecycle state machine.
//!
//! A [`ModalController`] drives one [`Dialog`] through
//! `Closed -> Rendered -> Visible -> Closed`. The dialog element lives under
//! the document overlay root while the controller is open and is kept
//! (detached) between openings so construction happens once per instance.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use serde_json::Value;
use tracing::debug;

use crate::{
    controller::Controller,
    dom::{Document, NodeId},
    error::{Result, ViewError},
    events::{DomEvent, EventBinding, EventTarget, Key, ViewId},
    template::TemplateRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Closed,
    Rendered,
    Visible,
}

impl fmt::Display for ModalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModalState::Closed => "closed",
            ModalState::Rendered => "rendered",
            ModalState::Visible => "visible",
        };
        f.write_str(name)
    }
}

/// When a successful dialog closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseTiming {
    /// Close as soon as the success hook returns.
    #[default]
    Immediate,
    /// Stay visible until the owner closes the dialog, typically from the
    /// continuation of the request the success hook started.
    OnCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalOptions {
    pub keyboard: bool,
    pub close_timing: CloseTiming,
}

impl Default for ModalOptions {
    fn default() -> Self {
        Self {
            keyboard: true,
            close_timing: CloseTiming::Immediate,
        }
    }
}

impl ModalOptions {
    /// Escape no longer closes the dialog.
    pub fn keyboard_disabled(mut self) -> Self {
        self.keyboard = false;
        self
    }

    pub fn close_on_completion(mut self) -> Self {
        self.close_timing = CloseTiming::OnCompletion;
        self
    }
}

/// What a dialog hook can reach while it runs.
pub struct DialogScope<'a, D: Dialog> {
    pub doc: &'a mut Document,
    pub element: NodeId,
    pub handle: ModalHandle<D>,
}

impl<D: Dialog> DialogScope<'_, D> {
    /// Value of the first control below the dialog element matching `selector`.
    pub fn value_of(&self, selector: &str) -> Result<String> {
        let node = self
            .doc
            .find(self.element, selector)?
            .ok_or_else(|| ViewError::MissingElement(selector.to_string()))?;
        Ok(self.doc.value(node).unwrap_or_default().to_string())
    }
}

/// The body of a dialog. Hooks default to no-ops.
pub trait Dialog: Sized + 'static {
    /// Unique identifier, used as the dialog element id.
    fn tag(&self) -> &str;

    fn template_id(&self) -> &str;

    fn data(&self) -> Value {
        Value::Null
    }

    fn events(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("click button[name=success]", "success"),
            ("click button[name=cancel]", "cancel"),
            ("click [data-micromodal-close]", "cancel"),
            ("keydown", "keydown"),
        ]
    }

    fn on_success(&mut self, _scope: &mut DialogScope<'_, Self>) -> Result<()> {
        Ok(())
    }

    fn on_cancel(&mut self, _scope: &mut DialogScope<'_, Self>) -> Result<()> {
        Ok(())
    }

    /// Actions from [`Dialog::events`] other than the built-in ones.
    fn on_action(
        &mut self,
        _scope: &mut DialogScope<'_, Self>,
        _action: &str,
        _event: &mut DomEvent,
    ) -> Result<()> {
        Ok(())
    }

    fn on_closed(&mut self, _doc: &mut Document) {}
}

pub type ModalRef<D> = Rc<RefCell<ModalController<D>>>;

pub struct ModalController<D: Dialog> {
    owner: ViewId,
    dialog: D,
    templates: Rc<TemplateRegistry>,
    options: ModalOptions,
    state: ModalState,
    element: Option<NodeId>,
    destroyed: bool,
    this: Weak<RefCell<Self>>,
}

impl<D: Dialog> ModalController<D> {
    pub fn new(dialog: D, templates: Rc<TemplateRegistry>, options: ModalOptions) -> ModalRef<D> {
        Rc::new_cyclic(|this| {
            RefCell::new(Self {
                owner: ViewId::next(),
                dialog,
                templates,
                options,
                state: ModalState::Closed,
                element: None,
                destroyed: false,
                this: this.clone(),
            })
        })
    }

    pub fn state(&self) -> ModalState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state == ModalState::Visible
    }

    pub fn options(&self) -> ModalOptions {
        self.options
    }

    /// Options applied from the next `construct`.
    pub fn set_options(&mut self, options: ModalOptions) {
        self.options = options;
    }

    pub fn element(&self) -> Option<NodeId> {
        self.element
    }

    pub fn dialog(&self) -> &D {
        &self.dialog
    }

    pub fn dialog_mut(&mut self) -> &mut D {
        &mut self.dialog
    }

    pub fn handle(&self) -> ModalHandle<D> {
        ModalHandle {
            inner: self.this.clone(),
        }
    }

    fn build_element(&self, doc: &mut Document) -> Result<NodeId> {
        let markup = self
            .templates
            .render(self.dialog.template_id(), &self.dialog.data())?;
        let element = doc.create_element("div");
        doc.set_attr(element, "id", self.dialog.tag());
        doc.set_attr(element, "class", "modal");
        doc.set_attr(element, "aria-hidden", "true");
        if let Err(err) = doc.set_inner_markup(element, &markup) {
            doc.remove_node(element);
            return Err(err);
        }
        Ok(element)
    }

    fn bindings(&self) -> Result<Vec<EventBinding>> {
        self.dialog
            .events()
            .into_iter()
            .map(|(spec, action)| EventBinding::parse(spec, action))
            .collect()
    }

    /// Builds the dialog element on first use, binds its events and attaches
    /// it to the overlay root. Ends in `Rendered` unless already open.
    pub fn construct(&mut self, doc: &mut Document) -> Result<()> {
        if self.destroyed {
            return Err(ViewError::lifecycle(format!(
                "dialog `{}` was destroyed",
                self.dialog.tag()
            )));
        }
        let element = match self.element.filter(|element| doc.contains(*element)) {
            Some(element) => element,
            None => {
                let element = self.build_element(doc)?;
                self.element = Some(element);
                element
            }
        };

        let bindings = self.bindings()?;
        let target: Weak<RefCell<dyn EventTarget>> = self.this.clone();
        doc.delegate(self.owner, element, bindings, target);

        let overlay = doc.overlay();
        if doc.parent(element) != Some(overlay) {
            doc.append_child(overlay, element)?;
        }
        if self.state == ModalState::Closed {
            doc.set_hidden(element, true);
            self.transition(ModalState::Rendered);
        }
        Ok(())
    }

    pub fn show(&mut self, doc: &mut Document) -> Result<()> {
        match self.state {
            ModalState::Closed => Err(ViewError::lifecycle(format!(
                "show() on dialog `{}` requires construct() first",
                self.dialog.tag()
            ))),
            ModalState::Visible => Ok(()),
            ModalState::Rendered => {
                if let Some(element) = self.element {
                    doc.set_hidden(element, false);
                    doc.set_attr(element, "aria-hidden", "false");
                    doc.add_class(element, "is-open");
                }
                self.transition(ModalState::Visible);
                Ok(())
            }
        }
    }

    /// `construct` followed by `show`.
    pub fn open(&mut self, doc: &mut Document) -> Result<()> {
        self.construct(doc)?;
        self.show(doc)
    }

    fn require_visible(&self, operation: &str) -> Result<NodeId> {
        match (self.state, self.element) {
            (ModalState::Visible, Some(element)) => Ok(element),
            (state, _) => Err(ViewError::lifecycle(format!(
                "{operation}() on dialog `{}` requires a visible dialog, found {state}",
                self.dialog.tag()
            ))),
        }
    }

    fn scope<'a>(&self, doc: &'a mut Document, element: NodeId) -> DialogScope<'a, D> {
        DialogScope {
            doc,
            element,
            handle: self.handle(),
        }
    }

    pub fn success(&mut self, doc: &mut Document, event: Option<&mut DomEvent>) -> Result<()> {
        let element = self.require_visible("success")?;
        if let Some(event) = event {
            event.stop_propagation();
            event.prevent_default();
        }
        {
            let mut scope = self.scope(doc, element);
            self.dialog.on_success(&mut scope)?;
        }
        if self.options.close_timing == CloseTiming::Immediate {
            self.close(doc)?;
        }
        Ok(())
    }

    pub fn cancel(&mut self, doc: &mut Document, event: Option<&mut DomEvent>) -> Result<()> {
        let element = self.require_visible("cancel")?;
        if let Some(event) = event {
            event.stop_propagation();
            event.prevent_default();
        }
        {
            let mut scope = self.scope(doc, element);
            self.dialog.on_cancel(&mut scope)?;
        }
        self.close(doc)
    }

    /// Enter confirms; Escape closes unless the keyboard is disabled.
    pub fn keydown(&mut self, doc: &mut Document, event: &mut DomEvent) -> Result<()> {
        if self.state != ModalState::Visible {
            return Ok(());
        }
        match event.key {
            Some(Key::Enter) => self.success(doc, Some(event)),
            Some(Key::Escape) if self.options.keyboard => {
                event.stop_propagation();
                self.close(doc)
            }
            _ => Ok(()),
        }
    }

    /// Detaches the dialog and unbinds its events. Closing a closed dialog
    /// does nothing.
    pub fn close(&mut self, doc: &mut Document) -> Result<()> {
        if self.state == ModalState::Closed {
            return Ok(());
        }
        doc.undelegate(self.owner);
        if let Some(element) = self.element {
            doc.remove_class(element, "is-open");
            doc.set_attr(element, "aria-hidden", "true");
            doc.set_hidden(element, true);
            doc.detach(element);
        }
        self.transition(ModalState::Closed);
        self.dialog.on_closed(doc);
        Ok(())
    }

    fn transition(&mut self, next: ModalState) {
        debug!(dialog = self.dialog.tag(), from = %self.state, to = %next, "dialog state change");
        self.state = next;
    }
}

impl<D: Dialog> EventTarget for ModalController<D> {
    fn handle_event(&mut self, doc: &mut Document, action: &str, event: &mut DomEvent) -> Result<()> {
        match action {
            "success" => self.success(doc, Some(event)),
            "cancel" => self.cancel(doc, Some(event)),
            "keydown" => self.keydown(doc, event),
            other => {
                let Some(element) = self.element else {
                    return Ok(());
                };
                let mut scope = self.scope(doc, element);
                self.dialog.on_action(&mut scope, other, event)
            }
        }
    }
}

impl<D: Dialog> Controller for ModalController<D> {
    /// Closes the dialog and frees its element. A destroyed controller
    /// cannot be constructed again.
    fn destroy(&mut self, doc: &mut Document) -> Result<()> {
        self.close(doc)?;
        if let Some(element) = self.element.take() {
            doc.remove_node(element);
        }
        self.destroyed = true;
        Ok(())
    }
}

/// Weak handle for closing a dialog from outside its own hooks, e.g. from a
/// request continuation.
pub struct ModalHandle<D: Dialog> {
    inner: Weak<RefCell<ModalController<D>>>,
}

impl<D: Dialog> Clone for ModalHandle<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Dialog> ModalHandle<D> {
    pub fn upgrade(&self) -> Option<ModalRef<D>> {
        self.inner.upgrade()
    }

    /// Closes the dialog if it still exists. Fails when called from inside
    /// one of the dialog's own hooks.
    pub fn close(&self, doc: &mut Document) -> Result<()> {
        let Some(controller) = self.inner.upgrade() else {
            return Ok(());
        };
        let mut controller = controller
            .try_borrow_mut()
            .map_err(|_| ViewError::lifecycle("dialog is busy; close it after the hook returns"))?;
        controller.close(doc)
    }

    pub fn state(&self) -> Option<ModalState> {
        let controller = self.inner.upgrade()?;
        let state = controller.try_borrow().ok()?.state();
        Some(state)
    }
}
