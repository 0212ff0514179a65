//! Single-slot mount points and layouts built from them.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use serde_json::Value;
use tracing::debug;

use crate::{
    dom::{Document, NodeId},
    error::{Result, ViewError},
    events::EventTarget,
    view::{bind_events, View, ViewCore},
};

#[derive(Debug, Clone)]
enum MountTarget {
    Node(NodeId),
    Scoped { scope: NodeId, selector: String },
}

/// Owns at most one live view.
pub struct Region {
    name: String,
    target: MountTarget,
    mount: Option<NodeId>,
    current: Option<Rc<RefCell<dyn View>>>,
}

impl Region {
    /// A region mounted on a known element.
    pub fn new(name: &str, mount: NodeId) -> Self {
        Self {
            name: name.to_string(),
            target: MountTarget::Node(mount),
            mount: None,
            current: None,
        }
    }

    /// A region whose mount is the first match of `selector` below `scope`,
    /// looked up on first use.
    pub fn scoped(name: &str, scope: NodeId, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            target: MountTarget::Scoped {
                scope,
                selector: selector.to_string(),
            },
            mount: None,
            current: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_view(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<Rc<RefCell<dyn View>>> {
        self.current.clone()
    }

    /// The resolved mount element, if it has been resolved and still exists.
    pub fn mount(&self) -> Option<NodeId> {
        self.mount
    }

    fn resolve_mount(&mut self, doc: &Document) -> Result<NodeId> {
        if let Some(mount) = self.mount.filter(|mount| doc.contains(*mount)) {
            return Ok(mount);
        }
        let mount = match &self.target {
            MountTarget::Node(node) if doc.contains(*node) => *node,
            MountTarget::Node(node) => return Err(ViewError::MissingElement(node.to_string())),
            MountTarget::Scoped { scope, selector } => doc
                .find(*scope, selector)?
                .ok_or_else(|| ViewError::MissingElement(selector.clone()))?,
        };
        self.mount = Some(mount);
        Ok(mount)
    }

    /// Shows a new view, returning a shared handle to it.
    pub fn show<V: View + 'static>(&mut self, doc: &mut Document, view: V) -> Result<Rc<RefCell<V>>> {
        let view = Rc::new(RefCell::new(view));
        self.show_rc(doc, &view)?;
        Ok(view)
    }

    /// Closes the current view, then renders `view` into the mount, binds
    /// its events and calls its `on_shown` hook. Showing the view that is
    /// already current re-renders it in place.
    pub fn show_rc<V: View + 'static>(&mut self, doc: &mut Document, view: &Rc<RefCell<V>>) -> Result<()> {
        let erased: Rc<RefCell<dyn View>> = view.clone();
        let same = self
            .current
            .as_ref()
            .is_some_and(|current| std::ptr::addr_eq(Rc::as_ptr(current), Rc::as_ptr(&erased)));
        if !same {
            let previous = self.current.take();
            Self::close_view(doc, previous.as_ref())?;
        }

        let mount = self.resolve_mount(doc)?;
        let element = view.borrow_mut().render(doc)?;
        doc.replace_children(mount, element)?;
        bind_events(doc, view)?;
        self.current = Some(erased);
        debug!(region = %self.name, view = view.borrow().core().id().get(), "region showing view");
        view.borrow_mut().on_shown(doc)
    }

    /// Runs the removal contract of `view`; `None` is a no-op.
    pub fn close_view(doc: &mut Document, view: Option<&Rc<RefCell<dyn View>>>) -> Result<()> {
        let Some(view) = view else {
            return Ok(());
        };
        let mut view = view
            .try_borrow_mut()
            .map_err(|_| ViewError::lifecycle("view is busy and cannot be closed"))?;
        view.remove(doc)
    }

    /// Closes the current view, leaving the region empty.
    pub fn remove(&mut self, doc: &mut Document) -> Result<()> {
        let previous = self.current.take();
        if previous.is_some() {
            debug!(region = %self.name, "region closed");
        }
        Self::close_view(doc, previous.as_ref())
    }
}

/// A view made of named regions. The region map is rebuilt from the
/// definitions each time the layout renders.
pub struct Layout {
    core: ViewCore,
    data: Value,
    definitions: Vec<(String, String)>,
    regions: BTreeMap<String, Region>,
}

impl Layout {
    pub fn new(core: ViewCore) -> Self {
        Self {
            core,
            data: Value::Null,
            definitions: Vec::new(),
            regions: BTreeMap::new(),
        }
    }

    /// Declares region `name` mounted at `selector` inside the layout.
    pub fn region_def(mut self, name: &str, selector: &str) -> Self {
        self.definitions.push((name.to_string(), selector.to_string()));
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn set_data(&mut self, data: Value) {
        self.data = data;
    }

    pub fn region(&mut self, name: &str) -> Result<&mut Region> {
        self.regions
            .get_mut(name)
            .ok_or_else(|| ViewError::UnknownRegion(name.to_string()))
    }

    pub fn region_names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn close_regions(&mut self, doc: &mut Document) -> Result<()> {
        for region in self.regions.values_mut() {
            region.remove(doc)?;
        }
        Ok(())
    }

    /// Closes existing regions, renders the template and rebuilds the
    /// region map.
    pub fn render_layout(&mut self, doc: &mut Document) -> Result<NodeId> {
        self.close_regions(doc)?;
        let element = self.core.render_template(doc, &self.data)?;
        self.regions = self
            .definitions
            .iter()
            .map(|(name, selector)| (name.clone(), Region::scoped(name, element, selector)))
            .collect();
        Ok(element)
    }

    /// Closes every region before the layout's own teardown.
    pub fn remove_layout(&mut self, doc: &mut Document) -> Result<()> {
        let closed = self.close_regions(doc);
        self.regions.clear();
        self.core.teardown(doc);
        closed
    }
}

impl EventTarget for Layout {}

impl View for Layout {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn render(&mut self, doc: &mut Document) -> Result<NodeId> {
        self.render_layout(doc)
    }

    fn remove(&mut self, doc: &mut Document) -> Result<()> {
        self.remove_layout(doc)
    }
}
