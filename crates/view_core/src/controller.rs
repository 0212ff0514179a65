//! Controller slots: one live controller per logical slot.

use std::{
    any::{type_name, Any, TypeId},
    cell::RefCell,
    fmt,
    rc::Rc,
};

use tracing::debug;

use crate::{
    dom::Document,
    error::{Result, ViewError},
};

/// Something that owns UI resources and must release them explicitly.
pub trait Controller {
    fn destroy(&mut self, doc: &mut Document) -> Result<()>;
}

struct Active {
    type_id: TypeId,
    type_name: &'static str,
    instance: Rc<dyn Any>,
    destroy: fn(&dyn Any, &mut Document) -> Result<()>,
}

fn destroy_erased<C: Controller + 'static>(instance: &dyn Any, doc: &mut Document) -> Result<()> {
    let Some(cell) = instance.downcast_ref::<RefCell<C>>() else {
        return Ok(());
    };
    let mut controller = cell
        .try_borrow_mut()
        .map_err(|_| ViewError::lifecycle("controller is busy and cannot be destroyed"))?;
    controller.destroy(doc)
}

/// Holds the current controller of a slot and applies the reuse-or-replace
/// rule when another one is requested.
pub struct ControllerSlot {
    name: &'static str,
    current: Option<Active>,
}

impl fmt::Debug for ControllerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerSlot")
            .field("name", &self.name)
            .field("current", &self.current_type())
            .finish()
    }
}

impl ControllerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: None,
        }
    }

    /// Returns the current controller when it is a `C`; otherwise destroys
    /// the current one and installs the result of `make`.
    pub fn start<C, F>(&mut self, doc: &mut Document, make: F) -> Result<Rc<RefCell<C>>>
    where
        C: Controller + 'static,
        F: FnOnce() -> Result<Rc<RefCell<C>>>,
    {
        if let Some(existing) = self.current::<C>() {
            debug!(slot = self.name, controller = type_name::<C>(), "reusing controller");
            return Ok(existing);
        }
        self.destroy(doc)?;
        let instance = make()?;
        let erased: Rc<dyn Any> = instance.clone();
        self.current = Some(Active {
            type_id: TypeId::of::<C>(),
            type_name: type_name::<C>(),
            instance: erased,
            destroy: destroy_erased::<C>,
        });
        debug!(slot = self.name, controller = type_name::<C>(), "started controller");
        Ok(instance)
    }

    pub fn current<C: Controller + 'static>(&self) -> Option<Rc<RefCell<C>>> {
        let active = self.current.as_ref()?;
        if active.type_id != TypeId::of::<C>() {
            return None;
        }
        active.instance.clone().downcast::<RefCell<C>>().ok()
    }

    pub fn is_active<C: Controller + 'static>(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|active| active.type_id == TypeId::of::<C>())
    }

    pub fn current_type(&self) -> Option<&'static str> {
        self.current.as_ref().map(|active| active.type_name)
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Destroys the current controller, if any. The slot is empty afterwards
    /// even when the controller's own teardown fails.
    pub fn destroy(&mut self, doc: &mut Document) -> Result<()> {
        let Some(active) = self.current.take() else {
            return Ok(());
        };
        debug!(slot = self.name, controller = active.type_name, "destroying controller");
        (active.destroy)(active.instance.as_ref(), doc)
    }
}
