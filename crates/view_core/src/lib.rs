//! View composition for the inventory client: an in-memory document, views
//! with declarative event tables, single-slot regions and layouts, the
//! dialog state machine, controller slots, an event bus and a router.

pub mod bus;
pub mod controller;
pub mod dom;
pub mod error;
pub mod events;
pub mod feedback;
pub mod modal;
pub mod model;
pub mod region;
pub mod router;
pub mod selector;
pub mod template;
pub mod view;

pub use bus::{BusEvent, EventBus, Listeners, Subscription};
pub use controller::{Controller, ControllerSlot};
pub use dom::{Document, NodeId};
pub use error::{Result, ViewError};
pub use events::{dispatch, DomEvent, EventBinding, EventKind, EventTarget, Key, ViewId};
pub use feedback::{clear_field_errors, render_field_errors, MessageBoard, MessageLevel};
pub use modal::{
    CloseTiming, Dialog, DialogScope, ModalController, ModalHandle, ModalOptions, ModalRef,
    ModalState,
};
pub use model::{Collection, FieldSetters, Model};
pub use region::{Layout, Region};
pub use router::{Params, Router};
pub use template::TemplateRegistry;
pub use view::{bind_events, StaticView, View, ViewCore};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
