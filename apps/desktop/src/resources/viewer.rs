//! Read-only record page.

use std::{
    cell::RefCell,
    marker::PhantomData,
    rc::{Rc, Weak},
};

use serde_json::json;
use tracing::warn;
use view_core::{
    BusEvent, Controller, Document, DomEvent, EventTarget, Listeners, Model, NodeId, Region, View,
    ViewCore, ViewId,
};

use crate::context::AppContext;

use super::{confirm_delete, detail_rows, record_title, record_url, ResourceType};

const DELETE_FAILED: &str = "Something goes wrong";

pub struct ViewerController<K: ResourceType> {
    ctx: Rc<AppContext>,
    owner: ViewId,
    region: Rc<RefCell<Region>>,
    listeners: Listeners,
    detail: Option<Rc<RefCell<DetailView<K>>>>,
    this: Weak<RefCell<ViewerController<K>>>,
}

impl<K: ResourceType> ViewerController<K> {
    pub fn new(ctx: Rc<AppContext>, region: Rc<RefCell<Region>>) -> Rc<RefCell<Self>> {
        let controller = Rc::new_cyclic(|this: &Weak<RefCell<Self>>| {
            RefCell::new(Self {
                ctx,
                owner: ViewId::next(),
                region,
                listeners: Listeners::new(),
                detail: None,
                this: this.clone(),
            })
        });
        controller.borrow_mut().subscribe();
        controller
    }

    fn subscribe(&mut self) {
        let this = self.this.clone();
        let name = format!("{}:view:delete", K::KIND.route_segment());
        self.listeners
            .listen(self.ctx.bus().subscribe(&name, move |doc, _event| {
                match this.upgrade() {
                    Some(controller) => controller.borrow_mut().delete_record(doc),
                    None => Ok(()),
                }
            }));
    }

    pub fn show_record(&mut self, doc: &mut Document, model: Model) -> view_core::Result<()> {
        let view = DetailView::<K>::new(
            self.ctx.clone(),
            ViewCore::new(self.ctx.templates().clone()),
            model,
        );
        let view = self.region.borrow_mut().show(doc, view)?;
        self.detail = Some(view);
        Ok(())
    }

    /// Goes back to the list once the record is gone.
    fn delete_record(&mut self, doc: &mut Document) -> view_core::Result<()> {
        let url = self
            .detail
            .as_ref()
            .and_then(|detail| record_url(&self.ctx, K::KIND, &detail.borrow().model));
        let Some(url) = url else {
            warn!(kind = %K::KIND, "record has no url to delete");
            return Ok(());
        };
        confirm_delete(
            &self.ctx,
            doc,
            self.owner,
            K::KIND,
            url,
            DELETE_FAILED,
            |ctx, _doc| {
                ctx.navigate(K::KIND.route_segment());
                Ok(())
            },
        )
    }
}

impl<K: ResourceType> Controller for ViewerController<K> {
    fn destroy(&mut self, doc: &mut Document) -> view_core::Result<()> {
        self.ctx.cancel_requests(self.owner);
        self.listeners.stop_listening();
        self.detail = None;
        self.region.borrow_mut().remove(doc)
    }
}

pub struct DetailView<K: ResourceType> {
    core: ViewCore,
    ctx: Rc<AppContext>,
    model: Model,
    _kind: PhantomData<K>,
}

impl<K: ResourceType> DetailView<K> {
    fn new(ctx: Rc<AppContext>, core: ViewCore, model: Model) -> Self {
        Self {
            core: core
                .class_name("resource-view")
                .template("resource_view")
                .on("click button[name=back]", "back")
                .on("click button[name=edit]", "edit")
                .on("click button[name=delete]", "delete"),
            ctx,
            model,
            _kind: PhantomData,
        }
    }
}

impl<K: ResourceType> EventTarget for DetailView<K> {
    fn handle_event(&mut self, _doc: &mut Document, action: &str, _event: &mut DomEvent) -> view_core::Result<()> {
        let segment = K::KIND.route_segment();
        match action {
            "back" => self.ctx.navigate(segment),
            "edit" => match self.model.id() {
                Some(id) => self.ctx.navigate(&format!("{segment}/edit/{id}")),
                None => warn!(kind = %K::KIND, "record has no id to edit"),
            },
            "delete" => self.ctx.bus().publish(
                BusEvent::new(&format!("{segment}:view:delete")).from_source(self.core.id()),
            ),
            _ => {}
        }
        Ok(())
    }
}

impl<K: ResourceType> View for DetailView<K> {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn render(&mut self, doc: &mut Document) -> view_core::Result<NodeId> {
        let data = json!({
            "title": record_title(&self.model, K::TITLE_FIELD),
            "singular": K::KIND.singular(),
            "rows": detail_rows(&self.ctx, K::KIND, K::FIELDS, &self.model),
        });
        self.core.render_template(doc, &data)
    }
}
