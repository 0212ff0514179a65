//! Record listing with a search bar and per-row actions.

use std::{
    cell::RefCell,
    marker::PhantomData,
    rc::{Rc, Weak},
};

use serde_json::{json, Value};
use tracing::{debug, warn};
use view_core::{
    BusEvent, Collection, Controller, Document, DomEvent, EventTarget, Key, Layout, Listeners,
    NodeId, Region, View, ViewCore, ViewId,
};

use crate::backend_bridge::commands::ApiRequest;
use crate::context::AppContext;
use crate::controller::events::ApiReply;

use super::{capitalized, cid_of, confirm_delete, detail_rows, record_title, record_url, ResourceType};

const DELETE_FAILED: &str = "Ooops... Something went wrong";

fn event_name<K: ResourceType>(event: &str) -> String {
    format!("{}:{event}", K::KIND.route_segment())
}

pub struct ListController<K: ResourceType> {
    ctx: Rc<AppContext>,
    owner: ViewId,
    region: Rc<RefCell<Region>>,
    listeners: Listeners,
    layout: Option<Rc<RefCell<Layout>>>,
    list_view: Option<Rc<RefCell<ListView<K>>>>,
    this: Weak<RefCell<ListController<K>>>,
}

impl<K: ResourceType> ListController<K> {
    pub fn new(ctx: Rc<AppContext>, region: Rc<RefCell<Region>>) -> Rc<RefCell<Self>> {
        let controller = Rc::new_cyclic(|this: &Weak<RefCell<Self>>| {
            RefCell::new(Self {
                ctx,
                owner: ViewId::next(),
                region,
                listeners: Listeners::new(),
                layout: None,
                list_view: None,
                this: this.clone(),
            })
        });
        controller.borrow_mut().subscribe();
        controller
    }

    fn subscribe(&mut self) {
        let bus = self.ctx.bus().clone();

        let this = self.this.clone();
        self.listeners
            .listen(bus.subscribe(&event_name::<K>("search"), move |doc, event| {
                let term = event.payload["term"].as_str().unwrap_or_default().to_string();
                match this.upgrade() {
                    Some(controller) => controller.borrow_mut().search(doc, term),
                    None => Ok(()),
                }
            }));

        let this = self.this.clone();
        self.listeners
            .listen(bus.subscribe(&event_name::<K>("delete"), move |doc, event| {
                let Some(cid) = event.payload["cid"].as_u64() else {
                    return Ok(());
                };
                match this.upgrade() {
                    Some(controller) => controller.borrow_mut().delete_record(doc, cid),
                    None => Ok(()),
                }
            }));
    }

    pub fn record_count(&self) -> usize {
        self.list_view
            .as_ref()
            .map(|list| list.borrow().collection.len())
            .unwrap_or_default()
    }

    /// Shows the layout with its action bar and `collection`.
    pub fn show_list(&mut self, doc: &mut Document, collection: Collection) -> view_core::Result<()> {
        let templates = self.ctx.templates().clone();
        let layout = Layout::new(
            ViewCore::new(templates.clone())
                .class_name("resource-list")
                .template("resource_list_layout"),
        )
        .region_def("actions", ".actions-bar-container")
        .region_def("list", ".list-container")
        .with_data(json!({"title": capitalized(K::KIND.route_segment())}));
        let layout = self.region.borrow_mut().show(doc, layout)?;

        let actions = ActionBar::<K>::new(self.ctx.clone(), ViewCore::new(templates.clone()));
        let list = ListView::<K>::new(self.ctx.clone(), ViewCore::new(templates), collection);
        let list = {
            let mut layout = layout.borrow_mut();
            layout.region("actions")?.show(doc, actions)?;
            layout.region("list")?.show(doc, list)?
        };
        debug!(kind = %K::KIND, records = list.borrow().collection.len(), "list shown");
        self.layout = Some(layout);
        self.list_view = Some(list);
        Ok(())
    }

    fn rerender_list(&mut self, doc: &mut Document) -> view_core::Result<()> {
        let (Some(layout), Some(list)) = (&self.layout, &self.list_view) else {
            return Ok(());
        };
        let mut layout = layout.borrow_mut();
        layout.region("list")?.show_rc(doc, list)
    }

    /// An empty term lists everything again.
    fn search(&mut self, _doc: &mut Document, term: String) -> view_core::Result<()> {
        let Some(url) = self.ctx.resource_url(K::KIND) else {
            return Ok(());
        };
        let term = term.trim().to_string();
        debug!(kind = %K::KIND, term = %term, "searching");
        let request = if term.is_empty() {
            ApiRequest::List { url }
        } else {
            ApiRequest::Search { url, term }
        };
        let this = self.this.clone();
        self.ctx.request(self.owner, request, move |ctx, doc, outcome| match outcome {
            Ok(ApiReply::Records(records)) => {
                let collection = Collection::from_records(records, &K::setters())?;
                let Some(controller) = this.upgrade() else {
                    return Ok(());
                };
                let mut controller = controller.borrow_mut();
                if let Some(list) = &controller.list_view {
                    list.borrow_mut().collection = collection;
                }
                controller.rerender_list(doc)
            }
            Ok(other) => ctx.unexpected_reply(doc, "search", &other),
            Err(err) => ctx.report_error(doc, &err),
        });
        Ok(())
    }

    fn delete_record(&mut self, doc: &mut Document, cid: u64) -> view_core::Result<()> {
        let url = self.list_view.as_ref().and_then(|list| {
            let list = list.borrow();
            list.collection
                .get_by_cid(cid)
                .and_then(|model| record_url(&self.ctx, K::KIND, model))
        });
        let Some(url) = url else {
            warn!(kind = %K::KIND, cid, "delete requested for an unknown record");
            return Ok(());
        };
        let this = self.this.clone();
        confirm_delete(
            &self.ctx,
            doc,
            self.owner,
            K::KIND,
            url,
            DELETE_FAILED,
            move |_ctx, doc| match this.upgrade() {
                Some(controller) => controller.borrow_mut().remove_record(doc, cid),
                None => Ok(()),
            },
        )
    }

    fn remove_record(&mut self, doc: &mut Document, cid: u64) -> view_core::Result<()> {
        if let Some(list) = &self.list_view {
            list.borrow_mut().collection.remove_by_cid(cid);
        }
        self.rerender_list(doc)
    }
}

impl<K: ResourceType> Controller for ListController<K> {
    fn destroy(&mut self, doc: &mut Document) -> view_core::Result<()> {
        self.ctx.cancel_requests(self.owner);
        self.listeners.stop_listening();
        self.list_view = None;
        self.layout = None;
        self.region.borrow_mut().remove(doc)
    }
}

pub struct ActionBar<K: ResourceType> {
    core: ViewCore,
    ctx: Rc<AppContext>,
    _kind: PhantomData<K>,
}

impl<K: ResourceType> ActionBar<K> {
    fn new(ctx: Rc<AppContext>, core: ViewCore) -> Self {
        Self {
            core: core
                .class_name("actions-bar")
                .template("resource_action_bar")
                .on("click button[name=create]", "create")
                .on("click button[name=search]", "search")
                .on("keydown input[name=search]", "search-key"),
            ctx,
            _kind: PhantomData,
        }
    }

    fn publish_search(&self, doc: &Document) -> view_core::Result<()> {
        let term = match self.core.find(doc, "input[name=search]")? {
            Some(input) => doc.value(input).unwrap_or_default().to_string(),
            None => String::new(),
        };
        self.ctx.bus().publish(
            BusEvent::new(&event_name::<K>("search"))
                .with_payload(json!({"term": term}))
                .from_source(self.core.id()),
        );
        Ok(())
    }
}

impl<K: ResourceType> EventTarget for ActionBar<K> {
    fn handle_event(&mut self, doc: &mut Document, action: &str, event: &mut DomEvent) -> view_core::Result<()> {
        match action {
            "create" => {
                self.ctx
                    .navigate(&format!("{}/create", K::KIND.route_segment()));
                Ok(())
            }
            "search" => self.publish_search(doc),
            "search-key" if event.key == Some(Key::Enter) => {
                event.prevent_default();
                self.publish_search(doc)
            }
            _ => Ok(()),
        }
    }
}

impl<K: ResourceType> View for ActionBar<K> {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn render(&mut self, doc: &mut Document) -> view_core::Result<NodeId> {
        let data = json!({"singular": K::KIND.singular(), "plural": K::KIND.route_segment()});
        self.core.render_template(doc, &data)
    }
}

pub struct ListView<K: ResourceType> {
    core: ViewCore,
    ctx: Rc<AppContext>,
    collection: Collection,
    _kind: PhantomData<K>,
}

impl<K: ResourceType> ListView<K> {
    fn new(ctx: Rc<AppContext>, core: ViewCore, collection: Collection) -> Self {
        Self {
            core: core
                .class_name("records")
                .template("resource_list")
                .on("click button.view", "view")
                .on("click button.edit", "edit")
                .on("click button.delete", "delete"),
            ctx,
            collection,
            _kind: PhantomData,
        }
    }

    fn data(&self) -> Value {
        let columns: Vec<Value> = K::FIELDS
            .iter()
            .map(|field| json!({"label": field.label}))
            .collect();
        let records: Vec<Value> = self
            .collection
            .iter()
            .map(|model| {
                json!({
                    "cid": model.cid(),
                    "title": record_title(model, K::TITLE_FIELD),
                    "cells": detail_rows(&self.ctx, K::KIND, K::FIELDS, model),
                })
            })
            .collect();
        json!({
            "plural": K::KIND.route_segment(),
            "columns": columns,
            "records": records,
        })
    }
}

impl<K: ResourceType> EventTarget for ListView<K> {
    fn handle_event(&mut self, doc: &mut Document, action: &str, event: &mut DomEvent) -> view_core::Result<()> {
        let Some(cid) = cid_of(doc, event.target) else {
            return Ok(());
        };
        let segment = K::KIND.route_segment();
        let id = self
            .collection
            .get_by_cid(cid)
            .and_then(|model| model.id());
        match (action, id) {
            ("view", Some(id)) => self.ctx.navigate(&format!("{segment}/{id}")),
            ("edit", Some(id)) => self.ctx.navigate(&format!("{segment}/edit/{id}")),
            ("delete", _) => self.ctx.bus().publish(
                BusEvent::new(&event_name::<K>("delete"))
                    .with_payload(json!({"cid": cid}))
                    .from_source(self.core.id()),
            ),
            (action, None) => warn!(kind = %K::KIND, cid, action, "record has no id"),
            _ => {}
        }
        Ok(())
    }
}

impl<K: ResourceType> View for ListView<K> {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn render(&mut self, doc: &mut Document) -> view_core::Result<NodeId> {
        let data = self.data();
        self.core.render_template(doc, &data)
    }
}
