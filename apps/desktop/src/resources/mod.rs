//! The four REST collections and the sub-application that lists, edits and
//! shows their records.

pub mod editor;
pub mod list;
pub mod viewer;

use std::{
    cell::RefCell,
    marker::PhantomData,
    rc::{Rc, Weak},
};

use serde_json::{json, Map, Value};
use shared::domain::ResourceKind;
use tracing::{info, warn};
use view_core::{
    model::{nullable_setter, numeric_setter},
    Collection, Controller, ControllerSlot, Document, FieldSetters, Model, NodeId, Region,
    ViewError, ViewId,
};

use crate::backend_bridge::commands::ApiRequest;
use crate::context::AppContext;
use crate::controller::events::{ApiReply, UiError, UiErrorContext};
use crate::notify::{alert_error, alert_success, ask_confirmation};

use self::{editor::EditorController, list::ListController, viewer::ViewerController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Number,
    Date,
    Email,
    Checkbox,
    Select,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Number => "number",
            InputKind::Date => "date",
            InputKind::Email => "email",
            InputKind::Checkbox => "checkbox",
            InputKind::Select => "select",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub input: InputKind,
}

const fn field(name: &'static str, label: &'static str, input: InputKind) -> FieldSpec {
    FieldSpec { name, label, input }
}

/// Static description of one collection.
pub trait ResourceType: 'static {
    const KIND: ResourceKind;
    const FIELDS: &'static [FieldSpec];
    /// Field shown as the record's title in lists and headers.
    const TITLE_FIELD: &'static str;

    fn setters() -> FieldSetters {
        FieldSetters::new()
    }
}

pub struct Projects;
pub struct Accounts;
pub struct Invoices;
pub struct Items;

impl ResourceType for Projects {
    const KIND: ResourceKind = ResourceKind::Projects;
    const FIELDS: &'static [FieldSpec] = &[
        field("name", "Name", InputKind::Text),
        field("inventory_type", "Inventory Type", InputKind::Select),
        field("public", "Public", InputKind::Checkbox),
        field("active", "Active", InputKind::Checkbox),
    ];
    const TITLE_FIELD: &'static str = "name";

    fn setters() -> FieldSetters {
        FieldSetters::new()
            .with("public", bool_setter("public"))
            .with("active", bool_setter("active"))
            .with("inventory_type", nullable_setter("inventory_type"))
    }
}

impl ResourceType for Accounts {
    const KIND: ResourceKind = ResourceKind::Accounts;
    const FIELDS: &'static [FieldSpec] = &[
        field("username", "Username", InputKind::Text),
        field("first_name", "First Name", InputKind::Text),
        field("last_name", "Last Name", InputKind::Text),
        field("email", "Email", InputKind::Email),
    ];
    const TITLE_FIELD: &'static str = "username";
}

impl ResourceType for Invoices {
    const KIND: ResourceKind = ResourceKind::Invoices;
    const FIELDS: &'static [FieldSpec] = &[
        field("invoice_number", "Invoice Number", InputKind::Text),
        field("supplier", "Supplier", InputKind::Text),
        field("currency", "Currency", InputKind::Select),
        field("invoice_date", "Invoice Date", InputKind::Date),
        field("credit", "Credit", InputKind::Number),
        field("shipping", "Shipping", InputKind::Number),
        field("other", "Other", InputKind::Number),
        field("tax", "Tax", InputKind::Number),
        field("notes", "Notes", InputKind::Text),
    ];
    const TITLE_FIELD: &'static str = "invoice_number";

    fn setters() -> FieldSetters {
        FieldSetters::new()
            .with("currency", nullable_setter("currency"))
            .with("supplier", nullable_setter("supplier"))
            .with("invoice_date", nullable_setter("invoice_date"))
            .with("credit", numeric_setter("credit"))
            .with("shipping", numeric_setter("shipping"))
            .with("other", numeric_setter("other"))
            .with("tax", numeric_setter("tax"))
    }
}

impl ResourceType for Items {
    const KIND: ResourceKind = ResourceKind::Items;
    const FIELDS: &'static [FieldSpec] = &[
        field("item_number", "Item Number", InputKind::Text),
        field("description", "Description", InputKind::Text),
        field("quantity", "Quantity", InputKind::Number),
        field("unit_price", "Unit Price", InputKind::Number),
        field("process", "Process", InputKind::Checkbox),
    ];
    const TITLE_FIELD: &'static str = "item_number";

    fn setters() -> FieldSetters {
        FieldSetters::new()
            .with("quantity", numeric_setter("quantity"))
            .with("unit_price", numeric_setter("unit_price"))
            .with("process", bool_setter("process"))
    }
}

/// Setter for checkbox text: `true`, `on`, `yes` and `1` are true, anything
/// else false.
pub fn bool_setter(
    field: &'static str,
) -> impl Fn(&mut Map<String, Value>, Value) -> view_core::Result<()> {
    move |attributes, value| {
        let flag = match value {
            Value::Bool(flag) => flag,
            Value::String(text) => matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "true" | "on" | "yes" | "1"
            ),
            Value::Null => false,
            other => {
                return Err(ViewError::Data(format!(
                    "`{field}` expects a boolean, got {other}"
                )))
            }
        };
        attributes.insert(field.to_string(), Value::Bool(flag));
        Ok(())
    }
}

pub fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Bool(true)) => "Yes".to_string(),
        Some(Value::Bool(false)) => "No".to_string(),
        Some(other) => other.to_string(),
    }
}

/// `[{name, label, value}]` rows for templates, with choice values shown by
/// their display names.
pub fn detail_rows(ctx: &AppContext, kind: ResourceKind, fields: &[FieldSpec], model: &Model) -> Value {
    let meta = ctx.meta(kind);
    let rows: Vec<Value> = fields
        .iter()
        .map(|spec| {
            let raw = display_value(model.get(spec.name));
            let shown = meta
                .as_ref()
                .and_then(|meta| meta.choices(spec.name).get(&raw).cloned())
                .unwrap_or(raw);
            json!({"name": spec.name, "label": spec.label, "value": shown})
        })
        .collect();
    Value::Array(rows)
}

pub fn record_title(model: &Model, title_field: &str) -> String {
    let title = display_value(model.get(title_field));
    if title.is_empty() {
        model
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("#{}", model.cid()))
    } else {
        title
    }
}

/// `data-cid` of the closest record element at or above `node`.
pub fn cid_of(doc: &Document, node: NodeId) -> Option<u64> {
    let mut current = Some(node);
    while let Some(node) = current {
        if let Some(cid) = doc.attr(node, "data-cid") {
            return cid.parse().ok();
        }
        current = doc.parent(node);
    }
    None
}

/// Canonical URL of an existing record: its own link, else the collection
/// URL plus its id.
pub fn record_url(ctx: &AppContext, kind: ResourceKind, model: &Model) -> Option<String> {
    if let Some(href) = model.href().filter(|href| !href.is_empty()) {
        return Some(ctx.absolute_url(href));
    }
    let base = ctx.resource_url(kind)?;
    let id = model.id()?;
    Some(format!("{}/{id}/", base.trim_end_matches('/')))
}

/// Asks before deleting the record at `url`; `on_deleted` runs after the
/// backend confirms.
pub fn confirm_delete<F>(
    ctx: &Rc<AppContext>,
    doc: &mut Document,
    owner: ViewId,
    kind: ResourceKind,
    url: String,
    failure: &'static str,
    on_deleted: F,
) -> view_core::Result<()>
where
    F: FnOnce(&Rc<AppContext>, &mut Document) -> view_core::Result<()> + 'static,
{
    let singular = kind.singular();
    ask_confirmation(
        ctx,
        doc,
        &format!("The {singular} will be deleted"),
        move |ctx, _doc| {
            ctx.request(owner, ApiRequest::Delete { url }, move |ctx, doc, outcome| {
                match outcome {
                    Ok(_) => {
                        info!(kind = %kind, "record deleted");
                        on_deleted(ctx, doc)?;
                        alert_success(ctx, doc, &format!("{} was deleted", capitalized(singular)))
                    }
                    Err(err) if err.requires_reauth() => ctx.report_error(doc, &err),
                    Err(err) => {
                        warn!(kind = %kind, "delete failed: {}", err.message());
                        alert_error(ctx, doc, failure)
                    }
                }
            });
            Ok(())
        },
    )
}

/// Sub-application for one collection. Holds the page region and one
/// active controller.
pub struct ResourceApp<K: ResourceType> {
    ctx: Rc<AppContext>,
    owner: ViewId,
    region: Rc<RefCell<Region>>,
    slot: ControllerSlot,
    this: Weak<RefCell<ResourceApp<K>>>,
    _kind: PhantomData<K>,
}

impl<K: ResourceType> ResourceApp<K> {
    pub fn new(ctx: Rc<AppContext>, region: Rc<RefCell<Region>>) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|this| {
            RefCell::new(Self {
                ctx,
                owner: ViewId::next(),
                region,
                slot: ControllerSlot::new(K::KIND.route_segment()),
                this: this.clone(),
                _kind: PhantomData,
            })
        })
    }

    fn collection_url(&self, doc: &mut Document) -> view_core::Result<Option<String>> {
        match self.ctx.resource_url(K::KIND) {
            Some(url) => Ok(Some(url)),
            None => {
                let (group, name) = K::KIND.root_endpoint();
                let err = UiError::from_message(
                    UiErrorContext::Load,
                    format!("the API root has no `{group}.{name}` endpoint"),
                );
                self.ctx.report_error(doc, &err)?;
                Ok(None)
            }
        }
    }

    /// Runs `then` once the field metadata for this collection is known.
    /// Metadata is fetched at most once per session.
    fn with_meta<F>(&mut self, doc: &mut Document, then: F) -> view_core::Result<()>
    where
        F: FnOnce(&mut Self, &mut Document) -> view_core::Result<()> + 'static,
    {
        if self.ctx.meta(K::KIND).is_some() {
            return then(self, doc);
        }
        let Some(url) = self.collection_url(doc)? else {
            return Ok(());
        };
        let app = self.this.clone();
        self.ctx
            .request(self.owner, ApiRequest::FetchMeta { url }, move |ctx, doc, outcome| {
                match outcome {
                    Ok(ApiReply::Meta(meta)) => {
                        ctx.set_meta(K::KIND, meta);
                        match app.upgrade() {
                            Some(app) => then(&mut app.borrow_mut(), doc),
                            None => Ok(()),
                        }
                    }
                    Ok(other) => ctx.unexpected_reply(doc, "fetch_meta", &other),
                    Err(err) => ctx.report_error(doc, &err),
                }
            });
        Ok(())
    }

    pub fn show_list(&mut self, doc: &mut Document) -> view_core::Result<()> {
        self.with_meta(doc, |app, doc| {
            if let Some(url) = app.collection_url(doc)? {
                app.fetch_list(url);
            }
            Ok(())
        })
    }

    fn fetch_list(&mut self, url: String) {
        let app = self.this.clone();
        self.ctx
            .request(self.owner, ApiRequest::List { url }, move |ctx, doc, outcome| {
                match outcome {
                    Ok(ApiReply::Records(records)) => match app.upgrade() {
                        Some(app) => app.borrow_mut().show_list_of(doc, records),
                        None => Ok(()),
                    },
                    Ok(other) => ctx.unexpected_reply(doc, "list", &other),
                    Err(err) => ctx.report_error(doc, &err),
                }
            });
    }

    pub fn show_list_of(&mut self, doc: &mut Document, records: Vec<Value>) -> view_core::Result<()> {
        let collection = Collection::from_records(records, &K::setters())?;
        let ctx = self.ctx.clone();
        let region = self.region.clone();
        let list = self
            .slot
            .start::<ListController<K>, _>(doc, move || Ok(ListController::new(ctx, region)))?;
        let mut list = list.borrow_mut();
        list.show_list(doc, collection)
    }

    pub fn show_new_form(&mut self, doc: &mut Document) -> view_core::Result<()> {
        self.with_meta(doc, |app, doc| app.show_editor(doc, Model::new(K::setters())))
    }

    pub fn show_editor(&mut self, doc: &mut Document, model: Model) -> view_core::Result<()> {
        let ctx = self.ctx.clone();
        let region = self.region.clone();
        let editor = self
            .slot
            .start::<EditorController<K>, _>(doc, move || Ok(EditorController::new(ctx, region)))?;
        let mut editor = editor.borrow_mut();
        editor.show_editor(doc, model)
    }

    pub fn show_viewer(&mut self, doc: &mut Document, model: Model) -> view_core::Result<()> {
        let ctx = self.ctx.clone();
        let region = self.region.clone();
        let viewer = self
            .slot
            .start::<ViewerController<K>, _>(doc, move || Ok(ViewerController::new(ctx, region)))?;
        let mut viewer = viewer.borrow_mut();
        viewer.show_record(doc, model)
    }

    pub fn show_editor_by_id(&mut self, doc: &mut Document, id: &str) -> view_core::Result<()> {
        let id = id.to_string();
        self.with_meta(doc, move |app, doc| {
            app.fetch_record(doc, &id, |app, doc, model| app.show_editor(doc, model))
        })
    }

    pub fn show_by_id(&mut self, doc: &mut Document, id: &str) -> view_core::Result<()> {
        let id = id.to_string();
        self.with_meta(doc, move |app, doc| {
            app.fetch_record(doc, &id, |app, doc, model| app.show_viewer(doc, model))
        })
    }

    fn fetch_record<F>(&mut self, doc: &mut Document, id: &str, then: F) -> view_core::Result<()>
    where
        F: FnOnce(&mut Self, &mut Document, Model) -> view_core::Result<()> + 'static,
    {
        let Some(base) = self.collection_url(doc)? else {
            return Ok(());
        };
        let url = format!("{}/{id}/", base.trim_end_matches('/'));
        let app = self.this.clone();
        self.ctx
            .request(self.owner, ApiRequest::Get { url }, move |ctx, doc, outcome| {
                match outcome {
                    Ok(ApiReply::Record(record)) => {
                        let model = Model::from_value(record, K::setters())?;
                        match app.upgrade() {
                            Some(app) => then(&mut app.borrow_mut(), doc, model),
                            None => Ok(()),
                        }
                    }
                    Ok(other) => ctx.unexpected_reply(doc, "get", &other),
                    Err(err) => ctx.report_error(doc, &err),
                }
            });
        Ok(())
    }
}

impl<K: ResourceType> Controller for ResourceApp<K> {
    fn destroy(&mut self, doc: &mut Document) -> view_core::Result<()> {
        info!(app = K::KIND.route_segment(), "stopping sub-application");
        self.ctx.cancel_requests(self.owner);
        let stopped = self.slot.destroy(doc);
        self.region.borrow_mut().remove(doc)?;
        stopped
    }
}
