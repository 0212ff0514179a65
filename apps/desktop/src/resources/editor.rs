//! Create and edit forms with a live preview.

use std::{
    cell::{Cell, RefCell},
    marker::PhantomData,
    rc::{Rc, Weak},
};

use serde_json::{json, Value};
use shared::error::ValidationErrors;
use tracing::{debug, info, warn};
use view_core::{
    clear_field_errors, render_field_errors, BusEvent, Controller, Document, DomEvent, EventTarget,
    Layout, Listeners, Model, NodeId, Region, View, ViewCore, ViewError, ViewId,
};

use crate::backend_bridge::commands::ApiRequest;
use crate::context::AppContext;
use crate::controller::events::ApiReply;
use crate::notify::{alert_error, alert_success, ask_confirmation};

use super::{capitalized, detail_rows, display_value, record_title, record_url, InputKind, ResourceType};

const FORM_ERRORS: &str = ".all-error";
const SAVE_FAILED: &str = "Something goes wrong";

fn event_name<K: ResourceType>(event: &str) -> String {
    format!("{}:form:{event}", K::KIND.route_segment())
}

type SharedModel = Rc<RefCell<Model>>;

pub struct EditorController<K: ResourceType> {
    ctx: Rc<AppContext>,
    owner: ViewId,
    region: Rc<RefCell<Region>>,
    listeners: Listeners,
    layout: Option<Rc<RefCell<Layout>>>,
    form: Option<Rc<RefCell<FormView<K>>>>,
    preview: Option<Rc<RefCell<PreviewView<K>>>>,
    model: Option<SharedModel>,
    saving: Rc<Cell<bool>>,
    this: Weak<RefCell<EditorController<K>>>,
}

impl<K: ResourceType> EditorController<K> {
    pub fn new(ctx: Rc<AppContext>, region: Rc<RefCell<Region>>) -> Rc<RefCell<Self>> {
        let controller = Rc::new_cyclic(|this: &Weak<RefCell<Self>>| {
            RefCell::new(Self {
                ctx,
                owner: ViewId::next(),
                region,
                listeners: Listeners::new(),
                layout: None,
                form: None,
                preview: None,
                model: None,
                saving: Rc::new(Cell::new(false)),
                this: this.clone(),
            })
        });
        controller.borrow_mut().subscribe();
        controller
    }

    fn subscribe(&mut self) {
        let bus = self.ctx.bus().clone();
        for (event, action) in [
            ("changed", EditorAction::Changed),
            ("save", EditorAction::Save),
            ("cancel", EditorAction::Cancel),
        ] {
            let this = self.this.clone();
            self.listeners
                .listen(bus.subscribe(&event_name::<K>(event), move |doc, _event| {
                    let Some(controller) = this.upgrade() else {
                        return Ok(());
                    };
                    let mut controller = controller.borrow_mut();
                    match action {
                        EditorAction::Changed => controller.refresh_preview(doc),
                        EditorAction::Save => controller.save(doc),
                        EditorAction::Cancel => controller.cancel(doc),
                    }
                }));
        }
    }

    pub fn show_editor(&mut self, doc: &mut Document, model: Model) -> view_core::Result<()> {
        let singular = K::KIND.singular();
        let title = if model.is_new() {
            format!("New {singular}")
        } else {
            format!("Edit {singular}: {}", record_title(&model, K::TITLE_FIELD))
        };
        let model = Rc::new(RefCell::new(model));
        let templates = self.ctx.templates().clone();

        let layout = Layout::new(
            ViewCore::new(templates.clone())
                .class_name("resource-editor")
                .template("resource_form_layout"),
        )
        .region_def("form", "#form-container")
        .region_def("preview", "#preview-container")
        .with_data(json!({"title": title}));
        let layout = self.region.borrow_mut().show(doc, layout)?;

        let form = FormView::<K>::new(self.ctx.clone(), ViewCore::new(templates.clone()), model.clone());
        let preview = PreviewView::<K>::new(self.ctx.clone(), ViewCore::new(templates), model.clone());
        let (form, preview) = {
            let mut layout = layout.borrow_mut();
            let form = layout.region("form")?.show(doc, form)?;
            let preview = layout.region("preview")?.show(doc, preview)?;
            (form, preview)
        };
        debug!(kind = %K::KIND, new = model.borrow().is_new(), "editor shown");
        self.layout = Some(layout);
        self.form = Some(form);
        self.preview = Some(preview);
        self.model = Some(model);
        Ok(())
    }

    fn refresh_preview(&mut self, doc: &mut Document) -> view_core::Result<()> {
        let (Some(layout), Some(preview)) = (&self.layout, &self.preview) else {
            return Ok(());
        };
        let mut layout = layout.borrow_mut();
        layout.region("preview")?.show_rc(doc, preview)
    }

    /// Creates new records and updates existing ones. Only one write is in
    /// flight at a time; further saves are ignored until it answers.
    fn save(&mut self, doc: &mut Document) -> view_core::Result<()> {
        let Some(model) = self.model.clone() else {
            return Ok(());
        };
        if self.saving.get() {
            debug!(kind = %K::KIND, "save already in flight");
            return Ok(());
        }
        if let Some(form) = &self.form {
            form.borrow().clear_errors(doc)?;
        }
        let (body, is_new) = {
            let model = model.borrow();
            (model.to_json(), model.is_new())
        };
        let url = if is_new {
            self.ctx.resource_url(K::KIND)
        } else {
            record_url(&self.ctx, K::KIND, &model.borrow())
        };
        let Some(url) = url else {
            warn!(kind = %K::KIND, "no endpoint to save to");
            return alert_error(&self.ctx, doc, SAVE_FAILED);
        };
        let request = if is_new {
            ApiRequest::Create { url, body }
        } else {
            ApiRequest::Update { url, body }
        };

        let form = self.form.clone();
        let saving = self.saving.clone();
        saving.set(true);
        self.ctx.request(self.owner, request, move |ctx, doc, outcome| {
            saving.set(false);
            match outcome {
                Ok(ApiReply::Record(saved)) => {
                    model.borrow_mut().replace(saved)?;
                    info!(kind = %K::KIND, "record saved");
                    alert_success(ctx, doc, &format!("{} saved", capitalized(K::KIND.singular())))?;
                    ctx.navigate(K::KIND.route_segment());
                    Ok(())
                }
                Ok(other) => ctx.unexpected_reply(doc, "save", &other),
                Err(err) if err.requires_reauth() => ctx.report_error(doc, &err),
                Err(err) => match (err.validation(), form) {
                    (Some(errors), Some(form)) => form.borrow().show_errors(doc, errors),
                    _ => {
                        warn!(kind = %K::KIND, "save failed: {}", err.message());
                        alert_error(ctx, doc, SAVE_FAILED)
                    }
                },
            }
        });
        Ok(())
    }

    fn cancel(&mut self, doc: &mut Document) -> view_core::Result<()> {
        ask_confirmation(&self.ctx, doc, "Changes will be lost", |ctx, _doc| {
            ctx.navigate(K::KIND.route_segment());
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum EditorAction {
    Changed,
    Save,
    Cancel,
}

impl<K: ResourceType> Controller for EditorController<K> {
    fn destroy(&mut self, doc: &mut Document) -> view_core::Result<()> {
        self.ctx.cancel_requests(self.owner);
        self.listeners.stop_listening();
        self.form = None;
        self.preview = None;
        self.layout = None;
        self.model = None;
        self.saving.set(false);
        self.region.borrow_mut().remove(doc)
    }
}

pub struct FormView<K: ResourceType> {
    core: ViewCore,
    ctx: Rc<AppContext>,
    model: SharedModel,
    _kind: PhantomData<K>,
}

impl<K: ResourceType> FormView<K> {
    fn new(ctx: Rc<AppContext>, core: ViewCore, model: SharedModel) -> Self {
        Self {
            core: core
                .tag_name("form")
                .class_name("resource-form")
                .template("resource_form")
                .on("change input", "changed")
                .on("input input", "changed")
                .on("change select", "changed")
                .on("click button[name=save]", "save")
                .on("click button[name=cancel]", "cancel"),
            ctx,
            model,
            _kind: PhantomData,
        }
    }

    fn data(&self) -> Value {
        let meta = self.ctx.meta(K::KIND);
        let model = self.model.borrow();
        let fields: Vec<Value> = K::FIELDS
            .iter()
            .map(|field| {
                let value = display_value(model.get(field.name));
                let options: Vec<Value> = match (field.input, &meta) {
                    (InputKind::Select, Some(meta)) => meta
                        .choices(field.name)
                        .into_iter()
                        .map(|(option, label)| {
                            json!({"value": option, "label": label, "selected": option == value})
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                json!({
                    "name": field.name,
                    "label": field.label,
                    "input": field.input.as_str(),
                    "value": value,
                    "plain": !matches!(field.input, InputKind::Checkbox | InputKind::Select),
                    "checkbox": field.input == InputKind::Checkbox,
                    "checked": model.get(field.name) == Some(&Value::Bool(true)),
                    "select": field.input == InputKind::Select,
                    "options": options,
                })
            })
            .collect();
        json!({"fields": fields, "singular": K::KIND.singular()})
    }

    fn clear_errors(&self, doc: &mut Document) -> view_core::Result<()> {
        match self.core.element() {
            Some(element) => clear_field_errors(doc, element, FORM_ERRORS),
            None => Ok(()),
        }
    }

    fn show_errors(&self, doc: &mut Document, errors: &ValidationErrors) -> view_core::Result<()> {
        match self.core.element() {
            Some(element) => render_field_errors(doc, element, errors, FORM_ERRORS).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Copies one control into the model. Rejected input is shown next to
    /// the control and leaves the model unchanged.
    fn field_changed(&mut self, doc: &mut Document, control: NodeId) -> view_core::Result<()> {
        let Some(name) = doc.attr(control, "name").map(str::to_string) else {
            return Ok(());
        };
        let value = if doc.attr(control, "type") == Some("checkbox") {
            Value::Bool(doc.attr(control, "checked").is_some())
        } else {
            Value::String(doc.value(control).unwrap_or_default().to_string())
        };
        let assigned = self.model.borrow_mut().set_field(&name, value);
        match assigned {
            Ok(()) => {
                self.clear_errors(doc)?;
                self.publish("changed");
                Ok(())
            }
            Err(ViewError::Data(message)) => {
                debug!(field = %name, "rejected form input: {message}");
                self.show_errors(doc, &ValidationErrors::single(name, message))
            }
            Err(err) => Err(err),
        }
    }

    fn publish(&self, event: &str) {
        self.ctx
            .bus()
            .publish(BusEvent::new(&event_name::<K>(event)).from_source(self.core.id()));
    }
}

impl<K: ResourceType> EventTarget for FormView<K> {
    fn handle_event(&mut self, doc: &mut Document, action: &str, event: &mut DomEvent) -> view_core::Result<()> {
        match action {
            "changed" => self.field_changed(doc, event.target),
            "save" | "cancel" => {
                event.prevent_default();
                self.publish(action);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl<K: ResourceType> View for FormView<K> {
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

pub struct PreviewView<K: ResourceType> {
    core: ViewCore,
    ctx: Rc<AppContext>,
    model: SharedModel,
    _kind: PhantomData<K>,
}

impl<K: ResourceType> PreviewView<K> {
    fn new(ctx: Rc<AppContext>, core: ViewCore, model: SharedModel) -> Self {
        Self {
            core: core.class_name("resource-preview").template("resource_preview"),
            ctx,
            model,
            _kind: PhantomData,
        }
    }
}

impl<K: ResourceType> EventTarget for PreviewView<K> {}

impl<K: ResourceType> View for PreviewView<K> {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn render(&mut self, doc: &mut Document) -> view_core::Result<NodeId> {
        let data = {
            let model = self.model.borrow();
            json!({
                "title": record_title(&model, K::TITLE_FIELD),
                "rows": detail_rows(&self.ctx, K::KIND, K::FIELDS, &model),
            })
        };
        self.core.render_template(doc, &data)
    }
}
