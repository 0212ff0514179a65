use std::{cell::RefCell, rc::Rc};

use serde_json::{json, Value};

use super::*;

type Log = Rc<RefCell<Vec<String>>>;

const TEMPLATES: &str = r#"
<script class="template" id="probe"><![CDATA[<p class="probe">{{name}}</p><button name="ping">Ping</button>]]></script>
<script class="template" id="two-pane"><![CDATA[<section class="left"/><section class="right"/>]]></script>
<script class="template" id="confirm"><![CDATA[
  <div class="modal-overlay" data-micromodal-close="true">
    <div class="modal-container">
      <p class="question">{{message}}</p>
      <button name="cancel">Cancel</button>
      <button name="success">OK</button>
    </div>
  </div>]]></script>
<script class="template" id="login"><![CDATA[
  <form class="login">
    <div class="all-error" hidden="hidden"/>
    <input name="username"/>
    <input name="password" type="password"/>
    <button name="success">Log in</button>
  </form>]]></script>
"#;

fn templates() -> Rc<TemplateRegistry> {
    Rc::new(TemplateRegistry::from_markup(TEMPLATES).expect("templates"))
}

fn page() -> (Document, NodeId) {
    let doc = Document::from_markup(r#"<div id="main"/>"#).expect("page");
    let main = doc.find(doc.body(), "#main").expect("sel").expect("main");
    (doc, main)
}

fn click(doc: &mut Document, selector: &str) -> usize {
    let target = doc
        .find(doc.body(), selector)
        .expect("selector")
        .unwrap_or_else(|| panic!("nothing matches {selector}"));
    dispatch(doc, &mut DomEvent::click(target)).expect("dispatch")
}

fn press(doc: &mut Document, selector: &str, key: Key) {
    let target = doc.find(doc.body(), selector).expect("selector").expect("target");
    dispatch(doc, &mut DomEvent::keydown(target, key)).expect("dispatch");
}

struct Probe {
    core: ViewCore,
    name: String,
    log: Log,
    bus: Option<EventBus>,
}

impl Probe {
    fn new(templates: &Rc<TemplateRegistry>, name: &str, log: &Log) -> Self {
        Self {
            core: ViewCore::new(templates.clone())
                .template("probe")
                .on("click button[name=ping]", "ping"),
            name: name.to_string(),
            log: log.clone(),
            bus: None,
        }
    }

    fn listening_on(mut self, bus: &EventBus) -> Self {
        self.bus = Some(bus.clone());
        self
    }
}

impl EventTarget for Probe {
    fn handle_event(&mut self, _doc: &mut Document, action: &str, _event: &mut DomEvent) -> Result<()> {
        self.log.borrow_mut().push(format!("{} {action}", self.name));
        Ok(())
    }
}

impl View for Probe {
    fn core(&self) -> &ViewCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ViewCore {
        &mut self.core
    }

    fn render(&mut self, doc: &mut Document) -> Result<NodeId> {
        self.log.borrow_mut().push(format!("render {}", self.name));
        self.core.render_template(doc, &json!({ "name": self.name }))
    }

    fn on_shown(&mut self, _doc: &mut Document) -> Result<()> {
        if let Some(bus) = &self.bus {
            let log = self.log.clone();
            let name = self.name.clone();
            self.core.listen(bus.subscribe("refresh", move |_, _| {
                log.borrow_mut().push(format!("{name} refreshed"));
                Ok(())
            }));
        }
        Ok(())
    }

    fn remove(&mut self, doc: &mut Document) -> Result<()> {
        self.log.borrow_mut().push(format!("remove {}", self.name));
        self.core.teardown(doc);
        Ok(())
    }
}

#[test]
fn region_removes_previous_view_before_rendering_the_next() {
    let (mut doc, main) = page();
    let templates = templates();
    let log: Log = Rc::default();
    let mut region = Region::new("main", main);

    region.show(&mut doc, Probe::new(&templates, "v1", &log)).expect("show v1");
    region.show(&mut doc, Probe::new(&templates, "v2", &log)).expect("show v2");

    assert_eq!(
        *log.borrow(),
        vec!["render v1", "remove v1", "render v2"]
    );
    assert_eq!(doc.children(main).len(), 1);
    assert_eq!(doc.find_all(main, "p.probe").expect("sel").len(), 1);

    click(&mut doc, "button[name=ping]");
    assert_eq!(log.borrow().last().map(String::as_str), Some("v2 ping"));
}

#[test]
fn show_then_remove_leaves_nothing_live() {
    let (mut doc, main) = page();
    let templates = templates();
    let bus = EventBus::new();
    let log: Log = Rc::default();
    let mut region = Region::new("main", main);

    let view = region
        .show(&mut doc, Probe::new(&templates, "list", &log).listening_on(&bus))
        .expect("show");
    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(doc.delegation_count(), 1);

    region.remove(&mut doc).expect("remove");

    assert!(!region.has_view());
    assert!(doc.children(main).is_empty());
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(doc.delegation_count(), 0);
    assert!(view.borrow().core().is_removed());

    bus.trigger("refresh");
    assert_eq!(bus.dispatch_pending(&mut doc).expect("dispatch"), 0);
}

#[test]
fn close_view_tolerates_none_and_default_removal() {
    let (mut doc, main) = page();
    let templates = templates();
    Region::close_view(&mut doc, None).expect("none");

    let mut region = Region::new("main", main);
    region
        .show(
            &mut doc,
            StaticView::new(ViewCore::new(templates.clone()).template("probe"), json!({"name": "x"})),
        )
        .expect("show");
    let current = region.current();
    Region::close_view(&mut doc, current.as_ref()).expect("close");
    assert!(doc.children(main).is_empty());
}

#[test]
fn region_render_errors_propagate_and_the_region_stays_usable() {
    let (mut doc, main) = page();
    let templates = templates();
    let log: Log = Rc::default();
    let mut region = Region::new("main", main);

    let broken = StaticView::new(ViewCore::new(templates.clone()).template("nope"), Value::Null);
    assert!(matches!(
        region.show(&mut doc, broken),
        Err(ViewError::UnknownTemplate(_))
    ));
    assert!(!region.has_view());

    region.show(&mut doc, Probe::new(&templates, "ok", &log)).expect("show");
    assert!(region.has_view());
}

#[test]
fn scoped_region_without_mount_reports_missing_element() {
    let (mut doc, main) = page();
    let templates = templates();
    let log: Log = Rc::default();
    let mut region = Region::scoped("sidebar", main, ".sidebar");
    assert!(matches!(
        region.show(&mut doc, Probe::new(&templates, "x", &log)),
        Err(ViewError::MissingElement(selector)) if selector == ".sidebar"
    ));
}

struct FeatureApp {
    region: Region,
    listeners: Listeners,
}

impl Controller for FeatureApp {
    fn destroy(&mut self, doc: &mut Document) -> Result<()> {
        self.listeners.stop_listening();
        self.region.remove(doc)
    }
}

#[test]
fn destroying_a_sub_application_cascades_through_layout_regions() {
    let (mut doc, main) = page();
    let templates = templates();
    let bus = EventBus::new();
    let log: Log = Rc::default();

    let mut app = FeatureApp {
        region: Region::new("main", main),
        listeners: Listeners::new(),
    };
    app.listeners.listen(bus.subscribe("projects:changed", |_, _| Ok(())));

    let layout = app
        .region
        .show(
            &mut doc,
            Layout::new(ViewCore::new(templates.clone()).template("two-pane"))
                .region_def("left", ".left")
                .region_def("right", ".right"),
        )
        .expect("layout");
    {
        let mut layout = layout.borrow_mut();
        layout
            .region("left")
            .expect("left")
            .show(&mut doc, Probe::new(&templates, "actions", &log).listening_on(&bus))
            .expect("left view");
        layout
            .region("right")
            .expect("right")
            .show(&mut doc, Probe::new(&templates, "table", &log))
            .expect("right view");
        assert!(layout.region("footer").is_err());
    }
    assert_eq!(bus.subscriber_count(), 2);
    assert_eq!(doc.delegation_count(), 2);

    app.destroy(&mut doc).expect("destroy");

    let log = log.borrow();
    assert!(log.contains(&"remove actions".to_string()));
    assert!(log.contains(&"remove table".to_string()));
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(doc.delegation_count(), 0);
    assert!(doc.children(main).is_empty());
}

#[test]
fn layout_rerender_closes_its_regions_first() {
    let (mut doc, main) = page();
    let templates = templates();
    let log: Log = Rc::default();
    let mut region = Region::new("main", main);
    let layout = region
        .show(
            &mut doc,
            Layout::new(ViewCore::new(templates.clone()).template("two-pane")).region_def("left", ".left"),
        )
        .expect("layout");
    layout
        .borrow_mut()
        .region("left")
        .expect("left")
        .show(&mut doc, Probe::new(&templates, "child", &log))
        .expect("child");

    region.show_rc(&mut doc, &layout).expect("re-show");
    assert_eq!(log.borrow().last().map(String::as_str), Some("remove child"));
    assert!(!layout.borrow_mut().region("left").expect("left").has_view());
}

#[derive(Default)]
struct ConfirmDialog {
    message: String,
    confirmed: Rc<RefCell<u32>>,
    cancelled: Rc<RefCell<u32>>,
}

impl Dialog for ConfirmDialog {
    fn tag(&self) -> &str {
        "confirm-modal"
    }

    fn template_id(&self) -> &str {
        "confirm"
    }

    fn data(&self) -> Value {
        json!({ "message": self.message })
    }

    fn on_success(&mut self, _scope: &mut DialogScope<'_, Self>) -> Result<()> {
        *self.confirmed.borrow_mut() += 1;
        Ok(())
    }

    fn on_cancel(&mut self, _scope: &mut DialogScope<'_, Self>) -> Result<()> {
        *self.cancelled.borrow_mut() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct LoginDialog {
    authenticated: Rc<RefCell<Option<String>>>,
}

impl Dialog for LoginDialog {
    fn tag(&self) -> &str {
        "login-modal"
    }

    fn template_id(&self) -> &str {
        "login"
    }

    fn on_success(&mut self, scope: &mut DialogScope<'_, Self>) -> Result<()> {
        let username = scope.value_of("input[name=username]")?;
        *self.authenticated.borrow_mut() = Some(username);
        Ok(())
    }
}

fn confirm(templates: &Rc<TemplateRegistry>, options: ModalOptions) -> ModalRef<ConfirmDialog> {
    ModalController::new(
        ConfirmDialog {
            message: "Delete project?".into(),
            ..ConfirmDialog::default()
        },
        templates.clone(),
        options,
    )
}

#[test]
fn show_before_construct_fails_loudly_and_recovers() {
    let mut doc = Document::new();
    let modal = confirm(&templates(), ModalOptions::default());
    let mut modal = modal.borrow_mut();

    assert!(modal.show(&mut doc).expect_err("closed").is_lifecycle());
    assert!(modal.success(&mut doc, None).expect_err("closed").is_lifecycle());
    assert!(modal.cancel(&mut doc, None).expect_err("closed").is_lifecycle());
    assert_eq!(modal.state(), ModalState::Closed);

    modal.construct(&mut doc).expect("construct");
    assert_eq!(modal.state(), ModalState::Rendered);
    assert!(modal.success(&mut doc, None).expect_err("not visible").is_lifecycle());
    modal.show(&mut doc).expect("show");
    assert_eq!(modal.state(), ModalState::Visible);
}

#[test]
fn close_is_idempotent_and_keeps_the_element_for_reuse() {
    let mut doc = Document::new();
    let templates = templates();
    let modal = confirm(&templates, ModalOptions::default());
    let mut modal = modal.borrow_mut();

    modal.open(&mut doc).expect("open");
    let element = modal.element().expect("element");
    assert_eq!(doc.parent(element), Some(doc.overlay()));

    modal.close(&mut doc).expect("close");
    let after_one = (modal.state(), doc.children(doc.overlay()).len(), doc.delegation_count());
    modal.close(&mut doc).expect("close again");
    let after_two = (modal.state(), doc.children(doc.overlay()).len(), doc.delegation_count());
    assert_eq!(after_one, (ModalState::Closed, 0, 0));
    assert_eq!(after_one, after_two);

    let nodes = doc.node_count();
    modal.open(&mut doc).expect("reopen");
    assert_eq!(modal.element(), Some(element));
    assert_eq!(doc.node_count(), nodes);
}

#[test]
fn escape_respects_the_keyboard_option() {
    let templates = templates();

    let mut doc = Document::new();
    let modal = confirm(&templates, ModalOptions::default());
    modal.borrow_mut().open(&mut doc).expect("open");
    press(&mut doc, "#confirm-modal p.question", Key::Escape);
    assert_eq!(modal.borrow().state(), ModalState::Closed);
    assert_eq!(*modal.borrow().dialog().cancelled.borrow(), 0);

    let mut doc = Document::new();
    let locked = confirm(&templates, ModalOptions::default().keyboard_disabled());
    locked.borrow_mut().open(&mut doc).expect("open");
    press(&mut doc, "#confirm-modal p.question", Key::Escape);
    assert_eq!(locked.borrow().state(), ModalState::Visible);
}

#[test]
fn enter_confirms_the_dialog() {
    let mut doc = Document::new();
    let modal = confirm(&templates(), ModalOptions::default().keyboard_disabled());
    modal.borrow_mut().open(&mut doc).expect("open");
    press(&mut doc, "#confirm-modal p.question", Key::Enter);
    assert_eq!(*modal.borrow().dialog().confirmed.borrow(), 1);
    assert_eq!(modal.borrow().state(), ModalState::Closed);
}

#[test]
fn cancel_click_does_not_reach_outer_handlers() {
    let mut doc = Document::new();
    let templates = templates();
    let log: Log = Rc::default();

    let outer = Rc::new(RefCell::new(Probe::new(&templates, "page", &log)));
    let owner = outer.borrow().core().id();
    let body = doc.body();
    events::delegate_to(
        &mut doc,
        owner,
        body,
        vec![EventBinding::parse("click #modal-root", "backdrop").expect("binding")],
        &outer,
    );

    let modal = confirm(&templates, ModalOptions::default());
    modal.borrow_mut().open(&mut doc).expect("open");
    assert_eq!(click(&mut doc, "#confirm-modal button[name=cancel]"), 1);

    assert_eq!(*modal.borrow().dialog().cancelled.borrow(), 1);
    assert_eq!(modal.borrow().state(), ModalState::Closed);
    assert!(log.borrow().is_empty());
}

#[test]
fn login_success_closes_the_dialog_and_leaves_no_node() {
    let mut doc = Document::new();
    let dialog = LoginDialog::default();
    let authenticated = dialog.authenticated.clone();
    let modal = ModalController::new(dialog, templates(), ModalOptions::default().keyboard_disabled());
    modal.borrow_mut().open(&mut doc).expect("open");

    let username = doc
        .find(doc.body(), "#login-modal input[name=username]")
        .expect("sel")
        .expect("input");
    doc.set_value(username, "alice");
    click(&mut doc, "#login-modal button[name=success]");

    assert_eq!(authenticated.borrow().as_deref(), Some("alice"));
    assert_eq!(modal.borrow().state(), ModalState::Closed);
    assert!(doc.children(doc.overlay()).is_empty());
    assert!(doc.find(doc.body(), "#login-modal").expect("sel").is_none());
}

#[test]
fn delete_confirmation_cancel_then_confirm_deletes_once() {
    let mut doc = Document::new();
    let templates = templates();
    let projects = Rc::new(RefCell::new(vec!["alpha".to_string(), "beta".to_string()]));
    let deletes = Rc::new(RefCell::new(0u32));

    struct DeleteProject {
        projects: Rc<RefCell<Vec<String>>>,
        deletes: Rc<RefCell<u32>>,
    }

    impl Dialog for DeleteProject {
        fn tag(&self) -> &str {
            "delete-project"
        }

        fn template_id(&self) -> &str {
            "confirm"
        }

        fn data(&self) -> Value {
            json!({"message": "Delete alpha?"})
        }

        fn on_success(&mut self, _scope: &mut DialogScope<'_, Self>) -> Result<()> {
            *self.deletes.borrow_mut() += 1;
            self.projects.borrow_mut().retain(|name| name != "alpha");
            Ok(())
        }
    }

    let modal = ModalController::new(
        DeleteProject {
            projects: projects.clone(),
            deletes: deletes.clone(),
        },
        templates,
        ModalOptions::default(),
    );

    modal.borrow_mut().open(&mut doc).expect("open");
    click(&mut doc, "#delete-project button[name=cancel]");
    assert_eq!(projects.borrow().len(), 2);
    assert_eq!(*deletes.borrow(), 0);
    assert_eq!(modal.borrow().state(), ModalState::Closed);

    modal.borrow_mut().open(&mut doc).expect("reopen");
    click(&mut doc, "#delete-project button[name=success]");
    assert_eq!(*deletes.borrow(), 1);
    assert_eq!(*projects.borrow(), vec!["beta".to_string()]);
    assert_eq!(modal.borrow().state(), ModalState::Closed);
}

#[test]
fn close_on_completion_waits_for_the_owner() {
    let mut doc = Document::new();
    let modal = confirm(&templates(), ModalOptions::default().close_on_completion());
    modal.borrow_mut().open(&mut doc).expect("open");
    let handle = modal.borrow().handle();

    click(&mut doc, "#confirm-modal button[name=success]");
    assert_eq!(*modal.borrow().dialog().confirmed.borrow(), 1);
    assert_eq!(handle.state(), Some(ModalState::Visible));

    handle.close(&mut doc).expect("close");
    assert_eq!(handle.state(), Some(ModalState::Closed));
    drop(modal);
    assert_eq!(handle.state(), None);
    handle.close(&mut doc).expect("dropped dialogs close quietly");
}

#[test]
fn controller_slot_reuses_same_type_and_replaces_others() {
    let mut doc = Document::new();
    let templates = templates();
    let mut slot = ControllerSlot::new("modal");
    let built = Rc::new(RefCell::new(0));

    let make_confirm = |built: &Rc<RefCell<i32>>| -> Result<ModalRef<ConfirmDialog>> {
        *built.borrow_mut() += 1;
        Ok(confirm(&templates, ModalOptions::default()))
    };

    let first = slot
        .start(&mut doc, || make_confirm(&built))
        .expect("first");
    first.borrow_mut().open(&mut doc).expect("open");
    let first_element = first.borrow().element().expect("element");

    let second = slot
        .start(&mut doc, || make_confirm(&built))
        .expect("second");
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(*built.borrow(), 1);
    assert!(slot.is_active::<ModalController<ConfirmDialog>>());

    let login = slot
        .start(&mut doc, || {
            Ok(ModalController::new(
                LoginDialog::default(),
                templates.clone(),
                ModalOptions::default(),
            ))
        })
        .expect("login");
    assert!(slot.is_active::<ModalController<LoginDialog>>());
    assert!(!doc.contains(first_element));
    assert!(first.borrow_mut().construct(&mut doc).expect_err("destroyed").is_lifecycle());

    login.borrow_mut().open(&mut doc).expect("open login");
    slot.destroy(&mut doc).expect("destroy");
    assert!(slot.is_empty());
    assert!(doc.children(doc.overlay()).is_empty());
}

#[test]
fn bus_subscriptions_follow_view_lifetimes_across_navigation() {
    let (mut doc, main) = page();
    let templates = templates();
    let bus = EventBus::new();
    let log: Log = Rc::default();
    let mut region = Region::new("main", main);

    for round in 0..5 {
        region
            .show(
                &mut doc,
                Probe::new(&templates, &format!("v{round}"), &log).listening_on(&bus),
            )
            .expect("show");
        assert_eq!(bus.subscriber_count(), 1);
    }
    bus.trigger("refresh");
    bus.dispatch_pending(&mut doc).expect("dispatch");
    assert_eq!(log.borrow().last().map(String::as_str), Some("v4 refreshed"));
}
