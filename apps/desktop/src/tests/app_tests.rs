use std::time::{Duration, Instant};

use client_core::ClientError;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde_json::{json, Value};
use shared::{
    domain::ResourceKind,
    error::{ValidationErrors, NON_FIELD_ERRORS},
    protocol::{LoginResponse, LogoutResponse, ResourceMeta, RootApi},
};
use view_core::{Document, DomEvent, Key, NodeId};

use super::DEFAULT_PAGE;
use crate::app::{build_router, InventoryApp, ResourceAction, Route};
use crate::backend_bridge::commands::{ApiRequest, BackendCommand};
use crate::controller::events::{ApiReply, Outcome, UiError, UiErrorContext, UiEvent};
use crate::notify::{expire_alert, ALERT_LINGER};

const API: &str = "http://api.test/api/";
const PROJECTS: &str = "http://api.test/api/projects/";
const INVOICES: &str = "http://api.test/api/invoices/";

/// The app wired to channels the test answers by hand.
struct Harness {
    app: InventoryApp,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
}

fn root() -> RootApi {
    RootApi::from_value(&json!({
        "collection": {
            "version": "1.0",
            "href": API,
            "items": {
                "projects": {"projects": PROJECTS},
                "accounts": {"users": "http://api.test/api/accounts/users/"},
                "invoices": {
                    "invoices": INVOICES,
                    "items": "http://api.test/api/invoices/items/",
                },
            },
        }
    }))
    .expect("root document")
}

fn project_meta() -> ResourceMeta {
    ResourceMeta::from_value(&json!({
        "name": "Project List",
        "actions": {"POST": {
            "name": {"type": "string", "required": true, "label": "Name"},
            "inventory_type": {"type": "choice", "label": "Inventory Type", "choices": [
                {"value": "0", "display_name": "Other"},
                {"value": "1", "display_name": "Stock"},
            ]},
        }}
    }))
}

fn projects() -> Vec<Value> {
    vec![
        json!({"public_id": "p1", "name": "Warehouse", "inventory_type": "1",
               "public": true, "active": true, "href": "http://api.test/api/projects/p1/"}),
        json!({"public_id": "p2", "name": "Garage", "inventory_type": "0",
               "public": false, "active": true, "href": "http://api.test/api/projects/p2/"}),
    ]
}

fn validation(context: UiErrorContext, field: &str, message: &str) -> UiError {
    UiError::from_client_error(
        context,
        &ClientError::Validation(ValidationErrors::single(field, message)),
    )
}

impl Harness {
    fn new() -> Self {
        let (cmd_tx, cmd_rx) = bounded(64);
        let (ui_tx, ui_rx) = bounded(64);
        let app = InventoryApp::new(DEFAULT_PAGE, cmd_tx, ui_rx).expect("page builds");
        Self { app, cmd_rx, ui_tx }
    }

    fn doc(&self) -> &Document {
        self.app.doc()
    }

    fn find(&self, selector: &str) -> Option<NodeId> {
        self.doc().find(self.doc().body(), selector).expect("selector")
    }

    fn require(&self, selector: &str) -> NodeId {
        self.find(selector)
            .unwrap_or_else(|| panic!("nothing matches `{selector}`"))
    }

    fn count(&self, selector: &str) -> usize {
        self.doc()
            .find_all(self.doc().body(), selector)
            .expect("selector")
            .len()
    }

    fn text(&self, selector: &str) -> String {
        self.doc().text_content(self.require(selector))
    }

    fn open_dialog(&self) -> Option<String> {
        let doc = self.doc();
        doc.children(doc.overlay())
            .iter()
            .rev()
            .find(|node| !doc.is_hidden(**node))
            .and_then(|node| doc.attr(*node, "id"))
            .map(str::to_string)
    }

    fn click(&mut self, selector: &str) {
        let target = self.require(selector);
        self.app.dispatch(&mut DomEvent::click(target));
    }

    fn type_in(&mut self, selector: &str, text: &str) {
        let target = self.require(selector);
        self.app.doc_mut().set_value(target, text);
        self.app.dispatch(&mut DomEvent::change(target));
    }

    fn next_command(&self) -> BackendCommand {
        self.cmd_rx.try_recv().expect("a backend command was queued")
    }

    fn assert_idle_backend(&self) {
        assert!(self.cmd_rx.try_recv().is_err(), "no command expected");
    }

    fn complete(&mut self, command: &BackendCommand, outcome: Outcome) {
        self.ui_tx
            .send(UiEvent::Completed {
                ticket: command.ticket,
                outcome,
            })
            .expect("ui channel open");
        self.app.pump();
    }

    /// Answers the next queued command and returns what it asked for.
    fn answer(&mut self, reply: ApiReply) -> ApiRequest {
        let command = self.next_command();
        self.complete(&command, Ok(reply));
        command.request
    }

    fn fail(&mut self, error: UiError) -> ApiRequest {
        let command = self.next_command();
        self.complete(&command, Err(error));
        command.request
    }

    fn submit_login(&mut self) {
        self.type_in("#login-modal input[name=username]", "jane");
        self.type_in("#login-modal input[name=password]", "secret");
        self.click("#login-modal button[name=login-success]");
    }

    /// Logs in from the login page and answers the bootstrap requests.
    fn login(&mut self) {
        self.app.start("");
        self.submit_login();
        let request = self.answer(ApiReply::Login(LoginResponse {
            fullname: "Jane Doe".into(),
            href: "/api/accounts/users/7/".into(),
        }));
        assert_eq!(
            request,
            ApiRequest::Login {
                username: "jane".into(),
                password: "secret".into(),
            }
        );
        assert_eq!(self.answer(ApiReply::Root(root())), ApiRequest::FetchRoot);
        let request = self.answer(ApiReply::Record(json!({"username": "jane"})));
        assert_eq!(
            request,
            ApiRequest::Get {
                url: "http://api.test/api/accounts/users/7/".into(),
            }
        );
    }

    /// After login the default route loads project metadata, then records.
    fn show_projects(&mut self) {
        assert_eq!(
            self.answer(ApiReply::Meta(project_meta())),
            ApiRequest::FetchMeta { url: PROJECTS.into() }
        );
        assert_eq!(
            self.answer(ApiReply::Records(projects())),
            ApiRequest::List { url: PROJECTS.into() }
        );
    }
}

#[test]
fn login_bootstraps_session_and_lands_on_projects() {
    let mut h = Harness::new();
    h.app.start("");
    assert_eq!(h.open_dialog().as_deref(), Some("login-modal"));

    h.login();
    assert_eq!(h.open_dialog(), None);
    assert_eq!(h.text("#user-fullname"), "Jane Doe");
    assert!(h.app.context().is_authenticated());

    h.show_projects();
    assert_eq!(h.count("#main-region tr.record"), 2);
    assert_eq!(h.text("#main-region tr.record .cell-name"), "Warehouse");
    assert_eq!(
        h.text("#main-region tr.record .cell-inventory_type"),
        "Stock"
    );
    assert_eq!(h.app.router().current(), Some("projects"));
}

#[test]
fn protected_routes_redirect_through_login() {
    let mut h = Harness::new();
    h.app.start("invoices");
    assert_eq!(h.open_dialog().as_deref(), Some("login-modal"));

    h.submit_login();
    h.answer(ApiReply::Login(LoginResponse {
        fullname: "Jane Doe".into(),
        href: String::new(),
    }));
    h.answer(ApiReply::Root(root()));
    assert_eq!(
        h.next_command().request,
        ApiRequest::FetchMeta { url: INVOICES.into() }
    );
}

#[test]
fn rejected_credentials_stay_in_the_dialog() {
    let mut h = Harness::new();
    h.app.start("login");
    h.submit_login();
    h.fail(validation(
        UiErrorContext::Login,
        NON_FIELD_ERRORS,
        "Unable to log in with provided credentials.",
    ));

    assert_eq!(h.open_dialog().as_deref(), Some("login-modal"));
    let errors = h.require("#login-modal .all-error");
    assert!(!h.doc().is_hidden(errors));
    assert!(h
        .doc()
        .text_content(errors)
        .contains("Unable to log in with provided credentials."));
    assert!(!h.app.context().is_authenticated());
}

#[test]
fn escape_does_not_dismiss_login() {
    let mut h = Harness::new();
    h.app.start("");
    let dialog = h.require("#login-modal");
    h.app.dispatch(&mut DomEvent::keydown(dialog, Key::Escape));
    assert_eq!(h.open_dialog().as_deref(), Some("login-modal"));
    h.assert_idle_backend();
}

#[test]
fn deleting_asks_first_and_sends_one_request() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();

    h.click("#main-region tr.record button.delete");
    assert_eq!(h.open_dialog().as_deref(), Some("notify-modal"));
    assert!(h.text("#notify-modal").contains("The project will be deleted"));
    h.click("#notify-modal button[name=cancel]");
    assert_eq!(h.open_dialog(), None);
    h.assert_idle_backend();

    h.click("#main-region tr.record button.delete");
    h.click("#notify-modal button[name=success]");
    let request = h.answer(ApiReply::Deleted);
    assert_eq!(
        request,
        ApiRequest::Delete {
            url: "http://api.test/api/projects/p1/".into(),
        }
    );
    h.assert_idle_backend();
    assert_eq!(h.count("#main-region tr.record"), 1);
    assert_eq!(h.open_dialog().as_deref(), Some("alert-modal"));
    assert!(h.text("#alert-modal").contains("Project was deleted"));

    let ctx = h.app.context().clone();
    let later = Instant::now() + ALERT_LINGER + Duration::from_secs(1);
    assert!(expire_alert(&ctx, h.app.doc_mut(), later).expect("expire"));
    assert_eq!(h.open_dialog(), None);
}

#[test]
fn editor_shows_server_validation_then_saves() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();

    h.click("#main-region button[name=create]");
    assert_eq!(h.app.router().current(), Some("projects/create"));
    assert_eq!(h.count("#form-container select[name=inventory_type] option"), 3);

    h.type_in("#form-container input[name=name]", "Workshop");
    assert_eq!(h.text("#preview-container .value-name"), "Workshop");

    h.click("#form-container button[name=save]");
    let request = h.fail(validation(UiErrorContext::Save, "name", "This name is taken."));
    match request {
        ApiRequest::Create { url, body } => {
            assert_eq!(url, PROJECTS);
            assert_eq!(body["name"], json!("Workshop"));
        }
        other => panic!("expected a create, got {other:?}"),
    }
    assert!(h.text("#form-container ul.errorlist").contains("This name is taken."));

    h.type_in("#form-container input[name=name]", "Workshop 2");
    assert_eq!(h.count("#form-container ul.errorlist"), 0);
    h.click("#form-container button[name=save]");
    h.answer(ApiReply::Record(json!({"public_id": "p3", "name": "Workshop 2"})));
    assert!(h.text("#alert-modal").contains("Project saved"));
    assert_eq!(
        h.next_command().request,
        ApiRequest::List { url: PROJECTS.into() }
    );
}

#[test]
fn saving_twice_sends_one_write_until_it_answers() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();
    h.click("#main-region button[name=create]");
    h.type_in("#form-container input[name=name]", "Workshop");

    h.click("#form-container button[name=save]");
    h.click("#form-container button[name=save]");
    let command = h.next_command();
    assert!(matches!(command.request, ApiRequest::Create { .. }));
    h.assert_idle_backend();

    h.complete(
        &command,
        Err(validation(UiErrorContext::Save, "name", "This name is taken.")),
    );
    h.click("#form-container button[name=save]");
    assert!(matches!(h.next_command().request, ApiRequest::Create { .. }));
    h.assert_idle_backend();
}

#[test]
fn login_is_sent_once_while_waiting_for_the_reply() {
    let mut h = Harness::new();
    h.app.start("");
    h.type_in("#login-modal input[name=username]", "jane");
    h.type_in("#login-modal input[name=password]", "secret");
    let password = h.require("#login-modal input[name=password]");
    h.app.dispatch(&mut DomEvent::keydown(password, Key::Enter));
    h.app.dispatch(&mut DomEvent::keydown(password, Key::Enter));

    let command = h.next_command();
    assert!(matches!(command.request, ApiRequest::Login { .. }));
    h.assert_idle_backend();

    h.complete(
        &command,
        Err(validation(UiErrorContext::Login, NON_FIELD_ERRORS, "Unable to log in.")),
    );
    h.click("#login-modal button[name=login-success]");
    assert!(matches!(h.next_command().request, ApiRequest::Login { .. }));
}

#[test]
fn bad_numbers_are_rejected_inline() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();
    h.app.start("invoices/create");
    h.answer(ApiReply::Meta(ResourceMeta::default()));

    h.type_in("#form-container input[name=credit]", "lots");
    assert!(h
        .text("#form-container ul.errorlist")
        .contains("`credit` expects a number"));
    assert_eq!(h.text("#preview-container .value-credit"), "");

    h.type_in("#form-container input[name=credit]", "12.5");
    assert_eq!(h.text("#preview-container .value-credit"), "12.5");
    h.assert_idle_backend();
}

#[test]
fn cancelling_the_editor_confirms_before_leaving() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();
    h.app.start("projects/edit/p2");
    assert_eq!(
        h.answer(ApiReply::Record(projects()[1].clone())),
        ApiRequest::Get {
            url: "http://api.test/api/projects/p2/".into(),
        }
    );
    assert_eq!(h.text("#main-region .page-title"), "Edit project: Garage");

    h.click("#form-container button[name=cancel]");
    assert!(h.text("#notify-modal").contains("Changes will be lost"));
    h.click("#notify-modal button[name=success]");
    assert_eq!(h.app.router().current(), Some("projects"));
    assert_eq!(
        h.next_command().request,
        ApiRequest::List { url: PROJECTS.into() }
    );
}

#[test]
fn viewer_deletes_and_returns_to_the_list() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();
    h.click("#main-region tr.record button.view");
    assert_eq!(h.app.router().current(), Some("projects/p1"));
    h.answer(ApiReply::Record(projects()[0].clone()));
    assert_eq!(h.text("#main-region .page-title"), "Warehouse");
    assert_eq!(h.text("#main-region .value-public"), "Yes");

    h.click("#main-region button[name=delete]");
    h.click("#notify-modal button[name=success]");
    h.fail(UiError::from_message(UiErrorContext::Delete, "server exploded"));
    assert!(h.text("#alert-modal").contains("Something goes wrong"));
    assert_eq!(h.app.router().current(), Some("projects/p1"));
}

#[test]
fn search_replaces_the_listed_records() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();

    let input = h.require("#main-region input[name=search]");
    h.app.doc_mut().set_value(input, "gar");
    h.app.dispatch(&mut DomEvent::keydown(input, Key::Enter));
    let request = h.answer(ApiReply::Records(vec![projects()[1].clone()]));
    assert_eq!(
        request,
        ApiRequest::Search {
            url: PROJECTS.into(),
            term: "gar".into(),
        }
    );
    assert_eq!(h.count("#main-region tr.record"), 1);
    assert_eq!(h.text("#main-region tr.record .cell-name"), "Garage");
}

#[test]
fn replies_for_a_closed_page_are_dropped() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();

    h.app.start("projects");
    let stale = h.next_command();
    h.app.start("accounts");
    assert!(h.app.main_controller().is_some_and(|name| name.contains("Accounts")));

    h.complete(&stale, Ok(ApiReply::Records(projects())));
    assert_eq!(h.count("#main-region tr.record"), 0);
    assert_eq!(
        h.next_command().request,
        ApiRequest::FetchMeta {
            url: "http://api.test/api/accounts/users/".into(),
        }
    );
}

#[test]
fn wrong_shaped_replies_open_the_error_dialog() {
    let mut h = Harness::new();
    h.login();
    h.answer(ApiReply::Meta(project_meta()));
    h.answer(ApiReply::Deleted);

    assert_eq!(h.open_dialog().as_deref(), Some("notify-modal"));
    assert_eq!(h.text("#notify-modal .modal-title"), "Error");
    assert_eq!(
        h.text("#notify-modal .notify-message"),
        "Unexpected `deleted` reply to `list`."
    );
    assert!(h.find("#notify-modal button[name=cancel]").is_none());

    h.click("#notify-modal button[name=success]");
    assert_eq!(h.open_dialog(), None);
    assert!(h.app.context().is_authenticated());
}

#[test]
fn transport_failures_reach_the_message_board() {
    let mut h = Harness::new();
    h.login();
    h.answer(ApiReply::Meta(project_meta()));
    h.fail(UiError::from_message(UiErrorContext::Load, "request timed out after 15s"));

    let board = h.app.context().board().current(h.doc());
    assert_eq!(
        board.as_deref(),
        Some("Server unreachable; check the API URL/network and retry.")
    );
    assert!(h.app.context().is_authenticated());
}

#[test]
fn expired_sessions_go_back_to_login() {
    let mut h = Harness::new();
    h.login();
    h.answer(ApiReply::Meta(project_meta()));
    h.fail(UiError::from_message(UiErrorContext::Load, "401 Unauthorized"));

    assert!(!h.app.context().is_authenticated());
    assert_eq!(h.open_dialog().as_deref(), Some("login-modal"));
}

#[test]
fn logout_resets_the_application() {
    let mut h = Harness::new();
    h.login();
    h.show_projects();

    h.click("#logout-button");
    assert_eq!(h.open_dialog().as_deref(), Some("logout-modal"));
    h.click("#logout-modal button[name=logout-success]");
    let request = h.answer(ApiReply::Logout(LogoutResponse {
        detail: "Successfully logged out.".into(),
    }));
    assert_eq!(request, ApiRequest::Logout);

    assert!(!h.app.context().is_authenticated());
    assert!(!h.app.context().has_root());
    assert!(h.app.context().meta(ResourceKind::Projects).is_none());
    assert_eq!(h.app.main_controller(), None);
    assert_eq!(h.count("#main-region tr.record"), 0);
    assert_eq!(h.text("#user-fullname"), "");
    assert_eq!(
        h.app.context().board().current(h.doc()).as_deref(),
        Some("Successfully logged out.")
    );
    assert_eq!(h.open_dialog().as_deref(), Some("login-modal"));
}

#[test]
fn menu_marks_the_current_collection() {
    let mut h = Harness::new();
    h.app.start("");
    assert_eq!(h.count("nav.menu a.active"), 0);

    h.login();
    h.show_projects();
    assert_eq!(h.count("nav.menu a.active"), 1);
    assert_eq!(h.doc().attr(h.require("nav.menu a.active"), "href"), Some("#projects"));

    h.app.start("invoices/create");
    assert_eq!(h.count("nav.menu a.active"), 1);
    assert_eq!(h.doc().attr(h.require("nav.menu a.active"), "href"), Some("#invoices"));

    h.app.start("nowhere");
    assert_eq!(h.count("nav.menu a.active"), 0);

    h.app.start("items");
    h.click("#logout-button");
    assert_eq!(h.count("nav.menu a.active"), 1);
    h.click("#logout-modal button[name=logout-success]");
    while let Ok(command) = h.cmd_rx.try_recv() {
        if command.request == ApiRequest::Logout {
            h.complete(
                &command,
                Ok(ApiReply::Logout(LogoutResponse {
                    detail: "Successfully logged out.".into(),
                })),
            );
        }
    }
    assert_eq!(h.open_dialog().as_deref(), Some("login-modal"));
    assert_eq!(h.count("nav.menu a.active"), 0);
}

#[test]
fn router_table_covers_every_collection() {
    let router = build_router();
    let (route, params) = router.recognize("projects/edit/p1").expect("edit");
    assert_eq!(
        route,
        Route::Resource(ResourceKind::Projects, ResourceAction::Edit)
    );
    assert_eq!(params.get("id").map(String::as_str), Some("p1"));
    assert_eq!(
        router.recognize("items/create").map(|(route, _)| route),
        Some(Route::Resource(ResourceKind::Items, ResourceAction::Create))
    );
    assert_eq!(
        router.recognize("accounts/42").map(|(route, _)| route),
        Some(Route::Resource(ResourceKind::Accounts, ResourceAction::View))
    );
    assert_eq!(router.recognize("").map(|(route, _)| route), Some(Route::Login));
    assert_eq!(
        router.recognize("nowhere/at/all").map(|(route, _)| route),
        Some(Route::NotFound)
    );
}
