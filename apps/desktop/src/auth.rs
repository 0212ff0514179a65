//! Login, logout and session bootstrap.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use tracing::{debug, info, warn};
use view_core::{
    clear_field_errors, render_field_errors, Controller, ControllerSlot, Dialog, DialogScope,
    Document, MessageLevel, ModalController, ModalOptions, ViewId,
};

use crate::backend_bridge::commands::ApiRequest;
use crate::context::AppContext;
use crate::controller::events::ApiReply;

/// Route taken after a login that had no pending redirect.
pub const DEFAULT_ROUTE: &str = "projects";

const FORM_ERRORS: &str = ".all-error";

pub struct AuthApp {
    ctx: Rc<AppContext>,
    owner: ViewId,
    slot: ControllerSlot,
    pending_redirect: Option<String>,
    this: Weak<RefCell<AuthApp>>,
}

impl AuthApp {
    pub fn new(ctx: Rc<AppContext>) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|this| {
            RefCell::new(Self {
                ctx,
                owner: ViewId::next(),
                slot: ControllerSlot::new("auth"),
                pending_redirect: None,
                this: this.clone(),
            })
        })
    }

    /// Makes sure there is a session and a loaded API root, then routes to
    /// `redirect`.
    pub fn authenticate(&mut self, doc: &mut Document, redirect: Option<String>) -> view_core::Result<()> {
        if redirect.is_some() {
            self.pending_redirect = redirect;
        }
        if !self.ctx.is_authenticated() {
            return self.show_login(doc);
        }
        if !self.ctx.has_root() {
            return self.load_session(doc);
        }
        if let Some(target) = self.pending_redirect.take() {
            self.ctx.navigate(&target);
        }
        Ok(())
    }

    pub fn show_login(&mut self, doc: &mut Document) -> view_core::Result<()> {
        let ctx = self.ctx.clone();
        let dialog = LoginDialog {
            ctx: self.ctx.clone(),
            auth: self.this.clone(),
            owner: self.owner,
            in_flight: Rc::new(Cell::new(false)),
        };
        let login = self.slot.start::<ModalController<LoginDialog>, _>(doc, move || {
            Ok(ModalController::new(
                dialog,
                ctx.templates().clone(),
                ModalOptions::default()
                    .keyboard_disabled()
                    .close_on_completion(),
            ))
        })?;
        let mut login = login.borrow_mut();
        login.open(doc)
    }

    pub fn show_logout(&mut self, doc: &mut Document) -> view_core::Result<()> {
        let ctx = self.ctx.clone();
        let dialog = LogoutDialog {
            ctx: self.ctx.clone(),
            owner: self.owner,
        };
        let logout = self.slot.start::<ModalController<LogoutDialog>, _>(doc, move || {
            Ok(ModalController::new(
                dialog,
                ctx.templates().clone(),
                ModalOptions::default(),
            ))
        })?;
        let mut logout = logout.borrow_mut();
        logout.open(doc)
    }

    /// Fetches the API root and the signed-in account, then follows the
    /// pending redirect.
    pub fn load_session(&mut self, _doc: &mut Document) -> view_core::Result<()> {
        let auth = self.this.clone();
        self.ctx
            .request(self.owner, ApiRequest::FetchRoot, move |ctx, doc, outcome| {
                match outcome {
                    Ok(ApiReply::Root(root)) => {
                        debug!(version = %root.version, "api root stored");
                        ctx.set_root(root);
                        match auth.upgrade() {
                            Some(auth) => auth.borrow_mut().fetch_current_user(doc),
                            None => Ok(()),
                        }
                    }
                    Ok(other) => ctx.unexpected_reply(doc, "fetch_root", &other),
                    Err(err) if err.requires_reauth() => ctx.report_error(doc, &err),
                    Err(err) => {
                        warn!("api root unavailable: {}", err.message());
                        ctx.board().show_message(
                            doc,
                            MessageLevel::Error,
                            "Error: Could not get data from API root.",
                        )
                    }
                }
            });
        Ok(())
    }

    fn fetch_current_user(&mut self, _doc: &mut Document) -> view_core::Result<()> {
        let session = self.ctx.session();
        if session.href.is_empty() {
            self.finish_login();
            return Ok(());
        }
        let url = self.ctx.absolute_url(&session.href);
        let auth = self.this.clone();
        self.ctx
            .request(self.owner, ApiRequest::Get { url }, move |ctx, doc, outcome| {
                match outcome {
                    Ok(ApiReply::Record(user)) => {
                        ctx.set_user(user);
                        if let Some(auth) = auth.upgrade() {
                            auth.borrow_mut().finish_login();
                        }
                        Ok(())
                    }
                    Ok(other) => ctx.unexpected_reply(doc, "get", &other),
                    Err(err) if err.requires_reauth() => ctx.report_error(doc, &err),
                    Err(_) => ctx.board().show_message(
                        doc,
                        MessageLevel::Error,
                        &format!(
                            "Error: Could not get data for user '{}' from API.",
                            session.username
                        ),
                    ),
                }
            });
        Ok(())
    }

    fn finish_login(&mut self) {
        let target = self
            .pending_redirect
            .take()
            .unwrap_or_else(|| DEFAULT_ROUTE.to_string());
        info!(target = %target, "session ready");
        self.ctx.navigate(&target);
    }
}

impl Controller for AuthApp {
    fn destroy(&mut self, doc: &mut Document) -> view_core::Result<()> {
        self.ctx.cancel_requests(self.owner);
        self.pending_redirect = None;
        self.slot.destroy(doc)
    }
}

pub struct LoginDialog {
    ctx: Rc<AppContext>,
    auth: Weak<RefCell<AuthApp>>,
    owner: ViewId,
    in_flight: Rc<Cell<bool>>,
}

impl Dialog for LoginDialog {
    fn tag(&self) -> &str {
        "login-modal"
    }

    fn template_id(&self) -> &str {
        "login_template"
    }

    fn events(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("click button[name=login-success]", "success"),
            ("keydown", "keydown"),
        ]
    }

    /// Sends the credentials; the dialog stays open until the reply arrives.
    /// Submitting again before then does nothing.
    fn on_success(&mut self, scope: &mut DialogScope<'_, Self>) -> view_core::Result<()> {
        if self.in_flight.get() {
            debug!("login already in flight");
            return Ok(());
        }
        let username = scope.value_of("input[name=username]")?;
        let password = scope.value_of("input[name=password]")?;
        clear_field_errors(scope.doc, scope.element, FORM_ERRORS)?;

        let handle = scope.handle.clone();
        let auth = self.auth.clone();
        let login_name = username.clone();
        let in_flight = self.in_flight.clone();
        in_flight.set(true);
        self.ctx.request(
            self.owner,
            ApiRequest::Login { username, password },
            move |ctx, doc, outcome| {
                in_flight.set(false);
                match outcome {
                    Ok(ApiReply::Login(response)) => {
                        handle.close(doc)?;
                        ctx.start_session(&login_name, &response.fullname, &response.href);
                        ctx.set_user_fullname(doc, &response.fullname)?;
                        ctx.board().hide_message(doc)?;
                        match auth.upgrade() {
                            Some(auth) => auth.borrow_mut().load_session(doc),
                            None => Ok(()),
                        }
                    }
                    Ok(other) => ctx.unexpected_reply(doc, "login", &other),
                    Err(err) => {
                        let element = handle.upgrade().and_then(|modal| {
                            let element = modal.borrow().element();
                            element
                        });
                        match (err.validation(), element) {
                            (Some(errors), Some(element)) => {
                                render_field_errors(doc, element, errors, FORM_ERRORS).map(|_| ())
                            }
                            _ => ctx.report_error(doc, &err),
                        }
                    }
                }
            },
        );
        Ok(())
    }
}

pub struct LogoutDialog {
    ctx: Rc<AppContext>,
    owner: ViewId,
}

impl Dialog for LogoutDialog {
    fn tag(&self) -> &str {
        "logout-modal"
    }

    fn template_id(&self) -> &str {
        "logout_template"
    }

    fn events(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("click [data-micromodal-close]", "cancel"),
            ("click button[name=logout-cancel]", "cancel"),
            ("click button[name=logout-success]", "success"),
            ("keydown", "keydown"),
        ]
    }

    fn on_success(&mut self, _scope: &mut DialogScope<'_, Self>) -> view_core::Result<()> {
        self.ctx
            .request(self.owner, ApiRequest::Logout, |ctx, doc, outcome| match outcome {
                Ok(ApiReply::Logout(response)) => {
                    ctx.board()
                        .show_message(doc, MessageLevel::Info, &response.detail)?;
                    ctx.set_user_fullname(doc, "")?;
                    ctx.request_reset();
                    ctx.navigate("");
                    Ok(())
                }
                Ok(other) => ctx.unexpected_reply(doc, "logout", &other),
                Err(err) => ctx.board().show_message(
                    doc,
                    MessageLevel::Error,
                    &format!(
                        "{} Already logged out please refresh the page.",
                        err.message()
                    ),
                ),
            });
        Ok(())
    }
}
