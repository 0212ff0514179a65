//! The application object: page chrome, routing, the two controller slots
//! and the pump that drives everything queued by handlers.

use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use shared::domain::ResourceKind;
use tracing::{debug, error, info, warn};
use view_core::{
    events::delegate_to, ControllerSlot, Document, DomEvent, EventBinding, EventTarget,
    MessageLevel, NodeId, Params, Region, Router, TemplateRegistry, ViewError, ViewId,
};

use crate::auth::{AuthApp, DEFAULT_ROUTE};
use crate::backend_bridge::commands::BackendCommand;
use crate::context::AppContext;
use crate::controller::events::UiEvent;
use crate::notify::expire_alert;
use crate::resources::{Accounts, Invoices, Items, Projects, ResourceApp, ResourceType};

pub const MAIN_REGION: &str = "#main-region";
pub const LOGOUT_BUTTON: &str = "#logout-button";
const MENU_LINKS: &str = "nav.menu a";
const ACTIVE_CLASS: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAction {
    List,
    Create,
    View,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Logout,
    Resource(ResourceKind, ResourceAction),
    NotFound,
}

pub fn build_router() -> Router<Route> {
    let mut router = Router::new()
        .route("", Route::Login)
        .route("login", Route::Login)
        .route("logout", Route::Logout);
    for kind in ResourceKind::ALL {
        let segment = kind.route_segment();
        router.add(segment, Route::Resource(kind, ResourceAction::List));
        router.add(
            &format!("{segment}/create"),
            Route::Resource(kind, ResourceAction::Create),
        );
        router.add(
            &format!("{segment}/edit/:id"),
            Route::Resource(kind, ResourceAction::Edit),
        );
        router.add(
            &format!("{segment}/:id"),
            Route::Resource(kind, ResourceAction::View),
        );
    }
    router.add("*rest", Route::NotFound);
    router
}

/// Delegated handlers for the static parts of the page.
struct PageChrome {
    ctx: Rc<AppContext>,
}

impl PageChrome {
    fn attach(doc: &mut Document, ctx: Rc<AppContext>) -> view_core::Result<Rc<RefCell<Self>>> {
        let chrome = Rc::new(RefCell::new(Self { ctx }));
        let bindings = vec![
            EventBinding::parse(&format!("click {LOGOUT_BUTTON}"), "logout")?,
            EventBinding::parse("click a[href]", "link")?,
        ];
        let body = doc.body();
        delegate_to(doc, ViewId::next(), body, bindings, &chrome);
        Ok(chrome)
    }
}

fn link_target(doc: &Document, node: NodeId) -> Option<String> {
    let mut current = Some(node);
    while let Some(node) = current {
        if let Some(href) = doc.attr(node, "href") {
            return Some(href.to_string());
        }
        current = doc.parent(node);
    }
    None
}

impl EventTarget for PageChrome {
    fn handle_event(&mut self, doc: &mut Document, action: &str, event: &mut DomEvent) -> view_core::Result<()> {
        match action {
            "logout" => {
                event.prevent_default();
                self.ctx.navigate("logout");
            }
            "link" => {
                if let Some(href) = link_target(doc, event.target) {
                    event.prevent_default();
                    self.ctx.navigate(&href);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

pub struct InventoryApp {
    doc: Document,
    ctx: Rc<AppContext>,
    router: Router<Route>,
    auth_slot: ControllerSlot,
    main_slot: ControllerSlot,
    main_region: Rc<RefCell<Region>>,
    _chrome: Rc<RefCell<PageChrome>>,
    ui_rx: Receiver<UiEvent>,
}

impl InventoryApp {
    /// Builds the page from `markup`, whose template holders are extracted
    /// into the shared registry.
    pub fn new(
        markup: &str,
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
    ) -> view_core::Result<Self> {
        let mut doc = Document::from_markup(markup)?;
        let templates = Rc::new(TemplateRegistry::extract_from(&mut doc)?);
        let mount = doc
            .find(doc.body(), MAIN_REGION)?
            .ok_or_else(|| ViewError::MissingElement(MAIN_REGION.to_string()))?;
        info!(templates = templates.len(), "page loaded");

        let ctx = AppContext::new(templates, cmd_tx);
        let chrome = PageChrome::attach(&mut doc, ctx.clone())?;
        Ok(Self {
            doc,
            ctx,
            router: build_router(),
            auth_slot: ControllerSlot::new("auth"),
            main_slot: ControllerSlot::new("main"),
            main_region: Rc::new(RefCell::new(Region::new("main", mount))),
            _chrome: chrome,
            ui_rx,
        })
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn context(&self) -> &Rc<AppContext> {
        &self.ctx
    }

    #[cfg(test)]
    pub fn router(&self) -> &Router<Route> {
        &self.router
    }

    #[cfg(test)]
    pub fn main_controller(&self) -> Option<&'static str> {
        self.main_slot.current_type()
    }

    /// Routes to `path` and settles everything it triggers.
    pub fn start(&mut self, path: &str) -> usize {
        self.ctx.navigate(path);
        self.pump()
    }

    /// Dispatches a DOM event and settles everything it triggers.
    pub fn dispatch(&mut self, event: &mut DomEvent) -> usize {
        let delivered = view_core::dispatch(&mut self.doc, event);
        self.contain("dom event", delivered.map(|_| ()));
        self.pump()
    }

    fn auth(&mut self) -> view_core::Result<Rc<RefCell<AuthApp>>> {
        let ctx = self.ctx.clone();
        self.auth_slot
            .start::<AuthApp, _>(&mut self.doc, move || Ok(AuthApp::new(ctx)))
    }

    pub fn navigate_to(&mut self, path: &str) -> view_core::Result<()> {
        let Some((route, params)) = self.router.navigate(path) else {
            return Ok(());
        };
        let path = self.router.current().unwrap_or_default().to_string();
        info!(path = %path, ?route, "routing");
        match route {
            Route::Login => {
                if self.ctx.is_authenticated() && self.ctx.has_root() {
                    self.ctx.navigate(DEFAULT_ROUTE);
                    return Ok(());
                }
                self.highlight_menu(None)?;
                let auth = self.auth()?;
                let mut auth = auth.borrow_mut();
                auth.authenticate(&mut self.doc, None)
            }
            Route::Logout => {
                if !self.ctx.is_authenticated() {
                    self.ctx.navigate("login");
                    return Ok(());
                }
                let auth = self.auth()?;
                let mut auth = auth.borrow_mut();
                auth.show_logout(&mut self.doc)
            }
            Route::Resource(kind, action) => {
                if !(self.ctx.is_authenticated() && self.ctx.has_root()) {
                    self.highlight_menu(None)?;
                    let auth = self.auth()?;
                    let mut auth = auth.borrow_mut();
                    return auth.authenticate(&mut self.doc, Some(path));
                }
                self.highlight_menu(Some(kind))?;
                match kind {
                    ResourceKind::Projects => self.run::<Projects>(action, &params),
                    ResourceKind::Accounts => self.run::<Accounts>(action, &params),
                    ResourceKind::Invoices => self.run::<Invoices>(action, &params),
                    ResourceKind::Items => self.run::<Items>(action, &params),
                }
            }
            Route::NotFound => {
                warn!(path = %path, "unknown page");
                self.highlight_menu(None)?;
                self.ctx.board().show_message(
                    &mut self.doc,
                    MessageLevel::Error,
                    &format!("Error: Page '{path}' not found."),
                )
            }
        }
    }

    /// Marks the menu entry for `kind` as `active` and clears the others.
    fn highlight_menu(&mut self, kind: Option<ResourceKind>) -> view_core::Result<()> {
        let selected = kind.map(|kind| format!("#{}", kind.route_segment()));
        for link in self.doc.find_all(self.doc.body(), MENU_LINKS)? {
            if selected.is_some() && self.doc.attr(link, "href") == selected.as_deref() {
                self.doc.add_class(link, ACTIVE_CLASS);
            } else {
                self.doc.remove_class(link, ACTIVE_CLASS);
            }
        }
        Ok(())
    }

    /// Starts the sub-application for `K`, replacing any other one.
    fn run<K: ResourceType>(&mut self, action: ResourceAction, params: &Params) -> view_core::Result<()> {
        let ctx = self.ctx.clone();
        let region = self.main_region.clone();
        let app = self
            .main_slot
            .start::<ResourceApp<K>, _>(&mut self.doc, move || Ok(ResourceApp::new(ctx, region)))?;
        let mut app = app.borrow_mut();
        let id = params.get("id").map(String::as_str).unwrap_or_default();
        match action {
            ResourceAction::List => app.show_list(&mut self.doc),
            ResourceAction::Create => app.show_new_form(&mut self.doc),
            ResourceAction::View => app.show_by_id(&mut self.doc, id),
            ResourceAction::Edit => app.show_editor_by_id(&mut self.doc, id),
        }
    }

    fn handle_ui_event(&mut self, event: UiEvent) -> view_core::Result<()> {
        match event {
            UiEvent::Info(message) => {
                debug!(%message, "backend");
                Ok(())
            }
            UiEvent::Error(err) => self.ctx.report_error(&mut self.doc, &err),
            UiEvent::Completed { ticket, outcome } => match self.ctx.take_continuation(ticket) {
                Some((request, continuation)) => {
                    debug!(%ticket, request, ok = outcome.is_ok(), "response arrived");
                    continuation(&self.ctx, &mut self.doc, outcome)
                }
                None => {
                    debug!(%ticket, "dropping late response");
                    Ok(())
                }
            },
        }
    }

    /// Logs a failed handler and shows it on the message board so one bad
    /// handler does not stop the pump.
    fn contain(&mut self, what: &str, outcome: view_core::Result<()>) {
        if let Err(err) = outcome {
            error!(what, "handler failed: {err}");
            if let Err(board) = self.ctx.board().show_message(
                &mut self.doc,
                MessageLevel::Error,
                &format!("Error: {err}"),
            ) {
                error!("message board unavailable: {board}");
            }
        }
    }

    /// Runs queued work until nothing is left: bus events, deferred
    /// actions, resets, navigation and backend replies. Returns the number
    /// of items handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let mut progressed = 0;

            match self.ctx.bus().dispatch_pending(&mut self.doc) {
                Ok(delivered) => progressed += delivered,
                Err(err) => self.contain("bus", Err(err)),
            }
            while let Some(action) = self.ctx.take_deferred() {
                let outcome = action(&self.ctx, &mut self.doc);
                self.contain("deferred action", outcome);
                progressed += 1;
            }
            if self.ctx.take_reset() {
                let outcome = self.destroy_app();
                self.contain("reset", outcome);
                progressed += 1;
            }
            while let Some(path) = self.ctx.take_navigation() {
                let outcome = self.navigate_to(&path);
                self.contain("navigation", outcome);
                progressed += 1;
            }
            while let Some(event) = self.ctx.take_local_event() {
                let outcome = self.handle_ui_event(event);
                self.contain("local event", outcome);
                progressed += 1;
            }
            while let Ok(event) = self.ui_rx.try_recv() {
                let outcome = self.handle_ui_event(event);
                self.contain("backend event", outcome);
                progressed += 1;
            }
            match expire_alert(&self.ctx, &mut self.doc, Instant::now()) {
                Ok(true) => progressed += 1,
                Ok(false) => {}
                Err(err) => self.contain("alert", Err(err)),
            }

            if progressed == 0 {
                return handled;
            }
            handled += progressed;
        }
    }

    /// Pumps until no request is in flight. Returns false on timeout or
    /// when the backend is gone.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.ctx.pending_count() == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.ui_rx.recv_timeout(remaining) {
                Ok(event) => {
                    let outcome = self.handle_ui_event(event);
                    self.contain("backend event", outcome);
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(pending = self.ctx.pending_count(), "gave up waiting for the backend");
                    return false;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("backend worker is gone");
                    return false;
                }
            }
        }
    }

    /// Tears everything down so the backend channel closes once `self` is
    /// dropped.
    pub fn shutdown(mut self) {
        if let Err(err) = self.destroy_app() {
            warn!("teardown failed: {err}");
        }
        self.ctx.shutdown();
    }

    /// Tears down every sub-application and forgets the user.
    pub fn destroy_app(&mut self) -> view_core::Result<()> {
        info!("resetting application");
        let main = self.main_slot.destroy(&mut self.doc);
        let auth = self.auth_slot.destroy(&mut self.doc);
        self.ctx.clear_user_data();
        self.ctx.set_user_fullname(&mut self.doc, "")?;
        self.highlight_menu(None)?;
        main.and(auth)
    }
}
