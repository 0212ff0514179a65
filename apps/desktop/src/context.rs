//! Shared state handed to every sub-application.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    rc::Rc,
    time::Instant,
};

use crossbeam_channel::Sender;
use serde_json::Value;
use shared::{
    domain::ResourceKind,
    protocol::{ResourceMeta, RootApi},
};
use tracing::{debug, info, warn};
use url::Url;
use view_core::{Document, EventBus, MessageBoard, MessageLevel, ModalRef, TemplateRegistry, ViewId};

use crate::backend_bridge::commands::{ApiRequest, BackendCommand, Ticket};
use crate::controller::events::{ApiReply, Outcome, UiError, UiEvent};
use crate::controller::orchestration::{dispatch_backend_command, Continuation, PendingRequests};
use crate::notify::NotificationDialog;

pub const FULLNAME_SELECTOR: &str = "#user-fullname";

pub type DeferredAction = Box<dyn FnOnce(&Rc<AppContext>, &mut Document) -> view_core::Result<()>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    pub authenticated: bool,
    pub username: String,
    pub fullname: String,
    pub href: String,
    pub user: Option<Value>,
}

pub struct AppContext {
    templates: Rc<TemplateRegistry>,
    bus: EventBus,
    board: MessageBoard,
    cmd_tx: Sender<BackendCommand>,
    next_ticket: Cell<u64>,
    pending: RefCell<PendingRequests>,
    local_events: RefCell<VecDeque<UiEvent>>,
    session: RefCell<SessionInfo>,
    root: RefCell<Option<RootApi>>,
    meta: RefCell<HashMap<ResourceKind, ResourceMeta>>,
    navigation: RefCell<VecDeque<String>>,
    deferred: RefCell<VecDeque<DeferredAction>>,
    reset_requested: Cell<bool>,
    pub(crate) notification: RefCell<Option<ModalRef<NotificationDialog>>>,
    pub(crate) alert_deadline: Cell<Option<Instant>>,
}

impl AppContext {
    pub fn new(templates: Rc<TemplateRegistry>, cmd_tx: Sender<BackendCommand>) -> Rc<Self> {
        Rc::new(Self {
            templates,
            bus: EventBus::new(),
            board: MessageBoard::default(),
            cmd_tx,
            next_ticket: Cell::new(1),
            pending: RefCell::new(PendingRequests::new()),
            local_events: RefCell::new(VecDeque::new()),
            session: RefCell::new(SessionInfo::default()),
            root: RefCell::new(None),
            meta: RefCell::new(HashMap::new()),
            navigation: RefCell::new(VecDeque::new()),
            deferred: RefCell::new(VecDeque::new()),
            reset_requested: Cell::new(false),
            notification: RefCell::new(None),
            alert_deadline: Cell::new(None),
        })
    }

    pub fn templates(&self) -> &Rc<TemplateRegistry> {
        &self.templates
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn board(&self) -> &MessageBoard {
        &self.board
    }

    /// Queues `request` for the backend worker and parks `continuation`
    /// until its reply arrives. A queue failure completes the ticket locally
    /// with the error.
    pub fn request<F>(&self, owner: ViewId, request: ApiRequest, continuation: F) -> Ticket
    where
        F: FnOnce(&Rc<AppContext>, &mut Document, Outcome) -> view_core::Result<()> + 'static,
    {
        let ticket = Ticket(self.next_ticket.get());
        self.next_ticket.set(ticket.0 + 1);
        let name = request.name();
        let continuation: Continuation = Box::new(continuation);
        self.pending
            .borrow_mut()
            .insert(ticket, owner, name, continuation);

        if let Err(err) = dispatch_backend_command(&self.cmd_tx, BackendCommand { ticket, request }) {
            warn!(%ticket, command = name, "backend command not queued: {}", err.message());
            self.local_events.borrow_mut().push_back(UiEvent::Completed {
                ticket,
                outcome: Err(err),
            });
        }
        ticket
    }

    pub fn cancel_requests(&self, owner: ViewId) {
        let dropped = self.pending.borrow_mut().cancel_owner(owner);
        if dropped > 0 {
            debug!(owner = owner.get(), dropped, "cancelled in-flight requests");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn take_continuation(&self, ticket: Ticket) -> Option<(&'static str, Continuation)> {
        self.pending.borrow_mut().take(ticket)
    }

    pub(crate) fn take_local_event(&self) -> Option<UiEvent> {
        self.local_events.borrow_mut().pop_front()
    }

    /// Asks the application to route to `path` once the current handler
    /// returns.
    pub fn navigate(&self, path: &str) {
        self.navigation.borrow_mut().push_back(path.to_string());
    }

    pub(crate) fn take_navigation(&self) -> Option<String> {
        self.navigation.borrow_mut().pop_front()
    }

    /// Runs `action` after the current handler returns.
    pub fn defer<F>(&self, action: F)
    where
        F: FnOnce(&Rc<AppContext>, &mut Document) -> view_core::Result<()> + 'static,
    {
        self.deferred.borrow_mut().push_back(Box::new(action));
    }

    pub(crate) fn take_deferred(&self) -> Option<DeferredAction> {
        self.deferred.borrow_mut().pop_front()
    }

    /// Asks the application to tear down every sub-application.
    pub fn request_reset(&self) {
        self.reset_requested.set(true);
    }

    pub(crate) fn take_reset(&self) -> bool {
        self.reset_requested.replace(false)
    }

    pub fn session(&self) -> SessionInfo {
        self.session.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().authenticated
    }

    pub fn start_session(&self, username: &str, fullname: &str, href: &str) {
        info!(username, fullname, "session started");
        *self.session.borrow_mut() = SessionInfo {
            authenticated: true,
            username: username.to_string(),
            fullname: fullname.to_string(),
            href: href.to_string(),
            user: None,
        };
    }

    pub fn set_user(&self, user: Value) {
        self.session.borrow_mut().user = Some(user);
    }

    pub fn has_root(&self) -> bool {
        self.root.borrow().is_some()
    }

    pub fn set_root(&self, root: RootApi) {
        *self.root.borrow_mut() = Some(root);
    }

    pub fn resource_url(&self, kind: ResourceKind) -> Option<String> {
        self.root
            .borrow()
            .as_ref()
            .and_then(|root| root.resource_endpoint(kind))
            .map(str::to_string)
    }

    pub fn meta(&self, kind: ResourceKind) -> Option<ResourceMeta> {
        self.meta.borrow().get(&kind).cloned()
    }

    pub fn set_meta(&self, kind: ResourceKind, meta: ResourceMeta) {
        self.meta.borrow_mut().insert(kind, meta);
    }

    /// Drops parked continuations, queued work and the open notification,
    /// releasing everything they hold.
    pub fn shutdown(&self) {
        let pending = std::mem::replace(&mut *self.pending.borrow_mut(), PendingRequests::new());
        let deferred = std::mem::take(&mut *self.deferred.borrow_mut());
        let notification = self.notification.borrow_mut().take();
        self.local_events.borrow_mut().clear();
        self.navigation.borrow_mut().clear();
        debug!(dropped = pending.len() + deferred.len(), "context shut down");
        drop((pending, deferred, notification));
    }

    /// Forgets everything learned about the signed-in user.
    pub fn clear_user_data(&self) {
        *self.session.borrow_mut() = SessionInfo::default();
        *self.root.borrow_mut() = None;
        self.meta.borrow_mut().clear();
        info!("user data cleared");
    }

    pub fn set_user_fullname(&self, doc: &mut Document, text: &str) -> view_core::Result<()> {
        if let Some(node) = doc.find(doc.body(), FULLNAME_SELECTOR)? {
            doc.set_text(node, text)?;
        }
        Ok(())
    }

    /// Shows `err` on the message board. Authentication failures also drop
    /// the session and send the user back to the login route.
    pub fn report_error(&self, doc: &mut Document, err: &UiError) -> view_core::Result<()> {
        warn!(category = ?err.category(), context = ?err.context(), "{}", err.message());
        self.board
            .show_message(doc, MessageLevel::Error, &err.user_message())?;
        if err.requires_reauth() {
            *self.session.borrow_mut() = SessionInfo::default();
            self.navigate("login");
        }
        Ok(())
    }

    /// A reply of the wrong shape for `request`; shown in the error dialog.
    pub fn unexpected_reply(
        self: &Rc<Self>,
        doc: &mut Document,
        request: &str,
        reply: &ApiReply,
    ) -> view_core::Result<()> {
        warn!(request, reply = reply.kind(), "unexpected reply");
        crate::notify::error_message(
            self,
            doc,
            &format!("Unexpected `{}` reply to `{request}`.", reply.kind()),
        )
    }

    /// Resolves a record link against the API root, so relative `href`
    /// values from the backend become requestable URLs.
    pub fn absolute_url(&self, href: &str) -> String {
        let root = self.root.borrow();
        root.as_ref()
            .and_then(|root| Url::parse(&root.href).ok())
            .and_then(|base| base.join(href).ok())
            .map(String::from)
            .unwrap_or_else(|| href.to_string())
    }
}
