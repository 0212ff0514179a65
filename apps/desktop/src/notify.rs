//! Page-wide notifications: error and confirmation dialogs plus short-lived
//! success and failure alerts. One notification is shown at a time; opening
//! another destroys the previous one.

use std::{
    rc::{Rc, Weak},
    time::{Duration, Instant},
};

use serde_json::{json, Value};
use tracing::{debug, warn};
use view_core::{Controller, Dialog, DialogScope, Document, ModalController, ModalOptions, ModalRef};

use crate::context::{AppContext, DeferredAction};

/// How long an alert stays up before it is closed on its own.
pub const ALERT_LINGER: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Confirmation,
    Error,
    SuccessAlert,
    ErrorAlert,
}

impl NotificationKind {
    pub fn is_alert(self) -> bool {
        matches!(self, NotificationKind::SuccessAlert | NotificationKind::ErrorAlert)
    }

    fn defaults(self) -> Value {
        match self {
            NotificationKind::Confirmation => json!({
                "title": "Confirmation",
                "message": "Are you sure?",
                "noCancel": false,
                "cancel": "Cancel",
                "noConfirm": false,
                "confirm": "Continue",
            }),
            NotificationKind::Error => json!({
                "title": "Error",
                "message": "Oops",
                "noCancel": true,
                "noConfirm": false,
                "confirm": "Continue",
            }),
            NotificationKind::SuccessAlert => json!({
                "title": "Success",
                "message": "Success",
                "level": "success",
            }),
            NotificationKind::ErrorAlert => json!({
                "title": "Error",
                "message": "Error",
                "level": "danger",
            }),
        }
    }
}

pub struct NotificationDialog {
    kind: NotificationKind,
    message: Option<String>,
    callback: Option<DeferredAction>,
    ctx: Weak<AppContext>,
}

impl NotificationDialog {
    pub fn new(ctx: &Rc<AppContext>, kind: NotificationKind, message: Option<&str>) -> Self {
        Self {
            kind,
            message: message.map(str::to_string),
            callback: None,
            ctx: Rc::downgrade(ctx),
        }
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    fn on_confirm(mut self, callback: DeferredAction) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl Dialog for NotificationDialog {
    fn tag(&self) -> &str {
        if self.kind.is_alert() {
            "alert-modal"
        } else {
            "notify-modal"
        }
    }

    fn template_id(&self) -> &str {
        if self.kind.is_alert() {
            "alert_template"
        } else {
            "notify_template"
        }
    }

    fn data(&self) -> Value {
        let mut data = self.kind.defaults();
        if let Some(message) = &self.message {
            data["message"] = Value::String(message.clone());
        }
        data
    }

    /// The confirmation callback runs after the dialog has closed.
    fn on_success(&mut self, _scope: &mut DialogScope<'_, Self>) -> view_core::Result<()> {
        if let (Some(callback), Some(ctx)) = (self.callback.take(), self.ctx.upgrade()) {
            ctx.defer(callback);
        }
        Ok(())
    }
}

fn open_notification(
    ctx: &Rc<AppContext>,
    doc: &mut Document,
    dialog: NotificationDialog,
) -> view_core::Result<ModalRef<NotificationDialog>> {
    let previous = ctx.notification.borrow_mut().take();
    if let Some(previous) = previous {
        match previous.try_borrow_mut() {
            Ok(mut previous) => previous.destroy(doc)?,
            Err(_) => warn!("previous notification is busy; leaving it to close itself"),
        }
    }

    let alert = dialog.kind.is_alert();
    debug!(kind = ?dialog.kind, "opening notification");
    let modal = ModalController::new(dialog, ctx.templates().clone(), ModalOptions::default());
    modal.borrow_mut().open(doc)?;
    *ctx.notification.borrow_mut() = Some(modal.clone());
    ctx.alert_deadline
        .set(alert.then(|| Instant::now() + ALERT_LINGER));
    Ok(modal)
}

pub fn error_message(ctx: &Rc<AppContext>, doc: &mut Document, message: &str) -> view_core::Result<()> {
    let dialog = NotificationDialog::new(ctx, NotificationKind::Error, Some(message));
    open_notification(ctx, doc, dialog).map(|_| ())
}

/// Opens a confirmation dialog; `on_confirm` runs only when the user
/// confirms.
pub fn ask_confirmation<F>(
    ctx: &Rc<AppContext>,
    doc: &mut Document,
    message: &str,
    on_confirm: F,
) -> view_core::Result<()>
where
    F: FnOnce(&Rc<AppContext>, &mut Document) -> view_core::Result<()> + 'static,
{
    let dialog = NotificationDialog::new(ctx, NotificationKind::Confirmation, Some(message))
        .on_confirm(Box::new(on_confirm));
    open_notification(ctx, doc, dialog).map(|_| ())
}

pub fn alert_success(ctx: &Rc<AppContext>, doc: &mut Document, message: &str) -> view_core::Result<()> {
    let dialog = NotificationDialog::new(ctx, NotificationKind::SuccessAlert, Some(message));
    open_notification(ctx, doc, dialog).map(|_| ())
}

pub fn alert_error(ctx: &Rc<AppContext>, doc: &mut Document, message: &str) -> view_core::Result<()> {
    let dialog = NotificationDialog::new(ctx, NotificationKind::ErrorAlert, Some(message));
    open_notification(ctx, doc, dialog).map(|_| ())
}

/// Closes the current alert once its linger time has passed. Returns
/// whether anything was closed.
pub fn expire_alert(ctx: &Rc<AppContext>, doc: &mut Document, now: Instant) -> view_core::Result<bool> {
    match ctx.alert_deadline.get() {
        Some(deadline) if deadline <= now => {}
        _ => return Ok(false),
    }
    ctx.alert_deadline.set(None);
    let current = ctx.notification.borrow().clone();
    let Some(modal) = current else {
        return Ok(false);
    };
    let Ok(mut modal) = modal.try_borrow_mut() else {
        return Ok(false);
    };
    if !modal.dialog().kind().is_alert() || !modal.is_visible() {
        return Ok(false);
    }
    modal.close(doc)?;
    Ok(true)
}
