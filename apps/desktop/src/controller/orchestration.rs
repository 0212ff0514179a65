//! Command orchestration helpers from UI actions to backend command queue.

use std::{collections::BTreeMap, rc::Rc};

use crossbeam_channel::{Sender, TrySendError};
use view_core::{Document, ViewId};

use crate::backend_bridge::commands::{BackendCommand, Ticket};
use crate::context::AppContext;
use crate::controller::events::{Outcome, UiError, UiErrorContext};

pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
) -> Result<(), UiError> {
    let cmd_name = cmd.request.name();
    let ticket = cmd.ticket;

    match cmd_tx.try_send(cmd) {
        Ok(()) => {
            tracing::debug!(command = cmd_name, %ticket, "queued ui->backend command");
            Ok(())
        }
        Err(TrySendError::Full(_)) => Err(UiError::from_message(
            UiErrorContext::General,
            "UI command queue is full; please retry",
        )),
        Err(TrySendError::Disconnected(_)) => Err(UiError::from_message(
            UiErrorContext::General,
            "Backend command processor disconnected (possible startup/runtime failure); retry sign-in",
        )),
    }
}

/// Runs on the UI thread once the reply for its ticket arrives.
pub type Continuation =
    Box<dyn FnOnce(&Rc<AppContext>, &mut Document, Outcome) -> view_core::Result<()>>;

struct Pending {
    owner: ViewId,
    request: &'static str,
    continuation: Continuation,
}

/// Requests in flight, keyed by ticket. Cancelling an owner forgets its
/// continuations so late replies are dropped.
#[derive(Default)]
pub struct PendingRequests {
    entries: BTreeMap<Ticket, Pending>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        ticket: Ticket,
        owner: ViewId,
        request: &'static str,
        continuation: Continuation,
    ) {
        self.entries.insert(
            ticket,
            Pending {
                owner,
                request,
                continuation,
            },
        );
    }

    pub fn take(&mut self, ticket: Ticket) -> Option<(&'static str, Continuation)> {
        self.entries
            .remove(&ticket)
            .map(|pending| (pending.request, pending.continuation))
    }

    pub fn cancel_owner(&mut self, owner: ViewId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, pending| pending.owner != owner);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
