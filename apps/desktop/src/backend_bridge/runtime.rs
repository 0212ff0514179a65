//! Runtime bridge between UI command queue and backend event intake.

use std::{sync::Arc, thread, time::Duration};

use client_core::{ClientSettings, InventoryApi, InventoryClient};
use crossbeam_channel::{Receiver, Sender};

use crate::backend_bridge::commands::{ApiRequest, BackendCommand};
use crate::controller::events::{ApiReply, UiError, UiErrorContext, UiEvent};

pub fn spawn_backend_thread(
    settings: ClientSettings,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) -> thread::JoinHandle<()> {
    let api: Arc<dyn InventoryApi> = Arc::new(InventoryClient::new(settings));
    spawn_backend_with(api, cmd_rx, ui_tx)
}

/// Runs every command on a multi-threaded runtime and reports each outcome
/// as [`UiEvent::Completed`]. The thread exits once every command sender is
/// gone.
pub fn spawn_backend_with(
    api: Arc<dyn InventoryApi>,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::error!("failed to build backend runtime: {err}");
                report_startup_failure(&ui_tx, &format!("failed to build runtime: {err}"));
                return;
            }
        };
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker ready".to_string()));

        while let Ok(cmd) = cmd_rx.recv() {
            let api = api.clone();
            let ui_tx = ui_tx.clone();
            runtime.spawn(async move {
                let BackendCommand { ticket, request } = cmd;
                let name = request.name();
                let context = error_context(&request);
                let outcome = execute(api.as_ref(), request)
                    .await
                    .map_err(|err| UiError::from_client_error(context, &err));
                match &outcome {
                    Ok(reply) => tracing::debug!(%ticket, command = name, reply = reply.kind(), "backend command finished"),
                    Err(err) => tracing::warn!(%ticket, command = name, "backend command failed: {}", err.message()),
                }
                if ui_tx
                    .try_send(UiEvent::Completed { ticket, outcome })
                    .is_err()
                {
                    tracing::warn!(%ticket, "ui event queue unavailable; dropping completion");
                }
            });
        }

        tracing::info!("backend command queue closed; shutting down worker");
        runtime.shutdown_timeout(Duration::from_secs(2));
    })
}

/// Blocks until the UI takes the error; it is only lost if the UI is gone.
fn report_startup_failure(ui_tx: &Sender<UiEvent>, reason: &str) {
    let event = UiEvent::Error(UiError::from_message(
        UiErrorContext::BackendStartup,
        format!("backend worker startup failure: {reason}"),
    ));
    if ui_tx.send(event).is_err() {
        tracing::warn!("ui event queue closed; startup failure not reported");
    }
}

fn error_context(request: &ApiRequest) -> UiErrorContext {
    match request {
        ApiRequest::Login { .. } => UiErrorContext::Login,
        ApiRequest::Logout => UiErrorContext::Logout,
        ApiRequest::FetchRoot
        | ApiRequest::FetchMeta { .. }
        | ApiRequest::List { .. }
        | ApiRequest::Search { .. }
        | ApiRequest::Get { .. } => UiErrorContext::Load,
        ApiRequest::Create { .. } | ApiRequest::Update { .. } => UiErrorContext::Save,
        ApiRequest::Delete { .. } => UiErrorContext::Delete,
    }
}

pub async fn execute(api: &dyn InventoryApi, request: ApiRequest) -> client_core::Result<ApiReply> {
    Ok(match request {
        ApiRequest::Login { username, password } => {
            ApiReply::Login(api.login(&username, &password).await?)
        }
        ApiRequest::Logout => ApiReply::Logout(api.logout().await?),
        ApiRequest::FetchRoot => ApiReply::Root(api.fetch_root().await?),
        ApiRequest::FetchMeta { url } => ApiReply::Meta(api.fetch_meta(&url).await?),
        ApiRequest::List { url } => ApiReply::Records(api.list(&url).await?),
        ApiRequest::Search { url, term } => ApiReply::Records(api.search(&url, &term).await?),
        ApiRequest::Get { url } => ApiReply::Record(api.get(&url).await?),
        ApiRequest::Create { url, body } => ApiReply::Record(api.create(&url, &body).await?),
        ApiRequest::Update { url, body } => ApiReply::Record(api.update(&url, &body).await?),
        ApiRequest::Delete { url } => {
            api.delete(&url).await?;
            ApiReply::Deleted
        }
    })
}
