mod app;
mod auth;
mod backend_bridge;
mod context;
mod controller;
mod notify;
mod resources;
mod shell;

use std::{
    fs,
    io::{self, BufReader},
    time::Duration,
};

use anyhow::{Context, Result};
use app::InventoryApp;
use backend_bridge::{commands::BackendCommand, runtime::spawn_backend_thread};
use clap::Parser;
use client_core::load_settings;
use controller::events::UiEvent;
use crossbeam_channel::bounded;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_PAGE: &str = include_str!("../templates/default.html");

#[derive(Parser, Debug)]
#[command(about = "Inventory client driven by line commands")]
struct Args {
    /// API root URL; overrides `inventory.toml` and `APP__API_ROOT`.
    #[arg(long)]
    api_root: Option<String>,
    #[arg(long)]
    login_url: Option<String>,
    #[arg(long)]
    logout_url: Option<String>,
    /// Seconds to wait for each backend request.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Page markup holding the templates; the built-in page by default.
    #[arg(long)]
    templates: Option<String>,
    /// Read commands from this file instead of stdin.
    #[arg(long)]
    script: Option<String>,
    /// Initial route.
    #[arg(long, default_value = "")]
    start: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(api_root) = args.api_root {
        settings.api_root = api_root;
    }
    if let Some(login_url) = args.login_url {
        settings.login_url = login_url;
    }
    if let Some(logout_url) = args.logout_url {
        settings.logout_url = logout_url;
    }
    if let Some(timeout) = args.timeout_secs.filter(|secs| *secs > 0) {
        settings.request_timeout_secs = timeout;
    }
    let markup = match args.templates.or_else(|| settings.templates_path.clone()) {
        Some(path) => fs::read_to_string(&path).with_context(|| format!("reading templates from {path}"))?,
        None => DEFAULT_PAGE.to_string(),
    };
    let wait = Duration::from_secs(settings.request_timeout_secs + 5);
    info!(api_root = %settings.api_root, "starting inventory client");

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    let worker = spawn_backend_thread(settings, cmd_rx, ui_tx);

    let mut app = InventoryApp::new(&markup, cmd_tx, ui_rx).context("building the page")?;
    app.start(&args.start);
    app.wait_idle(wait);

    let outcome = match args.script {
        Some(path) => {
            let file = fs::File::open(&path).with_context(|| format!("opening script {path}"))?;
            shell::run(&mut app, BufReader::new(file), io::stdout(), wait)
        }
        None => shell::run(&mut app, io::stdin().lock(), io::stdout(), wait),
    };

    app.shutdown();
    if worker.join().is_err() {
        tracing::error!("backend worker panicked");
    }
    outcome
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
