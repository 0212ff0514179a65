//! Line-oriented driver: each input line is one user gesture against the
//! page, and the app is settled before the next line is read.

use std::{
    io::{BufRead, Write},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;
use view_core::{Document, DomEvent, Key, NodeId};

use crate::app::InventoryApp;

const HELP: &str = "commands: go <path> | click <selector> | type <selector> <text> | check <selector> | key <enter|escape> [selector] | show [selector] | message | wait | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Go(String),
    Click(String),
    Type { selector: String, text: String },
    Check(String),
    Key { key: Key, selector: Option<String> },
    Show(Option<String>),
    Message,
    Wait,
    Help,
    Quit,
}

impl ShellCommand {
    /// Blank lines and `#` comments parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let required = |what: &str| -> Result<String> {
            if rest.is_empty() {
                bail!("`{verb}` needs {what}");
            }
            Ok(rest.to_string())
        };
        let command = match verb {
            "go" => ShellCommand::Go(rest.to_string()),
            "click" => ShellCommand::Click(required("a selector")?),
            "check" => ShellCommand::Check(required("a selector")?),
            "type" => {
                let args = required("a selector")?;
                let (selector, text) = match args.split_once(char::is_whitespace) {
                    Some((selector, text)) => (selector.to_string(), text.trim().to_string()),
                    None => (args.clone(), String::new()),
                };
                ShellCommand::Type { selector, text }
            }
            "key" => {
                let (name, selector) = match rest.split_once(char::is_whitespace) {
                    Some((name, selector)) => (name, Some(selector.trim().to_string())),
                    None => (rest, None),
                };
                let key = Key::parse(name).ok_or_else(|| anyhow!("unknown key `{name}`"))?;
                ShellCommand::Key { key, selector }
            }
            "show" => ShellCommand::Show((!rest.is_empty()).then(|| rest.to_string())),
            "message" => ShellCommand::Message,
            "wait" => ShellCommand::Wait,
            "help" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            other => bail!("unknown command `{other}`"),
        };
        Ok(Some(command))
    }
}

fn require(doc: &Document, selector: &str) -> Result<NodeId> {
    doc.find(doc.body(), selector)?
        .ok_or_else(|| anyhow!("nothing matches `{selector}`"))
}

/// The topmost open dialog, if any.
fn open_dialog(doc: &Document) -> Option<NodeId> {
    doc.children(doc.overlay())
        .iter()
        .rev()
        .copied()
        .find(|node| !doc.is_hidden(*node))
}

/// Applies one command. Returns false when the session should end.
pub fn execute(app: &mut InventoryApp, command: ShellCommand, out: &mut impl Write, timeout: Duration) -> Result<bool> {
    debug!(?command, "shell command");
    match command {
        ShellCommand::Go(path) => {
            app.start(&path);
        }
        ShellCommand::Click(selector) => {
            let target = require(app.doc(), &selector)?;
            app.dispatch(&mut DomEvent::click(target));
        }
        ShellCommand::Type { selector, text } => {
            let target = require(app.doc(), &selector)?;
            app.doc_mut().set_value(target, &text);
            app.dispatch(&mut DomEvent::change(target));
        }
        ShellCommand::Check(selector) => {
            let target = require(app.doc(), &selector)?;
            let doc = app.doc_mut();
            if doc.attr(target, "checked").is_some() {
                doc.remove_attr(target, "checked");
            } else {
                doc.set_attr(target, "checked", "checked");
            }
            app.dispatch(&mut DomEvent::change(target));
        }
        ShellCommand::Key { key, selector } => {
            let target = match selector {
                Some(selector) => require(app.doc(), &selector)?,
                None => open_dialog(app.doc()).unwrap_or_else(|| app.doc().body()),
            };
            app.dispatch(&mut DomEvent::keydown(target, key));
        }
        ShellCommand::Show(selector) => {
            let node = match selector {
                Some(selector) => require(app.doc(), &selector)?,
                None => app.doc().body(),
            };
            writeln!(out, "{}", app.doc().outline(node))?;
            return Ok(true);
        }
        ShellCommand::Message => {
            let message = app.context().board().current(app.doc());
            writeln!(out, "{}", message.unwrap_or_default())?;
            return Ok(true);
        }
        ShellCommand::Wait => {}
        ShellCommand::Help => {
            writeln!(out, "{HELP}")?;
            return Ok(true);
        }
        ShellCommand::Quit => return Ok(false),
    }
    if !app.wait_idle(timeout) {
        writeln!(out, "! backend did not answer in time")?;
    }
    Ok(true)
}

/// Reads commands until `quit` or end of input. Bad commands are reported
/// and skipped.
pub fn run(app: &mut InventoryApp, input: impl BufRead, mut out: impl Write, timeout: Duration) -> Result<()> {
    for (number, line) in input.lines().enumerate() {
        let line = line.context("reading command")?;
        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                writeln!(out, "! line {}: {err}", number + 1)?;
                continue;
            }
        };
        match execute(app, command, &mut out, timeout) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => writeln!(out, "! line {}: {err:#}", number + 1)?,
        }
        out.flush()?;
    }
    Ok(())
}
