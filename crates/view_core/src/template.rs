//! Load-once template cache with a small mustache dialect.
//!
//! Supported tags: `{{ path }}` (escaped), `{{& path }}` and `{{{ path }}}`
//! (raw), `{{# path }}...{{/ path }}` (truthy block, iterated for arrays,
//! scoped for objects), `{{^ path }}...{{/ path }}` (falsy block) and
//! `{{! comment }}`. Paths are dotted; `.` is the current item.

use std::collections::HashMap;

use quick_xml::escape::escape;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    dom::Document,
    error::{Result, ViewError},
};

/// Selector for template holders inside a page.
pub const TEMPLATE_SELECTOR: &str = "script.template, script[type='text/template']";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Var { path: String, escaped: bool },
    Section {
        path: String,
        inverted: bool,
        children: Vec<Token>,
    },
}

#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Vec<Token>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a page of template holders.
    pub fn from_markup(markup: &str) -> Result<Self> {
        let mut doc = Document::from_markup(markup)?;
        Self::extract_from(&mut doc)
    }

    /// Collects every template holder in `doc` and removes it from the tree.
    /// A second extraction over the same document finds nothing.
    pub fn extract_from(doc: &mut Document) -> Result<Self> {
        let mut registry = Self::new();
        for holder in doc.find_all(doc.body(), TEMPLATE_SELECTOR)? {
            match doc.attr(holder, "id").map(str::to_string) {
                Some(id) => {
                    let source = doc.text_content(holder);
                    registry.insert(&id, &source)?;
                }
                None => warn!(%holder, "template holder without id ignored"),
            }
            doc.remove_node(holder);
        }
        debug!(count = registry.len(), "templates extracted");
        Ok(registry)
    }

    pub fn insert(&mut self, id: &str, source: &str) -> Result<()> {
        let tokens = parse(source).map_err(|reason| ViewError::Template {
            id: id.to_string(),
            reason,
        })?;
        self.templates.insert(id.to_string(), tokens);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn render(&self, id: &str, data: &Value) -> Result<String> {
        let tokens = self
            .templates
            .get(id)
            .ok_or_else(|| ViewError::UnknownTemplate(id.to_string()))?;
        let mut out = String::new();
        let mut scopes = vec![data];
        render_tokens(tokens, &mut scopes, &mut out);
        Ok(out)
    }
}

fn parse(source: &str) -> std::result::Result<Vec<Token>, String> {
    let mut open: Vec<(String, bool, Vec<Token>)> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            current.push(Token::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let (tag, consumed) = match after.strip_prefix('{') {
            Some(body) => {
                let end = body.find("}}}").ok_or("unterminated `{{{`")?;
                (format!("&{}", &body[..end]), end + 4)
            }
            None => {
                let end = after.find("}}").ok_or("unterminated `{{`")?;
                (after[..end].to_string(), end + 2)
            }
        };
        rest = &after[consumed..];

        let tag = tag.trim();
        let mut chars = tag.chars();
        match chars.next() {
            Some(sigil @ ('#' | '^')) => {
                let path = chars.as_str().trim().to_string();
                if path.is_empty() {
                    return Err("section without a name".into());
                }
                open.push((path, sigil == '^', std::mem::take(&mut current)));
            }
            Some('/') => {
                let path = chars.as_str().trim();
                let (opened, inverted, parent) = open
                    .pop()
                    .ok_or_else(|| format!("`{{{{/{path}}}}}` closes nothing"))?;
                if opened != path {
                    return Err(format!("`{opened}` closed by `{path}`"));
                }
                let children = std::mem::replace(&mut current, parent);
                current.push(Token::Section {
                    path: opened,
                    inverted,
                    children,
                });
            }
            Some('!') => {}
            Some('&') => current.push(Token::Var {
                path: chars.as_str().trim().to_string(),
                escaped: false,
            }),
            Some(_) => current.push(Token::Var {
                path: tag.to_string(),
                escaped: true,
            }),
            None => return Err("empty tag".into()),
        }
    }

    if !rest.is_empty() {
        current.push(Token::Text(rest.to_string()));
    }
    if let Some((path, ..)) = open.last() {
        return Err(format!("section `{path}` is never closed"));
    }
    Ok(current)
}

fn lookup<'a>(scopes: &[&'a Value], path: &str) -> Option<&'a Value> {
    if path == "." {
        return scopes.last().copied();
    }
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut value = scopes.iter().rev().copied().find_map(|scope| scope.get(first))?;
    for part in parts {
        value = match value {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }
    Some(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(_) | Value::Object(_) => true,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_tokens<'a>(tokens: &[Token], scopes: &mut Vec<&'a Value>, out: &mut String) {
    for token in tokens {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Var { path, escaped } => {
                let text = lookup(scopes, path).map(display).unwrap_or_default();
                if *escaped {
                    out.push_str(&escape(text.as_str()));
                } else {
                    out.push_str(&text);
                }
            }
            Token::Section {
                path,
                inverted,
                children,
            } => {
                let value = lookup(scopes, path);
                let truthy = value.is_some_and(is_truthy);
                if *inverted {
                    if !truthy {
                        render_tokens(children, scopes, out);
                    }
                    continue;
                }
                if !truthy {
                    continue;
                }
                match value {
                    Some(Value::Array(items)) => {
                        for item in items {
                            scopes.push(item);
                            render_tokens(children, scopes, out);
                            scopes.pop();
                        }
                    }
                    Some(scope @ Value::Object(_)) => {
                        scopes.push(scope);
                        render_tokens(children, scopes, out);
                        scopes.pop();
                    }
                    _ => render_tokens(children, scopes, out),
                }
            }
        }
    }
}
