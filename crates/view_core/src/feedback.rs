//! User-facing feedback: the page message board and form error lists.

use shared::error::{ValidationErrors, NON_FIELD_ERRORS};
use tracing::debug;

use crate::{
    dom::{Document, NodeId},
    error::Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Error,
}

impl MessageLevel {
    fn class(self) -> &'static str {
        match self {
            MessageLevel::Info => "alert alert-info",
            MessageLevel::Success => "alert alert-success",
            MessageLevel::Error => "alert alert-danger",
        }
    }
}

/// The `#messages` banner at the top of the page.
#[derive(Debug, Clone)]
pub struct MessageBoard {
    selector: String,
}

impl Default for MessageBoard {
    fn default() -> Self {
        Self::new("#messages")
    }
}

impl MessageBoard {
    pub fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
        }
    }

    fn element(&self, doc: &mut Document) -> Result<NodeId> {
        if let Some(node) = doc.find(doc.body(), &self.selector)? {
            return Ok(node);
        }
        let node = doc.create_element("div");
        if let Some(id) = self.selector.strip_prefix('#') {
            doc.set_attr(node, "id", id);
        }
        doc.set_hidden(node, true);
        let body = doc.body();
        match doc.children(body).first().copied() {
            Some(first) => doc.insert_before(body, node, first)?,
            None => doc.append_child(body, node)?,
        }
        Ok(node)
    }

    pub fn show_message(&self, doc: &mut Document, level: MessageLevel, text: &str) -> Result<()> {
        let node = self.element(doc)?;
        doc.set_attr(node, "class", level.class());
        doc.set_text(node, text)?;
        doc.set_hidden(node, false);
        debug!(?level, text, "message shown");
        Ok(())
    }

    pub fn hide_message(&self, doc: &mut Document) -> Result<()> {
        let node = self.element(doc)?;
        doc.clear_children(node)?;
        doc.set_hidden(node, true);
        Ok(())
    }

    /// Text of the visible message, if any.
    pub fn current(&self, doc: &Document) -> Option<String> {
        let node = doc.find(doc.body(), &self.selector).ok()??;
        (!doc.is_hidden(node)).then(|| doc.text_content(node))
    }
}

fn error_list(doc: &mut Document, messages: &[String]) -> Result<NodeId> {
    let list = doc.create_element("ul");
    doc.set_attr(list, "class", "errorlist");
    for message in messages {
        let item = doc.create_element("li");
        doc.set_text(item, message)?;
        doc.append_child(list, item)?;
    }
    Ok(list)
}

/// Removes error lists rendered by [`render_field_errors`] and hides the
/// catch-all container.
pub fn clear_field_errors(doc: &mut Document, form: NodeId, fallback: &str) -> Result<()> {
    for list in doc.find_all(form, "ul.errorlist")? {
        doc.remove_node(list);
    }
    if let Some(container) = doc.find(form, fallback)? {
        doc.set_hidden(container, true);
    }
    Ok(())
}

/// Shows `errors` next to the matching controls of `form`, replacing any
/// errors shown before. Messages for fields the form does not have, and
/// non-field errors, go to the container matched by `fallback`. Returns the
/// number of lists rendered.
pub fn render_field_errors(
    doc: &mut Document,
    form: NodeId,
    errors: &ValidationErrors,
    fallback: &str,
) -> Result<usize> {
    clear_field_errors(doc, form, fallback)?;
    let mut rendered = 0;

    for (field, messages) in errors.fields() {
        let control = if field == NON_FIELD_ERRORS {
            None
        } else {
            doc.find(form, &format!("[name='{field}']"))?
        };

        match control.and_then(|control| doc.parent(control).map(|parent| (parent, control))) {
            Some((parent, control)) => {
                let siblings = doc.children(parent);
                let position = siblings.iter().position(|node| *node == control);
                let anchor = match position {
                    Some(index) if index > 0 && doc.tag(siblings[index - 1]) == Some("label") => {
                        siblings[index - 1]
                    }
                    _ => control,
                };
                let list = error_list(doc, messages)?;
                doc.insert_before(parent, list, anchor)?;
            }
            None => {
                let labelled: Vec<String> = if field == NON_FIELD_ERRORS {
                    messages.to_vec()
                } else {
                    messages
                        .iter()
                        .map(|message| format!("{field}: {message}"))
                        .collect()
                };
                let list = error_list(doc, &labelled)?;
                match doc.find(form, fallback)? {
                    Some(container) => {
                        doc.append_child(container, list)?;
                        doc.set_hidden(container, false);
                    }
                    None => match doc.children(form).first().copied() {
                        Some(first) => doc.insert_before(form, list, first)?,
                        None => doc.append_child(form, list)?,
                    },
                }
            }
        }
        rendered += 1;
    }

    debug!(rendered, "validation errors rendered");
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form() -> (Document, NodeId) {
        let doc = Document::from_markup(
            r#"<form id="project-form">
                 <div class="all-error" hidden="hidden"/>
                 <div class="form-group"><label>Name</label><input name="name"/></div>
                 <div class="form-group"><input name="budget"/></div>
               </form>"#,
        )
        .expect("document");
        let form = doc.find(doc.body(), "form").expect("sel").expect("form");
        (doc, form)
    }

    #[test]
    fn errors_land_next_to_their_fields() {
        let (mut doc, form) = form();
        let errors = ValidationErrors::from_value(&json!({
            "name": ["This field is required."],
            "budget": ["A valid number is required."],
        }))
        .expect("errors");

        assert_eq!(render_field_errors(&mut doc, form, &errors, ".all-error").expect("render"), 2);

        let name_group = doc.find(form, ".form-group").expect("sel").expect("group");
        let first = doc.children(name_group)[0];
        assert!(doc.has_class(first, "errorlist"));
        assert_eq!(doc.text_content(first), "This field is required.");

        let all = doc.find(form, ".all-error").expect("sel").expect("all");
        assert!(doc.is_hidden(all));
    }

    #[test]
    fn unknown_fields_use_the_catch_all_and_rerender_replaces() {
        let (mut doc, form) = form();
        let errors = ValidationErrors::from_value(&json!({
            "non_field_errors": ["Unable to log in."],
            "owner": ["Unknown user."],
        }))
        .expect("errors");
        render_field_errors(&mut doc, form, &errors, ".all-error").expect("render");
        render_field_errors(&mut doc, form, &errors, ".all-error").expect("render");

        let all = doc.find(form, ".all-error").expect("sel").expect("all");
        assert!(!doc.is_hidden(all));
        assert_eq!(doc.find_all(form, "ul.errorlist").expect("sel").len(), 2);
        let text = doc.text_content(all);
        assert!(text.contains("Unable to log in."));
        assert!(text.contains("owner: Unknown user."));

        clear_field_errors(&mut doc, form, ".all-error").expect("clear");
        assert!(doc.find(form, "ul.errorlist").expect("sel").is_none());
        assert!(doc.is_hidden(all));
    }

    #[test]
    fn message_board_creates_and_hides_the_banner() {
        let mut doc = Document::new();
        let board = MessageBoard::default();
        board
            .show_message(&mut doc, MessageLevel::Error, "Server unreachable")
            .expect("show");
        assert_eq!(board.current(&doc).as_deref(), Some("Server unreachable"));
        board.hide_message(&mut doc).expect("hide");
        assert_eq!(board.current(&doc), None);
    }
}
