use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Timeout,
    Transport,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorCode::Validation,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            408 | 504 => ErrorCode::Timeout,
            _ => ErrorCode::Internal,
        }
    }
}

/// Field name the backend uses for errors not tied to one input.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Structured `field -> [messages]` errors returned for rejected writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    /// Interprets a response body as field errors. A lone `detail` message is
    /// an ordinary failure, not a validation map.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.is_empty() || (object.len() == 1 && object.contains_key("detail")) {
            return None;
        }

        let mut fields = BTreeMap::new();
        for (field, messages) in object {
            let messages = match messages {
                Value::String(message) => vec![message.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()?,
                _ => return None,
            };
            fields.insert(field.clone(), messages);
        }
        Some(Self(fields))
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.into(), vec![message.into()]);
        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    pub fn messages_for(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Flattened `field: message` lines for places without per-field display.
    pub fn summary(&self) -> String {
        self.fields()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |message| {
                    if field == NON_FIELD_ERRORS || field == "detail" {
                        message.clone()
                    } else {
                        format!("{field}: {message}")
                    }
                })
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_field_error_maps() {
        let errors = ValidationErrors::from_value(&json!({
            "name": ["This field is required."],
            "non_field_errors": "Bad combination."
        }))
        .expect("validation map");

        assert_eq!(errors.messages_for("name"), ["This field is required."]);
        assert_eq!(errors.messages_for(NON_FIELD_ERRORS), ["Bad combination."]);
        assert!(errors.messages_for("missing").is_empty());
    }

    #[test]
    fn lone_detail_is_not_a_validation_map() {
        assert!(ValidationErrors::from_value(&json!({"detail": "Not found."})).is_none());
        assert!(ValidationErrors::from_value(&json!({"name": 3})).is_none());
        assert!(ValidationErrors::from_value(&json!([])).is_none());
    }

    #[test]
    fn summary_prefixes_field_names() {
        let errors = ValidationErrors::from_value(&json!({
            "username": ["Unknown user."],
            "non_field_errors": ["Try again."]
        }))
        .expect("validation map");
        assert_eq!(errors.summary(), "Try again.; username: Unknown user.");
    }

    #[test]
    fn status_codes_map_to_error_codes() {
        assert_eq!(ErrorCode::from_status(400), ErrorCode::Validation);
        assert_eq!(ErrorCode::from_status(403), ErrorCode::Forbidden);
        assert_eq!(ErrorCode::from_status(500), ErrorCode::Internal);
    }
}
