//! Backend-to-UI events and error modeling for the controller layer.

use client_core::ClientError;
use serde_json::Value;
use shared::{
    error::{ErrorCode, ValidationErrors},
    protocol::{LoginResponse, LogoutResponse, ResourceMeta, RootApi},
};

use crate::backend_bridge::commands::Ticket;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply {
    Login(LoginResponse),
    Logout(LogoutResponse),
    Root(RootApi),
    Meta(ResourceMeta),
    Records(Vec<Value>),
    Record(Value),
    Deleted,
}

impl ApiReply {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiReply::Login(_) => "login",
            ApiReply::Logout(_) => "logout",
            ApiReply::Root(_) => "root",
            ApiReply::Meta(_) => "meta",
            ApiReply::Records(_) => "records",
            ApiReply::Record(_) => "record",
            ApiReply::Deleted => "deleted",
        }
    }
}

pub type Outcome = Result<ApiReply, UiError>;

#[derive(Debug)]
pub enum UiEvent {
    Info(String),
    Error(UiError),
    Completed { ticket: Ticket, outcome: Outcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Login,
    Logout,
    Load,
    Save,
    Delete,
    General,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
    validation: Option<ValidationErrors>,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("401")
            || message_lower.contains("403")
            || message_lower.contains("unauthorized")
            || message_lower.contains("forbidden")
            || message_lower.contains("not authenticated")
            || message_lower.contains("invalid credential")
        {
            UiErrorCategory::Auth
        } else if message_lower.contains("timed out")
            || message_lower.contains("timeout")
            || message_lower.contains("connection")
            || message_lower.contains("network")
            || message_lower.contains("transport")
            || message_lower.contains("unavailable")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else if message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("malformed")
        {
            UiErrorCategory::Validation
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
            validation: None,
        }
    }

    pub fn from_client_error(context: UiErrorContext, err: &ClientError) -> Self {
        let category = match err.code() {
            ErrorCode::Validation if err.is_validation() => UiErrorCategory::Validation,
            ErrorCode::Unauthorized | ErrorCode::Forbidden => UiErrorCategory::Auth,
            ErrorCode::Transport | ErrorCode::Timeout => UiErrorCategory::Transport,
            _ => UiErrorCategory::Unknown,
        };
        Self {
            category,
            context,
            message: err.to_string(),
            validation: err.validation().cloned(),
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn validation(&self) -> Option<&ValidationErrors> {
        self.validation.as_ref()
    }

    /// Text for the message board.
    pub fn user_message(&self) -> String {
        match (self.context, self.category) {
            (UiErrorContext::BackendStartup, _) => {
                "Backend worker startup failure; verify local app environment and retry.".to_string()
            }
            (_, UiErrorCategory::Transport) => {
                "Server unreachable; check the API URL/network and retry.".to_string()
            }
            (_, UiErrorCategory::Auth) => format!("Please log in again: {}", self.message),
            (UiErrorContext::Load, _) => format!("Error: Could not get data from API. {}", self.message),
            _ => format!("Error: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_backend_command_processor_disconnect_as_transport_error() {
        let err = UiError::from_message(
            UiErrorContext::General,
            "Backend command processor disconnected (possible startup/runtime failure)",
        );
        assert_eq!(err.category(), UiErrorCategory::Transport);
        assert!(!err.requires_reauth());
    }

    #[test]
    fn typed_client_errors_keep_validation_maps() {
        let errors = ValidationErrors::single("name", "This field is required.");
        let err = UiError::from_client_error(
            UiErrorContext::Save,
            &ClientError::Validation(errors.clone()),
        );
        assert_eq!(err.category(), UiErrorCategory::Validation);
        assert_eq!(err.validation(), Some(&errors));

        let err = UiError::from_client_error(
            UiErrorContext::Load,
            &ClientError::Status {
                url: "http://api.test/api/".into(),
                status: 403,
                detail: "Authentication credentials were not provided.".into(),
            },
        );
        assert!(err.requires_reauth());
    }

    #[test]
    fn timeouts_read_as_unreachable_server() {
        let err = UiError::from_client_error(
            UiErrorContext::Load,
            &ClientError::Timeout {
                url: "http://api.test/api/projects/".into(),
                secs: 15,
            },
        );
        assert_eq!(err.category(), UiErrorCategory::Transport);
        assert_eq!(
            err.user_message(),
            "Server unreachable; check the API URL/network and retry."
        );
    }
}
