//! Backend commands queued from UI to backend worker.

use std::fmt;

use serde_json::Value;

/// Correlates a queued command with the continuation waiting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
    Login { username: String, password: String },
    Logout,
    FetchRoot,
    FetchMeta { url: String },
    List { url: String },
    Search { url: String, term: String },
    Get { url: String },
    Create { url: String, body: Value },
    Update { url: String, body: Value },
    Delete { url: String },
}

impl ApiRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ApiRequest::Login { .. } => "login",
            ApiRequest::Logout => "logout",
            ApiRequest::FetchRoot => "fetch_root",
            ApiRequest::FetchMeta { .. } => "fetch_meta",
            ApiRequest::List { .. } => "list",
            ApiRequest::Search { .. } => "search",
            ApiRequest::Get { .. } => "get",
            ApiRequest::Create { .. } => "create",
            ApiRequest::Update { .. } => "update",
            ApiRequest::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendCommand {
    pub ticket: Ticket,
    pub request: ApiRequest,
}
