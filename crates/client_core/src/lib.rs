use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, Method};
use serde_json::Value;
use shared::{
    domain::ResourceKind,
    error::ValidationErrors,
    protocol::{list_records, LoginResponse, LogoutResponse, ResourceMeta, RootApi},
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

pub mod error;
pub mod hooks;
pub mod settings;

pub use error::ClientError;
pub use hooks::{BasicAuthHook, CsrfTokenHook, PreSendHook};
pub use settings::{load_settings, ClientSettings};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub authenticated: bool,
    pub username: String,
    pub fullname: String,
    pub href: String,
}

/// Operations the application needs from the inventory backend.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse>;
    async fn logout(&self) -> Result<LogoutResponse>;
    async fn fetch_root(&self) -> Result<RootApi>;
    async fn fetch_meta(&self, url: &str) -> Result<ResourceMeta>;
    async fn list(&self, url: &str) -> Result<Vec<Value>>;
    async fn search(&self, url: &str, term: &str) -> Result<Vec<Value>>;
    async fn get(&self, url: &str) -> Result<Value>;
    async fn create(&self, url: &str, body: &Value) -> Result<Value>;
    async fn update(&self, url: &str, body: &Value) -> Result<Value>;
    async fn delete(&self, url: &str) -> Result<()>;
}

#[derive(Default)]
struct ClientState {
    session: Session,
    root: Option<RootApi>,
}

pub struct InventoryClient {
    http: Client,
    settings: ClientSettings,
    csrf: Arc<CsrfTokenHook>,
    basic_auth: Arc<BasicAuthHook>,
    hooks: Vec<Arc<dyn PreSendHook>>,
    state: RwLock<ClientState>,
}

impl InventoryClient {
    pub fn new(settings: ClientSettings) -> Self {
        let csrf = Arc::new(CsrfTokenHook::new(
            &settings.csrf_cookie_name,
            &settings.csrf_header_name,
        ));
        let basic_auth = Arc::new(BasicAuthHook::new());
        let hooks: Vec<Arc<dyn PreSendHook>> = vec![basic_auth.clone(), csrf.clone()];
        Self {
            http: Client::new(),
            settings,
            csrf,
            basic_auth,
            hooks,
            state: RwLock::new(ClientState::default()),
        }
    }

    /// Adds a hook that runs after the built-in authentication and CSRF hooks.
    pub fn with_hook(mut self, hook: Arc<dyn PreSendHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn csrf(&self) -> &CsrfTokenHook {
        &self.csrf
    }

    pub async fn session(&self) -> Session {
        self.state.read().await.session.clone()
    }

    pub async fn root(&self) -> Option<RootApi> {
        self.state.read().await.root.clone()
    }

    pub async fn resource_url(&self, kind: ResourceKind) -> Result<String> {
        let (group, name) = kind.root_endpoint();
        self.state
            .read()
            .await
            .root
            .as_ref()
            .and_then(|root| root.resource_endpoint(kind))
            .map(str::to_string)
            .ok_or_else(|| ClientError::MissingEndpoint(format!("{group}.{name}")))
    }

    /// Sends one JSON request through the hook pipeline. Empty bodies come
    /// back as `Value::Null`.
    pub async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let parsed = Url::parse(url).map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
        let mut headers = HeaderMap::new();
        for hook in &self.hooks {
            hook.before_send(&method, &parsed, &mut headers);
        }

        let mut request = self.http.request(method.clone(), parsed).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let secs = self.settings.request_timeout_secs;
        let response = match tokio::time::timeout(Duration::from_secs(secs), request.send()).await
        {
            Err(_) => {
                warn!(%method, url, secs, "request timed out");
                return Err(ClientError::Timeout {
                    url: url.to_string(),
                    secs,
                });
            }
            Ok(Err(source)) => {
                warn!(%method, url, "request failed: {source}");
                return Err(ClientError::Transport {
                    url: url.to_string(),
                    source,
                });
            }
            Ok(Ok(response)) => response,
        };

        for hook in &self.hooks {
            hook.after_response(response.headers());
        }

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;
        debug!(%method, url, status = status.as_u16(), len = bytes.len(), "response received");

        let payload = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => value,
                Err(err) if status.is_success() => {
                    return Err(ClientError::Decode {
                        url: url.to_string(),
                        reason: err.to_string(),
                    })
                }
                Err(_) => Value::String(String::from_utf8_lossy(&bytes).trim().to_string()),
            }
        };

        if status.is_success() {
            return Ok(payload);
        }
        if let Some(errors) = ValidationErrors::from_value(&payload) {
            return Err(ClientError::Validation(errors));
        }
        let detail = match &payload {
            Value::Object(object) => object.get("detail").and_then(Value::as_str).map(str::to_string),
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            _ => None,
        }
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(ClientError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            detail,
        })
    }

    fn decode<T: serde::de::DeserializeOwned>(url: &str, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|err| ClientError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }

    async fn logout_url(&self) -> String {
        self.state
            .read()
            .await
            .root
            .as_ref()
            .and_then(|root| root.endpoint("accounts", "logout"))
            .map(str::to_string)
            .unwrap_or_else(|| self.settings.logout_url.clone())
    }
}

#[async_trait]
impl InventoryApi for InventoryClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        self.basic_auth.set_credentials(username, password);
        let url = self.settings.login_url.clone();
        let body = match self
            .request(Method::POST, &url, Some(&Value::Object(Default::default())))
            .await
        {
            Ok(body) => body,
            Err(err) => {
                self.basic_auth.clear();
                return Err(err);
            }
        };
        let response: LoginResponse = Self::decode(&url, body)?;

        let mut state = self.state.write().await;
        state.session = Session {
            authenticated: true,
            username: username.to_string(),
            fullname: response.fullname.clone(),
            href: response.href.clone(),
        };
        info!(username, fullname = %response.fullname, "logged in");
        Ok(response)
    }

    async fn logout(&self) -> Result<LogoutResponse> {
        if !self.state.read().await.session.authenticated {
            return Err(ClientError::NotAuthenticated);
        }
        let url = self.logout_url().await;
        let body = self.request(Method::POST, &url, None).await?;
        let response: LogoutResponse = if body.is_null() {
            LogoutResponse::default()
        } else {
            Self::decode(&url, body)?
        };

        self.basic_auth.clear();
        let mut state = self.state.write().await;
        info!(username = %state.session.username, "logged out");
        *state = ClientState::default();
        Ok(response)
    }

    async fn fetch_root(&self) -> Result<RootApi> {
        let url = self.settings.api_root.clone();
        let body = self.request(Method::GET, &url, None).await?;
        let root = RootApi::from_value(&body).ok_or_else(|| ClientError::Decode {
            url: url.clone(),
            reason: "missing `collection` document".into(),
        })?;
        debug!(version = %root.version, groups = root.groups.len(), "api root loaded");
        self.state.write().await.root = Some(root.clone());
        Ok(root)
    }

    async fn fetch_meta(&self, url: &str) -> Result<ResourceMeta> {
        let body = self.request(Method::OPTIONS, url, None).await?;
        Ok(ResourceMeta::from_value(&body))
    }

    async fn list(&self, url: &str) -> Result<Vec<Value>> {
        let body = self.request(Method::GET, url, None).await?;
        Ok(list_records(body))
    }

    async fn search(&self, url: &str, term: &str) -> Result<Vec<Value>> {
        let mut parsed = Url::parse(url).map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
        parsed.query_pairs_mut().append_pair("search", term);
        self.list(parsed.as_str()).await
    }

    async fn get(&self, url: &str) -> Result<Value> {
        self.request(Method::GET, url, None).await
    }

    async fn create(&self, url: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, url, Some(body)).await
    }

    async fn update(&self, url: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, url, Some(body)).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.request(Method::DELETE, url, None).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
