//! Header hooks run on every outgoing request.

use std::sync::RwLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, SET_COOKIE},
    Method,
};
use tracing::{debug, warn};
use url::Url;

pub trait PreSendHook: Send + Sync {
    fn before_send(&self, method: &Method, url: &Url, headers: &mut HeaderMap);

    fn after_response(&self, _headers: &HeaderMap) {}
}

pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Copies the anti-forgery cookie into a request header on unsafe methods.
pub struct CsrfTokenHook {
    cookie_name: String,
    header_name: HeaderName,
    token: RwLock<Option<String>>,
}

impl CsrfTokenHook {
    pub fn new(cookie_name: &str, header_name: &str) -> Self {
        let header_name = HeaderName::from_bytes(header_name.as_bytes()).unwrap_or_else(|_| {
            warn!(header_name, "invalid csrf header name, using x-csrftoken");
            HeaderName::from_static("x-csrftoken")
        });
        Self {
            cookie_name: cookie_name.to_string(),
            header_name,
            token: RwLock::new(None),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|slot| slot.clone())
    }

    fn cookie_value(&self, set_cookie: &str) -> Option<String> {
        let pair = set_cookie.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        (name.trim() == self.cookie_name).then(|| value.trim().to_string())
    }
}

impl PreSendHook for CsrfTokenHook {
    fn before_send(&self, method: &Method, _url: &Url, headers: &mut HeaderMap) {
        if is_safe_method(method) {
            return;
        }
        let Some(token) = self.token() else {
            return;
        };
        match HeaderValue::from_str(&token) {
            Ok(value) => {
                headers.insert(self.header_name.clone(), value);
            }
            Err(_) => warn!("csrf token is not a valid header value"),
        }
    }

    fn after_response(&self, headers: &HeaderMap) {
        let captured = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|cookie| self.cookie_value(cookie));
        if let Some(token) = captured {
            debug!(cookie = %self.cookie_name, "csrf token refreshed");
            self.set_token(Some(token));
        }
    }
}

/// Sends HTTP basic credentials once a login has been attempted.
#[derive(Default)]
pub struct BasicAuthHook {
    header: RwLock<Option<HeaderValue>>,
}

impl BasicAuthHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_credentials(&self, username: &str, password: &str) {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        let value = HeaderValue::from_str(&format!("Basic {encoded}")).ok().map(|mut value| {
            value.set_sensitive(true);
            value
        });
        if let Ok(mut slot) = self.header.write() {
            *slot = value;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.header.write() {
            *slot = None;
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.header.read().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl PreSendHook for BasicAuthHook {
    fn before_send(&self, _method: &Method, _url: &Url, headers: &mut HeaderMap) {
        if let Some(value) = self.header.read().ok().and_then(|slot| slot.clone()) {
            headers.insert(AUTHORIZATION, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("http://api.test/api/projects/").expect("url")
    }

    #[test]
    fn csrf_header_only_on_unsafe_methods() {
        let hook = CsrfTokenHook::new("csrftoken", "X-CSRFToken");
        hook.set_token(Some("abc".into()));

        let mut headers = HeaderMap::new();
        hook.before_send(&Method::GET, &url(), &mut headers);
        hook.before_send(&Method::OPTIONS, &url(), &mut headers);
        assert!(headers.is_empty());

        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            let mut headers = HeaderMap::new();
            hook.before_send(&method, &url(), &mut headers);
            assert_eq!(headers.get("x-csrftoken").and_then(|v| v.to_str().ok()), Some("abc"));
        }
    }

    #[test]
    fn csrf_token_is_captured_from_set_cookie() {
        let hook = CsrfTokenHook::new("csrftoken", "X-CSRFToken");
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("sessionid=s1; HttpOnly"));
        headers.append(SET_COOKIE, HeaderValue::from_static("csrftoken=t0k3n; Path=/"));
        hook.after_response(&headers);
        assert_eq!(hook.token().as_deref(), Some("t0k3n"));
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let hook = BasicAuthHook::new();
        let mut headers = HeaderMap::new();
        hook.before_send(&Method::GET, &url(), &mut headers);
        assert!(headers.get(AUTHORIZATION).is_none());

        hook.set_credentials("ann", "secret");
        hook.before_send(&Method::GET, &url(), &mut headers);
        assert_eq!(
            headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Basic YW5uOnNlY3JldA==")
        );

        hook.clear();
        assert!(!hook.has_credentials());
    }
}
