use std::sync::{Arc, RwLock};

use base64::Engine;
use serde_json::{Value, json};

use crate::error::ToolError;

/// Base URL and Basic credential for one gateway.
///
/// Immutable once built; reconfiguring swaps in a whole new value so readers
/// never see a base URL paired with another gateway's credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    base_url: String,
    auth_header_value: String,
}

impl GatewaySession {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            auth_header_value: basic_auth_header(username, password),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_header_value(&self) -> &str {
        &self.auth_header_value
    }
}

/// Shared handle to the current [`GatewaySession`].
///
/// Cloning is cheap and every clone observes the same session.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Arc<GatewaySession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current session (last write wins) and return the
    /// confirmation payload reported to the caller.
    pub fn configure(&self, base_url: &str, username: &str, password: &str) -> Value {
        let session = Arc::new(GatewaySession::new(base_url, username, password));
        let normalized = session.base_url().to_string();
        {
            let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
            *guard = Some(session);
        }
        tracing::info!(base_url = %normalized, "gateway credentials configured");
        json!({
            "message": "Credentials set successfully",
            "base_url": normalized,
        })
    }

    /// The active session. A blank base URL counts as not configured.
    pub fn current(&self) -> Result<Arc<GatewaySession>, ToolError> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|session| !session.base_url().is_empty())
            .cloned()
            .ok_or(ToolError::NotConfigured)
    }

    pub fn is_configured(&self) -> bool {
        self.current().is_ok()
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

fn basic_auth_header(username: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_strips_trailing_slashes_and_encodes_basic_credential() {
        let store = SessionStore::new();
        let payload = store.configure("https://x/rest/apigateway/", "u", "p");

        assert_eq!(payload["message"], "Credentials set successfully");
        assert_eq!(payload["base_url"], "https://x/rest/apigateway");

        let session = store.current().expect("session should be set");
        assert_eq!(session.base_url(), "https://x/rest/apigateway");
        assert_eq!(session.auth_header_value(), "Basic dTpw");
    }

    #[test]
    fn multiple_trailing_slashes_are_all_removed() {
        let session = GatewaySession::new("http://gw:5555/rest/apigateway///", "a", "b");
        assert_eq!(session.base_url(), "http://gw:5555/rest/apigateway");
    }

    #[test]
    fn unconfigured_store_reports_credentials_not_set() {
        let store = SessionStore::new();
        assert!(!store.is_configured());
        let err = store.current().expect_err("fresh store has no session");
        assert!(matches!(err, ToolError::NotConfigured));
    }

    #[test]
    fn blank_base_url_counts_as_not_configured() {
        for blank in ["", "/", "///"] {
            let store = SessionStore::new();
            store.configure(blank, "u", "p");
            assert!(
                matches!(store.current(), Err(ToolError::NotConfigured)),
                "{blank:?} should leave the store unconfigured"
            );
        }
    }

    #[test]
    fn reconfigure_replaces_both_fields() {
        let store = SessionStore::new();
        store.configure("https://first/", "alice", "one");
        store.configure("https://second", "bob", "two");

        let session = store.current().unwrap();
        assert_eq!(session.base_url(), "https://second");
        assert_eq!(session.auth_header_value(), "Basic Ym9iOnR3bw==");
    }

    #[test]
    fn clones_share_the_same_session() {
        let store = SessionStore::new();
        let other = store.clone();
        store.configure("https://gw", "u", "p");
        assert_eq!(other.current().unwrap().base_url(), "https://gw");
    }

    #[test]
    fn independent_stores_do_not_leak() {
        let configured = SessionStore::new();
        let fresh = SessionStore::new();
        configured.configure("https://gw", "u", "p");
        assert!(!fresh.is_configured());
    }
}
