use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const APP_ID_VAR: &str = "CHAT_APP_ID";
pub const BACKEND_CONFIG_VAR: &str = "CHAT_BACKEND_CONFIG";
pub const AUTH_TOKEN_VAR: &str = "CHAT_AUTH_TOKEN";

pub const DEFAULT_APP_ID: &str = "default-app-id";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Field the message feed is ordered by.
pub const ORDER_FIELD: &str = "createdAt";

/// Connection descriptor for the document backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendDescriptor {
    /// Base URL of the HTTP backend. `None` selects the in-process store.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for BackendDescriptor {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl BackendDescriptor {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub app_id: String,
    pub backend: BackendDescriptor,
    /// Pre-issued credential; anonymous sign-in when absent.
    pub auth_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            backend: BackendDescriptor::default(),
            auth_token: None,
        }
    }
}

impl AppConfig {
    pub fn messages_collection(&self) -> String {
        format!("artifacts/{}/public/data/messages", self.app_id)
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> AppConfig {
    load_config_from(|key| std::env::var(key).ok())
}

/// Load configuration through `lookup`; blank values count as unset.
pub fn load_config_from(lookup: impl Fn(&str) -> Option<String>) -> AppConfig {
    let get = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let app_id = get(APP_ID_VAR).unwrap_or_else(|| DEFAULT_APP_ID.to_string());

    let backend = match get(BACKEND_CONFIG_VAR) {
        Some(raw) => match serde_json::from_str::<BackendDescriptor>(&raw) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                log::warn!("Failed to parse {BACKEND_CONFIG_VAR} ({err}); using defaults");
                BackendDescriptor::default()
            }
        },
        None => {
            log::info!("{BACKEND_CONFIG_VAR} not set; using the in-process store");
            BackendDescriptor::default()
        }
    };

    AppConfig {
        app_id,
        backend,
        auth_token: get(AUTH_TOKEN_VAR),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = load_config_from(lookup(&[]));

        assert_eq!(config, AppConfig::default());
        assert_eq!(
            config.messages_collection(),
            "artifacts/default-app-id/public/data/messages"
        );
    }

    #[test]
    fn reads_all_variables() {
        let config = load_config_from(lookup(&[
            (APP_ID_VAR, "team-chat"),
            (
                BACKEND_CONFIG_VAR,
                r#"{"endpoint":"https://chat.example.com","apiKey":"k-1","requestTimeoutSecs":5}"#,
            ),
            (AUTH_TOKEN_VAR, "tok-123"),
        ]));

        assert_eq!(config.app_id, "team-chat");
        assert_eq!(
            config.backend.endpoint.as_deref(),
            Some("https://chat.example.com")
        );
        assert_eq!(config.backend.api_key.as_deref(), Some("k-1"));
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.auth_token.as_deref(), Some("tok-123"));
    }

    #[test]
    fn malformed_backend_config_falls_back_to_defaults() {
        let config = load_config_from(lookup(&[(BACKEND_CONFIG_VAR, "{not json")]));

        assert_eq!(config.backend, BackendDescriptor::default());
    }

    #[test]
    fn blank_token_counts_as_absent() {
        let config = load_config_from(lookup(&[(AUTH_TOKEN_VAR, "   ")]));

        assert!(config.auth_token.is_none());
    }

    #[test]
    fn partial_descriptor_keeps_default_timeout() {
        let config = load_config_from(lookup(&[(
            BACKEND_CONFIG_VAR,
            r#"{"endpoint":"http://localhost:8080"}"#,
        )]));

        assert_eq!(
            config.backend.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS
        );
        assert!(config.backend.api_key.is_none());
    }
}
