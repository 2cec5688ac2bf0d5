use crate::backend::ChatBackend;

/// Identity state for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Ready { user_id: String },
    /// Startup finished without a usable identity.
    Degraded { reason: String },
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            SessionState::Ready { user_id } => Some(user_id),
            _ => None,
        }
    }
}

/// Resolve the session identity. Always returns, never `Loading`.
pub async fn bootstrap(backend: &dyn ChatBackend, credential: Option<&str>) -> SessionState {
    let mode = if credential.is_some() {
        "supplied credential"
    } else {
        "anonymous identity"
    };
    log::info!("Signing in with {mode}");

    match backend.authenticate(credential).await {
        Ok(user_id) if !user_id.trim().is_empty() => {
            log::info!("Session ready for user {user_id}");
            SessionState::Ready { user_id }
        }
        Ok(_) => {
            log::error!("Backend returned an empty identity");
            SessionState::Degraded {
                reason: "backend returned an empty identity".to_string(),
            }
        }
        Err(err) => {
            log::error!("Sign-in failed: {err}");
            SessionState::Degraded {
                reason: err.to_string(),
            }
        }
    }
}
