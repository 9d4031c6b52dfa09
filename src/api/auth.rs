//! Admin capability gate for the control surface.
//!
//! Authentication itself lives elsewhere in the platform; this service
//! only needs an allow/deny answer plus an opaque caller identity for
//! the audit trail. [`AdminGate`] is that seam — the bundled
//! [`StaticTokenGate`] checks a configured bearer token, and the wider
//! platform substitutes its own implementation.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::app_state::AppState;
use crate::error::ServiceError;

/// Opaque identity of the authenticated caller, recorded as a job's
/// `created_by`.
#[derive(Debug, Clone)]
pub struct CallerIdentity(
    /// Display form of the identity.
    pub String,
);

/// Capability check: may this bearer token administer backfills?
pub trait AdminGate: Send + Sync + std::fmt::Debug {
    /// Returns the caller's identity when the token carries the admin
    /// capability, `None` otherwise.
    fn authorize(&self, bearer_token: Option<&str>) -> Option<CallerIdentity>;
}

/// Gate backed by a single statically configured token.
#[derive(Debug)]
pub struct StaticTokenGate {
    token: String,
    identity: String,
}

impl StaticTokenGate {
    /// Creates a gate accepting exactly `token`, attributing calls to
    /// `identity`.
    #[must_use]
    pub fn new(token: String, identity: String) -> Self {
        Self { token, identity }
    }
}

impl AdminGate for StaticTokenGate {
    fn authorize(&self, bearer_token: Option<&str>) -> Option<CallerIdentity> {
        match bearer_token {
            Some(token) if token == self.token => Some(CallerIdentity(self.identity.clone())),
            _ => None,
        }
    }
}

/// Axum middleware enforcing the admin gate on every `/api/v1` route.
///
/// On success the caller identity is inserted into request extensions
/// for handlers that record it; on failure the request is rejected with
/// a structured 401 body.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match state.admin_gate.authorize(bearer) {
        Some(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        None => ServiceError::Unauthorized.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_token_yields_identity() {
        let gate = StaticTokenGate::new("tok-1".to_string(), "admin".to_string());
        let identity = gate.authorize(Some("tok-1"));
        assert_eq!(identity.map(|i| i.0), Some("admin".to_string()));
    }

    #[test]
    fn wrong_or_missing_token_is_denied() {
        let gate = StaticTokenGate::new("tok-1".to_string(), "admin".to_string());
        assert!(gate.authorize(Some("tok-2")).is_none());
        assert!(gate.authorize(None).is_none());
    }
}
