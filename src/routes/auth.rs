// SPDX-License-Identifier: MIT

//! WHOOP OAuth authentication routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::AppState;

/// Public routes: the provider redirects here without a journal session.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/whoop/callback", get(auth_callback))
}

/// Authenticated routes: starting the handshake needs a known user.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/whoop", get(auth_start))
}

/// Derive this service's callback URL from the request Host header.
fn callback_url(headers: &axum::http::HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            std::env::var("API_HOST").unwrap_or_else(|_| "localhost:8080".to_string())
        });

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}/auth/whoop/callback", scheme, host)
}

/// Start the OAuth flow - redirect to WHOOP authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: axum::http::HeaderMap,
) -> Result<Redirect> {
    let redirect_uri = callback_url(&headers);
    let auth_url = state
        .whoop
        .initiate_oauth(user.user_id, &redirect_uri)
        .await?;

    tracing::info!(user_id = user.user_id, "Redirecting to WHOOP authorization");
    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - validate state, exchange code, store the connection.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    // User declined or the provider reported an error
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from WHOOP");
        let redirect = format!("{}/settings/integrations?whoop_error={}", state.config.frontend_url, error);
        return Ok(Redirect::temporary(&redirect));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;
    let oauth_state = params
        .state
        .ok_or_else(|| AppError::Validation("Missing state parameter".to_string()))?;

    let redirect_uri = callback_url(&headers);
    let summary = state
        .whoop
        .handle_callback(&code, &oauth_state, &redirect_uri)
        .await?;

    tracing::info!(
        whoop_user_id = summary.whoop_user_id,
        "WHOOP connected, redirecting to frontend"
    );

    let redirect = format!(
        "{}/settings/integrations?whoop=connected",
        state.config.frontend_url
    );
    Ok(Redirect::temporary(&redirect))
}
