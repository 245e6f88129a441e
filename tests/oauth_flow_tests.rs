// SPDX-License-Identifier: MIT

//! OAuth handshake tests: state lifecycle and callback handling.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;
use training_journal::error::AppError;
use training_journal::models::OAuthState;

use common::{create_test_app, test_cipher};

/// Pull the `state` query parameter out of an authorization URL.
fn extract_state(auth_url: &str) -> String {
    auth_url
        .split('&')
        .find_map(|part| part.strip_prefix("state="))
        .expect("state param")
        .to_string()
}

#[tokio::test]
async fn test_initiate_returns_authorization_url_with_state() {
    let app = create_test_app("https://api.prod.whoop.com").await;

    let url = app
        .state
        .whoop
        .initiate_oauth(1, "https://journal.example/auth/whoop/callback")
        .await
        .unwrap();

    assert!(url.starts_with("https://api.prod.whoop.com/oauth/oauth2/auth?"));
    assert!(url.contains("client_id=test_client_id"));
    assert!(url.contains("scope=offline%20read"));

    // The state it carries is persisted and consumable exactly once
    let state = extract_state(&url);
    let stored = app.state.db.consume_oauth_state(&state).await.unwrap();
    assert_eq!(stored.unwrap().user_id, 1);
}

#[tokio::test]
async fn test_oauth_state_is_single_use() {
    let app = create_test_app("https://api.prod.whoop.com").await;

    let state = OAuthState {
        state: "opaque-state-token".to_string(),
        user_id: 7,
        expires_at: Utc::now() + Duration::minutes(10),
    };
    app.state.db.create_oauth_state(&state).await.unwrap();

    let first = app.state.db.consume_oauth_state("opaque-state-token").await.unwrap();
    let second = app.state.db.consume_oauth_state("opaque-state-token").await.unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_validation_error() {
    let app = create_test_app("https://api.prod.whoop.com").await;

    let err = app
        .state
        .whoop
        .handle_callback("code", "never-issued", "https://journal.example/cb")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_callback_with_expired_state_fails_and_still_consumes() {
    let app = create_test_app("https://api.prod.whoop.com").await;

    let state = OAuthState {
        state: "expired-state".to_string(),
        user_id: 7,
        expires_at: Utc::now() - Duration::minutes(1),
    };
    app.state.db.create_oauth_state(&state).await.unwrap();

    let err = app
        .state
        .whoop
        .handle_callback("code", "expired-state", "https://journal.example/cb")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Consumed despite failing validation
    let gone = app.state.db.consume_oauth_state("expired-state").await.unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_callback_exchanges_code_and_stores_encrypted_connection() {
    let mut server = mockito::Server::new_async().await;

    let token_mock = server
        .mock("POST", "/oauth/oauth2/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": "fresh-access",
                "refresh_token": "fresh-refresh",
                "expires_in": 3600,
                "scope": "offline read:workout"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let profile_mock = server
        .mock("GET", "/developer/v2/user/profile/basic")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "user_id": 4242,
                "email": "athlete@example.com",
                "first_name": "Alex",
                "last_name": "Example"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let app = create_test_app(&server.url()).await;

    let state = OAuthState {
        state: "good-state".to_string(),
        user_id: 7,
        expires_at: Utc::now() + Duration::minutes(10),
    };
    app.state.db.create_oauth_state(&state).await.unwrap();

    let summary = app
        .state
        .whoop
        .handle_callback("auth-code", "good-state", "https://journal.example/cb")
        .await
        .unwrap();

    token_mock.assert_async().await;
    profile_mock.assert_async().await;

    assert_eq!(summary.whoop_user_id, 4242);

    // Stored tokens are ciphertext that decrypts back to the originals
    let connection = app.state.db.get_connection(7).await.unwrap().unwrap();
    assert_ne!(connection.access_token_encrypted, "fresh-access");
    assert_ne!(connection.refresh_token_encrypted, "fresh-refresh");

    let cipher = test_cipher();
    assert_eq!(cipher.decrypt(&connection.access_token_encrypted).unwrap(), "fresh-access");
    assert_eq!(cipher.decrypt(&connection.refresh_token_encrypted).unwrap(), "fresh-refresh");
    assert!(connection.is_active);
}
