// SPDX-License-Identifier: MIT

//! WHOOP API client and token lifecycle management.
//!
//! Handles:
//! - OAuth authorize/callback handshake with single-use CSRF state
//! - Token refresh when expiring (5-minute margin, serialized per user)
//! - Paginated collection listings (workouts, cycles, recovery, sleep)
//! - Best-effort revocation on disconnect

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Per-call HTTP timeout for all WHOOP requests.
const HTTP_TIMEOUT_SECS: u64 = 30;

/// OAuth scopes requested during the handshake.
pub const OAUTH_SCOPES: &str =
    "offline read:profile read:workout read:recovery read:sleep read:cycles";

/// WHOOP API client.
#[derive(Clone)]
pub struct WhoopClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl WhoopClient {
    /// Create a new WHOOP client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            client_id,
            client_secret,
        }
    }

    /// The provider authorization URL for the OAuth redirect.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}/oauth/oauth2/auth?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.base_url,
            self.client_id,
            urlencoding::encode(redirect_uri),
            urlencoding::encode(OAUTH_SCOPES),
            state
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/oauth/oauth2/token", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| AppError::WhoopApi(format!("Token exchange failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Refresh an expiring access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/oauth/oauth2/token", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
                ("scope", "offline"),
            ])
            .send()
            .await
            .map_err(|e| AppError::WhoopApi(format!("Token refresh request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Revoke the user's grant at WHOOP.
    ///
    /// Invalidates the access and refresh tokens and removes the app from
    /// the user's WHOOP settings.
    pub async fn revoke(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/oauth/oauth2/revoke", self.base_url))
            .form(&[("token", access_token)])
            .send()
            .await
            .map_err(|e| AppError::WhoopApi(format!("Revocation request failed: {}", e)))?;

        self.check_response(response).await?;
        tracing::info!("WHOOP revocation successful");
        Ok(())
    }

    /// Get the authenticated user's profile.
    pub async fn get_profile(&self, access_token: &str) -> Result<WhoopProfile, AppError> {
        let url = format!("{}/developer/v2/user/profile/basic", self.base_url);
        self.get_json(&url, access_token, &[]).await
    }

    /// List one page of workouts inside a window.
    ///
    /// Records come back as raw JSON so the full payload can be cached for
    /// forward compatibility; callers parse the typed fields they need.
    pub async fn list_workouts(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<Page<serde_json::Value>, AppError> {
        let url = format!("{}/developer/v2/activity/workout", self.base_url);
        self.get_page(&url, access_token, start, end, next_token)
            .await
    }

    /// List one page of physiological cycles inside a window.
    pub async fn list_cycles(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<Page<serde_json::Value>, AppError> {
        let url = format!("{}/developer/v2/cycle", self.base_url);
        self.get_page(&url, access_token, start, end, next_token)
            .await
    }

    /// List one page of recovery scores inside a window.
    pub async fn list_recoveries(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<Page<serde_json::Value>, AppError> {
        let url = format!("{}/developer/v2/recovery", self.base_url);
        self.get_page(&url, access_token, start, end, next_token)
            .await
    }

    /// List one page of sleep activities inside a window.
    pub async fn list_sleeps(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<Page<serde_json::Value>, AppError> {
        let url = format!("{}/developer/v2/activity/sleep", self.base_url);
        self.get_page(&url, access_token, start, end, next_token)
            .await
    }

    /// Windowed, cursor-following page fetch shared by all collections.
    async fn get_page(
        &self,
        url: &str,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<Page<serde_json::Value>, AppError> {
        let mut query: Vec<(&str, String)> = vec![
            ("start", crate::time_utils::format_utc_rfc3339(start)),
            ("end", crate::time_utils::format_utc_rfc3339(end)),
            ("limit", "25".to_string()),
        ];
        if let Some(token) = next_token {
            query.push(("nextToken", token.to_string()));
        }
        self.get_json(url, access_token, &query).await
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::WhoopApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<(), AppError> {
        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!("WHOOP rate limit hit (429)");
        }

        if status.as_u16() == 401 {
            return Err(AppError::WhoopApi(AppError::WHOOP_TOKEN_ERROR.to_string()));
        }

        Err(AppError::WhoopApi(format!("HTTP {}: {}", status, body)))
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("WHOOP rate limit hit (429)");
            }

            if status.as_u16() == 401 {
                return Err(AppError::WhoopApi(AppError::WHOOP_TOKEN_ERROR.to_string()));
            }

            return Err(AppError::WhoopApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::WhoopApi(format!("JSON parse error: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// Token endpoint response (exchange and refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::seconds(self.expires_in)
    }
}

/// Basic profile response.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoopProfile {
    pub user_id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// One page of a paginated collection listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// A workout activity record.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoopWorkout {
    pub id: String,
    pub user_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local offset of where the workout happened, e.g. "-08:00"
    #[serde(default)]
    pub timezone_offset: Option<String>,
    #[serde(default)]
    pub sport_id: Option<i64>,
    #[serde(default)]
    pub sport_name: Option<String>,
    #[serde(default)]
    pub score: Option<WorkoutScore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkoutScore {
    #[serde(default)]
    pub strain: Option<f64>,
    #[serde(default)]
    pub average_heart_rate: Option<i64>,
    #[serde(default)]
    pub max_heart_rate: Option<i64>,
    #[serde(default)]
    pub kilojoule: Option<f64>,
    #[serde(default)]
    pub calories: Option<i64>,
    #[serde(default, alias = "zone_duration")]
    pub zone_durations: Option<crate::models::ZoneDurations>,
}

/// A physiological cycle record.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoopCycle {
    pub id: i64,
    pub user_id: i64,
    pub start: DateTime<Utc>,
    /// Absent while the cycle is in progress
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// A recovery score record, keyed to its cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoopRecovery {
    pub cycle_id: i64,
    #[serde(default)]
    pub sleep_id: Option<String>,
    pub user_id: i64,
    #[serde(default)]
    pub score: Option<RecoveryScore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryScore {
    #[serde(default)]
    pub recovery_score: Option<f64>,
    #[serde(default)]
    pub resting_heart_rate: Option<f64>,
    #[serde(default)]
    pub hrv_rmssd_milli: Option<f64>,
    #[serde(default)]
    pub spo2_percentage: Option<f64>,
    #[serde(default)]
    pub skin_temp_celsius: Option<f64>,
}

/// A sleep activity record.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoopSleep {
    pub id: String,
    pub user_id: i64,
    #[serde(default)]
    pub score: Option<SleepScore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleepScore {
    #[serde(default)]
    pub sleep_performance_percentage: Option<f64>,
    #[serde(default)]
    pub stage_summary: Option<SleepStageSummary>,
    #[serde(default)]
    pub sleep_needed: Option<SleepNeeded>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleepStageSummary {
    #[serde(default)]
    pub total_in_bed_time_milli: Option<i64>,
    #[serde(default)]
    pub total_awake_time_milli: Option<i64>,
    #[serde(default)]
    pub total_light_sleep_time_milli: Option<i64>,
    #[serde(default)]
    pub total_slow_wave_sleep_time_milli: Option<i64>,
    #[serde(default)]
    pub total_rem_sleep_time_milli: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleepNeeded {
    #[serde(default)]
    pub baseline_milli: Option<i64>,
    #[serde(default)]
    pub need_from_sleep_debt_milli: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// WhoopService - token vault and OAuth flow manager
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::Db;
use crate::models::{ConnectionSummary, OAuthState, WhoopConnection};
use crate::services::crypto::{self, TokenCipher};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
///
/// Avoids the race between "valid at read time" and "expired at use time".
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// OAuth state tokens expire after 10 minutes.
const OAUTH_STATE_TTL_SECS: i64 = 10 * 60;

/// Shared per-user refresh locks.
pub type RefreshLocks = Arc<DashMap<i64, Arc<Mutex<()>>>>;

/// High-level WHOOP service that manages the token lifecycle.
///
/// This service encapsulates:
/// - OAuth initiate/callback handling with single-use CSRF state
/// - Token retrieval and decryption from the connection store
/// - Automatic refresh when expiring (5-minute margin)
/// - Per-user locking so concurrent requests never race a refresh
/// - Disconnect with best-effort provider revocation
#[derive(Clone)]
pub struct WhoopService {
    client: WhoopClient,
    db: Db,
    cipher: TokenCipher,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
}

impl WhoopService {
    pub fn new(client: WhoopClient, db: Db, cipher: TokenCipher) -> Self {
        Self {
            client,
            db,
            cipher,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn client(&self) -> &WhoopClient {
        &self.client
    }

    // ─── OAuth Flow ──────────────────────────────────────────────

    /// Start the OAuth handshake: persist a fresh single-use state token
    /// and return the provider authorization URL.
    pub async fn initiate_oauth(
        &self,
        user_id: i64,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        // Housekeeping: expired states are already unusable, drop them
        if let Err(e) = self.db.prune_expired_oauth_states(Utc::now()).await {
            tracing::warn!(error = %e, "Failed to prune expired OAuth states");
        }

        let state = OAuthState {
            state: crypto::random_state_token()?,
            user_id,
            expires_at: Utc::now() + chrono::Duration::seconds(OAUTH_STATE_TTL_SECS),
        };
        self.db.create_oauth_state(&state).await?;

        tracing::info!(user_id, "OAuth flow initiated");
        Ok(self.client.authorize_url(redirect_uri, &state.state))
    }

    /// Complete the handshake: validate and consume the state token,
    /// exchange the code, fetch the profile, and store the connection
    /// with both tokens encrypted.
    pub async fn handle_callback(
        &self,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<ConnectionSummary, AppError> {
        // Consumed on first read, valid or not
        let stored = self
            .db
            .consume_oauth_state(state)
            .await?
            .ok_or_else(|| AppError::Validation("Unknown or already used state".to_string()))?;

        if stored.expires_at < Utc::now() {
            return Err(AppError::Validation("Authorization expired".to_string()));
        }

        let tokens = self.client.exchange_code(code, redirect_uri).await?;
        let profile = self.client.get_profile(&tokens.access_token).await?;

        let (enc_access, enc_refresh) =
            crypto::encrypt_tokens(&self.cipher, &tokens.access_token, &tokens.refresh_token)?;

        let now = Utc::now();
        let connection = WhoopConnection {
            user_id: stored.user_id,
            whoop_user_id: profile.user_id,
            access_token_encrypted: enc_access,
            refresh_token_encrypted: enc_refresh,
            token_expires_at: tokens.expires_at(now),
            scopes: tokens.scope.unwrap_or_else(|| OAUTH_SCOPES.to_string()),
            auto_create_sessions: true,
            auto_fill_readiness: false,
            last_synced_at: None,
            is_active: true,
            created_at: now,
        };
        self.db.upsert_connection(&connection).await?;

        tracing::info!(
            user_id = stored.user_id,
            whoop_user_id = profile.user_id,
            "OAuth callback handled, connection stored"
        );

        Ok(ConnectionSummary::from(&connection))
    }

    // ─── Token Management ────────────────────────────────────────

    /// Get a valid (non-expiring) access token for the given user.
    ///
    /// 1. Read the connection; fail with not-found if none exists
    /// 2. If the token is valid past the margin, decrypt and return it
    /// 3. Otherwise acquire the per-user lock, re-read (another task may
    ///    have refreshed while we waited), and refresh if still needed
    pub async fn get_valid_access_token(&self, user_id: i64) -> Result<String, AppError> {
        let margin = chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        let connection = self.require_connection(user_id).await?;
        if Utc::now() + margin < connection.token_expires_at {
            return self.cipher.decrypt(&connection.access_token_encrypted);
        }

        // Expiring soon - serialize the refresh per user.
        let lock = self
            .refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-read after acquiring the lock: the winner of a race has
        // already persisted fresh tokens for us.
        let connection = self.require_connection(user_id).await?;
        if Utc::now() + margin < connection.token_expires_at {
            return self.cipher.decrypt(&connection.access_token_encrypted);
        }

        tracing::info!(user_id, "Access token expiring, refreshing");

        let refresh_token = self.cipher.decrypt(&connection.refresh_token_encrypted)?;
        let new_tokens = self.client.refresh_token(&refresh_token).await?;

        let (enc_access, enc_refresh) =
            crypto::encrypt_tokens(&self.cipher, &new_tokens.access_token, &new_tokens.refresh_token)?;
        let expires_at = new_tokens.expires_at(Utc::now());

        self.db
            .update_connection_tokens(user_id, &enc_access, &enc_refresh, expires_at)
            .await?;

        tracing::info!(user_id, "Token refreshed and stored");
        Ok(new_tokens.access_token)
    }

    /// Disconnect WHOOP: best-effort revocation, then delete all local
    /// wearable data. Revocation failure never blocks deletion.
    pub async fn disconnect(&self, user_id: i64) -> Result<bool, AppError> {
        let connection = match self.db.get_connection(user_id).await? {
            Some(c) => c,
            None => return Ok(false),
        };

        match self.cipher.decrypt(&connection.access_token_encrypted) {
            Ok(access_token) => {
                if let Err(e) = self.client.revoke(&access_token).await {
                    tracing::warn!(error = %e, user_id, "WHOOP revocation failed, deleting local data anyway");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Failed to decrypt token for revocation (skipping)");
            }
        }

        let cleared = self.db.clear_wearable_fields_for_user(user_id).await?;
        let workouts = self.db.delete_workouts_for_user(user_id).await?;
        let cycles = self.db.delete_recovery_for_user(user_id).await?;
        self.db.delete_connection(user_id).await?;

        tracing::info!(
            user_id,
            sessions_cleared = cleared,
            workouts_deleted = workouts,
            cycles_deleted = cycles,
            "WHOOP disconnected"
        );
        Ok(true)
    }

    async fn require_connection(&self, user_id: i64) -> Result<WhoopConnection, AppError> {
        self.db
            .get_connection(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("WHOOP connection for user {}", user_id)))
    }
}
