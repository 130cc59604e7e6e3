//! OAuth credential management against Google's token endpoint
//!
//! Refresh is serialized per account: the first caller to find a stale token
//! performs the refresh while concurrent callers wait on the same lock and
//! then reuse the stored result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use calbridge_domain::{Account, CalbridgeError, Credential, GoogleAppConfig, Result};
use calbridge_core::{AccountProfile, AccountRepository, CredentialProvider};
use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::errors::InfraError;

const TOKEN_TIMEOUT: StdDuration = StdDuration::from_secs(20);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OauthErrorBody {
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    sub: String,
    email: String,
}

/// Token-pair lifecycle for every connected account of one tenant.
pub struct GoogleCredentialProvider {
    http: Client,
    config: GoogleAppConfig,
    accounts: Arc<dyn AccountRepository>,
    /// Refresh when the access token expires within this many seconds
    refresh_threshold_secs: i64,
    refresh_locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl GoogleCredentialProvider {
    pub fn new(
        config: GoogleAppConfig,
        accounts: Arc<dyn AccountRepository>,
        refresh_threshold_secs: i64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .map_err(InfraError::from)?;
        Ok(Self {
            http,
            config,
            accounts,
            refresh_threshold_secs,
            refresh_locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    fn lock_for(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.refresh_locks.lock();
        locks.entry(account_id.to_string()).or_default().clone()
    }

    async fn load(&self, account_id: &str) -> Result<Account> {
        self.accounts
            .find(account_id)
            .await?
            .ok_or_else(|| CalbridgeError::NotFound(format!("account {account_id}")))
    }

    /// Exchanges the stored refresh token for a new access token and persists
    /// the result. Callers hold the per-account lock.
    async fn refresh_locked(&self, account: &Account) -> Result<String> {
        let refresh_token = account.credential.refresh_token.clone().ok_or_else(|| {
            CalbridgeError::ReauthRequired(format!(
                "account {} holds no refresh token",
                account.id
            ))
        })?;

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(InfraError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.interpret_token_failure(&account.id, status, &body).await?);
        }

        let token: TokenResponse = response.json().await.map_err(InfraError::from)?;
        let credential = Credential {
            access_token: token.access_token.clone(),
            // Google omits the refresh token on refresh responses
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        };
        self.accounts.update_credential(&account.id, &credential).await?;
        debug!(account_id = %account.id, "access token refreshed");
        Ok(credential.access_token)
    }

    /// A revoked grant comes back as `invalid_grant`; that account needs the
    /// user to reconnect, and the flag makes the state visible to callers
    /// before they hit the remote again.
    async fn interpret_token_failure(
        &self,
        account_id: &str,
        status: StatusCode,
        body: &str,
    ) -> Result<CalbridgeError> {
        let parsed: OauthErrorBody =
            serde_json::from_str(body).unwrap_or(OauthErrorBody { error: String::new() });
        if parsed.error == "invalid_grant" {
            self.accounts.set_reauth_required(account_id, true).await?;
            return Ok(CalbridgeError::ReauthRequired(format!(
                "refresh grant revoked for account {account_id}"
            )));
        }
        if status.is_server_error() {
            return Ok(CalbridgeError::Network(format!("token endpoint returned {status}")));
        }
        Ok(CalbridgeError::Internal(format!(
            "token refresh failed with {status}: {}",
            parsed.error
        )))
    }

    fn revoke_endpoint(&self) -> String {
        let base = self.config.token_endpoint.trim_end_matches("/token");
        format!("{base}/revoke")
    }
}

#[async_trait]
impl CredentialProvider for GoogleCredentialProvider {
    async fn access_token(&self, account_id: &str) -> Result<String> {
        let account = self.load(account_id).await?;
        if account.reauth_required {
            return Err(CalbridgeError::ReauthRequired(format!(
                "account {account_id} is flagged for reconnection"
            )));
        }
        if !account.credential.expires_within(self.refresh_threshold_secs, Utc::now()) {
            return Ok(account.credential.access_token);
        }

        let lock = self.lock_for(account_id);
        let _guard = lock.lock().await;
        // Another task may have finished the refresh while we waited.
        let account = self.load(account_id).await?;
        if !account.credential.expires_within(self.refresh_threshold_secs, Utc::now()) {
            return Ok(account.credential.access_token);
        }
        self.refresh_locked(&account).await
    }

    async fn force_refresh(&self, account_id: &str) -> Result<String> {
        let lock = self.lock_for(account_id);
        let _guard = lock.lock().await;
        let account = self.load(account_id).await?;
        self.refresh_locked(&account).await
    }

    async fn exchange_code(&self, code: &str) -> Result<(Credential, AccountProfile)> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(InfraError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalbridgeError::InvalidInput(format!(
                "authorization code exchange failed with {status}: {body}"
            )));
        }
        let token: TokenResponse = response.json().await.map_err(InfraError::from)?;

        let profile_response = self
            .http
            .get(&self.config.userinfo_endpoint)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(InfraError::from)?;
        if !profile_response.status().is_success() {
            return Err(CalbridgeError::Network(format!(
                "userinfo fetch failed with {}",
                profile_response.status()
            )));
        }
        let profile: UserInfoResponse =
            profile_response.json().await.map_err(InfraError::from)?;

        let credential = Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        };
        Ok((credential, AccountProfile { google_id: profile.sub, email: profile.email }))
    }

    async fn revoke(&self, account_id: &str) -> Result<bool> {
        let account = self.load(account_id).await?;
        let token = account
            .credential
            .refresh_token
            .unwrap_or(account.credential.access_token);
        let result = self
            .http
            .post(self.revoke_endpoint())
            .form(&[("token", token.as_str())])
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                warn!(account_id, status = %response.status(), "token revocation rejected");
                Ok(false)
            }
            Err(err) => {
                warn!(account_id, error = %err, "token revocation failed");
                Ok(false)
            }
        }
    }
}
