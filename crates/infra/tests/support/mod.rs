//! Shared fixtures for the infra integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use calbridge_core::{AccountRepository, CredentialProvider};
use calbridge_core::AccountProfile;
use calbridge_domain::{Account, CalbridgeError, Credential, GoogleAppConfig, Result};
use chrono::{Duration, Utc};

/// App config pointed at a wiremock server for every endpoint.
pub fn app_config(server_uri: &str) -> GoogleAppConfig {
    GoogleAppConfig {
        client_id: "client-1".to_string(),
        client_secret: "secret-1".to_string(),
        redirect_uri: "https://app.example.com/oauth/callback".to_string(),
        webhook_address: "https://app.example.com/google/webhook".to_string(),
        api_base: server_uri.to_string(),
        token_endpoint: format!("{server_uri}/token"),
        userinfo_endpoint: format!("{server_uri}/userinfo"),
    }
}

/// Credential provider handing out canned tokens; counts forced refreshes.
pub struct StubCredentials {
    tokens: Mutex<Vec<String>>,
    pub refreshes: AtomicUsize,
}

impl StubCredentials {
    /// First element serves `access_token`; later ones serve forced
    /// refreshes in order.
    pub fn with_tokens(tokens: &[&str]) -> Self {
        Self {
            tokens: Mutex::new(tokens.iter().rev().map(ToString::to_string).collect()),
            refreshes: AtomicUsize::new(0),
        }
    }

    fn next_token(&self) -> String {
        self.tokens.lock().unwrap().pop().unwrap_or_else(|| "token".to_string())
    }
}

#[async_trait]
impl CredentialProvider for StubCredentials {
    async fn access_token(&self, _account_id: &str) -> Result<String> {
        Ok(self.next_token())
    }

    async fn force_refresh(&self, _account_id: &str) -> Result<String> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_token())
    }

    async fn exchange_code(&self, _code: &str) -> Result<(Credential, AccountProfile)> {
        Err(CalbridgeError::Internal("not used in these tests".to_string()))
    }

    async fn revoke(&self, _account_id: &str) -> Result<bool> {
        Ok(true)
    }
}

/// In-memory account store for credential provider tests.
#[derive(Default)]
pub struct MemoryAccounts {
    rows: Mutex<HashMap<String, Account>>,
}

impl MemoryAccounts {
    pub fn with_account(account: Account) -> Self {
        let store = Self::default();
        store.rows.lock().unwrap().insert(account.id.clone(), account);
        store
    }

    pub fn snapshot(&self, id: &str) -> Option<Account> {
        self.rows.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn find(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<Account>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|account| account.google_id == google_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Account>> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn upsert(&self, account: &Account) -> Result<()> {
        self.rows.lock().unwrap().insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn update_credential(&self, id: &str, credential: &Credential) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let account = rows
            .get_mut(id)
            .ok_or_else(|| CalbridgeError::NotFound(format!("account {id}")))?;
        account.credential = credential.clone();
        Ok(())
    }

    async fn set_reauth_required(&self, id: &str, required: bool) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let account = rows
            .get_mut(id)
            .ok_or_else(|| CalbridgeError::NotFound(format!("account {id}")))?;
        account.reauth_required = required;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.rows.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Account whose access token is still comfortably valid.
pub fn fresh_account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        google_id: format!("google-{id}"),
        name: "user@example.com".to_string(),
        credential: Credential {
            access_token: "valid-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        },
        scopes: vec!["https://www.googleapis.com/auth/calendar.readonly".to_string()],
        active: true,
        reauth_required: false,
    }
}

/// Account whose access token is already past its expiry.
pub fn stale_account(id: &str) -> Account {
    let mut account = fresh_account(id);
    account.credential.access_token = "stale-token".to_string();
    account.credential.expires_at = Utc::now() - Duration::minutes(5);
    account
}
