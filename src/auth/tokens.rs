//! Opaque access/refresh token issuance and validation.
//!
//! Tokens are random UUIDs looked up in a shared map. An access token and
//! its refresh token are issued together and die together: refreshing or
//! revoking either side removes both.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::credentials::CredentialStore;
use crate::auth::SessionValidator;
use crate::config::AuthConfig;

/// Tokens handed to a client after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone)]
struct Grant {
    user_id: String,
    kind: TokenKind,
    expires_at: DateTime<Utc>,
    sibling: String,
}

impl Grant {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone)]
pub struct TokenAuthority {
    credentials: Arc<dyn CredentialStore>,
    grants: Arc<DashMap<String, Grant>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenAuthority {
    pub fn new(credentials: Arc<dyn CredentialStore>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            credentials,
            grants: Arc::new(DashMap::new()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        Self::new(
            credentials,
            Duration::from_secs(config.access_token_ttl_secs),
            Duration::from_secs(config.refresh_token_ttl_secs),
        )
    }

    /// Verify credentials and issue a token pair.
    pub fn create_token(&self, username: &str, password: &str) -> Option<TokenPair> {
        let Some(user_id) = self.credentials.verify(username, password) else {
            tracing::info!(username, "Login rejected");
            return None;
        };
        tracing::info!(username, user_id = %user_id, "Login accepted");
        Some(self.issue_at(&user_id, Utc::now()))
    }

    /// Issue a token pair for an already authenticated user.
    pub fn issue(&self, user_id: &str) -> TokenPair {
        self.issue_at(user_id, Utc::now())
    }

    fn issue_at(&self, user_id: &str, now: DateTime<Utc>) -> TokenPair {
        let access = Uuid::new_v4().to_string();
        let refresh = Uuid::new_v4().to_string();

        self.grants.insert(
            access.clone(),
            Grant {
                user_id: user_id.to_string(),
                kind: TokenKind::Access,
                expires_at: now + to_chrono(self.access_ttl),
                sibling: refresh.clone(),
            },
        );
        self.grants.insert(
            refresh.clone(),
            Grant {
                user_id: user_id.to_string(),
                kind: TokenKind::Refresh,
                expires_at: now + to_chrono(self.refresh_ttl),
                sibling: access.clone(),
            },
        );

        TokenPair {
            access_token: access,
            refresh_token: refresh,
            expires_in: self.access_ttl.as_secs(),
        }
    }

    /// Exchange a refresh token for a new pair; the old pair is revoked.
    pub fn refresh(&self, refresh_token: &str) -> Option<TokenPair> {
        self.refresh_at(refresh_token, Utc::now())
    }

    fn refresh_at(&self, refresh_token: &str, now: DateTime<Utc>) -> Option<TokenPair> {
        // Removing the refresh grant is the claim: of two concurrent
        // refreshes with the same token only one gets it back.
        let (_, grant) = self
            .grants
            .remove_if(refresh_token, |_, grant| grant.kind == TokenKind::Refresh)?;
        self.grants.remove(&grant.sibling);
        if grant.is_expired(now) {
            return None;
        }
        tracing::debug!(user_id = %grant.user_id, "Token pair rotated");
        Some(self.issue_at(&grant.user_id, now))
    }

    /// Revoke an access or refresh token together with its sibling.
    pub fn revoke(&self, token: &str) -> bool {
        self.remove_pair(token)
    }

    /// Drop every expired grant. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.grants.len();
        self.grants.retain(|_, grant| !grant.is_expired(now));
        before.saturating_sub(self.grants.len())
    }

    pub fn active_grants(&self) -> usize {
        self.grants.len()
    }

    fn live_grant(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Option<Grant> {
        let grant = self.grants.get(token).map(|g| g.value().clone())?;
        if grant.kind != kind {
            return None;
        }
        if grant.is_expired(now) {
            self.grants.remove(token);
            return None;
        }
        Some(grant)
    }

    fn remove_pair(&self, token: &str) -> bool {
        match self.grants.remove(token) {
            Some((_, grant)) => {
                self.grants.remove(&grant.sibling);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("grants", &self.grants.len())
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl SessionValidator for TokenAuthority {
    fn is_token_valid(&self, token: &str) -> bool {
        self.live_grant(token, TokenKind::Access, Utc::now()).is_some()
    }

    fn user_id_from_token(&self, token: &str) -> Option<String> {
        self.live_grant(token, TokenKind::Access, Utc::now())
            .map(|grant| grant.user_id)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}
