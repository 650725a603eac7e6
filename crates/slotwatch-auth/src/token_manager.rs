//! Credential lifecycle for the courier account.
//!
//! Hands out a valid access token, in order of preference:
//! - the cached token while it has not expired
//! - a refreshed token when the cached one expired
//! - a freshly issued token from the primary credentials when nothing is
//!   cached or the refresh token was rejected
//!
//! A refresh that never reached the provider fails the call and leaves the
//! cached credential for the next attempt.

use chrono::Utc;

use crate::client::{AuthClient, TokenResponse};
use crate::storage::{Credential, CredentialCache};
use slotwatch_core::{AuthError, TransportError};

/// Primary credentials used to issue tokens.
#[derive(Clone)]
pub struct AccountCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct CredentialStore<C: CredentialCache> {
    client: AuthClient,
    cache: C,
    account: AccountCredentials,
}

impl<C: CredentialCache> CredentialStore<C> {
    pub fn new(client: AuthClient, cache: C, account: AccountCredentials) -> Self {
        Self {
            client,
            cache,
            account,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Return an access token that is valid right now.
    ///
    /// # Errors
    /// Returns `AuthError` when the refresh endpoint cannot be reached, when
    /// issuing from the primary credentials fails, or when the credential
    /// cannot be persisted.
    pub async fn get_valid_access_token(&self) -> Result<String, AuthError> {
        self.valid_access_token_at(Utc::now().timestamp()).await
    }

    /// Same as [`get_valid_access_token`](Self::get_valid_access_token) with an explicit clock.
    pub async fn valid_access_token_at(&self, now: i64) -> Result<String, AuthError> {
        let cached = match self.cache.load() {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("Ignoring unreadable credential cache: {}", e);
                None
            }
        };

        if let Some(credential) = cached {
            if !credential.is_expired_at(now) {
                return Ok(credential.access_token);
            }

            tracing::info!("Access token expired, refreshing");
            match self.refresh(&credential, now).await? {
                Some(refreshed) => {
                    self.cache.store(&refreshed)?;
                    return Ok(refreshed.access_token);
                }
                // The cached credential is replaced below once a new one is issued.
                None => tracing::warn!("Refresh token rejected, issuing a new token"),
            }
        }

        let issued = self.issue(now).await?;
        self.cache.store(&issued)?;
        Ok(issued.access_token)
    }

    /// Attempt a refresh; `None` means the refresh token is no longer usable.
    ///
    /// An unreachable or timed-out endpoint is an error, not a rejection: the
    /// primary credentials are only used when the provider answered.
    async fn refresh(&self, credential: &Credential, now: i64) -> Result<Option<Credential>, AuthError> {
        let response = match self.client.refresh_token(&credential.refresh_token).await {
            Ok(response) => response,
            Err(e @ (TransportError::ConnectionFailed(_) | TransportError::Timeout)) => {
                tracing::warn!("Token refresh could not reach the provider: {}", e);
                return Err(AuthError::Network(e));
            }
            Err(e) => {
                tracing::warn!("Token refresh request failed: {}", e);
                return Ok(None);
            }
        };

        let (Some(expires_in), Some(access_token)) = (response.expires_in, response.access_token) else {
            return Ok(None);
        };

        Ok(Some(Credential {
            access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| credential.refresh_token.clone()),
            expires_at: now + expires_in,
        }))
    }

    async fn issue(&self, now: i64) -> Result<Credential, AuthError> {
        let response = self
            .client
            .issue_token(&self.account.username, &self.account.password)
            .await
            .map_err(|e| match e {
                TransportError::Status { status, message } => {
                    AuthError::IssueFailed(format!("{}: {}", status, message))
                }
                other => AuthError::Network(other),
            })?;

        credential_from_issue(response, now)
    }
}

fn credential_from_issue(response: TokenResponse, now: i64) -> Result<Credential, AuthError> {
    let expires_in = response.expires_in.ok_or(AuthError::MissingExpiry)?;
    let access_token = response
        .access_token
        .ok_or(AuthError::MissingAccessToken)?;

    tracing::info!("Issued new access token (expires in {}s)", expires_in);

    Ok(Credential {
        access_token,
        refresh_token: response.refresh_token.unwrap_or_default(),
        expires_at: now + expires_in,
    })
}
