//! Token endpoint client for the courier account.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use slotwatch_core::{DeviceIdentity, ReqwestErrorExt, TransportError};

/// Token endpoint answer.
///
/// Every field is optional: a refresh with an invalid refresh token still
/// answers, just without `expiresIn`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordGrant<'a> {
    username: &'a str,
    password: &'a str,
    grant_type: &'static str,
    terms_and_conditions_checked: bool,
    user_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

pub struct AuthClient {
    client: reqwest::Client,
    base_url: String,
    identity: DeviceIdentity,
}

impl AuthClient {
    pub fn new(base_url: &str, identity: DeviceIdentity, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.into_transport_error())?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    /// Exchange the courier's username and password for a new token.
    #[instrument(skip(self, password), level = "info")]
    pub async fn issue_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, TransportError> {
        let body = PasswordGrant {
            username,
            password,
            grant_type: "password",
            terms_and_conditions_checked: false,
            user_type: "courier",
        };
        self.post_token("oauth/token", &body).await
    }

    /// Trade a refresh token for a new access token.
    #[instrument(skip(self, refresh_token), level = "info")]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, TransportError> {
        self.post_token("oauth/refresh", &RefreshGrant { refresh_token })
            .await
    }

    async fn post_token<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<TokenResponse, TransportError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .headers(self.identity.headers(None))
            .json(body)
            .send()
            .await
            .map_err(|e| e.into_transport_error())?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| e.into_transport_error())?;

        // Rejections still carry a JSON body; the missing expiry is what callers act on.
        match serde_json::from_str::<TokenResponse>(&text) {
            Ok(token) => {
                if !status.is_success() {
                    tracing::warn!("Token endpoint {} answered {}", endpoint, status);
                }
                Ok(token)
            }
            Err(_) if !status.is_success() => Err(TransportError::Status {
                status: status.as_u16(),
                message: text,
            }),
            Err(e) => Err(TransportError::Malformed(format!(
                "Token response is not valid JSON: {}",
                e
            ))),
        }
    }
}
