//! Request identity shared by every call to the scheduling provider.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use crate::config::AccountConfig;

const APP_VERSION: &str = "2.230.0";
const APP_BUILD: &str = "16956";
const CLIENT_INFO: &str = "iOS-courier/2.230.0-16956-Production";
const DEVICE_OS_VERSION: &str = "17.5.1";
const USER_AGENT_VALUE: &str = "Glover/16956 CFNetwork/1496.0.7 Darwin/23.5.0";
const API_VERSION: &str = "8";
const REQUEST_TTL_MS: &str = "120000";

/// The courier app installation the requests claim to come from.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub city_code: String,
    pub installation_id: String,
    pub session_id: String,
}

impl DeviceIdentity {
    /// Build an identity from account settings, generating ids that are not configured.
    pub fn from_account(account: &AccountConfig) -> Self {
        Self {
            city_code: account.city_code.clone(),
            installation_id: account
                .installation_id
                .clone()
                .unwrap_or_else(new_upper_uuid),
            session_id: account.session_id.clone().unwrap_or_else(new_upper_uuid),
        }
    }

    /// Headers for one request. A fresh request id is generated per call.
    ///
    /// The provider expects the raw access token in `authorization`, without a scheme.
    pub fn headers(&self, access_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));

        let fixed = [
            ("glovo-client-info", CLIENT_INFO),
            ("glovo-device-osversion", DEVICE_OS_VERSION),
            ("glovo-language-code", "en"),
            ("glovo-app-build", APP_BUILD),
            ("glovo-app-type", "courier"),
            ("glovo-app-development-state", "Production"),
            ("glovo-request-ttl", REQUEST_TTL_MS),
            ("glovo-api-version", API_VERSION),
            ("glovo-app-platform", "iOS"),
            ("glovo-app-version", APP_VERSION),
        ];
        for (name, value) in fixed {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        let dynamic = [
            ("glovo-location-city-code", self.city_code.clone()),
            ("glovo-request-id", new_upper_uuid()),
            ("glovo-dynamic-session-id", self.session_id.clone()),
            ("glovo-installation-id", self.installation_id.clone()),
        ];
        for (name, value) in dynamic {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(name), value);
                }
                Err(_) => tracing::warn!("Skipping header {} with invalid value", name),
            }
        }

        if let Some(token) = access_token {
            match HeaderValue::from_str(token) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Access token is not a valid header value"),
            }
        }

        headers
    }
}

fn new_upper_uuid() -> String {
    uuid::Uuid::new_v4().to_string().to_uppercase()
}
