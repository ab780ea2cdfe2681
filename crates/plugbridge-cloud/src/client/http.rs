//! HTTP client for the eWeLink v2 REST API
//!
//! Signed calls (login, token exchange, refresh) carry `Authorization: Sign`,
//! device calls carry `Authorization: Bearer`. Every call carries `X-CK-Appid`.

use crate::commands::StatusRequest;
use crate::error::{CloudError, CloudResult};
use crate::signing::RequestSigner;
use crate::types::{
    FamilyData, LoginRequest, OAuthTokenData, OAuthTokenRequest, RefreshData, RefreshRequest,
    VendorEnvelope,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

const APP_ID_HEADER: &str = "X-CK-Appid";

/// Longest body excerpt kept in error messages
const MAX_ERROR_BODY: usize = 200;

/// HTTP client for the vendor API
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> CloudResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("plugbridge/{}", crate::VERSION))
            .gzip(true)
            .build()?;

        Ok(Self { client })
    }

    /// `POST /v2/user/login`, raw envelope so the caller can inspect region hints
    pub async fn login(
        &self,
        base_url: &str,
        signer: &RequestSigner,
        request: &LoginRequest,
    ) -> CloudResult<VendorEnvelope<Value>> {
        debug!("Signed login against {}", base_url);
        self.post_signed(base_url, "/v2/user/login", signer, request)
            .await
    }

    /// `POST /v2/user/oauth/token`
    pub async fn exchange_code(
        &self,
        base_url: &str,
        signer: &RequestSigner,
        request: &OAuthTokenRequest,
    ) -> CloudResult<OAuthTokenData> {
        debug!("Exchanging authorization code against {}", base_url);
        let envelope = self
            .post_signed(base_url, "/v2/user/oauth/token", signer, request)
            .await?;
        require_data(envelope, |code, msg| CloudError::auth(code, msg))
    }

    /// `POST /v2/user/refresh`
    pub async fn refresh(
        &self,
        base_url: &str,
        signer: &RequestSigner,
        request: &RefreshRequest,
    ) -> CloudResult<RefreshData> {
        debug!("Refreshing access token against {}", base_url);
        let envelope = self
            .post_signed(base_url, "/v2/user/refresh", signer, request)
            .await?;
        require_data(envelope, |code, msg| CloudError::auth(code, msg))
    }

    /// `GET /v2/family`
    pub async fn families(
        &self,
        base_url: &str,
        app_id: &str,
        token: &str,
    ) -> CloudResult<FamilyData> {
        let url = format!("{}/v2/family", base_url);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(APP_ID_HEADER, app_id)
            .send()
            .await?;
        let envelope: VendorEnvelope<FamilyData> = read_json(response).await?;
        require_data(envelope, |code, msg| CloudError::vendor(code, msg))
    }

    /// `GET /v2/device/thing?num=0[&familyid=]`, whole body for the normalizer
    pub async fn things(
        &self,
        base_url: &str,
        app_id: &str,
        token: &str,
        family_id: Option<&str>,
    ) -> CloudResult<Value> {
        let mut url = Url::parse(&format!("{}/v2/device/thing", base_url))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("num", "0");
            if let Some(family_id) = family_id {
                query.append_pair("familyid", family_id);
            }
        }

        debug!("Listing devices (family={:?})", family_id);
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(APP_ID_HEADER, app_id)
            .send()
            .await?;

        let body: Value = read_json(response).await?;
        if let Some(code) = body.get("error").and_then(Value::as_i64) {
            if code != 0 {
                let message = body
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                return Err(CloudError::vendor(code, message));
            }
        }
        Ok(body)
    }

    /// `POST /v2/device/thing/status`
    pub async fn set_status(
        &self,
        base_url: &str,
        app_id: &str,
        token: &str,
        request: &StatusRequest,
    ) -> CloudResult<()> {
        let url = format!("{}/v2/device/thing/status", base_url);
        let body = serde_json::to_vec(request)?;

        debug!("Sending status command to device {}", request.id);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(APP_ID_HEADER, app_id)
            .body(body)
            .send()
            .await?;

        let envelope: VendorEnvelope<Value> = read_json(response).await?;
        if envelope.is_ok() {
            Ok(())
        } else {
            Err(CloudError::vendor(envelope.error, envelope.message()))
        }
    }

    /// Signed POST; the signature covers exactly the bytes sent
    async fn post_signed<B: Serialize, T: DeserializeOwned>(
        &self,
        base_url: &str,
        path: &str,
        signer: &RequestSigner,
        request: &B,
    ) -> CloudResult<VendorEnvelope<T>> {
        let url = format!("{}{}", base_url, path);
        let body = serde_json::to_vec(request)?;

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, signer.authorization(&body))
            .header(APP_ID_HEADER, signer.app_id())
            .body(body)
            .send()
            .await?;

        read_json(response).await
    }
}

/// Decode a vendor JSON body; anything else becomes a server error
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> CloudResult<T> {
    let status = response.status();
    let text = response.text().await?;

    match serde_json::from_str(&text) {
        Ok(body) => Ok(body),
        Err(e) => {
            error!("Unexpected vendor response {}: {}", status, e);
            Err(CloudError::Server {
                status: status.as_u16(),
                message: excerpt(&text),
            })
        }
    }
}

/// Unwrap `data` of a successful envelope, mapping vendor codes with `on_error`
fn require_data<T>(
    envelope: VendorEnvelope<T>,
    on_error: fn(i64, String) -> CloudError,
) -> CloudResult<T> {
    if !envelope.is_ok() {
        return Err(on_error(envelope.error, envelope.message()));
    }
    envelope
        .data
        .ok_or_else(|| on_error(envelope.error, "response carried no data".to_string()))
}

fn excerpt(text: &str) -> String {
    if text.len() <= MAX_ERROR_BODY {
        return text.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
