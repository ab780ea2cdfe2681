//! OAuth2 authorization-code flow against the vendor hosted login page

use crate::error::{CloudError, CloudResult};
use crate::signing::RequestSigner;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use url::Url;

/// Parameters of the hosted login redirect
#[derive(Debug, Clone)]
pub struct AuthorizeParams<'a> {
    pub page_url: &'a str,
    pub redirect_url: &'a str,
    pub state: &'a str,
    /// Milliseconds since epoch; signed together with the app id
    pub seq: i64,
    pub nonce: &'a str,
}

/// Build the hosted login URL.
///
/// `authorization` is the signature of `{app_id}_{seq}`.
pub fn authorize_url(signer: &RequestSigner, params: &AuthorizeParams<'_>) -> CloudResult<String> {
    let mut url = Url::parse(params.page_url)?;
    let seq = params.seq.to_string();
    let authorization = signer.sign(format!("{}_{}", signer.app_id(), seq).as_bytes());

    url.query_pairs_mut()
        .append_pair("state", params.state)
        .append_pair("clientId", signer.app_id())
        .append_pair("authorization", &authorization)
        .append_pair("seq", &seq)
        .append_pair("redirectUrl", params.redirect_url)
        .append_pair("nonce", params.nonce)
        .append_pair("grantType", "authorization_code")
        .append_pair("showQRCode", "false");

    Ok(url.to_string())
}

/// Fresh random state and nonce
pub fn new_state_and_nonce() -> (String, String) {
    let state = uuid::Uuid::new_v4().simple().to_string();
    let nonce = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    (state, nonce)
}

#[derive(Debug, Clone)]
struct PendingRequest {
    return_url: Option<String>,
    created_at: DateTime<Utc>,
}

/// Redirects started but not yet completed, keyed by `state`
#[derive(Debug)]
pub struct PendingAuthorizations {
    ttl: chrono::Duration,
    pending: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingAuthorizations {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Remember a redirect; expired entries are pruned on the way
    pub fn insert(&self, state: &str, return_url: Option<String>) {
        let now = Utc::now();
        let mut pending = self.pending.lock();
        pending.retain(|_, req| now - req.created_at < self.ttl);
        pending.insert(
            state.to_string(),
            PendingRequest {
                return_url,
                created_at: now,
            },
        );
    }

    /// Consume a state. Unknown, reused and expired states are rejected.
    pub fn take(&self, state: &str) -> CloudResult<Option<String>> {
        let request = self
            .pending
            .lock()
            .remove(state)
            .ok_or(CloudError::InvalidOAuthState)?;
        if Utc::now() - request.created_at >= self.ttl {
            return Err(CloudError::InvalidOAuthState);
        }
        Ok(request.return_url)
    }

    /// Number of redirects awaiting their callback
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}
