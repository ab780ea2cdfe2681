//! Session holder
//!
//! The process keeps at most one vendor session. It is only ever replaced
//! whole (login, OAuth callback, refresh) or cleared (logout, failed refresh),
//! so readers never observe a half-updated token pair. Refresh and token
//! rejection only touch the session whose token they used.

use crate::error::{CloudError, CloudResult};
use crate::region::Region;
use crate::types::{LoginData, OAuthTokenData, RefreshData};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Vendor credentials for the current account
#[derive(Clone)]
pub struct Session {
    /// Bearer token
    pub access_token: String,

    /// Refresh token, when the vendor issued one
    pub refresh_token: Option<String>,

    /// Access token expiry
    pub expires_at: DateTime<Utc>,

    /// Region the session is pinned to
    pub region: Region,

    /// Account api key
    pub api_key: Option<String>,

    /// When the session was created or last refreshed
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create from a direct login; the vendor gives no expiry so `lifetime` is assumed
    pub fn from_login(
        data: LoginData,
        region: Region,
        lifetime: chrono::Duration,
    ) -> CloudResult<Self> {
        let now = Utc::now();
        Ok(Self {
            expires_at: expiry(now, lifetime)?,
            region: data.reported_region().unwrap_or(region),
            access_token: data.at,
            refresh_token: data.rt,
            api_key: data.user.and_then(|u| u.apikey),
            created_at: now,
        })
    }

    /// Create from an authorization code exchange
    pub fn from_oauth(
        data: OAuthTokenData,
        region: Region,
        lifetime: chrono::Duration,
    ) -> CloudResult<Self> {
        let now = Utc::now();
        let expires_at = match data
            .at_expired_time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
        {
            Some(at) => at,
            None => expiry(now, lifetime)?,
        };
        Ok(Self {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            expires_at,
            region,
            api_key: None,
            created_at: now,
        })
    }

    /// New session after a refresh; region and api key carry over
    pub fn refreshed(&self, data: RefreshData, lifetime: chrono::Duration) -> CloudResult<Self> {
        let now = Utc::now();
        Ok(Self {
            access_token: data.at,
            refresh_token: data.rt.or_else(|| self.refresh_token.clone()),
            expires_at: expiry(now, lifetime)?,
            region: self.region,
            api_key: self.api_key.clone(),
            created_at: now,
        })
    }

    /// Check if token expires soon (within given duration)
    pub fn expires_soon(&self, within: chrono::Duration) -> bool {
        Utc::now()
            .checked_add_signed(within)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }

    /// Public view without secrets
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            authenticated: true,
            region: Some(self.region),
            expires_at: Some(self.expires_at),
            can_refresh: self.refresh_token.is_some(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("region", &self.region)
            .field("created_at", &self.created_at)
            .finish()
    }
}

fn expiry(now: DateTime<Utc>, lifetime: chrono::Duration) -> CloudResult<DateTime<Utc>> {
    now.checked_add_signed(lifetime)
        .ok_or_else(|| CloudError::Config("token lifetime is out of range".to_string()))
}

/// Session status reported to the frontend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub can_refresh: bool,
}

/// Process-wide session slot
#[derive(Default)]
pub struct SessionHolder {
    current: RwLock<Option<Session>>,
    refresh: Mutex<()>,
}

impl SessionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session whole
    pub async fn replace(&self, session: Session) {
        let mut guard = self.current.write().await;
        *guard = Some(session);
    }

    /// Drop the session
    pub async fn clear(&self) {
        let mut guard = self.current.write().await;
        *guard = None;
    }

    /// Replace the session only if it still holds `access_token`.
    ///
    /// Returns false when a newer login got in first.
    pub async fn replace_if(&self, access_token: &str, session: Session) -> bool {
        let mut guard = self.current.write().await;
        if !holds(guard.as_ref(), access_token) {
            return false;
        }
        *guard = Some(session);
        true
    }

    /// Drop the session only if it still holds `access_token`
    pub async fn clear_if(&self, access_token: &str) -> bool {
        let mut guard = self.current.write().await;
        if !holds(guard.as_ref(), access_token) {
            return false;
        }
        *guard = None;
        true
    }

    /// Snapshot of the current session
    pub async fn current(&self) -> Option<Session> {
        let guard = self.current.read().await;
        guard.clone()
    }

    /// Check if a session exists
    pub async fn is_authenticated(&self) -> bool {
        let guard = self.current.read().await;
        guard.is_some()
    }

    /// Public view of the current session
    pub async fn info(&self) -> SessionInfo {
        let guard = self.current.read().await;
        guard.as_ref().map(Session::info).unwrap_or_default()
    }

    /// Serialises refreshes; hold it across check-refresh-replace
    pub async fn refresh_lock(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock().await
    }
}

fn holds(current: Option<&Session>, access_token: &str) -> bool {
    current.is_some_and(|session| session.access_token == access_token)
}
