//! Cloud client module
//!
//! Central client that owns the vendor session and performs every call the
//! frontend can trigger.

mod http;

pub use http::HttpClient;

use crate::commands::{OverrideTable, ShadowStates, ToggleCommand};
use crate::config::{CloudConfig, FamilyScope};
use crate::devices::{self, Device, ListOptions};
use crate::error::{CloudError, CloudResult};
use crate::oauth::{self, AuthorizeParams, PendingAuthorizations};
use crate::region::Region;
use crate::session::{Session, SessionHolder, SessionInfo};
use crate::signing::RequestSigner;
use crate::types::{
    LoginData, LoginRequest, OAuthTokenRequest, RefreshRequest, WrongRegionData, TOKEN_REJECTED,
    WRONG_REGION,
};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Token and region to use for one authenticated call
#[derive(Clone)]
struct Access {
    token: String,
    region: Region,
}

/// Cloud client for the eWeLink platform
pub struct CloudClient {
    config: CloudConfig,
    http: HttpClient,
    session: SessionHolder,
    overrides: OverrideTable,
    shadow: ShadowStates,
    pending: PendingAuthorizations,
}

impl CloudClient {
    /// Create a new cloud client
    pub fn new(config: CloudConfig) -> CloudResult<Self> {
        config.validate()?;
        let http = HttpClient::new(config.request_timeout())?;
        let overrides = OverrideTable::new(&config.overrides);
        let pending = PendingAuthorizations::new(config.oauth_state_ttl()?);

        Ok(Self {
            config,
            http,
            session: SessionHolder::new(),
            overrides,
            shadow: ShadowStates::new(),
            pending,
        })
    }

    /// Get configuration reference
    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Get session holder reference
    pub fn session(&self) -> &SessionHolder {
        &self.session
    }

    /// Get override table reference
    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Public view of the current session
    pub async fn session_info(&self) -> SessionInfo {
        self.session.info().await
    }

    fn signer(&self) -> CloudResult<RequestSigner> {
        self.config.signer()
    }

    /// Direct signed login.
    ///
    /// A wrong-region answer is retried exactly once against the region the
    /// vendor names. On success the session is replaced.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        region_hint: Option<Region>,
    ) -> CloudResult<SessionInfo> {
        let signer = self.signer()?;
        if email.trim().is_empty() || password.is_empty() {
            return Err(CloudError::validation("email and password are required"));
        }

        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            country_code: self.config.country_code.clone(),
        };

        let mut region = region_hint.unwrap_or(self.config.region);
        let mut envelope = self
            .http
            .login(&self.config.base_url(region), &signer, &request)
            .await?;

        if envelope.error == WRONG_REGION {
            let hinted = envelope
                .data
                .take()
                .and_then(|data| serde_json::from_value::<WrongRegionData>(data).ok())
                .and_then(|data| data.region.parse::<Region>().ok());

            if let Some(next) = hinted.filter(|next| *next != region) {
                info!("Account lives in region {}, retrying login there", next);
                region = next;
                envelope = self
                    .http
                    .login(&self.config.base_url(region), &signer, &request)
                    .await?;
            }
        }

        if !envelope.is_ok() {
            warn!(
                "Login rejected (error={}, msg={})",
                envelope.error,
                envelope.message()
            );
            return Err(CloudError::auth(envelope.error, envelope.message()));
        }

        let data: LoginData = match envelope.data {
            Some(data) => serde_json::from_value(data)?,
            None => return Err(CloudError::auth(0, "login response carried no data")),
        };

        let session = Session::from_login(data, region, self.config.token_lifetime()?)?;
        let info = session.info();
        info!("Login OK, region: {}", session.region);
        self.session.replace(session).await;

        Ok(info)
    }

    /// Start the OAuth redirect flow, returning the hosted login URL
    pub fn authorize_url(&self, return_url: Option<String>) -> CloudResult<String> {
        let signer = self.signer()?;
        let redirect_url = self.redirect_url()?;
        let (state, nonce) = oauth::new_state_and_nonce();

        let url = oauth::authorize_url(
            &signer,
            &AuthorizeParams {
                page_url: &self.config.oauth_page_url,
                redirect_url,
                state: &state,
                seq: Utc::now().timestamp_millis(),
                nonce: &nonce,
            },
        )?;

        self.pending.insert(&state, return_url);
        debug!("OAuth redirect prepared ({} pending)", self.pending.len());
        Ok(url)
    }

    /// Finish the OAuth flow: validate state, exchange the code, replace the session.
    ///
    /// Returns the `returnUrl` given when the flow started.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
        region: Option<Region>,
    ) -> CloudResult<Option<String>> {
        let signer = self.signer()?;
        let redirect_url = self.redirect_url()?;
        if code.is_empty() {
            return Err(CloudError::validation("code is required"));
        }
        let return_url = self.pending.take(state)?;

        let region = region.unwrap_or(self.config.region);
        let request = OAuthTokenRequest::authorization_code(code, redirect_url);
        let data = self
            .http
            .exchange_code(&self.config.base_url(region), &signer, &request)
            .await?;

        let session = Session::from_oauth(data, region, self.config.token_lifetime()?)?;
        self.session.replace(session).await;
        info!("OAuth login OK, region: {}", region);

        Ok(return_url)
    }

    fn redirect_url(&self) -> CloudResult<&str> {
        self.config
            .redirect_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| CloudError::Config("EWELINK_REDIRECT_URL must be set".to_string()))
    }

    /// Drop the session
    pub async fn logout(&self) {
        self.session.clear().await;
        info!("Session cleared");
    }

    /// Token freshness guard.
    ///
    /// Returns a usable token, refreshing it first when it is (nearly)
    /// expired. Concurrent callers wait for one refresh. Without a refresh
    /// token, or when refresh fails, the session is cleared unless a new
    /// login replaced it in the meantime.
    async fn access(&self) -> CloudResult<Access> {
        let margin = self.config.refresh_margin()?;

        match self.session.current().await {
            None => return Err(CloudError::NotAuthenticated),
            Some(session) if !session.expires_soon(margin) => {
                return Ok(Access {
                    token: session.access_token,
                    region: session.region,
                })
            }
            Some(_) => {}
        }

        let _refreshing = self.session.refresh_lock().await;

        // Another caller may have refreshed (or cleared) while we waited
        let session = match self.session.current().await {
            None => return Err(CloudError::NotAuthenticated),
            Some(session) if !session.expires_soon(margin) => {
                return Ok(Access {
                    token: session.access_token,
                    region: session.region,
                })
            }
            Some(session) => session,
        };

        let Some(refresh_token) = session.refresh_token.clone() else {
            warn!("Session expired and no refresh token, clearing");
            self.session.clear_if(&session.access_token).await;
            return Err(CloudError::NotAuthenticated);
        };

        let signer = self.signer()?;
        let request = RefreshRequest { rt: refresh_token };
        let refreshed = self
            .http
            .refresh(&self.config.base_url(session.region), &signer, &request)
            .await
            .and_then(|data| session.refreshed(data, self.config.token_lifetime()?));

        match refreshed {
            Ok(next) => {
                let access = Access {
                    token: next.access_token.clone(),
                    region: next.region,
                };
                if self.session.replace_if(&session.access_token, next).await {
                    info!("Access token refreshed");
                    return Ok(access);
                }
                debug!("Session replaced during refresh, using the new one");
                self.current_access().await
            }
            Err(e) => {
                if self.session.clear_if(&session.access_token).await {
                    warn!("Token refresh failed, session cleared: {}", e);
                } else {
                    warn!("Token refresh failed for a replaced session: {}", e);
                }
                Err(e)
            }
        }
    }

    async fn current_access(&self) -> CloudResult<Access> {
        self.session
            .current()
            .await
            .map(|session| Access {
                token: session.access_token,
                region: session.region,
            })
            .ok_or(CloudError::NotAuthenticated)
    }

    /// Drop the session when the vendor no longer accepts the token `access` carried
    async fn check_rejected<T>(&self, access: &Access, result: CloudResult<T>) -> CloudResult<T> {
        match result {
            Err(CloudError::Vendor { code, message }) if TOKEN_REJECTED.contains(&code) => {
                warn!("Vendor rejected access token ({}: {})", code, message);
                self.session.clear_if(&access.token).await;
                Err(CloudError::NotAuthenticated)
            }
            other => other,
        }
    }

    /// List devices of the logged-in account
    pub async fn list_devices(&self, include_groups: Option<bool>) -> CloudResult<Vec<Device>> {
        let access = self.access().await?;
        let app_id = self.config.app_id()?;
        let base_url = self.config.base_url(access.region);

        let family_id = match self.config.family_scope {
            FamilyScope::None => None,
            FamilyScope::First => {
                let families = self
                    .check_rejected(
                        &access,
                        self.http.families(&base_url, app_id, &access.token).await,
                    )
                    .await?;
                let first = families.family_list.into_iter().next().map(|f| f.id);
                if first.is_none() {
                    debug!("No family available, listing devices unscoped");
                }
                first
            }
        };

        let payload = self
            .check_rejected(
                &access,
                self.http
                    .things(&base_url, app_id, &access.token, family_id.as_deref())
                    .await,
            )
            .await?;

        let options = ListOptions {
            include_groups: include_groups.unwrap_or(self.config.include_groups),
        };
        let mut devices = devices::normalize(&payload, options);
        devices::apply_shadow(&mut devices, &self.overrides, &self.shadow);

        debug!("Listed {} devices", devices.len());
        Ok(devices)
    }

    /// Switch a whole device on or off
    pub async fn toggle(&self, device_id: &str, state: &str) -> CloudResult<()> {
        let command = ToggleCommand::single(device_id, state)?;
        self.dispatch(command).await
    }

    /// Switch selected outlets of a multi-channel device
    pub async fn toggle_outlets(
        &self,
        device_id: &str,
        outlets: &[u32],
        state: &str,
    ) -> CloudResult<()> {
        let command = ToggleCommand::outlets(device_id, outlets, state)?;
        self.dispatch(command).await
    }

    /// Send a validated command; never retried
    async fn dispatch(&self, command: ToggleCommand) -> CloudResult<()> {
        let access = self.access().await?;
        let app_id = self.config.app_id()?;
        let plan = self.overrides.plan(&command);

        let result = self
            .http
            .set_status(
                &self.config.base_url(access.region),
                app_id,
                &access.token,
                &plan.request,
            )
            .await;
        self.check_rejected(&access, result).await?;

        if let Some(state) = plan.shadow {
            self.shadow.record(&command.device_id, state);
        }
        info!(
            "Device {} switched {}",
            command.device_id,
            command.target.state()
        );
        Ok(())
    }
}
