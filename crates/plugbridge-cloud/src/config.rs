//! Configuration for the eWeLink cloud connector

use crate::commands::DeviceOverride;
use crate::error::{CloudError, CloudResult};
use crate::region::Region;
use crate::signing::RequestSigner;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Vendor hosted OAuth login page
pub const DEFAULT_OAUTH_PAGE_URL: &str = "https://c2ccdn.coolkit.cc/oauth/index.html";

/// Upper bound for `token_lifetime_hours` (one year)
pub const MAX_TOKEN_LIFETIME_HOURS: u64 = 24 * 365;

/// Upper bound for `refresh_margin_secs` and `oauth_state_ttl_secs` (one day)
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

/// How device listing is scoped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyScope {
    /// Query devices without a family id
    #[default]
    None,
    /// Resolve the first family and scope the device query to it
    First,
}

/// Cloud connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Application id issued by the vendor developer console
    pub app_id: Option<String>,

    /// Application secret used for request signing
    pub app_secret: Option<String>,

    /// Region used when the caller gives no hint
    pub region: Region,

    /// OAuth redirect URL registered with the vendor
    pub redirect_url: Option<String>,

    /// Hosted OAuth login page
    pub oauth_page_url: String,

    /// Per-region base URL overrides
    pub base_urls: HashMap<Region, String>,

    /// Optional country code sent with direct login (e.g. "+39")
    pub country_code: Option<String>,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Lifetime assumed for tokens the vendor returns without an expiry
    pub token_lifetime_hours: u64,

    /// Refresh this many seconds before the token expires
    pub refresh_margin_secs: u64,

    /// How long a pending OAuth redirect stays valid
    pub oauth_state_ttl_secs: u64,

    /// Device listing scope
    pub family_scope: FamilyScope,

    /// Include device groups in listings by default
    pub include_groups: bool,

    /// Per-device command overrides
    pub overrides: Vec<DeviceOverride>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_secret: None,
            region: Region::Eu,
            redirect_url: None,
            oauth_page_url: DEFAULT_OAUTH_PAGE_URL.to_string(),
            base_urls: HashMap::new(),
            country_code: None,
            request_timeout_ms: 10_000,
            token_lifetime_hours: 720, // 30 days
            refresh_margin_secs: 60,
            oauth_state_ttl_secs: 600,
            family_scope: FamilyScope::None,
            include_groups: false,
            overrides: Vec::new(),
        }
    }
}

impl CloudConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `EWELINK_*` environment variables on top of this config
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply `EWELINK_*` variables read through `lookup`
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("EWELINK_APP_ID") {
            self.app_id = Some(val);
        }
        if let Some(val) = lookup("EWELINK_APP_SECRET") {
            self.app_secret = Some(val);
        }
        if let Some(val) = lookup("EWELINK_REGION") {
            match val.parse() {
                Ok(region) => self.region = region,
                Err(e) => tracing::warn!("Ignoring EWELINK_REGION: {}", e),
            }
        }
        if let Some(val) = lookup("EWELINK_REDIRECT_URL") {
            self.redirect_url = Some(val);
        }
    }

    /// Whether both app id and secret are present
    pub fn has_app_credentials(&self) -> bool {
        matches!(
            (self.app_id.as_deref(), self.app_secret.as_deref()),
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty()
        )
    }

    /// App id sent as `X-CK-Appid` on bearer calls
    pub fn app_id(&self) -> CloudResult<&str> {
        self.app_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CloudError::Config("EWELINK_APP_ID must be set".to_string()))
    }

    /// Build the request signer, failing if app credentials are absent
    pub fn signer(&self) -> CloudResult<RequestSigner> {
        match (self.app_id.as_deref(), self.app_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Ok(RequestSigner::new(id, secret))
            }
            _ => Err(CloudError::Config(
                "EWELINK_APP_ID and EWELINK_APP_SECRET must be set".to_string(),
            )),
        }
    }

    /// Base URL for a region, honouring overrides
    pub fn base_url(&self, region: Region) -> String {
        self.base_urls
            .get(&region)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| region.default_base_url().to_string())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get assumed token lifetime
    pub fn token_lifetime(&self) -> CloudResult<chrono::Duration> {
        bounded(
            "token_lifetime_hours",
            self.token_lifetime_hours,
            MAX_TOKEN_LIFETIME_HOURS,
            chrono::TimeDelta::try_hours,
        )
    }

    /// Get refresh safety margin
    pub fn refresh_margin(&self) -> CloudResult<chrono::Duration> {
        bounded(
            "refresh_margin_secs",
            self.refresh_margin_secs,
            MAX_WINDOW_SECS,
            chrono::TimeDelta::try_seconds,
        )
    }

    /// Get pending OAuth request lifetime
    pub fn oauth_state_ttl(&self) -> CloudResult<chrono::Duration> {
        bounded(
            "oauth_state_ttl_secs",
            self.oauth_state_ttl_secs,
            MAX_WINDOW_SECS,
            chrono::TimeDelta::try_seconds,
        )
    }

    /// Check the time settings are usable
    pub fn validate(&self) -> CloudResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(CloudError::Config(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.token_lifetime_hours == 0 {
            return Err(CloudError::Config(
                "token_lifetime_hours must be greater than 0".to_string(),
            ));
        }
        self.token_lifetime()?;
        self.refresh_margin()?;
        self.oauth_state_ttl()?;
        Ok(())
    }
}

fn bounded(
    name: &str,
    value: u64,
    max: u64,
    to_delta: fn(i64) -> Option<chrono::TimeDelta>,
) -> CloudResult<chrono::Duration> {
    i64::try_from(value)
        .ok()
        .filter(|_| value <= max)
        .and_then(to_delta)
        .ok_or_else(|| CloudError::Config(format!("{} must be at most {}", name, max)))
}
