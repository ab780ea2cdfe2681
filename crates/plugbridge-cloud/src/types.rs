//! Wire types for the eWeLink v2 API

use serde::{Deserialize, Serialize};

/// Vendor error code for "account lives in another region"
pub const WRONG_REGION: i64 = 10004;

/// Vendor error codes meaning the bearer token is no longer accepted
pub const TOKEN_REJECTED: [i64; 2] = [401, 402];

/// Every vendor response is wrapped in this envelope
#[derive(Debug, Clone, Deserialize)]
pub struct VendorEnvelope<T> {
    /// 0 on success
    pub error: i64,

    /// Human readable message, absent on success
    #[serde(default)]
    pub msg: Option<String>,

    /// Payload
    pub data: Option<T>,
}

impl<T> VendorEnvelope<T> {
    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    /// Message or a placeholder
    pub fn message(&self) -> String {
        self.msg.clone().unwrap_or_else(|| "unknown".to_string())
    }
}

/// Direct login body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// Successful login payload
#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    /// Access token
    pub at: String,

    /// Refresh token
    #[serde(default)]
    pub rt: Option<String>,

    #[serde(default)]
    pub user: Option<VendorUser>,

    /// Region the vendor placed the account in, when it says so
    #[serde(default)]
    pub region: Option<String>,
}

impl LoginData {
    /// Vendor-reported region, if it is one we know
    pub fn reported_region(&self) -> Option<crate::region::Region> {
        self.region.as_deref().and_then(|r| r.parse().ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorUser {
    #[serde(default)]
    pub apikey: Option<String>,
}

/// Payload of a wrong-region login answer
#[derive(Debug, Clone, Deserialize)]
pub struct WrongRegionData {
    pub region: String,
}

/// Authorization code exchange body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokenRequest {
    pub code: String,
    pub redirect_url: String,
    pub grant_type: String,
}

impl OAuthTokenRequest {
    pub fn authorization_code(code: impl Into<String>, redirect_url: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            redirect_url: redirect_url.into(),
            grant_type: "authorization_code".to_string(),
        }
    }
}

/// Authorization code exchange payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokenData {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Access token expiry, ms since epoch
    #[serde(default)]
    pub at_expired_time: Option<i64>,
}

/// Token refresh body
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub rt: String,
}

/// Token refresh payload
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshData {
    pub at: String,

    #[serde(default)]
    pub rt: Option<String>,
}

/// `GET /v2/family` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyData {
    #[serde(default)]
    pub family_list: Vec<Family>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Family {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_body() {
        let req = LoginRequest {
            email: "a@b.com".to_string(),
            password: "x".to_string(),
            country_code: None,
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"email":"a@b.com","password":"x"}"#
        );

        let req = LoginRequest {
            country_code: Some("+39".to_string()),
            ..req
        };
        assert!(serde_json::to_string(&req)
            .unwrap()
            .ends_with(r#""countryCode":"+39"}"#));
    }

    #[test]
    fn test_envelope_without_data() {
        let env: VendorEnvelope<LoginData> =
            serde_json::from_str(r#"{"error":10001,"msg":"bad sign"}"#).unwrap();
        assert!(!env.is_ok());
        assert!(env.data.is_none());
        assert_eq!(env.message(), "bad sign");
    }

    #[test]
    fn test_login_data() {
        let env: VendorEnvelope<LoginData> = serde_json::from_str(
            r#"{"error":0,"data":{"at":"T","rt":"R","user":{"apikey":"K"},"region":"us"}}"#,
        )
        .unwrap();
        let data = env.data.unwrap();
        assert_eq!(data.at, "T");
        assert_eq!(data.rt.as_deref(), Some("R"));
        assert_eq!(data.reported_region(), Some(crate::region::Region::Us));
        assert_eq!(data.user.unwrap().apikey.as_deref(), Some("K"));
    }

    #[test]
    fn test_oauth_token_request_body() {
        let req = OAuthTokenRequest::authorization_code("c0de", "https://app/cb");
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"code":"c0de","redirectUrl":"https://app/cb","grantType":"authorization_code"}"#
        );
    }

    #[test]
    fn test_family_data() {
        let data: FamilyData = serde_json::from_str(
            r#"{"familyList":[{"id":"f1","name":"Home"},{"id":"f2"}],"currentFamilyId":"f2"}"#,
        )
        .unwrap();
        assert_eq!(data.family_list.len(), 2);
        assert_eq!(data.family_list[0].id, "f1");
    }
}
