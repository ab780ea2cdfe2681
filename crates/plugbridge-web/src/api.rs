//! REST API handlers

use crate::error::ApiError;
use crate::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use plugbridge_cloud::{Device, Region, SessionInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub ok: bool,
    pub devices: Vec<Device>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub session: SessionInfo,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeQuery {
    pub return_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicesQuery {
    pub include_groups: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBody {
    pub device_id: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleMultiBody {
    pub device_id: String,
    pub outlets: Vec<u32>,
    pub state: String,
}

const LOGIN_COMPLETE_PAGE: &str = "<!doctype html>\
<html><head><meta charset=\"utf-8\"><title>plugbridge</title></head>\
<body><h1>eWeLink login complete</h1><p>You can close this window.</p></body></html>";

/// `POST /api/login`: signed login, then the device list
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<DevicesResponse>, ApiError> {
    let Json(body) = payload?;
    let region = parse_region(body.region.as_deref())?;

    state
        .cloud
        .login(&body.email, &body.password, region)
        .await?;
    let devices = state.cloud.list_devices(None).await?;

    Ok(Json(DevicesResponse { ok: true, devices }))
}

/// `GET /login`: redirect to the hosted OAuth page
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let return_url = query.return_url.and_then(|url| {
        let safe = safe_return_url(&url);
        if safe.is_none() {
            warn!("Ignoring non-local returnUrl");
        }
        safe
    });

    let url = state.cloud.authorize_url(return_url)?;
    Ok(found(&url))
}

/// `GET /oauth/callback`
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;

    if let Some(error) = query.error.filter(|e| !e.is_empty()) {
        warn!("OAuth login aborted by vendor: {}", error);
        return Err(ApiError::auth_failed(format!("OAuth login failed: {}", error)));
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(ApiError::bad_request("code and state are required"));
    };
    let region = parse_region(query.region.as_deref())?;

    let return_url = state
        .cloud
        .complete_authorization(&code, &oauth_state, region)
        .await?;

    match return_url {
        Some(url) => Ok(found(&url)),
        None => Ok(Html(LOGIN_COMPLETE_PAGE).into_response()),
    }
}

/// `POST /logout`
pub async fn logout(State(state): State<Arc<AppState>>) -> Json<OkResponse> {
    state.cloud.logout().await;
    Json(OkResponse { ok: true })
}

/// `GET /api/session`
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(SessionResponse {
        ok: true,
        session: state.cloud.session_info().await,
    })
}

/// `GET /api/devices`
pub async fn get_devices(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DevicesQuery>, QueryRejection>,
) -> Result<Json<DevicesResponse>, ApiError> {
    let Query(query) = query?;
    let devices = state.cloud.list_devices(query.include_groups).await?;
    Ok(Json(DevicesResponse { ok: true, devices }))
}

/// `POST /api/toggle`
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ToggleBody>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(body) = payload?;
    state.cloud.toggle(&body.device_id, &body.state).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// `POST /api/toggle-multi`
pub async fn toggle_multi(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ToggleMultiBody>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(body) = payload?;
    state
        .cloud
        .toggle_outlets(&body.device_id, &body.outlets, &body.state)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "plugbridge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Empty means "use the configured region"
fn parse_region(region: Option<&str>) -> Result<Option<Region>, ApiError> {
    match region.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(region) => region
            .parse()
            .map(Some)
            .map_err(|e| ApiError::bad_request(format!("{}", e))),
    }
}

/// Only same-origin paths are followed after login
fn safe_return_url(url: &str) -> Option<String> {
    let local = url.starts_with('/') && !url.starts_with("//") && !url.contains('\\');
    local.then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use chrono::Utc;
    use plugbridge_cloud::session::Session;
    use plugbridge_cloud::{CloudClient, CloudConfig};
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_state(config: CloudConfig) -> Arc<AppState> {
        Arc::new(AppState {
            cloud: Arc::new(CloudClient::new(config).unwrap()),
        })
    }

    fn configured(server: Option<&MockServer>) -> CloudConfig {
        let mut config = CloudConfig {
            app_id: Some("appid".to_string()),
            app_secret: Some("secret".to_string()),
            redirect_url: Some("https://bridge.example/oauth/callback".to_string()),
            ..Default::default()
        };
        if let Some(server) = server {
            config.base_urls.insert(Region::Eu, server.uri());
        }
        config
    }

    async fn logged_in(state: &AppState) {
        state
            .cloud
            .session()
            .replace(Session {
                access_token: "T".to_string(),
                refresh_token: None,
                expires_at: Utc::now() + chrono::Duration::hours(1),
                region: Region::Eu,
                api_key: None,
                created_at: Utc::now(),
            })
            .await;
    }

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_devices_without_session_is_not_authenticated() {
        let state = test_state(configured(None));
        let err = get_devices(State(state), Ok(Query(DevicesQuery::default())))
            .await
            .expect_err("no session should fail");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let body = body_of(err.into_response()).await;
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["error"], json!("not_authenticated"));
    }

    #[tokio::test]
    async fn test_devices_without_session_or_app_credentials() {
        let state = test_state(CloudConfig::default());
        let err = get_devices(State(state.clone()), Ok(Query(DevicesQuery::default())))
            .await
            .expect_err("no session should fail");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, "not_authenticated");

        let err = toggle(
            State(state),
            Ok(Json(ToggleBody {
                device_id: "d1".to_string(),
                state: "on".to_string(),
            })),
        )
        .await
        .expect_err("no session should fail");
        assert_eq!(err.code, "not_authenticated");
    }

    #[tokio::test]
    async fn test_login_without_app_credentials_is_config_missing() {
        let state = test_state(CloudConfig::default());
        let err = login(
            State(state),
            Ok(Json(LoginBody {
                email: "a@b.com".to_string(),
                password: "x".to_string(),
                region: None,
            })),
        )
        .await
        .expect_err("unconfigured app should fail");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "config_missing");
    }

    #[tokio::test]
    async fn test_login_with_unknown_region_is_rejected() {
        let state = test_state(configured(None));
        let err = login(
            State(state),
            Ok(Json(LoginBody {
                email: "a@b.com".to_string(),
                password: "x".to_string(),
                region: Some("mars".to_string()),
            })),
        )
        .await
        .expect_err("unknown region should fail");
        assert_eq!(err.code, "invalid_request");
    }

    #[tokio::test]
    async fn test_login_returns_devices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/user/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 0, "data": {"at": "T", "rt": "R"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/device/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 0,
                "data": {"thingList": [{"itemType": 1, "itemData": {
                    "deviceid": "d1", "name": "Lamp", "online": true, "params": {"switch": "on"}
                }}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let state = test_state(configured(Some(&server)));
        let Json(response) = login(
            State(state.clone()),
            Ok(Json(LoginBody {
                email: "a@b.com".to_string(),
                password: "x".to_string(),
                region: Some("".to_string()),
            })),
        )
        .await
        .unwrap();

        assert!(response.ok);
        assert_eq!(response.devices.len(), 1);
        assert_eq!(response.devices[0].id, "d1");
        assert!(state.cloud.session().is_authenticated().await);
    }

    #[tokio::test]
    async fn test_toggle_sends_command() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/device/thing/status"))
            .and(body_json(json!({"type": 1, "id": "d1", "params": {"switch": "on"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": 0})))
            .expect(1)
            .mount(&server)
            .await;

        let state = test_state(configured(Some(&server)));
        logged_in(&state).await;

        let Json(response) = toggle(
            State(state),
            Ok(Json(ToggleBody {
                device_id: "d1".to_string(),
                state: "on".to_string(),
            })),
        )
        .await
        .unwrap();
        assert!(response.ok);
    }

    #[tokio::test]
    async fn test_toggle_with_invalid_state_is_rejected() {
        let state = test_state(configured(None));
        logged_in(&state).await;

        let err = toggle(
            State(state),
            Ok(Json(ToggleBody {
                device_id: "d1".to_string(),
                state: "maybe".to_string(),
            })),
        )
        .await
        .expect_err("invalid state should fail");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "invalid_request");
    }

    #[tokio::test]
    async fn test_toggle_multi_requires_outlets() {
        let state = test_state(configured(None));
        logged_in(&state).await;

        let err = toggle_multi(
            State(state),
            Ok(Json(ToggleMultiBody {
                device_id: "d1".to_string(),
                outlets: vec![],
                state: "off".to_string(),
            })),
        )
        .await
        .expect_err("empty outlets should fail");
        assert_eq!(err.code, "invalid_request");
    }

    #[tokio::test]
    async fn test_authorize_redirects_to_hosted_page() {
        let state = test_state(configured(None));
        let response = authorize(
            State(state),
            Ok(Query(AuthorizeQuery {
                return_url: Some("https://evil.example/".to_string()),
            })),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://c2ccdn.coolkit.cc/oauth/index.html?"));
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state() {
        let state = test_state(configured(None));
        let err = oauth_callback(
            State(state),
            Ok(Query(CallbackQuery {
                code: Some("C".to_string()),
                state: Some("forged".to_string()),
                ..Default::default()
            })),
        )
        .await
        .expect_err("forged state should fail");
        assert_eq!(err.code, "invalid_oauth_state");
    }

    #[tokio::test]
    async fn test_callback_with_vendor_error() {
        let state = test_state(configured(None));
        let err = oauth_callback(
            State(state),
            Ok(Query(CallbackQuery {
                error: Some("access_denied".to_string()),
                ..Default::default()
            })),
        )
        .await
        .expect_err("vendor error should fail");
        assert_eq!(err.code, "auth_failed");
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let state = test_state(configured(None));
        logged_in(&state).await;

        let Json(response) = logout(State(state.clone())).await;
        assert!(response.ok);

        let Json(session) = get_session(State(state)).await;
        assert!(!session.session.authenticated);
        let body = serde_json::to_value(&session).unwrap();
        assert_eq!(body, json!({"ok": true, "authenticated": false, "canRefresh": false}));
    }

    #[test]
    fn test_safe_return_url() {
        assert_eq!(safe_return_url("/devices").as_deref(), Some("/devices"));
        assert_eq!(safe_return_url("//evil.example"), None);
        assert_eq!(safe_return_url("https://evil.example"), None);
        assert_eq!(safe_return_url("/\\evil.example"), None);
    }

    #[test]
    fn test_parse_region() {
        assert_eq!(parse_region(None).unwrap(), None);
        assert_eq!(parse_region(Some(" ")).unwrap(), None);
        assert_eq!(parse_region(Some("us")).unwrap(), Some(Region::Us));
        assert!(parse_region(Some("mars")).is_err());
    }
}
