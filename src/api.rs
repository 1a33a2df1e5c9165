//! Typed client for the backend authentication endpoints.
//!
//! Responses may be flat or wrapped as `{success, message, data}`; every
//! decoder goes through [`unwrap_envelope`] first so callers only ever see
//! the inner object.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use url::Url;

use crate::dashboard::DashboardLookup;
use crate::error::Error;
use crate::session::SessionStore;
use crate::types::{
    AuthGrant, Credentials, SessionId, SessionUser, SocialProfile, TenantHint, TenantId,
    TenantInfo, TokenInfo,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const LOGIN: &str = "/api/auth/login";
const CONFIRM_DUPLICATE_LOGIN: &str = "/api/auth/confirm-duplicate-login";
const LOGOUT: &str = "/api/auth/logout";
const OAUTH2_CONFIG: &str = "/api/auth/config/oauth2";
const OAUTH2_CALLBACK: &str = "/api/auth/oauth2/callback";
const TENANT_CHECK_MULTI: &str = "/api/auth/tenant/check-multi";
const TENANT_ACCESSIBLE: &str = "/api/auth/tenant/accessible";
const TENANT_SWITCH: &str = "/api/auth/tenant/switch";
const CURRENT_DASHBOARD: &str = "/api/v1/tenant/dashboards/current";
const SOCIAL_STATUS: &str = "/api/auth/social/status";
const SOCIAL_UNLINK: &str = "/api/auth/social/unlink";

/// Backend HTTP client.
///
/// Cookies are kept in a per-client jar so session-cookie authentication
/// works across calls. When a [`SessionStore`] is attached, its access token
/// is sent as a bearer token.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    timeout: Duration,
    session: Option<Arc<SessionStore>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the TLS backend cannot be initialized.
    pub fn new(base_url: Url) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            base_url,
            http,
            timeout: DEFAULT_TIMEOUT,
            session: None,
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Per-request timeout (default 30s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach the session whose access token authorizes requests.
    #[must_use]
    pub fn with_session(mut self, session: Arc<SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a backend path.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    // -- credential login --------------------------------------------------

    /// Submit credentials.
    ///
    /// A duplicate-session notice comes back as `Ok` with
    /// `requires_confirmation` set, even though the backend answers it with a
    /// 4xx status.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`] when the backend rejects the login,
    /// [`Error::Upstream`] for server faults and malformed bodies.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, Error> {
        let body = LoginRequest {
            email: &credentials.email,
            password: &credentials.password,
            confirm_terminate: None,
        };
        self.submit_login(LOGIN, &body, "login").await
    }

    /// Re-submit credentials with `confirmTerminate: true`, ending the other session.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::login`].
    pub async fn confirm_duplicate_login(
        &self,
        credentials: &Credentials,
    ) -> Result<LoginResponse, Error> {
        let body = LoginRequest {
            email: &credentials.email,
            password: &credentials.password,
            confirm_terminate: Some(true),
        };
        self.submit_login(CONFIRM_DUPLICATE_LOGIN, &body, "duplicate login confirmation")
            .await
    }

    /// Best-effort server-side logout.
    ///
    /// # Errors
    ///
    /// Transport failures and non-2xx answers.
    pub async fn logout(&self) -> Result<(), Error> {
        let response = self.send(self.request(Method::POST, LOGOUT)).await?;
        ensure_success(response, "logout").await.map(drop)
    }

    async fn submit_login(
        &self,
        path: &str,
        body: &LoginRequest<'_>,
        operation: &'static str,
    ) -> Result<LoginResponse, Error> {
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        let status = response.status();
        let text = response.text().await.map_err(Error::transport)?;

        let parsed = serde_json::from_str::<JsonValue>(&text)
            .ok()
            .map(unwrap_envelope)
            .and_then(|value| serde_json::from_value::<LoginResponse>(value).ok());

        match parsed {
            Some(login) if status.is_success() || login.requires_confirmation => Ok(login),
            _ if status.is_client_error() => {
                tracing::info!(operation, status = status.as_u16(), "Login rejected");
                Err(Error::InvalidCredentials)
            }
            None if status.is_success() => Err(Error::Upstream {
                operation,
                status: Some(status.as_u16()),
                detail: "malformed response body".into(),
            }),
            _ => Err(Error::Upstream {
                operation,
                status: Some(status.as_u16()),
                detail: text,
            }),
        }
    }

    // -- OAuth2 ------------------------------------------------------------

    /// Per-provider OAuth2 settings.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx answers and malformed bodies.
    pub async fn oauth2_config(&self) -> Result<HashMap<String, ProviderSettings>, Error> {
        let response = self.send(self.request(Method::GET, OAUTH2_CONFIG)).await?;
        let mut value: JsonValue = read_json(response, "oauth2 config").await?;
        if let Some(object) = value.as_object_mut() {
            object.remove("success");
            object.remove("message");
        }
        serde_json::from_value(value).map_err(|e| Error::Upstream {
            operation: "oauth2 config",
            status: None,
            detail: e.to_string(),
        })
    }

    /// Provider authorization URL issued by the backend.
    ///
    /// # Errors
    ///
    /// [`Error::MissingAuthUrl`] if the backend answers without one.
    pub async fn authorize_url(&self, provider: &str) -> Result<Url, Error> {
        let path = format!("/api/auth/oauth2/{provider}/authorize");
        let response = self.send(self.request(Method::GET, &path)).await?;
        let body: AuthorizeResponse = read_json(response, "oauth2 authorize").await?;

        let missing = || Error::MissingAuthUrl {
            provider: provider.to_owned(),
        };
        if !body.success.unwrap_or(true) {
            return Err(missing());
        }
        let raw = body.auth_url.filter(|u| !u.is_empty()).ok_or_else(missing)?;
        Url::parse(&raw).map_err(|e| {
            tracing::warn!(provider, error = %e, "Backend returned an unparsable authorization URL");
            missing()
        })
    }

    /// Forward an authorization code to the backend for exchange.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx answers and malformed bodies.
    pub async fn exchange_code(
        &self,
        exchange: &CallbackRequest<'_>,
    ) -> Result<CallbackResponse, Error> {
        let response = self
            .send(self.request(Method::POST, OAUTH2_CALLBACK).json(exchange))
            .await?;
        read_json(response, "oauth2 callback").await
    }

    /// Whether `email` has a `provider` account linked.
    ///
    /// # Errors
    ///
    /// [`Error::Upstream`] when the backend refuses the lookup, plus transport
    /// failures and malformed bodies.
    pub async fn social_account_status(
        &self,
        provider: &str,
        email: &str,
    ) -> Result<SocialAccountStatus, Error> {
        let builder = self
            .request(Method::GET, SOCIAL_STATUS)
            .query(&[("provider", provider), ("email", email)]);
        let response = self.send(builder).await?;
        let status: SocialAccountStatus = read_json(response, "social account status").await?;
        if status.success == Some(false) {
            return Err(Error::Upstream {
                operation: "social account status",
                status: None,
                detail: status.message.unwrap_or_else(|| "status lookup refused".into()),
            });
        }
        Ok(status)
    }

    /// Remove the link between `email` and its `provider` account.
    ///
    /// # Errors
    ///
    /// [`Error::Upstream`] when the backend refuses the unlink, plus transport
    /// failures and malformed bodies.
    pub async fn unlink_social_account(&self, provider: &str, email: &str) -> Result<(), Error> {
        let builder = self
            .request(Method::DELETE, SOCIAL_UNLINK)
            .query(&[("provider", provider), ("email", email)]);
        let response = self.send(builder).await?;
        let body: Acknowledgement = read_json(response, "social account unlink").await?;
        if !body.success {
            return Err(Error::Upstream {
                operation: "social account unlink",
                status: None,
                detail: body.message.unwrap_or_else(|| "unlink refused".into()),
            });
        }
        Ok(())
    }

    // -- tenancy -----------------------------------------------------------

    /// Whether the current identity can act in more than one tenant.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx answers and malformed bodies.
    pub async fn check_multi_tenant(&self) -> Result<bool, Error> {
        let response = self.send(self.request(Method::GET, TENANT_CHECK_MULTI)).await?;
        let body: TenantCheckResponse = read_json(response, "multi-tenant check").await?;
        Ok(body.is_multi_tenant)
    }

    /// Tenants the current identity can act in.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx answers and malformed bodies.
    pub async fn accessible_tenants(&self) -> Result<Vec<TenantInfo>, Error> {
        let response = self.send(self.request(Method::GET, TENANT_ACCESSIBLE)).await?;
        let body: AccessibleTenantsResponse = read_json(response, "accessible tenants").await?;
        Ok(body.tenants.unwrap_or_default())
    }

    /// Make `tenant_id` the active tenant of the server-side session.
    ///
    /// # Errors
    ///
    /// [`Error::Upstream`] if the backend refuses the switch.
    pub async fn switch_tenant(&self, tenant_id: &TenantId) -> Result<TenantSwitch, Error> {
        let body = serde_json::json!({ "tenantId": tenant_id });
        let response = self
            .send(self.request(Method::POST, TENANT_SWITCH).json(&body))
            .await?;
        let switch: TenantSwitch = read_json(response, "tenant switch").await?;
        if !switch.success {
            return Err(Error::Upstream {
                operation: "tenant switch",
                status: None,
                detail: switch.message.unwrap_or_else(|| "switch refused".into()),
            });
        }
        Ok(switch)
    }

    // -- internals ---------------------------------------------------------

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.endpoint(path))
            .timeout(self.timeout);
        if let Some(token) = self.session.as_ref().and_then(|s| s.access_token()) {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, Error> {
        builder.send().await.map_err(Error::transport)
    }
}

impl DashboardLookup for ApiClient {
    async fn current_dashboard(&self, tenant_role_id: &str) -> Result<Option<String>, Error> {
        let builder = self
            .request(Method::GET, CURRENT_DASHBOARD)
            .query(&[("tenantRoleId", tenant_role_id)]);
        let response = self.send(builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: CurrentDashboard = read_json(response, "dashboard lookup").await?;
        Ok(body.dashboard_path.filter(|p| !p.is_empty()))
    }
}

/// Unwrap `{success, data}` envelopes, carrying `success`/`message` inward.
///
/// Anything that is not an envelope is returned unchanged.
#[must_use]
pub fn unwrap_envelope(value: JsonValue) -> JsonValue {
    let JsonValue::Object(mut outer) = value else {
        return value;
    };
    if !outer.contains_key("success") {
        return JsonValue::Object(outer);
    }
    match outer.remove("data") {
        Some(JsonValue::Object(mut inner)) => {
            for key in ["success", "message"] {
                if !inner.contains_key(key) {
                    if let Some(v) = outer.remove(key) {
                        inner.insert(key.to_owned(), v);
                    }
                }
            }
            JsonValue::Object(inner)
        }
        Some(JsonValue::Null) | None => JsonValue::Object(outer),
        Some(other) => {
            outer.insert("data".to_owned(), other);
            JsonValue::Object(outer)
        }
    }
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(operation, status, "Backend request failed");
    Err(Error::Upstream {
        operation,
        status: Some(status),
        detail: body,
    })
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<T, Error> {
    let response = ensure_success(response, operation).await?;
    let value = response.json::<JsonValue>().await.map_err(|e| {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Upstream {
                operation,
                status: None,
                detail: format!("malformed response body: {e}"),
            }
        }
    })?;
    serde_json::from_value(unwrap_envelope(value)).map_err(|e| Error::Upstream {
        operation,
        status: None,
        detail: e.to_string(),
    })
}

/// Shared tenancy interpretation for login and OAuth2 responses.
fn tenant_hint(
    is_multi_tenant: Option<bool>,
    requires_selection: bool,
    tenants: Option<Vec<TenantInfo>>,
) -> TenantHint {
    let tenants = tenants.unwrap_or_default();
    match is_multi_tenant {
        Some(false) => TenantHint::Single,
        Some(true) if !tenants.is_empty() => TenantHint::Multiple(tenants),
        None if requires_selection && !tenants.is_empty() => TenantHint::Multiple(tenants),
        _ => TenantHint::Unknown,
    }
}

fn token_info(
    access_token: Option<String>,
    refresh_token: Option<String>,
    session_id: Option<String>,
) -> TokenInfo {
    TokenInfo {
        access_token: access_token.filter(|t| !t.is_empty()),
        refresh_token: refresh_token.filter(|t| !t.is_empty()),
        session_id: session_id.filter(|s| !s.is_empty()).map(SessionId),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirm_terminate: Option<bool>,
}

/// Body of `POST /api/auth/oauth2/callback`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest<'a> {
    pub provider: &'a str,
    pub code: &'a str,
    pub state: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<&'a str>,
}

/// Answer to a credential login or duplicate-login confirmation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_multi_tenant: Option<bool>,
    #[serde(default)]
    pub requires_tenant_selection: bool,
    #[serde(default)]
    pub accessible_tenants: Option<Vec<TenantInfo>>,
}

impl LoginResponse {
    /// The authenticated grant, if this response carries one.
    #[must_use]
    pub fn into_grant(self) -> Option<AuthGrant> {
        if !self.success {
            return None;
        }
        let user = self.user?;
        Some(AuthGrant {
            user,
            tokens: token_info(self.access_token, self.refresh_token, self.session_id),
            tenant_hint: tenant_hint(
                self.is_multi_tenant,
                self.requires_tenant_selection,
                self.accessible_tenants,
            ),
        })
    }
}

/// Answer to an OAuth2 code exchange.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CallbackResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "user")]
    pub user_info: Option<SessionUser>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub requires_signup: bool,
    #[serde(default)]
    pub requires_account_integration: bool,
    #[serde(default)]
    pub social_user_info: Option<SocialProfile>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_multi_tenant: Option<bool>,
    #[serde(default)]
    pub requires_tenant_selection: bool,
    #[serde(default)]
    pub accessible_tenants: Option<Vec<TenantInfo>>,
}

impl CallbackResponse {
    #[must_use]
    pub fn into_grant(self) -> Option<AuthGrant> {
        if !self.success {
            return None;
        }
        let user = self.user_info?;
        Some(AuthGrant {
            user,
            tokens: token_info(self.access_token, self.refresh_token, self.session_id),
            tenant_hint: tenant_hint(
                self.is_multi_tenant,
                self.requires_tenant_selection,
                self.accessible_tenants,
            ),
        })
    }
}

/// One provider's entry in the OAuth2 configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ProviderSettings {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ProviderSettings {
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            client_id: None,
            extra: Map::new(),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    auth_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantCheckResponse {
    #[serde(default)]
    is_multi_tenant: bool,
}

#[derive(Deserialize)]
struct AccessibleTenantsResponse {
    #[serde(default)]
    tenants: Option<Vec<TenantInfo>>,
}

/// Answer to `POST /api/auth/tenant/switch`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TenantSwitch {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Tenant-scoped role, when the backend reports one.
    #[serde(default)]
    pub tenant_role: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl TenantSwitch {
    #[must_use]
    pub fn scoped_role(&self) -> Option<&str> {
        self.tenant_role.as_deref().or(self.role.as_deref())
    }
}

/// Link state of one social account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SocialAccountStatus {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default, alias = "isLinked")]
    pub linked: bool,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Deserialize)]
struct Acknowledgement {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentDashboard {
    #[serde(default, alias = "path")]
    dashboard_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_is_unwrapped() {
        let wrapped = json!({
            "success": true,
            "message": "ok",
            "data": { "user": { "id": 1 }, "sessionId": "S1" }
        });
        let inner = unwrap_envelope(wrapped);
        assert_eq!(inner["sessionId"], "S1");
        assert_eq!(inner["success"], true);
        assert_eq!(inner["message"], "ok");
    }

    #[test]
    fn test_inner_fields_win_over_envelope() {
        let wrapped = json!({
            "success": false,
            "message": "outer",
            "data": { "requiresConfirmation": true, "message": "inner" }
        });
        let inner = unwrap_envelope(wrapped);
        assert_eq!(inner["message"], "inner");
        assert_eq!(inner["success"], false);
    }

    #[test]
    fn test_flat_and_non_object_data_pass_through() {
        let flat = json!({ "success": true, "authUrl": "https://kauth.example/x" });
        assert_eq!(unwrap_envelope(flat.clone()), flat);

        let list = json!({ "success": true, "data": [1, 2] });
        assert_eq!(unwrap_envelope(list.clone()), list);

        let no_success = json!({ "data": { "a": 1 } });
        assert_eq!(unwrap_envelope(no_success.clone()), no_success);
    }

    #[test]
    fn test_login_response_without_user_has_no_grant() {
        let response: LoginResponse =
            serde_json::from_value(json!({ "success": true, "message": "odd" })).unwrap();
        assert!(response.into_grant().is_none());
    }

    #[test]
    fn test_session_based_login_grant() {
        let response: LoginResponse = serde_json::from_value(json!({
            "success": true,
            "user": { "id": 9, "role": "CLIENT" },
            "sessionId": "ABC",
            "accessToken": ""
        }))
        .unwrap();
        let grant = response.into_grant().unwrap();
        assert_eq!(grant.tokens.session_id, Some(SessionId("ABC".into())));
        assert_eq!(grant.tokens.access_token, None);
        assert_eq!(grant.tenant_hint, TenantHint::Unknown);
    }

    #[test]
    fn test_tenant_hint_interpretation() {
        let two = || Some(vec![TenantInfo::new("T1", "A"), TenantInfo::new("T2", "B")]);
        assert_eq!(tenant_hint(Some(false), true, two()), TenantHint::Single);
        assert!(matches!(tenant_hint(Some(true), false, two()), TenantHint::Multiple(t) if t.len() == 2));
        assert!(matches!(tenant_hint(None, true, two()), TenantHint::Multiple(_)));
        assert_eq!(tenant_hint(None, false, two()), TenantHint::Unknown);
        assert_eq!(tenant_hint(Some(true), true, None), TenantHint::Unknown);
    }

    #[test]
    fn test_provider_settings_default_enabled() {
        let settings: HashMap<String, ProviderSettings> = serde_json::from_value(json!({
            "kakao": { "clientId": "k-1", "redirectUri": "https://app/cb" },
            "naver": { "enabled": false }
        }))
        .unwrap();
        assert!(settings["kakao"].enabled);
        assert_eq!(settings["kakao"].client_id.as_deref(), Some("k-1"));
        assert_eq!(settings["kakao"].extra["redirectUri"], "https://app/cb");
        assert!(!settings["naver"].enabled);
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = ApiClient::new("https://api.example.com/".parse().unwrap()).unwrap();
        assert_eq!(
            client.endpoint("/api/auth/login"),
            "https://api.example.com/api/auth/login"
        );
        let prefixed = ApiClient::new("https://example.com/backend".parse().unwrap()).unwrap();
        assert_eq!(
            prefixed.endpoint("/api/auth/login"),
            "https://example.com/backend/api/auth/login"
        );
    }

    #[test]
    fn test_social_account_status_accepts_both_link_flags() {
        let status: SocialAccountStatus = serde_json::from_value(unwrap_envelope(json!({
            "success": true,
            "data": { "isLinked": true, "provider": "kakao", "linkedAt": "2025-03-01" }
        })))
        .unwrap();
        assert!(status.linked);
        assert_eq!(status.success, Some(true));
        assert_eq!(status.extra["linkedAt"], "2025-03-01");

        let status: SocialAccountStatus =
            serde_json::from_value(json!({ "linked": false })).unwrap();
        assert!(!status.linked);
        assert_eq!(status.success, None);
    }

    #[test]
    fn test_callback_request_omits_missing_verifier() {
        let body = CallbackRequest {
            provider: "kakao",
            code: "c",
            state: "s",
            code_verifier: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, json!({ "provider": "kakao", "code": "c", "state": "s" }));
    }
}
