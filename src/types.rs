use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use time::OffsetDateTime;

/// Identifier as sent by the backend: numeric or string.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Num(i64),
    Str(String),
}

impl From<IdRepr> for String {
    fn from(id: IdRepr) -> Self {
        match id {
            IdRepr::Num(n) => n.to_string(),
            IdRepr::Str(s) => s,
        }
    }
}

/// Backend user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(from = "IdRepr", into = "String")]
pub struct UserId(pub String);

impl From<IdRepr> for UserId {
    fn from(id: IdRepr) -> Self {
        Self(id.into())
    }
}

/// Tenant (organization) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(from = "IdRepr", into = "String")]
pub struct TenantId(pub String);

impl From<IdRepr> for TenantId {
    fn from(id: IdRepr) -> Self {
        Self(id.into())
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Server-side session identifier, used instead of tokens by session-based auth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// Authenticated user as stored in the session record.
///
/// Only the fields the lifecycle reads are typed; everything else the backend
/// sends is kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SessionUser {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    /// Role scoped to the current tenant, when the backend assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_role: Option<String>,
    /// Identifier of the tenant role, used for dynamic dashboard lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_role_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl SessionUser {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            role: None,
            tenant_id: None,
            tenant_role: None,
            tenant_role_id: None,
            name: None,
            nickname: None,
            username: None,
            email: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(TenantId(tenant_id.into()));
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Tenant-scoped role if present, otherwise the account role.
    #[must_use]
    pub fn effective_role(&self) -> Option<&str> {
        self.tenant_role.as_deref().or(self.role.as_deref())
    }

    /// Best display name: name, then nickname, then username.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.nickname.as_deref())
            .or(self.username.as_deref())
    }
}

/// Credentials of a session: a token pair, a server session id, or both.
#[derive(Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct TokenInfo {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub session_id: Option<SessionId>,
}

impl TokenInfo {
    #[must_use]
    pub fn bearer(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            session_id: None,
        }
    }

    #[must_use]
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            session_id: Some(SessionId(session_id.into())),
        }
    }

    /// True when neither a token nor a session id is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.session_id.is_none()
    }
}

impl std::fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenInfo")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Snapshot of everything persisted for the current session.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct SessionRecord {
    pub user: SessionUser,
    pub tokens: TokenInfo,
    pub login_time: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Login payload. Held in memory only and never serialized to storage.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One tenant the authenticated identity can act in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TenantInfo {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub tenant_name: String,
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tenant_role: Option<String>,
}

impl TenantInfo {
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, tenant_name: impl Into<String>) -> Self {
        Self {
            tenant_id: TenantId(tenant_id.into()),
            tenant_name: tenant_name.into(),
            business_type: None,
            status: None,
            role: None,
            tenant_role: None,
        }
    }

    #[must_use]
    pub fn with_tenant_role(mut self, role: impl Into<String>) -> Self {
        self.tenant_role = Some(role.into());
        self
    }

    /// Role scoped to this tenant: `tenantRole`, falling back to `role`.
    #[must_use]
    pub fn scoped_role(&self) -> Option<&str> {
        self.tenant_role.as_deref().or(self.role.as_deref())
    }
}

/// Provider profile handed back when a social login has no local account yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SocialProfile {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, alias = "providerId")]
    pub provider_user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default, alias = "profileImage")]
    pub profile_image_url: Option<String>,
}

/// What an authentication response said about tenancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantHint {
    /// The response did not say; the flow must ask the backend.
    Unknown,
    Single,
    Multiple(Vec<TenantInfo>),
}

/// A successful authentication, before the session record is written.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthGrant {
    pub user: SessionUser,
    pub tokens: TokenInfo,
    pub tenant_hint: TenantHint,
}
