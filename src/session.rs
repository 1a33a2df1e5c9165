//! Persisted session record with a sliding expiry window.
//!
//! [`SessionStore`] is the single owner of the session keys in local storage.
//! Every other component reads the current user, role or tokens through it.
//!
//! A session is live only while a user record is stored, a token or session
//! id is stored, and the current time is before the stored expiry. Any check
//! that finds one of those clauses violated clears every session key.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::storage::{PersistentStore, Storage};
use crate::types::{SessionId, SessionRecord, SessionUser, TenantId, TokenInfo, UserId};

pub const USER_KEY: &str = "user";
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const SESSION_ID_KEY: &str = "sessionId";
pub const LOGIN_TIME_KEY: &str = "loginTime";
pub const SESSION_EXPIRY_KEY: &str = "sessionExpiry";

/// Every key the session store writes.
pub const SESSION_KEYS: [&str; 6] = [
    USER_KEY,
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    SESSION_ID_KEY,
    LOGIN_TIME_KEY,
    SESSION_EXPIRY_KEY,
];

const TOKEN_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_ID_KEY];

pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(24);
/// Longest session lifetime accepted from configuration.
pub const MAX_SESSION_TTL: Duration = Duration::days(365);

const EVENT_CAPACITY: usize = 16;

/// Change notification for other views sharing the same storage.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionEvent {
    Established { user_id: UserId },
    Refreshed,
    TenantSwitched { tenant_id: TenantId },
    Cleared,
}

pub struct SessionStore {
    store: PersistentStore,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: PersistentStore::new(storage, "local"),
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_SESSION_TTL,
            events,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Receive [`SessionEvent`]s for every mutation made through this store.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Startup check: returns whether a live session was found.
    ///
    /// Expired, partial or corrupt session data is cleared.
    pub fn initialize(&self) -> bool {
        let live = self.is_live();
        if live {
            tracing::debug!("Existing session restored");
        } else {
            tracing::debug!("No live session at startup");
        }
        live
    }

    /// Store a fresh session for `user`. Returns `false` if any write failed.
    pub fn set_session(&self, user: &SessionUser, tokens: &TokenInfo) -> bool {
        let now = self.clock.now();
        let Some(expiry) = now.checked_add(self.ttl) else {
            tracing::error!(user_id = %user.id, ttl = %self.ttl, "Session lifetime out of range");
            return false;
        };

        for key in TOKEN_KEYS {
            self.store.remove(key);
        }

        if !self.store.set(USER_KEY, user) {
            tracing::error!(user_id = %user.id, "Failed to store session user");
            return false;
        }

        if !self.write_window(now, expiry) || !self.write_tokens(tokens) {
            tracing::error!(user_id = %user.id, "Failed to store session timestamps or tokens");
            return false;
        }

        tracing::info!(
            user_id = %user.id,
            role = user.role.as_deref().unwrap_or("-"),
            "Session established"
        );
        let _ = self.events.send(SessionEvent::Established {
            user_id: user.id.clone(),
        });
        true
    }

    #[must_use]
    pub fn user(&self) -> Option<SessionUser> {
        self.store.get(USER_KEY)
    }

    #[must_use]
    pub fn role(&self) -> Option<String> {
        self.user().and_then(|u| u.role)
    }

    #[must_use]
    pub fn tokens(&self) -> TokenInfo {
        TokenInfo {
            access_token: self.store.get(ACCESS_TOKEN_KEY),
            refresh_token: self.store.get(REFRESH_TOKEN_KEY),
            session_id: self.store.get::<SessionId>(SESSION_ID_KEY),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    #[must_use]
    pub fn login_time(&self) -> Option<OffsetDateTime> {
        self.store.get::<i64>(LOGIN_TIME_KEY).and_then(from_millis)
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.store.get::<i64>(SESSION_EXPIRY_KEY).and_then(from_millis)
    }

    /// Whether the stored session is usable right now; clears it if not.
    pub fn is_live(&self) -> bool {
        let user = self.user();
        let has_credential = {
            let tokens = self.tokens();
            tokens.access_token.is_some() || tokens.session_id.is_some()
        };
        let unexpired = self
            .expires_at()
            .is_some_and(|expiry| self.clock.now() < expiry);

        if user.is_some() && has_credential && unexpired {
            return true;
        }

        if self.has_any_key() {
            if user.is_some() && !unexpired {
                tracing::info!("Session expired, clearing");
            } else {
                tracing::warn!("Incomplete session data found, clearing");
            }
            self.clear();
        }
        false
    }

    /// Replace token fields and slide the expiry window forward.
    ///
    /// Requires a stored user. The new expiry is always strictly later than
    /// the previous one.
    pub fn refresh(&self, tokens: &TokenInfo) -> bool {
        let Some(user) = self.user() else {
            tracing::warn!("Session refresh without a stored user");
            return false;
        };

        let now = self.clock.now();
        let mut next = now.checked_add(self.ttl);
        if let (Some(expiry), Some(previous)) = (next, self.expires_at()) {
            if expiry <= previous {
                next = previous.checked_add(Duration::milliseconds(1));
            }
        }
        let Some(expiry) = next else {
            tracing::error!(user_id = %user.id, ttl = %self.ttl, "Session lifetime out of range");
            return false;
        };

        if !self.write_tokens(tokens) || !self.write_window(now, expiry) {
            tracing::error!(user_id = %user.id, "Failed to refresh session");
            return false;
        }

        tracing::debug!(user_id = %user.id, "Session refreshed");
        let _ = self.events.send(SessionEvent::Refreshed);
        true
    }

    /// Point the stored user at `tenant_id` with that tenant's scoped role.
    ///
    /// The previous tenant's role and role id are dropped; `None` leaves the
    /// account role in effect.
    pub fn update_tenant(&self, tenant_id: &TenantId, tenant_role: Option<&str>) -> bool {
        let Some(mut user) = self.user() else {
            return false;
        };
        user.tenant_id = Some(tenant_id.clone());
        user.tenant_role = tenant_role.map(str::to_owned);
        user.tenant_role_id = None;
        if !self.store.set(USER_KEY, &user) {
            return false;
        }

        tracing::info!(user_id = %user.id, tenant_id = %tenant_id, "Tenant switched");
        let _ = self.events.send(SessionEvent::TenantSwitched {
            tenant_id: tenant_id.clone(),
        });
        true
    }

    /// Time left before expiry; zero when no live session exists.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        if !self.is_live() {
            return Duration::ZERO;
        }
        self.expires_at()
            .map(|expiry| expiry - self.clock.now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<SessionRecord> {
        if !self.is_live() {
            return None;
        }
        Some(SessionRecord {
            user: self.user()?,
            tokens: self.tokens(),
            login_time: self.login_time()?,
            expires_at: self.expires_at()?,
        })
    }

    /// Remove every session key. Safe to call repeatedly.
    pub fn clear(&self) -> bool {
        let had_session = self.has_any_key();
        let mut all_removed = true;
        for key in SESSION_KEYS {
            all_removed &= self.store.remove(key);
        }
        if had_session {
            tracing::info!("Session cleared");
            let _ = self.events.send(SessionEvent::Cleared);
        }
        all_removed
    }

    fn has_any_key(&self) -> bool {
        SESSION_KEYS.iter().any(|key| self.store.contains(key))
    }

    fn write_window(&self, login: OffsetDateTime, expiry: OffsetDateTime) -> bool {
        self.store.set(LOGIN_TIME_KEY, &to_millis(login))
            && self.store.set(SESSION_EXPIRY_KEY, &to_millis(expiry))
    }

    fn write_tokens(&self, tokens: &TokenInfo) -> bool {
        let mut ok = true;
        if let Some(access) = &tokens.access_token {
            ok &= self.store.set_raw(ACCESS_TOKEN_KEY, access);
        }
        if let Some(refresh) = &tokens.refresh_token {
            ok &= self.store.set_raw(REFRESH_TOKEN_KEY, refresh);
        }
        if let Some(session_id) = &tokens.session_id {
            ok &= self.store.set(SESSION_ID_KEY, session_id);
        }
        ok
    }
}

fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}
