//! `OAuth2` social login: authorization redirect and callback handling.
//!
//! The backend owns the provider registrations; this side only asks it for an
//! authorization URL, protects the round trip with `state` (and PKCE where the
//! provider needs it), and forwards the returned code for exchange.
//!
//! ```rust,ignore
//! let social = SocialLogin::new(api, Arc::new(MemoryStorage::new()));
//! let redirect = social.begin_authorization(Provider::Kakao).await?;
//! // navigate to redirect.url ...
//! let params = CallbackParams::from_query(&callback_url);
//! match social.handle_callback(Provider::Kakao, &params).await? {
//!     Exchange::Authenticated(grant) => { /* establish the session */ }
//!     Exchange::SignupRequired(profile) => { /* prefill signup */ }
//!     Exchange::AccountIntegrationRequired(profile) => { /* link accounts */ }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use url::Url;

use crate::api::{ApiClient, CallbackRequest, ProviderSettings, SocialAccountStatus};
use crate::error::Error;
use crate::pkce;
use crate::session::SessionStore;
use crate::storage::{PersistentStore, Storage, StorageError};
use crate::types::{AuthGrant, SocialProfile};

pub const STATE_KEY: &str = "oauth_state";
pub const CODE_VERIFIER_KEY: &str = "pkce_code_verifier";
/// Marker left while a signup or account-integration form is pending.
pub const SIGNUP_PENDING_KEY: &str = "social_signup_pending";

pub const DEFAULT_CONFIG_TTL: Duration = Duration::from_secs(300);

/// Supported social login providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Kakao,
    Naver,
    Google,
    Facebook,
}

impl Provider {
    pub const ALL: [Provider; 4] = [Self::Kakao, Self::Naver, Self::Google, Self::Facebook];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kakao => "kakao",
            Self::Naver => "naver",
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown OAuth2 provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownProvider(s.to_owned()))
    }
}

/// Where to send the browser, plus the values persisted for the callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRedirect {
    pub url: Url,
    pub state: String,
    /// Present only for providers that use PKCE.
    pub code_challenge: Option<String>,
}

/// Query parameters of the provider redirect back to the application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    #[must_use]
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }

    /// Read `code`, `state`, `error` and `error_description` from a callback URL.
    #[must_use]
    pub fn from_query(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }
}

/// Successful outcomes of a code exchange.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Exchange {
    Authenticated(AuthGrant),
    /// The provider knows the user but no local account exists yet.
    SignupRequired(SocialProfile),
    /// A local account exists under the same email and must be linked first.
    AccountIntegrationRequired(SocialProfile),
}

type ProviderConfig = Arc<HashMap<String, ProviderSettings>>;

/// Social login driver.
///
/// `transient` is the tab-scoped storage (`sessionStorage` in a browser)
/// that survives the provider redirect.
pub struct SocialLogin {
    api: ApiClient,
    transient: PersistentStore,
    pkce_providers: HashSet<Provider>,
    config_ttl: Duration,
    config_cache: Mutex<Option<(Instant, ProviderConfig)>>,
}

impl SocialLogin {
    #[must_use]
    pub fn new(api: ApiClient, transient: Arc<dyn Storage>) -> Self {
        Self {
            api,
            transient: PersistentStore::new(transient, "session"),
            pkce_providers: HashSet::from([Provider::Google]),
            config_ttl: DEFAULT_CONFIG_TTL,
            config_cache: Mutex::new(None),
        }
    }

    /// Providers that get a PKCE verifier (default: Google).
    #[must_use]
    pub fn with_pkce_providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.pkce_providers = providers.into_iter().collect();
        self
    }

    /// How long a fetched provider configuration is reused (default 5 minutes).
    #[must_use]
    pub fn with_config_ttl(mut self, ttl: Duration) -> Self {
        self.config_ttl = ttl;
        self
    }

    #[must_use]
    pub fn uses_pkce(&self, provider: Provider) -> bool {
        self.pkce_providers.contains(&provider)
    }

    /// Provider configuration, cached for the configured TTL.
    ///
    /// Falls back to every provider enabled when the backend cannot be read.
    /// The fallback is not cached.
    pub async fn provider_config(&self) -> ProviderConfig {
        let cached = self
            .config_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|(fetched_at, _)| fetched_at.elapsed() < self.config_ttl)
            .map(|(_, config)| Arc::clone(config));
        if let Some(config) = cached {
            return config;
        }

        match self.api.oauth2_config().await {
            Ok(config) => {
                let config = Arc::new(config);
                *self
                    .config_cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) =
                    Some((Instant::now(), Arc::clone(&config)));
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load OAuth2 config, using defaults");
                Arc::new(default_provider_config())
            }
        }
    }

    /// Whether `provider` is enabled. Providers missing from the configuration are disabled.
    pub async fn is_enabled(&self, provider: Provider) -> bool {
        self.provider_config()
            .await
            .get(provider.as_str())
            .is_some_and(|settings| settings.enabled)
    }

    /// Request the provider authorization URL and prepare the round trip.
    ///
    /// Nothing is persisted unless the backend returns a URL.
    ///
    /// # Errors
    ///
    /// [`Error::Provider`] if the provider is disabled,
    /// [`Error::MissingAuthUrl`] or a transport error if no URL was obtained,
    /// [`Error::Storage`] if `state` could not be persisted.
    pub async fn begin_authorization(
        &self,
        provider: Provider,
    ) -> Result<AuthorizationRedirect, Error> {
        if !self.is_enabled(provider).await {
            return Err(Error::Provider {
                error: "provider_disabled".into(),
                description: Some(format!("{provider} login is disabled")),
            });
        }

        let mut url = self.api.authorize_url(provider.as_str()).await?;

        let state = pkce::generate_state();
        self.persist(STATE_KEY, &state)?;

        let code_challenge = if self.uses_pkce(provider) {
            let verifier = pkce::generate_code_verifier();
            if let Err(e) = self.persist(CODE_VERIFIER_KEY, &verifier) {
                self.clear_transient();
                return Err(e);
            }
            Some(pkce::generate_code_challenge(&verifier))
        } else {
            self.transient.remove(CODE_VERIFIER_KEY);
            None
        };

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("state", &state);
            if let Some(challenge) = &code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }

        tracing::info!(%provider, pkce = code_challenge.is_some(), "Redirecting to OAuth2 provider");
        Ok(AuthorizationRedirect {
            url,
            state,
            code_challenge,
        })
    }

    /// Validate the provider redirect and exchange the code.
    ///
    /// The persisted `state` and verifier are single-use: they are removed
    /// before the exchange whatever its outcome.
    ///
    /// # Errors
    ///
    /// [`Error::Provider`] when the provider reported an error,
    /// [`Error::StateMismatch`] when `state` is missing or differs (no
    /// exchange is attempted), [`Error::Upstream`] or a transport error when
    /// the exchange fails.
    pub async fn handle_callback(
        &self,
        provider: Provider,
        params: &CallbackParams,
    ) -> Result<Exchange, Error> {
        if let Some(error) = &params.error {
            tracing::warn!(%provider, error = %error, "OAuth2 provider returned an error");
            self.clear_transient();
            return Err(Error::Provider {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }

        let saved_state: Option<String> = self.transient.get(STATE_KEY);
        let state = match (saved_state, params.state.as_deref()) {
            (Some(saved), Some(received)) if saved == received => saved,
            (saved, _) => {
                tracing::warn!(
                    %provider,
                    persisted = saved.is_some(),
                    "OAuth2 state validation failed"
                );
                self.clear_transient();
                return Err(Error::StateMismatch);
            }
        };

        let code_verifier: Option<String> = self.transient.get(CODE_VERIFIER_KEY);
        self.transient.remove(STATE_KEY);
        self.transient.remove(CODE_VERIFIER_KEY);

        let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
            return Err(Error::Provider {
                error: "missing_code".into(),
                description: None,
            });
        };

        let request = CallbackRequest {
            provider: provider.as_str(),
            code,
            state: &state,
            code_verifier: code_verifier.as_deref(),
        };
        let response = self.api.exchange_code(&request).await?;

        if response.requires_account_integration || response.requires_signup {
            let integration = response.requires_account_integration;
            let mut profile = response.social_user_info.unwrap_or_default();
            profile.provider.get_or_insert_with(|| provider.as_str().to_owned());
            self.transient.set(SIGNUP_PENDING_KEY, provider.as_str());
            tracing::info!(%provider, integration, "Social login needs a local account");
            return Ok(if integration {
                Exchange::AccountIntegrationRequired(profile)
            } else {
                Exchange::SignupRequired(profile)
            });
        }

        let message = response.message.clone();
        match response.into_grant() {
            Some(grant) => {
                self.transient.remove(SIGNUP_PENDING_KEY);
                tracing::info!(%provider, user_id = %grant.user.id, "OAuth2 exchange succeeded");
                Ok(Exchange::Authenticated(grant))
            }
            None => Err(Error::Upstream {
                operation: "oauth2 callback",
                status: None,
                detail: message.unwrap_or_else(|| "authentication failed".into()),
            }),
        }
    }

    /// Link state of the `provider` account for `email`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::social_account_status`].
    pub async fn account_status(
        &self,
        provider: Provider,
        email: &str,
    ) -> Result<SocialAccountStatus, Error> {
        self.api.social_account_status(provider.as_str(), email).await
    }

    /// Unlink the `provider` account from `email`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::unlink_social_account`].
    pub async fn unlink(&self, provider: Provider, email: &str) -> Result<(), Error> {
        self.api.unlink_social_account(provider.as_str(), email).await?;
        tracing::info!(%provider, "Social account unlinked");
        Ok(())
    }

    /// Provider of a pending signup or account-integration form, if any.
    #[must_use]
    pub fn pending_signup(&self) -> Option<Provider> {
        self.transient
            .get::<String>(SIGNUP_PENDING_KEY)
            .and_then(|name| name.parse().ok())
    }

    /// Clear the session record and every transient `OAuth2` key.
    pub fn logout(&self, session: &SessionStore) -> bool {
        let cleared = session.clear();
        self.clear_transient() && cleared
    }

    fn persist(&self, key: &str, value: &str) -> Result<(), Error> {
        if self.transient.set(key, value) {
            Ok(())
        } else {
            Err(StorageError::NotPersisted { key: key.to_owned() }.into())
        }
    }

    fn clear_transient(&self) -> bool {
        [STATE_KEY, CODE_VERIFIER_KEY, SIGNUP_PENDING_KEY]
            .into_iter()
            .fold(true, |ok, key| self.transient.remove(key) && ok)
    }
}

/// Every provider enabled, no client ids.
#[must_use]
pub fn default_provider_config() -> HashMap<String, ProviderSettings> {
    Provider::ALL
        .into_iter()
        .map(|p| (p.as_str().to_owned(), ProviderSettings::enabled()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::storage::test_support::DisabledStorage;

    fn offline_api() -> ApiClient {
        // Port 9 (discard) is never served in the test environment.
        ApiClient::new("http://127.0.0.1:9".parse().unwrap())
            .unwrap()
            .with_timeout(Duration::from_millis(200))
    }

    fn social(storage: Arc<MemoryStorage>) -> SocialLogin {
        SocialLogin::new(offline_api(), storage)
    }

    #[test]
    fn test_provider_round_trips_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.to_string().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!("KAKAO".parse::<Provider>().unwrap(), Provider::Kakao);
        assert!("github".parse::<Provider>().is_err());
    }

    #[test]
    fn test_callback_params_from_query() {
        let url: Url = "https://app.example/auth/kakao/callback?code=abc&state=xyz&extra=1"
            .parse()
            .unwrap();
        assert_eq!(CallbackParams::from_query(&url), CallbackParams::new("abc", "xyz"));

        let denied: Url =
            "https://app.example/cb?error=access_denied&error_description=User%20cancelled"
                .parse()
                .unwrap();
        let params = CallbackParams::from_query(&denied);
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User cancelled"));
        assert!(params.code.is_none());
    }

    #[test]
    fn test_default_config_enables_all_providers() {
        let config = default_provider_config();
        assert_eq!(config.len(), 4);
        assert!(config.values().all(|s| s.enabled));
    }

    #[test]
    fn test_pkce_defaults_to_google_only() {
        let social = social(Arc::new(MemoryStorage::new()));
        assert!(social.uses_pkce(Provider::Google));
        assert!(!social.uses_pkce(Provider::Kakao));

        let social = social.with_pkce_providers([Provider::Kakao, Provider::Naver]);
        assert!(social.uses_pkce(Provider::Kakao));
        assert!(!social.uses_pkce(Provider::Google));
    }

    #[tokio::test]
    async fn test_mismatched_state_is_rejected_before_exchange() {
        let storage = Arc::new(MemoryStorage::new());
        let social = social(storage.clone());
        storage.set_item(STATE_KEY, "\"xyz\"").unwrap();
        storage.set_item(CODE_VERIFIER_KEY, "\"verifier\"").unwrap();

        let err = social
            .handle_callback(Provider::Google, &CallbackParams::new("code", "abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
        assert!(!storage.contains_key(STATE_KEY));
        assert!(!storage.contains_key(CODE_VERIFIER_KEY));
    }

    #[tokio::test]
    async fn test_missing_persisted_state_is_a_mismatch() {
        let social = social(Arc::new(MemoryStorage::new()));
        let err = social
            .handle_callback(Provider::Kakao, &CallbackParams::new("code", "abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
    }

    #[tokio::test]
    async fn test_provider_error_consumes_state() {
        let storage = Arc::new(MemoryStorage::new());
        let social = social(storage.clone());
        storage.set_item(STATE_KEY, "\"xyz\"").unwrap();

        let params = CallbackParams {
            error: Some("access_denied".into()),
            state: Some("xyz".into()),
            ..CallbackParams::default()
        };
        let err = social.handle_callback(Provider::Naver, &params).await.unwrap_err();
        assert!(matches!(err, Error::Provider { ref error, .. } if error == "access_denied"));
        assert!(!storage.contains_key(STATE_KEY));
    }

    #[tokio::test]
    async fn test_missing_code_after_valid_state() {
        let storage = Arc::new(MemoryStorage::new());
        let social = social(storage.clone());
        storage.set_item(STATE_KEY, "\"xyz\"").unwrap();

        let params = CallbackParams {
            state: Some("xyz".into()),
            ..CallbackParams::default()
        };
        let err = social.handle_callback(Provider::Kakao, &params).await.unwrap_err();
        assert!(matches!(err, Error::Provider { ref error, .. } if error == "missing_code"));
        assert!(!storage.contains_key(STATE_KEY));
    }

    #[test]
    fn test_logout_clears_session_and_transient_keys() {
        let local = Arc::new(MemoryStorage::new());
        let transient = Arc::new(MemoryStorage::new());
        let session = SessionStore::new(local.clone());
        let social = SocialLogin::new(offline_api(), transient.clone());

        session.set_session(
            &crate::types::SessionUser::new("u1"),
            &crate::types::TokenInfo::session("s"),
        );
        transient.set_item(STATE_KEY, "\"s\"").unwrap();
        transient.set_item(SIGNUP_PENDING_KEY, "\"kakao\"").unwrap();
        assert_eq!(social.pending_signup(), Some(Provider::Kakao));

        assert!(social.logout(&session));
        assert!(local.is_empty());
        assert!(transient.is_empty());
        assert_eq!(social.pending_signup(), None);
    }

    #[test]
    fn test_persist_failure_is_a_storage_error() {
        let social = SocialLogin::new(offline_api(), Arc::new(DisabledStorage));
        let err = social.persist(STATE_KEY, "abc").unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::NotPersisted { .. })));
    }
}
