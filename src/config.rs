use std::time::Duration;

use url::Url;

use crate::api::{ApiClient, DEFAULT_TIMEOUT};
use crate::error::Error;
#[cfg(feature = "oauth")]
use crate::oauth::{DEFAULT_CONFIG_TTL, Provider};
use crate::session::{DEFAULT_SESSION_TTL, MAX_SESSION_TTL};

/// Runtime configuration of the authentication lifecycle.
///
/// Required field (`api_base_url`) is a constructor parameter; everything
/// else has a default and a `with_*` override.
///
/// ```rust,ignore
/// use consult_auth::AuthConfig;
///
/// let config = AuthConfig::new("https://api.example.com".parse()?)
///     .with_http_timeout(std::time::Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthConfig {
    pub(crate) api_base_url: Url,
    pub(crate) http_timeout: Duration,
    pub(crate) session_ttl: time::Duration,
    #[cfg(feature = "oauth")]
    pub(crate) pkce_providers: Vec<Provider>,
    #[cfg(feature = "oauth")]
    pub(crate) oauth2_config_ttl: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            http_timeout: DEFAULT_TIMEOUT,
            session_ttl: DEFAULT_SESSION_TTL,
            #[cfg(feature = "oauth")]
            pkce_providers: vec![Provider::Google],
            #[cfg(feature = "oauth")]
            oauth2_config_ttl: DEFAULT_CONFIG_TTL,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `CONSULT_API_BASE_URL`: backend origin (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `CONSULT_HTTP_TIMEOUT_SECS`: per-request timeout (default 30)
    /// - `CONSULT_SESSION_TTL_HOURS`: session lifetime (default 24, at most 8760)
    /// - `CONSULT_PKCE_PROVIDERS`: comma-separated providers using PKCE (default `google`)
    /// - `CONSULT_OAUTH2_CONFIG_TTL_SECS`: provider config cache lifetime (default 300)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the variable that is missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base = std::env::var("CONSULT_API_BASE_URL")
            .map_err(|_| Error::Config("CONSULT_API_BASE_URL is required".into()))?;
        let api_base_url: Url = base
            .parse()
            .map_err(|e| Error::Config(format!("CONSULT_API_BASE_URL: {e}")))?;

        let mut config = Self::new(api_base_url);

        if let Some(secs) = positive_var("CONSULT_HTTP_TIMEOUT_SECS")? {
            config = config.with_http_timeout(Duration::from_secs(secs));
        }
        if let Some(hours) = positive_var("CONSULT_SESSION_TTL_HOURS")? {
            let max_hours = MAX_SESSION_TTL.whole_hours();
            let hours = i64::try_from(hours)
                .ok()
                .filter(|h| *h <= max_hours)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "CONSULT_SESSION_TTL_HOURS: must be at most {max_hours}"
                    ))
                })?;
            config = config.with_session_ttl(time::Duration::hours(hours));
        }

        #[cfg(feature = "oauth")]
        {
            if let Ok(list) = std::env::var("CONSULT_PKCE_PROVIDERS") {
                let providers = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<Provider>()
                            .map_err(|e| Error::Config(format!("CONSULT_PKCE_PROVIDERS: {e}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                config = config.with_pkce_providers(providers);
            }
            if let Some(secs) = positive_var("CONSULT_OAUTH2_CONFIG_TTL_SECS")? {
                config = config.with_oauth2_config_ttl(Duration::from_secs(secs));
            }
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Session lifetime, capped at [`MAX_SESSION_TTL`].
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: time::Duration) -> Self {
        self.session_ttl = ttl.min(MAX_SESSION_TTL);
        self
    }

    #[cfg(feature = "oauth")]
    #[must_use]
    pub fn with_pkce_providers(mut self, providers: Vec<Provider>) -> Self {
        self.pkce_providers = providers;
        self
    }

    #[cfg(feature = "oauth")]
    #[must_use]
    pub fn with_oauth2_config_ttl(mut self, ttl: Duration) -> Self {
        self.oauth2_config_ttl = ttl;
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    #[must_use]
    pub fn session_ttl(&self) -> time::Duration {
        self.session_ttl
    }

    #[cfg(feature = "oauth")]
    #[must_use]
    pub fn pkce_providers(&self) -> &[Provider] {
        &self.pkce_providers
    }

    #[cfg(feature = "oauth")]
    #[must_use]
    pub fn oauth2_config_ttl(&self) -> Duration {
        self.oauth2_config_ttl
    }

    /// Backend client configured with this timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn api_client(&self) -> Result<ApiClient, Error> {
        Ok(ApiClient::new(self.api_base_url.clone())?.with_timeout(self.http_timeout))
    }
}

fn positive_var(name: &str) -> Result<Option<u64>, Error> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(Error::Config(format!("{name}: must be greater than zero"))),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(Error::Config(format!("{name}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 5] = [
        "CONSULT_API_BASE_URL",
        "CONSULT_HTTP_TIMEOUT_SECS",
        "CONSULT_SESSION_TTL_HOURS",
        "CONSULT_PKCE_PROVIDERS",
        "CONSULT_OAUTH2_CONFIG_TTL_SECS",
    ];

    fn with_env<R>(set: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let vars: Vec<(&str, Option<&str>)> = VARS
            .iter()
            .map(|name| {
                let value = set.iter().find(|(k, _)| k == name).map(|(_, v)| *v);
                (*name, value)
            })
            .collect();
        temp_env::with_vars(vars, f)
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::new("https://api.example.com".parse().unwrap());
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.session_ttl(), time::Duration::hours(24));
        #[cfg(feature = "oauth")]
        {
            assert_eq!(config.pkce_providers(), &[Provider::Google]);
            assert_eq!(config.oauth2_config_ttl(), Duration::from_secs(300));
        }
    }

    #[test]
    fn test_from_env_requires_base_url() {
        let result = with_env(&[], AuthConfig::from_env);
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("CONSULT_API_BASE_URL")));
    }

    #[test]
    fn test_from_env_rejects_invalid_url() {
        let result = with_env(&[("CONSULT_API_BASE_URL", "not a url")], AuthConfig::from_env);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_env_overrides() {
        let config = with_env(
            &[
                ("CONSULT_API_BASE_URL", "https://api.example.com"),
                ("CONSULT_HTTP_TIMEOUT_SECS", "5"),
                ("CONSULT_SESSION_TTL_HOURS", "8"),
                ("CONSULT_PKCE_PROVIDERS", "google, Kakao"),
                ("CONSULT_OAUTH2_CONFIG_TTL_SECS", "60"),
            ],
            AuthConfig::from_env,
        )
        .unwrap();

        assert_eq!(config.api_base_url().as_str(), "https://api.example.com/");
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
        assert_eq!(config.session_ttl(), time::Duration::hours(8));
        #[cfg(feature = "oauth")]
        {
            assert_eq!(config.pkce_providers(), &[Provider::Google, Provider::Kakao]);
            assert_eq!(config.oauth2_config_ttl(), Duration::from_secs(60));
        }
    }

    #[test]
    fn test_from_env_rejects_zero_and_garbage() {
        for (name, value) in [
            ("CONSULT_HTTP_TIMEOUT_SECS", "0"),
            ("CONSULT_SESSION_TTL_HOURS", "soon"),
        ] {
            let result = with_env(
                &[("CONSULT_API_BASE_URL", "https://api.example.com"), (name, value)],
                AuthConfig::from_env,
            );
            assert!(
                matches!(&result, Err(Error::Config(msg)) if msg.starts_with(name)),
                "{name}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_env_rejects_oversized_session_ttl() {
        for value in ["8761", "1000000000", "18446744073709551615"] {
            let result = with_env(
                &[
                    ("CONSULT_API_BASE_URL", "https://api.example.com"),
                    ("CONSULT_SESSION_TTL_HOURS", value),
                ],
                AuthConfig::from_env,
            );
            assert!(
                matches!(&result, Err(Error::Config(msg)) if msg.starts_with("CONSULT_SESSION_TTL_HOURS")),
                "{value} should be rejected"
            );
        }

        let config = with_env(
            &[
                ("CONSULT_API_BASE_URL", "https://api.example.com"),
                ("CONSULT_SESSION_TTL_HOURS", "8760"),
            ],
            AuthConfig::from_env,
        )
        .unwrap();
        assert_eq!(config.session_ttl(), MAX_SESSION_TTL);
    }

    #[test]
    fn test_session_ttl_builder_is_capped() {
        let config = AuthConfig::new("https://api.example.com".parse().unwrap())
            .with_session_ttl(time::Duration::hours(1_000_000_000));
        assert_eq!(config.session_ttl(), MAX_SESSION_TTL);
    }

    #[cfg(feature = "oauth")]
    #[test]
    fn test_from_env_rejects_unknown_provider() {
        let result = with_env(
            &[
                ("CONSULT_API_BASE_URL", "https://api.example.com"),
                ("CONSULT_PKCE_PROVIDERS", "google,github"),
            ],
            AuthConfig::from_env,
        );
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("github")));
    }
}
