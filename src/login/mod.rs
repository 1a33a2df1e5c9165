//! Login orchestration.
//!
//! [`AuthFlow`] ties the pieces together: credential or social
//! authentication, the duplicate-login confirmation, tenant selection and
//! finally the post-login destination. It owns the [`SessionStore`] handle
//! every step writes through.

pub mod duplicate;
pub mod tenant;

use std::sync::{Arc, Mutex, PoisonError};

use crate::api::ApiClient;
use crate::config::AuthConfig;
use crate::dashboard::DashboardResolver;
use crate::error::Error;
#[cfg(feature = "oauth")]
use crate::oauth::{AuthorizationRedirect, CallbackParams, Exchange, Provider, SocialLogin};
use crate::sequencer::Sequencer;
use crate::session::SessionStore;
use crate::storage::Storage;
use crate::types::{
    AuthGrant, Credentials, SessionUser, SocialProfile, TenantHint, TenantId, TenantInfo,
};

pub use duplicate::{DuplicateLogin, Phase};
pub use tenant::TenantChoices;
use tenant::Tenancy;

/// Where the UI should navigate after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub path: String,
    /// Replace the login page in history instead of pushing.
    pub replace: bool,
}

impl Destination {
    fn replace(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            replace: true,
        }
    }
}

/// Result of one step of the login flow.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum LoginStep {
    /// Session established; navigate here.
    Complete(Destination),
    /// Another session is active; ask the user before terminating it.
    AwaitingConfirmation { message: Option<String> },
    /// Session established but the user must pick a tenant first.
    TenantSelection(Vec<TenantInfo>),
    SignupRequired(SocialProfile),
    AccountIntegrationRequired(SocialProfile),
}

pub struct AuthFlow {
    api: ApiClient,
    session: Arc<SessionStore>,
    dashboards: DashboardResolver<ApiClient>,
    duplicate: DuplicateLogin,
    pending_tenants: Mutex<Option<TenantChoices>>,
    tenant_check: Sequencer,
    confirmation: Sequencer,
    #[cfg(feature = "oauth")]
    social: Option<SocialLogin>,
}

impl AuthFlow {
    /// Create a flow over an existing client and session.
    ///
    /// Attach the session to `api` with [`ApiClient::with_session`] if the
    /// backend expects bearer tokens.
    #[must_use]
    pub fn new(api: ApiClient, session: Arc<SessionStore>) -> Self {
        Self {
            dashboards: DashboardResolver::with_lookup(api.clone()),
            api,
            session,
            duplicate: DuplicateLogin::new(),
            pending_tenants: Mutex::new(None),
            tenant_check: Sequencer::new(),
            confirmation: Sequencer::new(),
            #[cfg(feature = "oauth")]
            social: None,
        }
    }

    /// Wire everything from configuration.
    ///
    /// `local` persists the session record; `transient` holds the `OAuth2`
    /// round-trip values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn from_config(
        config: &AuthConfig,
        local: Arc<dyn Storage>,
        transient: Arc<dyn Storage>,
    ) -> Result<Self, Error> {
        let session = Arc::new(SessionStore::new(local).with_ttl(config.session_ttl()));
        let api = config.api_client()?.with_session(Arc::clone(&session));

        #[cfg(feature = "oauth")]
        let flow = {
            let social = SocialLogin::new(api.clone(), transient)
                .with_pkce_providers(config.pkce_providers().iter().copied())
                .with_config_ttl(config.oauth2_config_ttl());
            Self::new(api, session).with_social(social)
        };
        #[cfg(not(feature = "oauth"))]
        let flow = {
            drop(transient);
            Self::new(api, session)
        };

        Ok(flow)
    }

    #[cfg(feature = "oauth")]
    #[must_use]
    pub fn with_social(mut self, social: SocialLogin) -> Self {
        self.social = Some(social);
        self
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn duplicate_login(&self) -> &DuplicateLogin {
        &self.duplicate
    }

    /// Startup: route a still-live stored session.
    ///
    /// The stored session goes through the same tenant check and redirect
    /// handling as a fresh login. `Ok(None)` means there is nothing to resume.
    ///
    /// # Errors
    ///
    /// [`Error::Superseded`] when a newer authentication started meanwhile.
    pub async fn resume_existing_session(
        &self,
        redirect: Option<&str>,
    ) -> Result<Option<LoginStep>, Error> {
        if !self.session.initialize() {
            return Ok(None);
        }
        let Some(user) = self.session.user() else {
            return Ok(None);
        };
        tracing::debug!(user_id = %user.id, "Resuming stored session");
        self.route_authenticated(&user, TenantHint::Unknown, redirect)
            .await
            .map(Some)
    }

    /// Credential login.
    ///
    /// `redirect` is the login page's `?redirect=` target; it is honored only
    /// for same-origin absolute paths.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] while a duplicate-login confirmation is open,
    /// [`Error::InvalidCredentials`] when the backend rejects the login,
    /// [`Error::SessionEstablishment`] when the session cannot be written,
    /// and transport or upstream errors.
    pub async fn login(
        &self,
        credentials: Credentials,
        redirect: Option<&str>,
    ) -> Result<LoginStep, Error> {
        if self.duplicate.is_open() {
            return Err(Error::InvalidState("duplicate-login confirmation pending"));
        }

        let response = self.api.login(&credentials).await?;
        if response.success && response.user.is_some() {
            let Some(grant) = response.into_grant() else {
                return Err(Error::InvalidCredentials);
            };
            return self.finish_authentication(grant, redirect).await;
        }

        if response.requires_confirmation {
            tracing::info!("Account is signed in elsewhere, awaiting confirmation");
            let message = response.message;
            self.duplicate
                .open(credentials, message.clone(), redirect.map(str::to_owned));
            return Ok(LoginStep::AwaitingConfirmation { message });
        }

        tracing::info!("Login refused");
        Err(Error::InvalidCredentials)
    }

    /// Terminate the other session and sign in with the parked credentials.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] with nothing pending,
    /// [`Error::ConfirmationRejected`] when the re-submission is refused,
    /// [`Error::Superseded`] when cancelled or retried while in flight.
    pub async fn confirm_duplicate_login(&self) -> Result<LoginStep, Error> {
        let (credentials, redirect) = self.duplicate.begin_confirm()?;
        let ticket = self.confirmation.begin();

        let response = match ticket
            .run(self.api.confirm_duplicate_login(&credentials))
            .await
        {
            Ok(response) => response,
            Err(Error::Superseded) => return Err(Error::Superseded),
            Err(Error::InvalidCredentials) => {
                self.duplicate.reset();
                tracing::info!("Duplicate-login confirmation rejected");
                return Err(Error::ConfirmationRejected { message: None });
            }
            Err(e) => {
                self.duplicate.reopen();
                tracing::warn!(error = %e, "Duplicate-login confirmation failed");
                return Err(e);
            }
        };

        self.duplicate.reset();
        let message = response.message.clone();
        match response.into_grant() {
            Some(grant) => self.finish_authentication(grant, redirect.as_deref()).await,
            None => {
                tracing::info!("Duplicate-login confirmation rejected");
                Err(Error::ConfirmationRejected { message })
            }
        }
    }

    /// Abandon the confirmation. No request is made and any existing session
    /// is left as it was.
    pub fn cancel_duplicate_login(&self) -> bool {
        self.confirmation.cancel_all();
        self.duplicate.reset()
    }

    /// Start a social login; navigate to the returned URL.
    ///
    /// # Errors
    ///
    /// See [`SocialLogin::begin_authorization`].
    #[cfg(feature = "oauth")]
    pub async fn begin_social_login(
        &self,
        provider: Provider,
    ) -> Result<AuthorizationRedirect, Error> {
        self.social()?.begin_authorization(provider).await
    }

    /// Finish a social login from the provider callback.
    ///
    /// # Errors
    ///
    /// See [`SocialLogin::handle_callback`]; additionally
    /// [`Error::SessionEstablishment`] when the session cannot be written.
    #[cfg(feature = "oauth")]
    pub async fn complete_social_login(
        &self,
        provider: Provider,
        params: &CallbackParams,
        redirect: Option<&str>,
    ) -> Result<LoginStep, Error> {
        match self.social()?.handle_callback(provider, params).await? {
            Exchange::Authenticated(grant) => self.finish_authentication(grant, redirect).await,
            Exchange::SignupRequired(profile) => Ok(LoginStep::SignupRequired(profile)),
            Exchange::AccountIntegrationRequired(profile) => {
                Ok(LoginStep::AccountIntegrationRequired(profile))
            }
        }
    }

    /// Tenants awaiting a choice, if selection is in progress.
    #[must_use]
    pub fn pending_tenants(&self) -> Option<Vec<TenantInfo>> {
        self.lock_pending()
            .as_ref()
            .map(|choices| choices.tenants().to_vec())
    }

    /// Switch to `tenant_id` and resolve the dashboard for its scoped role.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if no selection is pending or the tenant was
    /// not offered; switch failures leave the selection pending for a retry.
    pub async fn select_tenant(&self, tenant_id: &TenantId) -> Result<Destination, Error> {
        let tenant = {
            let pending = self.lock_pending();
            let choices = pending
                .as_ref()
                .ok_or(Error::InvalidState("no tenant selection pending"))?;
            choices
                .find(tenant_id)
                .cloned()
                .ok_or(Error::InvalidState("tenant was not offered for selection"))?
        };

        let switch = self.api.switch_tenant(tenant_id).await?;
        let scoped_role = switch
            .scoped_role()
            .or(tenant.scoped_role())
            .map(str::to_owned);

        if !self.session.update_tenant(tenant_id, scoped_role.as_deref()) {
            self.lock_pending().take();
            self.session.clear();
            return Err(Error::SessionEstablishment);
        }
        self.lock_pending().take();

        let user = self.session.user().ok_or(Error::NotAuthenticated)?;
        let destination = self.dashboard_for(&user).await;
        tracing::info!(
            tenant_id = %tenant_id,
            role = user.effective_role().unwrap_or("-"),
            path = %destination.path,
            "Tenant selected"
        );
        Ok(destination)
    }

    /// Abandon tenant selection; this signs the user out completely.
    pub async fn cancel_tenant_selection(&self) {
        self.lock_pending().take();
        self.tenant_check.cancel_all();
        if let Err(e) = self.api.logout().await {
            tracing::warn!(error = %e, "Backend logout failed after tenant selection was cancelled");
        }
        self.session.clear();
    }

    /// Sign out: server-side logout (best effort), then clear all local state.
    pub async fn logout(&self) {
        self.tenant_check.cancel_all();
        self.cancel_duplicate_login();
        self.lock_pending().take();
        if let Err(e) = self.api.logout().await {
            tracing::warn!(error = %e, "Backend logout failed");
        }
        #[cfg(feature = "oauth")]
        if let Some(social) = &self.social {
            social.logout(&self.session);
            return;
        }
        self.session.clear();
    }

    async fn finish_authentication(
        &self,
        grant: AuthGrant,
        redirect: Option<&str>,
    ) -> Result<LoginStep, Error> {
        let AuthGrant {
            user, tokens, tenant_hint, ..
        } = grant;

        if !self.session.set_session(&user, &tokens) || !self.session.is_live() {
            tracing::error!(user_id = %user.id, "Authenticated but the session could not be stored");
            self.session.clear();
            return Err(Error::SessionEstablishment);
        }

        self.route_authenticated(&user, tenant_hint, redirect).await
    }

    /// Tenant selection if the identity has several tenants, otherwise the
    /// local redirect target or the role dashboard.
    async fn route_authenticated(
        &self,
        user: &SessionUser,
        tenant_hint: TenantHint,
        redirect: Option<&str>,
    ) -> Result<LoginStep, Error> {
        let ticket = self.tenant_check.begin();
        if let Tenancy::Multiple(choices) = tenant::resolve(&self.api, tenant_hint, &ticket).await? {
            let tenants = choices.tenants().to_vec();
            tracing::info!(user_id = %user.id, tenants = tenants.len(), "Tenant selection required");
            *self.lock_pending() = Some(choices);
            return Ok(LoginStep::TenantSelection(tenants));
        }

        if let Some(path) = redirect.filter(|r| is_local_path(r)) {
            return Ok(LoginStep::Complete(Destination::replace(path)));
        }
        if let Some(rejected) = redirect {
            tracing::warn!(redirect = %rejected, "Ignoring non-local redirect target");
        }
        Ok(LoginStep::Complete(self.dashboard_for(user).await))
    }

    async fn dashboard_for(&self, user: &SessionUser) -> Destination {
        let path = self
            .dashboards
            .resolve(user.effective_role(), user.tenant_role_id.as_deref())
            .await;
        Destination::replace(path)
    }

    #[cfg(feature = "oauth")]
    fn social(&self) -> Result<&SocialLogin, Error> {
        self.social
            .as_ref()
            .ok_or(Error::InvalidState("social login is not configured"))
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<TenantChoices>> {
        self.pending_tenants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Same-origin absolute path: a single leading `/`, no scheme or authority.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}
