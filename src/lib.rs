#![doc = include_str!("../README.md")]

pub mod api;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod login;
#[cfg(feature = "oauth")]
pub mod oauth;
#[cfg(feature = "oauth")]
pub mod pkce;
pub mod sequencer;
pub mod session;
pub mod storage;
pub mod types;

// Re-exports for convenient access
pub use api::{ApiClient, SocialAccountStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use dashboard::{DEFAULT_DASHBOARD, DashboardLookup, DashboardResolver, resolve_path};
pub use error::{Error, ErrorCategory};
pub use login::{AuthFlow, Destination, LoginStep, TenantChoices};
#[cfg(feature = "oauth")]
pub use oauth::{AuthorizationRedirect, CallbackParams, Exchange, Provider, SocialLogin};
#[cfg(feature = "oauth")]
pub use pkce::{generate_code_challenge, generate_code_verifier, generate_state};
pub use session::{SessionEvent, SessionStore};
pub use storage::{MemoryStorage, PersistentStore, Storage, StorageError};
pub use types::{
    AuthGrant, Credentials, SessionId, SessionRecord, SessionUser, SocialProfile, TenantId,
    TenantInfo, TokenInfo, UserId,
};
