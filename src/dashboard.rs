//! Role to dashboard path resolution.
//!
//! [`resolve_path`] is the static table and is total: every input, including
//! unknown roles and `None`, maps to a path. [`DashboardResolver`] layers an
//! optional backend lookup on top of it; the table remains the fallback for
//! every lookup outcome other than a usable path.

use std::future::Future;

use crate::error::Error;
use crate::sequencer::Sequencer;

pub const DEFAULT_DASHBOARD: &str = "/client/dashboard";

const ROLE_PATHS: &[(&str, &str)] = &[
    ("CLIENT", "/client/dashboard"),
    ("CONSULTANT", "/consultant/dashboard"),
    ("ADMIN", "/admin/dashboard"),
    ("BRANCH_ADMIN", "/admin/dashboard"),
    ("BRANCH_SUPER_ADMIN", "/admin/dashboard"),
    ("BRANCH_MANAGER", "/admin/dashboard"),
    ("HQ_ADMIN", "/hq/dashboard"),
    ("SUPER_HQ_ADMIN", "/hq/dashboard"),
    ("HQ_MASTER", "/hq_master/dashboard"),
    ("OPS", "/ops/dashboard"),
];

/// Static dashboard path for `role`; unknown or missing roles get [`DEFAULT_DASHBOARD`].
#[must_use]
pub fn resolve_path(role: Option<&str>) -> &'static str {
    let Some(role) = role.map(str::trim).filter(|r| !r.is_empty()) else {
        return DEFAULT_DASHBOARD;
    };
    let role = role.to_ascii_uppercase();
    ROLE_PATHS
        .iter()
        .find(|(name, _)| *name == role)
        .map_or(DEFAULT_DASHBOARD, |&(_, path)| path)
}

/// Backend-driven dashboard lookup keyed by tenant role id.
pub trait DashboardLookup: Send + Sync {
    /// `Ok(None)` means the backend has no dashboard configured for this role.
    fn current_dashboard(
        &self,
        tenant_role_id: &str,
    ) -> impl Future<Output = Result<Option<String>, Error>> + Send;
}

/// Lookup that never has an answer; resolution always uses the static table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl DashboardLookup for NoLookup {
    async fn current_dashboard(&self, _tenant_role_id: &str) -> Result<Option<String>, Error> {
        Ok(None)
    }
}

/// Single resolver used by every caller that needs a post-login destination.
pub struct DashboardResolver<L = NoLookup> {
    lookup: Option<L>,
    sequencer: Sequencer,
}

impl DashboardResolver<NoLookup> {
    #[must_use]
    pub fn static_only() -> Self {
        Self {
            lookup: None,
            sequencer: Sequencer::new(),
        }
    }
}

impl<L: DashboardLookup> DashboardResolver<L> {
    #[must_use]
    pub fn with_lookup(lookup: L) -> Self {
        Self {
            lookup: Some(lookup),
            sequencer: Sequencer::new(),
        }
    }

    /// Resolve the destination for `role`, consulting the backend when a
    /// tenant role id is known.
    ///
    /// A dynamic answer wins only if it is a non-empty absolute path.
    pub async fn resolve(&self, role: Option<&str>, tenant_role_id: Option<&str>) -> String {
        let fallback = resolve_path(role);

        let (Some(lookup), Some(tenant_role_id)) = (&self.lookup, tenant_role_id) else {
            return fallback.to_owned();
        };

        let ticket = self.sequencer.begin();
        match ticket.run(lookup.current_dashboard(tenant_role_id)).await {
            Ok(Some(path)) if is_absolute_path(&path) => {
                if path != fallback {
                    tracing::debug!(
                        role = role.unwrap_or("-"),
                        dynamic = %path,
                        fallback,
                        "Dynamic dashboard overrides role table"
                    );
                }
                path
            }
            Ok(Some(path)) => {
                tracing::warn!(path = %path, "Ignoring malformed dashboard path from backend");
                fallback.to_owned()
            }
            Ok(None) => fallback.to_owned(),
            Err(Error::Superseded) => {
                tracing::debug!(tenant_role_id, "Dashboard lookup superseded, using role table");
                fallback.to_owned()
            }
            Err(e) => {
                tracing::warn!(error = %e, tenant_role_id, "Dashboard lookup failed, using role table");
                fallback.to_owned()
            }
        }
    }
}

fn is_absolute_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing::instrument::WithSubscriber;

    #[test]
    fn test_table_entries() {
        let cases = [
            ("CLIENT", "/client/dashboard"),
            ("CONSULTANT", "/consultant/dashboard"),
            ("ADMIN", "/admin/dashboard"),
            ("BRANCH_ADMIN", "/admin/dashboard"),
            ("BRANCH_SUPER_ADMIN", "/admin/dashboard"),
            ("BRANCH_MANAGER", "/admin/dashboard"),
            ("HQ_ADMIN", "/hq/dashboard"),
            ("SUPER_HQ_ADMIN", "/hq/dashboard"),
            ("HQ_MASTER", "/hq_master/dashboard"),
            ("OPS", "/ops/dashboard"),
        ];
        for (role, expected) in cases {
            assert_eq!(resolve_path(Some(role)), expected, "role {role}");
        }
    }

    #[test]
    fn test_role_is_normalized() {
        assert_eq!(resolve_path(Some("admin")), "/admin/dashboard");
        assert_eq!(resolve_path(Some(" Hq_Master ")), "/hq_master/dashboard");
    }

    #[test]
    fn test_resolution_is_total() {
        for role in [None, Some(""), Some("   "), Some("JANITOR"), Some("관리자"), Some("admin\0")] {
            let path = resolve_path(role);
            assert!(!path.is_empty());
            assert!(path.starts_with('/'));
        }
        assert_eq!(resolve_path(None), DEFAULT_DASHBOARD);
        assert_eq!(resolve_path(Some("JANITOR")), DEFAULT_DASHBOARD);
    }

    struct FixedLookup {
        answer: Mutex<Option<Result<Option<String>, Error>>>,
    }

    impl FixedLookup {
        fn new(answer: Result<Option<String>, Error>) -> Self {
            Self {
                answer: Mutex::new(Some(answer)),
            }
        }
    }

    impl DashboardLookup for FixedLookup {
        async fn current_dashboard(&self, _id: &str) -> Result<Option<String>, Error> {
            self.answer.lock().unwrap().take().unwrap_or(Ok(None))
        }
    }

    #[tokio::test]
    async fn test_static_only_uses_table() {
        let resolver = DashboardResolver::static_only();
        assert_eq!(resolver.resolve(Some("OPS"), Some("7")).await, "/ops/dashboard");
    }

    #[tokio::test]
    async fn test_dynamic_path_overrides_table() {
        let resolver =
            DashboardResolver::with_lookup(FixedLookup::new(Ok(Some("/custom/home".into()))));
        assert_eq!(resolver.resolve(Some("ADMIN"), Some("7")).await, "/custom/home");
    }

    #[tokio::test]
    async fn test_lookup_skipped_without_tenant_role_id() {
        let resolver =
            DashboardResolver::with_lookup(FixedLookup::new(Ok(Some("/custom/home".into()))));
        assert_eq!(resolver.resolve(Some("ADMIN"), None).await, "/admin/dashboard");
    }

    #[tokio::test]
    async fn test_table_applies_when_lookup_has_no_usable_answer() {
        let answers = [
            Ok(None),
            Ok(Some(String::new())),
            Ok(Some("https://evil.example/".into())),
            Ok(Some("//evil.example".into())),
            Err(Error::Timeout),
        ];
        for answer in answers {
            let resolver = DashboardResolver::with_lookup(FixedLookup::new(answer));
            assert_eq!(
                resolver.resolve(Some("CONSULTANT"), Some("3")).await,
                "/consultant/dashboard"
            );
        }
    }

    struct SlowFirstLookup {
        calls: AtomicUsize,
    }

    impl DashboardLookup for SlowFirstLookup {
        async fn current_dashboard(&self, _id: &str) -> Result<Option<String>, Error> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                return Ok(Some("/stale/home".into()));
            }
            Ok(Some("/custom/home".into()))
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_superseded_lookup_falls_back_without_warning() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let resolver = DashboardResolver::with_lookup(SlowFirstLookup {
            calls: AtomicUsize::new(0),
        });
        let (first, second) = async {
            tokio::join!(resolver.resolve(Some("ADMIN"), Some("7")), async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                resolver.resolve(Some("ADMIN"), Some("7")).await
            })
        }
        .with_subscriber(subscriber)
        .await;

        assert_eq!(first, "/admin/dashboard");
        assert_eq!(second, "/custom/home");
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.is_empty(), "unexpected warnings: {output}");
    }
}
