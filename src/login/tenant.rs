//! Multi-tenant resolution after authentication.

use crate::api::ApiClient;
use crate::error::Error;
use crate::sequencer::Ticket;
use crate::types::{TenantHint, TenantId, TenantInfo};

/// Tenants offered for selection, deduplicated by id (first occurrence wins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantChoices {
    tenants: Vec<TenantInfo>,
}

impl TenantChoices {
    #[must_use]
    pub fn new(tenants: Vec<TenantInfo>) -> Self {
        let mut unique: Vec<TenantInfo> = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            if unique.iter().any(|t| t.tenant_id == tenant.tenant_id) {
                tracing::debug!(tenant_id = %tenant.tenant_id, "Dropping duplicate tenant entry");
                continue;
            }
            unique.push(tenant);
        }
        Self { tenants: unique }
    }

    #[must_use]
    pub fn tenants(&self) -> &[TenantInfo] {
        &self.tenants
    }

    #[must_use]
    pub fn find(&self, tenant_id: &TenantId) -> Option<&TenantInfo> {
        self.tenants.iter().find(|t| &t.tenant_id == tenant_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    #[must_use]
    pub fn is_multi_tenant(&self) -> bool {
        self.tenants.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tenancy {
    Single,
    Multiple(TenantChoices),
}

impl Tenancy {
    fn from_list(tenants: Vec<TenantInfo>) -> Self {
        let choices = TenantChoices::new(tenants);
        if choices.is_multi_tenant() {
            Self::Multiple(choices)
        } else {
            Self::Single
        }
    }
}

/// Decide whether the user must pick a tenant.
///
/// Failed lookups degrade to [`Tenancy::Single`]; only
/// [`Error::Superseded`] is returned, so a newer authentication wins.
pub(crate) async fn resolve(
    api: &ApiClient,
    hint: TenantHint,
    ticket: &Ticket,
) -> Result<Tenancy, Error> {
    match hint {
        TenantHint::Single => Ok(Tenancy::Single),
        TenantHint::Multiple(tenants) => Ok(Tenancy::from_list(tenants)),
        TenantHint::Unknown => {
            match ticket.run(api.check_multi_tenant()).await {
                Ok(true) => {}
                Ok(false) => return Ok(Tenancy::Single),
                Err(Error::Superseded) => return Err(Error::Superseded),
                Err(e) => {
                    tracing::warn!(error = %e, "Multi-tenant check failed, continuing as single tenant");
                    return Ok(Tenancy::Single);
                }
            }
            match ticket.run(api.accessible_tenants()).await {
                Ok(tenants) => Ok(Tenancy::from_list(tenants)),
                Err(Error::Superseded) => Err(Error::Superseded),
                Err(e) => {
                    tracing::warn!(error = %e, "Loading accessible tenants failed, continuing as single tenant");
                    Ok(Tenancy::Single)
                }
            }
        }
    }
}
