//! Tenant isolation and access control.
//!
//! Every entity carries a tenant id; the guards here are what request
//! handlers and the dispatcher call before touching a resource. Role →
//! permission mapping is a fixed lattice, not configurable.

pub mod roles;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use roles::{can_override, Permission, Role};

/// Access-control errors.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessError {
    #[error("tenant id is required")]
    TenantRequired,

    #[error("resource belongs to a different tenant")]
    TenantMismatch,

    #[error("forbidden cross-tenant access")]
    ForbiddenCrossTenantAccess,

    #[error("forbidden")]
    Forbidden,
}

pub type AccessResult<T> = Result<T, AccessError>;

/// Anything that belongs to a tenant.
pub trait TenantScoped {
    fn tenant_id(&self) -> &str;
}

macro_rules! impl_tenant_scoped {
    ($($ty:ty),* $(,)?) => {
        $(impl TenantScoped for $ty {
            fn tenant_id(&self) -> &str {
                &self.tenant_id
            }
        })*
    };
}

impl_tenant_scoped!(
    crate::model::Schema,
    crate::model::SchemaVersion,
    crate::model::Queue,
    crate::model::SampleRef,
    crate::model::Labeler,
    crate::model::Assignment,
    crate::model::Label,
    crate::model::AuditRecord,
    crate::model::Dataset,
);

/// Ok iff the resource and the actor share the same non-empty tenant id.
pub fn validate_tenant(resource: &impl TenantScoped, actor_tenant: &str) -> AccessResult<()> {
    if actor_tenant.is_empty() || resource.tenant_id().is_empty() {
        return Err(AccessError::TenantRequired);
    }
    if resource.tenant_id() != actor_tenant {
        return Err(AccessError::TenantMismatch);
    }
    Ok(())
}

/// Primary guard for request handlers: a mismatch surfaces as
/// `forbidden_cross_tenant_access` rather than leaking which tenant owns
/// the resource.
pub fn ensure_isolation(resource: &impl TenantScoped, actor_tenant: &str) -> AccessResult<()> {
    validate_tenant(resource, actor_tenant).map_err(|err| match err {
        AccessError::TenantRequired => AccessError::TenantRequired,
        _ => AccessError::ForbiddenCrossTenantAccess,
    })
}

/// Retain only the entries owned by `actor_tenant`.
pub fn filter_by_tenant<T: TenantScoped>(items: Vec<T>, actor_tenant: &str) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| item.tenant_id() == actor_tenant)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Labeler;

    #[test]
    fn validate_tenant_requires_matching_ids() {
        let labeler = Labeler::new("tenant-a", "alice");

        assert_eq!(validate_tenant(&labeler, "tenant-a"), Ok(()));
        assert_eq!(
            validate_tenant(&labeler, "tenant-b"),
            Err(AccessError::TenantMismatch)
        );
        assert_eq!(
            validate_tenant(&labeler, ""),
            Err(AccessError::TenantRequired)
        );
    }

    #[test]
    fn ensure_isolation_masks_mismatch() {
        let labeler = Labeler::new("tenant-a", "alice");
        assert_eq!(
            ensure_isolation(&labeler, "tenant-b"),
            Err(AccessError::ForbiddenCrossTenantAccess)
        );
    }

    #[test]
    fn filter_retains_only_matching_tenants() {
        let items = vec![
            Labeler::new("tenant-a", "alice"),
            Labeler::new("tenant-b", "bob"),
            Labeler::new("tenant-a", "carol"),
        ];

        let kept = filter_by_tenant(items, "tenant-a");
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|l| l.tenant_id == "tenant-a"));
    }
}
