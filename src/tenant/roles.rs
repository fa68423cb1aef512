//! Fixed role → permission lattice.
//!
//! Four built-in roles ordered by level. Unknown role strings resolve to
//! no role and therefore no permissions; `admin` is additionally treated
//! as a super-permission by the HTTP layer.

use serde::{Deserialize, Serialize};

/// Actions a role may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    RequestAssignment,
    SubmitLabel,
    ViewOwnLabels,
    ViewAllLabels,
    ExportData,
    ComputeAgreement,
    OverrideLabel,
    ResolveConflicts,
    ManageQueue,
    ManageLabelers,
    GrantAccess,
    RevokeAccess,
}

/// Built-in roles, ordered by privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Labeler,
    Auditor,
    Adjudicator,
    Admin,
}

impl Role {
    /// Privilege level, 1 (labeler) through 4 (admin).
    pub fn level(&self) -> u8 {
        match self {
            Role::Labeler => 1,
            Role::Auditor => 2,
            Role::Adjudicator => 3,
            Role::Admin => 4,
        }
    }

    /// The permission set granted by this role.
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Labeler => &[RequestAssignment, SubmitLabel, ViewOwnLabels],
            Role::Auditor => &[ViewAllLabels, ExportData, ComputeAgreement],
            Role::Adjudicator => &[OverrideLabel, ResolveConflicts, ViewAllLabels, ExportData],
            Role::Admin => &[
                ManageQueue,
                ManageLabelers,
                GrantAccess,
                RevokeAccess,
                OverrideLabel,
                ExportData,
                ViewAllLabels,
                ComputeAgreement,
            ],
        }
    }

    /// Whether this role grants `permission`. Admin is a super-role.
    pub fn has_permission(&self, permission: Permission) -> bool {
        matches!(self, Role::Admin) || self.permissions().contains(&permission)
    }

    /// Parse a role name; unknown names yield `None` (no permissions).
    pub fn parse(name: &str) -> Option<Role> {
        match name {
            "labeler" => Some(Role::Labeler),
            "auditor" => Some(Role::Auditor),
            "adjudicator" => Some(Role::Adjudicator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// `a` may override decisions made by `b` iff its level is at least as
/// high.
pub fn can_override(a: Role, b: Role) -> bool {
    a.level() >= b.level()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_levels_are_ordered() {
        assert!(Role::Labeler.level() < Role::Auditor.level());
        assert!(Role::Auditor.level() < Role::Adjudicator.level());
        assert!(Role::Adjudicator.level() < Role::Admin.level());
    }

    #[test]
    fn labeler_permissions() {
        assert!(Role::Labeler.has_permission(Permission::RequestAssignment));
        assert!(Role::Labeler.has_permission(Permission::SubmitLabel));
        assert!(!Role::Labeler.has_permission(Permission::ExportData));
        assert!(!Role::Labeler.has_permission(Permission::ManageQueue));
    }

    #[test]
    fn admin_is_super_role() {
        // ResolveConflicts is not in admin's explicit set but admin is a
        // super-permission at the edge.
        assert!(Role::Admin.has_permission(Permission::ResolveConflicts));
        assert!(Role::Admin.has_permission(Permission::ManageQueue));
    }

    #[test]
    fn override_follows_levels() {
        assert!(can_override(Role::Admin, Role::Labeler));
        assert!(can_override(Role::Adjudicator, Role::Adjudicator));
        assert!(!can_override(Role::Labeler, Role::Auditor));
    }

    #[test]
    fn unknown_roles_parse_to_none() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse(""), None);
    }
}
