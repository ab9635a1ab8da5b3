//! Capability matrix: `(role, entity, action, scope)`. A configuration
//! table, not part of the mode machine — the state machine's job is
//! correctness of `effective_role`/`original_role` transitions, not
//! permission policy.

use std::collections::HashSet;

use hearth_core::Role;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Granted outright by the role.
    Any,
    /// Requires the caller to supply a resource-owner id matching the
    /// session's `user_id`.
    Own,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    pub role: Role,
    pub entity: &'static str,
    pub action: &'static str,
    pub scope: Scope,
}

/// A flat allow-list, matched by `(role, entity, action)` with the
/// broadest granted scope winning (`Any` subsumes `Own`).
#[derive(Debug, Clone, Default)]
pub struct CapabilityMatrix {
    grants: HashSet<(Role, &'static str, &'static str, Scope)>,
}

impl CapabilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, role: Role, entity: &'static str, action: &'static str, scope: Scope) -> Self {
        self.grants.insert((role, entity, action, scope));
        self
    }

    /// `resource_owner` is required when the grant found is `scope=own`;
    /// the caller's `session_user_id` must match it.
    pub fn is_allowed(
        &self,
        role: Role,
        entity: &'static str,
        action: &'static str,
        session_user_id: Uuid,
        resource_owner: Option<Uuid>,
    ) -> bool {
        if self.grants.contains(&(role, entity, action, Scope::Any)) {
            return true;
        }
        if self.grants.contains(&(role, entity, action, Scope::Own)) {
            return resource_owner == Some(session_user_id);
        }
        false
    }
}

/// The default matrix: `shared` can only read task instances of its own
/// family; `user` can manage their own schedules and task instances;
/// `admin` has blanket access.
pub fn default_matrix() -> CapabilityMatrix {
    CapabilityMatrix::new()
        .grant(Role::Shared, "task_instance", "view", Scope::Own)
        .grant(Role::Shared, "task_instance", "complete", Scope::Own)
        .grant(Role::User, "task_instance", "view", Scope::Own)
        .grant(Role::User, "task_instance", "complete", Scope::Own)
        .grant(Role::User, "schedule", "create", Scope::Own)
        .grant(Role::User, "schedule", "edit", Scope::Own)
        .grant(Role::Admin, "task_instance", "view", Scope::Any)
        .grant(Role::Admin, "task_instance", "complete", Scope::Any)
        .grant(Role::Admin, "schedule", "create", Scope::Any)
        .grant(Role::Admin, "schedule", "edit", Scope::Any)
        .grant(Role::Admin, "schedule", "delete", Scope::Any)
        .grant(Role::Admin, "job", "view", Scope::Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_scope_requires_matching_owner() {
        let matrix = default_matrix();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(matrix.is_allowed(Role::User, "task_instance", "complete", user, Some(user)));
        assert!(!matrix.is_allowed(Role::User, "task_instance", "complete", user, Some(other)));
        assert!(!matrix.is_allowed(Role::User, "task_instance", "complete", user, None));
    }

    #[test]
    fn admin_any_scope_ignores_owner() {
        let matrix = default_matrix();
        let admin = Uuid::new_v4();
        assert!(matrix.is_allowed(Role::Admin, "task_instance", "complete", admin, None));
    }

    #[test]
    fn unknown_grant_denies() {
        let matrix = default_matrix();
        let user = Uuid::new_v4();
        assert!(!matrix.is_allowed(Role::Shared, "schedule", "delete", user, Some(user)));
    }
}
