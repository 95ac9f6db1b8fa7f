use common::User;

pub const ALL_ACCESS_ROLE: &str = "all_access";

/// Decides whether a caller may use a model owned by someone else.
pub trait AccessControl: Send + Sync {
    fn permitted(&self, user: Option<&User>, owner: Option<&User>) -> bool;
}

/// Owner-or-shared-backend-role check.
///
/// Anonymous callers (security disabled) and models without an owner are
/// always allowed; admins holding `all_access` see everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendRoleAccess;

impl AccessControl for BackendRoleAccess {
    fn permitted(&self, user: Option<&User>, owner: Option<&User>) -> bool {
        let (Some(user), Some(owner)) = (user, owner) else {
            return true;
        };
        if user.name == owner.name {
            return true;
        }
        if user.roles.iter().any(|r| r == ALL_ACCESS_ROLE) {
            return true;
        }
        user.backend_roles
            .iter()
            .any(|role| owner.backend_roles.contains(role))
    }
}
