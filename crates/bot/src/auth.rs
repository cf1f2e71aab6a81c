//! Role-based authorization for administrative commands.

use hourbell_common::types::UserId;
use hourbell_engine::Authorizer;

/// Who issued a command, as seen by the command layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub roles: Vec<String>,
}

impl Caller {
    pub fn new(user_id: UserId, roles: Vec<String>) -> Self {
        Self { user_id, roles }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Authorizes callers holding one named role.
#[derive(Debug, Clone)]
pub struct RoleAuthorizer {
    role: String,
}

impl RoleAuthorizer {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl Authorizer for RoleAuthorizer {
    type Caller = Caller;

    fn is_authorized(&self, caller: &Caller) -> bool {
        caller.has_role(&self.role)
    }
}
