//! Caller identity for mutating operations.
//!
//! Credential checks happen in front of this crate; services only receive an
//! already-authenticated [`Actor`] and decide whether its role permits the call.

use crate::entities::user::Role;
use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};

/// The authenticated caller of a service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i32,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: i32, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: i32) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn user(user_id: i32) -> Self {
        Self::new(user_id, Role::User)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with [`ServiceError::Forbidden`] unless the caller is an administrator.
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "user {} lacks the admin role",
                self.user_id
            )))
        }
    }
}

impl From<&crate::entities::user::Model> for Actor {
    fn from(user: &crate::entities::user::Model) -> Self {
        Self::new(user.id, user.role)
    }
}
