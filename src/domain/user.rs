use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::Lifecycle;

// ============================================================================
// User - Roles and Ownership Policy
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Customer,
    Owner,
    Manager,
    Master,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "CUSTOMER",
            UserRole::Owner => "OWNER",
            UserRole::Manager => "MANAGER",
            UserRole::Master => "MASTER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CUSTOMER" => Some(UserRole::Customer),
            "OWNER" => Some(UserRole::Owner),
            "MANAGER" => Some(UserRole::Manager),
            "MASTER" => Some(UserRole::Master),
            _ => None,
        }
    }
}

/// Ownership policy shared by the review update and delete paths.
///
/// Customers may only touch records they own; every other role bypasses the
/// ownership check (but never the existence check, which stays with the
/// caller).
pub fn can_access(role: UserRole, requester_id: Uuid, owner_id: Uuid) -> bool {
    role != UserRole::Customer || requester_id == owner_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_can_access_own_record() {
        let owner = Uuid::new_v4();
        assert!(can_access(UserRole::Customer, owner, owner));
    }

    #[test]
    fn test_customer_cannot_access_foreign_record() {
        assert!(!can_access(
            UserRole::Customer,
            Uuid::new_v4(),
            Uuid::new_v4()
        ));
    }

    #[test]
    fn test_elevated_roles_bypass_ownership() {
        let requester = Uuid::new_v4();
        let owner = Uuid::new_v4();

        for role in [UserRole::Owner, UserRole::Manager, UserRole::Master] {
            assert!(can_access(role, requester, owner));
        }
    }

    #[test]
    fn test_role_string_round_trip() {
        for role in [
            UserRole::Customer,
            UserRole::Owner,
            UserRole::Manager,
            UserRole::Master,
        ] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("ADMIN"), None);
    }
}
