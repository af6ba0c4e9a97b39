//! Roles and the acting user

use serde::{Deserialize, Serialize};
use std::fmt;

/// User role enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Books apartments
    #[default]
    Renter,
    /// Lists apartments and decides on their bookings
    Owner,
    /// Platform staff with read and lock access
    Moderator,
    /// Full access, including overrides
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Renter => write!(f, "renter"),
            UserRole::Owner => write!(f, "owner"),
            UserRole::Moderator => write!(f, "moderator"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl UserRole {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "renter" | "user" => Some(UserRole::Renter),
            "owner" => Some(UserRole::Owner),
            "moderator" => Some(UserRole::Moderator),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Moderators and admins
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Moderator | UserRole::Admin)
    }

    /// Get role hierarchy level (higher = more privileges)
    pub fn level(&self) -> u8 {
        match self {
            UserRole::Renter => 1,
            UserRole::Owner => 2,
            UserRole::Moderator => 3,
            UserRole::Admin => 4,
        }
    }
}

/// The authenticated caller of a core operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: i64, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn renter(user_id: i64) -> Self {
        Self::new(user_id, UserRole::Renter)
    }

    pub fn owner(user_id: i64) -> Self {
        Self::new(user_id, UserRole::Owner)
    }

    pub fn admin(user_id: i64) -> Self {
        Self::new(user_id, UserRole::Admin)
    }

    /// Internal caller used by sweeps and the payment callback
    pub fn system() -> Self {
        Self::new(0, UserRole::Admin)
    }

    pub fn is_system(&self) -> bool {
        self.user_id == 0 && self.role.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(UserRole::from_str("OWNER"), Some(UserRole::Owner));
        assert_eq!(UserRole::from_str("user"), Some(UserRole::Renter));
        assert_eq!(UserRole::from_str("root"), None);
    }

    #[test]
    fn test_role_levels() {
        assert!(UserRole::Admin.level() > UserRole::Moderator.level());
        assert!(UserRole::Moderator.is_staff());
        assert!(!UserRole::Owner.is_staff());
    }
}
