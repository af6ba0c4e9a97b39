//! Capability checks
//!
//! One function decides whether an actor may do something to a resource.
//! Services call [`check`] before touching state; handlers never inspect
//! roles themselves.

use rento_core::models::Actor;
use rento_core::{AppError, AppResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Read a booking and its door access
    ViewBooking,
    /// Confirm, cancel, finish or extend one's own booking
    ManageBooking,
    /// Reject a booking or decide on an extension
    DecideBooking,
    /// Act outside the normal flow (manual approval, cancel an active stay)
    AdminOverride,
    /// Open or close a door
    ControlLock,
    /// Issue user passwords and reset locks
    ManageLocks,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::ViewBooking => "view_booking",
            Permission::ManageBooking => "manage_booking",
            Permission::DecideBooking => "decide_booking",
            Permission::AdminOverride => "admin_override",
            Permission::ControlLock => "control_lock",
            Permission::ManageLocks => "manage_locks",
        };
        f.write_str(s)
    }
}

/// Ownership facts about the thing being acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Booking { renter_id: i64, owner_id: i64 },
    Apartment { owner_id: i64 },
    /// `owner_id` is `None` for unbound locks
    Lock { owner_id: Option<i64> },
    Platform,
}

pub fn permitted(actor: &Actor, permission: Permission, resource: Resource) -> bool {
    let role = actor.role;
    if role.is_admin() {
        return true;
    }

    let me = actor.user_id;
    match (permission, resource) {
        (Permission::ViewBooking, Resource::Booking { renter_id, owner_id }) => {
            me == renter_id || me == owner_id || role.is_staff()
        }
        (Permission::ViewBooking, Resource::Apartment { owner_id }) => {
            me == owner_id || role.is_staff()
        }
        (Permission::ManageBooking, Resource::Booking { renter_id, .. }) => me == renter_id,
        (Permission::DecideBooking, Resource::Booking { owner_id, .. })
        | (Permission::DecideBooking, Resource::Apartment { owner_id }) => {
            me == owner_id || role.is_staff()
        }
        (Permission::ControlLock, Resource::Lock { owner_id }) => {
            owner_id == Some(me) || role.is_staff()
        }
        (Permission::ManageLocks, _) => role.is_staff(),
        (Permission::AdminOverride, _) => false,
        _ => role.is_staff(),
    }
}

/// `Err(Forbidden)` unless [`permitted`]
pub fn check(actor: &Actor, permission: Permission, resource: Resource) -> AppResult<()> {
    if permitted(actor, permission, resource) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "user {} ({}) lacks {}",
            actor.user_id, actor.role, permission
        )))
    }
}
