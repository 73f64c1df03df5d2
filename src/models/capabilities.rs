//! Capability traits the engine depends on instead of concrete user/role layouts.
//!
//! Applications plug their own user and role types into the engine by
//! implementing the subset of these traits each component asks for.

use super::RoleId;

/// Something with a stable identifier.
pub trait HasId {
    type Id: Clone;

    fn id(&self) -> Self::Id;
}

/// Something with a unique human-readable name.
pub trait HasName {
    fn name(&self) -> &str;
}

/// Marks protected records (the super-role and other built-in roles).
pub trait IsSystem {
    fn is_system(&self) -> bool;
}

/// A principal that may carry its role ids.
///
/// `None` means the role ids were never attached (e.g. a token issued before
/// role ids were embedded), as opposed to an empty role set.
pub trait HasRoles {
    fn role_ids(&self) -> Option<&[RoleId]>;

    /// Role names, consulted only when role ids are absent.
    fn role_names(&self) -> Option<&[String]> {
        None
    }
}
