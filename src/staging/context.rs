//! Security Context
//!
//! Opaque identity handed in by the authorization layer. The staging
//! subsystem never interprets the role, it only forwards the context and
//! uses principal/group ids as inputs to path and URL derivation.

use std::fmt;

/// Role inside the owning group. Carried through, never evaluated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest,
    Member,
    Manager,
    Administrator,
}

/// Identity scope for all staging operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    pub principal_id: String,
    pub group_id: String,
    pub role: Role,
}

impl SecurityContext {
    pub fn new(principal_id: impl Into<String>, group_id: impl Into<String>, role: Role) -> Self {
        Self {
            principal_id: principal_id.into(),
            group_id: group_id.into(),
            role,
        }
    }

    /// Context acting on behalf of a transfer owner (used by background
    /// cycles that have no caller-provided context).
    pub fn member(principal_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self::new(principal_id, group_id, Role::Member)
    }
}

impl fmt::Display for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.principal_id, self.group_id)
    }
}
