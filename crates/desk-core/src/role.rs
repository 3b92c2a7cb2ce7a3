//! # Access Roles
//!
//! Roles are ordered by privilege so that access checks are a single
//! comparison: `Viewer < Agent < Manager < Admin`.

use serde::{Deserialize, Serialize};

/// Privilege level of a caller within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access; may file own leave requests.
    Viewer,
    /// Works tickets and tasks.
    Agent,
    /// Runs sprints, approves changes and leave, owns SLA and catalog.
    Manager,
    /// Manages users, teams and workflows.
    Admin,
}

impl Role {
    /// Snake-case name as used in bearer tokens.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Agent => "agent",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    /// Parse a role from its token name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "agent" => Some(Self::Agent),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
