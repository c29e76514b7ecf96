//! Metadata roles and their lifetimes

use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// The four metadata roles
///
/// Root authorizes all role keys; targets lists trusted target records;
/// snapshot pins the targets document; timestamp pins the snapshot document
/// and is the only role fetched without a known expected version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Root of trust; authorizes the key set of every role
    Root,
    /// Lists target records
    Targets,
    /// Pins the exact targets document
    Snapshot,
    /// Pins the exact snapshot document; fetched fresh every session
    Timestamp,
}

impl Role {
    /// All roles, in root-first order
    pub const ALL: [Role; 4] = [Role::Root, Role::Targets, Role::Snapshot, Role::Timestamp];

    /// The role name as used for metadata document and key file names
    pub fn name(&self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Targets => "targets",
            Role::Snapshot => "snapshot",
            Role::Timestamp => "timestamp",
        }
    }

    /// Parse a role from its document name
    pub fn from_name(name: &str) -> Option<Role> {
        match name {
            "root" => Some(Role::Root),
            "targets" => Some(Role::Targets),
            "snapshot" => Some(Role::Snapshot),
            "timestamp" => Some(Role::Timestamp),
            _ => None,
        }
    }

    /// The default document lifetime for this role
    ///
    /// Roles closer to the content rotate faster: a stolen timestamp key
    /// ages out in a day, while root survives a year.
    pub fn default_lifetime(&self) -> TimeDelta {
        match self {
            Role::Root => TimeDelta::days(365),
            Role::Targets => TimeDelta::days(90),
            Role::Snapshot => TimeDelta::days(7),
            Role::Timestamp => TimeDelta::days(1),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-role document lifetimes for one repository
#[derive(Debug, Clone, Copy)]
pub struct RoleLifetimes {
    /// Lifetime of the root document
    pub root: TimeDelta,
    /// Lifetime of the targets document
    pub targets: TimeDelta,
    /// Lifetime of the snapshot document
    pub snapshot: TimeDelta,
    /// Lifetime of the timestamp document
    pub timestamp: TimeDelta,
}

impl Default for RoleLifetimes {
    fn default() -> Self {
        Self {
            root: Role::Root.default_lifetime(),
            targets: Role::Targets.default_lifetime(),
            snapshot: Role::Snapshot.default_lifetime(),
            timestamp: Role::Timestamp.default_lifetime(),
        }
    }
}

impl RoleLifetimes {
    /// The configured lifetime for a role
    pub fn get(&self, role: Role) -> TimeDelta {
        match role {
            Role::Root => self.root,
            Role::Targets => self.targets,
            Role::Snapshot => self.snapshot,
            Role::Timestamp => self.timestamp,
        }
    }
}
