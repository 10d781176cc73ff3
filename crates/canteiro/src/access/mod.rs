//! Role to permission resolution used at the authorization boundary.
//!
//! Permissions are `<domain>:<action>` strings. The privileged role is never stored in the
//! table: its grant is the union of every other role's permissions, computed on each call,
//! so adding a role to the table extends it automatically.

use std::collections::{BTreeMap, BTreeSet};

pub mod permissions {
    pub const TIMESHEETS_READ: &str = "timesheets:read";
    pub const TIMESHEETS_WRITE: &str = "timesheets:write";
    pub const TIMESHEETS_APPROVE: &str = "timesheets:approve";
    pub const TIMESHEETS_PAY: &str = "timesheets:pay";
    pub const EMPLOYEES_READ: &str = "employees:read";
    pub const EMPLOYEES_WRITE: &str = "employees:write";
    pub const WORKS_READ: &str = "works:read";
    pub const WORKS_WRITE: &str = "works:write";
    pub const SUPPLIES_READ: &str = "supplies:read";
    pub const SUPPLIES_WRITE: &str = "supplies:write";
    pub const USERS_MANAGE: &str = "users:manage";
}

use permissions::*;

const STANDARD_ROLES: &[(&str, &[&str])] = &[
    (
        "manager",
        &[
            TIMESHEETS_READ,
            TIMESHEETS_WRITE,
            TIMESHEETS_APPROVE,
            EMPLOYEES_READ,
            EMPLOYEES_WRITE,
            WORKS_READ,
            WORKS_WRITE,
            SUPPLIES_READ,
        ],
    ),
    (
        "foreman",
        &[TIMESHEETS_READ, TIMESHEETS_WRITE, EMPLOYEES_READ, WORKS_READ],
    ),
    (
        "finance",
        &[TIMESHEETS_READ, TIMESHEETS_PAY, EMPLOYEES_READ, WORKS_READ],
    ),
    ("warehouse", &[SUPPLIES_READ, SUPPLIES_WRITE, WORKS_READ]),
    ("security", &[USERS_MANAGE]),
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoleTableError {
    #[error("role name must not be blank")]
    BlankRole,
    #[error("permission '{permission}' for role '{role}' is not formatted as <domain>:<action>")]
    MalformedPermission { role: String, permission: String },
}

/// Immutable role table built once at startup.
#[derive(Debug, Clone)]
pub struct RoleTable {
    privileged_role: String,
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl RoleTable {
    pub fn from_entries<'a, I, P>(privileged_role: &str, entries: I) -> Result<Self, RoleTableError>
    where
        I: IntoIterator<Item = (&'a str, P)>,
        P: IntoIterator<Item = &'a str>,
    {
        let privileged_role = normalize_role(privileged_role)?;
        let mut grants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (role, role_permissions) in entries {
            let role = normalize_role(role)?;
            let granted = grants.entry(role.clone()).or_default();
            for permission in role_permissions {
                let permission = permission.trim();
                if !is_well_formed(permission) {
                    return Err(RoleTableError::MalformedPermission {
                        role,
                        permission: permission.to_string(),
                    });
                }
                granted.insert(permission.to_string());
            }
        }

        Ok(Self {
            privileged_role,
            grants,
        })
    }

    pub fn standard(privileged_role: &str) -> Result<Self, RoleTableError> {
        Self::from_entries(
            privileged_role,
            STANDARD_ROLES
                .iter()
                .map(|(role, granted)| (*role, granted.iter().copied())),
        )
    }

    pub fn privileged_role(&self) -> &str {
        &self.privileged_role
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.grants.keys().map(String::as_str)
    }
}

/// Resolves a role name to the permissions it grants.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    table: RoleTable,
}

impl PermissionResolver {
    pub fn new(table: RoleTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RoleTable {
        &self.table
    }

    /// Unknown roles resolve to an empty set.
    pub fn resolve(&self, role: &str) -> BTreeSet<String> {
        let Ok(role) = normalize_role(role) else {
            return BTreeSet::new();
        };

        if role == self.table.privileged_role {
            return self.table.grants.values().flatten().cloned().collect();
        }

        self.table.grants.get(&role).cloned().unwrap_or_default()
    }

    pub fn is_granted(&self, role: &str, permission: &str) -> bool {
        self.resolve(role).contains(permission)
    }
}

fn normalize_role(role: &str) -> Result<String, RoleTableError> {
    let role = role.trim();
    if role.is_empty() {
        return Err(RoleTableError::BlankRole);
    }
    Ok(role.to_ascii_lowercase())
}

pub fn is_well_formed(permission: &str) -> bool {
    match permission.split_once(':') {
        Some((domain, action)) => {
            !domain.is_empty() && !action.is_empty() && !action.contains(':')
        }
        None => false,
    }
}
