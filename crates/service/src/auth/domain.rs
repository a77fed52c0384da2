use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};
use crate::ids::{RoleId, UserId};

/// A named capability token. Opaque to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for Permission {
    fn from(s: String) -> Self { Self(s) }
}

/// Ordered permission list. Grants keep whatever order and repeats the caller
/// gave them; the catalog and effective sets are de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(Vec<Permission>);

impl Permissions {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, permission: impl Into<Permission>) { self.0.push(permission.into()); }

    pub fn contains(&self, name: &str) -> bool { self.0.iter().any(|p| p.as_str() == name) }

    /// Same order, later repeats dropped.
    pub fn deduplicated(&self) -> Self {
        let mut out = Permissions::new();
        for p in &self.0 {
            if !out.0.contains(p) {
                out.0.push(p.clone());
            }
        }
        out
    }

    /// Ordered union: entries of the first list, then new entries of the
    /// next, and so on.
    pub fn union<'a, I>(lists: I) -> Self
    where
        I: IntoIterator<Item = &'a Permissions>,
    {
        lists.into_iter().flat_map(|l| l.0.iter().cloned()).collect::<Permissions>().deduplicated()
    }

    pub(crate) fn validate(&self, owner: &str) -> StoreResult<()> {
        if self.0.iter().any(|p| p.as_str().trim().is_empty()) {
            return Err(StoreError::validation(format!("{owner} has an empty permission name")));
        }
        Ok(())
    }
}

impl Deref for Permissions {
    type Target = [Permission];

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl From<Vec<Permission>> for Permissions {
    fn from(v: Vec<Permission>) -> Self { Self(v) }
}

impl<P: Into<Permission>> FromIterator<P> for Permissions {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self { Self(iter.into_iter().map(Into::into).collect()) }
}

impl IntoIterator for Permissions {
    type Item = Permission;
    type IntoIter = std::vec::IntoIter<Permission>;

    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl<'a> IntoIterator for &'a Permissions {
    type Item = &'a Permission;
    type IntoIter = std::slice::Iter<'a, Permission>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

/// An authenticated principal.
///
/// `roles` is a read-time view of the user's memberships. Each embedded role
/// is shallow: its `users` list is always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "ID", default)]
    pub id: UserId,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Permissions", default)]
    pub permissions: Permissions,
    #[serde(rename = "Roles", default)]
    pub roles: Vec<Role>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    /// Direct grants plus the grants of every embedded role.
    pub fn effective_permissions(&self) -> Permissions {
        Permissions::union(std::iter::once(&self.permissions).chain(self.roles.iter().map(|r| &r.permissions)))
    }

    /// Referenced role IDs, ascending and without repeats.
    pub fn role_ids(&self) -> Vec<RoleId> {
        sorted_unique(self.roles.iter().map(|r| r.id))
    }

    /// Copy without memberships, as embedded inside a [`Role`].
    pub fn shallow(&self) -> User {
        User { roles: Vec::new(), ..self.clone() }
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::validation("user name required"));
        }
        self.permissions.validate("user")?;
        if let Some(role) = self.roles.iter().find(|r| !r.id.is_assigned()) {
            return Err(StoreError::validation(format!("role reference {:?} has no ID", role.name)));
        }
        Ok(())
    }
}

/// A named bundle of permissions.
///
/// `users` is a read-time view of the role's members. Each embedded user is
/// shallow: its `roles` list is always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "ID", default)]
    pub id: RoleId,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Permissions", default)]
    pub permissions: Permissions,
    #[serde(rename = "Users", default)]
    pub users: Vec<User>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn with_users(mut self, users: impl IntoIterator<Item = User>) -> Self {
        self.users = users.into_iter().collect();
        self
    }

    /// Referenced user IDs, ascending and without repeats.
    pub fn user_ids(&self) -> Vec<UserId> {
        sorted_unique(self.users.iter().map(|u| u.id))
    }

    /// Copy without members, as embedded inside a [`User`].
    pub fn shallow(&self) -> Role {
        Role { users: Vec::new(), ..self.clone() }
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::validation("role name required"));
        }
        self.permissions.validate("role")?;
        if let Some(user) = self.users.iter().find(|u| !u.id.is_assigned()) {
            return Err(StoreError::validation(format!("user reference {:?} has no ID", user.name)));
        }
        Ok(())
    }
}

pub(crate) fn sorted_unique<T: Ord + Copy>(ids: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = ids.into_iter().collect();
    out.sort_unstable();
    out.dedup();
    out
}
