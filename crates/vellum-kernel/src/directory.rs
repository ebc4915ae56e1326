//! Users, groups and roles.
//!
//! The broker never decides on its own who belongs where; it asks a
//! [`Directory`]. [`StaticDirectory`] is the in-process implementation.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use vellum_types::{Group, GroupId, Resource, Role, User, UserId};

/// Membership and role lookups consumed by the broker.
pub trait Directory: Send + Sync {
    /// The caller's relation to a resource.
    fn role_of(&self, user: &UserId, resource: &Resource) -> Role {
        if resource.owner == *user {
            Role::Owner
        } else if self.is_member(user, &resource.group) {
            Role::GroupMember
        } else {
            Role::Other
        }
    }

    /// Administrators bypass project access and permission checks.
    fn is_admin(&self, user: &UserId) -> bool;

    fn is_member(&self, user: &UserId, group: &GroupId) -> bool;
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    groups: HashMap<GroupId, Group>,
    members: HashMap<GroupId, HashSet<UserId>>,
}

/// Directory held in memory, filled in by the embedding application.
pub struct StaticDirectory {
    admin_group: GroupId,
    inner: RwLock<Inner>,
}

impl StaticDirectory {
    /// Create a directory whose administrators are members of a group named
    /// `admin_group`.
    pub fn new(admin_group: impl Into<String>) -> Self {
        let admins = Group::new(admin_group);
        let admin_group = admins.id;
        let mut inner = Inner::default();
        inner.groups.insert(admins.id, admins);
        Self {
            admin_group,
            inner: RwLock::new(inner),
        }
    }

    pub fn admin_group(&self) -> GroupId {
        self.admin_group
    }

    pub fn add_user(&self, user: User) -> UserId {
        let id = user.id;
        self.inner.write().users.insert(id, user);
        id
    }

    pub fn add_group(&self, group: Group) -> GroupId {
        let id = group.id;
        self.inner.write().groups.insert(id, group);
        id
    }

    /// Put `user` in `group`. Unknown groups are created implicitly.
    pub fn add_member(&self, group: GroupId, user: UserId) {
        self.inner.write().members.entry(group).or_default().insert(user);
    }

    pub fn remove_member(&self, group: GroupId, user: UserId) -> bool {
        self.inner
            .write()
            .members
            .get_mut(&group)
            .is_some_and(|m| m.remove(&user))
    }

    pub fn grant_admin(&self, user: UserId) {
        self.add_member(self.admin_group, user);
    }

    pub fn user(&self, id: &UserId) -> Option<User> {
        self.inner.read().users.get(id).cloned()
    }

    pub fn user_by_name(&self, name: &str) -> Option<User> {
        self.inner.read().users.values().find(|u| u.name == name).cloned()
    }

    pub fn group_by_name(&self, name: &str) -> Option<Group> {
        self.inner.read().groups.values().find(|g| g.name == name).cloned()
    }

    /// Groups `user` belongs to.
    pub fn groups_of(&self, user: &UserId) -> Vec<GroupId> {
        self.inner
            .read()
            .members
            .iter()
            .filter(|(_, m)| m.contains(user))
            .map(|(g, _)| *g)
            .collect()
    }
}

impl Directory for StaticDirectory {
    fn is_admin(&self, user: &UserId) -> bool {
        self.is_member(user, &self.admin_group)
    }

    fn is_member(&self, user: &UserId, group: &GroupId) -> bool {
        self.inner
            .read()
            .members
            .get(group)
            .is_some_and(|m| m.contains(user))
    }
}
