use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::{MarketError, MarketResult};

/// Capabilities a user can hold for a single store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ManageInventory,
    ManageDiscounts,
    ManagePurchasePolicy,
    ViewHistory,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::ManageInventory,
        Permission::ManageDiscounts,
        Permission::ManagePurchasePolicy,
        Permission::ViewHistory,
    ];
}

/// Everything the engine needs to know about the acting user.
///
/// Authentication happens elsewhere; by the time a context reaches the engine it is trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub username: String,
    pub age: u32,
    pub is_admin: bool,
    grants: HashMap<Uuid, HashSet<Permission>>,
}

impl UserContext {
    pub fn member(username: impl Into<String>, age: u32) -> Self {
        Self {
            username: username.into(),
            age,
            is_admin: false,
            grants: HashMap::new(),
        }
    }

    pub fn guest(age: u32) -> Self {
        Self::member(format!("guest-{}", Uuid::new_v4().simple()), age)
    }

    pub fn admin(username: impl Into<String>, age: u32) -> Self {
        Self {
            is_admin: true,
            ..Self::member(username, age)
        }
    }

    pub fn grant(&mut self, store_id: Uuid, permission: Permission) {
        self.grants.entry(store_id).or_default().insert(permission);
    }

    /// Owners hold every permission on their store
    pub fn grant_owner(&mut self, store_id: Uuid) {
        self.grants
            .entry(store_id)
            .or_default()
            .extend(Permission::ALL);
    }

    pub fn revoke(&mut self, store_id: Uuid, permission: Permission) {
        if let Some(perms) = self.grants.get_mut(&store_id) {
            perms.remove(&permission);
            if perms.is_empty() {
                self.grants.remove(&store_id);
            }
        }
    }

    pub fn can(&self, store_id: Uuid, permission: Permission) -> bool {
        self.is_admin
            || self
                .grants
                .get(&store_id)
                .is_some_and(|perms| perms.contains(&permission))
    }

    pub fn require(&self, store_id: Uuid, permission: Permission) -> MarketResult<()> {
        if self.can(store_id, permission) {
            Ok(())
        } else {
            Err(MarketError::PermissionDenied(format!(
                "{} lacks {:?} on store {}",
                self.username, permission, store_id
            )))
        }
    }

    pub fn stores(&self) -> impl Iterator<Item = &Uuid> {
        self.grants.keys()
    }
}
