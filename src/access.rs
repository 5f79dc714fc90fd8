//! Authorization: authorized users, admins and the configured super-admin

use crate::identity::Identity;
use crate::store::{JsonStore, StoreError, StoreResult};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Which persisted identity list an admin command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessList {
    /// Mechanics allowed to file reports
    Users,
    Admins,
}

/// Outcome of an add/remove command that was allowed to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessChange {
    Added,
    AlreadyPresent,
    Removed,
    NotFound,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("the super-admin cannot be removed")]
    SuperAdminProtected,
    #[error("only the super-admin may remove admins")]
    NotPermitted,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Static identity lists plus one super-admin that is always authorized
#[derive(Clone)]
pub struct AccessControl {
    super_admin: Identity,
    users: JsonStore<BTreeSet<Identity>>,
    admins: JsonStore<BTreeSet<Identity>>,
}

impl AccessControl {
    pub fn open(
        super_admin: Identity,
        users_path: impl AsRef<Path>,
        admins_path: impl AsRef<Path>,
    ) -> StoreResult<Self> {
        Ok(Self {
            super_admin,
            users: JsonStore::open(users_path)?,
            admins: JsonStore::open(admins_path)?,
        })
    }

    #[allow(dead_code)] // Used in tests
    pub fn in_memory(super_admin: Identity) -> Self {
        Self {
            super_admin,
            users: JsonStore::in_memory(BTreeSet::new()),
            admins: JsonStore::in_memory(BTreeSet::new()),
        }
    }

    pub fn is_admin(&self, id: Identity) -> bool {
        id == self.super_admin || self.admins.read(|a| a.contains(&id))
    }

    /// Users, admins and the super-admin may file reports.
    pub fn is_authorized(&self, id: Identity) -> bool {
        self.is_admin(id) || self.users.read(|u| u.contains(&id))
    }

    pub fn list(&self, list: AccessList) -> Vec<Identity> {
        self.store(list).read(|set| set.iter().copied().collect())
    }

    pub fn add(&self, list: AccessList, id: Identity) -> Result<AccessChange, AccessError> {
        let inserted = self.store(list).update(|set| set.insert(id))?;
        if inserted {
            tracing::info!(?list, identity = %id, "Identity added");
            Ok(AccessChange::Added)
        } else {
            Ok(AccessChange::AlreadyPresent)
        }
    }

    /// Remove `id` from `list` on behalf of `actor`.
    ///
    /// The super-admin can never be removed, and only the super-admin may
    /// remove admins.
    pub fn remove(
        &self,
        actor: Identity,
        list: AccessList,
        id: Identity,
    ) -> Result<AccessChange, AccessError> {
        if list == AccessList::Admins {
            if id == self.super_admin {
                return Err(AccessError::SuperAdminProtected);
            }
            if actor != self.super_admin {
                return Err(AccessError::NotPermitted);
            }
        }

        let removed = self.store(list).update(|set| set.remove(&id))?;
        if removed {
            tracing::info!(?list, identity = %id, actor = %actor, "Identity removed");
            Ok(AccessChange::Removed)
        } else {
            Ok(AccessChange::NotFound)
        }
    }

    fn store(&self, list: AccessList) -> &JsonStore<BTreeSet<Identity>> {
        match list {
            AccessList::Users => &self.users,
            AccessList::Admins => &self.admins,
        }
    }
}
