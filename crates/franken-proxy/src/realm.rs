//! Realms: isolation domains with their own cross-realm wrapper maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, ProxyResult};
use crate::object_model::ObjectHandle;
use crate::registry::PolicyHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RealmId(pub u32);

impl RealmId {
    /// The realm every runtime starts in.
    pub const MAIN: RealmId = RealmId(0);
}

/// Options for [`RealmRegistry::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmOptions {
    pub name: String,
    /// Handler policy used for wrappers this realm creates around foreign
    /// objects.
    pub wrapper_policy: PolicyHandle,
}

impl Default for RealmOptions {
    fn default() -> Self {
        Self {
            name: "realm".to_string(),
            wrapper_policy: PolicyHandle::CROSS_REALM,
        }
    }
}

impl RealmOptions {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_wrapper_policy(mut self, policy: PolicyHandle) -> Self {
        self.wrapper_policy = policy;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realm {
    pub id: RealmId,
    pub name: String,
    pub wrapper_policy: PolicyHandle,
    /// Foreign object -> the wrapper this realm uses for it.
    wrappers: BTreeMap<ObjectHandle, ObjectHandle>,
}

impl Realm {
    pub fn wrapper_for(&self, target: ObjectHandle) -> Option<ObjectHandle> {
        self.wrappers.get(&target).copied()
    }

    pub fn insert_wrapper(&mut self, target: ObjectHandle, wrapper: ObjectHandle) {
        self.wrappers.insert(target, wrapper);
    }

    pub fn remove_wrapper(&mut self, target: ObjectHandle) -> Option<ObjectHandle> {
        self.wrappers.remove(&target)
    }

    /// `(target, wrapper)` pairs in target order.
    pub fn wrappers(&self) -> impl Iterator<Item = (ObjectHandle, ObjectHandle)> + '_ {
        self.wrappers.iter().map(|(t, w)| (*t, *w))
    }

    pub fn wrapper_count(&self) -> usize {
        self.wrappers.len()
    }
}

/// All realms of a runtime plus the current one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmRegistry {
    realms: Vec<Realm>,
    current: RealmId,
}

impl Default for RealmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RealmRegistry {
    /// Registry holding only the main realm, which is current.
    pub fn new() -> Self {
        let mut registry = Self {
            realms: Vec::new(),
            current: RealmId::MAIN,
        };
        registry.create(RealmOptions::named("main"));
        registry
    }

    pub fn create(&mut self, options: RealmOptions) -> RealmId {
        let id = RealmId(self.realms.len() as u32);
        self.realms.push(Realm {
            id,
            name: options.name,
            wrapper_policy: options.wrapper_policy,
            wrappers: BTreeMap::new(),
        });
        id
    }

    pub fn get(&self, realm: RealmId) -> ProxyResult<&Realm> {
        self.realms
            .get(realm.0 as usize)
            .ok_or(ProxyError::UnknownRealm { realm })
    }

    pub fn get_mut(&mut self, realm: RealmId) -> ProxyResult<&mut Realm> {
        self.realms
            .get_mut(realm.0 as usize)
            .ok_or(ProxyError::UnknownRealm { realm })
    }

    pub fn current(&self) -> RealmId {
        self.current
    }

    /// Make `realm` current, returning the previous one.
    pub fn enter(&mut self, realm: RealmId) -> ProxyResult<RealmId> {
        self.get(realm)?;
        Ok(std::mem::replace(&mut self.current, realm))
    }

    pub fn len(&self) -> usize {
        self.realms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }
}
