//! Handler policy registry.
//!
//! Proxies refer to their handler behavior by [`PolicyHandle`].  The
//! registry is built once, frozen behind an `Arc`, and shared by every
//! runtime that uses it.  The first six handles are fixed.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, ProxyResult};
use crate::handler::{DirectHandler, ProxyHandler};
use crate::scripted::ScriptedHandler;
use crate::wrapper::{AccessPolicy, CrossRealmWrapper, DenyMutations, SecurityWrapper, Wrapper};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyHandle(pub u32);

impl PolicyHandle {
    pub const DIRECT: PolicyHandle = PolicyHandle(0);
    pub const SCRIPTED: PolicyHandle = PolicyHandle(1);
    pub const WRAPPER: PolicyHandle = PolicyHandle(2);
    pub const CROSS_REALM: PolicyHandle = PolicyHandle(3);
    pub const SECURITY: PolicyHandle = PolicyHandle(4);
    pub const CROSS_REALM_SECURITY: PolicyHandle = PolicyHandle(5);
}

/// Closed set of handler implementations.
#[derive(Debug, Clone)]
pub enum HandlerKind {
    Direct(DirectHandler),
    Scripted(ScriptedHandler),
    Wrapper(Wrapper),
    CrossRealm(CrossRealmWrapper),
    Security(SecurityWrapper<Wrapper>),
    CrossRealmSecurity(SecurityWrapper<CrossRealmWrapper>),
}

impl HandlerKind {
    pub fn as_handler(&self) -> &dyn ProxyHandler {
        match self {
            Self::Direct(h) => h,
            Self::Scripted(h) => h,
            Self::Wrapper(h) => h,
            Self::CrossRealm(h) => h,
            Self::Security(h) => h,
            Self::CrossRealmSecurity(h) => h,
        }
    }

    /// Same-realm security wrapper with a custom policy.
    pub fn security(policy: Arc<dyn AccessPolicy>) -> Self {
        Self::Security(SecurityWrapper::new(Wrapper::default(), policy))
    }

    /// Cross-realm security wrapper with a custom policy.
    pub fn cross_realm_security(policy: Arc<dyn AccessPolicy>) -> Self {
        Self::CrossRealmSecurity(SecurityWrapper::new(CrossRealmWrapper::new(), policy))
    }
}

#[derive(Debug)]
pub struct PolicyRegistry {
    handlers: Vec<HandlerKind>,
}

impl PolicyRegistry {
    /// The standard registry, built on first use.
    pub fn shared_standard() -> Arc<PolicyRegistry> {
        static STANDARD: OnceLock<Arc<PolicyRegistry>> = OnceLock::new();
        Arc::clone(STANDARD.get_or_init(|| PolicyRegistryBuilder::standard().build()))
    }

    pub fn handler(&self, handle: PolicyHandle) -> ProxyResult<&dyn ProxyHandler> {
        self.kind(handle).map(HandlerKind::as_handler)
    }

    pub fn kind(&self, handle: PolicyHandle) -> ProxyResult<&HandlerKind> {
        self.handlers
            .get(handle.0 as usize)
            .ok_or(ProxyError::UnknownPolicy { handle })
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Debug)]
pub struct PolicyRegistryBuilder {
    handlers: Vec<HandlerKind>,
}

impl PolicyRegistryBuilder {
    /// Builder pre-populated with the standard handlers at their fixed
    /// handles.
    pub fn standard() -> Self {
        let deny: Arc<dyn AccessPolicy> = Arc::new(DenyMutations);
        Self {
            handlers: vec![
                HandlerKind::Direct(DirectHandler),
                HandlerKind::Scripted(ScriptedHandler),
                HandlerKind::Wrapper(Wrapper::default()),
                HandlerKind::CrossRealm(CrossRealmWrapper::new()),
                HandlerKind::security(Arc::clone(&deny)),
                HandlerKind::cross_realm_security(deny),
            ],
        }
    }

    pub fn register(&mut self, kind: HandlerKind) -> PolicyHandle {
        let handle = PolicyHandle(self.handlers.len() as u32);
        self.handlers.push(kind);
        handle
    }

    pub fn build(self) -> Arc<PolicyRegistry> {
        Arc::new(PolicyRegistry {
            handlers: self.handlers,
        })
    }
}
