//! Revocation of proxies and severing of cross-realm wrappers.
//!
//! Revocation clears a proxy's target and handler.  It is one-way: the
//! proxy keeps its identity, and every later operation on it fails before
//! any handler code runs.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ProxyResult;
use crate::events::{ProxyEvent, ProxyEventOutcome, ProxyEventType};
use crate::object_model::{JsValue, ObjectHandle};
use crate::realm::RealmId;
use crate::runtime::Runtime;

/// A proxy with its single-use revoke function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocableProxy {
    pub proxy: ObjectHandle,
    pub revoke: ObjectHandle,
}

pub struct RevocationController;

impl RevocationController {
    /// Revoke `proxy`.  Returns `false` if it was already revoked.
    pub fn revoke(rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        let revoked = rt.heap_mut().proxy_mut(proxy)?.revoke();
        if revoked {
            rt.record_event(
                ProxyEvent::new(ProxyEventType::Revoked, ProxyEventOutcome::Pass).with_object(proxy),
            );
        }
        Ok(revoked)
    }

    /// Allocate the revoke function for `proxy`.
    ///
    /// The function drops its reference to the proxy on first call; later
    /// calls do nothing and return `undefined`.
    pub fn issue_revoker(rt: &mut Runtime, proxy: ObjectHandle) -> ObjectHandle {
        let slot = Rc::new(Cell::new(Some(proxy)));
        rt.create_function("revoke", move |rt, _this, _args| {
            if let Some(proxy) = slot.take() {
                Self::revoke(rt, proxy)?;
            }
            Ok(JsValue::Undefined)
        })
    }

    /// Sever a wrapper and drop it from its realm's wrapper map.
    ///
    /// Returns `false` if the wrapper was already severed.
    pub fn nuke_wrapper(rt: &mut Runtime, wrapper: ObjectHandle) -> ProxyResult<bool> {
        let (target, realm) = {
            let proxy = rt.heap().proxy(wrapper)?;
            (proxy.target, proxy.realm)
        };
        let Some(target) = target else {
            return Ok(false);
        };
        let holder = rt.realms_mut().get_mut(realm)?;
        if holder.wrapper_for(target) == Some(wrapper) {
            holder.remove_wrapper(target);
        }
        rt.heap_mut().proxy_mut(wrapper)?.revoke();
        rt.record_event(
            ProxyEvent::new(ProxyEventType::WrapperNuked, ProxyEventOutcome::Pass)
                .with_object(wrapper),
        );
        Ok(true)
    }

    /// Sever every wrapper `holder` keeps for objects of `source`.
    pub fn nuke_realm_wrappers(
        rt: &mut Runtime,
        holder: RealmId,
        source: RealmId,
    ) -> ProxyResult<usize> {
        let candidates: Vec<(ObjectHandle, ObjectHandle)> =
            rt.realms().get(holder)?.wrappers().collect();
        let mut nuked = 0;
        for (target, wrapper) in candidates {
            if rt.realm_of(target)? == source && Self::nuke_wrapper(rt, wrapper)? {
                nuked += 1;
            }
        }
        Ok(nuked)
    }
}
