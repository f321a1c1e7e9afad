//! The handler capability set.
//!
//! A [`ProxyHandler`] implements every fundamental operation for the
//! proxies that use it.  The provided methods forward to the proxy's target
//! unchanged, so a handler only overrides what it intercepts.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::descriptor::{PartialDescriptor, PropertyDescriptor};
use crate::error::ProxyResult;
use crate::object_model::{JsValue, ObjectHandle, PropertyKey};
use crate::runtime::Runtime;

/// Coarse classification used by the unwrap family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerFamily {
    /// Plain forwarding proxy; not unwrappable.
    Direct,
    /// Script-supplied handler object with traps.
    Scripted,
    /// Engine-level wrapper; unwrappable.
    Wrapper,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WrapperFlags(pub u32);

impl WrapperFlags {
    pub const NONE: WrapperFlags = WrapperFlags(0);
    pub const CROSS_REALM: WrapperFlags = WrapperFlags(1);

    pub fn contains(self, other: WrapperFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WrapperFlags {
    type Output = WrapperFlags;

    fn bitor(self, rhs: WrapperFlags) -> WrapperFlags {
        WrapperFlags(self.0 | rhs.0)
    }
}

pub trait ProxyHandler: fmt::Debug + Send + Sync {
    fn family(&self) -> HandlerFamily;

    fn flags(&self) -> WrapperFlags {
        WrapperFlags::NONE
    }

    /// Whether this handler consults an access policy.
    fn has_security_policy(&self) -> bool {
        false
    }

    /// Whether checked unwrapping may pass through this handler.
    fn allow_unwrap(&self) -> bool {
        true
    }

    fn get_own_property_descriptor(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
    ) -> ProxyResult<Option<PropertyDescriptor>> {
        let target = rt.proxy_target(proxy)?;
        rt.get_own_property_descriptor(target, key)
    }

    fn define_property(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        desc: &PartialDescriptor,
    ) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.define_property(target, key, desc)
    }

    fn own_keys(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        let target = rt.proxy_target(proxy)?;
        rt.own_keys(target)
    }

    fn enumerate(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        let target = rt.proxy_target(proxy)?;
        rt.enumerate(target)
    }

    fn delete(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.delete(target, key)
    }

    fn has(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.has_property(target, key)
    }

    fn get(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> ProxyResult<JsValue> {
        let target = rt.proxy_target(proxy)?;
        rt.get_with_receiver(target, key, receiver)
    }

    fn set(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.set_with_receiver(target, key, value, receiver)
    }

    fn is_extensible(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.is_extensible(target)
    }

    fn prevent_extensions(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.prevent_extensions(target)
    }

    fn get_prototype_of(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
    ) -> ProxyResult<Option<ObjectHandle>> {
        let target = rt.proxy_target(proxy)?;
        rt.get_prototype_of(target)
    }

    fn set_prototype_of(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.set_prototype_of(target, proto)
    }

    fn call(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        this: &JsValue,
        args: &[JsValue],
    ) -> ProxyResult<JsValue> {
        let target = rt.proxy_target(proxy)?;
        rt.call(target, this, args)
    }

    fn construct(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        args: &[JsValue],
    ) -> ProxyResult<ObjectHandle> {
        let target = rt.proxy_target(proxy)?;
        rt.construct(target, args)
    }

    fn watch(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        callback: ObjectHandle,
    ) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.watch(target, key, callback)
    }

    fn unwatch(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        let target = rt.proxy_target(proxy)?;
        rt.unwatch(target, key)
    }
}

/// Forwards everything to the target.  Not a wrapper: unwrapping stops here.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectHandler;

impl ProxyHandler for DirectHandler {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let both = WrapperFlags::NONE | WrapperFlags::CROSS_REALM;
        assert!(both.contains(WrapperFlags::CROSS_REALM));
        assert!(!WrapperFlags::NONE.contains(WrapperFlags::CROSS_REALM));
        assert!(WrapperFlags::CROSS_REALM.contains(WrapperFlags::NONE));
    }

    #[test]
    fn direct_handler_defaults() {
        let h = DirectHandler;
        assert_eq!(h.family(), HandlerFamily::Direct);
        assert_eq!(h.flags(), WrapperFlags::NONE);
        assert!(!h.has_security_policy());
        assert!(h.allow_unwrap());
    }
}
