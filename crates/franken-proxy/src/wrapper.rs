//! Engine-level wrappers and the unwrap family.
//!
//! [`Wrapper`] forwards everything unchanged.  [`CrossRealmWrapper`] enters
//! the target's realm for each operation and marshals values across the
//! boundary in both directions.  [`SecurityWrapper`] composes over any base
//! handler and consults an [`AccessPolicy`] before every operation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::{PartialDescriptor, PropertyDescriptor};
use crate::error::{CallbackFailure, ProxyError, ProxyResult};
use crate::handler::{HandlerFamily, ProxyHandler, WrapperFlags};
use crate::object_model::{JsValue, ObjectHandle, PropertyKey};
use crate::operation::Operation;
use crate::realm::RealmId;
use crate::runtime::Runtime;

// ---------------------------------------------------------------------------
// Wrapper
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wrapper {
    flags: WrapperFlags,
}

impl Wrapper {
    pub const fn new(flags: WrapperFlags) -> Self {
        Self { flags }
    }

    /// Unwrap exactly one layer.
    pub fn wrapped_object(rt: &Runtime, wrapper: ObjectHandle) -> ProxyResult<ObjectHandle> {
        rt.proxy_target(wrapper)
    }
}

impl ProxyHandler for Wrapper {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::Wrapper
    }

    fn flags(&self) -> WrapperFlags {
        self.flags
    }

    fn get(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> ProxyResult<JsValue> {
        let target = rt.proxy_target(proxy)?;
        let receiver = see_through(proxy, target, receiver);
        rt.get_with_receiver(target, key, &receiver)
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
        let receiver = see_through(proxy, target, receiver);
        rt.set_with_receiver(target, key, value, &receiver)
    }
}

/// A receiver naming the wrapper itself is replaced by the target, so
/// accessors and the final define act on the wrapped object.
fn see_through(wrapper: ObjectHandle, target: ObjectHandle, receiver: &JsValue) -> JsValue {
    match receiver {
        JsValue::Object(obj) if *obj == wrapper => JsValue::Object(target),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// CrossRealmWrapper
// ---------------------------------------------------------------------------

/// Forwards each operation inside the target's realm.
///
/// Arguments are wrapped into the target realm on the way in; results and
/// thrown values are wrapped into the caller's realm on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossRealmWrapper {
    inner: Wrapper,
}

impl Default for CrossRealmWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossRealmWrapper {
    pub const fn new() -> Self {
        Self {
            inner: Wrapper::new(WrapperFlags::CROSS_REALM),
        }
    }

    /// Run `op` on the target inside its realm, then marshal the outcome
    /// back with `back`.
    fn forward<T>(
        rt: &mut Runtime,
        proxy: ObjectHandle,
        op: impl FnOnce(&mut Runtime, ObjectHandle, RealmId) -> ProxyResult<T>,
        back: impl FnOnce(&mut Runtime, T, RealmId) -> ProxyResult<T>,
    ) -> ProxyResult<T> {
        let target = rt.proxy_target(proxy)?;
        let caller = rt.current_realm();
        let target_realm = rt.realm_of(target)?;
        let outcome = rt.with_realm(target_realm, |rt| op(rt, target, target_realm))?;
        match outcome {
            Ok(value) => back(rt, value, caller),
            Err(ProxyError::CallbackFailure(CallbackFailure::Thrown(thrown))) => {
                let thrown = rt.wrap_value(&thrown, caller)?;
                Err(ProxyError::thrown(thrown))
            }
            Err(err) => Err(err),
        }
    }

    fn unchanged<T>(_: &mut Runtime, value: T, _: RealmId) -> ProxyResult<T> {
        Ok(value)
    }

    fn wrap_back(rt: &mut Runtime, value: JsValue, caller: RealmId) -> ProxyResult<JsValue> {
        rt.wrap_value(&value, caller)
    }
}

impl ProxyHandler for CrossRealmWrapper {
    fn family(&self) -> HandlerFamily {
        self.inner.family()
    }

    fn flags(&self) -> WrapperFlags {
        self.inner.flags()
    }

    fn get_own_property_descriptor(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
    ) -> ProxyResult<Option<PropertyDescriptor>> {
        Self::forward(
            rt,
            proxy,
            |rt, target, _| rt.get_own_property_descriptor(target, key),
            |rt, desc, caller| desc.map(|d| rt.wrap_descriptor(&d, caller)).transpose(),
        )
    }

    fn define_property(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        desc: &PartialDescriptor,
    ) -> ProxyResult<bool> {
        Self::forward(
            rt,
            proxy,
            |rt, target, realm| {
                let desc = rt.wrap_partial_descriptor(desc, realm)?;
                rt.define_property(target, key, &desc)
            },
            Self::unchanged,
        )
    }

    fn own_keys(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        Self::forward(rt, proxy, |rt, target, _| rt.own_keys(target), Self::unchanged)
    }

    fn enumerate(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        Self::forward(rt, proxy, |rt, target, _| rt.enumerate(target), Self::unchanged)
    }

    fn delete(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        Self::forward(rt, proxy, |rt, target, _| rt.delete(target, key), Self::unchanged)
    }

    fn has(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        Self::forward(
            rt,
            proxy,
            |rt, target, _| rt.has_property(target, key),
            Self::unchanged,
        )
    }

    fn get(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> ProxyResult<JsValue> {
        Self::forward(
            rt,
            proxy,
            |rt, target, realm| {
                let receiver = rt.wrap_value(receiver, realm)?;
                rt.get_with_receiver(target, key, &receiver)
            },
            Self::wrap_back,
        )
    }

    fn set(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> ProxyResult<bool> {
        Self::forward(
            rt,
            proxy,
            |rt, target, realm| {
                let value = rt.wrap_value(&value, realm)?;
                let receiver = rt.wrap_value(receiver, realm)?;
                rt.set_with_receiver(target, key, value, &receiver)
            },
            Self::unchanged,
        )
    }

    fn is_extensible(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        Self::forward(rt, proxy, |rt, target, _| rt.is_extensible(target), Self::unchanged)
    }

    fn prevent_extensions(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        Self::forward(
            rt,
            proxy,
            |rt, target, _| rt.prevent_extensions(target),
            Self::unchanged,
        )
    }

    fn get_prototype_of(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
    ) -> ProxyResult<Option<ObjectHandle>> {
        Self::forward(
            rt,
            proxy,
            |rt, target, _| rt.get_prototype_of(target),
            |rt, proto, caller| proto.map(|p| rt.wrap_object(p, caller)).transpose(),
        )
    }

    fn set_prototype_of(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> ProxyResult<bool> {
        Self::forward(
            rt,
            proxy,
            |rt, target, realm| {
                let proto = proto.map(|p| rt.wrap_object(p, realm)).transpose()?;
                rt.set_prototype_of(target, proto)
            },
            Self::unchanged,
        )
    }

    fn call(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        this: &JsValue,
        args: &[JsValue],
    ) -> ProxyResult<JsValue> {
        Self::forward(
            rt,
            proxy,
            |rt, target, realm| {
                let this = rt.wrap_value(this, realm)?;
                let args = args
                    .iter()
                    .map(|a| rt.wrap_value(a, realm))
                    .collect::<ProxyResult<Vec<_>>>()?;
                rt.call(target, &this, &args)
            },
            Self::wrap_back,
        )
    }

    fn construct(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        args: &[JsValue],
    ) -> ProxyResult<ObjectHandle> {
        Self::forward(
            rt,
            proxy,
            |rt, target, realm| {
                let args = args
                    .iter()
                    .map(|a| rt.wrap_value(a, realm))
                    .collect::<ProxyResult<Vec<_>>>()?;
                rt.construct(target, &args)
            },
            |rt, obj, caller| rt.wrap_object(obj, caller),
        )
    }

    fn watch(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        callback: ObjectHandle,
    ) -> ProxyResult<bool> {
        Self::forward(
            rt,
            proxy,
            |rt, target, realm| {
                let callback = rt.wrap_object(callback, realm)?;
                rt.watch(target, key, callback)
            },
            Self::unchanged,
        )
    }

    fn unwatch(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        Self::forward(rt, proxy, |rt, target, _| rt.unwatch(target, key), Self::unchanged)
    }
}

// ---------------------------------------------------------------------------
// AccessPolicy
// ---------------------------------------------------------------------------

/// Decides which operations a security wrapper lets through.
pub trait AccessPolicy: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Restricted operations are denied unless a policy overrides this.
    fn enter(&self, operation: Operation, _key: Option<&PropertyKey>) -> bool {
        !operation.is_restricted()
    }

    /// Whether checked unwrapping may see through the wrapper.
    fn allow_unwrap(&self) -> bool {
        false
    }
}

/// Reads pass, restricted operations and unwrapping are denied.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyMutations;

impl AccessPolicy for DenyMutations {
    fn name(&self) -> &str {
        "deny-mutations"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl AccessPolicy for DenyAll {
    fn name(&self) -> &str {
        "deny-all"
    }

    fn enter(&self, _operation: Operation, _key: Option<&PropertyKey>) -> bool {
        false
    }
}

/// Permits exactly the listed operations, optionally only on listed keys.
///
/// Keyless operations (ownKeys, call, ...) are judged by operation alone.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    pub operations: BTreeSet<Operation>,
    pub keys: Option<BTreeSet<PropertyKey>>,
    pub unwrap: bool,
}

impl AllowList {
    pub fn operations(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations.into_iter().collect(),
            keys: None,
            unwrap: false,
        }
    }

    pub fn with_keys(mut self, keys: impl IntoIterator<Item = PropertyKey>) -> Self {
        self.keys = Some(keys.into_iter().collect());
        self
    }

    pub fn with_unwrap(mut self, unwrap: bool) -> Self {
        self.unwrap = unwrap;
        self
    }
}

impl AccessPolicy for AllowList {
    fn name(&self) -> &str {
        "allow-list"
    }

    fn enter(&self, operation: Operation, key: Option<&PropertyKey>) -> bool {
        if !self.operations.contains(&operation) {
            return false;
        }
        match (key, &self.keys) {
            (Some(key), Some(keys)) => keys.contains(key),
            _ => true,
        }
    }

    fn allow_unwrap(&self) -> bool {
        self.unwrap
    }
}

// ---------------------------------------------------------------------------
// SecurityWrapper
// ---------------------------------------------------------------------------

/// Policy check in front of a base handler.
#[derive(Debug, Clone)]
pub struct SecurityWrapper<B> {
    base: B,
    policy: Arc<dyn AccessPolicy>,
}

impl<B: ProxyHandler> SecurityWrapper<B> {
    pub fn new(base: B, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { base, policy }
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn policy(&self) -> &dyn AccessPolicy {
        self.policy.as_ref()
    }

    fn enter(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        operation: Operation,
        key: Option<&PropertyKey>,
    ) -> ProxyResult<()> {
        if self.policy.enter(operation, key) {
            return Ok(());
        }
        let err = ProxyError::PermissionDenied {
            operation,
            key: key.cloned(),
        };
        rt.record_denial(proxy, operation, key, &err, self.policy.name());
        Err(err)
    }
}

impl<B: ProxyHandler> ProxyHandler for SecurityWrapper<B> {
    fn family(&self) -> HandlerFamily {
        self.base.family()
    }

    fn flags(&self) -> WrapperFlags {
        self.base.flags()
    }

    fn has_security_policy(&self) -> bool {
        true
    }

    fn allow_unwrap(&self) -> bool {
        self.policy.allow_unwrap()
    }

    fn get_own_property_descriptor(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
    ) -> ProxyResult<Option<PropertyDescriptor>> {
        self.enter(rt, proxy, Operation::GetOwnPropertyDescriptor, Some(key))?;
        self.base.get_own_property_descriptor(rt, proxy, key)
    }

    fn define_property(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        desc: &PartialDescriptor,
    ) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::DefineProperty, Some(key))?;
        self.base.define_property(rt, proxy, key, desc)
    }

    fn own_keys(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        self.enter(rt, proxy, Operation::OwnKeys, None)?;
        self.base.own_keys(rt, proxy)
    }

    fn enumerate(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        self.enter(rt, proxy, Operation::Enumerate, None)?;
        self.base.enumerate(rt, proxy)
    }

    fn delete(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::DeleteProperty, Some(key))?;
        self.base.delete(rt, proxy, key)
    }

    fn has(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::Has, Some(key))?;
        self.base.has(rt, proxy, key)
    }

    fn get(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> ProxyResult<JsValue> {
        self.enter(rt, proxy, Operation::Get, Some(key))?;
        self.base.get(rt, proxy, key, receiver)
    }

    fn set(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::Set, Some(key))?;
        self.base.set(rt, proxy, key, value, receiver)
    }

    fn is_extensible(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::IsExtensible, None)?;
        self.base.is_extensible(rt, proxy)
    }

    fn prevent_extensions(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::PreventExtensions, None)?;
        self.base.prevent_extensions(rt, proxy)
    }

    fn get_prototype_of(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
    ) -> ProxyResult<Option<ObjectHandle>> {
        self.enter(rt, proxy, Operation::GetPrototypeOf, None)?;
        self.base.get_prototype_of(rt, proxy)
    }

    fn set_prototype_of(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::SetPrototypeOf, None)?;
        self.base.set_prototype_of(rt, proxy, proto)
    }

    fn call(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        this: &JsValue,
        args: &[JsValue],
    ) -> ProxyResult<JsValue> {
        self.enter(rt, proxy, Operation::Call, None)?;
        self.base.call(rt, proxy, this, args)
    }

    fn construct(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        args: &[JsValue],
    ) -> ProxyResult<ObjectHandle> {
        self.enter(rt, proxy, Operation::Construct, None)?;
        self.base.construct(rt, proxy, args)
    }

    fn watch(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        callback: ObjectHandle,
    ) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::Watch, Some(key))?;
        self.base.watch(rt, proxy, key, callback)
    }

    fn unwatch(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        self.enter(rt, proxy, Operation::Unwatch, Some(key))?;
        self.base.unwatch(rt, proxy, key)
    }
}

// ---------------------------------------------------------------------------
// Unwrapping
// ---------------------------------------------------------------------------

/// One wrapper layer, if `obj` is an unwrappable wrapper.
///
/// Returns the wrapper's target and handler; `None` for ordinary objects,
/// non-wrapper proxies, severed wrappers, and (when asked) boundary
/// objects.
fn wrapper_layer(
    rt: &Runtime,
    obj: ObjectHandle,
    stop_at_boundary: bool,
) -> ProxyResult<Option<(ObjectHandle, &dyn ProxyHandler)>> {
    let Some(proxy) = rt.heap().get(obj)?.as_proxy() else {
        return Ok(None);
    };
    if stop_at_boundary && proxy.unwrap_boundary {
        return Ok(None);
    }
    let handler = rt.policies().handler(proxy.policy)?;
    if handler.family() != HandlerFamily::Wrapper {
        return Ok(None);
    }
    Ok(proxy.target.map(|target| (target, handler)))
}

/// Strip every wrapper layer without consulting security policies.
///
/// Returns the innermost object and the union of the flags of every layer
/// removed.
pub fn unchecked_unwrap(
    rt: &Runtime,
    obj: ObjectHandle,
    stop_at_boundary: bool,
) -> ProxyResult<(ObjectHandle, WrapperFlags)> {
    let mut current = obj;
    let mut flags = WrapperFlags::NONE;
    while let Some((target, handler)) = wrapper_layer(rt, current, stop_at_boundary)? {
        flags = flags | handler.flags();
        current = target;
    }
    Ok((current, flags))
}

/// Strip wrapper layers, failing at the first security layer that vetoes.
pub fn checked_unwrap(
    rt: &Runtime,
    obj: ObjectHandle,
    stop_at_boundary: bool,
) -> ProxyResult<ObjectHandle> {
    let mut current = obj;
    while let Some((target, handler)) = wrapper_layer(rt, current, stop_at_boundary)? {
        if handler.has_security_policy() && !handler.allow_unwrap() {
            return Err(ProxyError::UnwrapDenied { wrapper: current });
        }
        current = target;
    }
    Ok(current)
}

/// Strip at most one layer, subject to that layer's security veto.
pub fn unwrap_one_checked(rt: &Runtime, obj: ObjectHandle) -> ProxyResult<ObjectHandle> {
    match wrapper_layer(rt, obj, true)? {
        Some((_, handler)) if handler.has_security_policy() && !handler.allow_unwrap() => {
            Err(ProxyError::UnwrapDenied { wrapper: obj })
        }
        Some((target, _)) => Ok(target),
        None => Ok(obj),
    }
}
