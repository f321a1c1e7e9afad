//! The runtime: object storage, native functions, realms, and the
//! operation surface every caller goes through.
//!
//! Each fundamental operation either acts on an ordinary object directly
//! or dispatches to the proxy's handler.  Dispatch and native invocation
//! both pass through the recursion guard, which also observes interrupt
//! requests.
//!
//! The runtime is single-threaded; native functions are `Rc` closures.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::{PartialDescriptor, PropertyDescriptor};
use crate::error::{CallbackFailure, ProxyError, ProxyResult};
use crate::events::{ProxyEvent, ProxyEventLog, ProxyEventOutcome, ProxyEventType};
use crate::handler::{HandlerFamily, ProxyHandler, WrapperFlags};
use crate::object_model::{
    JsValue, ManagedObject, NativeId, ObjectHandle, ObjectHeap, OrdinaryObject, PropertyKey,
    ProxyObject, SymbolId,
};
use crate::operation::Operation;
use crate::realm::{RealmId, RealmOptions, RealmRegistry};
use crate::registry::{PolicyHandle, PolicyRegistry};
use crate::revocation::{RevocableProxy, RevocationController};
use crate::wrapper::unchecked_unwrap;

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 64;
pub const MAX_RECURSION_DEPTH: u32 = 256;
pub const DEFAULT_MAX_STACK_BYTES: usize = 1024 * 1024;
pub const MIN_STACK_BYTES: usize = 64 * 1024;
pub const MAX_STACK_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_PROTOTYPE_CHAIN_DEPTH: u32 = 1024;
pub const MAX_PROTOTYPE_CHAIN_DEPTH: u32 = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Nested trap and native-call entries allowed before
    /// `TooMuchRecursion`.  Clamped to [1, MAX_RECURSION_DEPTH].
    pub max_recursion_depth: u32,
    /// Native stack a guarded entry may sit below the outermost one.
    /// Clamped to [MIN_STACK_BYTES, MAX_STACK_BYTES].
    pub max_stack_bytes: usize,
    /// Clamped to [1, MAX_PROTOTYPE_CHAIN_DEPTH].
    pub max_prototype_chain_depth: u32,
    pub record_events: bool,
    pub trace_id: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_stack_bytes: DEFAULT_MAX_STACK_BYTES,
            max_prototype_chain_depth: DEFAULT_MAX_PROTOTYPE_CHAIN_DEPTH,
            record_events: true,
            trace_id: "proxy-runtime".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn clamped(mut self) -> Self {
        self.max_recursion_depth = self.max_recursion_depth.clamp(1, MAX_RECURSION_DEPTH);
        self.max_stack_bytes = self.max_stack_bytes.clamp(MIN_STACK_BYTES, MAX_STACK_BYTES);
        self.max_prototype_chain_depth = self
            .max_prototype_chain_depth
            .clamp(1, MAX_PROTOTYPE_CHAIN_DEPTH);
        self
    }
}

// ---------------------------------------------------------------------------
// Native functions
// ---------------------------------------------------------------------------

type NativeBody = Rc<dyn Fn(&mut Runtime, &JsValue, &[JsValue]) -> ProxyResult<JsValue>>;

#[derive(Clone)]
struct NativeFunction {
    name: String,
    body: NativeBody,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Address of a local in a fresh frame; differences between two calls
/// measure native stack use in between.
#[inline(never)]
fn stack_position() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

/// Result of one own-property lookup step along a prototype chain.
enum Lookup {
    Found(PropertyDescriptor),
    Next(Option<ObjectHandle>),
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    heap: ObjectHeap,
    natives: Vec<NativeFunction>,
    realms: RealmRegistry,
    policies: Arc<PolicyRegistry>,
    depth: u32,
    stack_base: usize,
    interrupt_requested: bool,
    events: ProxyEventLog,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(config, PolicyRegistry::shared_standard())
    }

    pub fn with_registry(config: RuntimeConfig, policies: Arc<PolicyRegistry>) -> Self {
        let config = config.clamped();
        let events = ProxyEventLog::new(&config.trace_id);
        Self {
            config,
            heap: ObjectHeap::new(),
            natives: Vec::new(),
            realms: RealmRegistry::new(),
            policies,
            depth: 0,
            stack_base: 0,
            interrupt_requested: false,
            events,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut self.heap
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn realms(&self) -> &RealmRegistry {
        &self.realms
    }

    pub(crate) fn realms_mut(&mut self) -> &mut RealmRegistry {
        &mut self.realms
    }

    /// Current nesting of guarded entries.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Abort the next trap or native entry with `CallbackFailure::Interrupted`.
    pub fn request_interrupt(&mut self) {
        self.interrupt_requested = true;
    }

    // -- events -------------------------------------------------------------

    pub fn event_log(&self) -> &ProxyEventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ProxyEvent> {
        self.events.drain()
    }

    pub fn events_jsonl(&self) -> Result<String, serde_json::Error> {
        self.events.to_jsonl()
    }

    pub fn event_log_digest(&self) -> Result<String, serde_json::Error> {
        self.events.digest()
    }

    pub(crate) fn record_event(&mut self, event: ProxyEvent) {
        if self.config.record_events {
            self.events.record(event);
        }
    }

    pub(crate) fn record_violation(&mut self, proxy: ObjectHandle, err: &ProxyError) {
        let mut event = ProxyEvent::new(ProxyEventType::InvariantViolation, ProxyEventOutcome::Failed)
            .with_error_code(err.error_code())
            .with_object(proxy);
        if let ProxyError::InvariantViolation {
            operation,
            key,
            violation,
        } = err
        {
            event = event
                .with_operation(*operation)
                .with_key(key.as_ref())
                .with_detail(violation.name());
        }
        self.record_event(event);
    }

    pub(crate) fn record_denial(
        &mut self,
        proxy: ObjectHandle,
        operation: Operation,
        key: Option<&PropertyKey>,
        err: &ProxyError,
        policy: &str,
    ) {
        self.record_event(
            ProxyEvent::new(ProxyEventType::PermissionDenied, ProxyEventOutcome::Denied)
                .with_error_code(err.error_code())
                .with_operation(operation)
                .with_key(key)
                .with_object(proxy)
                .with_detail(policy),
        );
    }

    // -- guard and dispatch -------------------------------------------------

    /// Run `f` as one nested entry, subject to the interrupt flag, the
    /// depth limit, and the stack budget.  The depth counter is restored
    /// whatever `f` returns.
    fn guarded<T>(
        &mut self,
        operation: Operation,
        f: impl FnOnce(&mut Runtime) -> ProxyResult<T>,
    ) -> ProxyResult<T> {
        if std::mem::take(&mut self.interrupt_requested) {
            let err = ProxyError::from(CallbackFailure::Interrupted);
            self.record_event(
                ProxyEvent::new(ProxyEventType::Interrupted, ProxyEventOutcome::Failed)
                    .with_operation(operation)
                    .with_error_code(err.error_code()),
            );
            return Err(err);
        }
        let here = stack_position();
        if self.depth == 0 {
            self.stack_base = here;
        }
        let max = self.config.max_recursion_depth;
        let stack_exhausted = self.stack_base.abs_diff(here) > self.config.max_stack_bytes;
        if self.depth >= max || stack_exhausted {
            let err = ProxyError::TooMuchRecursion {
                depth: self.depth + 1,
                max,
            };
            self.record_event(
                ProxyEvent::new(ProxyEventType::RecursionLimit, ProxyEventOutcome::Failed)
                    .with_operation(operation)
                    .with_error_code(err.error_code())
                    .with_detail(if stack_exhausted { "stack" } else { "depth" }),
            );
            return Err(err);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Route `operation` on `proxy` to its handler.
    fn dispatch<T>(
        &mut self,
        proxy: ObjectHandle,
        operation: Operation,
        key: Option<&PropertyKey>,
        f: impl FnOnce(&dyn ProxyHandler, &mut Runtime) -> ProxyResult<T>,
    ) -> ProxyResult<T> {
        let (policy, revoked) = {
            let p = self.heap.proxy(proxy)?;
            (p.policy, p.is_revoked())
        };
        if revoked {
            let err = ProxyError::RevokedProxy { proxy };
            self.record_event(
                ProxyEvent::new(ProxyEventType::RevokedAccess, ProxyEventOutcome::Denied)
                    .with_error_code(err.error_code())
                    .with_operation(operation)
                    .with_key(key)
                    .with_object(proxy),
            );
            return Err(err);
        }
        let registry = Arc::clone(&self.policies);
        let handler = registry.handler(policy)?;
        self.guarded(operation, |rt| f(handler, rt))
    }

    fn is_proxy_handle(&self, obj: ObjectHandle) -> ProxyResult<bool> {
        Ok(matches!(self.heap.get(obj)?, ManagedObject::Proxy(_)))
    }

    fn ordinary(&self, obj: ObjectHandle) -> ProxyResult<&OrdinaryObject> {
        self.heap
            .get(obj)?
            .as_ordinary()
            .ok_or_else(|| ProxyError::TypeError(format!("{obj} is not an ordinary object")))
    }

    fn ordinary_mut(&mut self, obj: ObjectHandle) -> ProxyResult<&mut OrdinaryObject> {
        match self.heap.get_mut(obj)? {
            ManagedObject::Ordinary(o) => Ok(o),
            ManagedObject::Proxy(_) => Err(ProxyError::TypeError(format!(
                "{obj} is not an ordinary object"
            ))),
        }
    }

    fn lookup_own(&self, obj: ObjectHandle, key: &PropertyKey) -> ProxyResult<Lookup> {
        let o = self.ordinary(obj)?;
        Ok(match o.get_own_property(key) {
            Some(desc) => Lookup::Found(desc.clone()),
            None => Lookup::Next(o.prototype),
        })
    }

    fn check_chain_depth(&self, depth: u32) -> ProxyResult<()> {
        let max = self.config.max_prototype_chain_depth;
        if depth > max {
            return Err(ProxyError::PrototypeChainTooDeep { depth, max });
        }
        Ok(())
    }

    // -- allocation ---------------------------------------------------------

    /// New ordinary object in the current realm with a null prototype.
    pub fn create_object(&mut self) -> ObjectHandle {
        self.create_object_with_proto(None)
    }

    pub fn create_object_with_proto(&mut self, proto: Option<ObjectHandle>) -> ObjectHandle {
        let realm = self.realms.current();
        self.heap.alloc(OrdinaryObject::new(realm, proto))
    }

    /// New callable object backed by `body`.
    pub fn create_function(
        &mut self,
        name: &str,
        body: impl Fn(&mut Runtime, &JsValue, &[JsValue]) -> ProxyResult<JsValue> + 'static,
    ) -> ObjectHandle {
        let id = NativeId(self.natives.len() as u32);
        self.natives.push(NativeFunction {
            name: name.to_string(),
            body: Rc::new(body),
        });
        let mut object = OrdinaryObject::new(self.realms.current(), None);
        object.native = Some(id);
        self.heap.alloc(object)
    }

    /// Like [`Runtime::create_function`], and also usable with `construct`.
    pub fn create_constructor(
        &mut self,
        name: &str,
        body: impl Fn(&mut Runtime, &JsValue, &[JsValue]) -> ProxyResult<JsValue> + 'static,
    ) -> ObjectHandle {
        let f = self.create_function(name, body);
        if let Ok(o) = self.ordinary_mut(f) {
            o.constructable = true;
        }
        f
    }

    pub fn native_name(&self, obj: ObjectHandle) -> Option<&str> {
        let id = self.heap.get(obj).ok()?.as_ordinary()?.native?;
        self.natives.get(id.0 as usize).map(|n| n.name.as_str())
    }

    pub fn create_symbol(&mut self) -> SymbolId {
        self.heap.alloc_symbol()
    }

    /// Array-like object with indexed elements and a `length`.
    pub fn create_array_from_list(&mut self, elements: &[JsValue]) -> ProxyResult<ObjectHandle> {
        let array = self.create_object();
        let o = self.ordinary_mut(array)?;
        for (index, element) in elements.iter().enumerate() {
            o.properties.insert(
                PropertyKey::String(index.to_string()),
                PropertyDescriptor::data(element.clone()),
            );
        }
        o.properties.insert(
            PropertyKey::from("length"),
            PropertyDescriptor::Data {
                value: JsValue::Int(elements.len() as i64),
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
        Ok(array)
    }

    /// The `length` of an array-like object, in [0, 2^32 - 1].
    pub fn array_like_length(&mut self, obj: ObjectHandle) -> ProxyResult<u32> {
        match self.get(obj, &PropertyKey::from("length"))? {
            JsValue::Undefined => Ok(0),
            JsValue::Int(n) => u32::try_from(n)
                .map_err(|_| ProxyError::TypeError(format!("invalid array-like length {n}"))),
            other => Err(ProxyError::TypeError(format!(
                "invalid array-like length {other}"
            ))),
        }
    }

    /// Element `index` of an array-like object.
    pub fn array_like_element(&mut self, obj: ObjectHandle, index: u32) -> ProxyResult<JsValue> {
        self.get(obj, &PropertyKey::String(index.to_string()))
    }

    /// Read `length` and then each index of an array-like object.
    ///
    /// Callers that validate elements should walk `array_like_element`
    /// themselves so a bad element stops the walk.
    pub fn create_list_from_array_like(&mut self, obj: ObjectHandle) -> ProxyResult<Vec<JsValue>> {
        let length = self.array_like_length(obj)?;
        let mut elements = Vec::new();
        for index in 0..length {
            elements.push(self.array_like_element(obj, index)?);
        }
        Ok(elements)
    }

    /// CreateDataProperty: define a plain writable, enumerable,
    /// configurable data property.
    pub fn create_data_property(
        &mut self,
        obj: ObjectHandle,
        key: PropertyKey,
        value: JsValue,
    ) -> ProxyResult<bool> {
        let desc = PartialDescriptor::from(PropertyDescriptor::data(value));
        self.define_property(obj, &key, &desc)
    }

    // -- realms -------------------------------------------------------------

    pub fn create_realm(&mut self, options: RealmOptions) -> RealmId {
        self.realms.create(options)
    }

    pub fn current_realm(&self) -> RealmId {
        self.realms.current()
    }

    /// Run `f` with `realm` current, restoring the previous realm after.
    pub fn with_realm<R>(
        &mut self,
        realm: RealmId,
        f: impl FnOnce(&mut Runtime) -> R,
    ) -> ProxyResult<R> {
        let previous = self.realms.enter(realm)?;
        let result = f(self);
        self.realms.enter(previous)?;
        Ok(result)
    }

    pub fn realm_of(&self, obj: ObjectHandle) -> ProxyResult<RealmId> {
        Ok(self.heap.get(obj)?.realm())
    }

    /// Make `value` usable from `dest`.  Primitives pass through.
    pub fn wrap_value(&mut self, value: &JsValue, dest: RealmId) -> ProxyResult<JsValue> {
        match value {
            JsValue::Object(obj) => Ok(JsValue::Object(self.wrap_object(*obj, dest)?)),
            other => Ok(other.clone()),
        }
    }

    /// The object `dest` code should see for `obj`.
    ///
    /// Objects already in `dest` pass through.  Wrappers are stripped first,
    /// so an object coming home is returned unwrapped.  Otherwise `dest`
    /// reuses its wrapper for the object or creates one with its wrapper
    /// policy.
    pub fn wrap_object(&mut self, obj: ObjectHandle, dest: RealmId) -> ProxyResult<ObjectHandle> {
        let realm = self.realms.get(dest)?;
        let policy = realm.wrapper_policy;
        if self.realm_of(obj)? == dest {
            return Ok(obj);
        }
        let (unwrapped, _) = unchecked_unwrap(self, obj, true)?;
        if self.realm_of(unwrapped)? == dest {
            return Ok(unwrapped);
        }
        if let Some(existing) = self.realms.get(dest)?.wrapper_for(unwrapped)
            && !self.is_revoked(existing)
        {
            return Ok(existing);
        }
        let wrapper = self.alloc_wrapper(unwrapped, policy, dest)?;
        self.realms.get_mut(dest)?.insert_wrapper(unwrapped, wrapper);
        Ok(wrapper)
    }

    pub fn wrap_descriptor(
        &mut self,
        desc: &PropertyDescriptor,
        dest: RealmId,
    ) -> ProxyResult<PropertyDescriptor> {
        Ok(match desc {
            PropertyDescriptor::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => PropertyDescriptor::Data {
                value: self.wrap_value(value, dest)?,
                writable: *writable,
                enumerable: *enumerable,
                configurable: *configurable,
            },
            PropertyDescriptor::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => PropertyDescriptor::Accessor {
                get: get.map(|g| self.wrap_object(g, dest)).transpose()?,
                set: set.map(|s| self.wrap_object(s, dest)).transpose()?,
                enumerable: *enumerable,
                configurable: *configurable,
            },
        })
    }

    pub fn wrap_partial_descriptor(
        &mut self,
        desc: &PartialDescriptor,
        dest: RealmId,
    ) -> ProxyResult<PartialDescriptor> {
        let mut wrapped = desc.clone();
        if let Some(value) = &desc.value {
            wrapped.value = Some(self.wrap_value(value, dest)?);
        }
        if let Some(Some(get)) = desc.get {
            wrapped.get = Some(Some(self.wrap_object(get, dest)?));
        }
        if let Some(Some(set)) = desc.set {
            wrapped.set = Some(Some(self.wrap_object(set, dest)?));
        }
        Ok(wrapped)
    }

    // -- proxies and wrappers -----------------------------------------------

    fn reject_revoked(&self, obj: ObjectHandle, role: &str) -> ProxyResult<()> {
        if self.is_revoked(obj) {
            return Err(ProxyError::TypeError(format!(
                "cannot create proxy with a revoked proxy as {role}"
            )));
        }
        Ok(())
    }

    /// New proxy over `target` with the script object `handler`.
    pub fn make_proxy(&mut self, target: ObjectHandle, handler: ObjectHandle) -> ProxyResult<ObjectHandle> {
        self.heap.get(target)?;
        self.heap.get(handler)?;
        self.reject_revoked(target, "target")?;
        self.reject_revoked(handler, "handler")?;
        let mut proxy = ProxyObject::new(
            target,
            Some(handler),
            PolicyHandle::SCRIPTED,
            self.realms.current(),
        );
        proxy.callable = self.is_callable(target);
        proxy.constructable = self.is_constructor(target);
        Ok(self.heap.alloc_proxy(proxy))
    }

    /// Proxy plus its single-use revoke function.
    pub fn make_revocable_proxy(
        &mut self,
        target: ObjectHandle,
        handler: ObjectHandle,
    ) -> ProxyResult<RevocableProxy> {
        let proxy = self.make_proxy(target, handler)?;
        let revoke = RevocationController::issue_revoker(self, proxy);
        Ok(RevocableProxy { proxy, revoke })
    }

    /// Revoke a proxy or wrapper.  Returns `false` if already revoked.
    pub fn revoke(&mut self, proxy: ObjectHandle) -> ProxyResult<bool> {
        RevocationController::revoke(self, proxy)
    }

    /// Wrap `target` with the handler registered under `policy`, in the
    /// current realm.  Does not touch any realm's wrapper map.
    pub fn new_wrapper(&mut self, target: ObjectHandle, policy: PolicyHandle) -> ProxyResult<ObjectHandle> {
        self.heap.get(target)?;
        let realm = self.realms.current();
        self.alloc_wrapper(target, policy, realm)
    }

    fn alloc_wrapper(
        &mut self,
        target: ObjectHandle,
        policy: PolicyHandle,
        realm: RealmId,
    ) -> ProxyResult<ObjectHandle> {
        self.policies.kind(policy)?;
        let mut proxy = ProxyObject::new(target, None, policy, realm);
        proxy.callable = self.is_callable(target);
        proxy.constructable = self.is_constructor(target);
        let wrapper = self.heap.alloc_proxy(proxy);
        self.record_event(
            ProxyEvent::new(ProxyEventType::WrapperCreated, ProxyEventOutcome::Pass)
                .with_object(wrapper)
                .with_detail(format!("target={target} policy={}", policy.0)),
        );
        Ok(wrapper)
    }

    pub fn is_proxy(&self, obj: ObjectHandle) -> bool {
        matches!(self.heap.get(obj), Ok(ManagedObject::Proxy(_)))
    }

    pub fn is_revoked(&self, obj: ObjectHandle) -> bool {
        matches!(self.heap.get(obj), Ok(ManagedObject::Proxy(p)) if p.is_revoked())
    }

    fn handler_of(&self, obj: ObjectHandle) -> Option<&dyn ProxyHandler> {
        let proxy = self.heap.get(obj).ok()?.as_proxy()?;
        self.policies.handler(proxy.policy).ok()
    }

    pub fn is_wrapper(&self, obj: ObjectHandle) -> bool {
        self.handler_of(obj)
            .is_some_and(|h| h.family() == HandlerFamily::Wrapper)
    }

    pub fn is_cross_realm_wrapper(&self, obj: ObjectHandle) -> bool {
        self.handler_of(obj).is_some_and(|h| {
            h.family() == HandlerFamily::Wrapper && h.flags().contains(WrapperFlags::CROSS_REALM)
        })
    }

    /// `[[ProxyTarget]]`, failing once the proxy is revoked.
    pub fn proxy_target(&self, proxy: ObjectHandle) -> ProxyResult<ObjectHandle> {
        self.heap
            .proxy(proxy)?
            .target
            .ok_or(ProxyError::RevokedProxy { proxy })
    }

    /// `[[ProxyHandler]]` of a scripted proxy.
    pub fn proxy_handler(&self, proxy: ObjectHandle) -> ProxyResult<ObjectHandle> {
        let p = self.heap.proxy(proxy)?;
        if p.is_revoked() {
            return Err(ProxyError::RevokedProxy { proxy });
        }
        p.handler
            .ok_or_else(|| ProxyError::TypeError(format!("{proxy} has no handler object")))
    }

    /// Unchecked unwrapping with `stop_at_boundary` stops at `obj`.
    pub fn mark_unwrap_boundary(&mut self, obj: ObjectHandle) -> ProxyResult<()> {
        self.heap.proxy_mut(obj)?.unwrap_boundary = true;
        Ok(())
    }

    pub fn is_callable(&self, obj: ObjectHandle) -> bool {
        match self.heap.get(obj) {
            Ok(ManagedObject::Ordinary(o)) => o.is_callable(),
            Ok(ManagedObject::Proxy(p)) => p.callable,
            Err(_) => false,
        }
    }

    pub fn is_constructor(&self, obj: ObjectHandle) -> bool {
        match self.heap.get(obj) {
            Ok(ManagedObject::Ordinary(o)) => o.is_callable() && o.constructable,
            Ok(ManagedObject::Proxy(p)) => p.constructable,
            Err(_) => false,
        }
    }

    // -- fundamental operations ---------------------------------------------

    pub fn get_own_property_descriptor(
        &mut self,
        obj: ObjectHandle,
        key: &PropertyKey,
    ) -> ProxyResult<Option<PropertyDescriptor>> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::GetOwnPropertyDescriptor, Some(key), |h, rt| {
                h.get_own_property_descriptor(rt, obj, key)
            });
        }
        Ok(self.ordinary(obj)?.get_own_property(key).cloned())
    }

    pub fn has_own(&mut self, obj: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        Ok(self.get_own_property_descriptor(obj, key)?.is_some())
    }

    pub fn define_property(
        &mut self,
        obj: ObjectHandle,
        key: &PropertyKey,
        desc: &PartialDescriptor,
    ) -> ProxyResult<bool> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::DefineProperty, Some(key), |h, rt| {
                h.define_property(rt, obj, key, desc)
            });
        }
        Ok(self.ordinary_mut(obj)?.define_own_property(key.clone(), desc))
    }

    pub fn delete(&mut self, obj: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::DeleteProperty, Some(key), |h, rt| {
                h.delete(rt, obj, key)
            });
        }
        Ok(self.ordinary_mut(obj)?.delete(key))
    }

    pub fn own_keys(&mut self, obj: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::OwnKeys, None, |h, rt| h.own_keys(rt, obj));
        }
        Ok(self.ordinary(obj)?.own_property_keys())
    }

    /// `[[OwnPropertyKeys]]` under its spelled-out name; same as [`Self::own_keys`].
    pub fn own_property_keys(&mut self, obj: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        self.own_keys(obj)
    }

    /// Keys a for-in loop visits: enumerable string keys along the
    /// prototype chain, each reported once, nearer properties shadowing
    /// farther ones whether or not they are enumerable.
    pub fn enumerate(&mut self, obj: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::Enumerate, None, |h, rt| h.enumerate(rt, obj));
        }
        let mut seen = BTreeSet::new();
        let mut keys = Vec::new();
        let mut current = Some(obj);
        let mut depth = 0;
        while let Some(o) = current {
            if self.is_proxy_handle(o)? {
                for key in self.enumerate(o)? {
                    if seen.insert(key.clone()) {
                        keys.push(key);
                    }
                }
                break;
            }
            let ordinary = self.ordinary(o)?;
            for key in ordinary.own_property_keys() {
                if key.is_symbol() {
                    continue;
                }
                let enumerable = ordinary
                    .get_own_property(&key)
                    .is_some_and(PropertyDescriptor::is_enumerable);
                if seen.insert(key.clone()) && enumerable {
                    keys.push(key);
                }
            }
            current = ordinary.prototype;
            depth += 1;
            self.check_chain_depth(depth)?;
        }
        Ok(keys)
    }

    pub fn has_property(&mut self, obj: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        let mut current = obj;
        let mut depth = 0;
        loop {
            if self.is_proxy_handle(current)? {
                return self.dispatch(current, Operation::Has, Some(key), |h, rt| {
                    h.has(rt, current, key)
                });
            }
            match self.lookup_own(current, key)? {
                Lookup::Found(_) => return Ok(true),
                Lookup::Next(None) => return Ok(false),
                Lookup::Next(Some(proto)) => current = proto,
            }
            depth += 1;
            self.check_chain_depth(depth)?;
        }
    }

    pub fn get(&mut self, obj: ObjectHandle, key: &PropertyKey) -> ProxyResult<JsValue> {
        self.get_with_receiver(obj, key, &JsValue::Object(obj))
    }

    /// `[[Get]](P, Receiver)`: getters run with `receiver` as `this`.
    pub fn get_with_receiver(
        &mut self,
        obj: ObjectHandle,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> ProxyResult<JsValue> {
        let mut current = obj;
        let mut depth = 0;
        loop {
            if self.is_proxy_handle(current)? {
                return self.dispatch(current, Operation::Get, Some(key), |h, rt| {
                    h.get(rt, current, key, receiver)
                });
            }
            match self.lookup_own(current, key)? {
                Lookup::Found(PropertyDescriptor::Data { value, .. }) => return Ok(value),
                Lookup::Found(PropertyDescriptor::Accessor { get, .. }) => {
                    return match get {
                        Some(getter) => self.call(getter, receiver, &[]),
                        None => Ok(JsValue::Undefined),
                    };
                }
                Lookup::Next(None) => return Ok(JsValue::Undefined),
                Lookup::Next(Some(proto)) => current = proto,
            }
            depth += 1;
            self.check_chain_depth(depth)?;
        }
    }

    pub fn set(&mut self, obj: ObjectHandle, key: &PropertyKey, value: JsValue) -> ProxyResult<bool> {
        self.set_with_receiver(obj, key, value, &JsValue::Object(obj))
    }

    /// `[[Set]](P, V, Receiver)`.
    ///
    /// Setters run with `receiver` as `this`.  A data write lands on the
    /// receiver; when the receiver is ordinary and watches `key`, the watch
    /// handler sees `(key, old, new)` and its result is what gets stored.
    pub fn set_with_receiver(
        &mut self,
        obj: ObjectHandle,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> ProxyResult<bool> {
        let mut current = obj;
        let mut depth = 0;
        loop {
            if self.is_proxy_handle(current)? {
                return self.dispatch(current, Operation::Set, Some(key), |h, rt| {
                    h.set(rt, current, key, value, receiver)
                });
            }
            match self.lookup_own(current, key)? {
                Lookup::Found(PropertyDescriptor::Data { writable: false, .. }) => return Ok(false),
                Lookup::Found(PropertyDescriptor::Data { .. }) | Lookup::Next(None) => break,
                Lookup::Found(PropertyDescriptor::Accessor { set, .. }) => {
                    let Some(setter) = set else {
                        return Ok(false);
                    };
                    self.call(setter, receiver, &[value])?;
                    return Ok(true);
                }
                Lookup::Next(Some(proto)) => current = proto,
            }
            depth += 1;
            self.check_chain_depth(depth)?;
        }

        let Some(target) = receiver.as_object() else {
            return Ok(false);
        };
        let existing = self.get_own_property_descriptor(target, key)?;
        let old = match &existing {
            Some(PropertyDescriptor::Accessor { .. }) => return Ok(false),
            Some(PropertyDescriptor::Data { writable: false, .. }) => return Ok(false),
            Some(PropertyDescriptor::Data { value, .. }) => value.clone(),
            None => JsValue::Undefined,
        };
        let watcher = match self.heap.get(target)? {
            ManagedObject::Ordinary(o) => o.watchpoints.get(key).copied(),
            ManagedObject::Proxy(_) => None,
        };
        let value = match watcher {
            Some(handler) => self.call(
                handler,
                &JsValue::Object(target),
                &[key.to_value(), old, value],
            )?,
            None => value,
        };
        match existing {
            Some(_) => self.define_property(target, key, &PartialDescriptor::value(value)),
            None => self.create_data_property(target, key.clone(), value),
        }
    }

    pub fn is_extensible(&mut self, obj: ObjectHandle) -> ProxyResult<bool> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::IsExtensible, None, |h, rt| {
                h.is_extensible(rt, obj)
            });
        }
        Ok(self.ordinary(obj)?.extensible)
    }

    pub fn prevent_extensions(&mut self, obj: ObjectHandle) -> ProxyResult<bool> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::PreventExtensions, None, |h, rt| {
                h.prevent_extensions(rt, obj)
            });
        }
        self.ordinary_mut(obj)?.extensible = false;
        Ok(true)
    }

    pub fn get_prototype_of(&mut self, obj: ObjectHandle) -> ProxyResult<Option<ObjectHandle>> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::GetPrototypeOf, None, |h, rt| {
                h.get_prototype_of(rt, obj)
            });
        }
        Ok(self.ordinary(obj)?.prototype)
    }

    /// `[[SetPrototypeOf]]`.  A proto chain that would loop back to `obj`
    /// fails with `PrototypeCycle`; the walk stops at the first proxy.
    pub fn set_prototype_of(
        &mut self,
        obj: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> ProxyResult<bool> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::SetPrototypeOf, None, |h, rt| {
                h.set_prototype_of(rt, obj, proto)
            });
        }
        let current = self.ordinary(obj)?;
        if current.prototype == proto {
            return Ok(true);
        }
        if !current.extensible {
            return Ok(false);
        }
        let mut walk = proto;
        let mut depth = 0;
        while let Some(p) = walk {
            if p == obj {
                return Err(ProxyError::PrototypeCycle);
            }
            match self.heap.get(p)? {
                ManagedObject::Proxy(_) => break,
                ManagedObject::Ordinary(o) => walk = o.prototype,
            }
            depth += 1;
            self.check_chain_depth(depth)?;
        }
        self.ordinary_mut(obj)?.prototype = proto;
        Ok(true)
    }

    /// The single re-entrant invoke primitive.
    pub fn call(&mut self, callee: ObjectHandle, this: &JsValue, args: &[JsValue]) -> ProxyResult<JsValue> {
        if !self.is_callable(callee) {
            return Err(ProxyError::NotCallable {
                callee: JsValue::Object(callee),
            });
        }
        if self.is_proxy_handle(callee)? {
            return self.dispatch(callee, Operation::Call, None, |h, rt| {
                h.call(rt, callee, this, args)
            });
        }
        let body = self.native_body(callee)?;
        self.guarded(Operation::Call, |rt| body(rt, this, args))
    }

    /// [`Runtime::call`] for a callee that may not be an object.
    pub fn call_value(&mut self, callee: &JsValue, this: &JsValue, args: &[JsValue]) -> ProxyResult<JsValue> {
        match callee {
            JsValue::Object(f) => self.call(*f, this, args),
            other => Err(ProxyError::NotCallable {
                callee: other.clone(),
            }),
        }
    }

    /// `new callee(...args)`.
    ///
    /// For a native constructor, `this` is a fresh object whose prototype
    /// is `callee.prototype` when that is an object; an object returned by
    /// the body replaces it.
    pub fn construct(&mut self, callee: ObjectHandle, args: &[JsValue]) -> ProxyResult<ObjectHandle> {
        if !self.is_constructor(callee) {
            return Err(ProxyError::NotConstructor {
                callee: JsValue::Object(callee),
            });
        }
        if self.is_proxy_handle(callee)? {
            return self.dispatch(callee, Operation::Construct, None, |h, rt| {
                h.construct(rt, callee, args)
            });
        }
        let proto = self.get(callee, &PropertyKey::from("prototype"))?.as_object();
        let this = self.create_object_with_proto(proto);
        let body = self.native_body(callee)?;
        let result = self.guarded(Operation::Construct, |rt| {
            body(rt, &JsValue::Object(this), args)
        })?;
        Ok(result.as_object().unwrap_or(this))
    }

    fn native_body(&self, callee: ObjectHandle) -> ProxyResult<NativeBody> {
        let not_callable = || ProxyError::NotCallable {
            callee: JsValue::Object(callee),
        };
        let id = self.ordinary(callee)?.native.ok_or_else(not_callable)?;
        self.natives
            .get(id.0 as usize)
            .map(|n| Rc::clone(&n.body))
            .ok_or_else(not_callable)
    }

    /// Install `callback` as the watch handler for `key`.
    pub fn watch(
        &mut self,
        obj: ObjectHandle,
        key: &PropertyKey,
        callback: ObjectHandle,
    ) -> ProxyResult<bool> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::Watch, Some(key), |h, rt| {
                h.watch(rt, obj, key, callback)
            });
        }
        if !self.is_callable(callback) {
            return Err(ProxyError::NotCallable {
                callee: JsValue::Object(callback),
            });
        }
        self.ordinary_mut(obj)?
            .watchpoints
            .insert(key.clone(), callback);
        Ok(true)
    }

    pub fn unwatch(&mut self, obj: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        if self.is_proxy_handle(obj)? {
            return self.dispatch(obj, Operation::Unwatch, Some(key), |h, rt| {
                h.unwatch(rt, obj, key)
            });
        }
        self.ordinary_mut(obj)?.watchpoints.remove(key);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
