//! Values, property keys, and the managed object arena.
//!
//! This is the storage side of the proxy core: ordinary objects keep their
//! own properties and internal slots here, proxies keep `[[ProxyTarget]]`
//! and `[[ProxyHandler]]`.  Everything that can call back into script
//! (getters, setters, traps, watchpoints) lives in `runtime`, never here.
//!
//! `BTreeMap` for deterministic ordering.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::{PartialDescriptor, PropertyDescriptor};
use crate::error::{ProxyError, ProxyResult};
use crate::invariant::validate_property_descriptor;
use crate::realm::RealmId;
use crate::registry::PolicyHandle;

/// Serialize/deserialize `BTreeMap<PropertyKey, V>` as a sorted sequence of
/// `[key, value]` pairs.  serde_json requires string keys for JSON maps but
/// `PropertyKey` is an enum.
mod keyed_as_seq {
    use super::{BTreeMap, PropertyKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, V: Serialize>(
        map: &BTreeMap<PropertyKey, V>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(&PropertyKey, &V)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, V: Deserialize<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<PropertyKey, V>, D::Error> {
        let pairs: Vec<(PropertyKey, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// PropertyKey
// ---------------------------------------------------------------------------

/// Largest array index, 2^32 - 2.
pub const MAX_ARRAY_INDEX: u64 = u32::MAX as u64 - 1;

/// Unique symbol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// A property key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    /// String key.
    String(String),
    /// Symbol key.
    Symbol(SymbolId),
}

impl PropertyKey {
    /// The value a trap receives for this key.
    pub fn to_value(&self) -> JsValue {
        match self {
            Self::String(s) => JsValue::Str(s.clone()),
            Self::Symbol(id) => JsValue::Symbol(*id),
        }
    }

    /// Convert a trap-supplied value back into a key.
    ///
    /// Strings and symbols map directly; integers become their decimal
    /// string form.  Anything else is not a key.
    pub fn from_value(value: &JsValue) -> Option<Self> {
        match value {
            JsValue::Str(s) => Some(Self::String(s.clone())),
            JsValue::Symbol(id) => Some(Self::Symbol(*id)),
            JsValue::Int(n) => Some(Self::String(n.to_string())),
            _ => None,
        }
    }

    /// Array index value of this key, if it is a canonical index string.
    /// Canonical array index in [0, 2^32 - 2]: decimal digits only, no
    /// sign and no leading zero.
    pub fn array_index(&self) -> Option<u64> {
        let Self::String(s) = self else {
            return None;
        };
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if s.len() > 1 && s.starts_with('0') {
            return None;
        }
        s.parse::<u64>().ok().filter(|&n| n <= MAX_ARRAY_INDEX)
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

// ---------------------------------------------------------------------------
// ObjectHandle / NativeId
// ---------------------------------------------------------------------------

/// Opaque handle referencing an object on the managed heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Index into the runtime's native-function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NativeId(pub u32);

// ---------------------------------------------------------------------------
// JsValue
// ---------------------------------------------------------------------------

/// Runtime value seen by traps and returned from fundamental operations.
///
/// Functions are objects: callability is a property of the object, not of
/// the value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Symbol(SymbolId),
    Object(ObjectHandle),
}

impl JsValue {
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(h) => Some(*h),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "number",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
        }
    }

    /// SameValue comparison (ES2020 §7.2.10).
    ///
    /// Integers have no signed zero or NaN, so structural equality is exact.
    pub fn same_value(&self, other: &Self) -> bool {
        self == other
    }

    /// ToBoolean (ES2020 §7.1.2).
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Str(s) => !s.is_empty(),
            Self::Symbol(_) | Self::Object(_) => true,
        }
    }
}

impl From<ObjectHandle> for JsValue {
    fn from(handle: ObjectHandle) -> Self {
        Self::Object(handle)
    }
}

impl From<Option<ObjectHandle>> for JsValue {
    fn from(handle: Option<ObjectHandle>) -> Self {
        handle.map_or(Self::Null, Self::Object)
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
            Self::Object(h) => write!(f, "[object#{}]", h.0),
        }
    }
}

// ---------------------------------------------------------------------------
// OrdinaryObject
// ---------------------------------------------------------------------------

/// An ordinary object with internal slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinaryObject {
    /// Realm the object was allocated in.
    pub realm: RealmId,
    /// `[[Prototype]]` internal slot (null means end of chain).
    pub prototype: Option<ObjectHandle>,
    /// `[[Extensible]]` internal slot.
    pub extensible: bool,
    /// Own properties with descriptors.
    #[serde(with = "keyed_as_seq")]
    pub properties: BTreeMap<PropertyKey, PropertyDescriptor>,
    /// Watch handlers, invoked on ordinary `[[Set]]` of the key.
    #[serde(with = "keyed_as_seq")]
    pub watchpoints: BTreeMap<PropertyKey, ObjectHandle>,
    /// Native behavior, present iff the object is callable.
    pub native: Option<NativeId>,
    /// Is this object a constructor?
    pub constructable: bool,
}

impl OrdinaryObject {
    /// Create a new ordinary object with the given prototype.
    pub fn new(realm: RealmId, prototype: Option<ObjectHandle>) -> Self {
        Self {
            realm,
            prototype,
            extensible: true,
            properties: BTreeMap::new(),
            watchpoints: BTreeMap::new(),
            native: None,
            constructable: false,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.native.is_some()
    }

    /// `[[GetOwnProperty]](P)`.
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.properties.contains_key(key)
    }

    /// `[[DefineOwnProperty]](P, Desc)`: ValidateAndApplyPropertyDescriptor.
    ///
    /// Returns `false` when the change is not a legal evolution of the
    /// current property; nothing is modified in that case.
    pub fn define_own_property(&mut self, key: PropertyKey, desc: &PartialDescriptor) -> bool {
        let current = self.properties.get(&key);
        if !validate_property_descriptor(self.extensible, desc, current) {
            return false;
        }
        let next = match current {
            Some(existing) => desc.apply_to(existing),
            None => desc.clone().complete(),
        };
        self.properties.insert(key, next);
        true
    }

    /// `[[Delete]](P)`. Returns `false` if the property is non-configurable.
    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        match self.properties.get(key) {
            Some(desc) if !desc.is_configurable() => false,
            Some(_) => {
                self.properties.remove(key);
                self.watchpoints.remove(key);
                true
            }
            None => true,
        }
    }

    /// `[[OwnPropertyKeys]]()`: integer indices ascending, then other
    /// strings, then symbols.
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        let mut int_keys: Vec<(u64, PropertyKey)> = Vec::new();
        let mut str_keys: Vec<PropertyKey> = Vec::new();
        let mut sym_keys: Vec<PropertyKey> = Vec::new();

        for key in self.properties.keys() {
            match key.array_index() {
                Some(n) => int_keys.push((n, key.clone())),
                None if key.is_symbol() => sym_keys.push(key.clone()),
                None => str_keys.push(key.clone()),
            }
        }

        int_keys.sort_by_key(|(n, _)| *n);
        let mut result: Vec<PropertyKey> = int_keys.into_iter().map(|(_, k)| k).collect();
        result.extend(str_keys);
        result.extend(sym_keys);
        result
    }
}

// ---------------------------------------------------------------------------
// ProxyObject
// ---------------------------------------------------------------------------

/// Proxy internal state.
///
/// `policy` selects the handler behavior from the policy registry; for
/// scripted proxies `handler` is the script-visible handler object, for
/// wrappers it is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyObject {
    /// `[[ProxyTarget]]` (cleared on revocation).
    pub target: Option<ObjectHandle>,
    /// `[[ProxyHandler]]` (cleared on revocation).
    pub handler: Option<ObjectHandle>,
    pub policy: PolicyHandle,
    pub realm: RealmId,
    pub callable: bool,
    pub constructable: bool,
    /// Unchecked unwrapping stops at this object when asked to.
    pub unwrap_boundary: bool,
    pub revoked: bool,
}

impl ProxyObject {
    pub fn new(
        target: ObjectHandle,
        handler: Option<ObjectHandle>,
        policy: PolicyHandle,
        realm: RealmId,
    ) -> Self {
        Self {
            target: Some(target),
            handler,
            policy,
            realm,
            callable: false,
            constructable: false,
            unwrap_boundary: false,
            revoked: false,
        }
    }

    /// Sever target and handler.  Returns `false` if already revoked.
    pub fn revoke(&mut self) -> bool {
        if self.revoked {
            return false;
        }
        self.revoked = true;
        self.target = None;
        self.handler = None;
        true
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }
}

// ---------------------------------------------------------------------------
// ManagedObject / ObjectHeap
// ---------------------------------------------------------------------------

/// A managed object: either ordinary or a proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ManagedObject {
    Ordinary(OrdinaryObject),
    Proxy(ProxyObject),
}

impl ManagedObject {
    pub fn realm(&self) -> RealmId {
        match self {
            Self::Ordinary(o) => o.realm,
            Self::Proxy(p) => p.realm,
        }
    }

    pub fn as_ordinary(&self) -> Option<&OrdinaryObject> {
        match self {
            Self::Ordinary(o) => Some(o),
            Self::Proxy(_) => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&ProxyObject> {
        match self {
            Self::Proxy(p) => Some(p),
            Self::Ordinary(_) => None,
        }
    }
}

/// The object heap: arena of managed objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectHeap {
    objects: Vec<ManagedObject>,
    next_symbol: u32,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new ordinary object.
    pub fn alloc(&mut self, object: OrdinaryObject) -> ObjectHandle {
        self.push(ManagedObject::Ordinary(object))
    }

    /// Allocate a proxy object.
    pub fn alloc_proxy(&mut self, proxy: ProxyObject) -> ObjectHandle {
        self.push(ManagedObject::Proxy(proxy))
    }

    fn push(&mut self, object: ManagedObject) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(object);
        handle
    }

    /// Allocate a new unique symbol id.
    pub fn alloc_symbol(&mut self) -> SymbolId {
        self.next_symbol += 1;
        SymbolId(self.next_symbol)
    }

    pub fn get(&self, handle: ObjectHandle) -> ProxyResult<&ManagedObject> {
        self.objects
            .get(handle.0 as usize)
            .ok_or(ProxyError::ObjectNotFound { handle })
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> ProxyResult<&mut ManagedObject> {
        self.objects
            .get_mut(handle.0 as usize)
            .ok_or(ProxyError::ObjectNotFound { handle })
    }

    /// Borrow a proxy, or fail if `handle` is an ordinary object.
    pub fn proxy(&self, handle: ObjectHandle) -> ProxyResult<&ProxyObject> {
        match self.get(handle)? {
            ManagedObject::Proxy(p) => Ok(p),
            ManagedObject::Ordinary(_) => Err(ProxyError::NotAProxy { handle }),
        }
    }

    pub fn proxy_mut(&mut self, handle: ObjectHandle) -> ProxyResult<&mut ProxyObject> {
        match self.get_mut(handle)? {
            ManagedObject::Proxy(p) => Ok(p),
            ManagedObject::Ordinary(_) => Err(ProxyError::NotAProxy { handle }),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
