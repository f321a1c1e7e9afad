//! Trap dispatch for proxies whose handler is a script object.
//!
//! Every operation looks its trap up on the handler with a full `get`, so
//! handler getters run and may re-enter the runtime.  An absent trap
//! forwards to the target.  A present trap is invoked with the handler as
//! `this`; its result is shape-checked, then cross-checked against target
//! state read after the trap returned.

use std::collections::BTreeSet;

use crate::descriptor::{PartialDescriptor, PropertyDescriptor};
use crate::error::{ProxyError, ProxyResult};
use crate::handler::{HandlerFamily, ProxyHandler};
use crate::invariant::{InvariantViolation, ProxyInvariantChecker};
use crate::object_model::{JsValue, ObjectHandle, PropertyKey};
use crate::operation::Operation;
use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedHandler;

/// Handler, target, and resolved trap for one operation.
///
/// Handler and target are read before the trap lookup; a handler getter
/// that revokes the proxy does not change which target this call uses.
struct Trap {
    operation: Operation,
    proxy: ObjectHandle,
    handler: ObjectHandle,
    target: ObjectHandle,
    callee: Option<ObjectHandle>,
}

impl Trap {
    fn lookup(rt: &mut Runtime, proxy: ObjectHandle, operation: Operation) -> ProxyResult<Self> {
        let handler = rt.proxy_handler(proxy)?;
        let target = rt.proxy_target(proxy)?;
        let value = rt.get(handler, &PropertyKey::from(operation.trap_name()))?;
        let callee = match value {
            JsValue::Undefined | JsValue::Null => None,
            JsValue::Object(f) if rt.is_callable(f) => Some(f),
            _ => return Err(ProxyError::TrapNotCallable { operation }),
        };
        Ok(Self {
            operation,
            proxy,
            handler,
            target,
            callee,
        })
    }

    fn invoke(&self, rt: &mut Runtime, callee: ObjectHandle, args: &[JsValue]) -> ProxyResult<JsValue> {
        rt.call(callee, &JsValue::Object(self.handler), args)
    }

    /// Turn a failed check into an error and log it.
    fn enforce(
        &self,
        rt: &mut Runtime,
        key: Option<&PropertyKey>,
        outcome: Result<(), InvariantViolation>,
    ) -> ProxyResult<()> {
        outcome.map_err(|violation| {
            let err = ProxyError::invariant(self.operation, key, violation);
            rt.record_violation(self.proxy, &err);
            err
        })
    }

    /// Read a key-list result: an array-like of strings, symbols, or
    /// integers with no repeats.  Each element is checked as it is read,
    /// so the first bad element ends the walk.
    fn key_list(&self, rt: &mut Runtime, result: &JsValue) -> ProxyResult<Vec<PropertyKey>> {
        let Some(array) = result.as_object() else {
            return Err(invalid(
                self.operation,
                None,
                format!("expected an array-like object, got {}", result.type_name()),
            ));
        };
        let length = rt.array_like_length(array)?;
        let extensible = rt.is_extensible(self.target)?;
        let mut seen = BTreeSet::new();
        let mut keys = Vec::new();
        for index in 0..length {
            let element = rt.array_like_element(array, index)?;
            let key = match element {
                JsValue::Str(_) | JsValue::Symbol(_) | JsValue::Int(_) => {
                    PropertyKey::from_value(&element)
                }
                _ => None,
            };
            let Some(key) = key else {
                return Err(invalid(
                    self.operation,
                    None,
                    format!("element {index} is a {}, not a property key", element.type_name()),
                ));
            };
            if !seen.insert(key.clone()) {
                return Err(invalid(self.operation, Some(&key), "duplicate key"));
            }
            let owned = extensible || rt.has_own(self.target, &key)?;
            self.enforce(
                rt,
                Some(&key),
                ProxyInvariantChecker::check_reported_key(extensible, owned, &key),
            )?;
            keys.push(key);
        }
        Ok(keys)
    }
}

fn invalid(operation: Operation, key: Option<&PropertyKey>, detail: impl Into<String>) -> ProxyError {
    ProxyError::invalid_trap_result(operation, key, detail)
}

/// Own keys of `target` passing `filter`, with their configurability.
fn target_key_states(
    rt: &mut Runtime,
    target: ObjectHandle,
    filter: impl Fn(&PropertyKey, &PropertyDescriptor) -> bool,
) -> ProxyResult<Vec<(PropertyKey, bool)>> {
    let mut states = Vec::new();
    for key in rt.own_keys(target)? {
        if let Some(desc) = rt.get_own_property_descriptor(target, &key)?
            && filter(&key, &desc)
        {
            states.push((key, desc.is_configurable()));
        }
    }
    Ok(states)
}

/// ToPropertyDescriptor: read a descriptor object field by field.
pub fn to_property_descriptor(
    rt: &mut Runtime,
    operation: Operation,
    key: &PropertyKey,
    obj: ObjectHandle,
) -> ProxyResult<PartialDescriptor> {
    let mut desc = PartialDescriptor::empty();
    let field = |name: &str| PropertyKey::from(name);

    if rt.has_property(obj, &field("enumerable"))? {
        desc.enumerable = Some(rt.get(obj, &field("enumerable"))?.to_boolean());
    }
    if rt.has_property(obj, &field("configurable"))? {
        desc.configurable = Some(rt.get(obj, &field("configurable"))?.to_boolean());
    }
    if rt.has_property(obj, &field("value"))? {
        desc.value = Some(rt.get(obj, &field("value"))?);
    }
    if rt.has_property(obj, &field("writable"))? {
        desc.writable = Some(rt.get(obj, &field("writable"))?.to_boolean());
    }
    for (name, is_getter) in [("get", true), ("set", false)] {
        if !rt.has_property(obj, &field(name))? {
            continue;
        }
        let accessor = match rt.get(obj, &field(name))? {
            JsValue::Undefined => None,
            JsValue::Object(f) if rt.is_callable(f) => Some(f),
            other => {
                return Err(invalid(
                    operation,
                    Some(key),
                    format!("descriptor {name} must be callable or undefined, got {}", other.type_name()),
                ));
            }
        };
        if is_getter {
            desc.get = Some(accessor);
        } else {
            desc.set = Some(accessor);
        }
    }

    if desc.is_data() && desc.is_accessor() {
        return Err(invalid(
            operation,
            Some(key),
            "descriptor has both data and accessor fields",
        ));
    }
    Ok(desc)
}

/// FromPropertyDescriptor: a fresh object carrying the present fields.
pub fn from_property_descriptor(rt: &mut Runtime, desc: &PartialDescriptor) -> ProxyResult<ObjectHandle> {
    let obj = rt.create_object();
    if let Some(value) = &desc.value {
        rt.create_data_property(obj, PropertyKey::from("value"), value.clone())?;
    }
    if let Some(writable) = desc.writable {
        rt.create_data_property(obj, PropertyKey::from("writable"), JsValue::Bool(writable))?;
    }
    if let Some(get) = desc.get {
        rt.create_data_property(obj, PropertyKey::from("get"), get.map_or(JsValue::Undefined, JsValue::Object))?;
    }
    if let Some(set) = desc.set {
        rt.create_data_property(obj, PropertyKey::from("set"), set.map_or(JsValue::Undefined, JsValue::Object))?;
    }
    if let Some(enumerable) = desc.enumerable {
        rt.create_data_property(obj, PropertyKey::from("enumerable"), JsValue::Bool(enumerable))?;
    }
    if let Some(configurable) = desc.configurable {
        rt.create_data_property(obj, PropertyKey::from("configurable"), JsValue::Bool(configurable))?;
    }
    Ok(obj)
}

impl ProxyHandler for ScriptedHandler {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::Scripted
    }

    fn get_own_property_descriptor(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
    ) -> ProxyResult<Option<PropertyDescriptor>> {
        let trap = Trap::lookup(rt, proxy, Operation::GetOwnPropertyDescriptor)?;
        let Some(callee) = trap.callee else {
            return rt.get_own_property_descriptor(trap.target, key);
        };
        let result = trap.invoke(rt, callee, &[trap.target.into(), key.to_value()])?;
        let reported = match result {
            JsValue::Undefined => None,
            JsValue::Object(obj) => {
                Some(to_property_descriptor(rt, trap.operation, key, obj)?.complete())
            }
            other => {
                return Err(invalid(
                    trap.operation,
                    Some(key),
                    format!("expected an object or undefined, got {}", other.type_name()),
                ));
            }
        };

        let target_desc = rt.get_own_property_descriptor(trap.target, key)?;
        let extensible = rt.is_extensible(trap.target)?;
        trap.enforce(
            rt,
            Some(key),
            ProxyInvariantChecker::check_get_own_property_descriptor(
                extensible,
                target_desc.as_ref(),
                reported.as_ref(),
            ),
        )?;
        Ok(reported)
    }

    fn define_property(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        desc: &PartialDescriptor,
    ) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::DefineProperty)?;
        let Some(callee) = trap.callee else {
            return rt.define_property(trap.target, key, desc);
        };
        let desc_obj = from_property_descriptor(rt, desc)?;
        let reported = trap
            .invoke(rt, callee, &[trap.target.into(), key.to_value(), desc_obj.into()])?
            .to_boolean();
        if !reported {
            return Ok(false);
        }

        let target_desc = rt.get_own_property_descriptor(trap.target, key)?;
        let extensible = rt.is_extensible(trap.target)?;
        trap.enforce(
            rt,
            Some(key),
            ProxyInvariantChecker::check_define_property(extensible, target_desc.as_ref(), desc, true),
        )?;
        Ok(true)
    }

    fn own_keys(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        let trap = Trap::lookup(rt, proxy, Operation::OwnKeys)?;
        let Some(callee) = trap.callee else {
            return rt.own_keys(trap.target);
        };
        let result = trap.invoke(rt, callee, &[trap.target.into()])?;
        let keys = trap.key_list(rt, &result)?;

        let extensible = rt.is_extensible(trap.target)?;
        let target_keys = target_key_states(rt, trap.target, |_, _| true)?;
        trap.enforce(
            rt,
            None,
            ProxyInvariantChecker::check_key_list(extensible, &target_keys, &keys),
        )?;
        Ok(keys)
    }

    fn enumerate(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<Vec<PropertyKey>> {
        let trap = Trap::lookup(rt, proxy, Operation::Enumerate)?;
        let Some(callee) = trap.callee else {
            return rt.enumerate(trap.target);
        };
        let result = trap.invoke(rt, callee, &[trap.target.into()])?;
        let keys = trap.key_list(rt, &result)?;

        let extensible = rt.is_extensible(trap.target)?;
        let target_keys = target_key_states(rt, trap.target, |key, desc| {
            !key.is_symbol() && desc.is_enumerable()
        })?;
        trap.enforce(
            rt,
            None,
            ProxyInvariantChecker::check_key_list(extensible, &target_keys, &keys),
        )?;
        Ok(keys)
    }

    fn delete(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::DeleteProperty)?;
        let Some(callee) = trap.callee else {
            return rt.delete(trap.target, key);
        };
        let reported = trap
            .invoke(rt, callee, &[trap.target.into(), key.to_value()])?
            .to_boolean();
        if !reported {
            return Ok(false);
        }

        let target_desc = rt.get_own_property_descriptor(trap.target, key)?;
        trap.enforce(
            rt,
            Some(key),
            ProxyInvariantChecker::check_delete(target_desc.as_ref(), true),
        )?;
        Ok(true)
    }

    fn has(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::Has)?;
        let Some(callee) = trap.callee else {
            return rt.has_property(trap.target, key);
        };
        let reported = trap
            .invoke(rt, callee, &[trap.target.into(), key.to_value()])?
            .to_boolean();
        if reported {
            return Ok(true);
        }

        let target_desc = rt.get_own_property_descriptor(trap.target, key)?;
        let extensible = match target_desc {
            Some(_) => rt.is_extensible(trap.target)?,
            None => true,
        };
        trap.enforce(
            rt,
            Some(key),
            ProxyInvariantChecker::check_has(extensible, target_desc.as_ref(), false),
        )?;
        Ok(false)
    }

    fn get(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> ProxyResult<JsValue> {
        let trap = Trap::lookup(rt, proxy, Operation::Get)?;
        let Some(callee) = trap.callee else {
            return rt.get_with_receiver(trap.target, key, receiver);
        };
        let result = trap.invoke(
            rt,
            callee,
            &[trap.target.into(), key.to_value(), receiver.clone()],
        )?;

        let target_desc = rt.get_own_property_descriptor(trap.target, key)?;
        trap.enforce(
            rt,
            Some(key),
            ProxyInvariantChecker::check_get(target_desc.as_ref(), &result),
        )?;
        Ok(result)
    }

    fn set(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::Set)?;
        let Some(callee) = trap.callee else {
            return rt.set_with_receiver(trap.target, key, value, receiver);
        };
        let reported = trap
            .invoke(
                rt,
                callee,
                &[trap.target.into(), key.to_value(), value.clone(), receiver.clone()],
            )?
            .to_boolean();
        if !reported {
            return Ok(false);
        }

        let target_desc = rt.get_own_property_descriptor(trap.target, key)?;
        trap.enforce(
            rt,
            Some(key),
            ProxyInvariantChecker::check_set(target_desc.as_ref(), &value, true),
        )?;
        Ok(true)
    }

    fn is_extensible(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::IsExtensible)?;
        let Some(callee) = trap.callee else {
            return rt.is_extensible(trap.target);
        };
        let reported = trap.invoke(rt, callee, &[trap.target.into()])?.to_boolean();

        let actual = rt.is_extensible(trap.target)?;
        trap.enforce(
            rt,
            None,
            ProxyInvariantChecker::check_is_extensible(actual, reported),
        )?;
        Ok(reported)
    }

    fn prevent_extensions(&self, rt: &mut Runtime, proxy: ObjectHandle) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::PreventExtensions)?;
        let Some(callee) = trap.callee else {
            return rt.prevent_extensions(trap.target);
        };
        let reported = trap.invoke(rt, callee, &[trap.target.into()])?.to_boolean();
        if !reported {
            return Ok(false);
        }

        let actual = rt.is_extensible(trap.target)?;
        trap.enforce(
            rt,
            None,
            ProxyInvariantChecker::check_prevent_extensions(actual, true),
        )?;
        Ok(true)
    }

    fn get_prototype_of(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
    ) -> ProxyResult<Option<ObjectHandle>> {
        let trap = Trap::lookup(rt, proxy, Operation::GetPrototypeOf)?;
        let Some(callee) = trap.callee else {
            return rt.get_prototype_of(trap.target);
        };
        let reported = match trap.invoke(rt, callee, &[trap.target.into()])? {
            JsValue::Null => None,
            JsValue::Object(proto) => Some(proto),
            other => {
                return Err(invalid(
                    trap.operation,
                    None,
                    format!("expected an object or null, got {}", other.type_name()),
                ));
            }
        };

        if rt.is_extensible(trap.target)? {
            return Ok(reported);
        }
        let actual = rt.get_prototype_of(trap.target)?;
        trap.enforce(
            rt,
            None,
            ProxyInvariantChecker::check_get_prototype_of(false, actual, reported),
        )?;
        Ok(reported)
    }

    fn set_prototype_of(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::SetPrototypeOf)?;
        let Some(callee) = trap.callee else {
            return rt.set_prototype_of(trap.target, proto);
        };
        let reported = trap
            .invoke(rt, callee, &[trap.target.into(), JsValue::from(proto)])?
            .to_boolean();
        if !reported {
            return Ok(false);
        }

        if rt.is_extensible(trap.target)? {
            return Ok(true);
        }
        let actual = rt.get_prototype_of(trap.target)?;
        trap.enforce(
            rt,
            None,
            ProxyInvariantChecker::check_set_prototype_of(false, actual, proto, true),
        )?;
        Ok(true)
    }

    fn call(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        this: &JsValue,
        args: &[JsValue],
    ) -> ProxyResult<JsValue> {
        let trap = Trap::lookup(rt, proxy, Operation::Call)?;
        let Some(callee) = trap.callee else {
            return rt.call(trap.target, this, args);
        };
        let args_array = rt.create_array_from_list(args)?;
        trap.invoke(
            rt,
            callee,
            &[trap.target.into(), this.clone(), args_array.into()],
        )
    }

    fn construct(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        args: &[JsValue],
    ) -> ProxyResult<ObjectHandle> {
        let trap = Trap::lookup(rt, proxy, Operation::Construct)?;
        let Some(callee) = trap.callee else {
            return rt.construct(trap.target, args);
        };
        let args_array = rt.create_array_from_list(args)?;
        match trap.invoke(rt, callee, &[trap.target.into(), args_array.into()])? {
            JsValue::Object(obj) => Ok(obj),
            result => Err(ProxyError::ConstructResultNotObject { result }),
        }
    }

    fn watch(
        &self,
        rt: &mut Runtime,
        proxy: ObjectHandle,
        key: &PropertyKey,
        callback: ObjectHandle,
    ) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::Watch)?;
        let Some(callee) = trap.callee else {
            return rt.watch(trap.target, key, callback);
        };
        Ok(trap
            .invoke(rt, callee, &[trap.target.into(), key.to_value(), callback.into()])?
            .to_boolean())
    }

    fn unwatch(&self, rt: &mut Runtime, proxy: ObjectHandle, key: &PropertyKey) -> ProxyResult<bool> {
        let trap = Trap::lookup(rt, proxy, Operation::Unwatch)?;
        let Some(callee) = trap.callee else {
            return rt.unwatch(trap.target, key);
        };
        Ok(trap
            .invoke(rt, callee, &[trap.target.into(), key.to_value()])?
            .to_boolean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_key(s: &str) -> PropertyKey {
        PropertyKey::String(s.to_string())
    }

    fn handler_with_trap(
        rt: &mut Runtime,
        name: &str,
        body: impl Fn(&mut Runtime, &JsValue, &[JsValue]) -> ProxyResult<JsValue> + 'static,
    ) -> ObjectHandle {
        let handler = rt.create_object();
        let trap = rt.create_function(name, body);
        rt.create_data_property(handler, str_key(name), trap.into())
            .unwrap();
        handler
    }

    #[test]
    fn descriptor_object_round_trip() {
        let mut rt = Runtime::new();
        let desc = PartialDescriptor::value(JsValue::Int(3))
            .with_writable(false)
            .with_configurable(true);
        let obj = from_property_descriptor(&mut rt, &desc).unwrap();
        let back = to_property_descriptor(&mut rt, Operation::DefineProperty, &str_key("k"), obj)
            .unwrap();
        assert_eq!(back, desc);
    }

    #[test]
    fn descriptor_with_both_kinds_is_rejected() {
        let mut rt = Runtime::new();
        let getter = rt.create_function("g", |_, _, _| Ok(JsValue::Undefined));
        let obj = rt.create_object();
        rt.create_data_property(obj, str_key("value"), JsValue::Int(1))
            .unwrap();
        rt.create_data_property(obj, str_key("get"), getter.into())
            .unwrap();
        let err = to_property_descriptor(&mut rt, Operation::GetOwnPropertyDescriptor, &str_key("k"), obj)
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidTrapResult { .. }));
    }

    #[test]
    fn non_callable_getter_is_rejected() {
        let mut rt = Runtime::new();
        let obj = rt.create_object();
        rt.create_data_property(obj, str_key("get"), JsValue::Int(1))
            .unwrap();
        let err = to_property_descriptor(&mut rt, Operation::GetOwnPropertyDescriptor, &str_key("k"), obj)
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidTrapResult { .. }));
    }

    #[test]
    fn non_callable_trap_fails() {
        let mut rt = Runtime::new();
        let target = rt.create_object();
        let handler = rt.create_object();
        rt.create_data_property(handler, str_key("get"), JsValue::Int(5))
            .unwrap();
        let proxy = rt.make_proxy(target, handler).unwrap();
        assert_eq!(
            rt.get(proxy, &str_key("x")).unwrap_err(),
            ProxyError::TrapNotCallable {
                operation: Operation::Get
            }
        );
    }

    #[test]
    fn trap_receives_handler_as_this_and_target_first() {
        let mut rt = Runtime::new();
        let target = rt.create_object();
        let handler = handler_with_trap(&mut rt, "get", |_, this, args| {
            Ok(JsValue::Bool(this.is_object() && args.len() == 3 && args[1] == JsValue::Str("p".into())))
        });
        let proxy = rt.make_proxy(target, handler).unwrap();
        assert_eq!(rt.get(proxy, &str_key("p")).unwrap(), JsValue::Bool(true));
    }

    #[test]
    fn own_keys_integers_become_strings() {
        let mut rt = Runtime::new();
        let target = rt.create_object();
        let handler = handler_with_trap(&mut rt, "ownKeys", |rt, _, _| {
            let list = rt.create_array_from_list(&[JsValue::Int(0), JsValue::Str("a".into())])?;
            Ok(list.into())
        });
        let proxy = rt.make_proxy(target, handler).unwrap();
        assert_eq!(rt.own_keys(proxy).unwrap(), vec![str_key("0"), str_key("a")]);
    }

    #[test]
    fn own_keys_rejects_duplicates_and_non_keys() {
        let mut rt = Runtime::new();
        let target = rt.create_object();
        let dup = handler_with_trap(&mut rt, "ownKeys", |rt, _, _| {
            let list = rt.create_array_from_list(&[JsValue::Str("a".into()), JsValue::Str("a".into())])?;
            Ok(list.into())
        });
        let proxy = rt.make_proxy(target, dup).unwrap();
        assert!(matches!(
            rt.own_keys(proxy).unwrap_err(),
            ProxyError::InvalidTrapResult { operation: Operation::OwnKeys, .. }
        ));

        let bad = handler_with_trap(&mut rt, "ownKeys", |rt, _, _| {
            let list = rt.create_array_from_list(&[JsValue::Bool(true)])?;
            Ok(list.into())
        });
        let proxy = rt.make_proxy(target, bad).unwrap();
        assert!(matches!(
            rt.own_keys(proxy).unwrap_err(),
            ProxyError::InvalidTrapResult { .. }
        ));

        let not_object = handler_with_trap(&mut rt, "ownKeys", |_, _, _| Ok(JsValue::Int(1)));
        let proxy = rt.make_proxy(target, not_object).unwrap();
        assert!(matches!(
            rt.own_keys(proxy).unwrap_err(),
            ProxyError::InvalidTrapResult { .. }
        ));
    }

    #[test]
    fn get_prototype_of_requires_object_or_null() {
        let mut rt = Runtime::new();
        let target = rt.create_object();
        let handler = handler_with_trap(&mut rt, "getPrototypeOf", |_, _, _| Ok(JsValue::Int(1)));
        let proxy = rt.make_proxy(target, handler).unwrap();
        assert!(matches!(
            rt.get_prototype_of(proxy).unwrap_err(),
            ProxyError::InvalidTrapResult { operation: Operation::GetPrototypeOf, .. }
        ));
    }

    #[test]
    fn prevent_extensions_false_is_returned() {
        let mut rt = Runtime::new();
        let target = rt.create_object();
        let handler = handler_with_trap(&mut rt, "preventExtensions", |_, _, _| Ok(JsValue::Bool(false)));
        let proxy = rt.make_proxy(target, handler).unwrap();
        assert!(!rt.prevent_extensions(proxy).unwrap());
        assert!(rt.is_extensible(target).unwrap());
    }

    #[test]
    fn define_property_trap_sees_descriptor_object() {
        let mut rt = Runtime::new();
        let target = rt.create_object();
        let handler = handler_with_trap(&mut rt, "defineProperty", |rt, _, args| {
            let desc = args[2].as_object().ok_or_else(|| ProxyError::TypeError("desc".into()))?;
            let value = rt.get(desc, &PropertyKey::from("value"))?;
            let has_writable = rt.has_property(desc, &PropertyKey::from("writable"))?;
            Ok(JsValue::Bool(value == JsValue::Int(9) && !has_writable))
        });
        let proxy = rt.make_proxy(target, handler).unwrap();
        assert!(
            rt.define_property(proxy, &str_key("k"), &PartialDescriptor::value(JsValue::Int(9)))
                .unwrap()
        );
    }
}
