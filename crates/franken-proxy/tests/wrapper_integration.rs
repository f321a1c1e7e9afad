use std::sync::Arc;

use frankenengine_proxy::{
    AllowList, CallbackFailure, HandlerKind, JsValue, ObjectHandle, Operation, PartialDescriptor, PolicyHandle,
    PolicyRegistryBuilder, PropertyKey, ProxyError, ProxyEventType, RealmId, RealmOptions,
    RevocationController, Runtime, RuntimeConfig, WrapperFlags, checked_unwrap, unchecked_unwrap,
};

fn str_key(s: &str) -> PropertyKey {
    PropertyKey::String(s.to_string())
}

fn int_val(n: i64) -> JsValue {
    JsValue::Int(n)
}

/// Runtime with a second realm holding one object `{x: 1, inner: {}}`.
fn foreign_setup() -> (Runtime, RealmId, ObjectHandle, ObjectHandle) {
    let mut rt = Runtime::new();
    let guest = rt.create_realm(RealmOptions::named("guest"));
    let (obj, inner) = rt
        .with_realm(guest, |rt| {
            let obj = rt.create_object();
            let inner = rt.create_object();
            rt.create_data_property(obj, str_key("x"), int_val(1))?;
            rt.create_data_property(obj, str_key("inner"), inner.into())?;
            Ok::<_, ProxyError>((obj, inner))
        })
        .unwrap()
        .unwrap();
    (rt, guest, obj, inner)
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[test]
fn wrap_then_unwrap_yields_original() {
    let (mut rt, _, obj, _) = foreign_setup();
    let wrapper = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    assert_ne!(wrapper, obj);
    assert!(rt.is_wrapper(wrapper));
    assert!(rt.is_cross_realm_wrapper(wrapper));
    assert_eq!(rt.realm_of(wrapper).unwrap(), RealmId::MAIN);

    let (unwrapped, flags) = unchecked_unwrap(&rt, wrapper, false).unwrap();
    assert_eq!(unwrapped, obj);
    assert!(flags.contains(WrapperFlags::CROSS_REALM));
    assert_eq!(checked_unwrap(&rt, wrapper, false).unwrap(), obj);
}

#[test]
fn wrapping_twice_reuses_wrapper() {
    let (mut rt, _, obj, _) = foreign_setup();
    let first = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    let second = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    assert_eq!(first, second);
    assert_eq!(rt.event_log().count(ProxyEventType::WrapperCreated), 1);
    assert_eq!(
        rt.realms().get(RealmId::MAIN).unwrap().wrapper_count(),
        1
    );
}

#[test]
fn wrapper_sent_home_is_unwrapped() {
    let (mut rt, guest, obj, _) = foreign_setup();
    let wrapper = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    assert_eq!(rt.wrap_object(wrapper, guest).unwrap(), obj);
    assert_eq!(
        rt.wrap_value(&JsValue::Object(wrapper), guest).unwrap(),
        JsValue::Object(obj)
    );
    assert_eq!(rt.wrap_value(&int_val(3), guest).unwrap(), int_val(3));
}

#[test]
fn same_realm_objects_pass_through() {
    let (mut rt, _, _, _) = foreign_setup();
    let local = rt.create_object();
    assert_eq!(rt.wrap_object(local, RealmId::MAIN).unwrap(), local);
}

#[test]
fn third_realm_gets_its_own_wrapper() {
    let (mut rt, _, obj, _) = foreign_setup();
    let third = rt.create_realm(RealmOptions::named("third"));
    let main_view = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    let third_view = rt.wrap_object(main_view, third).unwrap();
    assert_ne!(main_view, third_view);
    assert_eq!(unchecked_unwrap(&rt, third_view, false).unwrap().0, obj);
    assert_eq!(rt.realm_of(third_view).unwrap(), third);
}

// ---------------------------------------------------------------------------
// Marshalling
// ---------------------------------------------------------------------------

#[test]
fn property_reads_marshal_objects() {
    let (mut rt, _, obj, inner) = foreign_setup();
    let wrapper = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    assert_eq!(rt.get(wrapper, &str_key("x")).unwrap(), int_val(1));

    let inner_view = rt.get(wrapper, &str_key("inner")).unwrap();
    let inner_view = inner_view.as_object().unwrap();
    assert_ne!(inner_view, inner);
    assert!(rt.is_cross_realm_wrapper(inner_view));
    assert_eq!(
        rt.get(wrapper, &str_key("inner")).unwrap(),
        JsValue::Object(inner_view)
    );
}

#[test]
fn descriptors_are_marshalled() {
    let (mut rt, _, obj, inner) = foreign_setup();
    let wrapper = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    let desc = rt
        .get_own_property_descriptor(wrapper, &str_key("inner"))
        .unwrap()
        .unwrap();
    let value = desc.value().and_then(JsValue::as_object).unwrap();
    assert_eq!(unchecked_unwrap(&rt, value, false).unwrap().0, inner);
    assert_eq!(rt.realm_of(value).unwrap(), RealmId::MAIN);
}

#[test]
fn writes_through_wrapper_land_on_target() {
    let (mut rt, guest, obj, _) = foreign_setup();
    let wrapper = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    let local = rt.create_object();
    assert!(rt.set(wrapper, &str_key("y"), local.into()).unwrap());

    let stored = rt.get(obj, &str_key("y")).unwrap().as_object().unwrap();
    assert_eq!(rt.realm_of(stored).unwrap(), guest);
    assert_eq!(unchecked_unwrap(&rt, stored, false).unwrap().0, local);
    assert_eq!(rt.get(wrapper, &str_key("y")).unwrap(), JsValue::Object(local));
}

#[test]
fn calls_run_in_target_realm() {
    let (mut rt, guest, _, _) = foreign_setup();
    let f = rt
        .with_realm(guest, |rt| {
            rt.create_function("echo", |rt, _, args| {
                let fresh = rt.create_object();
                let first = args.first().cloned().unwrap_or(JsValue::Undefined);
                rt.create_data_property(fresh, PropertyKey::from("arg"), first)?;
                Ok(fresh.into())
            })
        })
        .unwrap();
    let wrapped = rt.wrap_object(f, RealmId::MAIN).unwrap();
    assert!(rt.is_callable(wrapped));

    let local = rt.create_object();
    let result = rt
        .call(wrapped, &JsValue::Undefined, &[local.into()])
        .unwrap()
        .as_object()
        .unwrap();
    assert_eq!(rt.realm_of(result).unwrap(), RealmId::MAIN);
    assert!(rt.is_cross_realm_wrapper(result));
    let (inner_result, _) = unchecked_unwrap(&rt, result, false).unwrap();
    assert_eq!(rt.realm_of(inner_result).unwrap(), guest);
    assert_eq!(rt.get(result, &str_key("arg")).unwrap(), JsValue::Object(local));
    assert_eq!(rt.current_realm(), RealmId::MAIN);
}

#[test]
fn thrown_objects_cross_back_wrapped() {
    let (mut rt, guest, _, _) = foreign_setup();
    let (thrower, error_obj) = rt
        .with_realm(guest, |rt| {
            let error_obj = rt.create_object();
            let thrower = rt.create_function("thrower", move |_, _, _| {
                Err(ProxyError::thrown(error_obj.into()))
            });
            (thrower, error_obj)
        })
        .unwrap();
    let wrapped = rt.wrap_object(thrower, RealmId::MAIN).unwrap();
    let err = rt.call(wrapped, &JsValue::Undefined, &[]).unwrap_err();
    assert_eq!(err.error_code(), "FE-PROXY-0004");
    let ProxyError::CallbackFailure(CallbackFailure::Thrown(JsValue::Object(seen))) = err.clone()
    else {
        panic!("expected a thrown object, got {err:?}");
    };
    assert_ne!(seen, error_obj);
    assert_eq!(rt.realm_of(seen).unwrap(), RealmId::MAIN);
    assert_eq!(unchecked_unwrap(&rt, seen, false).unwrap().0, error_obj);
    assert_eq!(rt.current_realm(), RealmId::MAIN);
}

#[test]
fn construct_through_wrapper_returns_wrapped_instance() {
    let (mut rt, guest, _, _) = foreign_setup();
    let ctor = rt
        .with_realm(guest, |rt| {
            rt.create_constructor("Thing", |rt, this, _| {
                let this = this
                    .as_object()
                    .ok_or_else(|| ProxyError::TypeError("this".into()))?;
                rt.create_data_property(this, PropertyKey::from("made"), JsValue::Bool(true))?;
                Ok(JsValue::Undefined)
            })
        })
        .unwrap();
    let wrapped = rt.wrap_object(ctor, RealmId::MAIN).unwrap();
    let instance = rt.construct(wrapped, &[]).unwrap();
    assert!(rt.is_cross_realm_wrapper(instance));
    assert_eq!(rt.get(instance, &str_key("made")).unwrap(), JsValue::Bool(true));
    let (raw, _) = unchecked_unwrap(&rt, instance, false).unwrap();
    assert_eq!(rt.realm_of(raw).unwrap(), guest);
}

// ---------------------------------------------------------------------------
// Security wrappers
// ---------------------------------------------------------------------------

#[test]
fn security_wrapper_denies_restricted_operations() {
    let mut rt = Runtime::new();
    let target = rt.create_object();
    rt.create_data_property(target, str_key("x"), int_val(1)).unwrap();
    let guarded = rt.new_wrapper(target, PolicyHandle::SECURITY).unwrap();

    assert_eq!(rt.get(guarded, &str_key("x")).unwrap(), int_val(1));
    assert!(rt.has_property(guarded, &str_key("x")).unwrap());
    let err = rt.prevent_extensions(guarded).unwrap_err();
    assert_eq!(
        err,
        ProxyError::PermissionDenied {
            operation: Operation::PreventExtensions,
            key: None,
        }
    );
    assert_eq!(err.error_code(), "FE-PROXY-0006");
    assert!(rt.is_extensible(target).unwrap());

    let denials: Vec<_> = rt
        .event_log()
        .events()
        .iter()
        .filter(|e| e.event == ProxyEventType::PermissionDenied)
        .collect();
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].detail.as_deref(), Some("deny-mutations"));
    assert_eq!(denials[0].object, Some(guarded));
}

#[test]
fn plain_set_through_security_wrapper_updates_target() {
    let mut rt = Runtime::new();
    let target = rt.create_object();
    let guarded = rt.new_wrapper(target, PolicyHandle::SECURITY).unwrap();
    assert!(rt.set(guarded, &str_key("n"), int_val(5)).unwrap());
    assert_eq!(rt.get(target, &str_key("n")).unwrap(), int_val(5));
    assert!(rt.set(guarded, &str_key("n"), int_val(6)).unwrap());
    assert_eq!(rt.get(guarded, &str_key("n")).unwrap(), int_val(6));
}

#[test]
fn security_layer_vetoes_checked_unwrap() {
    let mut rt = Runtime::new();
    let target = rt.create_object();
    let guarded = rt.new_wrapper(target, PolicyHandle::SECURITY).unwrap();
    assert_eq!(
        checked_unwrap(&rt, guarded, false).unwrap_err(),
        ProxyError::UnwrapDenied { wrapper: guarded }
    );
    assert_eq!(unchecked_unwrap(&rt, guarded, false).unwrap().0, target);
}

#[test]
fn custom_policy_via_registered_handler() {
    let mut builder = PolicyRegistryBuilder::standard();
    let policy = AllowList::operations([Operation::Get, Operation::Has])
        .with_keys([str_key("public")])
        .with_unwrap(true);
    let handle = builder.register(HandlerKind::cross_realm_security(Arc::new(policy)));
    let mut rt = Runtime::with_registry(RuntimeConfig::default(), builder.build());

    let host = rt.create_realm(RealmOptions::named("host").with_wrapper_policy(handle));
    let secret = rt.create_object();
    rt.create_data_property(secret, str_key("public"), int_val(1)).unwrap();
    rt.create_data_property(secret, str_key("private"), int_val(2)).unwrap();

    let view = rt.wrap_object(secret, host).unwrap();
    let read = rt
        .with_realm(host, |rt| {
            (
                rt.get(view, &str_key("public")),
                rt.get(view, &str_key("private")),
                rt.own_keys(view),
            )
        })
        .unwrap();
    assert_eq!(read.0.unwrap(), int_val(1));
    assert!(matches!(read.1, Err(ProxyError::PermissionDenied { .. })));
    assert!(matches!(
        read.2,
        Err(ProxyError::PermissionDenied {
            operation: Operation::OwnKeys,
            key: None
        })
    ));
    assert_eq!(checked_unwrap(&rt, view, false).unwrap(), secret);
    assert_eq!(rt.event_log().count(ProxyEventType::PermissionDenied), 2);
}

#[test]
fn unknown_policy_is_rejected() {
    let mut rt = Runtime::new();
    let target = rt.create_object();
    assert_eq!(
        rt.new_wrapper(target, PolicyHandle(99)).unwrap_err(),
        ProxyError::UnknownPolicy {
            handle: PolicyHandle(99)
        }
    );
}

// ---------------------------------------------------------------------------
// Nuking
// ---------------------------------------------------------------------------

#[test]
fn nuked_wrappers_fail_and_are_replaced() {
    let (mut rt, guest, obj, inner) = foreign_setup();
    let wrapper = rt.wrap_object(obj, RealmId::MAIN).unwrap();
    let inner_view = rt.get(wrapper, &str_key("inner")).unwrap().as_object().unwrap();

    let nuked = RevocationController::nuke_realm_wrappers(&mut rt, RealmId::MAIN, guest).unwrap();
    assert_eq!(nuked, 2);
    for severed in [wrapper, inner_view] {
        assert!(rt.is_revoked(severed));
        assert!(matches!(
            rt.get(severed, &str_key("x")).unwrap_err(),
            ProxyError::RevokedProxy { .. }
        ));
    }
    assert_eq!(rt.realms().get(RealmId::MAIN).unwrap().wrapper_count(), 0);

    let fresh = rt.wrap_object(inner, RealmId::MAIN).unwrap();
    assert_ne!(fresh, inner_view);
    assert!(
        rt.define_property(fresh, &str_key("ok"), &PartialDescriptor::value(int_val(1)))
            .unwrap()
    );
    assert_eq!(rt.event_log().count(ProxyEventType::WrapperNuked), 2);
}
