use frankenengine_proxy::{
    JsValue, ObjectHandle, PartialDescriptor, PropertyDescriptor, PropertyKey, Runtime,
    validate_property_descriptor,
};

fn data(value: i64, writable: bool, enumerable: bool, configurable: bool) -> PropertyDescriptor {
    PropertyDescriptor::Data {
        value: JsValue::Int(value),
        writable,
        enumerable,
        configurable,
    }
}

fn accessor(get: Option<ObjectHandle>, configurable: bool) -> PropertyDescriptor {
    PropertyDescriptor::Accessor {
        get,
        set: None,
        enumerable: false,
        configurable,
    }
}

#[test]
fn absent_property_depends_on_extensibility() {
    let desc = PartialDescriptor::value(JsValue::Int(1));
    assert!(validate_property_descriptor(true, &desc, None));
    assert!(!validate_property_descriptor(false, &desc, None));
}

#[test]
fn empty_and_identical_descriptors_always_pass() {
    let frozen = data(1, false, false, false);
    assert!(validate_property_descriptor(false, &PartialDescriptor::empty(), Some(&frozen)));
    assert!(validate_property_descriptor(
        false,
        &PartialDescriptor::from(&frozen),
        Some(&frozen)
    ));
}

#[test]
fn permanent_property_cannot_become_configurable_or_flip_enumerable() {
    let current = data(1, true, true, false);
    assert!(!validate_property_descriptor(
        true,
        &PartialDescriptor::empty().with_configurable(true),
        Some(&current)
    ));
    assert!(!validate_property_descriptor(
        true,
        &PartialDescriptor::empty().with_enumerable(false),
        Some(&current)
    ));
    assert!(validate_property_descriptor(
        true,
        &PartialDescriptor::empty().with_enumerable(true),
        Some(&current)
    ));
}

#[test]
fn generic_descriptor_passes_after_common_checks() {
    let current = data(1, false, false, true);
    assert!(validate_property_descriptor(
        true,
        &PartialDescriptor::empty().with_enumerable(true),
        Some(&current)
    ));
}

#[test]
fn kind_change_requires_configurable() {
    let get = Some(ObjectHandle(7));
    let to_accessor = PartialDescriptor::accessor(get, None);
    assert!(validate_property_descriptor(true, &to_accessor, Some(&data(1, true, true, true))));
    assert!(!validate_property_descriptor(true, &to_accessor, Some(&data(1, true, true, false))));

    let to_data = PartialDescriptor::value(JsValue::Null);
    assert!(validate_property_descriptor(true, &to_data, Some(&accessor(get, true))));
    assert!(!validate_property_descriptor(true, &to_data, Some(&accessor(get, false))));
}

#[test]
fn frozen_data_rejects_value_change_and_writable() {
    let frozen = data(5, false, true, false);
    assert!(!validate_property_descriptor(
        true,
        &PartialDescriptor::value(JsValue::Int(6)),
        Some(&frozen)
    ));
    assert!(validate_property_descriptor(
        true,
        &PartialDescriptor::value(JsValue::Int(5)),
        Some(&frozen)
    ));
    assert!(!validate_property_descriptor(
        true,
        &PartialDescriptor::empty().with_writable(true),
        Some(&frozen)
    ));
}

#[test]
fn permanent_writable_data_may_become_readonly() {
    let current = data(1, true, false, false);
    assert!(validate_property_descriptor(
        true,
        &PartialDescriptor::value(JsValue::Int(2)).with_writable(false),
        Some(&current)
    ));
}

#[test]
fn permanent_accessor_cannot_swap_functions() {
    let current = accessor(Some(ObjectHandle(1)), false);
    assert!(!validate_property_descriptor(
        true,
        &PartialDescriptor::accessor(Some(ObjectHandle(2)), None),
        Some(&current)
    ));
    assert!(validate_property_descriptor(
        true,
        &PartialDescriptor::accessor(Some(ObjectHandle(1)), None),
        Some(&current)
    ));
}

#[test]
fn ordinary_define_uses_the_same_rules() {
    let mut rt = Runtime::new();
    let obj = rt.create_object();
    let key = PropertyKey::from("k");
    assert!(
        rt.define_property(
            obj,
            &key,
            &PartialDescriptor::from(PropertyDescriptor::data_frozen(JsValue::Int(1)))
        )
        .unwrap()
    );
    assert!(
        !rt.define_property(obj, &key, &PartialDescriptor::value(JsValue::Int(2)))
            .unwrap()
    );
    assert!(!rt.delete(obj, &key).unwrap());
    rt.prevent_extensions(obj).unwrap();
    assert!(
        !rt.create_data_property(obj, PropertyKey::from("new"), JsValue::Null)
            .unwrap()
    );
    assert_eq!(rt.own_keys(obj).unwrap(), vec![key]);
}
