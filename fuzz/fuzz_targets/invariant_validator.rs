#![no_main]

use frankenengine_proxy::object_model::OrdinaryObject;
use frankenengine_proxy::{
    JsValue, ObjectHandle, PartialDescriptor, PropertyDescriptor, PropertyKey, RealmId,
    validate_property_descriptor,
};
use libfuzzer_sys::fuzz_target;

fn byte(data: &[u8], index: usize) -> u8 {
    data.get(index).copied().unwrap_or(0)
}

fn bit(data: &[u8], index: usize, shift: u8) -> bool {
    byte(data, index) >> shift & 1 == 1
}

fn tri(data: &[u8], index: usize, shift: u8) -> Option<bool> {
    match byte(data, index) >> shift & 3 {
        0 => None,
        1 => Some(false),
        _ => Some(true),
    }
}

fn handle(data: &[u8], index: usize) -> Option<ObjectHandle> {
    match byte(data, index) % 3 {
        0 => None,
        n => Some(ObjectHandle(u32::from(n))),
    }
}

fn current(data: &[u8]) -> Option<PropertyDescriptor> {
    let flags = byte(data, 0);
    if flags & 1 == 0 {
        return None;
    }
    let enumerable = bit(data, 0, 1);
    let configurable = bit(data, 0, 2);
    Some(if bit(data, 0, 3) {
        PropertyDescriptor::Accessor {
            get: handle(data, 1),
            set: handle(data, 2),
            enumerable,
            configurable,
        }
    } else {
        PropertyDescriptor::Data {
            value: JsValue::Int(i64::from(byte(data, 1) % 4)),
            writable: bit(data, 0, 4),
            enumerable,
            configurable,
        }
    })
}

fn proposed(data: &[u8]) -> PartialDescriptor {
    let mut desc = PartialDescriptor::empty();
    desc.enumerable = tri(data, 3, 0);
    desc.configurable = tri(data, 3, 2);
    match byte(data, 3) >> 4 & 3 {
        1 => {
            desc.value = bit(data, 3, 6).then(|| JsValue::Int(i64::from(byte(data, 4) % 4)));
            desc.writable = tri(data, 5, 0);
        }
        2 => {
            desc.get = bit(data, 5, 2).then(|| handle(data, 6));
            desc.set = bit(data, 5, 3).then(|| handle(data, 7));
        }
        _ => {}
    }
    desc
}

fuzz_target!(|data: &[u8]| {
    let extensible = bit(data, 8, 0);
    let current = current(data);
    let desc = proposed(data);

    let accepted = validate_property_descriptor(extensible, &desc, current.as_ref());

    let mut object = OrdinaryObject::new(RealmId::MAIN, None);
    let key = PropertyKey::from("k");
    if let Some(existing) = &current {
        object.properties.insert(key.clone(), existing.clone());
    }
    object.extensible = extensible;
    assert_eq!(object.define_own_property(key.clone(), &desc), accepted);

    let Some(after) = object.get_own_property(&key).cloned() else {
        assert!(!accepted);
        return;
    };
    if !accepted {
        assert_eq!(Some(&after), current.as_ref());
        return;
    }

    // An accepted change never loosens a permanent property.
    if let Some(before) = &current
        && !before.is_configurable()
    {
        assert!(!after.is_configurable());
        assert_eq!(after.is_enumerable(), before.is_enumerable());
        assert_eq!(after.is_data(), before.is_data());
        if before.is_frozen() {
            assert_eq!(after.value(), before.value());
            assert!(!after.is_writable());
        }
    }

    // Re-applying the resulting state is always legal.
    assert!(validate_property_descriptor(
        extensible,
        &PartialDescriptor::from(&after),
        Some(&after)
    ));
});
