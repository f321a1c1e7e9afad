//! Property descriptors, complete and partial.
//!
//! A [`PropertyDescriptor`] always carries every attribute; it is what
//! storage holds and what `[[GetOwnProperty]]` reports.  A
//! [`PartialDescriptor`] carries only the fields a caller supplied; absent
//! fields mean "leave unchanged" when applied to an existing property.

use serde::{Deserialize, Serialize};

use crate::object_model::{JsValue, ObjectHandle};

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

/// ES2020 property descriptor (§6.2.5), fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyDescriptor {
    /// Data descriptor: has `value` and `writable`.
    Data {
        value: JsValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    /// Accessor descriptor: has `get` and/or `set`.
    Accessor {
        get: Option<ObjectHandle>,
        set: Option<ObjectHandle>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// Writable, enumerable, configurable data descriptor.
    pub fn data(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable data descriptor.
    pub fn data_frozen(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }

    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Data descriptor with writable=true.
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { writable, .. } => *writable,
            Self::Accessor { .. } => false,
        }
    }

    pub fn getter(&self) -> Option<ObjectHandle> {
        match self {
            Self::Accessor { get, .. } => *get,
            Self::Data { .. } => None,
        }
    }

    pub fn setter(&self) -> Option<ObjectHandle> {
        match self {
            Self::Accessor { set, .. } => *set,
            Self::Data { .. } => None,
        }
    }

    /// Non-configurable and, for data properties, non-writable.
    pub fn is_frozen(&self) -> bool {
        !self.is_configurable() && !self.is_writable()
    }
}

// ---------------------------------------------------------------------------
// PartialDescriptor
// ---------------------------------------------------------------------------

/// A property descriptor whose fields may each be absent.
///
/// `get`/`set` are doubly optional: `None` means the field was not
/// supplied, `Some(None)` means it was supplied as `undefined`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<Option<ObjectHandle>>,
    pub set: Option<Option<ObjectHandle>>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PartialDescriptor {
    /// Descriptor with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `{ value }` and nothing else.
    pub fn value(value: JsValue) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// `{ get, set }` and nothing else.
    pub fn accessor(get: Option<ObjectHandle>, set: Option<ObjectHandle>) -> Self {
        Self {
            get: Some(get),
            set: Some(set),
            ..Self::default()
        }
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }

    pub fn with_enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = Some(enumerable);
        self
    }

    pub fn with_configurable(mut self, configurable: bool) -> Self {
        self.configurable = Some(configurable);
        self
    }

    /// No field present at all.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.writable.is_none()
            && self.get.is_none()
            && self.set.is_none()
            && self.enumerable.is_none()
            && self.configurable.is_none()
    }

    /// IsDataDescriptor (§6.2.5.2).
    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    /// IsAccessorDescriptor (§6.2.5.1).
    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// IsGenericDescriptor (§6.2.5.3).
    pub fn is_generic(&self) -> bool {
        !self.is_data() && !self.is_accessor()
    }

    /// CompletePropertyDescriptor (§6.2.5.6): absent fields take defaults.
    pub fn complete(self) -> PropertyDescriptor {
        let enumerable = self.enumerable.unwrap_or(false);
        let configurable = self.configurable.unwrap_or(false);
        if self.is_accessor() {
            PropertyDescriptor::Accessor {
                get: self.get.flatten(),
                set: self.set.flatten(),
                enumerable,
                configurable,
            }
        } else {
            PropertyDescriptor::Data {
                value: self.value.unwrap_or(JsValue::Undefined),
                writable: self.writable.unwrap_or(false),
                enumerable,
                configurable,
            }
        }
    }

    /// Overlay the supplied fields onto `current`.
    ///
    /// Switching between data and accessor keeps `enumerable` and
    /// `configurable` and resets the kind-specific fields to their defaults.
    pub fn apply_to(&self, current: &PropertyDescriptor) -> PropertyDescriptor {
        let enumerable = self.enumerable.unwrap_or(current.is_enumerable());
        let configurable = self.configurable.unwrap_or(current.is_configurable());
        match current {
            PropertyDescriptor::Data {
                value, writable, ..
            } if !self.is_accessor() => PropertyDescriptor::Data {
                value: self.value.clone().unwrap_or_else(|| value.clone()),
                writable: self.writable.unwrap_or(*writable),
                enumerable,
                configurable,
            },
            PropertyDescriptor::Accessor { get, set, .. } if !self.is_data() => {
                PropertyDescriptor::Accessor {
                    get: self.get.unwrap_or(*get),
                    set: self.set.unwrap_or(*set),
                    enumerable,
                    configurable,
                }
            }
            PropertyDescriptor::Data { .. } => PropertyDescriptor::Accessor {
                get: self.get.flatten(),
                set: self.set.flatten(),
                enumerable,
                configurable,
            },
            PropertyDescriptor::Accessor { .. } => PropertyDescriptor::Data {
                value: self.value.clone().unwrap_or(JsValue::Undefined),
                writable: self.writable.unwrap_or(false),
                enumerable,
                configurable,
            },
        }
    }
}

impl From<PropertyDescriptor> for PartialDescriptor {
    fn from(desc: PropertyDescriptor) -> Self {
        match desc {
            PropertyDescriptor::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => Self {
                value: Some(value),
                writable: Some(writable),
                get: None,
                set: None,
                enumerable: Some(enumerable),
                configurable: Some(configurable),
            },
            PropertyDescriptor::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => Self {
                value: None,
                writable: None,
                get: Some(get),
                set: Some(set),
                enumerable: Some(enumerable),
                configurable: Some(configurable),
            },
        }
    }
}

impl From<&PropertyDescriptor> for PartialDescriptor {
    fn from(desc: &PropertyDescriptor) -> Self {
        Self::from(desc.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_descriptor_defaults() {
        let d = PropertyDescriptor::data(JsValue::Int(42));
        assert!(d.is_data());
        assert!(d.is_configurable());
        assert!(d.is_enumerable());
        assert!(d.is_writable());
        assert!(!d.is_frozen());
        assert_eq!(d.value(), Some(&JsValue::Int(42)));
    }

    #[test]
    fn accessor_descriptor_has_no_value() {
        let d = PropertyDescriptor::Accessor {
            get: Some(ObjectHandle(1)),
            set: None,
            enumerable: true,
            configurable: false,
        };
        assert!(d.is_accessor());
        assert!(!d.is_writable());
        assert_eq!(d.value(), None);
        assert_eq!(d.getter(), Some(ObjectHandle(1)));
        assert_eq!(d.setter(), None);
        assert!(d.is_frozen());
    }

    #[test]
    fn partial_classification() {
        assert!(PartialDescriptor::empty().is_empty());
        assert!(PartialDescriptor::empty().is_generic());
        assert!(PartialDescriptor::empty().with_enumerable(true).is_generic());
        assert!(PartialDescriptor::value(JsValue::Null).is_data());
        assert!(PartialDescriptor::empty().with_writable(false).is_data());
        assert!(PartialDescriptor::accessor(None, None).is_accessor());
    }

    #[test]
    fn complete_fills_defaults() {
        let d = PartialDescriptor::empty().with_enumerable(true).complete();
        assert_eq!(
            d,
            PropertyDescriptor::Data {
                value: JsValue::Undefined,
                writable: false,
                enumerable: true,
                configurable: false,
            }
        );
        let a = PartialDescriptor::accessor(Some(ObjectHandle(2)), None).complete();
        assert_eq!(a.getter(), Some(ObjectHandle(2)));
        assert!(!a.is_configurable());
    }

    #[test]
    fn apply_keeps_unmentioned_fields() {
        let current = PropertyDescriptor::data(JsValue::Int(1));
        let next = PartialDescriptor::value(JsValue::Int(2)).apply_to(&current);
        assert_eq!(next, PropertyDescriptor::data(JsValue::Int(2)));

        let next = PartialDescriptor::empty()
            .with_configurable(false)
            .apply_to(&current);
        assert!(!next.is_configurable());
        assert_eq!(next.value(), Some(&JsValue::Int(1)));
    }

    #[test]
    fn apply_switches_kind() {
        let current = PropertyDescriptor::data(JsValue::Int(1));
        let next = PartialDescriptor::accessor(Some(ObjectHandle(5)), None).apply_to(&current);
        assert_eq!(
            next,
            PropertyDescriptor::Accessor {
                get: Some(ObjectHandle(5)),
                set: None,
                enumerable: true,
                configurable: true,
            }
        );
        let back = PartialDescriptor::empty().with_writable(true).apply_to(&next);
        assert_eq!(
            back,
            PropertyDescriptor::Data {
                value: JsValue::Undefined,
                writable: true,
                enumerable: true,
                configurable: true,
            }
        );
    }

    #[test]
    fn partial_from_complete_sets_every_field() {
        let partial = PartialDescriptor::from(PropertyDescriptor::data_frozen(JsValue::Int(3)));
        assert_eq!(partial.value, Some(JsValue::Int(3)));
        assert_eq!(partial.writable, Some(false));
        assert_eq!(partial.enumerable, Some(false));
        assert_eq!(partial.configurable, Some(false));
        assert!(partial.get.is_none() && partial.set.is_none());
    }
}
