//! Invariant validation for handler results.
//!
//! [`validate_property_descriptor`] decides whether a proposed descriptor is
//! a legal evolution of a property's current state.  It backs both ordinary
//! `[[DefineOwnProperty]]` and the proxy checks, so storage and proxies can
//! never disagree about what a legal change is.
//!
//! [`ProxyInvariantChecker`] holds one check per operation.  Each check is
//! pure: the caller re-reads target state after the trap returns and passes
//! the snapshot in.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::{PartialDescriptor, PropertyDescriptor};
use crate::object_model::{JsValue, ObjectHandle, PropertyKey};

// ---------------------------------------------------------------------------
// InvariantViolation
// ---------------------------------------------------------------------------

/// Named invariant a handler result broke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvariantViolation {
    MustReportSameValue,
    MustReportUndefined,
    CannotSetReadonly,
    CannotSetWithoutSetter,
    CannotDeleteNonConfigurable,
    CannotSkipNonConfigurable { key: PropertyKey },
    CannotReportNewKey { key: PropertyKey },
    CannotReportExistentAsNonExistent,
    CannotReportNonConfigurableAsNonExistent,
    CannotReportInvalid,
    CannotReportNonExistentAsNonConfigurable,
    CannotReportConfigurableAsNonConfigurable,
    CannotDefineNew,
    CannotDefineNonExistentAsNonConfigurable,
    CannotDefineInvalid,
    ExtensibilityMismatch,
    ReportedNonExtensible,
    PrototypeMismatch,
    CannotSetPrototype,
}

impl InvariantViolation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MustReportSameValue => "MustReportSameValue",
            Self::MustReportUndefined => "MustReportUndefined",
            Self::CannotSetReadonly => "CannotSetReadonly",
            Self::CannotSetWithoutSetter => "CannotSetWithoutSetter",
            Self::CannotDeleteNonConfigurable => "CannotDeleteNonConfigurable",
            Self::CannotSkipNonConfigurable { .. } => "CannotSkipNonConfigurable",
            Self::CannotReportNewKey { .. } => "CannotReportNewKey",
            Self::CannotReportExistentAsNonExistent => "CannotReportExistentAsNonExistent",
            Self::CannotReportNonConfigurableAsNonExistent => {
                "CannotReportNonConfigurableAsNonExistent"
            }
            Self::CannotReportInvalid => "CannotReportInvalid",
            Self::CannotReportNonExistentAsNonConfigurable => {
                "CannotReportNonExistentAsNonConfigurable"
            }
            Self::CannotReportConfigurableAsNonConfigurable => {
                "CannotReportConfigurableAsNonConfigurable"
            }
            Self::CannotDefineNew => "CannotDefineNew",
            Self::CannotDefineNonExistentAsNonConfigurable => {
                "CannotDefineNonExistentAsNonConfigurable"
            }
            Self::CannotDefineInvalid => "CannotDefineInvalid",
            Self::ExtensibilityMismatch => "ExtensibilityMismatch",
            Self::ReportedNonExtensible => "ReportedNonExtensible",
            Self::PrototypeMismatch => "PrototypeMismatch",
            Self::CannotSetPrototype => "CannotSetPrototype",
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MustReportSameValue => write!(f, "must report same value"),
            Self::MustReportUndefined => {
                write!(f, "must report undefined for accessor without getter")
            }
            Self::CannotSetReadonly => write!(
                f,
                "cannot successfully set a non-writable, non-configurable property"
            ),
            Self::CannotSetWithoutSetter => {
                write!(f, "cannot successfully set an accessor without a setter")
            }
            Self::CannotDeleteNonConfigurable => {
                write!(f, "cannot delete a non-configurable property")
            }
            Self::CannotSkipNonConfigurable { key } => {
                write!(f, "cannot skip non-configurable key {key}")
            }
            Self::CannotReportNewKey { key } => {
                write!(f, "cannot report new key {key} on non-extensible object")
            }
            Self::CannotReportExistentAsNonExistent => write!(
                f,
                "cannot report an existent property as non-existent on a non-extensible object"
            ),
            Self::CannotReportNonConfigurableAsNonExistent => {
                write!(f, "cannot report a non-configurable property as non-existent")
            }
            Self::CannotReportInvalid => write!(f, "cannot report an invalid property descriptor"),
            Self::CannotReportNonExistentAsNonConfigurable => {
                write!(f, "cannot report a non-existent property as non-configurable")
            }
            Self::CannotReportConfigurableAsNonConfigurable => {
                write!(f, "cannot report a configurable property as non-configurable")
            }
            Self::CannotDefineNew => {
                write!(f, "cannot define a new property on a non-extensible object")
            }
            Self::CannotDefineNonExistentAsNonConfigurable => {
                write!(f, "cannot define a non-existent property as non-configurable")
            }
            Self::CannotDefineInvalid => write!(f, "cannot define an invalid property descriptor"),
            Self::ExtensibilityMismatch => write!(f, "must report same extensibility as target"),
            Self::ReportedNonExtensible => {
                write!(f, "cannot report an extensible object as non-extensible")
            }
            Self::PrototypeMismatch => {
                write!(f, "must report same prototype for non-extensible object")
            }
            Self::CannotSetPrototype => {
                write!(f, "cannot change prototype of a non-extensible object")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

// ---------------------------------------------------------------------------
// validate_property_descriptor
// ---------------------------------------------------------------------------

/// Every field present in `desc` equals the same field of `current`.
fn describes_same(desc: &PartialDescriptor, current: &PropertyDescriptor) -> bool {
    let common = desc.enumerable.is_none_or(|e| e == current.is_enumerable())
        && desc
            .configurable
            .is_none_or(|c| c == current.is_configurable());
    if !common {
        return false;
    }
    match current {
        PropertyDescriptor::Data {
            value, writable, ..
        } => {
            desc.get.is_none()
                && desc.set.is_none()
                && desc.value.as_ref().is_none_or(|v| v.same_value(value))
                && desc.writable.is_none_or(|w| w == *writable)
        }
        PropertyDescriptor::Accessor { get, set, .. } => {
            desc.value.is_none()
                && desc.writable.is_none()
                && desc.get.is_none_or(|g| g == *get)
                && desc.set.is_none_or(|s| s == *set)
        }
    }
}

/// Is `desc` a legal change to a property whose current state is `current`
/// on an object whose extensibility is `extensible`?
///
/// Rules apply in order and the first that decides wins.
pub fn validate_property_descriptor(
    extensible: bool,
    desc: &PartialDescriptor,
    current: Option<&PropertyDescriptor>,
) -> bool {
    let Some(current) = current else {
        return extensible;
    };

    if desc.is_empty() || describes_same(desc, current) {
        return true;
    }

    if !current.is_configurable() {
        if desc.configurable == Some(true) {
            return false;
        }
        if let Some(enumerable) = desc.enumerable
            && enumerable != current.is_enumerable()
        {
            return false;
        }
    }

    if desc.is_generic() {
        return true;
    }

    if desc.is_data() != current.is_data() {
        return current.is_configurable();
    }

    match current {
        PropertyDescriptor::Data {
            value,
            writable,
            configurable,
            ..
        } => {
            if !configurable && !writable {
                if desc.writable == Some(true) {
                    return false;
                }
                if let Some(proposed) = &desc.value
                    && !proposed.same_value(value)
                {
                    return false;
                }
            }
            true
        }
        PropertyDescriptor::Accessor {
            get,
            set,
            configurable,
            ..
        } => {
            *configurable
                || (desc.get.is_none_or(|g| g == *get) && desc.set.is_none_or(|s| s == *set))
        }
    }
}

// ---------------------------------------------------------------------------
// ProxyInvariantChecker
// ---------------------------------------------------------------------------

/// Per-operation checks of a trap result against fresh target state.
pub struct ProxyInvariantChecker;

impl ProxyInvariantChecker {
    pub fn check_is_extensible(
        target_extensible: bool,
        reported: bool,
    ) -> Result<(), InvariantViolation> {
        if reported != target_extensible {
            return Err(InvariantViolation::ExtensibilityMismatch);
        }
        Ok(())
    }

    /// A `true` result requires the target to have become non-extensible.
    pub fn check_prevent_extensions(
        target_extensible: bool,
        reported: bool,
    ) -> Result<(), InvariantViolation> {
        if reported && target_extensible {
            return Err(InvariantViolation::ReportedNonExtensible);
        }
        Ok(())
    }

    pub fn check_get_prototype_of(
        target_extensible: bool,
        target_proto: Option<ObjectHandle>,
        reported: Option<ObjectHandle>,
    ) -> Result<(), InvariantViolation> {
        if !target_extensible && reported != target_proto {
            return Err(InvariantViolation::PrototypeMismatch);
        }
        Ok(())
    }

    pub fn check_set_prototype_of(
        target_extensible: bool,
        target_proto: Option<ObjectHandle>,
        requested: Option<ObjectHandle>,
        reported: bool,
    ) -> Result<(), InvariantViolation> {
        if reported && !target_extensible && requested != target_proto {
            return Err(InvariantViolation::CannotSetPrototype);
        }
        Ok(())
    }

    pub fn check_has(
        target_extensible: bool,
        target_desc: Option<&PropertyDescriptor>,
        reported: bool,
    ) -> Result<(), InvariantViolation> {
        if reported {
            return Ok(());
        }
        match target_desc {
            Some(td) if !td.is_configurable() => {
                Err(InvariantViolation::CannotReportNonConfigurableAsNonExistent)
            }
            Some(_) if !target_extensible => {
                Err(InvariantViolation::CannotReportExistentAsNonExistent)
            }
            _ => Ok(()),
        }
    }

    pub fn check_get(
        target_desc: Option<&PropertyDescriptor>,
        reported: &JsValue,
    ) -> Result<(), InvariantViolation> {
        match target_desc {
            Some(PropertyDescriptor::Data {
                value,
                writable: false,
                configurable: false,
                ..
            }) if !reported.same_value(value) => Err(InvariantViolation::MustReportSameValue),
            Some(PropertyDescriptor::Accessor {
                get: None,
                configurable: false,
                ..
            }) if !reported.is_undefined() => Err(InvariantViolation::MustReportUndefined),
            _ => Ok(()),
        }
    }

    pub fn check_set(
        target_desc: Option<&PropertyDescriptor>,
        value: &JsValue,
        reported: bool,
    ) -> Result<(), InvariantViolation> {
        if !reported {
            return Ok(());
        }
        match target_desc {
            Some(PropertyDescriptor::Data {
                value: current,
                writable: false,
                configurable: false,
                ..
            }) if !value.same_value(current) => Err(InvariantViolation::CannotSetReadonly),
            Some(PropertyDescriptor::Accessor {
                set: None,
                configurable: false,
                ..
            }) => Err(InvariantViolation::CannotSetWithoutSetter),
            _ => Ok(()),
        }
    }

    pub fn check_delete(
        target_desc: Option<&PropertyDescriptor>,
        reported: bool,
    ) -> Result<(), InvariantViolation> {
        match target_desc {
            Some(td) if reported && !td.is_configurable() => {
                Err(InvariantViolation::CannotDeleteNonConfigurable)
            }
            _ => Ok(()),
        }
    }

    pub fn check_define_property(
        target_extensible: bool,
        target_desc: Option<&PropertyDescriptor>,
        desc: &PartialDescriptor,
        reported: bool,
    ) -> Result<(), InvariantViolation> {
        if !reported {
            return Ok(());
        }
        let setting_non_configurable = desc.configurable == Some(false);
        match target_desc {
            None if !target_extensible => Err(InvariantViolation::CannotDefineNew),
            None if setting_non_configurable => {
                Err(InvariantViolation::CannotDefineNonExistentAsNonConfigurable)
            }
            None => Ok(()),
            Some(td) => {
                if !validate_property_descriptor(target_extensible, desc, Some(td))
                    || (setting_non_configurable && td.is_configurable())
                {
                    return Err(InvariantViolation::CannotDefineInvalid);
                }
                Ok(())
            }
        }
    }

    /// `reported` is the trap's descriptor after completion, or `None` for
    /// an `undefined` result.
    pub fn check_get_own_property_descriptor(
        target_extensible: bool,
        target_desc: Option<&PropertyDescriptor>,
        reported: Option<&PropertyDescriptor>,
    ) -> Result<(), InvariantViolation> {
        let Some(reported) = reported else {
            return match target_desc {
                None => Ok(()),
                Some(td) if !td.is_configurable() => {
                    Err(InvariantViolation::CannotReportNonConfigurableAsNonExistent)
                }
                Some(_) if !target_extensible => {
                    Err(InvariantViolation::CannotReportExistentAsNonExistent)
                }
                Some(_) => Ok(()),
            };
        };

        if !validate_property_descriptor(
            target_extensible,
            &PartialDescriptor::from(reported),
            target_desc,
        ) {
            return Err(InvariantViolation::CannotReportInvalid);
        }
        if !reported.is_configurable() {
            match target_desc {
                None => return Err(InvariantViolation::CannotReportNonExistentAsNonConfigurable),
                Some(td) if td.is_configurable() => {
                    return Err(InvariantViolation::CannotReportConfigurableAsNonConfigurable);
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Check one key of a reported list as it is read.  A non-extensible
    /// target may only report keys it owns.
    pub fn check_reported_key(
        target_extensible: bool,
        target_has_own: bool,
        key: &PropertyKey,
    ) -> Result<(), InvariantViolation> {
        if !target_extensible && !target_has_own {
            return Err(InvariantViolation::CannotReportNewKey { key: key.clone() });
        }
        Ok(())
    }

    /// Check a complete key list (ownKeys or enumerate) for omissions.
    ///
    /// `target_keys` are the target's own keys with their configurability.
    /// Each reported key has already passed `check_reported_key` and the
    /// duplicate check.
    pub fn check_key_list(
        target_extensible: bool,
        target_keys: &[(PropertyKey, bool)],
        reported: &[PropertyKey],
    ) -> Result<(), InvariantViolation> {
        let reported: BTreeSet<&PropertyKey> = reported.iter().collect();
        for (key, configurable) in target_keys {
            if reported.contains(key) {
                continue;
            }
            if !configurable {
                return Err(InvariantViolation::CannotSkipNonConfigurable { key: key.clone() });
            }
            if !target_extensible {
                return Err(InvariantViolation::CannotReportExistentAsNonExistent);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
