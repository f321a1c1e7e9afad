//! The fixed set of fundamental operations a handler may intercept.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operation {
    GetOwnPropertyDescriptor,
    DefineProperty,
    Has,
    Get,
    Set,
    DeleteProperty,
    OwnKeys,
    Enumerate,
    IsExtensible,
    PreventExtensions,
    GetPrototypeOf,
    SetPrototypeOf,
    Call,
    Construct,
    Watch,
    Unwatch,
}

impl Operation {
    pub const ALL: [Operation; 16] = [
        Self::GetOwnPropertyDescriptor,
        Self::DefineProperty,
        Self::Has,
        Self::Get,
        Self::Set,
        Self::DeleteProperty,
        Self::OwnKeys,
        Self::Enumerate,
        Self::IsExtensible,
        Self::PreventExtensions,
        Self::GetPrototypeOf,
        Self::SetPrototypeOf,
        Self::Call,
        Self::Construct,
        Self::Watch,
        Self::Unwatch,
    ];

    /// Name of the handler property holding the trap for this operation.
    pub fn trap_name(self) -> &'static str {
        match self {
            Self::Call => "apply",
            other => other.as_str(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetOwnPropertyDescriptor => "getOwnPropertyDescriptor",
            Self::DefineProperty => "defineProperty",
            Self::Has => "has",
            Self::Get => "get",
            Self::Set => "set",
            Self::DeleteProperty => "deleteProperty",
            Self::OwnKeys => "ownKeys",
            Self::Enumerate => "enumerate",
            Self::IsExtensible => "isExtensible",
            Self::PreventExtensions => "preventExtensions",
            Self::GetPrototypeOf => "getPrototypeOf",
            Self::SetPrototypeOf => "setPrototypeOf",
            Self::Call => "call",
            Self::Construct => "construct",
            Self::Watch => "watch",
            Self::Unwatch => "unwatch",
        }
    }

    /// Operations a security wrapper denies unless its policy approves them.
    pub fn is_restricted(self) -> bool {
        matches!(
            self,
            Self::DefineProperty
                | Self::PreventExtensions
                | Self::SetPrototypeOf
                | Self::Watch
                | Self::Unwatch
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn call_trap_is_named_apply() {
        assert_eq!(Operation::Call.trap_name(), "apply");
        assert_eq!(Operation::Call.as_str(), "call");
        assert_eq!(Operation::Get.trap_name(), "get");
    }

    #[test]
    fn trap_names_are_unique() {
        let names: BTreeSet<&str> = Operation::ALL.iter().map(|op| op.trap_name()).collect();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn restricted_set() {
        let restricted: Vec<Operation> = Operation::ALL
            .into_iter()
            .filter(|op| op.is_restricted())
            .collect();
        assert_eq!(
            restricted,
            vec![
                Operation::DefineProperty,
                Operation::PreventExtensions,
                Operation::SetPrototypeOf,
                Operation::Watch,
                Operation::Unwatch,
            ]
        );
    }

    #[test]
    fn serde_round_trip() {
        for op in Operation::ALL {
            let json = serde_json::to_string(&op).unwrap();
            let back: Operation = serde_json::from_str(&json).unwrap();
            assert_eq!(op, back);
        }
    }
}
