//! Error taxonomy for proxy and wrapper operations.
//!
//! Every variant surfaces synchronously to the immediate caller.  Nothing
//! here is retried or swallowed; a callback's own failure is carried as
//! [`CallbackFailure`] without being re-wrapped.

use serde::{Deserialize, Serialize};

use crate::invariant::InvariantViolation;
use crate::object_model::{JsValue, ObjectHandle, PropertyKey};
use crate::operation::Operation;
use crate::realm::RealmId;
use crate::registry::PolicyHandle;

pub type ProxyResult<T> = Result<T, ProxyError>;

/// How a callback (trap, getter, native function) failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CallbackFailure {
    #[error("uncaught exception: {0}")]
    Thrown(JsValue),
    #[error("interrupted")]
    Interrupted,
}

fn key_suffix(key: &Option<PropertyKey>) -> String {
    match key {
        Some(k) => format!(" for key '{k}'"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ProxyError {
    #[error("TypeError: {proxy} has been revoked")]
    RevokedProxy { proxy: ObjectHandle },
    #[error("TypeError: {operation} trap returned invalid result{}: {detail}", key_suffix(.key))]
    InvalidTrapResult {
        operation: Operation,
        key: Option<PropertyKey>,
        detail: String,
    },
    #[error("TypeError: proxy {operation}{}: {violation}", key_suffix(.key))]
    InvariantViolation {
        operation: Operation,
        key: Option<PropertyKey>,
        violation: InvariantViolation,
    },
    #[error(transparent)]
    CallbackFailure(CallbackFailure),
    #[error("permission denied to {operation}{}", key_suffix(.key))]
    PermissionDenied {
        operation: Operation,
        key: Option<PropertyKey>,
    },
    #[error("permission denied to unwrap {wrapper}")]
    UnwrapDenied { wrapper: ObjectHandle },
    #[error("InternalError: too much recursion (depth {depth}, max {max})")]
    TooMuchRecursion { depth: u32, max: u32 },
    #[error("TypeError: {operation} trap is not callable")]
    TrapNotCallable { operation: Operation },
    #[error("TypeError: construct trap returned non-object {}", .result.type_name())]
    ConstructResultNotObject { result: JsValue },
    #[error("{handle} not found")]
    ObjectNotFound { handle: ObjectHandle },
    #[error("{handle} is not a proxy")]
    NotAProxy { handle: ObjectHandle },
    #[error("TypeError: {callee} is not a function")]
    NotCallable { callee: JsValue },
    #[error("TypeError: {callee} is not a constructor")]
    NotConstructor { callee: JsValue },
    #[error("TypeError: prototype chain cycle detected")]
    PrototypeCycle,
    #[error("TypeError: prototype chain depth {depth} exceeds max {max}")]
    PrototypeChainTooDeep { depth: u32, max: u32 },
    #[error("unknown handler policy {handle:?}")]
    UnknownPolicy { handle: PolicyHandle },
    #[error("unknown realm {realm:?}")]
    UnknownRealm { realm: RealmId },
    #[error("TypeError: {0}")]
    TypeError(String),
}

impl ProxyError {
    /// A script-level exception carrying `value`.
    pub fn thrown(value: JsValue) -> Self {
        Self::CallbackFailure(CallbackFailure::Thrown(value))
    }

    pub fn invariant(
        operation: Operation,
        key: Option<&PropertyKey>,
        violation: InvariantViolation,
    ) -> Self {
        Self::InvariantViolation {
            operation,
            key: key.cloned(),
            violation,
        }
    }

    pub fn invalid_trap_result(
        operation: Operation,
        key: Option<&PropertyKey>,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidTrapResult {
            operation,
            key: key.cloned(),
            detail: detail.into(),
        }
    }

    /// The violated invariant, if this is an invariant failure.
    pub fn violation(&self) -> Option<&InvariantViolation> {
        match self {
            Self::InvariantViolation { violation, .. } => Some(violation),
            _ => None,
        }
    }

    /// Stable error code for structured logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RevokedProxy { .. } => "FE-PROXY-0001",
            Self::InvalidTrapResult { .. } => "FE-PROXY-0002",
            Self::InvariantViolation { .. } => "FE-PROXY-0003",
            Self::CallbackFailure(CallbackFailure::Thrown(_)) => "FE-PROXY-0004",
            Self::CallbackFailure(CallbackFailure::Interrupted) => "FE-PROXY-0005",
            Self::PermissionDenied { .. } => "FE-PROXY-0006",
            Self::UnwrapDenied { .. } => "FE-PROXY-0007",
            Self::TooMuchRecursion { .. } => "FE-PROXY-0008",
            Self::TrapNotCallable { .. } => "FE-PROXY-0009",
            Self::ConstructResultNotObject { .. } => "FE-PROXY-0010",
            Self::ObjectNotFound { .. } => "FE-PROXY-0011",
            Self::NotAProxy { .. } => "FE-PROXY-0012",
            Self::NotCallable { .. } => "FE-PROXY-0013",
            Self::NotConstructor { .. } => "FE-PROXY-0014",
            Self::PrototypeCycle => "FE-PROXY-0015",
            Self::PrototypeChainTooDeep { .. } => "FE-PROXY-0016",
            Self::UnknownPolicy { .. } => "FE-PROXY-0017",
            Self::UnknownRealm { .. } => "FE-PROXY-0018",
            Self::TypeError(_) => "FE-PROXY-0019",
        }
    }
}

impl From<CallbackFailure> for ProxyError {
    fn from(failure: CallbackFailure) -> Self {
        Self::CallbackFailure(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_message_is_preserved() {
        let err = ProxyError::invariant(
            Operation::Get,
            Some(&PropertyKey::from("x")),
            InvariantViolation::MustReportSameValue,
        );
        assert_eq!(
            err.to_string(),
            "TypeError: proxy get for key 'x': must report same value"
        );
        assert_eq!(err.violation(), Some(&InvariantViolation::MustReportSameValue));
        assert_eq!(err.error_code(), "FE-PROXY-0003");
    }

    #[test]
    fn callback_failure_is_transparent() {
        let err = ProxyError::thrown(JsValue::Str("boom".to_string()));
        assert_eq!(err.to_string(), "uncaught exception: boom");
        assert_eq!(
            ProxyError::from(CallbackFailure::Interrupted).error_code(),
            "FE-PROXY-0005"
        );
    }

    #[test]
    fn revoked_and_permission_display() {
        assert_eq!(
            ProxyError::RevokedProxy {
                proxy: ObjectHandle(4)
            }
            .to_string(),
            "TypeError: object#4 has been revoked"
        );
        assert_eq!(
            ProxyError::PermissionDenied {
                operation: Operation::DefineProperty,
                key: None,
            }
            .to_string(),
            "permission denied to defineProperty"
        );
    }

    #[test]
    fn error_codes_are_unique() {
        let samples = vec![
            ProxyError::RevokedProxy {
                proxy: ObjectHandle(2),
            },
            ProxyError::invalid_trap_result(Operation::OwnKeys, None, "x"),
            ProxyError::invariant(Operation::Has, None, InvariantViolation::ExtensibilityMismatch),
            ProxyError::thrown(JsValue::Undefined),
            ProxyError::CallbackFailure(CallbackFailure::Interrupted),
            ProxyError::PermissionDenied {
                operation: Operation::Watch,
                key: None,
            },
            ProxyError::UnwrapDenied {
                wrapper: ObjectHandle(1),
            },
            ProxyError::TooMuchRecursion { depth: 2, max: 1 },
            ProxyError::TrapNotCallable {
                operation: Operation::Get,
            },
            ProxyError::ConstructResultNotObject {
                result: JsValue::Int(1),
            },
            ProxyError::ObjectNotFound {
                handle: ObjectHandle(0),
            },
            ProxyError::NotAProxy {
                handle: ObjectHandle(0),
            },
            ProxyError::NotCallable {
                callee: JsValue::Null,
            },
            ProxyError::NotConstructor {
                callee: JsValue::Null,
            },
            ProxyError::PrototypeCycle,
            ProxyError::PrototypeChainTooDeep { depth: 3, max: 2 },
            ProxyError::UnknownPolicy {
                handle: PolicyHandle(77),
            },
            ProxyError::UnknownRealm { realm: RealmId(9) },
            ProxyError::TypeError("t".to_string()),
        ];
        let codes: std::collections::BTreeSet<&str> =
            samples.iter().map(ProxyError::error_code).collect();
        assert_eq!(codes.len(), samples.len());
        assert!(codes.iter().all(|c| c.starts_with("FE-PROXY-")));
    }

    #[test]
    fn serde_round_trip() {
        let err = ProxyError::invariant(
            Operation::OwnKeys,
            Some(&PropertyKey::from("a")),
            InvariantViolation::CannotSkipNonConfigurable {
                key: PropertyKey::from("a"),
            },
        );
        let json = serde_json::to_string(&err).unwrap();
        let back: ProxyError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
