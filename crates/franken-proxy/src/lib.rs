#![forbid(unsafe_code)]

//! Proxy interposition for the FrankenEngine object model.
//!
//! A proxy forwards each fundamental object operation to a handler.
//! Scripted handlers get their results checked against the target so a
//! proxy can never misreport non-configurable or non-extensible state.
//! Engine wrappers build on the same dispatch to form realm membranes:
//! cross-realm wrappers marshal values across a boundary, and security
//! wrappers consult an access policy before forwarding.

pub mod descriptor;
pub mod error;
pub mod events;
pub mod handler;
pub mod invariant;
pub mod object_model;
pub mod operation;
pub mod realm;
pub mod registry;
pub mod revocation;
pub mod runtime;
pub mod scripted;
pub mod wrapper;

pub use descriptor::{PartialDescriptor, PropertyDescriptor};
pub use error::{CallbackFailure, ProxyError, ProxyResult};
pub use events::{ProxyEvent, ProxyEventLog, ProxyEventOutcome, ProxyEventType};
pub use handler::{DirectHandler, HandlerFamily, ProxyHandler, WrapperFlags};
pub use invariant::{InvariantViolation, ProxyInvariantChecker, validate_property_descriptor};
pub use object_model::{JsValue, ObjectHandle, PropertyKey, SymbolId};
pub use operation::Operation;
pub use realm::{RealmId, RealmOptions};
pub use registry::{HandlerKind, PolicyHandle, PolicyRegistry, PolicyRegistryBuilder};
pub use revocation::{RevocableProxy, RevocationController};
pub use runtime::{Runtime, RuntimeConfig};
pub use scripted::ScriptedHandler;
pub use wrapper::{
    AccessPolicy, AllowList, CrossRealmWrapper, DenyAll, DenyMutations, SecurityWrapper, Wrapper,
    checked_unwrap, unchecked_unwrap, unwrap_one_checked,
};
