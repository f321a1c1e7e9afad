//! Structured event log for proxy and membrane activity.
//!
//! Events are appended in order to an in-memory log owned by the runtime.
//! The log exports as JSON lines and has a deterministic digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::object_model::{ObjectHandle, PropertyKey};
use crate::operation::Operation;

pub const COMPONENT: &str = "proxy_membrane";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyEventType {
    InvariantViolation,
    Revoked,
    RevokedAccess,
    PermissionDenied,
    WrapperCreated,
    WrapperNuked,
    RecursionLimit,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyEventOutcome {
    Pass,
    Denied,
    Failed,
}

/// Structured proxy event with stable observability keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEvent {
    pub seq: u64,
    pub trace_id: String,
    pub component: String,
    pub event: ProxyEventType,
    pub outcome: ProxyEventOutcome,
    pub error_code: Option<String>,
    pub operation: Option<Operation>,
    pub key: Option<PropertyKey>,
    pub object: Option<ObjectHandle>,
    pub detail: Option<String>,
}

impl ProxyEvent {
    pub fn new(event: ProxyEventType, outcome: ProxyEventOutcome) -> Self {
        Self {
            seq: 0,
            trace_id: String::new(),
            component: COMPONENT.to_string(),
            event,
            outcome,
            error_code: None,
            operation: None,
            key: None,
            object: None,
            detail: None,
        }
    }

    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_key(mut self, key: Option<&PropertyKey>) -> Self {
        self.key = key.cloned();
        self
    }

    pub fn with_object(mut self, object: ObjectHandle) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Append-only event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyEventLog {
    trace_id: String,
    next_seq: u64,
    events: Vec<ProxyEvent>,
}

impl ProxyEventLog {
    pub fn new(trace_id: &str) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            next_seq: 0,
            events: Vec::new(),
        }
    }

    /// Stamp `event` with the log's trace id and next sequence number.
    pub fn record(&mut self, mut event: ProxyEvent) {
        event.seq = self.next_seq;
        event.trace_id.clone_from(&self.trace_id);
        self.next_seq += 1;
        self.events.push(event);
    }

    pub fn events(&self) -> &[ProxyEvent] {
        &self.events
    }

    /// Take all recorded events.  Sequence numbers keep counting.
    pub fn drain(&mut self) -> Vec<ProxyEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, event: ProxyEventType) -> usize {
        self.events.iter().filter(|e| e.event == event).count()
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut lines = Vec::with_capacity(self.events.len());
        for event in &self.events {
            lines.push(serde_json::to_string(event)?);
        }
        Ok(lines.join("\n"))
    }

    /// `sha256:<hex>` over the JSON-lines export.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let digest = Sha256::digest(self.to_jsonl()?.as_bytes());
        Ok(format!("sha256:{}", hex::encode(digest)))
    }
}
