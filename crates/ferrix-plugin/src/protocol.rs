//! Messages exchanged with the download engine host.
//!
//! Outbound commands serialize as `{ "command": <name>, "payload": {...} }`.
//! Inbound deliveries are [`EventPayload`]s, routed by the host onto the
//! channel named after the target registration's id. Request-style
//! commands carry a `request_id` that the host echoes in a [`CommandReply`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ferrix_core::RegistryAction;

/// Identifies the action a delivery belongs to; doubles as the
/// acknowledgement token echoed back in the completion message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    /// Event name of the action.
    pub event: String,
    /// Host-assigned action id.
    pub id: String,
}

impl EventKey {
    /// Creates a new key.
    pub fn new(event: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            id: id.into(),
        }
    }
}

/// The only shape the host delivers to a registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// The intercepted action.
    pub action: RegistryAction,
    /// Acknowledgement token.
    pub key: EventKey,
}

/// Payload of `register-event` and `un-register-event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationCommand {
    pub event_name: String,
    pub event_id: String,
}

/// Payload of `event-job-completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionCommand {
    /// Key of the delivery being acknowledged.
    pub action_key: EventKey,
    /// Id of the acknowledging registration.
    pub event_id: String,
    /// Replacement action when the handler mutated the payload.
    pub muted_action: Option<RegistryAction>,
}

/// Payload of `api-http-head`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRequest {
    /// Correlates the host's [`CommandReply`] with this request.
    pub request_id: String,
    pub url: String,
}

/// Host answer to a request-style command.
///
/// Wire form: `{ "reply": <request_id>, "payload": <json> }`, or with an
/// `error` string instead of a payload when the host could not serve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    /// The `request_id` being answered.
    pub reply: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Commands sent to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "kebab-case")]
pub enum HostCommand {
    /// Start routing actions of `event_name` to channel `event_id`.
    RegisterEvent(RegistrationCommand),
    /// Stop routing to channel `event_id`.
    UnRegisterEvent(RegistrationCommand),
    /// A handler invocation has settled.
    EventJobCompleted(CompletionCommand),
    /// Raw one-way action, no acknowledgement tracked.
    Dispatch(RegistryAction),
    /// Asks the host whether a URL exists; answered with a boolean reply.
    ApiHttpHead(HeadRequest),
}

impl HostCommand {
    /// Returns the wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterEvent(_) => "register-event",
            Self::UnRegisterEvent(_) => "un-register-event",
            Self::EventJobCompleted(_) => "event-job-completed",
            Self::Dispatch(_) => "dispatch",
            Self::ApiHttpHead(_) => "api-http-head",
        }
    }
}
