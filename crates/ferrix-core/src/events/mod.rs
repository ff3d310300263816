//! Registry actions exchanged with the download engine host.
//!
//! On the wire every action is `{ "event": <name>, "payload": <json> }`.
//! Events the engine itself defines are decoded into typed variants; any
//! other event name (or a first-party event with an unexpected payload)
//! is kept verbatim in [`RegistryAction::Custom`].

pub mod download;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub use download::{DownloadOptions, DownloadRef, NewDownload, RemoveDownload};

/// Event names of the first-party actions.
pub mod names {
    pub const NEW_DOWNLOAD: &str = "new-download";
    pub const PAUSE_DOWNLOAD: &str = "pause-download";
    pub const RESUME_DOWNLOAD: &str = "resume-download";
    pub const REMOVE_DOWNLOAD: &str = "remove-download";
    pub const RECOVER_DOWNLOADS: &str = "recover-downloads";
    pub const CLOSE_REQUESTED: &str = "close-requested";
}

/// An action flowing through the host registry, keyed by event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAction", into = "RawAction")]
pub enum RegistryAction {
    /// A download is about to be created.
    NewDownload(NewDownload),
    /// A running download is being paused.
    PauseDownload(DownloadRef),
    /// A paused download is being resumed.
    ResumeDownload(DownloadRef),
    /// A download is being removed.
    RemoveDownload(RemoveDownload),
    /// The engine is restoring unfinished downloads.
    RecoverDownloads,
    /// The application window is closing.
    CloseRequested,
    /// Any event not modelled above.
    Custom {
        /// Event name.
        event: String,
        /// Opaque payload.
        payload: Value,
    },
}

impl RegistryAction {
    /// Builds an action from its wire parts, typing it when the event is known.
    pub fn from_parts(event: impl Into<String>, payload: Value) -> Self {
        RawAction {
            event: event.into(),
            payload,
        }
        .into()
    }

    /// Returns the event name this action is keyed by.
    pub fn event_name(&self) -> &str {
        match self {
            Self::NewDownload(_) => names::NEW_DOWNLOAD,
            Self::PauseDownload(_) => names::PAUSE_DOWNLOAD,
            Self::ResumeDownload(_) => names::RESUME_DOWNLOAD,
            Self::RemoveDownload(_) => names::REMOVE_DOWNLOAD,
            Self::RecoverDownloads => names::RECOVER_DOWNLOADS,
            Self::CloseRequested => names::CLOSE_REQUESTED,
            Self::Custom { event, .. } => event,
        }
    }

    /// Returns the payload as plain JSON.
    pub fn payload(&self) -> Value {
        RawAction::from(self.clone()).payload
    }

    /// Splits the action into its event name and JSON payload.
    pub fn into_parts(self) -> (String, Value) {
        let raw = RawAction::from(self);
        (raw.event, raw.payload)
    }
}

/// Untyped wire form of a [`RegistryAction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAction {
    event: String,
    #[serde(default)]
    payload: Value,
}

impl From<RawAction> for RegistryAction {
    fn from(raw: RawAction) -> Self {
        match raw.event.as_str() {
            names::NEW_DOWNLOAD => typed(raw, Self::NewDownload),
            names::PAUSE_DOWNLOAD => typed(raw, Self::PauseDownload),
            names::RESUME_DOWNLOAD => typed(raw, Self::ResumeDownload),
            names::REMOVE_DOWNLOAD => typed(raw, Self::RemoveDownload),
            names::RECOVER_DOWNLOADS => Self::RecoverDownloads,
            names::CLOSE_REQUESTED => Self::CloseRequested,
            _ => Self::Custom {
                event: raw.event,
                payload: raw.payload,
            },
        }
    }
}

impl From<RegistryAction> for RawAction {
    fn from(action: RegistryAction) -> Self {
        let event = action.event_name().to_string();
        let payload = match action {
            RegistryAction::NewDownload(p) => to_json(&p),
            RegistryAction::PauseDownload(p) | RegistryAction::ResumeDownload(p) => to_json(&p),
            RegistryAction::RemoveDownload(p) => to_json(&p),
            RegistryAction::RecoverDownloads | RegistryAction::CloseRequested => Value::Null,
            RegistryAction::Custom { payload, .. } => payload,
        };
        Self { event, payload }
    }
}

fn typed<T, F>(raw: RawAction, wrap: F) -> RegistryAction
where
    T: DeserializeOwned,
    F: FnOnce(T) -> RegistryAction,
{
    match serde_json::from_value::<T>(raw.payload.clone()) {
        Ok(payload) => wrap(payload),
        Err(e) => {
            warn!(
                event = %raw.event,
                error = %e,
                "Payload does not match the known shape, keeping it opaque"
            );
            RegistryAction::Custom {
                event: raw.event,
                payload: raw.payload,
            }
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
