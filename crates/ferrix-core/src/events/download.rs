//! Payloads of the first-party download actions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of `new-download`: a URL about to be submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDownload {
    /// Target URL. Batch expansion may replace it with several
    /// newline-separated URLs.
    pub url: String,
    /// Download options chosen in the form, kept as the engine sent them.
    /// See [`NewDownload::download_options`] for a typed view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// Fields this crate does not model, carried through mutation untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewDownload {
    /// Creates a payload with only a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: None,
            extra: Map::new(),
        }
    }

    /// Returns a copy of this payload pointing at a different URL.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    /// Typed view of `options`.
    ///
    /// Returns `None` when no options were sent or when they do not fit
    /// [`DownloadOptions`]; the raw value is forwarded either way.
    pub fn download_options(&self) -> Option<DownloadOptions> {
        self.options
            .as_ref()
            .and_then(|options| serde_json::from_value(options.clone()).ok())
    }
}

/// Per-download options forwarded to the transfer engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    /// Proxy settings; shape is owned by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Value>,
    /// Auth settings; shape is owned by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    /// Either a name/value map or a list of `{key, value}` pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Value>,
    /// Bytes per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    /// Options this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload addressing an existing download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRef {
    /// Engine-side download id.
    pub id: i64,
}

/// Payload of `remove-download`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveDownload {
    /// Engine-side download id.
    pub id: i64,
    /// Whether the downloaded file is deleted from disk too.
    #[serde(default)]
    pub remove_file: bool,
}
