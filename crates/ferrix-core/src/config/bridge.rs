//! Event bridge configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Settings for the registration request/acknowledge layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound for a single handler invocation, in seconds.
    ///
    /// `None` (the default) means a handler may run forever and its
    /// completion message is only sent once it settles.
    #[validate(range(min = 1))]
    pub handler_timeout_seconds: Option<u64>,

    /// Answer existence checks with an HTTP `HEAD` request made by this
    /// process instead of sending `api-http-head` to the host.
    ///
    /// Only for hosts that do not implement `api-http-head`.
    pub local_http_head: bool,
}

impl BridgeConfig {
    /// Returns the handler bound as a `Duration`, if one is configured.
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_seconds.map(Duration::from_secs)
    }
}
