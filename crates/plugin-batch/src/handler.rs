//! `new-download` handler that expands batch URLs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use ferrix_core::{AppResult, RegistryAction};
use ferrix_plugin::{EventHandler, EventRegistration};

use crate::pattern;
use crate::prober::Prober;

/// Replaces a batch URL with the newline-joined list of URLs that exist.
#[derive(Debug)]
pub struct BatchExpansionHandler {
    prober: Prober,
}

impl BatchExpansionHandler {
    /// Creates a handler probing with `prober`.
    pub fn new(prober: Prober) -> Self {
        Self { prober }
    }
}

#[async_trait]
impl EventHandler for BatchExpansionHandler {
    async fn handle(
        &self,
        registration: Arc<EventRegistration>,
        action: RegistryAction,
    ) -> AppResult<()> {
        let download = match action {
            RegistryAction::NewDownload(download) => download,
            other => {
                debug!(event = %other.event_name(), "Payload has no usable url, skipping");
                return Ok(());
            }
        };

        let url = download.url.trim();
        if !pattern::is_batchable(url) {
            return Ok(());
        }

        let Some(pattern) = pattern::parse(url) else {
            debug!(url = %url, "URL looks batchable but does not parse");
            return Ok(());
        };

        let urls = self.prober.probe(&pattern).await;
        if urls.is_empty() {
            debug!(url = %url, "No batch candidates exist, leaving download untouched");
            return Ok(());
        }

        debug!(url = %url, expanded = urls.len(), "Expanding batch URL");
        registration.mutate(&download.with_url(urls.join("\n")));

        Ok(())
    }
}
