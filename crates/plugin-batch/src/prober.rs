//! Existence probing of batch candidates.
//!
//! Every candidate is checked with a host `head` request. Checks run with
//! at most `concurrency` requests in flight, but results are consumed
//! strictly in index order, so the returned URLs are always ascending.
//!
//! Open-ended (wildcard) probes consume results in groups of `concurrency`
//! and only look at the miss streak at the end of a group, so a hit
//! anywhere in a group is kept. Checks keep flowing across group
//! boundaries; a slow check never holds back the ones after it.

use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use ferrix_core::config::ProberConfig;
use ferrix_plugin::HostBridge;

use crate::pattern::{BatchPattern, PatternKind};

/// Existing candidate URLs in ascending index order.
pub type ProbeResult = Vec<String>;

/// Discovers which URLs of a [`BatchPattern`] exist.
#[derive(Debug, Clone)]
pub struct Prober {
    host: Arc<dyn HostBridge>,
    config: ProberConfig,
}

impl Prober {
    /// Creates a prober that checks URLs through `host`.
    ///
    /// A `concurrency` of zero is raised to one.
    pub fn new(host: Arc<dyn HostBridge>, mut config: ProberConfig) -> Self {
        if config.concurrency == 0 {
            warn!("Prober concurrency of 0 raised to 1");
            config.concurrency = 1;
        }
        Self { host, config }
    }

    /// Returns every existing candidate URL, in ascending index order.
    pub async fn probe(&self, pattern: &BatchPattern) -> ProbeResult {
        let found = match pattern.kind {
            PatternKind::Range => self.probe_range(pattern).await,
            PatternKind::Sequential => {
                let found = self.probe_sequential(pattern).await;
                if found.is_empty() && self.config.zero_fallback && pattern.start != 0 {
                    debug!(prefix = %pattern.prefix, "Nothing found from index 1, retrying from 0");
                    self.probe_sequential(&pattern.starting_at(0)).await
                } else {
                    found
                }
            }
        };

        info!(
            prefix = %pattern.prefix,
            suffix = %pattern.suffix,
            kind = ?pattern.kind,
            found = found.len(),
            "Batch probe finished"
        );

        found
    }

    async fn probe_range(&self, pattern: &BatchPattern) -> Vec<String> {
        let end = pattern.end.unwrap_or(pattern.start);

        self.checks(pattern, pattern.start..=end)
            .filter_map(|(url, exists)| futures::future::ready(exists.then_some(url)))
            .collect()
            .await
    }

    /// Walks forward until a group of results ends with the miss streak at
    /// `miss_streak_limit`, or past the index ceiling.
    async fn probe_sequential(&self, pattern: &BatchPattern) -> Vec<String> {
        let indices = pattern.start..=self.config.index_ceiling;
        let mut groups =
            std::pin::pin!(self.checks(pattern, indices).chunks(self.config.concurrency));
        let mut found = Vec::new();
        let mut misses = 0u32;

        while let Some(group) = groups.next().await {
            for (url, exists) in group {
                if exists {
                    misses = 0;
                    found.push(url);
                } else {
                    misses += 1;
                }
            }

            if misses >= self.config.miss_streak_limit {
                debug!(prefix = %pattern.prefix, misses, "Miss streak reached");
                break;
            }
        }

        found
    }

    /// Ordered stream of `(url, exists)` for `indices`.
    fn checks<'a, I>(
        &'a self,
        pattern: &'a BatchPattern,
        indices: I,
    ) -> impl Stream<Item = (String, bool)> + 'a
    where
        I: Iterator<Item = u64> + 'a,
    {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));

        stream::iter(indices)
            .map(move |index| {
                let url = pattern.url_for(index);
                let permits = Arc::clone(&permits);
                async move {
                    let exists = match permits.acquire().await {
                        Ok(_permit) => self.check(&url).await,
                        Err(_) => false,
                    };
                    (url, exists)
                }
            })
            .buffered(self.config.concurrency * 2)
    }

    async fn check(&self, url: &str) -> bool {
        match self.host.head(url).await {
            Ok(exists) => {
                debug!(url = %url, exists, "Probed candidate");
                exists
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Probe failed, treating as missing");
                false
            }
        }
    }
}
