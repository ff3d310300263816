//! In-process host used by tests and local tooling.
//!
//! Records every outbound command, routes deliveries onto registration
//! channels, and answers `head` checks from a configured set of URLs.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

use ferrix_core::{AppError, AppResult, RegistryAction};

use super::{DeliveryReceiver, HostBridge};
use crate::protocol::{CompletionCommand, EventKey, EventPayload, HostCommand};

/// Host double that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryHost {
    commands: Mutex<Vec<HostCommand>>,
    channels: Mutex<HashMap<String, mpsc::UnboundedSender<EventPayload>>>,
    existing: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    latency: Mutex<HashMap<String, Duration>>,
    head_calls: Mutex<Vec<String>>,
    changed: Notify,
}

impl MemoryHost {
    /// Creates an empty host where no URL exists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a host where exactly `urls` exist.
    pub fn with_existing<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = Self::new();
        for url in urls {
            host.add_existing(url);
        }
        host
    }

    /// Marks `url` as existing.
    pub fn add_existing(&self, url: impl Into<String>) {
        lock(&self.existing).insert(url.into());
    }

    /// Makes every `head` check of `url` fail with a host error.
    pub fn add_failing(&self, url: impl Into<String>) {
        lock(&self.failing).insert(url.into());
    }

    /// Delays every `head` check of `url`.
    pub fn set_latency(&self, url: impl Into<String>, delay: Duration) {
        lock(&self.latency).insert(url.into(), delay);
    }

    /// All commands received so far, in order.
    pub fn commands(&self) -> Vec<HostCommand> {
        lock(&self.commands).clone()
    }

    /// All completion messages received so far, in order.
    pub fn completions(&self) -> Vec<CompletionCommand> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                HostCommand::EventJobCompleted(completion) => Some(completion),
                _ => None,
            })
            .collect()
    }

    /// All raw dispatched actions, in order.
    pub fn dispatched(&self) -> Vec<RegistryAction> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                HostCommand::Dispatch(action) => Some(action),
                _ => None,
            })
            .collect()
    }

    /// Number of `register-event` commands carrying `event_id`.
    pub fn register_count(&self, event_id: &str) -> usize {
        lock(&self.commands)
            .iter()
            .filter(|c| matches!(c, HostCommand::RegisterEvent(r) if r.event_id == event_id))
            .count()
    }

    /// Number of `un-register-event` commands carrying `event_id`.
    pub fn unregister_count(&self, event_id: &str) -> usize {
        lock(&self.commands)
            .iter()
            .filter(|c| matches!(c, HostCommand::UnRegisterEvent(r) if r.event_id == event_id))
            .count()
    }

    /// Ids currently registered for `event_name`, in registration order.
    pub fn active_registrations(&self, event_name: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for command in lock(&self.commands).iter() {
            match command {
                HostCommand::RegisterEvent(r) if r.event_name == event_name => {
                    ids.push(r.event_id.clone());
                }
                HostCommand::UnRegisterEvent(r) if r.event_name == event_name => {
                    ids.retain(|id| id != &r.event_id);
                }
                _ => {}
            }
        }
        ids
    }

    /// URLs passed to `head`, in call order.
    pub fn head_calls(&self) -> Vec<String> {
        lock(&self.head_calls).clone()
    }

    /// Whether a listener is open on `channel`.
    pub fn is_listening(&self, channel: &str) -> bool {
        lock(&self.channels).contains_key(channel)
    }

    /// Delivers `payload` on `channel`.
    pub fn deliver(&self, channel: &str, payload: EventPayload) -> AppResult<()> {
        let channels = lock(&self.channels);
        let sender = channels
            .get(channel)
            .ok_or_else(|| AppError::not_found(format!("No listener on channel '{channel}'")))?;

        sender
            .send(payload)
            .map_err(|_| AppError::host(format!("Listener on channel '{channel}' is gone")))
    }

    /// Waits until a command matching `predicate` has been received.
    pub async fn wait_for<F>(&self, limit: Duration, predicate: F) -> AppResult<HostCommand>
    where
        F: Fn(&HostCommand) -> bool,
    {
        let deadline = Instant::now() + limit;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let found = lock(&self.commands).iter().find(|c| predicate(c)).cloned();
            if let Some(found) = found {
                return Ok(found);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(AppError::timeout(format!(
                    "No matching host command within {limit:?}"
                )));
            }
        }
    }

    /// Waits for the completion of delivery `key` by registration `event_id`.
    pub async fn wait_for_completion(
        &self,
        key: &EventKey,
        event_id: &str,
        limit: Duration,
    ) -> AppResult<CompletionCommand> {
        let command = self
            .wait_for(limit, |c| {
                matches!(
                    c,
                    HostCommand::EventJobCompleted(done)
                        if &done.action_key == key && done.event_id == event_id
                )
            })
            .await?;

        match command {
            HostCommand::EventJobCompleted(completion) => Ok(completion),
            other => Err(AppError::internal(format!(
                "Unexpected command '{}'",
                other.name()
            ))),
        }
    }

    /// Runs an intercepted action the way the engine does: delivers it to
    /// every registration of its event in turn, waiting for each
    /// acknowledgement, and returns the action the engine would execute.
    pub async fn run_event_job(
        &self,
        action: RegistryAction,
        action_id: &str,
        limit: Duration,
    ) -> AppResult<RegistryAction> {
        let key = EventKey::new(action.event_name(), action_id);
        let mut outcome = action.clone();

        for event_id in self.active_registrations(action.event_name()) {
            self.deliver(
                &event_id,
                EventPayload {
                    action: action.clone(),
                    key: key.clone(),
                },
            )?;

            let completion = self.wait_for_completion(&key, &event_id, limit).await?;
            if let Some(muted) = completion.muted_action {
                outcome = muted;
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl HostBridge for MemoryHost {
    async fn send(&self, command: HostCommand) -> AppResult<()> {
        lock(&self.commands).push(command);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn listen(&self, channel: &str) -> AppResult<DeliveryReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.channels).insert(channel.to_string(), tx);
        Ok(rx)
    }

    async fn unlisten(&self, channel: &str) {
        lock(&self.channels).remove(channel);
    }

    async fn head(&self, url: &str) -> AppResult<bool> {
        lock(&self.head_calls).push(url.to_string());

        let delay = lock(&self.latency).get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if lock(&self.failing).contains(url) {
            return Err(AppError::host(format!("HEAD {url} failed")));
        }

        Ok(lock(&self.existing).contains(url))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
