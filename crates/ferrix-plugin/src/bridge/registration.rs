//! Event registration: one subscription's request/acknowledge lifecycle.
//!
//! A registration:
//! - opens a private channel named after its id and registers the id
//!   with the host under its event name;
//! - runs its handler once per delivered action, one delivery at a time;
//! - after every invocation, however it ended, unregisters all child
//!   registrations opened during it and then acknowledges the delivery
//!   with an `event-job-completed` message carrying the optional mutation;
//! - unregisters itself (and its children) on the first `off()`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ferrix_core::{AppError, AppResult, RegistryAction};

use super::dispatcher::Subscription;
use super::handler::EventHandler;
use crate::host::{DeliveryReceiver, HostBridge};
use crate::protocol::{CompletionCommand, EventPayload, HostCommand, RegistrationCommand};

/// Mutable per-invocation state of a registration.
#[derive(Debug, Default)]
struct InvocationState {
    /// Registrations opened by the running invocation.
    children: Vec<Arc<EventRegistration>>,
    /// Whether the running invocation replaced the payload.
    is_muted: bool,
    /// Payload of the current delivery, or its replacement.
    last_payload: Value,
    /// True between delivery and settlement of the handler.
    in_flight: bool,
}

/// A subscription node bound to an event name and a private reply channel.
#[derive(Debug)]
pub struct EventRegistration {
    id: String,
    event_name: String,
    parent: Option<Weak<EventRegistration>>,
    host: Arc<dyn HostBridge>,
    handler: Arc<dyn EventHandler>,
    handler_timeout: Option<Duration>,
    active: AtomicBool,
    listener: CancellationToken,
    state: Mutex<InvocationState>,
}

impl EventRegistration {
    /// Creates a registration, opens its channel, and registers it with the host.
    pub(crate) async fn create(
        event_name: String,
        handler: Arc<dyn EventHandler>,
        parent: Option<&Arc<EventRegistration>>,
        host: Arc<dyn HostBridge>,
        handler_timeout: Option<Duration>,
    ) -> AppResult<Arc<Self>> {
        let id = Uuid::new_v4().to_string();
        let receiver = host.listen(&id).await?;

        let registration = Arc::new(Self {
            id,
            event_name,
            parent: parent.map(Arc::downgrade),
            host,
            handler,
            handler_timeout,
            active: AtomicBool::new(true),
            listener: CancellationToken::new(),
            state: Mutex::new(InvocationState::default()),
        });

        registration.spawn_listener(receiver);

        if let Err(e) = registration
            .host
            .send(HostCommand::RegisterEvent(registration.command()))
            .await
        {
            registration.active.store(false, Ordering::Release);
            registration.listener.cancel();
            registration.host.unlisten(&registration.id).await;
            return Err(e);
        }

        info!(
            event_id = %registration.id,
            event_name = %registration.event_name,
            child = registration.parent.is_some(),
            "Event registered"
        );

        Ok(registration)
    }

    /// Returns the registration id (routing address and unregister credential).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the event name this registration intercepts.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Returns the parent registration, if this is a live child.
    pub fn parent(&self) -> Option<Arc<EventRegistration>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Whether `off()` has not been called yet.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Number of children opened by the running invocation.
    pub fn child_count(&self) -> usize {
        self.lock_state().children.len()
    }

    /// Whether the running invocation has called `mutate`.
    pub fn is_muted(&self) -> bool {
        self.lock_state().is_muted
    }

    /// Opens a child registration scoped to the running handler invocation.
    ///
    /// The child is unregistered automatically when the invocation settles,
    /// whether or not the returned subscription is ever used.
    pub async fn on(
        self: &Arc<Self>,
        event_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> AppResult<Subscription> {
        let event_name = event_name.into();

        if !self.lock_state().in_flight {
            return Err(AppError::conflict(format!(
                "Registration '{}' can only open '{}' from inside its handler",
                self.id, event_name
            )));
        }

        let child = Self::create(
            event_name,
            handler,
            Some(self),
            Arc::clone(&self.host),
            self.handler_timeout,
        )
        .await?;

        let adopted = {
            let mut state = self.lock_state();
            if state.in_flight {
                state.children.push(Arc::clone(&child));
                true
            } else {
                false
            }
        };

        if !adopted {
            child.off().await;
            return Err(AppError::conflict(format!(
                "Handler of '{}' settled before child '{}' was registered",
                self.id,
                child.event_name()
            )));
        }

        Ok(Subscription::child(child))
    }

    /// Unregisters this registration and all of its current children.
    ///
    /// Only the first call has an effect. An invocation already running is
    /// not interrupted.
    pub async fn off(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            debug!(event_id = %self.id, "Registration already off");
            return;
        }

        self.listener.cancel();
        self.host.unlisten(&self.id).await;

        let children = std::mem::take(&mut self.lock_state().children);
        for child in children {
            Box::pin(child.off()).await;
        }

        if let Err(e) = self
            .host
            .send(HostCommand::UnRegisterEvent(self.command()))
            .await
        {
            warn!(
                event_id = %self.id,
                event_name = %self.event_name,
                error = %e,
                "Failed to unregister event with host"
            );
        }

        info!(event_id = %self.id, event_name = %self.event_name, "Event unregistered");
    }

    /// Replaces the payload of the action being handled.
    ///
    /// The host runs the replacement instead of the original action once
    /// the invocation is acknowledged. Must be called from inside the
    /// handler invocation.
    pub fn mutate<P: Serialize>(&self, payload: &P) {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(event_id = %self.id, error = %e, "Mutation payload is not serializable");
                return;
            }
        };

        let mut state = self.lock_state();
        let in_flight = state.in_flight;
        if !in_flight {
            drop(state);
            debug_assert!(
                in_flight,
                "mutate() called on registration {} after its handler settled",
                self.id
            );
            warn!(event_id = %self.id, "mutate() after settlement ignored");
            return;
        }

        state.is_muted = true;
        state.last_payload = value;
    }

    fn command(&self) -> RegistrationCommand {
        RegistrationCommand {
            event_name: self.event_name.clone(),
            event_id: self.id.clone(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, InvocationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_listener(self: &Arc<Self>, mut receiver: DeliveryReceiver) {
        let registration = Arc::clone(self);
        let cancelled = self.listener.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    delivery = receiver.recv() => match delivery {
                        Some(delivery) => Arc::clone(&registration).deliver(delivery).await,
                        None => break,
                    },
                }
            }

            debug!(event_id = %registration.id, "Listener closed");
        });
    }

    /// Runs the handler for one delivery and acknowledges it.
    async fn deliver(self: Arc<Self>, delivery: EventPayload) {
        let EventPayload { action, key } = delivery;

        {
            let mut state = self.lock_state();
            state.in_flight = true;
            state.is_muted = false;
            state.last_payload = action.payload();
        }

        debug!(
            event_id = %self.id,
            event_name = %self.event_name,
            action_id = %key.id,
            "Delivering action to handler"
        );

        let invocation =
            AssertUnwindSafe(self.handler.handle(Arc::clone(&self), action)).catch_unwind();

        let (outcome, timed_out) = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => (outcome, false),
                Err(_) => (
                    Ok(Err(AppError::timeout(format!(
                        "Handler did not settle within {limit:?}"
                    )))),
                    true,
                ),
            },
            None => (invocation.await, false),
        };

        match outcome {
            Ok(Ok(())) => {
                debug!(event_id = %self.id, action_id = %key.id, "Handler settled");
            }
            Ok(Err(e)) => {
                warn!(
                    event_id = %self.id,
                    event_name = %self.event_name,
                    action_id = %key.id,
                    error = %e,
                    "Handler failed"
                );
            }
            Err(panic) => {
                error!(
                    event_id = %self.id,
                    event_name = %self.event_name,
                    action_id = %key.id,
                    panic = %panic_message(panic.as_ref()),
                    "Handler panicked"
                );
            }
        }

        let children = {
            let mut state = self.lock_state();
            state.in_flight = false;
            if timed_out {
                state.is_muted = false;
            }
            std::mem::take(&mut state.children)
        };

        for child in children {
            child.off().await;
        }

        let muted_action = {
            let state = self.lock_state();
            state
                .is_muted
                .then(|| RegistryAction::from_parts(self.event_name.clone(), state.last_payload.clone()))
        };
        let muted = muted_action.is_some();

        let completion = CompletionCommand {
            action_key: key,
            event_id: self.id.clone(),
            muted_action,
        };

        if let Err(e) = self
            .host
            .send(HostCommand::EventJobCompleted(completion))
            .await
        {
            error!(
                event_id = %self.id,
                event_name = %self.event_name,
                error = %e,
                "Failed to acknowledge action"
            );
        } else {
            debug!(event_id = %self.id, muted, "Action acknowledged");
        }

        self.lock_state().is_muted = false;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
