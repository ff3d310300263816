//! Transport seam between the bridge and the download engine host.

#[cfg(feature = "mock")]
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ferrix_core::AppResult;

use crate::protocol::{EventPayload, HostCommand};

/// Receiving half of a registration's private delivery channel.
pub type DeliveryReceiver = mpsc::UnboundedReceiver<EventPayload>;

/// The command/event channel connecting the bridge to the engine host.
///
/// Every method is an asynchronous round trip; none of them block the
/// runtime.
#[async_trait]
pub trait HostBridge: Send + Sync + std::fmt::Debug {
    /// Sends a fire-style command.
    async fn send(&self, command: HostCommand) -> AppResult<()>;

    /// Opens the inbound channel named `channel`.
    async fn listen(&self, channel: &str) -> AppResult<DeliveryReceiver>;

    /// Closes the inbound channel named `channel`. Closing an unknown
    /// channel is a no-op.
    async fn unlisten(&self, channel: &str);

    /// Asks the host whether `url` exists (`api-http-head`).
    async fn head(&self, url: &str) -> AppResult<bool>;
}
