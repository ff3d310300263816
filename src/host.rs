//! Host transport over the process's standard streams.
//!
//! Outbound commands are written to stdout as one JSON object per line.
//! Two kinds of line arrive on stdin:
//!
//! - deliveries, `{"channel": <id>, "payload": EventPayload}`, routed to
//!   the listener registered for `channel`;
//! - replies, `{"reply": <request_id>, "payload": ...}`, handed to the
//!   request that is waiting on `request_id`.
//!
//! Existence checks go to the host as `api-http-head`. With
//! `local_http_head` set they are plain HTTP `HEAD` requests made here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ferrix_core::error::ErrorKind;
use ferrix_core::{AppError, AppResult};
use ferrix_plugin::HostBridge;
use ferrix_plugin::host::DeliveryReceiver;
use ferrix_plugin::protocol::{CommandReply, EventPayload, HeadRequest, HostCommand};

/// Upper bound for one existence check, redirects included.
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// One inbound line.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Delivery { channel: String, payload: EventPayload },
    Reply(CommandReply),
}

/// Where inbound lines go.
#[derive(Debug, Default)]
struct Routes {
    channels: Mutex<HashMap<String, mpsc::UnboundedSender<EventPayload>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<CommandReply>>>,
}

/// [`HostBridge`] speaking JSON lines on stdin/stdout.
#[derive(Debug)]
pub struct StdioHost {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    routes: Arc<Routes>,
    /// Set when existence checks are made locally.
    http: Option<reqwest::Client>,
}

impl StdioHost {
    /// Starts the stdin reader and stdout writer tasks.
    ///
    /// `closed` is cancelled when stdin reaches end of file, i.e. when the
    /// host process goes away.
    pub fn spawn(closed: CancellationToken, local_http_head: bool) -> AppResult<Arc<Self>> {
        let http = if local_http_head {
            let client = reqwest::Client::builder()
                .timeout(HEAD_TIMEOUT)
                .build()
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Host, "Failed to build HTTP client", e)
                })?;
            Some(client)
        } else {
            None
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_lines(rx));

        let routes = Arc::new(Routes::default());
        tokio::spawn(read_lines(Arc::clone(&routes), closed));

        let host = Self::new(tx, routes, http);
        *lock(&host.writer) = Some(writer);
        Ok(Arc::new(host))
    }

    fn new(
        outbound: mpsc::UnboundedSender<String>,
        routes: Arc<Routes>,
        http: Option<reqwest::Client>,
    ) -> Self {
        Self {
            outbound: Mutex::new(Some(outbound)),
            writer: Mutex::new(None),
            routes,
            http,
        }
    }

    /// Stops accepting commands and waits until every queued line is written.
    pub async fn close(&self) {
        drop(lock(&self.outbound).take());

        let writer = lock(&self.writer).take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                error!(error = %e, "Stdout writer task failed");
            }
        }
    }

    async fn ask_host_head(&self, url: &str) -> AppResult<bool> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.routes.pending).insert(request_id.clone(), tx);

        let request = HostCommand::ApiHttpHead(HeadRequest {
            request_id: request_id.clone(),
            url: url.to_string(),
        });
        if let Err(e) = self.send(request).await {
            lock(&self.routes.pending).remove(&request_id);
            return Err(e);
        }

        let reply = match tokio::time::timeout(HEAD_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(AppError::host(format!(
                    "Host went away before answering api-http-head {url}"
                )));
            }
            Err(_) => {
                lock(&self.routes.pending).remove(&request_id);
                return Err(AppError::timeout(format!(
                    "No answer to api-http-head {url} within {HEAD_TIMEOUT:?}"
                )));
            }
        };

        match (reply.error, reply.payload.as_bool()) {
            (Some(error), _) => Err(AppError::host(format!(
                "api-http-head {url} failed: {error}"
            ))),
            (None, Some(exists)) => Ok(exists),
            (None, None) => Err(AppError::host(format!(
                "api-http-head {url} answered with {}",
                reply.payload
            ))),
        }
    }
}

#[async_trait]
impl HostBridge for StdioHost {
    async fn send(&self, command: HostCommand) -> AppResult<()> {
        let line = serde_json::to_string(&command)?;
        let name = command.name();

        let outbound = lock(&self.outbound);
        let sender = outbound
            .as_ref()
            .ok_or_else(|| AppError::host(format!("Host connection closed, dropped '{name}'")))?;

        sender
            .send(line)
            .map_err(|_| AppError::host(format!("Stdout writer gone, dropped '{name}'")))
    }

    async fn listen(&self, channel: &str) -> AppResult<DeliveryReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.routes.channels).insert(channel.to_string(), tx);
        Ok(rx)
    }

    async fn unlisten(&self, channel: &str) {
        lock(&self.routes.channels).remove(channel);
    }

    async fn head(&self, url: &str) -> AppResult<bool> {
        let Some(http) = &self.http else {
            return self.ask_host_head(url).await;
        };

        let response = http
            .head(url)
            .send()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Host, format!("HEAD {url} failed"), e))?;

        Ok(response.status().is_success())
    }
}

async fn write_lines(mut rx: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();

    while let Some(line) = rx.recv().await {
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        }
        .await;

        if let Err(e) = written {
            error!(error = %e, "Failed to write to stdout, stopping writer");
            break;
        }
    }

    debug!("Stdout writer finished");
}

async fn read_lines(routes: Arc<Routes>, closed: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => route(&routes, &line),
                Ok(None) => {
                    info!("Host closed stdin");
                    closed.cancel();
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read from stdin");
                    closed.cancel();
                    break;
                }
            },
        }
    }

    // Wake every request still waiting for an answer.
    lock(&routes.pending).clear();
}

fn route(routes: &Routes, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let inbound: Inbound = match serde_json::from_str(line) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed host message");
            return;
        }
    };

    match inbound {
        Inbound::Delivery { channel, payload } => {
            let channels = lock(&routes.channels);
            let Some(sender) = channels.get(&channel) else {
                warn!(channel = %channel, "Delivery for unknown channel dropped");
                return;
            };

            if sender.send(payload).is_err() {
                warn!(channel = %channel, "Listener gone, delivery dropped");
            }
        }
        Inbound::Reply(reply) => {
            let Some(waiter) = lock(&routes.pending).remove(&reply.reply) else {
                warn!(request_id = %reply.reply, "Reply to unknown request dropped");
                return;
            };

            if waiter.send(reply).is_err() {
                debug!("Requester gave up before the reply arrived");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrix_core::RegistryAction;

    fn piped_host() -> (Arc<StdioHost>, Arc<Routes>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let routes = Arc::new(Routes::default());
        let host = Arc::new(StdioHost::new(tx, Arc::clone(&routes), None));
        (host, routes, rx)
    }

    #[test]
    fn test_route_delivers_to_listener() {
        let routes = Routes::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        routes.channels.lock().unwrap().insert("abc".to_string(), tx);

        route(
            &routes,
            r#"{"channel":"abc","payload":{"action":{"event":"new-download","payload":{"url":"http://x/a"}},"key":{"event":"new-download","id":"7"}}}"#,
        );

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.key.id, "7");
        assert_eq!(delivered.action.event_name(), "new-download");
        assert!(matches!(delivered.action, RegistryAction::NewDownload(_)));
    }

    #[test]
    fn test_route_ignores_garbage_and_unknown_channels() {
        let routes = Routes::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        routes.channels.lock().unwrap().insert("abc".to_string(), tx);

        route(&routes, "not json");
        route(&routes, "");
        route(
            &routes,
            r#"{"channel":"other","payload":{"action":{"event":"close-requested"},"key":{"event":"close-requested","id":"1"}}}"#,
        );
        route(&routes, r#"{"reply":"nobody-asked","payload":true}"#);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_head_is_sent_to_host_and_answered() {
        let (host, routes, mut outbound) = piped_host();

        let asking = tokio::spawn({
            let host = Arc::clone(&host);
            async move { host.head("http://x/a.bin").await }
        });

        let line = outbound.recv().await.unwrap();
        let sent: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(sent["command"], "api-http-head");
        assert_eq!(sent["payload"]["url"], "http://x/a.bin");

        let request_id = sent["payload"]["request_id"].as_str().unwrap();
        route(
            &routes,
            &format!(r#"{{"reply":"{request_id}","payload":true}}"#),
        );

        assert!(asking.await.unwrap().unwrap());
        assert!(routes.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_head_error_reply_is_an_error() {
        let (host, routes, mut outbound) = piped_host();

        let asking = tokio::spawn({
            let host = Arc::clone(&host);
            async move { host.head("http://x/b.bin").await }
        });

        let line = outbound.recv().await.unwrap();
        let sent: serde_json::Value = serde_json::from_str(&line).unwrap();
        let request_id = sent["payload"]["request_id"].as_str().unwrap();
        route(
            &routes,
            &format!(r#"{{"reply":"{request_id}","error":"connection refused"}}"#),
        );

        let err = asking.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Host);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_head_times_out() {
        let (host, routes, _outbound) = piped_host();

        let err = host.head("http://x/c.bin").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(routes.pending.lock().unwrap().is_empty());
    }
}
