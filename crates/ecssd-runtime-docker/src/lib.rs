// # Docker Runtime Adapter
//
// This crate connects the ecssd core to the Docker Engine API.
//
// ## Purpose
//
// - **EventSource**: streams container lifecycle events from `GET /events`
//   and fans them out to every registered listener
// - **ContainerInspector**: reads labels and published ports from
//   `GET /containers/{id}/json`
//
// ## Transport
//
// The daemon is reached over its unix socket (`unix:///var/run/docker.sock`)
// or over TCP (`tcp://host:2375`, `http://`, `https://`). Events arrive as
// newline-delimited JSON on a long-lived response body.
//
// ## Reconnection
//
// The first connection is made while registering a listener, so an
// unreachable daemon is reported to the caller. Afterwards, when the stream
// ends or fails, the adapter reconnects after `reconnect_delay_secs` until the
// listener is removed or its receiver is dropped. Events emitted while
// disconnected are not replayed.

mod wire;

use ecssd_core::config::RuntimeConfig;
use ecssd_core::traits::{ContainerDetails, ContainerInspector, EventSource, LifecycleEvent};
use ecssd_core::{Error, Result};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info, trace, warn};
use wire::{ContainerJson, ErrorBody, EventLine, EventLineCodec, EventMessage};

/// Base URL used for requests tunnelled through the unix socket
const UNIX_BASE_URL: &str = "http://localhost";

/// Only container events are of interest
const EVENT_FILTERS: &str = r#"{"type":["container"]}"#;

/// Timeout for non-streaming API calls
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Longest accepted event line; longer lines are skipped
const MAX_EVENT_LINE_BYTES: usize = 1024 * 1024;

/// Where the Docker daemon listens
#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    /// Unix domain socket path
    Unix(String),
    /// HTTP base URL
    Http(String),
}

impl Endpoint {
    fn parse(docker_host: &str) -> Result<Self> {
        if let Some(path) = docker_host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::config("Docker socket path cannot be empty"));
            }
            return Ok(Endpoint::Unix(path.to_string()));
        }
        if let Some(addr) = docker_host.strip_prefix("tcp://") {
            return Ok(Endpoint::Http(format!("http://{}", addr.trim_end_matches('/'))));
        }
        if docker_host.starts_with("http://") || docker_host.starts_with("https://") {
            return Ok(Endpoint::Http(docker_host.trim_end_matches('/').to_string()));
        }
        Err(Error::config(format!("Unsupported Docker host: {}", docker_host)))
    }

    fn base_url(&self) -> &str {
        match self {
            Endpoint::Unix(_) => UNIX_BASE_URL,
            Endpoint::Http(url) => url,
        }
    }
}

/// A registered listener and the task feeding it
struct Subscription {
    listener: mpsc::Sender<LifecycleEvent>,
    task: JoinHandle<()>,
}

/// Docker Engine API client
///
/// Implements both [`EventSource`] and [`ContainerInspector`]; share one
/// instance behind an `Arc` for both roles.
pub struct DockerRuntime {
    /// HTTP client (bound to the unix socket when applicable)
    client: reqwest::Client,

    /// Base URL of API requests
    base_url: String,

    /// Delay before reconnecting a dropped event stream
    reconnect_delay: Duration,

    /// Active listeners
    subscriptions: Mutex<Vec<Subscription>>,
}

impl DockerRuntime {
    /// Create a runtime adapter from configuration
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = Endpoint::parse(&config.docker_host)?;

        let builder = reqwest::Client::builder();
        let builder = match &endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => builder.unix_socket(path.clone()),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(Error::config("unix:// Docker hosts are only supported on unix platforms"));
            }
            Endpoint::Http(_) => builder,
        };
        let client = builder
            .build()
            .map_err(|e| Error::runtime(format!("Failed to build Docker client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.base_url().to_string(),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.subscriptions.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn stream(&self) -> EventStream {
        EventStream {
            client: self.client.clone(),
            url: format!("{}/events", self.base_url),
        }
    }
}

impl Drop for DockerRuntime {
    fn drop(&mut self) {
        if let Ok(subscriptions) = self.subscriptions.get_mut() {
            for subscription in subscriptions.drain(..) {
                subscription.task.abort();
            }
        }
    }
}

/// Connection parameters of the event stream, moved into listener tasks
#[derive(Clone)]
struct EventStream {
    client: reqwest::Client,
    url: String,
}

/// Why forwarding stopped
enum StreamEnd {
    /// The daemon closed the stream or the connection failed
    Disconnected,
    /// The listener's receiver is gone
    ListenerClosed,
}

impl EventStream {
    async fn connect(&self) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("filters", EVENT_FILTERS)])
            .send()
            .await
            .map_err(|e| Error::runtime(format!("Failed to connect to Docker event stream: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(Error::runtime(format!("Docker event stream returned {}: {}", status, message)));
        }
        Ok(response)
    }

    /// Forward events, reconnecting after `delay` whenever the stream drops
    async fn run(self, first: reqwest::Response, listener: mpsc::Sender<LifecycleEvent>, delay: Duration) {
        let mut response = first;
        loop {
            let body = response.bytes_stream();
            if let StreamEnd::ListenerClosed = forward_events(body, &listener, MAX_EVENT_LINE_BYTES).await {
                debug!("Listener closed, stopping Docker event stream");
                return;
            }

            response = loop {
                warn!(delay_secs = delay.as_secs(), "Docker event stream ended, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = listener.closed() => return,
                }
                match self.connect().await {
                    Ok(response) => {
                        info!("Reconnected to Docker event stream");
                        break response;
                    }
                    Err(e) => warn!(error = %e, "Reconnect failed"),
                }
            };
        }
    }
}

/// Forward events from `body` until it ends or the listener goes away
async fn forward_events<S, E>(body: S, listener: &mpsc::Sender<LifecycleEvent>, max_line: usize) -> StreamEnd
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let reader = StreamReader::new(body.map(|chunk| chunk.map_err(io::Error::other)));
    let mut lines = std::pin::pin!(FramedRead::new(reader, EventLineCodec::new(max_line)));

    loop {
        let line = tokio::select! {
            line = lines.next() => line,
            _ = listener.closed() => return StreamEnd::ListenerClosed,
        };
        let line = match line {
            Some(Ok(EventLine::Message(line))) => line,
            Some(Ok(EventLine::Oversized)) => {
                warn!(max_bytes = max_line, "Skipping oversized Docker event");
                continue;
            }
            Some(Ok(EventLine::Invalid)) => {
                warn!("Skipping Docker event that is not UTF-8");
                continue;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Docker event stream failed");
                return StreamEnd::Disconnected;
            }
            None => return StreamEnd::Disconnected,
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<EventMessage>(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Skipping malformed Docker event");
                continue;
            }
        };
        let Some(event) = message.into_lifecycle_event() else {
            continue;
        };
        trace!(event_id = %event.short_id(), status = %event.status, "Docker event");
        if listener.send(event).await.is_err() {
            return StreamEnd::ListenerClosed;
        }
    }
}

async fn error_message(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body),
        Err(e) => e.to_string(),
    }
}

#[async_trait::async_trait]
impl EventSource for DockerRuntime {
    async fn add_listener(&self, listener: mpsc::Sender<LifecycleEvent>) -> Result<()> {
        let stream = self.stream();
        let first = stream.connect().await?;
        info!(base_url = %self.base_url, "Subscribed to Docker events");

        let task = tokio::spawn(stream.run(first, listener.clone(), self.reconnect_delay));
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| Error::runtime("listener registry poisoned"))?;
        subscriptions.push(Subscription { listener, task });
        Ok(())
    }

    async fn remove_listener(&self, listener: &mpsc::Sender<LifecycleEvent>) -> Result<()> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| Error::runtime("listener registry poisoned"))?;

        subscriptions.retain(|subscription| {
            if subscription.listener.same_channel(listener) {
                subscription.task.abort();
                false
            } else {
                true
            }
        });
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "docker"
    }
}

#[async_trait::async_trait]
impl ContainerInspector for DockerRuntime {
    async fn inspect(&self, instance_id: &str) -> Result<ContainerDetails> {
        let url = format!("{}/containers/{}/json", self.base_url, instance_id);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| Error::inspection(instance_id, format!("Request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::inspection(instance_id, "No such container"));
        }
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(Error::inspection(instance_id, format!("Docker returned {}: {}", status, message)));
        }

        let json: ContainerJson = response
            .json()
            .await
            .map_err(|e| Error::inspection(instance_id, format!("Invalid inspect response: {}", e)))?;
        Ok(json.into())
    }
}
