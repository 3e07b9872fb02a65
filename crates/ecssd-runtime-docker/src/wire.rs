// Docker Engine API payloads
//
// Only the fields the agent reads are modelled. Older daemons send
// `status`/`id` at the top level, newer ones `Action`/`Actor.ID`; both are
// accepted.

use bytes::BytesMut;
use chrono::DateTime;
use ecssd_core::traits::{ContainerDetails, LifecycleEvent, PortBinding};
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// One message of `GET /events`
#[derive(Debug, Deserialize)]
pub(crate) struct EventMessage {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "Type", default)]
    kind: Option<String>,
    #[serde(rename = "Action", default)]
    action: Option<String>,
    #[serde(rename = "Actor", default)]
    actor: Option<Actor>,
    #[serde(default)]
    time: Option<i64>,
    #[serde(rename = "timeNano", default)]
    time_nano: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct Actor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

impl EventMessage {
    /// Convert to a lifecycle event
    ///
    /// Returns `None` for non-container events and messages without an id or
    /// status.
    pub(crate) fn into_lifecycle_event(self) -> Option<LifecycleEvent> {
        if self.kind.as_deref().is_some_and(|kind| kind != "container") {
            return None;
        }

        let actor = self.actor.unwrap_or_default();
        let id = self.id.filter(|id| !id.is_empty()).unwrap_or(actor.id);
        let status = self.status.or(self.action)?;
        if id.is_empty() || status.is_empty() {
            return None;
        }

        let time = match (self.time_nano, self.time) {
            (Some(nanos), _) => Some(DateTime::from_timestamp_nanos(nanos)),
            (None, Some(secs)) => DateTime::from_timestamp(secs, 0),
            (None, None) => None,
        };

        let mut event = LifecycleEvent::new(id, status);
        event.attributes = actor.attributes;
        event.time = time;
        Some(event)
    }
}

/// One frame of the event stream
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EventLine {
    /// A complete line, possibly blank
    Message(String),
    /// A line longer than the limit; its bytes are discarded
    Oversized,
    /// A line that is not UTF-8
    Invalid,
}

/// Newline-delimited JSON framing with a per-line length limit
///
/// Wraps [`LinesCodec`] so that an oversized or non-UTF-8 line is reported
/// as a frame instead of ending the stream.
#[derive(Debug)]
pub(crate) struct EventLineCodec {
    lines: LinesCodec,
}

impl EventLineCodec {
    pub(crate) fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn classify(result: Result<Option<String>, LinesCodecError>) -> io::Result<Option<EventLine>> {
        match result {
            Ok(line) => Ok(line.map(EventLine::Message)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(EventLine::Oversized)),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => Ok(Some(EventLine::Invalid)),
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for EventLineCodec {
    type Item = EventLine;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<EventLine>> {
        Self::classify(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<EventLine>> {
        Self::classify(self.lines.decode_eof(src))
    }
}

/// Response of `GET /containers/{id}/json`
#[derive(Debug, Deserialize)]
pub(crate) struct ContainerJson {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Config", default)]
    config: Option<ContainerConfig>,
    #[serde(rename = "NetworkSettings", default)]
    network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct NetworkSettings {
    // Unpublished exposed ports map to null
    #[serde(rename = "Ports", default)]
    ports: Option<HashMap<String, Option<Vec<WireBinding>>>>,
}

#[derive(Debug, Deserialize)]
struct WireBinding {
    #[serde(rename = "HostIp", default)]
    host_ip: String,
    #[serde(rename = "HostPort", default)]
    host_port: String,
}

impl From<ContainerJson> for ContainerDetails {
    fn from(json: ContainerJson) -> Self {
        let mut details = ContainerDetails::new(json.id);
        details.labels = json.config.and_then(|c| c.labels).unwrap_or_default();

        let ports = json.network_settings.and_then(|n| n.ports).unwrap_or_default();
        for (container_port, bindings) in ports {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|b| PortBinding::new(b.host_ip, b.host_port))
                .collect();
            details.ports.insert(container_port, bindings);
        }
        details
    }
}

/// Error body returned by the Engine API
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) message: String,
}
