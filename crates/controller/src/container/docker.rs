//! Docker Engine API source.
//!
//! `tcp://`, `http://` and `https://` hosts are reached with reqwest,
//! `unix://` sockets with a single-connection hyper client.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use futures::TryStreamExt;
use http_body_util::BodyStream;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;
use url::form_urlencoded;

use super::runtime::ContainerRuntime;
use super::runtime::RuntimeError;
use super::types::ContainerEvent;
use super::types::ContainerEventKind;
use super::types::ContainerInfo;
use super::types::NetworkInfo;

pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const WATCHED_ACTIONS: [&str; 4] = ["start", "stop", "destroy", "update"];

type ByteStream = BoxStream<'static, Result<Bytes, RuntimeError>>;

#[derive(Debug, Clone)]
enum Transport {
    Http {
        client: reqwest::Client,
        base_url: String,
    },
    Unix {
        socket: PathBuf,
    },
}

impl Transport {
    fn from_host(host: &str) -> Result<Self, RuntimeError> {
        if let Some(path) = host.strip_prefix("unix://") {
            return Ok(Self::Unix {
                socket: PathBuf::from(path),
            });
        }

        let base_url = if let Some(address) = host.strip_prefix("tcp://") {
            format!("http://{address}")
        } else if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            return Err(RuntimeError::UnsupportedHost(host.to_string()));
        };

        Ok(Self::Http {
            client: reqwest::Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Issue a GET and hand back the status with the streaming body.
    async fn get(&self, path_and_query: &str) -> Result<(u16, ByteStream), RuntimeError> {
        match self {
            Self::Http { client, base_url } => {
                let response = client
                    .get(format!("{base_url}{path_and_query}"))
                    .send()
                    .await?;
                let status = response.status().as_u16();
                let body = response.bytes_stream().map_err(RuntimeError::from).boxed();
                Ok((status, body))
            }
            Self::Unix { socket } => {
                let stream = UnixStream::connect(socket).await?;
                let (mut sender, connection) =
                    hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        debug!("Docker socket connection closed: {e}");
                    }
                });

                let request = hyper::Request::get(path_and_query)
                    .header(hyper::header::HOST, "docker")
                    .body(Empty::<Bytes>::new())?;
                let response = sender.send_request(request).await?;
                let status = response.status().as_u16();
                let body = BodyStream::new(response.into_body())
                    .filter_map(|frame| async move {
                        match frame {
                            Ok(frame) => frame.into_data().ok().map(Ok),
                            Err(e) => Some(Err(RuntimeError::from(e))),
                        }
                    })
                    // the sender owns the connection, it lives as long as the body
                    .map(move |chunk| {
                        let _connection = &sender;
                        chunk
                    })
                    .boxed();
                Ok((status, body))
            }
        }
    }
}

/// Docker source limited to containers carrying one of `selectors`.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    transport: Transport,
    /// `key=value` label selectors, any of which admits a container
    selectors: Vec<String>,
}

impl DockerRuntime {
    pub fn new(host: &str, selectors: Vec<String>) -> Result<Self, RuntimeError> {
        Ok(Self {
            transport: Transport::from_host(host)?,
            selectors,
        })
    }

    fn matches_selectors(&self, labels: &BTreeMap<String, String>) -> bool {
        self.selectors.iter().any(|selector| {
            let (key, value) = selector.split_once('=').unwrap_or((selector.as_str(), ""));
            labels.get(key).is_some_and(|v| v == value)
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, RuntimeError> {
        let request = async {
            let (status, body) = self.transport.get(path_and_query).await?;
            let bytes: Vec<u8> = body
                .try_fold(Vec::new(), |mut acc, chunk| async move {
                    acc.extend_from_slice(&chunk);
                    Ok(acc)
                })
                .await?;
            if status >= 400 {
                return Err(status_error(status, path_and_query, &bytes));
            }
            Ok(serde_json::from_slice(&bytes)?)
        };

        tokio::time::timeout(REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| RuntimeError::Timeout {
                path: path_and_query.to_string(),
                timeout: REQUEST_TIMEOUT,
            })?
    }

    /// Resolve the container behind an event, falling back to the event
    /// attributes once the container is gone.
    async fn event_container(&self, event: &DockerEvent, kind: ContainerEventKind) -> Option<ContainerInfo> {
        match self.get_container(&event.actor.id).await {
            Ok(container) => Some(container),
            Err(_) if kind == ContainerEventKind::Destroy => Some(event.container_from_attributes()),
            Err(e) => {
                warn!(container = %event.actor.id, "Failed to inspect container for {kind} event: {e}");
                None
            }
        }
    }

    /// Forward one event line; `false` once the receiver is gone.
    async fn handle_event_line(
        &self,
        line: &[u8],
        events: &mpsc::Sender<ContainerEvent>,
    ) -> bool {
        let event: DockerEvent = match serde_json::from_slice(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed docker event: {e}");
                return true;
            }
        };
        if event.kind != "container" {
            return true;
        }
        let Some(kind) = ContainerEventKind::from_action(&event.action) else {
            return true;
        };
        if !self.matches_selectors(&event.actor.attributes) {
            return true;
        }
        let Some(container) = self.event_container(&event, kind).await else {
            return true;
        };

        debug!(container = %container.name, event = %kind, "Received container event");
        let timestamp = Utc
            .timestamp_opt(event.time, 0)
            .single()
            .unwrap_or_else(Utc::now);
        events
            .send(ContainerEvent {
                kind,
                container,
                timestamp,
            })
            .await
            .is_ok()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn is_available(&self) -> bool {
        let ping = async {
            let (status, _) = self.transport.get("/_ping").await?;
            Ok::<_, RuntimeError>(status < 400)
        };
        match tokio::time::timeout(REQUEST_TIMEOUT, ping).await {
            Ok(Ok(available)) => available,
            Ok(Err(e)) => {
                debug!("Docker ping failed: {e}");
                false
            }
            Err(_) => false,
        }
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RuntimeError> {
        // docker ANDs label filters, so each selector is its own query
        let mut containers = BTreeMap::new();
        for selector in &self.selectors {
            let filters = serde_json::json!({ "label": [selector] }).to_string();
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("all", "true")
                .append_pair("filters", &filters)
                .finish();
            let summaries: Vec<ContainerSummary> =
                self.get_json(&format!("/containers/json?{query}")).await?;
            for summary in summaries {
                let container = ContainerInfo::from(summary);
                containers.insert(container.id.clone(), container);
            }
        }
        Ok(containers.into_values().collect())
    }

    async fn get_container(&self, id: &str) -> Result<ContainerInfo, RuntimeError> {
        let inspect: ContainerInspect = self.get_json(&format!("/containers/{id}/json")).await?;
        Ok(inspect.into())
    }

    async fn watch(
        &self,
        events: mpsc::Sender<ContainerEvent>,
        token: CancellationToken,
    ) -> Result<(), RuntimeError> {
        let filters = serde_json::json!({
            "type": ["container"],
            "event": WATCHED_ACTIONS,
        })
        .to_string();
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("filters", &filters)
            .finish();
        let path = format!("/events?{query}");

        let (status, mut body) = self.transport.get(&path).await?;
        if status >= 400 {
            return Err(status_error(status, &path, &[]));
        }

        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                return Ok(());
            };
            buffer.extend_from_slice(&chunk?);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                if !self.handle_event_line(line, &events).await {
                    return Ok(());
                }
            }
        }
    }
}

fn status_error(status: u16, path: &str, body: &[u8]) -> RuntimeError {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    RuntimeError::Status {
        status,
        path: path.to_string(),
        message,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSettings {
    #[serde(default)]
    networks: Option<BTreeMap<String, EndpointSettings>>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
    #[serde(rename = "Gateway", default)]
    gateway: String,
}

impl NetworkSettings {
    fn into_networks(self) -> BTreeMap<String, NetworkInfo> {
        self.networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, endpoint)| {
                (
                    name,
                    NetworkInfo {
                        ip_address: endpoint.ip_address,
                        gateway: endpoint.gateway,
                    },
                )
            })
            .collect()
    }
}

/// Entry of `GET /containers/json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    network_settings: NetworkSettings,
    #[serde(default)]
    created: Option<i64>,
}

impl From<ContainerSummary> for ContainerInfo {
    fn from(summary: ContainerSummary) -> Self {
        let name = summary
            .names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default();
        Self {
            id: summary.id,
            name,
            image: summary.image,
            state: summary.state,
            status: summary.status,
            labels: summary.labels.unwrap_or_default(),
            networks: summary.network_settings.into_networks(),
            created: summary
                .created
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        }
    }
}

/// Body of `GET /containers/{id}/json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    state: InspectState,
    #[serde(default)]
    config: InspectConfig,
    #[serde(default)]
    network_settings: NetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    image: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

impl From<ContainerInspect> for ContainerInfo {
    fn from(inspect: ContainerInspect) -> Self {
        Self {
            id: inspect.id,
            name: inspect.name.trim_start_matches('/').to_string(),
            image: inspect.config.image,
            status: inspect.state.status.clone(),
            state: inspect.state.status,
            labels: inspect.config.labels.unwrap_or_default(),
            networks: inspect.network_settings.into_networks(),
            created: inspect.created,
        }
    }
}

/// Line of the `GET /events` stream.
#[derive(Debug, Deserialize)]
struct DockerEvent {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: EventActor,
    #[serde(default)]
    time: i64,
}

#[derive(Debug, Default, Deserialize)]
struct EventActor {
    #[serde(rename = "ID", default)]
    id: String,
    /// Container labels plus `name` and `image`
    #[serde(rename = "Attributes", default)]
    attributes: BTreeMap<String, String>,
}

impl DockerEvent {
    fn container_from_attributes(&self) -> ContainerInfo {
        let mut labels = self.actor.attributes.clone();
        let name = labels.remove("name").unwrap_or_default();
        let image = labels.remove("image").unwrap_or_default();
        labels.remove("exitCode");
        ContainerInfo {
            id: self.actor.id.clone(),
            name,
            image,
            state: "exited".to_string(),
            labels,
            ..ContainerInfo::default()
        }
    }
}
