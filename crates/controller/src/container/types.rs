use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use derive_more::Display;

/// Runtime state string reported for containers that are up.
pub const RUNNING_STATE: &str = "running";

/// Snapshot of a container as reported by a runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    /// Name without the leading `/` Docker prepends
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    /// Attached networks keyed by network name
    pub networks: BTreeMap<String, NetworkInfo>,
    pub created: Option<DateTime<Utc>>,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == RUNNING_STATE
    }

    /// First non-empty IP address, in network name order.
    pub fn address(&self) -> Option<&str> {
        self.networks
            .values()
            .map(|network| network.ip_address.as_str())
            .find(|ip| !ip.is_empty())
    }

    /// Value of a label, if set.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Addressing of a container inside one network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ip_address: String,
    pub gateway: String,
}

/// Lifecycle transitions the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ContainerEventKind {
    #[display("start")]
    Start,
    #[display("stop")]
    Stop,
    #[display("destroy")]
    Destroy,
    #[display("update")]
    Update,
}

impl ContainerEventKind {
    /// Maps a runtime action name, ignoring actions the controller does not handle.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "destroy" => Some(Self::Destroy),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

/// A lifecycle notification delivered by a runtime watcher.
#[derive(Debug, Clone)]
pub struct ContainerEvent {
    pub kind: ContainerEventKind,
    pub container: ContainerInfo,
    pub timestamp: DateTime<Utc>,
}
