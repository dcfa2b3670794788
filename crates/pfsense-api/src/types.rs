//! Wire types of the pfSense HAProxy REST endpoints.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

/// HAProxy backend as stored by pfSense.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    /// Remote identifier, only known for objects read back from pfSense
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub check_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub monitor_uri: String,
    #[serde(
        default,
        rename = "monitor_httpversion",
        deserialize_with = "null_as_default"
    )]
    pub monitor_http_version: String,
    /// Base64 encoded block of raw HAProxy directives
    #[serde(default, deserialize_with = "null_as_default")]
    pub advanced_backend: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub servers: Vec<BackendServer>,
}

/// A single server inside a backend pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendServer {
    pub name: String,
    pub address: String,
    #[serde(deserialize_with = "string_or_number")]
    pub port: String,
}

/// HAProxy frontend with its access rules and routing actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frontend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(rename = "ha_acls", default, deserialize_with = "null_as_default")]
    pub acls: Vec<Acl>,
    #[serde(
        rename = "a_actionitems",
        default,
        deserialize_with = "null_as_default"
    )]
    pub actions: Vec<Action>,
}

/// Named condition evaluated against incoming requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub expression: String,
    pub value: String,
}

impl Acl {
    /// Compares the rule itself, ignoring the remote identifier.
    pub fn same_rule(&self, other: &Acl) -> bool {
        self.name == other.name && self.expression == other.expression && self.value == other.value
    }
}

/// Binding of an ACL to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub action: String,
    pub acl: String,
    pub backend: String,
}

impl Action {
    /// Compares the binding itself, ignoring the remote identifier.
    pub fn same_binding(&self, other: &Action) -> bool {
        self.action == other.action && self.acl == other.acl && self.backend == other.backend
    }
}

/// Request body for appending an ACL to an existing frontend.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AclRequest<'a> {
    pub parent_id: u64,
    pub name: &'a str,
    pub expression: &'a str,
    pub value: &'a str,
}

/// Request body for appending an action to an existing frontend.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ActionRequest<'a> {
    pub parent_id: u64,
    pub action: &'a str,
    pub acl: &'a str,
    pub backend: &'a str,
}

/// Response envelope shared by every pfSense REST endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: u16,
    /// Payload kept untyped until the caller decides what it should be
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Value,
}

impl ApiResponse {
    /// Wraps a body that is not a JSON envelope, keeping the text as message.
    pub fn from_plain_text(status: u16, body: &str) -> Self {
        Self {
            status: String::new(),
            message: body.trim().to_string(),
            code: status,
            data: Value::Null,
        }
    }
}

/// Treats an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts ports encoded either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => Ok(s),
        StringOrNumber::Number(n) => Ok(n.to_string()),
    }
}
