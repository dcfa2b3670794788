//! reqwest based client for the pfSense REST API (v2).

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::api::HaproxyApi;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::error::ApiResult;
use crate::types::Acl;
use crate::types::AclRequest;
use crate::types::Action;
use crate::types::ActionRequest;
use crate::types::ApiResponse;
use crate::types::Backend;
use crate::types::Frontend;

const API_KEY_HEADER: &str = "x-api-key";

const BACKENDS_PATH: &str = "/services/haproxy/backends?limit=0&offset=0";
const BACKEND_PATH: &str = "/services/haproxy/backend";
const FRONTENDS_PATH: &str = "/services/haproxy/frontends?limit=0&offset=0";
const FRONTEND_PATH: &str = "/services/haproxy/frontend";
const FRONTEND_ACL_PATH: &str = "/services/haproxy/frontend/acl";
const FRONTEND_ACTION_PATH: &str = "/services/haproxy/frontend/action";
const APPLY_PATH: &str = "/services/haproxy/apply";

/// Client for a single pfSense instance.
#[derive(Debug, Clone)]
pub struct PfSenseClient {
    http: reqwest::Client,
    base_url: String,
}

impl PfSenseClient {
    /// Build a client from its connection settings.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Configuration`] if the base url or api key is unusable
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        Url::parse(&config.base_url).change_context_lazy(|| ApiError::Configuration {
            message: format!("invalid base url `{}`", config.base_url),
        })?;

        let mut api_key =
            HeaderValue::from_str(&config.api_key).change_context(ApiError::Configuration {
                message: "api key is not a valid header value".to_string(),
            })?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure_tls)
            .default_headers(headers)
            .build()
            .change_context(ApiError::Configuration {
                message: "failed to create HTTP client".to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn request<B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<ApiResponse>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Sending pfSense API request");

        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .change_context_lazy(|| ApiError::Network {
                message: format!("{method} {path} failed"),
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .change_context_lazy(|| ApiError::Network {
                message: format!("failed to read response body of {method} {path}"),
            })?;

        let envelope = match decode_envelope(status, &text) {
            Ok(envelope) => envelope,
            Err(_) if status >= 400 => ApiResponse::from_plain_text(status, &text),
            Err(report) => return Err(report.attach_printable(format!("request: {method} {path}"))),
        };

        if status >= 400 || envelope.code >= 400 {
            let message = if envelope.message.is_empty() {
                text.trim().to_string()
            } else {
                envelope.message
            };
            let status = if status >= 400 { status } else { envelope.code };
            return Err(Report::new(ApiError::Http { status, message })
                .attach_printable(format!("request: {method} {path}")));
        }

        Ok(envelope)
    }

    async fn send<B>(&self, method: Method, path: &str, body: &B) -> ApiResult<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        self.request(method, path, Some(body)).await.map(|_| ())
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Vec<T>> {
        let envelope = self.request::<Value>(Method::GET, path, None).await?;
        decode_list(envelope.data).attach_printable_lazy(|| format!("request: GET {path}"))
    }
}

/// Only a body that is not JSON at all counts as plain text; JSON that does
/// not fit the envelope is an error.
fn decode_envelope(status: u16, text: &str) -> ApiResult<ApiResponse> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Ok(ApiResponse::from_plain_text(status, text));
    };
    serde_json::from_value(value).change_context(ApiError::Serialization {
        message: "unexpected response envelope".to_string(),
    })
}

fn decode_list<T: DeserializeOwned>(data: Value) -> ApiResult<Vec<T>> {
    if data.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(data).change_context(ApiError::Serialization {
        message: "unexpected list payload".to_string(),
    })
}

fn require_id(id: Option<u64>, name: &str) -> ApiResult<u64> {
    id.ok_or_else(|| {
        Report::new(ApiError::MissingField {
            name: name.to_string(),
            field: "id",
        })
    })
}

#[async_trait]
impl HaproxyApi for PfSenseClient {
    async fn list_backends(&self) -> ApiResult<Vec<Backend>> {
        self.list(BACKENDS_PATH).await
    }

    async fn create_backend(&self, backend: &Backend) -> ApiResult<()> {
        let body = Backend {
            id: None,
            ..backend.clone()
        };
        self.send(Method::POST, BACKEND_PATH, &body).await
    }

    async fn update_backend(&self, backend: &Backend) -> ApiResult<()> {
        require_id(backend.id, &backend.name)?;
        self.send(Method::PATCH, BACKEND_PATH, backend).await
    }

    async fn list_frontends(&self) -> ApiResult<Vec<Frontend>> {
        self.list(FRONTENDS_PATH).await
    }

    async fn create_frontend(&self, frontend: &Frontend) -> ApiResult<()> {
        let body = Frontend {
            id: None,
            ..frontend.clone()
        };
        self.send(Method::POST, FRONTEND_PATH, &body).await
    }

    async fn add_frontend_acl(&self, frontend_id: u64, acl: &Acl) -> ApiResult<()> {
        let body = AclRequest {
            parent_id: frontend_id,
            name: &acl.name,
            expression: &acl.expression,
            value: &acl.value,
        };
        self.send(Method::POST, FRONTEND_ACL_PATH, &body).await
    }

    async fn add_frontend_action(&self, frontend_id: u64, action: &Action) -> ApiResult<()> {
        let body = ActionRequest {
            parent_id: frontend_id,
            action: &action.action,
            acl: &action.acl,
            backend: &action.backend,
        };
        self.send(Method::POST, FRONTEND_ACTION_PATH, &body).await
    }

    async fn apply_changes(&self) -> ApiResult<()> {
        self.send(Method::POST, APPLY_PATH, &serde_json::json!({}))
            .await
    }
}
