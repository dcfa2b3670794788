//! Desired remote objects for a translated container.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pfsense_api::Acl;
use pfsense_api::Action;
use pfsense_api::Backend;
use pfsense_api::BackendServer;
use pfsense_api::Frontend;

use crate::labels::BackendSpec;
use crate::labels::CheckType;
use crate::labels::ContainerConfig;

pub const USE_BACKEND_ACTION: &str = "use_backend";

/// Check type as spelled by the pfSense HAProxy package.
pub fn remote_check_type(check_type: CheckType) -> &'static str {
    match check_type {
        CheckType::None => "",
        CheckType::Basic => "Basic",
        CheckType::Http => "HTTP",
    }
}

/// Backend with a single server pointing at the container.
pub fn desired_backend(spec: &BackendSpec) -> Backend {
    let (monitor_uri, monitor_http_version) = match spec.check_type {
        CheckType::Http => (
            spec.health_check_path.clone(),
            spec.health_check_version.clone(),
        ),
        CheckType::None | CheckType::Basic => (String::new(), String::new()),
    };

    Backend {
        id: None,
        name: spec.name.clone(),
        check_type: remote_check_type(spec.check_type).to_string(),
        monitor_uri,
        monitor_http_version,
        advanced_backend: STANDARD.encode(spec.pass_through.as_bytes()),
        servers: vec![BackendServer {
            name: spec.server_name.clone(),
            address: spec.address.clone(),
            port: spec.port.clone(),
        }],
    }
}

/// Frontend carrying one ACL for the container's rule and one action routing
/// it to the container's backend.
pub fn desired_frontend(config: &ContainerConfig) -> Frontend {
    let frontend = &config.frontend;
    Frontend {
        id: None,
        name: frontend.name.clone(),
        acls: vec![Acl {
            id: None,
            name: frontend.acl_name.clone(),
            expression: frontend.matcher.operator.to_string(),
            value: frontend.matcher.value.clone(),
        }],
        actions: vec![Action {
            id: None,
            action: USE_BACKEND_ACTION.to_string(),
            acl: frontend.acl_name.clone(),
            backend: config.backend.name.clone(),
        }],
    }
}
