//! Label schemas
//!
//! Two schemas are understood. The native schema (`pfsense-controller.*`)
//! describes both backend and frontend. The Traefik compatibility schema only
//! provides backend discovery; its frontend still comes from the native
//! frontend labels. Schemas are tried in order and the first valid one wins.

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;

use super::common::*;
use super::rule::parse_rule;
use super::rule::ParsedRule;
use super::LabelError;
use crate::container::ContainerInfo;

type LabelResult<T> = Result<T, Report<LabelError>>;

/// Which schema produced a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ParseMode {
    #[display("controller")]
    Native,
    #[display("traefik")]
    Compat,
}

/// Backend health check flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CheckType {
    /// no probe at all
    #[display("none")]
    None,
    /// TCP connect probe
    #[display("basic")]
    Basic,
    #[display("http")]
    Http,
}

impl CheckType {
    /// Case-insensitive parse of the check type label.
    pub fn parse(value: &str) -> LabelResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "http" => Ok(Self::Http),
            _ => Err(Report::new(LabelError::InvalidCheckType {
                value: value.to_string(),
            })),
        }
    }
}

/// Desired backend derived from labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    pub name: String,
    pub server_name: String,
    pub port: String,
    pub address: String,
    pub check_type: CheckType,
    pub health_check_path: String,
    pub health_check_method: String,
    pub health_check_version: String,
    /// Raw HAProxy directive forwarded to the backend
    pub pass_through: String,
}

/// Desired frontend rule derived from labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendSpec {
    pub name: String,
    /// rule as written in the label
    pub rule: String,
    pub matcher: ParsedRule,
    pub acl_name: String,
}

/// Everything the reconciler needs to converge one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    pub enabled: bool,
    pub parse_mode: ParseMode,
    pub endpoint_name: String,
    pub backend: BackendSpec,
    pub frontend: FrontendSpec,
}

/// Remote object names a container maps to.
///
/// Unlike [`ContainerConfig`] these need neither an address nor a valid
/// port, so they can still be derived for stopped or destroyed containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedNames {
    pub parse_mode: ParseMode,
    pub endpoint_name: String,
    pub backend: String,
    /// `None` when neither a frontend name nor a rule label is set
    pub frontend: Option<String>,
    pub acl: Option<String>,
}

/// A label schema: its opt-in label and how to read it.
struct Schema {
    mode: ParseMode,
    enable_label: &'static str,
    translate: fn(&ContainerInfo) -> LabelResult<ContainerConfig>,
    names: fn(&ContainerInfo) -> Option<ManagedNames>,
}

impl Schema {
    fn opted_in(&self, container: &ContainerInfo) -> bool {
        container.label(self.enable_label) == Some(TRUE_VALUE)
    }
}

/// Schemas in priority order; the native schema is always first.
static SCHEMAS: [Schema; 2] = [
    Schema {
        mode: ParseMode::Native,
        enable_label: ENABLE_LABEL,
        translate: translate_native,
        names: native_names,
    },
    Schema {
        mode: ParseMode::Compat,
        enable_label: TRAEFIK_ENABLE_LABEL,
        translate: translate_compat,
        names: compat_names,
    },
];

/// Converts container labels into a [`ContainerConfig`].
#[derive(Debug, Clone, Copy)]
pub struct LabelTranslator {
    compat_mode: bool,
}

impl LabelTranslator {
    pub fn new(compat_mode: bool) -> Self {
        Self { compat_mode }
    }

    pub fn compat_mode(&self) -> bool {
        self.compat_mode
    }

    fn schemas(&self) -> &'static [Schema] {
        if self.compat_mode {
            &SCHEMAS
        } else {
            &SCHEMAS[..1]
        }
    }

    /// Translate a container's labels.
    ///
    /// Returns `Ok(None)` when the container did not opt in to any schema.
    ///
    /// # Errors
    ///
    /// - [`LabelError::NoApplicableConfig`] when the container opted in but no
    ///   schema yielded a valid configuration; every schema failure is attached
    pub fn translate(&self, container: &ContainerInfo) -> LabelResult<Option<ContainerConfig>> {
        let mut failures: Option<Report<LabelError>> = None;

        for schema in self.schemas() {
            if !schema.opted_in(container) {
                continue;
            }
            match (schema.translate)(container) {
                Ok(config) => return Ok(Some(config)),
                Err(report) => {
                    debug!(
                        container = %container.name,
                        mode = %schema.mode,
                        "Label schema rejected: {report:?}"
                    );
                    let report = report.change_context(LabelError::InvalidSchema { mode: schema.mode });
                    match failures.as_mut() {
                        Some(existing) => existing.extend_one(report),
                        None => failures = Some(report),
                    }
                }
            }
        }

        match failures {
            None => Ok(None),
            Some(report) => Err(report.change_context(LabelError::NoApplicableConfig {
                container: container.name.clone(),
            })),
        }
    }

    /// Object names of the first opted-in schema that recognizes the
    /// container's backend labels.
    pub fn managed_names(&self, container: &ContainerInfo) -> Option<ManagedNames> {
        self.schemas()
            .iter()
            .filter(|schema| schema.opted_in(container))
            .find_map(|schema| (schema.names)(container))
    }
}

fn translate_native(container: &ContainerInfo) -> LabelResult<ContainerConfig> {
    let port = required_label(container, BACKEND_PORT_LABEL)?;
    let frontend = frontend_spec(container)?;
    let address = container_address(container)?;

    let container_name = sanitize_name(&container.name);
    let name = native_backend_name(container, &container_name);
    let server_name = non_empty_label(container, SERVER_NAME_LABEL)
        .map(str::to_string)
        .unwrap_or(container_name);

    let backend = backend_spec(container, name, server_name, port, address)?;

    Ok(ContainerConfig {
        enabled: true,
        parse_mode: ParseMode::Native,
        endpoint_name: endpoint_name(container),
        backend,
        frontend,
    })
}

fn translate_compat(container: &ContainerInfo) -> LabelResult<ContainerConfig> {
    let (service, port) =
        find_service_port(container).ok_or_else(|| Report::new(LabelError::MissingServicePort))?;
    let frontend = frontend_spec(container)?;
    let address = container_address(container)?;

    let container_name = sanitize_name(&container.name);
    let name = compat_backend_name(service, &container_name);

    let backend = backend_spec(container, name, container_name, port, address)?;

    Ok(ContainerConfig {
        enabled: true,
        parse_mode: ParseMode::Compat,
        endpoint_name: endpoint_name(container),
        backend,
        frontend,
    })
}

fn native_names(container: &ContainerInfo) -> Option<ManagedNames> {
    non_empty_label(container, BACKEND_PORT_LABEL)?;
    let backend = native_backend_name(container, &sanitize_name(&container.name));
    Some(names_for(container, ParseMode::Native, backend))
}

fn compat_names(container: &ContainerInfo) -> Option<ManagedNames> {
    let (service, _) = find_service_port(container)?;
    let backend = compat_backend_name(service, &sanitize_name(&container.name));
    Some(names_for(container, ParseMode::Compat, backend))
}

fn names_for(container: &ContainerInfo, parse_mode: ParseMode, backend: String) -> ManagedNames {
    let rule = non_empty_label(container, FRONTEND_RULE_LABEL);
    ManagedNames {
        parse_mode,
        endpoint_name: endpoint_name(container),
        backend,
        frontend: frontend_name(container, rule),
        acl: acl_name(container, rule),
    }
}

fn native_backend_name(container: &ContainerInfo, container_name: &str) -> String {
    non_empty_label(container, BACKEND_NAME_LABEL)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{container_name}-backend"))
}

fn compat_backend_name(service: Option<&str>, container_name: &str) -> String {
    match service {
        Some(service) => format!("{}-backend", sanitize_name(service)),
        None => format!("{container_name}-backend"),
    }
}

fn frontend_name(container: &ContainerInfo, rule: Option<&str>) -> Option<String> {
    non_empty_label(container, FRONTEND_NAME_LABEL)
        .map(str::to_string)
        .or_else(|| rule.map(|rule| format!("auto-frontend-{}", rule_slug(rule))))
}

fn acl_name(container: &ContainerInfo, rule: Option<&str>) -> Option<String> {
    non_empty_label(container, FRONTEND_ACL_NAME_LABEL)
        .map(str::to_string)
        .or_else(|| rule.map(|rule| format!("auto-acl-{}", rule_slug(rule))))
}

/// Scan keys for `<prefix>.http.services.<service>.loadbalancer.server.port`.
///
/// Keys are visited in lexical order and the first match wins. The service
/// name is everything between the services segment and the port suffix.
fn find_service_port(container: &ContainerInfo) -> Option<(Option<&str>, &str)> {
    container.labels.iter().find_map(|(key, port)| {
        let head = key.strip_suffix(TRAEFIK_PORT_SUFFIX)?;
        let start = head.find(TRAEFIK_SERVICES_SEGMENT)? + TRAEFIK_SERVICES_SEGMENT.len();
        let service = &head[start..];
        let service = (!service.is_empty()).then_some(service);
        Some((service, port.as_str()))
    })
}

fn backend_spec(
    container: &ContainerInfo,
    name: String,
    server_name: String,
    port: &str,
    address: &str,
) -> LabelResult<BackendSpec> {
    validate_port(port)?;

    let check_type = match non_empty_label(container, CHECK_TYPE_LABEL) {
        Some(value) => CheckType::parse(value)?,
        None => CheckType::Basic,
    };

    let (health_check_path, health_check_method, health_check_version) = match check_type {
        CheckType::None | CheckType::Basic => (String::new(), String::new(), String::new()),
        CheckType::Http => {
            let path = non_empty_label(container, HEALTH_CHECK_PATH_LABEL)
                .ok_or_else(|| Report::new(LabelError::MissingHealthCheckPath))?;
            let method = non_empty_label(container, HEALTH_CHECK_METHOD_LABEL).unwrap_or("OPTIONS");
            // pfSense expects the escapes literally, HAProxy expands them.
            let version = format!("HTTP/1.1\\r\\nHost:\\ {address}");
            (path.to_string(), method.to_string(), version)
        }
    };

    Ok(BackendSpec {
        name,
        server_name,
        port: port.to_string(),
        address: address.to_string(),
        check_type,
        health_check_path,
        health_check_method,
        health_check_version,
        pass_through: format!("http-request set-header Host {address}"),
    })
}

fn frontend_spec(container: &ContainerInfo) -> LabelResult<FrontendSpec> {
    let rule = required_label(container, FRONTEND_RULE_LABEL)?;
    let matcher = parse_rule(rule)?;

    Ok(FrontendSpec {
        name: frontend_name(container, Some(rule)).unwrap_or_default(),
        rule: rule.to_string(),
        matcher,
        acl_name: acl_name(container, Some(rule)).unwrap_or_default(),
    })
}

fn endpoint_name(container: &ContainerInfo) -> String {
    non_empty_label(container, ENDPOINT_LABEL)
        .unwrap_or(DEFAULT_ENDPOINT)
        .to_string()
}

fn container_address(container: &ContainerInfo) -> LabelResult<&str> {
    container
        .address()
        .ok_or_else(|| Report::new(LabelError::NoAddress))
}

fn validate_port(port: &str) -> LabelResult<()> {
    match port.parse::<u16>() {
        Ok(value) if value > 0 => Ok(()),
        _ => Err(Report::new(LabelError::InvalidPort {
            value: port.to_string(),
        })),
    }
}

fn non_empty_label<'a>(container: &'a ContainerInfo, key: &str) -> Option<&'a str> {
    container.label(key).filter(|value| !value.is_empty())
}

fn required_label<'a>(container: &'a ContainerInfo, key: &'static str) -> LabelResult<&'a str> {
    non_empty_label(container, key)
        .ok_or_else(|| Report::new(LabelError::MissingLabel { label: key }))
        .attach_printable_lazy(|| format!("container: {}", container.name))
}
