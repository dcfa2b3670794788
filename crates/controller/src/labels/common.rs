use super::rule::parse_rule;
use super::rule::RuleOperator;

pub const ENABLE_LABEL: &str = "pfsense-controller.enable";
pub const ENDPOINT_LABEL: &str = "pfsense-controller.endpoint";

pub const BACKEND_NAME_LABEL: &str = "pfsense-controller.backend.name";
pub const BACKEND_PORT_LABEL: &str = "pfsense-controller.backend.port";
pub const CHECK_TYPE_LABEL: &str = "pfsense-controller.backend.check_type";
pub const HEALTH_CHECK_PATH_LABEL: &str = "pfsense-controller.backend.health_check_path";
pub const HEALTH_CHECK_METHOD_LABEL: &str = "pfsense-controller.backend.health_check_method";
pub const SERVER_NAME_LABEL: &str = "pfsense-controller.backend.server_name";

pub const FRONTEND_NAME_LABEL: &str = "pfsense-controller.frontend.name";
pub const FRONTEND_RULE_LABEL: &str = "pfsense-controller.frontend.rule";
pub const FRONTEND_ACL_NAME_LABEL: &str = "pfsense-controller.frontend.acl_name";

pub const TRAEFIK_ENABLE_LABEL: &str = "traefik.enable";
/// Marker between the router prefix and the service name in a Traefik key.
pub const TRAEFIK_SERVICES_SEGMENT: &str = ".http.services.";
pub const TRAEFIK_PORT_SUFFIX: &str = ".loadbalancer.server.port";

pub const TRUE_VALUE: &str = "true";
pub const DEFAULT_ENDPOINT: &str = "default";

/// Restricts a name to `[A-Za-z0-9_-]` without repeated or boundary hyphens.
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(c);
    }
    sanitized.trim_matches('-').to_string()
}

/// Name fragment used for generated frontend and ACL names.
pub fn rule_slug(rule: &str) -> String {
    match parse_rule(rule) {
        Ok(parsed) => match parsed.operator {
            RuleOperator::HostMatches => sanitize_name(&parsed.value),
            RuleOperator::PathPrefix | RuleOperator::Path => {
                sanitize_name(&parsed.value.replace('/', "-"))
            }
        },
        Err(_) => sanitize_name(rule),
    }
}
