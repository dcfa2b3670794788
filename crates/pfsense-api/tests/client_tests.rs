//! HTTP level tests for the pfSense client

use pfsense_api::Acl;
use pfsense_api::Action;
use pfsense_api::ApiError;
use pfsense_api::Backend;
use pfsense_api::BackendServer;
use pfsense_api::ClientConfig;
use pfsense_api::HaproxyApi;
use pfsense_api::PfSenseClient;
use serde_json::json;
use similar_asserts::assert_eq;
use test_log::test;
use wiremock::matchers::body_json;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

fn client_for(server: &MockServer) -> PfSenseClient {
    let config = ClientConfig::new(format!("{}/api/v2", server.uri()), "test-key");
    PfSenseClient::new(&config).expect("client config is valid")
}

fn envelope(data: serde_json::Value) -> serde_json::Value {
    json!({
        "code": 200,
        "status": "ok",
        "response_id": "SUCCESS",
        "message": "",
        "data": data,
    })
}

#[test(tokio::test)]
async fn list_backends_sends_api_key_and_decodes_data() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/services/haproxy/backends"))
        .and(query_param("limit", "0"))
        .and(query_param("offset", "0"))
        .and(header("x-api-key", "test-key"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            {
                "id": 0,
                "name": "web-backend",
                "check_type": "Basic",
                "monitor_uri": "",
                "monitor_httpversion": "",
                "advanced_backend": "",
                "servers": [{"name": "web", "address": "172.17.0.2", "port": "80"}]
            }
        ]))))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    // Act
    let backends = client.list_backends().await.expect("list succeeds");

    // Assert
    assert_eq!(backends.len(), 1, "one backend expected");
    assert_eq!(backends[0].id, Some(0));
    assert_eq!(
        backends[0].servers,
        vec![BackendServer {
            name: "web".to_string(),
            address: "172.17.0.2".to_string(),
            port: "80".to_string(),
        }]
    );
}

#[test(tokio::test)]
async fn find_backend_returns_none_for_unknown_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/services/haproxy/backends"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!([{ "id": 1, "name": "other-backend" }]))),
        )
        .mount(&server)
        .await;
    let client = client_for(&server);

    let found = client
        .find_backend("web-backend")
        .await
        .expect("lookup succeeds");

    assert!(found.is_none(), "unexpected match: {found:?}");
}

#[test(tokio::test)]
async fn http_error_carries_status_and_message() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/services/haproxy/apply"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": 401,
            "status": "unauthorized",
            "message": "Authentication failed",
            "data": []
        })))
        .mount(&server)
        .await;
    let client = client_for(&server);

    // Act
    let err = client.apply_changes().await.expect_err("401 must fail");

    // Assert
    match err.current_context() {
        ApiError::Http { status, message } => {
            assert_eq!(*status, 401);
            assert_eq!(message, "Authentication failed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test(tokio::test)]
async fn non_json_error_body_becomes_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/services/haproxy/frontends"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway\n"))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client.list_frontends().await.expect_err("502 must fail");

    match err.current_context() {
        ApiError::Http { status, message } => {
            assert_eq!(*status, 502);
            assert_eq!(message, "Bad Gateway");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test(tokio::test)]
async fn non_json_success_body_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/services/haproxy/apply"))
        .respond_with(ResponseTemplate::new(200).set_body_string("applied"))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    client
        .apply_changes()
        .await
        .expect("plain text success is accepted");
}

#[test(tokio::test)]
async fn update_backend_patches_with_id() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/services/haproxy/backend"))
        .and(body_json(json!({
            "id": 4,
            "name": "web-backend",
            "check_type": "",
            "monitor_uri": "",
            "monitor_httpversion": "",
            "advanced_backend": "",
            "servers": [{"name": "web", "address": "10.0.0.2", "port": "8080"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({}))))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);
    let backend = Backend {
        id: Some(4),
        name: "web-backend".to_string(),
        servers: vec![BackendServer {
            name: "web".to_string(),
            address: "10.0.0.2".to_string(),
            port: "8080".to_string(),
        }],
        ..Backend::default()
    };

    // Act
    client.update_backend(&backend).await.expect("update succeeds");

    // Assert is performed by the mock expectation when the server drops
}

#[test(tokio::test)]
async fn update_backend_without_id_is_rejected_locally() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let backend = Backend {
        name: "web-backend".to_string(),
        ..Backend::default()
    };

    let err = client
        .update_backend(&backend)
        .await
        .expect_err("id is mandatory");

    assert!(matches!(
        err.current_context(),
        ApiError::MissingField { field: "id", .. }
    ));
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty(), "no request should reach the server");
}

#[test(tokio::test)]
async fn frontend_acl_and_action_carry_parent_id() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/services/haproxy/frontend/acl"))
        .and(body_json(json!({
            "parent_id": 7,
            "name": "auto-acl-api",
            "expression": "path_beg",
            "value": "/api"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({}))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/services/haproxy/frontend/action"))
        .and(body_json(json!({
            "parent_id": 7,
            "action": "use_backend",
            "acl": "auto-acl-api",
            "backend": "api-backend"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({}))))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    // Act
    client
        .add_frontend_acl(
            7,
            &Acl {
                id: None,
                name: "auto-acl-api".to_string(),
                expression: "path_beg".to_string(),
                value: "/api".to_string(),
            },
        )
        .await
        .expect("acl appended");
    client
        .add_frontend_action(
            7,
            &Action {
                id: None,
                action: "use_backend".to_string(),
                acl: "auto-acl-api".to_string(),
                backend: "api-backend".to_string(),
            },
        )
        .await
        .expect("action appended");
}

#[test(tokio::test)]
async fn envelope_error_code_fails_even_with_http_200() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/services/haproxy/backend"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 400,
            "status": "bad request",
            "message": "Field `name` must be unique",
            "data": null
        })))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client
        .create_backend(&Backend {
            name: "dup-backend".to_string(),
            ..Backend::default()
        })
        .await
        .expect_err("envelope code 400 must fail");

    assert_eq!(err.current_context().status(), Some(400));
}

#[test(tokio::test)]
async fn null_envelope_fields_still_expose_existing_backend() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/services/haproxy/backends"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "status": "ok",
            "message": null,
            "data": [{"id": 0, "name": "web-backend", "servers": []}]
        })))
        .mount(&server)
        .await;
    let client = client_for(&server);

    // Act
    let found = client
        .find_backend("web-backend")
        .await
        .expect("lookup succeeds");

    // Assert
    let backend = found.expect("existing backend must be found");
    assert_eq!(backend.id, Some(0), "remote id is needed for the update");
}

#[test(tokio::test)]
async fn json_body_with_wrong_envelope_shape_is_an_error() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/services/haproxy/backends"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "200",
            "data": [{"id": 0, "name": "web-backend"}]
        })))
        .mount(&server)
        .await;
    let client = client_for(&server);

    // Act
    let err = client
        .find_backend("web-backend")
        .await
        .expect_err("malformed envelope must not look like an empty list");

    // Assert
    assert!(matches!(
        err.current_context(),
        ApiError::Serialization { .. }
    ));
}
