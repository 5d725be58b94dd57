//! Integration tests for gateway-admission.
//!
//! These tests use wiremock backends to verify failover, admission
//! middleware and the combined gateway over real HTTP.

use gateway_admission::{
    AccessPolicy, AccessPolicyConfig, AdmissionContext, AdmissionMiddleware,
    AdmissionPipeline, Denial, FailoverRouter, Gateway, GatewayError, HttpMethod,
    InMemoryResources, ProxyRequest, RateLimitStore, Resource, UsageLimits,
};
use http::Method;
use reqwest_middleware::ClientBuilder;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Nothing listens here, so connections are refused immediately.
const REFUSED: &str = "http://127.0.0.1:1";

/// A backend that answers every request with `status`.
async fn backend(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_string("ok"))
        .mount(&server)
        .await;
    server
}

fn users_resource(backend_id: &str, per_minute: u32) -> Resource {
    Resource {
        id: "users-api".into(),
        active: true,
        backend_id: backend_id.into(),
        policy: AccessPolicy::compile(&AccessPolicyConfig {
            allowed_endpoints: vec!["users/*".into()],
            blocked_endpoints: vec!["users/admin".into()],
            allowed_methods: [HttpMethod::Get, HttpMethod::Post].into_iter().collect(),
            ..Default::default()
        })
        .unwrap(),
        limits: UsageLimits {
            requests_per_minute: per_minute,
            ..UsageLimits::unlimited()
        },
    }
}

fn pipeline(resource: Resource) -> AdmissionPipeline {
    let resources = InMemoryResources::new();
    resources.insert(resource);
    AdmissionPipeline::new(Arc::new(resources), Arc::new(RateLimitStore::new()))
}

fn gateway_error(err: &reqwest_middleware::Error) -> Option<&GatewayError> {
    match err {
        reqwest_middleware::Error::Middleware(inner) => inner.downcast_ref::<GatewayError>(),
        reqwest_middleware::Error::Reqwest(_) => None,
    }
}

// =============================================================================
// Failover Tests
// =============================================================================

#[tokio::test]
async fn test_failover_to_next_healthy_endpoint() {
    let a = backend(500).await;
    let b = backend(200).await;
    let c = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&c)
        .await;

    let router = FailoverRouter::builder()
        .backend("1", |e| e.endpoints([a.uri(), b.uri(), c.uri()]))
        .timeout(Duration::from_secs(5))
        .build();

    let result = router
        .proxy("1", &ProxyRequest::new(Method::GET, "/status"))
        .await
        .unwrap();

    assert_eq!(result.endpoint_used, b.uri());
    assert!(result.used_fallback);
    assert_eq!(result.response.body, b"ok");

    let health = router.endpoint_health_snapshot();
    assert_eq!(health[&a.uri()].failure_count, 1);
    assert!(health[&a.uri()].healthy, "one failure is below the threshold");
    assert!(!health.contains_key(&c.uri()));
}

#[tokio::test]
async fn test_self_hosted_served_first() {
    let own = backend(200).await;
    let public = backend(200).await;

    let router = FailoverRouter::builder()
        .backend("1", |e| e.self_hosted(own.uri()).endpoint(public.uri()))
        .build();

    let result = router
        .proxy("1", &ProxyRequest::new(Method::GET, "/"))
        .await
        .unwrap();

    assert_eq!(result.endpoint_used, own.uri());
    assert!(!result.used_fallback);
    assert_eq!(public.received_requests().await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_connection_refused_counts_as_failure() {
    let healthy = backend(200).await;

    let router = FailoverRouter::builder()
        .backend("1", |e| e.endpoint(REFUSED).endpoint(healthy.uri()))
        .timeout(Duration::from_secs(5))
        .build();

    for _ in 0..3 {
        let result = router
            .proxy("1", &ProxyRequest::new(Method::GET, "/"))
            .await
            .unwrap();
        assert_eq!(result.endpoint_used, healthy.uri());
    }

    // Three refusals take the endpoint out of rotation.
    let candidates = router.resolve_endpoints("1").unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].url, healthy.uri());
    assert!(!router.health_tracker().is_healthy(REFUSED));
}

#[tokio::test]
async fn test_all_endpoints_failed_hides_urls() {
    let a = backend(503).await;
    let b = backend(502).await;

    let router = FailoverRouter::builder()
        .backend("1", |e| e.endpoint(a.uri()).endpoint(b.uri()))
        .build();

    let err = router
        .proxy("1", &ProxyRequest::new(Method::GET, "/"))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(
        matches!(err, GatewayError::AllEndpointsFailed { .. }),
        "unexpected error: {message}"
    );
    assert!(message.contains("502"), "last failure should be reported: {message}");
    assert!(!message.contains(&a.uri()) && !message.contains(&b.uri()));
}

#[tokio::test]
async fn test_refused_error_message_hides_url() {
    let router = FailoverRouter::builder()
        .backend("1", |e| e.endpoint(REFUSED))
        .build();

    let err = router
        .proxy("1", &ProxyRequest::new(Method::GET, "/"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::AllEndpointsFailed { .. }));
    assert!(!err.to_string().contains("127.0.0.1"), "{err}");
}

#[tokio::test]
async fn test_slow_endpoint_times_out_and_fails_over() {
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&slow)
        .await;
    let fast = backend(200).await;

    let router = FailoverRouter::builder()
        .backend("1", |e| e.endpoint(slow.uri()).endpoint(fast.uri()))
        .timeout(Duration::from_millis(200))
        .build();

    let result = router
        .proxy("1", &ProxyRequest::new(Method::GET, "/"))
        .await
        .unwrap();

    assert_eq!(result.endpoint_used, fast.uri());
    assert!(result.latency_ms < 1_000);
    assert_eq!(router.endpoint_health_snapshot()[&slow.uri()].failure_count, 1);
}

// =============================================================================
// JSON-RPC Relay Tests
// =============================================================================

#[tokio::test]
async fn test_json_rpc_body_is_relayed() {
    let server = MockServer::start().await;
    let call = json!({"jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber", "params": []});
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_json(&call))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0x10d4f"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let router = FailoverRouter::builder()
        .backend("1", |e| e.endpoint(server.uri()))
        .build();

    let result = router
        .proxy("1", &ProxyRequest::json_rpc(call))
        .await
        .unwrap();

    let body: Value = result.response.json().unwrap();
    assert_eq!(body["result"], "0x10d4f");
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let server = MockServer::start().await;
    for id in 0..5 {
        Mock::given(method("POST"))
            .and(body_json(json!({"jsonrpc": "2.0", "id": id, "method": "eth_chainId"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": id})))
            .mount(&server)
            .await;
    }

    let router = FailoverRouter::builder()
        .backend("1", |e| e.endpoint(server.uri()))
        .build();

    let requests: Vec<_> = (0..5)
        .map(|id| ProxyRequest::json_rpc(json!({"jsonrpc": "2.0", "id": id, "method": "eth_chainId"})))
        .collect();

    let results = router.proxy_batch("1", &requests).await.unwrap();
    assert_eq!(results.len(), 5);
    for (id, result) in results.into_iter().enumerate() {
        let body: Value = result.unwrap().response.json().unwrap();
        assert_eq!(body["id"], id);
    }
}

// =============================================================================
// Admission Middleware Tests
// =============================================================================

#[tokio::test]
async fn test_middleware_admits_and_counts() {
    let server = backend(200).await;
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(AdmissionMiddleware::new(pipeline(users_resource("unused", 2))))
        .build();

    let url = format!("{}/users/42?expand=orders", server.uri());
    for _ in 0..2 {
        client
            .get(&url)
            .with_extension(AdmissionContext::new("0xabc", "users-api"))
            .send()
            .await
            .unwrap();
    }

    let err = client
        .get(&url)
        .with_extension(AdmissionContext::new("0xabc", "users-api"))
        .send()
        .await
        .unwrap_err();

    let denial = gateway_error(&err).and_then(GatewayError::denial);
    assert!(
        matches!(denial, Some(Denial::RateLimited { .. })),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains("rate limit exceeded"), "{err}");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    // Another subject has its own quota.
    client
        .get(&url)
        .with_extension(AdmissionContext::new("0xdef", "users-api"))
        .send()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_middleware_blocks_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let admission = pipeline(users_resource("unused", 10));
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(AdmissionMiddleware::new(admission.clone()))
        .build();

    let err = client
        .get(format!("{}/users/admin", server.uri()))
        .with_extension(AdmissionContext::new("0xabc", "users-api"))
        .send()
        .await
        .unwrap_err();
    assert_eq!(
        gateway_error(&err).and_then(GatewayError::denial),
        Some(&Denial::EndpointBlocked("users/admin".into()))
    );

    let err = client
        .delete(format!("{}/users/42", server.uri()))
        .with_extension(AdmissionContext::new("0xabc", "users-api"))
        .send()
        .await
        .unwrap_err();
    assert_eq!(
        gateway_error(&err).and_then(GatewayError::denial),
        Some(&Denial::MethodNotAllowed("DELETE".into()))
    );

    assert!(
        admission
            .rate_limits()
            .usage(&gateway_admission::usage_key("0xabc", "users-api"))
            .is_none(),
        "denied requests are not counted"
    );
}

#[tokio::test]
async fn test_middleware_checks_origin_domain() {
    let server = backend(200).await;
    let mut resource = users_resource("unused", 10);
    resource.policy = AccessPolicy::compile(&AccessPolicyConfig {
        allowed_domains: vec!["*.example.com".into()],
        ..Default::default()
    })
    .unwrap();
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(AdmissionMiddleware::new(pipeline(resource)))
        .build();

    let url = format!("{}/users/1", server.uri());
    client
        .get(&url)
        .with_extension(AdmissionContext::new("0xabc", "users-api").origin("app.example.com"))
        .send()
        .await
        .unwrap();

    let err = client
        .get(&url)
        .with_extension(AdmissionContext::new("0xabc", "users-api").origin("evil.net"))
        .send()
        .await
        .unwrap_err();
    assert_eq!(
        gateway_error(&err).and_then(GatewayError::denial),
        Some(&Denial::DomainNotAllowed("evil.net".into()))
    );
}

#[tokio::test]
async fn test_middleware_requires_context() {
    let server = backend(200).await;
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(AdmissionMiddleware::new(pipeline(users_resource("unused", 10))))
        .build();

    let err = client
        .get(format!("{}/users/1", server.uri()))
        .send()
        .await
        .unwrap_err();
    assert!(matches!(
        gateway_error(&err),
        Some(GatewayError::MissingAdmissionContext)
    ));

    let err = client
        .get(format!("{}/users/1", server.uri()))
        .with_extension(AdmissionContext::new("0xabc", "nope"))
        .send()
        .await
        .unwrap_err();
    assert_eq!(
        gateway_error(&err).and_then(GatewayError::denial),
        Some(&Denial::ResourceNotFound("nope".into()))
    );
}

// =============================================================================
// Gateway Tests
// =============================================================================

#[tokio::test]
async fn test_gateway_end_to_end() {
    let hits = Arc::new(AtomicUsize::new(0));
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .respond_with({
            let hits = hits.clone();
            move |_: &wiremock::Request| {
                hits.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(json!({"id": 42}))
            }
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/42"))
        .and(body_json(json!({"name": "ada"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "name": "ada"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let router = FailoverRouter::builder()
        .backend("users-backend", |e| e.endpoint(REFUSED).endpoint(server.uri()))
        .timeout(Duration::from_secs(5))
        .build();
    let gateway = Gateway::new(pipeline(users_resource("users-backend", 10)), router);
    let caller = AdmissionContext::new("0xabc", "users-api");

    let result = gateway
        .forward(&caller, &ProxyRequest::new(Method::GET, "/users/42"))
        .await
        .unwrap();
    assert_eq!(result.endpoint_used, server.uri());
    assert!(result.used_fallback);
    assert_eq!(result.response.json::<Value>().unwrap()["id"], 42);

    let update = ProxyRequest::new(Method::POST, "/users/42").with_body(json!({"name": "ada"}));
    let result = gateway.forward(&caller, &update).await.unwrap();
    assert_eq!(result.response.json::<Value>().unwrap()["name"], "ada");

    let err = gateway
        .forward(&caller, &ProxyRequest::new(Method::GET, "/users/admin"))
        .await
        .unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&Denial::EndpointBlocked("users/admin".into()))
    );

    let err = gateway
        .forward(&caller, &ProxyRequest::new(Method::DELETE, "/users/admin"))
        .await
        .unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&Denial::EndpointBlocked("users/admin".into()))
    );

    let err = gateway
        .forward(&caller, &ProxyRequest::new(Method::DELETE, "/users/42"))
        .await
        .unwrap_err();
    assert_eq!(
        err.denial(),
        Some(&Denial::MethodNotAllowed("DELETE".into()))
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1, "denied request must not be sent");
}

#[tokio::test]
async fn test_gateway_concurrent_admissions_respect_quota() {
    let server = backend(200).await;
    let router = FailoverRouter::builder()
        .backend("users-backend", |e| e.endpoint(server.uri()))
        .build();
    let gateway = Gateway::new(pipeline(users_resource("users-backend", 5)), router);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let gateway = gateway.clone();
        handles.push(tokio::spawn(async move {
            let caller = AdmissionContext::new("0xabc", "users-api");
            gateway
                .forward(&caller, &ProxyRequest::new(Method::GET, "/users/7"))
                .await
                .is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(server.received_requests().await.unwrap().len(), 5);
}
