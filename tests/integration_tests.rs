use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use smsgate::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Gateway {
    router: MockServer,
    _cache: TempDir,
    app: axum::Router,
}

async fn gateway() -> Gateway {
    let router = MockServer::start().await;
    let cache = TempDir::new().unwrap();

    let mut settings = RouterSettings::new(router.uri(), "admin".into(), "routerpw".into());
    settings.force_https = false;
    settings.cache_dir = Some(cache.path().to_path_buf());

    let processor = GatewayProcessor::new(Arc::new(TeltonikaConnector::new(settings)));
    let app = smsgate::prelude::router(AppState::new(processor));
    Gateway {
        router,
        _cache: cache,
        app,
    }
}

async fn mount_router_basics(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(body_partial_json(json!({"username": "admin", "password": "routerpw"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": {"token": "tok-1", "expires": 299}})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/modems/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                {"id": "2-1", "name": "Backup", "primary": false},
                {"id": "1-1.4", "name": "Internal", "primary": true}
            ]
        })))
        .mount(server)
        .await;
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn prtg_style_request_sends_through_primary_modem() {
    let gw = gateway().await;
    mount_router_basics(&gw.router).await;
    Mock::given(method("POST"))
        .and(path("/api/messages/actions/send"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({
            "data": {"number": "00491701234567", "message": "Server down", "modem": "1-1.4"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"sms_used": 1}})),
        )
        .expect(1)
        .mount(&gw.router)
        .await;

    let (status, body) = get(
        &gw.app,
        "/?username=prtg&password=whatever&number=%2B49%20170%201234567&text=Server%20down",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "SMS sent successfully");
    assert_eq!(body["sms_used"], 1);
    assert_eq!(body["phone_number"], "00491701234567");
    assert_eq!(body["message_length"], 11);
}

#[tokio::test]
async fn long_text_is_sent_in_numbered_parts() {
    let gw = gateway().await;
    mount_router_basics(&gw.router).await;
    Mock::given(method("POST"))
        .and(path("/api/messages/actions/send"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"sms_used": 1}})),
        )
        .expect(3)
        .mount(&gw.router)
        .await;

    let text = "lorem%20ipsum%20dolor%20sit%20amet%20".repeat(13);
    let (status, body) = get(
        &gw.app,
        &format!("/?username=u&password=p&number=01701234567&text={text}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parts"], 3);
    assert_eq!(body["sms_used"], 3);
    assert_eq!(body["message"], "SMS sent successfully (3 parts)");

    let requests = gw.router.received_requests().await.unwrap();
    let parts: Vec<String> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/messages/actions/send")
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["data"]["message"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(parts.len(), 3);
    for (i, part) in parts.iter().enumerate() {
        assert!(part.starts_with(&format!("{}/3: ", i + 1)));
        assert!(part.chars().count() <= 160);
    }
}

#[tokio::test]
async fn router_rejection_becomes_422() {
    let gw = gateway().await;
    mount_router_basics(&gw.router).await;
    Mock::given(method("POST"))
        .and(path("/api/messages/actions/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "errors": [{"error": "Not enough credit", "source": "sms"}]
        })))
        .mount(&gw.router)
        .await;

    let (status, body) = get(&gw.app, "/?username=u&password=p&number=0170&text=hi").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["detail"],
        "SMS sending failed (error from router): Not enough credit"
    );
}

#[tokio::test]
async fn router_login_failure_becomes_401() {
    let gw = gateway().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"success": false})))
        .mount(&gw.router)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/messages/actions/send"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&gw.router)
        .await;

    let (status, body) = get(&gw.app, "/?username=u&password=p&number=0170&text=hi").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Authentication with router failed");
}

#[tokio::test]
async fn invalid_requests_never_reach_the_router() {
    let gw = gateway().await;

    let (status, _) = get(&gw.app, "/?username=u&password=p&number=0170").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&gw.app, "/?username=u&password=p&number=&text=hi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("Phone number"));

    assert!(gw.router.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn health_does_not_touch_the_router() {
    let gw = gateway().await;
    let (status, body) = get(&gw.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "service": "SMS Gateway API"}));
    assert!(gw.router.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_requests_are_independent() {
    use futures::future;

    let gw = gateway().await;
    mount_router_basics(&gw.router).await;
    Mock::given(method("POST"))
        .and(path("/api/messages/actions/send"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"sms_used": 1}})),
        )
        .expect(10)
        .mount(&gw.router)
        .await;

    let requests = (0..10).map(|i| {
        let app = gw.app.clone();
        async move {
            let uri = format!("/?username=u&password=p&number=0170{i}&text=alert%20{i}");
            get(&app, &uri).await
        }
    });
    let results = future::join_all(requests).await;

    for (i, (status, body)) in results.into_iter().enumerate() {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phone_number"], format!("0170{i}"));
    }
}

#[tokio::test]
async fn config_file_drives_router_settings() {
    use std::io::Write;

    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "router:\n  url: http://10.0.0.1\n  username: admin\n  password: secret\n  default_modem: 2-1\nmessages:\n  max_length: 100"
    )
    .unwrap();

    let config = AppConfig::load_from(
        &Overrides {
            config_path: Some(file.path().to_path_buf()),
            ..Overrides::default()
        },
        Default::default(),
    )
    .unwrap();

    let settings = config.router.settings().unwrap();
    assert_eq!(settings.base_url(), "https://10.0.0.1");
    assert_eq!(settings.default_modem, "2-1");
    assert_eq!(config.split_options().max_length, 100);
}
