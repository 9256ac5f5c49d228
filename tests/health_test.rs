use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chatbot_api::{build_router, config::settings::Settings, services, AppState};

fn setup_test_server(vars: &'static [(&'static str, &'static str)]) -> TestServer {
    let settings = Settings::from_lookup(|name| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
    .unwrap();

    let provider = services::llm::build_provider(&settings);
    TestServer::new(build_router(AppState::new(settings, provider))).unwrap()
}

#[tokio::test]
async fn test_health_without_api_key() {
    let server = setup_test_server(&[("MODEL_PROVIDER", "echo")]);

    let response = server.get("/api/v1/health").await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_health_ignores_wrong_api_key() {
    let server = setup_test_server(&[("MODEL_PROVIDER", "echo")]);

    let response = server
        .get("/api/v1/health")
        .add_header(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static("wrong"),
        )
        .await;

    response.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_health_up_even_without_provider_credentials() {
    let server = setup_test_server(&[]);

    server.get("/api/v1/health").await.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_root_describes_service() {
    let server = setup_test_server(&[("MODEL_PROVIDER", "echo")]);

    let response = server.get("/").await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "AI Chatbot API");
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_cors_echoes_allowed_origin() {
    let server = setup_test_server(&[
        ("MODEL_PROVIDER", "echo"),
        ("ALLOWED_ORIGINS", "https://app.example"),
    ]);

    let response = server
        .get("/api/v1/health")
        .add_header(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("https://app.example"),
        )
        .await;

    response.assert_status(StatusCode::OK);
    assert_eq!(
        response.header("access-control-allow-origin"),
        "https://app.example"
    );
}
