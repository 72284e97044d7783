//! HTTP API tests, driving the router in-process with `tower::ServiceExt`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use common::{manager_with_sources, write_database, KNOWN_IP};
use gunter::api::{router, AppState};
use gunter::config::SourceConfig;
use gunter::geoip::LifecycleManager;
use gunter::whois::WhoisService;

struct TestApp {
    router: Router,
    _temp_dir: TempDir,
}

async fn loaded_manager(temp_dir: &TempDir) -> Arc<LifecycleManager> {
    let file = temp_dir.path().join("city.json");
    write_database(&file, "v1");
    let manager = manager_with_sources(
        temp_dir.path(),
        SourceConfig {
            local_file: Some(file),
            ..Default::default()
        },
    );
    assert!(manager.refresh().await.is_swapped());
    manager
}

fn app_with(manager: Arc<LifecycleManager>, rdap: &Server, enable_status: bool) -> Router {
    let whois = WhoisService::new(&rdap.url_str("/rdap"), None).expect("whois service");
    router(AppState {
        manager,
        whois: Arc::new(whois),
        default_lang: "en".to_string(),
        enable_status,
    })
}

async fn loaded_app(rdap: &Server) -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let manager = loaded_manager(&temp_dir).await;
    TestApp {
        router: app_with(manager, rdap, true),
        _temp_dir: temp_dir,
    }
}

fn empty_app(rdap: &Server, enable_status: bool) -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let manager = manager_with_sources(temp_dir.path(), SourceConfig::default());
    TestApp {
        router: app_with(manager, rdap, enable_status),
        _temp_dir: temp_dir,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, body)
}

#[tokio::test]
async fn test_geo_lookup_unavailable_before_first_load() {
    let rdap = Server::run();
    let app = empty_app(&rdap, true);

    let (status, body) = get(&app.router, &format!("/api/geo-lookup/{}", KNOWN_IP)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    // Availability is checked before the address is validated
    let (status, _) = get(&app.router, "/api/geo-lookup/not-an-ip").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_geo_lookup_invalid_and_unknown_addresses() {
    let rdap = Server::run();
    let app = loaded_app(&rdap).await;

    let (status, body) = get(&app.router, "/api/geo-lookup/999.1.1.1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid IP address format.");

    let (status, body) = get(&app.router, "/api/geo-lookup/10.0.0.1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "IP address not found in the database.");
}

#[tokio::test]
async fn test_geo_lookup_without_whois() {
    let rdap = Server::run();
    let app = loaded_app(&rdap).await;

    let (status, body) = get(
        &app.router,
        &format!("/api/geo-lookup/{}?exclude_whois=true", KNOWN_IP),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["country"]["iso_code"], "GB");
    assert_eq!(body["country"]["name"], "United Kingdom");
    assert!(body["country"].get("names").is_none());
    assert_eq!(body["city"]["name"], "London");
    assert_eq!(body["database_info"]["version_tag"], "v1");
    assert!(body["database_info"]["last_updated_utc"]
        .as_str()
        .is_some_and(|t| t != "N/A"));
    assert!(body.get("whois_data").is_none());
}

#[tokio::test]
async fn test_geo_lookup_language_selection() {
    let rdap = Server::run();
    let app = loaded_app(&rdap).await;

    let (_, body) = get(
        &app.router,
        &format!("/api/geo-lookup/{}?lang=DE&exclude_whois=true", KNOWN_IP),
    )
    .await;
    assert_eq!(body["country"]["name"], "Vereinigtes Königreich");

    // Unknown languages fall back to English
    let (_, body) = get(
        &app.router,
        &format!("/api/geo-lookup/{}?lang=fr&exclude_whois=true", KNOWN_IP),
    )
    .await;
    assert_eq!(body["country"]["name"], "United Kingdom");
}

#[tokio::test]
async fn test_geo_lookup_with_whois_enrichment() {
    let rdap = Server::run();
    rdap.expect(
        Expectation::matching(request::method_path("GET", "/rdap/ip/81.2.69.142"))
            .respond_with(json_encoded(json!({
                "handle": "NET-81-2-69-0",
                "name": "EXAMPLE-NET",
                "country": "GB"
            }))),
    );
    let app = loaded_app(&rdap).await;

    let (status, body) = get(&app.router, &format!("/api/geo-lookup/{}", KNOWN_IP)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["whois_data"]["target"], KNOWN_IP);
    assert_eq!(body["whois_data"]["ip_whois"]["name"], "EXAMPLE-NET");
    assert_eq!(body["country"]["iso_code"], "GB");
}

#[tokio::test]
async fn test_geo_lookup_omits_failed_whois() {
    let rdap = Server::run();
    rdap.expect(
        Expectation::matching(request::method_path("GET", "/rdap/ip/81.2.69.142"))
            .respond_with(status_code(503)),
    );
    let app = loaded_app(&rdap).await;

    let (status, body) = get(&app.router, &format!("/api/geo-lookup/{}", KNOWN_IP)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("whois_data").is_none());
    assert_eq!(body["database_info"]["version_tag"], "v1");
}

#[tokio::test]
async fn test_whois_endpoint() {
    let rdap = Server::run();
    rdap.expect(
        Expectation::matching(request::method_path("GET", "/rdap/domain/example.com"))
            .respond_with(json_encoded(json!({
                "ldhName": "EXAMPLE.COM",
                "status": ["active"]
            }))),
    );
    rdap.expect(
        Expectation::matching(request::method_path("GET", "/rdap/domain/broken.example"))
            .respond_with(status_code(500)),
    );
    let app = empty_app(&rdap, true);

    let (status, body) = get(&app.router, "/api/whois/example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domain_whois"]["domain_name"], "EXAMPLE.COM");
    assert!(body.get("ip_whois").is_none());

    let (status, body) = get(&app.router, "/api/whois/localhost").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = get(&app.router, "/api/whois/broken.example").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_status_endpoint() {
    let rdap = Server::run();

    let empty = empty_app(&rdap, true);
    let (status, body) = get(&empty.router, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database_loaded"], false);
    assert_eq!(body["last_database_load_utc"], "N/A");
    assert_eq!(body["last_database_update_check_utc"], "N/A");
    assert_eq!(body["current_database_version_tag"], "N/A");
    assert_eq!(body["current_database_file"], "N/A");
    assert_eq!(body["database_source"], "none");
    assert_eq!(body["database_refreshable"], false);

    let loaded = loaded_app(&rdap).await;
    let (status, body) = get(&loaded.router, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database_loaded"], true);
    assert_eq!(body["current_database_version_tag"], "v1");
    assert!(body["current_database_file"]
        .as_str()
        .is_some_and(|f| f.ends_with("city.json")));
    assert_ne!(body["last_database_update_check_utc"], "N/A");
    assert_eq!(body["database_refreshable"], false);
}

#[tokio::test]
async fn test_status_endpoint_can_be_disabled() {
    let rdap = Server::run();
    let app = empty_app(&rdap, false);

    let (status, _) = get(&app.router, "/api/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
