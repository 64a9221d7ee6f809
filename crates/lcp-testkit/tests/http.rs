//! The service against a real HTTP status server and an on-disk store.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lcp::core::media::{LCP_LICENSE_DOCUMENT, LCP_STATUS_DOCUMENT};
use lcp::protocol::{DeviceInfo, LsdClient, ReqwestTransport, RetryPolicy};
use lcp::store::{LicenseRepository, SqliteStore};
use lcp::{EffectiveState, LcpConfig, LcpService, Status};
use lcp_testkit::{date, LicenseFixture, ManualClock, StaticAuthenticator, StatusFixture};

type HttpService = LcpService<SqliteStore, SqliteStore, LsdClient<ReqwestTransport>>;

fn service(store: Arc<SqliteStore>) -> HttpService {
    let config = LcpConfig {
        device: DeviceInfo::new("device-http", "Integration reader"),
        status_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        },
        ..LcpConfig::default()
    };
    let client = Arc::new(config.http_client().unwrap());
    LcpService::new(store.clone(), store, client, config)
        .with_clock(Arc::new(ManualClock::new(date(2024, 6, 1))))
}

fn status_response(status: &StatusFixture) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(status.to_bytes(), LCP_STATUS_DOCUMENT)
}

#[tokio::test]
async fn test_lending_lifecycle_over_http() {
    let server = MockServer::start().await;
    let fixture = LicenseFixture::new("http-loan", "secret")
        .with_end(date(2024, 7, 1))
        .with_lsd(&server.uri());
    let ready = StatusFixture::for_license(&fixture, Status::Ready);
    let active = ready.clone().with_status(Status::Active);
    let renewed_license = fixture
        .clone()
        .with_updated(date(2024, 6, 1))
        .with_end(date(2024, 9, 1));
    let renewed = active
        .clone()
        .with_license_updated(date(2024, 6, 1))
        .with_status_updated(date(2024, 6, 1))
        .with_event("renew", "device-http");
    let returned = renewed
        .clone()
        .with_status(Status::Returned)
        .without_renew()
        .without_return();

    Mock::given(method("GET"))
        .and(path(ready.path("/status")))
        .respond_with(status_response(&ready))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(ready.path("/register")))
        .and(query_param("id", "device-http"))
        .and(query_param("name", "Integration reader"))
        .respond_with(status_response(&active))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(ready.path("/renew")))
        .and(query_param("end", "2024-09-01T00:00:00Z"))
        .respond_with(status_response(&renewed))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ready.path("")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(renewed_license.to_bytes(), LCP_LICENSE_DOCUMENT),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(ready.path("/return")))
        .respond_with(status_response(&returned))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("licenses.db");
    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let service = service(store.clone());

    let auth = StaticAuthenticator::answering("secret");
    let mut license = service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert_eq!(license.effective_state(), EffectiveState::Usable(Status::Active));
    assert!(license.record().registered);

    license.renew(Some(date(2024, 9, 1))).await.unwrap();
    assert_eq!(license.rights_end(), Some(date(2024, 9, 1)));

    license.return_publication().await.unwrap();
    assert!(matches!(license.effective_state(), EffectiveState::Returned { .. }));

    // Everything survives a restart.
    drop(license);
    drop(service);
    drop(store);
    let store = SqliteStore::open(&db).unwrap();
    let record = store.get("http-loan").await.unwrap().unwrap();
    assert_eq!(record.status, Some(Status::Returned));
    assert_eq!(record.rights_end, Some(date(2024, 9, 1)));
    assert!(record.registered);
}

#[tokio::test]
async fn test_failing_status_server_falls_back_to_cache() {
    let server = MockServer::start().await;
    let fixture = LicenseFixture::new("http-down", "secret").with_lsd(&server.uri());
    let status = StatusFixture::for_license(&fixture, Status::Active).without_register();

    Mock::given(method("GET"))
        .and(path(status.path("/status")))
        .respond_with(status_response(&status))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(status.path("/status")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let service = service(store);
    let auth = StaticAuthenticator::answering("secret");
    let online = service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert!(!online.is_offline());

    let offline = service.open_license(fixture.to_bytes(), None).await.unwrap();
    assert!(offline.is_offline());
    assert_eq!(offline.effective_state(), EffectiveState::Usable(Status::Active));

    // One fetch, then a request and its retry for the second open.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}
