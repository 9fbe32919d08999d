//! HTTP client behavior against a mock hh.ru API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hh_vacancies::client::{HhClient, Pause};
use hh_vacancies::config::ApiSettings;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records requested delays instead of sleeping.
#[derive(Default)]
struct RecordingPause(Mutex<Vec<Duration>>);

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, delay: Duration) {
        self.0.lock().unwrap().push(delay);
    }
}

impl RecordingPause {
    fn delays(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

fn settings(server: &MockServer) -> ApiSettings {
    ApiSettings {
        base_url: format!("{}/", server.uri()),
        request_timeout: Duration::from_secs(5),
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(100),
        ..ApiSettings::default()
    }
}

fn client(settings: &ApiSettings) -> (HhClient, Arc<RecordingPause>) {
    let pause = Arc::new(RecordingPause::default());
    let client = HhClient::new(settings)
        .expect("client builds")
        .with_pause(pause.clone());
    (client, pause)
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn rate_limit_waits_without_spending_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/employers/1740"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "5"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/employers/1740"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1740" })))
        .with_priority(2)
        .mount(&server)
        .await;

    // No retries at all: only the rate-limit allowance can explain success.
    let settings = ApiSettings {
        max_retries: 0,
        ..settings(&server)
    };
    let (client, pause) = client(&settings);

    let body = client.employer("1740").await;

    assert_eq!(body, Some(json!({ "id": "1740" })));
    assert_eq!(pause.delays(), vec![Duration::from_secs(5)]);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn retry_after_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "600"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .with_priority(2)
        .mount(&server)
        .await;

    let settings = ApiSettings {
        max_retry_after: Duration::from_secs(60),
        ..settings(&server)
    };
    let (client, pause) = client(&settings);

    assert!(client.fetch_page("employers/1", &[]).await.is_some());
    assert_eq!(pause.delays(), vec![Duration::from_secs(60)]);
}

#[tokio::test]
async fn endless_rate_limiting_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .mount(&server)
        .await;

    let settings = ApiSettings {
        max_rate_limit_waits: 2,
        ..settings(&server)
    };
    let (client, pause) = client(&settings);

    assert_eq!(client.fetch_page("employers/1", &[]).await, None);
    assert_eq!(pause.delays().len(), 2);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn server_errors_are_retried_then_degrade_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let settings = ApiSettings {
        max_retries: 2,
        ..settings(&server)
    };
    let (client, pause) = client(&settings);

    assert_eq!(client.employer("1740").await, None);
    assert_eq!(request_count(&server).await, 3);

    let delays = pause.delays();
    assert_eq!(delays.len(), 2);
    assert!(delays[1] >= delays[0], "backoff grows: {delays:?}");
}

#[tokio::test]
async fn transient_failure_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "2180" })))
        .with_priority(2)
        .mount(&server)
        .await;

    let (client, pause) = client(&settings(&server));

    assert_eq!(client.employer("2180").await, Some(json!({ "id": "2180" })));
    assert_eq!(pause.delays().len(), 1);
}

#[tokio::test]
async fn non_json_body_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let settings = ApiSettings {
        max_retries: 1,
        ..settings(&server)
    };
    let (client, _pause) = client(&settings);

    assert_eq!(client.fetch_page("vacancies", &[]).await, None);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn pagination_stops_at_page_ceiling() {
    let server = MockServer::start().await;
    // Always claims more pages are available.
    Mock::given(method("GET"))
        .and(path("/vacancies"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "items": [{ "id": "1" }], "pages": 1000 })),
        )
        .mount(&server)
        .await;

    let settings = ApiSettings {
        max_pages: 3,
        ..settings(&server)
    };
    let (client, _pause) = client(&settings);

    let items = client.paginate("vacancies", &[]).await;

    assert_eq!(items.len(), 3);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn pagination_follows_reported_page_count() {
    let server = MockServer::start().await;
    for (page, id) in [("0", "10"), ("1", "11")] {
        Mock::given(method("GET"))
            .and(path("/vacancies"))
            .and(query_param("employer_id", "1740"))
            .and(query_param("page", page))
            .and(query_param("per_page", "100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "items": [{ "id": id }], "pages": 2 })),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let (client, _pause) = client(&settings(&server));

    let items = client.employer_vacancies("1740").await;

    assert_eq!(items, vec![json!({ "id": "10" }), json!({ "id": "11" })]);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn pagination_stops_on_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vacancies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [], "pages": 50 })))
        .mount(&server)
        .await;

    let (client, _pause) = client(&settings(&server));

    assert!(client.paginate("vacancies", &[]).await.is_empty());
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn requests_identify_the_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let (client, _pause) = client(&settings(&server));
    client.fetch_page("employers/1", &[]).await;

    let requests = server.received_requests().await.unwrap();
    let agent = requests[0]
        .headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(agent.starts_with("hh-vacancies/"), "user agent was {agent}");
}
