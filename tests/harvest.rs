use std::time::Duration;

use hh_vacancies::client::HhClient;
use hh_vacancies::config::ApiSettings;
use hh_vacancies::ingest::harvest;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn missing_employer_is_skipped_with_its_vacancies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/employers/1740"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1740",
            "name": "Яндекс",
            "alternate_url": "https://hh.ru/employer/1740"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/employers/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vacancies"))
        .and(query_param("employer_id", "1740"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "1" }, { "id": "2" }],
            "pages": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vacancies"))
        .and(query_param("employer_id", "404"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [], "pages": 0 })))
        .expect(0)
        .mount(&server)
        .await;

    let settings = ApiSettings {
        base_url: format!("{}/", server.uri()),
        max_retries: 1,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(2),
        ..ApiSettings::default()
    };
    let client = HhClient::new(&settings).unwrap();

    let harvest = harvest(&client, &["1740".to_string(), "404".to_string()]).await;

    assert_eq!(harvest.employers.len(), 1);
    assert_eq!(harvest.vacancies.len(), 2);
}
