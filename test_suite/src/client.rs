use postgrest_query::filtering::FilterError;
use postgrest_query::transport::TransportError;
use postgrest_query::{AbortSignal, Client, ClientOptions, Error};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{film_server, with_client, Film};

async fn empty_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn default_headers() {
    let server = MockServer::start().await;
    Mock::given(path("/films"))
        .and(header("accept", "application/json"))
        .and(header("accept-profile", "public"))
        .and(header("apikey", "anon"))
        .and(header("authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let response = with_client(&server, |client| {
        client.set_api_key("anon").unwrap();
        client.set_auth_token("token").unwrap();
        client.from("films").select("*").execute::<Vec<Film>>()
    })
    .await
    .unwrap();

    assert_eq!(response.data, Some(Vec::new()));
    let request = &server.received_requests().await.unwrap()[0];
    assert!(request
        .headers
        .get("x-client-info")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .starts_with("postgrest-rs/"));
}

#[tokio::test(flavor = "multi_thread")]
async fn schemas() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("accept-profile", "audit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("content-profile", "private"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let client = Client::with_options(&uri, ClientOptions::default().schema("audit")).unwrap();
        client.from("log").select("*").execute::<Value>().unwrap();

        let private = client.schema("private");
        private
            .from("secrets")
            .insert(&json!({"key": "k"}))
            .execute::<Value>()
            .unwrap();

        private.change_schema("audit");
        private.from("log").select("*").execute::<Value>().unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn ping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"swagger": "2.0"})))
        .expect(1)
        .mount(&server)
        .await;

    with_client(&server, |client| client.ping()).await.unwrap();

    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;
    let result = with_client(&down, |client| client.ping()).await;
    assert!(matches!(result, Err(Error::Server(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_not_found_is_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/films"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "42P01",
            "details": null,
            "hint": null,
            "message": "relation \"public.missing\" does not exist"
        })))
        .mount(&server)
        .await;

    let (deleted, missing) = with_client(&server, |client| {
        let deleted = client
            .from("films")
            .delete()
            .eq("id", 99)
            .execute::<Vec<Film>>()
            .unwrap();
        let missing = client
            .from("missing")
            .select("*")
            .execute::<Vec<Film>>()
            .unwrap();
        (deleted, missing)
    })
    .await;

    assert_eq!(deleted.status, 204);
    assert_eq!(deleted.status_text, "No Content");
    assert!(deleted.error.is_none());
    assert_eq!(deleted.data, None);

    assert_eq!(missing.status, 404);
    let error = missing.error.unwrap();
    assert_eq!(error.code, "42P01");
    assert_eq!(error.details, "");
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_requests_are_not_sent() {
    let server = film_server().await;
    let results = with_client(&server, |client| {
        vec![
            client
                .from("films")
                .select("*")
                .range(5, 2, None)
                .execute::<Value>(),
            client
                .from("films")
                .select("*")
                .filter("year", "between", "1970")
                .eq("id", 1)
                .execute::<Value>(),
            client
                .from("films")
                .select("*")
                .text_search("title", "star", "fuzzy", None)
                .execute::<Value>(),
        ]
    })
    .await;

    assert!(matches!(
        results[0],
        Err(Error::Validation(FilterError::InvalidRange { from: 5, to: 2 }))
    ));
    assert!(matches!(
        results[1],
        Err(Error::Validation(FilterError::UnknownOperator(_)))
    ));
    assert!(matches!(
        results[2],
        Err(Error::Validation(FilterError::UnknownTextSearchType(_)))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn aborted_requests_are_not_sent() {
    let server = MockServer::start().await;
    empty_ok(&server).await;

    let result = with_client(&server, |client| {
        let signal = AbortSignal::new();
        signal.abort();
        client
            .from("films")
            .select("*")
            .abort_signal(signal)
            .execute::<Value>()
    })
    .await;

    assert!(matches!(
        result,
        Err(Error::Transport(TransportError::Cancelled))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn transaction_preferences() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let response = with_client(&server, |client| {
        client
            .from("films")
            .update(&json!({"year": 2000}))
            .eq("id", 1)
            .max_affected(1)
            .rollback()
            .execute::<Value>()
    })
    .await
    .unwrap();
    assert_eq!(response.status, 204);

    let request = &server.received_requests().await.unwrap()[0];
    let prefer: Vec<&str> = request
        .headers
        .get_all("prefer")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(
        prefer,
        vec![
            "return=representation",
            "handling=strict",
            "max-affected=1",
            "tx=rollback"
        ]
    );
}
