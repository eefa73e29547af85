use std::sync::Arc;

use postgrest_query::mock::Endpoint;
use serde::Serialize;
use serde_json::{json, Value};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer};

use crate::with_client;

#[derive(Clone, Serialize)]
struct Tag {
    name: String,
    uses: u32,
}

fn tags() -> Vec<Tag> {
    vec![
        Tag {
            name: "hello".to_string(),
            uses: 3,
        },
        Tag {
            name: "goodbye".to_string(),
            uses: 1,
        },
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vec() {
    let server = MockServer::start().await;
    Mock::given(path("/tags"))
        .respond_with(Endpoint::new(tags()))
        .mount(&server)
        .await;

    let response = with_client(&server, |client| {
        client.from("tags").select("name").execute::<Value>()
    })
    .await
    .unwrap();

    assert_eq!(
        response.data,
        Some(json!([{"name": "hello"}, {"name": "goodbye"}]))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_arc() {
    let server = MockServer::start().await;
    Mock::given(path("/tags"))
        .respond_with(Endpoint::new(Arc::new(tags())))
        .mount(&server)
        .await;

    let response = with_client(&server, |client| {
        client
            .from("tags")
            .select("*")
            .gt("uses", 2)
            .execute::<Value>()
    })
    .await
    .unwrap();

    assert_eq!(response.data, Some(json!([{"name": "hello", "uses": 3}])));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_what_it_cannot_emulate() {
    let server = MockServer::start().await;
    Mock::given(path("/tags"))
        .respond_with(Endpoint::new(tags()))
        .mount(&server)
        .await;

    let (embedded, bad_body) = with_client(&server, |client| {
        let embedded = client
            .from("tags")
            .select("name, films(title)")
            .execute::<Value>()
            .unwrap();
        let bad_body = client
            .from("tags")
            .update(&json!([1, 2]))
            .execute::<Value>()
            .unwrap();
        (embedded, bad_body)
    })
    .await;

    assert_eq!(embedded.status, 400);
    assert_eq!(embedded.error.unwrap().code, "PGRST100");
    assert_eq!(bad_body.status, 400);
    assert_eq!(bad_body.error.unwrap().code, "PGRST102");
}
