use postgrest_query::{Count, InsertOptions, MutationOptions, Returning, RpcOptions, UpsertOptions};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{film_server, films, with_client, Film};

fn new_film() -> Film {
    Film {
        id: 6,
        title: "Aliens".to_string(),
        year: 1986,
        director: Some("James Cameron".to_string()),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_returns_representation() {
    let server = film_server().await;
    let response = with_client(&server, |client| {
        client
            .from("films")
            .insert(&vec![new_film()])
            .select("id, title")
            .execute::<Value>()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.data, Some(json!([{"id": 6, "title": "Aliens"}])));

    let request = &server.received_requests().await.unwrap()[0];
    assert_eq!(request.method.as_str(), "POST");
    assert_eq!(request.headers.get("prefer").unwrap(), "return=representation");
    assert_eq!(request.headers.get("content-profile").unwrap(), "public");
    assert_eq!(
        serde_json::from_slice::<Vec<Film>>(&request.body).unwrap(),
        vec![new_film()]
    );
    let columns = request
        .url
        .query_pairs()
        .find(|(k, _)| k == "columns")
        .map(|(_, v)| v.into_owned());
    assert_eq!(columns.as_deref(), Some("\"director\",\"id\",\"title\",\"year\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_minimal() {
    let server = film_server().await;
    let response = with_client(&server, |client| {
        client
            .from("films")
            .insert_with(
                &[new_film()],
                InsertOptions {
                    returning: Returning::Minimal,
                    count: Some(Count::Exact),
                    default_to_null: false,
                },
            )
            .execute::<Vec<Film>>()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.data, None);
    assert_eq!(response.count, Some(1));

    let request = &server.received_requests().await.unwrap()[0];
    assert_eq!(
        request.headers.get("prefer").unwrap(),
        "return=minimal,count=exact,missing=default"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/films"))
        .and(query_param("on_conflict", "title"))
        .and(header("content-profile", "public"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let response = with_client(&server, |client| {
        client
            .from("films")
            .upsert_with(
                &new_film(),
                UpsertOptions {
                    on_conflict: Some("title".to_string()),
                    ignore_duplicates: true,
                    ..Default::default()
                },
            )
            .execute::<Vec<Film>>()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.data, Some(Vec::new()));

    let request = &server.received_requests().await.unwrap()[0];
    assert_eq!(
        request.headers.get("prefer").unwrap(),
        "resolution=ignore-duplicates,return=representation"
    );
    assert!(!request.url.query_pairs().any(|(k, _)| k == "columns"));
}

#[tokio::test(flavor = "multi_thread")]
async fn update() {
    let server = film_server().await;
    let response = with_client(&server, |client| {
        client
            .from("films")
            .update(&json!({"director": "R. Scott"}))
            .eq("director", "Ridley Scott")
            .execute::<Vec<Film>>()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 200);
    let updated = response.data.unwrap();
    assert_eq!(
        updated.iter().map(|f| f.id).collect::<Vec<_>>(),
        vec![2, 5]
    );
    assert!(updated
        .iter()
        .all(|f| f.director.as_deref() == Some("R. Scott")));

    let request = &server.received_requests().await.unwrap()[0];
    assert_eq!(request.method.as_str(), "PATCH");
    assert!(request.url.query_pairs().all(|(k, _)| k != "columns"));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete() {
    let server = film_server().await;
    let (minimal, returned) = with_client(&server, |client| {
        let minimal = client
            .from("films")
            .delete_with(MutationOptions {
                count: Some(Count::Exact),
                returning: Returning::Minimal,
            })
            .lt("year", 1980)
            .execute::<Vec<Film>>()
            .unwrap();
        let returned = client
            .from("films")
            .delete()
            .eq("id", 4)
            .single()
            .execute::<Film>()
            .unwrap();
        (minimal, returned)
    })
    .await;

    assert_eq!(minimal.status, 204);
    assert_eq!(minimal.data, None);
    assert_eq!(minimal.count, Some(3));

    assert_eq!(returned.status, 200);
    assert_eq!(returned.data, Some(films()[3].clone()));
}

#[tokio::test(flavor = "multi_thread")]
async fn rpc() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc/add"))
        .and(body_json(json!({"a": 1, "b": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(3))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rpc/films_by"))
        .and(query_param("director", "Ridley Scott"))
        .and(query_param("year", "gt.1980"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 5}])))
        .mount(&server)
        .await;

    let (sum, found) = with_client(&server, |client| {
        let sum = client
            .rpc("add", &json!({"a": 1, "b": 2}), RpcOptions::default())
            .execute::<i64>()
            .unwrap();
        let found = client
            .rpc(
                "films_by",
                &json!({"director": "Ridley Scott"}),
                RpcOptions {
                    get: true,
                    ..Default::default()
                },
            )
            .gt("year", 1980)
            .execute::<Value>()
            .unwrap();
        (sum, found)
    })
    .await;

    assert_eq!(sum.data, Some(3));
    assert_eq!(found.data, Some(json!([{"id": 5}])));
}
