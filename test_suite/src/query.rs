use postgrest_query::{Count, Error, OrderOptions, SelectOptions};
use serde_json::{json, Value};

use crate::{film_server, films, with_client, Film};

fn ids(films: &[Film]) -> Vec<i64> {
    films.iter().map(|f| f.id).collect()
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn select_everything() {
    let server = film_server().await;
    let response = with_client(&server, |client| {
        client.from("films").select("*").execute::<Vec<Film>>()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.data, Some(films()));
    assert_eq!(response.count, None);
    assert!(response.error.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn select_columns() {
    let server = film_server().await;
    let data = with_client(&server, |client| {
        client
            .from("films")
            .select("id, title")
            .eq("id", 2)
            .execute::<Value>()
    })
    .await
    .unwrap()
    .data;

    assert_eq!(data, Some(json!([{"id": 2, "title": "Alien"}])));

    let request = &server.received_requests().await.unwrap()[0];
    assert_eq!(
        request.url.query_pairs().into_owned().collect::<Vec<_>>(),
        vec![
            ("select".to_string(), "id,title".to_string()),
            ("id".to_string(), "eq.2".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn filters() {
    let server = film_server().await;
    let results = with_client(&server, |client| {
        let query = |f: fn(postgrest_query::FilterBuilder) -> postgrest_query::FilterBuilder| {
            let response = f(client.from("films").select("*"))
                .order("id", OrderOptions::ascending())
                .execute::<Vec<Film>>()
                .unwrap();
            ids(&response.data.unwrap())
        };
        vec![
            query(|b| b.gte("year", 1980)),
            query(|b| b.lt("year", 1977)),
            query(|b| b.neq("director", "Ridley Scott")),
            query(|b| b.ilike("title", "%star%")),
            query(|b| b.like("title", "%Star%")),
            query(|b| b.is("director", None::<&str>)),
            query(|b| b.in_("id", [1, 3, 5])),
            query(|b| b.in_("title", ["Alien", "The Empire Strikes Back"])),
            query(|b| b.not("year", "gt", "1977")),
            query(|b| b.or("year.lt.1975,director.eq.George Lucas", None)),
            query(|b| b.eq("director", "Ridley Scott").gt("year", 1980)),
            query(|b| b.match_([("year", 1979), ("id", 2)])),
        ]
    })
    .await;

    assert_eq!(
        results,
        vec![
            vec![3, 5],
            vec![4],
            vec![1, 3],
            vec![1, 4],
            vec![1, 4],
            vec![4],
            vec![1, 3, 5],
            vec![2, 3],
            vec![1, 4],
            vec![1, 4],
            vec![5],
            vec![2],
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn order_and_range() {
    let server = film_server().await;
    let response = with_client(&server, |client| {
        client
            .from("films")
            .select_with(
                "*",
                SelectOptions {
                    count: Some(Count::Exact),
                    ..Default::default()
                },
            )
            .order("director", OrderOptions::ascending().nulls_first())
            .order("year", OrderOptions::descending())
            .range(1, 3, None)
            .execute::<Vec<Film>>()
    })
    .await
    .unwrap();

    assert_eq!(ids(&response.data.unwrap()), vec![1, 3, 5]);
    assert_eq!(response.count, Some(5));

    let request = &server.received_requests().await.unwrap()[0];
    assert_eq!(request.headers.get("prefer").unwrap(), "count=exact");
    let query = request.url.query().unwrap();
    assert!(query.contains("offset=1"), "{}", query);
    assert!(query.contains("limit=3"), "{}", query);
}

#[tokio::test(flavor = "multi_thread")]
async fn limit() {
    let server = film_server().await;
    let response = with_client(&server, |client| {
        client
            .from("films")
            .select("id")
            .order("year", OrderOptions::ascending())
            .limit(2, None)
            .execute::<Value>()
    })
    .await
    .unwrap();

    assert_eq!(response.data, Some(json!([{"id": 4}, {"id": 1}])));
}

#[tokio::test(flavor = "multi_thread")]
async fn head_counts_without_rows() {
    let server = film_server().await;
    let response = with_client(&server, |client| {
        client
            .from("films")
            .select_with(
                "*",
                SelectOptions {
                    head: true,
                    count: Some(Count::Exact),
                },
            )
            .eq("director", "Ridley Scott")
            .execute::<Vec<Film>>()
    })
    .await
    .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, None);
    assert_eq!(response.count, Some(2));
    assert_eq!(
        server.received_requests().await.unwrap()[0].method.as_str(),
        "HEAD"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn single() {
    let server = film_server().await;
    let (one, many) = with_client(&server, |client| {
        let one = client
            .from("films")
            .select("*")
            .eq("id", 2)
            .single()
            .execute::<Film>();
        let many = client
            .from("films")
            .select("*")
            .eq("director", "Ridley Scott")
            .single()
            .execute::<Film>();
        (one, many)
    })
    .await;

    assert_eq!(one.unwrap().data, Some(films()[1].clone()));
    match many {
        Err(Error::Server(info)) => assert_eq!(info.code, "PGRST116"),
        other => panic!("expected PGRST116, got {:?}", other),
    }

    let request = &server.received_requests().await.unwrap()[0];
    assert_eq!(
        request.headers.get("accept").unwrap(),
        "application/vnd.pgrst.object+json"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn maybe_single() {
    let server = film_server().await;
    let (none, one, many) = with_client(&server, |client| {
        let query = |id: i64| {
            client
                .from("films")
                .select("*")
                .gte("id", id)
                .maybe_single()
                .execute::<Film>()
                .unwrap()
        };
        (query(6), query(5), query(4))
    })
    .await;

    assert_eq!(none.status, 200);
    assert_eq!(none.data, None);
    assert!(none.error.is_none());

    assert_eq!(one.data.unwrap().title, "Blade Runner");

    assert_eq!(many.status, 406);
    assert_eq!(many.data, None);
    assert_eq!(many.error.unwrap().code, "PGRST116");
}

#[tokio::test(flavor = "multi_thread")]
async fn csv() {
    let server = film_server().await;
    let response = with_client(&server, |client| {
        client
            .from("films")
            .select("id,title")
            .lte("id", 3)
            .order("id", OrderOptions::ascending())
            .csv()
            .execute::<String>()
    })
    .await
    .unwrap();

    assert_eq!(
        response.data.unwrap(),
        "id,title\n1,Star Wars\n2,Alien\n3,The Empire Strikes Back"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors() {
    let server = film_server().await;
    let (reported, thrown) = with_client(&server, |client| {
        let reported = client
            .from("films")
            .select("*")
            .contains("tags", vec!["space"])
            .execute::<Vec<Film>>();
        let thrown = client
            .from("films")
            .select("*")
            .contains("tags", vec!["space"])
            .throw_on_error()
            .execute::<Vec<Film>>();
        (reported, thrown)
    })
    .await;

    let reported = reported.unwrap();
    assert_eq!(reported.status, 400);
    assert_eq!(reported.data, None);
    assert_eq!(reported.error.unwrap().code, "PGRST100");

    assert!(matches!(thrown, Err(Error::Server(info)) if info.code == "PGRST100"));
}

#[tokio::test(flavor = "multi_thread")]
async fn execute_to() {
    let server = film_server().await;
    let (titles, count) = with_client(&server, |client| {
        client
            .from("films")
            .select_with(
                "title",
                SelectOptions {
                    count: Some(Count::Exact),
                    ..Default::default()
                },
            )
            .eq("year", 1979)
            .execute_to::<Vec<Value>>()
    })
    .await
    .unwrap();

    assert_eq!(titles, vec![json!({"title": "Alien"})]);
    assert_eq!(count, Some(1));
}
