#![cfg(test)]

mod client;
mod mock;
mod mutation;
mod query;

use postgrest_query::mock::Endpoint;
use postgrest_query::Client;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Film {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub director: Option<String>,
}

fn film(id: i64, title: &str, year: i32, director: Option<&str>) -> Film {
    Film {
        id,
        title: title.to_string(),
        year,
        director: director.map(str::to_string),
    }
}

pub fn films() -> Vec<Film> {
    vec![
        film(1, "Star Wars", 1977, Some("George Lucas")),
        film(2, "Alien", 1979, Some("Ridley Scott")),
        film(3, "The Empire Strikes Back", 1980, Some("Irvin Kershner")),
        film(4, "Dark Star", 1974, None),
        film(5, "Blade Runner", 1982, Some("Ridley Scott")),
    ]
}

/// A server with the films mounted at `/films`.
pub async fn film_server() -> wiremock::MockServer {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::path("/films"))
        .respond_with(Endpoint::new(films()))
        .mount(&server)
        .await;
    server
}

/// Run `f` with a client for `server`, off the async runtime; the
/// blocking transport can't run on it.
pub async fn with_client<F, R>(server: &wiremock::MockServer, f: F) -> R
where
    F: FnOnce(Client) -> R + Send + 'static,
    R: Send + 'static,
{
    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let client = Client::new(&uri).unwrap();
        f(client)
    })
    .await
    .unwrap()
}
