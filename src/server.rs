// A deliberately vulnerable web endpoint: it decrypts a token and tells the
// caller, via the status code, whether the padding was valid.
use crate::{encoding::url_decode, Encoding, LocalOracle};

use axum::{
    extract::{Form, Query, State},
    http::{header::COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::{TcpListener, ToSocketAddrs};

use std::{collections::HashMap, sync::Arc};

#[derive(Clone)]
pub struct TargetServer {
    oracle: LocalOracle,
    encoding: Encoding,
}

impl TargetServer {
    pub fn new(oracle: LocalOracle, encoding: Encoding) -> Self {
        Self { oracle, encoding }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/check", get(check_query).post(check_form))
            .with_state(Arc::new(self))
    }

    pub fn check_token(&self, token: &str) -> impl IntoResponse {
        let sample = match self.encoding.decode(token) {
            Ok(sample) => sample,
            Err(e) => return (StatusCode::BAD_REQUEST, format!("Illegal token: {}", e)),
        };
        match self.oracle.decrypt(&sample) {
            Ok(_) => (StatusCode::OK, "OK".to_string()),
            Err(crate::Error::InvalidPadding) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "decrypt error".to_string())
            }
            Err(e) => (StatusCode::BAD_REQUEST, e.to_string()),
        }
    }
}

async fn check_query(
    State(server): State<Arc<TargetServer>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match params.get("token").cloned().or_else(|| cookie_token(&headers)) {
        Some(token) => server.check_token(&token).into_response(),
        None => (StatusCode::BAD_REQUEST, "Missing 'token' parameter").into_response(),
    }
}

async fn check_form(
    State(server): State<Arc<TargetServer>>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    match params.get("token") {
        Some(token) => server.check_token(token).into_response(),
        None => (StatusCode::BAD_REQUEST, "Missing 'token' parameter").into_response(),
    }
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "token")
        .map(|(_, value)| url_decode(value))
}

/// Serves `server` on `address` in the background and returns its base URL.
pub async fn spawn_server(
    address: impl ToSocketAddrs,
    server: TargetServer,
) -> std::io::Result<String> {
    let listener = TcpListener::bind(address).await?;
    let addr = listener.local_addr()?;
    let app = server.router();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{}", addr))
}
