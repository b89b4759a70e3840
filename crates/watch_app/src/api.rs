//! Management API over the site store.
//!
//! Known sites live under `/api/notification`, sites awaiting their first
//! scan under `/api/pending`. Urls in paths are taken verbatim after the
//! prefix and should be percent-encoded by clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use engine_logging::{engine_error, engine_info};
use serde::Deserialize;
use serde_json::json;
use watch_engine::{SiteRecord, SiteStore, StoreError};

type SharedStore = Arc<dyn SiteStore>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/api/notification", get(list_sites))
        .route("/api/notification/*url", delete(delete_site))
        .route("/api/pending", get(list_pending).post(add_pending))
        .route("/api/pending/*url", delete(delete_pending))
        .with_state(store)
}

/// Serves the API on its own thread and runtime so it keeps answering while
/// a scan cycle is in progress.
pub fn spawn(addr: SocketAddr, store: SharedStore) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(err) => {
                engine_error!("Could not start API runtime: {}", err);
                return;
            }
        };
        if let Err(err) = runtime.block_on(serve(addr, store)) {
            engine_error!("API server stopped: {}", err);
        }
    })
}

async fn serve(addr: SocketAddr, store: SharedStore) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    engine_info!("Management API listening on http://{}", addr);
    axum::serve(listener, router(store)).await
}

struct ApiError(StoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists(_) | StoreError::AlreadyPending(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            engine_error!("Store failure behind API: {}", self.0);
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

fn message(text: &str) -> Json<serde_json::Value> {
    Json(json!({ "message": text }))
}

async fn list_sites(State(store): State<SharedStore>) -> Result<Json<Vec<SiteRecord>>, ApiError> {
    Ok(Json(store.list_records()?))
}

async fn delete_site(
    State(store): State<SharedStore>,
    Path(url): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    store.delete(&url)?;
    engine_info!("Removed site {}", url);
    Ok(message("Site deleted successfully"))
}

async fn list_pending(State(store): State<SharedStore>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(store.list_pending()?))
}

#[derive(Debug, Deserialize)]
struct AddPending {
    url: String,
}

async fn add_pending(
    State(store): State<SharedStore>,
    Json(body): Json<AddPending>,
) -> Result<Json<serde_json::Value>, ApiError> {
    store.enqueue_pending(&body.url)?;
    engine_info!("Queued {} for its first scan", body.url);
    Ok(message("Site added successfully"))
}

async fn delete_pending(
    State(store): State<SharedStore>,
    Path(url): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    store.dequeue_pending(&url)?;
    Ok(message("Site deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use watch_core::Fingerprint;
    use watch_engine::LocalStore;

    fn store_with_site() -> SharedStore {
        let store = LocalStore::in_memory();
        store
            .create(
                "https://a.com/",
                "A",
                Fingerprint::Text {
                    text: "hello".into(),
                    length: 5,
                },
            )
            .unwrap();
        Arc::new(store)
    }

    async fn send(store: &SharedStore, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router(store.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_pending(url: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/pending")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "url": url }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn lists_known_sites() {
        let store = store_with_site();
        let (status, body) = send(&store, get_request("/api/notification")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["url"], "https://a.com/");
        assert_eq!(body[0]["title"], "A");
    }

    #[tokio::test]
    async fn deletes_known_site_then_reports_missing() {
        let store = store_with_site();
        let uri = "/api/notification/https%3A%2F%2Fa.com%2F";

        let (status, body) = send(&store, delete_request(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Site deleted successfully");
        assert!(store.list_urls().unwrap().is_empty());

        let (status, _) = send(&store, delete_request(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pending_add_conflicts_on_duplicates() {
        let store = store_with_site();

        let (status, _) = send(&store, post_pending("https://b.com/")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&store, post_pending("https://b.com/")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["detail"].as_str().unwrap().contains("already pending"));
        let (status, _) = send(&store, post_pending("https://a.com/")).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&store, get_request("/api/pending")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["https://b.com/"]));
    }

    #[tokio::test]
    async fn pending_delete_reports_missing() {
        let store = store_with_site();
        store.enqueue_pending("https://b.com/").unwrap();
        let uri = "/api/pending/https%3A%2F%2Fb.com%2F";

        let (status, _) = send(&store, delete_request(uri)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&store, delete_request(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
