use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use crate::mime;
use crate::negative_cache::NegativeCache;
use crate::path::{ArtifactPath, PathError};
use crate::race::{DownloadOutcome, RaceCoordinator};
use crate::store::ArtifactStore;

#[derive(Clone)]
pub struct AppState {
    pub store: ArtifactStore,
    pub negative_cache: Arc<NegativeCache>,
    pub race: RaceCoordinator,
}

/// The Request Bridge (C5): decides between an immediate store hit, an
/// immediate negative-cache 404, or a suspended reply driven by the Race
/// Coordinator (C4).
pub async fn serve_artifact(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    AxumPath(raw_path): AxumPath<String>,
) -> Response {
    if is_browse_request(&query) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = match ArtifactPath::parse(&raw_path) {
        Ok(p) => p,
        Err(PathError::Empty) => return StatusCode::NOT_FOUND.into_response(),
        Err(PathError::Invalid) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let is_head = method == Method::HEAD;

    if state.store.stat(&path).await.is_some() {
        return respond_with_file(&path, &state.store, is_head, &headers).await;
    }

    if state.negative_cache.is_failed(&path) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let (outcome_rx, cancel_hook) = state.race.download(path.clone());

    match outcome_rx.await {
        Ok(DownloadOutcome::Success { .. }) => {
            respond_with_file(&path, &state.store, is_head, &headers).await
        }
        Ok(DownloadOutcome::NotFound { status }) => to_status(status).into_response(),
        Ok(DownloadOutcome::Error { status, message }) => {
            (to_status(status), message).into_response()
        }
        Err(_) => {
            // Every fetch task ended without reporting (e.g. the whole race
            // was torn down). Make sure nothing is left running, then fail
            // the request rather than hang.
            cancel_hook.cancel_all();
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn is_browse_request(query: &HashMap<String, String>) -> bool {
    query.get("browse").map(String::as_str) == Some("true")
        || query.get("index").map(String::as_str) == Some("true")
}

fn to_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::NOT_FOUND)
}

async fn respond_with_file(
    path: &ArtifactPath,
    store: &ArtifactStore,
    is_head: bool,
    request_headers: &HeaderMap,
) -> Response {
    let Some(file) = store.find(path).await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let metadata = match file.metadata().await {
        Ok(m) => m,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    if let Some(if_modified_since) = request_headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
    {
        if truncate_to_secs(mtime) <= truncate_to_secs(if_modified_since) {
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }

    let mut response = if is_head {
        Response::new(Body::empty())
    } else {
        Response::new(Body::from_stream(ReaderStream::new(file)))
    };

    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(mime::get_mime_type(path.as_str())),
    );
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, must-revalidate"),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(mtime)) {
        response_headers.insert(header::LAST_MODIFIED, value);
    }

    response
}

fn truncate_to_secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::time::Duration;

    fn test_state(upstreams: Vec<String>, store_dir: &std::path::Path) -> AppState {
        let store = ArtifactStore::new(store_dir);
        let negative_cache = Arc::new(NegativeCache::new(Duration::from_secs(60)));
        let race = RaceCoordinator::new(store.clone(), negative_cache.clone(), upstreams);
        AppState {
            store,
            negative_cache,
            race,
        }
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/*path", get(serve_artifact).head(serve_artifact))
            .with_state(state)
    }

    #[tokio::test]
    async fn dot_dot_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(Vec::new(), dir.path());
        let router = app(state);

        use tower::ServiceExt;
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/../secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn browse_query_is_declined() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(Vec::new(), dir.path());
        let router = app(state);

        use tower::ServiceExt;
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/g/a/1.0/?browse=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cached_artifact_is_served_without_contacting_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = ArtifactPath::parse("g/a/1.0/a.jar").unwrap();
        store.publish_bytes(&path, b"cached", None).await.unwrap();

        let state = test_state(Vec::new(), dir.path());
        let router = app(state);

        use tower::ServiceExt;
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/g/a/1.0/a.jar")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/java-archive"
        );
    }
}
