use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::{header::HeaderMap, StatusCode};
use tokio::sync::oneshot;

use crate::fetch::{self, FetchHandle, FetchOutcome};
use crate::ids;
use crate::negative_cache::NegativeCache;
use crate::path::ArtifactPath;
use crate::store::ArtifactStore;

/// Terminal result of a race across every configured upstream, delivered
/// exactly once to the Request Bridge.
#[derive(Debug)]
pub enum DownloadOutcome {
    Success {
        status: StatusCode,
        file_path: PathBuf,
        headers: HeaderMap,
    },
    NotFound {
        status: StatusCode,
    },
    Error {
        status: StatusCode,
        message: String,
    },
}

/// Cancels every upstream fetch still in flight for one race. Held by the
/// Request Bridge so a client disconnect can cut the race short (C7).
#[derive(Clone)]
pub struct CancelHook {
    handles: Arc<DashMap<String, FetchHandle>>,
}

impl CancelHook {
    fn noop() -> Self {
        Self {
            handles: Arc::new(DashMap::new()),
        }
    }

    /// Safe to call more than once, and safe to call after the race has
    /// already resolved (it will simply find no live handles left).
    pub fn cancel_all(&self) {
        for entry in self.handles.iter() {
            entry.value().cancel();
        }
        self.handles.clear();
    }
}

/// C7: when the Request Bridge's handler future is dropped (the client
/// disconnected before the race finished), axum drops every local bound to
/// that future, including its `CancelHook`. Tying cancellation to that drop
/// means a disconnect aborts the race without any separate close-notification
/// plumbing.
impl Drop for CancelHook {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Fans a single artifact request out across every configured upstream and
/// resolves with the first success, or with failure once every upstream has
/// failed (C4, §4.4).
#[derive(Clone)]
pub struct RaceCoordinator {
    client: reqwest::Client,
    store: ArtifactStore,
    negative_cache: Arc<NegativeCache>,
    upstreams: Arc<Vec<String>>,
}

impl RaceCoordinator {
    pub fn new(
        store: ArtifactStore,
        negative_cache: Arc<NegativeCache>,
        upstreams: Vec<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            // Decision (this implementation): follow redirects automatically,
            // capped well below reqwest's default to bound per-fetch latency.
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("http client configuration is valid");
        Self {
            client,
            store,
            negative_cache,
            upstreams: Arc::new(upstreams),
        }
    }

    /// Starts one Upstream Fetch per configured upstream for `path`.
    /// Returns a receiver for the single terminal [`DownloadOutcome`] and a
    /// [`CancelHook`] the caller can use to cut the race short.
    pub fn download(&self, path: ArtifactPath) -> (oneshot::Receiver<DownloadOutcome>, CancelHook) {
        let download_id = ids::next_download_id();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let outcome_tx = Arc::new(Mutex::new(Some(outcome_tx)));

        if self.upstreams.is_empty() {
            match outcome_tx.lock().take() {
                Some(tx) => {
                    let _ = tx.send(DownloadOutcome::NotFound {
                        status: StatusCode::NOT_FOUND,
                    });
                }
                None => unreachable!("race outcome resumed twice"),
            }
            return (outcome_rx, CancelHook::noop());
        }

        let won = Arc::new(AtomicBool::new(false));
        let remaining = Arc::new(AtomicUsize::new(self.upstreams.len()));
        let handles: Arc<DashMap<String, FetchHandle>> = Arc::new(DashMap::new());

        for upstream in self.upstreams.iter().cloned() {
            let (result_tx, result_rx) = oneshot::channel();
            let handle = fetch::start(
                self.client.clone(),
                upstream.clone(),
                path.as_str().to_string(),
                result_tx,
            );
            handles.insert(upstream.clone(), handle);

            tokio::spawn(resolve_one_fetch(ResolveArgs {
                result_rx,
                store: self.store.clone(),
                negative_cache: self.negative_cache.clone(),
                won: won.clone(),
                remaining: remaining.clone(),
                handles: handles.clone(),
                outcome_tx: outcome_tx.clone(),
                path: path.clone(),
                upstream,
                download_id: download_id.clone(),
            }));
        }

        let cancel_hook = CancelHook { handles };
        (outcome_rx, cancel_hook)
    }
}

struct ResolveArgs {
    result_rx: oneshot::Receiver<FetchOutcome>,
    store: ArtifactStore,
    negative_cache: Arc<NegativeCache>,
    won: Arc<AtomicBool>,
    remaining: Arc<AtomicUsize>,
    handles: Arc<DashMap<String, FetchHandle>>,
    outcome_tx: Arc<Mutex<Option<oneshot::Sender<DownloadOutcome>>>>,
    path: ArtifactPath,
    upstream: String,
    download_id: String,
}

async fn resolve_one_fetch(args: ResolveArgs) {
    let ResolveArgs {
        result_rx,
        store,
        negative_cache,
        won,
        remaining,
        handles,
        outcome_tx,
        path,
        upstream,
        download_id,
    } = args;

    let outcome = match result_rx.await {
        Ok(outcome) => outcome,
        Err(_) => return, // fetch task was cancelled before it could report
    };

    match outcome {
        FetchOutcome::Success {
            temp_path,
            status,
            headers,
            ..
        } => {
            if won.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                // Another upstream already won; temp_path drops here,
                // deleting this loser's file.
                return;
            }

            tracing::info!(download_id = %download_id, path = %path, %upstream, "download won");

            for entry in handles.iter() {
                if *entry.key() != upstream {
                    entry.value().cancel();
                }
            }
            handles.clear();

            let last_modified = parse_last_modified(&headers).or_else(|| Some(ids::now()));
            match store.publish_temp_file(&path, temp_path, last_modified).await {
                Ok(file_path) => {
                    match outcome_tx.lock().take() {
                        Some(tx) => {
                            let _ = tx.send(DownloadOutcome::Success {
                                status,
                                file_path,
                                headers,
                            });
                        }
                        None => unreachable!("race outcome resumed twice"),
                    }
                }
                Err(err) => {
                    tracing::error!(download_id = %download_id, path = %path, error = %err, "storage error while publishing");
                    match outcome_tx.lock().take() {
                        Some(tx) => {
                            let _ = tx.send(DownloadOutcome::Error {
                                status: StatusCode::INTERNAL_SERVER_ERROR,
                                message: err.to_string(),
                            });
                        }
                        None => unreachable!("race outcome resumed twice"),
                    }
                }
            }
        }
        FetchOutcome::Failed { status, .. } => {
            if won.load(Ordering::SeqCst) {
                return;
            }
            handles.remove(&upstream);
            tracing::warn!(download_id = %download_id, path = %path, %upstream, status = ?status, "upstream fetch failed");

            let left = remaining.fetch_sub(1, Ordering::SeqCst) - 1;
            if left == 0 && !won.load(Ordering::SeqCst) {
                negative_cache.mark_failed(path.clone());
                let resolved_status = status.unwrap_or(StatusCode::NOT_FOUND);
                match outcome_tx.lock().take() {
                    Some(tx) => {
                        let _ = tx.send(DownloadOutcome::NotFound {
                            status: resolved_status,
                        });
                    }
                    None => unreachable!("race outcome resumed twice"),
                }
            }
        }
    }
}

fn parse_last_modified(headers: &HeaderMap) -> Option<SystemTime> {
    let value = headers.get(reqwest::header::LAST_MODIFIED)?.to_str().ok()?;
    httpdate::parse_http_date(value).ok()
}
