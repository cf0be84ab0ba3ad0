use std::time::Duration;

use futures::StreamExt;
use reqwest::{header::HeaderMap, StatusCode};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

/// Per-fetch timeout. An upstream that neither completes nor errors within
/// this window is treated as failed.
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Terminal result of a single Upstream Fetch attempt, reported exactly
/// once per fetch on its result channel.
pub enum FetchOutcome {
    Success {
        upstream: String,
        temp_path: TempPath,
        status: StatusCode,
        headers: HeaderMap,
    },
    Failed {
        upstream: String,
        status: Option<StatusCode>,
    },
}

/// A handle to an in-flight fetch task, used by the Race Coordinator to
/// cancel losing fetches once a winner is chosen.
pub struct FetchHandle {
    join: tokio::task::JoinHandle<()>,
}

impl FetchHandle {
    /// Aborts the in-flight HTTP exchange if it hasn't already completed.
    /// Idempotent, and safe to call after the fetch has already reported its
    /// outcome. Any temp file already created is deleted when the aborted
    /// task's locals are dropped.
    pub fn cancel(&self) {
        self.join.abort();
    }
}

/// Starts a single upstream GET for `path` against `upstream_base`,
/// streaming the response body into a uniquely named temp file in the OS
/// temp directory. Reports exactly one [`FetchOutcome`] on `result_tx`,
/// unless cancelled first (in which case the receiver simply sees the
/// sender dropped).
pub fn start(
    client: reqwest::Client,
    upstream_base: String,
    path: String,
    result_tx: oneshot::Sender<FetchOutcome>,
) -> FetchHandle {
    let join = tokio::spawn(async move {
        let outcome = run_one_fetch(&client, &upstream_base, &path).await;
        let _ = result_tx.send(outcome);
    });
    FetchHandle { join }
}

/// Placeholder status for a connection that closed (or was refused) before
/// any response headers arrived, per the AwaitingHeaders row of the fetch
/// state table.
const CONNECTION_CLOSED_STATUS: StatusCode = StatusCode::FORBIDDEN;

/// Placeholder status for a transport error or timeout in any other state
/// (mid-stream, or a timed-out initial request).
const TRANSPORT_ERROR_STATUS: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

async fn run_one_fetch(client: &reqwest::Client, upstream_base: &str, path: &str) -> FetchOutcome {
    let url = format!("{}/{}", upstream_base.trim_end_matches('/'), path);

    let response = match client.get(&url).timeout(FETCH_TIMEOUT).send().await {
        Ok(resp) => resp,
        Err(err) => {
            // A timed-out request falls under "transport error / timeout" in
            // any state; anything else failing before headers arrive is
            // "connection closed" while AwaitingHeaders.
            let status = if err.is_timeout() {
                TRANSPORT_ERROR_STATUS
            } else {
                CONNECTION_CLOSED_STATUS
            };
            return FetchOutcome::Failed {
                upstream: upstream_base.to_string(),
                status: Some(status),
            };
        }
    };

    let status = response.status();
    if status != StatusCode::OK && status != StatusCode::NON_AUTHORITATIVE_INFORMATION {
        return FetchOutcome::Failed {
            upstream: upstream_base.to_string(),
            status: Some(status),
        };
    }
    let headers = response.headers().clone();

    let temp_path = match create_temp_file() {
        Ok(t) => t,
        Err(_) => {
            return FetchOutcome::Failed {
                upstream: upstream_base.to_string(),
                status: Some(TRANSPORT_ERROR_STATUS),
            }
        }
    };

    match stream_to_file(response, &temp_path).await {
        Ok(()) => FetchOutcome::Success {
            upstream: upstream_base.to_string(),
            temp_path,
            status,
            headers,
        },
        Err(_) => FetchOutcome::Failed {
            upstream: upstream_base.to_string(),
            status: Some(TRANSPORT_ERROR_STATUS),
        },
    }
}

fn create_temp_file() -> std::io::Result<TempPath> {
    let named = tempfile::Builder::new()
        .prefix("relaycache-fetch-")
        .tempfile()?;
    Ok(named.into_temp_path())
}

async fn stream_to_file(response: reqwest::Response, temp_path: &TempPath) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(temp_path)
        .await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}
