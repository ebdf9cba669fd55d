//! http.rs
//! GET client for the simulator controller, on reqwest over the tokio runtime.
//!
//! The controller speaks plain `GET /?command=...` with small bodies. Framing
//! (Content-Length, chunked, close-delimited) is left to the client; each
//! request runs under one timeout, connect included.

use std::time::Duration;

use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

pub fn set_joint_path(index: u32, value: f32) -> String {
    format!("/?command=set_joint&index={}&value={:.4}", index, value)
}

pub const GET_STATS_PATH: &str = "/?command=get_stats";

/// Shared by every request of one dispatcher; keeps the controller
/// connection alive between commands.
pub fn client() -> Result<reqwest::Client, DispatchError> {
    reqwest::Client::builder()
        .user_agent("vmc_bridge")
        .tcp_nodelay(true)
        .build()
        .map_err(DispatchError::Http)
}

pub fn url(host: &str, port: u16, path: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{}]:{}{}", host, port, path)
    } else {
        format!("http://{}:{}{}", host, port, path)
    }
}

/// Issues `GET {path}` to `host:port` and reads the full body.
pub async fn get(
    client: &reqwest::Client,
    host: &str,
    port: u16,
    path: &str,
    limit: Duration,
) -> Result<HttpResponse, DispatchError> {
    let url = url(host, port, path);
    let resp = client
        .get(&url)
        .timeout(limit)
        .send()
        .await
        .map_err(|e| classify(&url, e))?;
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(|e| classify(&url, e))?;
    Ok(HttpResponse { status, body })
}

/// Blocking form of [`get`] for operator-side calls. Must not be called from
/// inside an async runtime.
pub fn get_blocking(host: &str, port: u16, path: &str, limit: Duration) -> Result<HttpResponse, DispatchError> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let client = client()?;
    rt.block_on(get(&client, host, port, path, limit))
}

fn classify(url: &str, e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout
    } else if e.is_connect() {
        DispatchError::Connect(url.to_string(), e)
    } else {
        DispatchError::Http(e)
    }
}
