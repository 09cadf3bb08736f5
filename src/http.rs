//! Shared HTTP client setup and response checks.

use crate::constants::http::{CONNECT_TIMEOUT_SECS, ERROR_BODY_LIMIT, REQUEST_TIMEOUT_SECS};
use crate::error::{Error, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Create an HTTP client with timeouts for all remote calls.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::Internal {
            message: format!("Failed to create HTTP client: {e}"),
        })
}

/// Map a transport error for `url`.
pub fn request_error(url: &str, source: reqwest::Error) -> Error {
    Error::Request {
        url: url.to_string(),
        source,
    }
}

/// Turn non-success responses into [`Error::HttpStatus`] carrying the body.
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }

    Err(Error::HttpStatus {
        status: status.as_u16(),
        url,
        body,
    })
}

/// Check the status and decode a JSON body.
pub async fn read_json<T: DeserializeOwned>(response: Response, service: &'static str) -> Result<T> {
    let response = check_status(response).await?;
    let url = response.url().to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| request_error(&url, e))?;

    serde_json::from_slice(&bytes).map_err(|e| Error::RemoteResponse {
        service,
        reason: e.to_string(),
    })
}

/// Local port nothing listens on.
#[cfg(test)]
pub const REFUSED_URL: &str = "http://127.0.0.1:1/";

/// Client for loopback test servers, ignoring any proxy settings.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub fn local_client() -> Client {
    Client::builder().no_proxy().build().unwrap()
}

/// Transport error from a connection nobody accepts.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub async fn refused_connection() -> reqwest::Error {
    local_client().get(REFUSED_URL).send().await.unwrap_err()
}
