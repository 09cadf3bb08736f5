//! OAuth 2.0 installed-application flow with a loopback redirect.

#![allow(clippy::print_stderr)]

use super::Credentials;
use crate::constants::oauth::{AUTH_URL, TOKEN_URL};
use crate::error::{Error, Result};
use crate::http::{read_json, request_error};
use chrono::{TimeDelta, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Obtains and renews credentials for one service.
#[allow(async_fn_in_trait)]
pub trait AuthorizationFlow {
    /// Run the interactive consent flow.
    async fn authorize(&self) -> Result<Credentials>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials>;
}

/// Registered OAuth client identity.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client identifier.
    pub client_id: String,
    /// Client secret (installed apps treat this as non-confidential).
    pub client_secret: String,
}

/// Google OAuth flow for a fixed set of scopes.
#[derive(Debug, Clone)]
pub struct GoogleOAuthFlow {
    http: Client,
    client: OAuthClient,
    scopes: Vec<String>,
    service: &'static str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl GoogleOAuthFlow {
    /// Flow for `service` (used in prompts) requesting `scopes`.
    pub fn new(http: Client, client: OAuthClient, scopes: &[&str], service: &'static str) -> Self {
        Self {
            http,
            client,
            scopes: scopes.iter().map(ToString::to_string).collect(),
            service,
        }
    }

    /// Consent URL for a loopback redirect.
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url> {
        let scope = self.scopes.join(" ");
        Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.client.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| Error::Internal {
            message: format!("failed to build authorization URL: {e}"),
        })
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| request_error(TOKEN_URL, e))?;

        read_json(response, "token endpoint").await
    }

    fn into_credentials(&self, token: TokenResponse, previous_refresh: Option<&str>) -> Credentials {
        Credentials {
            access_token: token.access_token,
            refresh_token: token
                .refresh_token
                .or_else(|| previous_refresh.map(ToString::to_string)),
            expires_at: Utc::now() + TimeDelta::seconds(token.expires_in),
            scopes: token.scope.map_or_else(
                || self.scopes.clone(),
                |s| s.split_whitespace().map(ToString::to_string).collect(),
            ),
        }
    }
}

impl AuthorizationFlow for GoogleOAuthFlow {
    async fn authorize(&self) -> Result<Credentials> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}");
        let state = authorization_state();
        let url = self.authorization_url(&redirect_uri, &state)?;

        eprintln!();
        eprintln!("Authorization required for {}.", self.service);
        eprintln!("Open this URL in your browser and grant access:");
        eprintln!();
        eprintln!("  {url}");
        eprintln!();
        info!("Waiting for authorization callback on {redirect_uri}");

        let code = wait_for_callback(&listener, &state).await?;
        debug!("Received authorization code for {}", self.service);

        let token = self
            .request_token(&[
                ("code", code.as_str()),
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;

        if token.refresh_token.is_none() {
            return Err(Error::Authorization {
                reason: format!("{} did not grant offline access", self.service),
            });
        }

        Ok(self.into_credentials(token, None))
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        let refresh_token =
            credentials
                .refresh_token
                .as_deref()
                .ok_or_else(|| Error::Authorization {
                    reason: format!("no refresh token cached for {}", self.service),
                })?;

        let token = self
            .request_token(&[
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;

        Ok(self.into_credentials(token, Some(refresh_token)))
    }
}

/// Opaque value tying the callback to this authorization request.
fn authorization_state() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    format!("{:x}{:x}", nanos, std::process::id())
}

/// Accept the browser redirect and extract the authorization code.
async fn wait_for_callback(listener: &TcpListener, expected_state: &str) -> Result<String> {
    let (mut stream, peer) = listener.accept().await?;
    debug!("Authorization callback from {peer}");

    let mut buffer = vec![0u8; 8192];
    let mut len = 0;
    while len < buffer.len() {
        let n = stream.read(&mut buffer[len..]).await?;
        if n == 0 {
            break;
        }
        len += n;
        if buffer[..len].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buffer[..len]);
    let outcome = parse_callback(&request, expected_state);

    let body = match &outcome {
        Ok(_) => "Authorization complete. You can close this window.",
        Err(_) => "Authorization failed. Check the terminal for details.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    outcome
}

/// Parse `GET /?code=...&state=... HTTP/1.1` from the redirect request.
fn parse_callback(request: &str, expected_state: &str) -> Result<String> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| Error::Authorization {
            reason: "malformed callback request".to_string(),
        })?;

    let url = Url::parse(&format!("http://127.0.0.1{target}")).map_err(|e| {
        Error::Authorization {
            reason: format!("malformed callback URL: {e}"),
        }
    })?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(Error::Authorization {
                    reason: format!("consent denied: {value}"),
                });
            }
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(Error::Authorization {
            reason: "callback state does not match the request".to_string(),
        });
    }

    code.ok_or_else(|| Error::Authorization {
        reason: "callback did not include an authorization code".to_string(),
    })
}
