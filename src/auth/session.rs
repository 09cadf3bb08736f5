//! Authenticated sessions with cached, self-renewing credentials.

use super::{AuthorizationFlow, CredentialStore, Credentials};
use crate::error::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A session that can produce a valid bearer token.
#[allow(async_fn_in_trait)]
pub trait Session {
    /// Load or obtain credentials so that the session becomes valid.
    async fn acquire(&mut self) -> Result<()>;

    /// Renew the access token.
    async fn refresh(&mut self) -> Result<()>;

    /// Whether the current access token can be used.
    fn is_valid(&self) -> bool;

    /// Current access token, if any.
    fn access_token(&self) -> Option<&str>;
}

/// OAuth session backed by a credential cache file.
#[derive(Debug)]
pub struct OAuthSession<F> {
    name: &'static str,
    flow: F,
    store: CredentialStore,
    credentials: Option<Credentials>,
}

impl<F: AuthorizationFlow> OAuthSession<F> {
    /// Session for `name` using `flow` and caching in `store`.
    pub const fn new(name: &'static str, flow: F, store: CredentialStore) -> Self {
        Self {
            name,
            flow,
            store,
            credentials: None,
        }
    }

    /// Run the consent flow regardless of what is cached.
    pub async fn reauthorize(&mut self) -> Result<()> {
        info!("Authorizing {}", self.name);
        let credentials = self.flow.authorize().await?;
        self.store.save(&credentials)?;
        self.credentials = Some(credentials);
        Ok(())
    }
}

impl<F: AuthorizationFlow> Session for OAuthSession<F> {
    async fn acquire(&mut self) -> Result<()> {
        if self.credentials.is_none() {
            self.credentials = self.store.load()?;
        }

        match &self.credentials {
            None => self.reauthorize().await,
            Some(creds) if !creds.is_expired() => {
                debug!("Using cached credentials for {}", self.name);
                self.store.save(creds)
            }
            Some(creds) if creds.refresh_token.is_some() => self.refresh().await,
            Some(_) => {
                debug!("Cached {} credentials expired without a refresh token", self.name);
                self.reauthorize().await
            }
        }
    }

    async fn refresh(&mut self) -> Result<()> {
        let current = self.credentials.as_ref().ok_or_else(|| Error::Authorization {
            reason: format!("{} session has no credentials to refresh", self.name),
        })?;

        debug!("Refreshing {} access token", self.name);
        let renewed = self.flow.refresh(current).await?;
        self.store.save(&renewed)?;
        self.credentials = Some(renewed);
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.credentials.as_ref().is_some_and(|c| !c.is_expired())
    }

    fn access_token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.access_token.as_str())
    }
}

/// Valid bearer token from a shared session, renewing it when needed.
pub async fn bearer_token<S: Session>(session: &Mutex<S>) -> Result<String> {
    let mut session = session.lock().await;
    if !session.is_valid() {
        session.acquire().await?;
    }

    session
        .access_token()
        .map(ToString::to_string)
        .ok_or_else(|| Error::Authorization {
            reason: "session has no access token".to_string(),
        })
}
