//! OAuth sessions for the imagery platform and the storage service.
//!
//! Each remote service gets its own [`OAuthSession`] with its own credential
//! cache. Sessions are created by the caller and handed to the clients that
//! need them; clients obtain a bearer token through [`bearer_token`], which
//! refreshes expired credentials transparently.

mod credentials;
mod flow;
mod session;

pub use credentials::{CredentialStore, Credentials};
pub use flow::{AuthorizationFlow, GoogleOAuthFlow, OAuthClient};
pub use session::{OAuthSession, Session, bearer_token};
