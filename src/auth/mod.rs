//! Authentication collaborator.
//!
//! # Data Flow
//! ```text
//! login (user, password)
//!     → credentials.rs (verify against stored digests)
//!     → tokens.rs (issue access + refresh pair)
//!
//! request with token
//!     → session middleware → SessionValidator::resolve
//!     → Session attached to request extensions
//!     → router access check / `if` command read it
//! ```

pub mod credentials;
pub mod tokens;

pub use credentials::{CredentialStore, MemoryCredentials};
pub use tokens::{TokenAuthority, TokenPair};

/// The caller identity attached to a request by the session middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

/// Token checks the request pipeline depends on.
pub trait SessionValidator: Send + Sync {
    fn is_token_valid(&self, token: &str) -> bool;

    fn user_id_from_token(&self, token: &str) -> Option<String>;

    /// Turn a valid token into a [`Session`].
    fn resolve(&self, token: &str) -> Option<Session> {
        if !self.is_token_valid(token) {
            return None;
        }
        self.user_id_from_token(token).map(|user_id| Session {
            user_id,
            token: token.to_string(),
        })
    }
}
