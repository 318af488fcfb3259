//! Credential verification.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::config::UserAccount;

pub trait CredentialStore: Send + Sync {
    /// The user id for a matching username/password, if any.
    fn verify(&self, username: &str, password: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
struct StoredUser {
    user_id: String,
    digest: [u8; 32],
}

/// Users held in memory as salted SHA-256 digests.
///
/// The digest covers `secret`, the username and the password, so a digest
/// copied from one deployment does not verify on another.
#[derive(Debug, Clone)]
pub struct MemoryCredentials {
    secret: String,
    users: HashMap<String, StoredUser>,
}

impl MemoryCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            users: HashMap::new(),
        }
    }

    pub fn from_accounts(secret: impl Into<String>, accounts: &[UserAccount]) -> Self {
        let mut store = Self::new(secret);
        for account in accounts {
            store.add_user(&account.username, &account.user_id, &account.password);
        }
        store
    }

    pub fn add_user(&mut self, username: &str, user_id: &str, password: &str) {
        let digest = self.digest(username, password);
        self.users.insert(
            username.to_string(),
            StoredUser {
                user_id: user_id.to_string(),
                digest,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn digest(&self, username: &str, password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update([0u8]);
        hasher.update(username.as_bytes());
        hasher.update([0u8]);
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }
}

impl CredentialStore for MemoryCredentials {
    fn verify(&self, username: &str, password: &str) -> Option<String> {
        let user = self.users.get(username)?;
        let candidate = self.digest(username, password);
        constant_time_eq(&candidate, &user.digest).then(|| user.user_id.clone())
    }
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
