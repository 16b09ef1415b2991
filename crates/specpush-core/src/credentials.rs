//! Username/secret credentials for authenticated remotes.

use git2::{Cred, CredentialType, RemoteCallbacks};
use secrecy::{ExposeSecret, SecretString};

/// Upper bound on credential callbacks per network operation. libgit2 asks
/// again after every rejected attempt, so without a cap a wrong password
/// loops until the server disconnects.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Opaque username/password pair handed unchanged to clone, push and remote
/// listing.
///
/// Authentication uses only these values: credential helpers, SSH agents and
/// the user's global git configuration are never consulted.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    username: String,
    password: SecretString,
}

impl CredentialStore {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Register the credential callback on `callbacks`.
    pub fn install<'a>(&'a self, callbacks: &mut RemoteCallbacks<'a>) {
        let mut attempts = 0u32;
        callbacks.credentials(move |_url, _username_from_url, allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str(
                    "authentication failed: credentials rejected by remote",
                ));
            }
            if !allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Err(git2::Error::from_str(
                    "remote does not accept username/password authentication",
                ));
            }
            tracing::debug!(username = %self.username, attempt = attempts, "supplying credentials");
            Cred::userpass_plaintext(&self.username, self.password.expose_secret())
        });
    }
}
