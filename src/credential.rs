//! Credential resolution.
//!
//! A `Credential` is never logged. `CredentialProvider` is a trait so the
//! facade can be wired to an env-var source, a secret store, or a static
//! pair in tests. Those concrete sources are an external collaborator;
//! this crate only defines the seam and a static implementation.

use async_trait::async_trait;

/// A `(login, password)` pair used to obtain a bearer token.
///
/// `Debug` is implemented by hand so the password never appears in logs.
#[derive(Clone)]
pub struct Credential {
    login: String,
    password: String,
}

impl Credential {
    /// Builds a credential from a login/password pair.
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves credentials on demand, replaceable by the caller.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the credential to use for the next authorization attempt.
    async fn credential(&self) -> Option<Credential>;
}

/// A provider that always returns the same, fixed credential.
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self) -> Option<Credential> {
        Some(self.credential.clone())
    }
}

/// A provider with no credential configured; authentication is bypassed.
#[derive(Default)]
pub struct NoCredentialProvider;

#[async_trait]
impl CredentialProvider for NoCredentialProvider {
    async fn credential(&self) -> Option<Credential> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let c = Credential::new("alice", "hunter2");
        let rendered = format!("{c:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("alice"));
    }

    #[tokio::test]
    async fn static_provider_returns_same_credential() {
        let provider = StaticCredentialProvider::new(Credential::new("alice", "hunter2"));
        let a = provider.credential().await.unwrap();
        let b = provider.credential().await.unwrap();
        assert_eq!(a.login(), b.login());
    }

    #[tokio::test]
    async fn no_credential_provider_returns_none() {
        let provider = NoCredentialProvider;
        assert!(provider.credential().await.is_none());
    }
}
