//! # Credential Resolver
//!
//! Loads the Git hosting token and commit identity from the referenced Secret.

use crate::constants::{DEFAULT_GIT_EMAIL, DEFAULT_GIT_USERNAME};
use crate::controller::cluster::{ClusterAccess, ClusterError};
use crate::crd::SecretRef;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret key holding the API/git token (required)
pub const TOKEN_KEY: &str = "token";
/// Secret key holding the commit username (optional)
pub const USERNAME_KEY: &str = "username";
/// Secret key holding the commit email (optional)
pub const EMAIL_KEY: &str = "email";

/// Errors resolving credentials
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("credentials secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("credentials secret {namespace}/{name} has no '{TOKEN_KEY}' field")]
    MissingToken { namespace: String, name: String },
    #[error("credentials secret {namespace}/{name} field '{key}' is not valid UTF-8")]
    InvalidEncoding {
        namespace: String,
        name: String,
        key: String,
    },
    #[error("failed to read credentials from the cluster: {0}")]
    Cluster(#[from] ClusterError),
}

/// Token plus commit identity, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub token: String,
    pub username: String,
    pub email: String,
}

impl Credentials {
    /// Build credentials, defaulting username and email to the operator identity
    #[must_use]
    pub fn new(token: String, username: Option<String>, email: Option<String>) -> Self {
        Self {
            token,
            username: username
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_GIT_USERNAME.to_string()),
            email: email
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_GIT_EMAIL.to_string()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &crate::constants::REDACTED)
            .field("username", &crate::constants::REDACTED)
            .field("email", &self.email)
            .finish()
    }
}

/// Resolve credentials from `secret_ref`
pub async fn resolve_credentials(
    cluster: &dyn ClusterAccess,
    secret_ref: &SecretRef,
) -> Result<Credentials, CredentialsError> {
    let data = cluster
        .get_secret_data(&secret_ref.namespace, &secret_ref.name)
        .await?
        .ok_or_else(|| CredentialsError::SecretNotFound {
            namespace: secret_ref.namespace.clone(),
            name: secret_ref.name.clone(),
        })?;

    let field = |key: &str| -> Result<Option<String>, CredentialsError> {
        data.get(key)
            .map(|bytes| {
                String::from_utf8(bytes.clone())
                    .map(|s| s.trim().to_string())
                    .map_err(|_| CredentialsError::InvalidEncoding {
                        namespace: secret_ref.namespace.clone(),
                        name: secret_ref.name.clone(),
                        key: key.to_string(),
                    })
            })
            .transpose()
    };

    let token = field(TOKEN_KEY)?
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CredentialsError::MissingToken {
            namespace: secret_ref.namespace.clone(),
            name: secret_ref.name.clone(),
        })?;

    Ok(Credentials::new(token, field(USERNAME_KEY)?, field(EMAIL_KEY)?))
}
