//! Error types for `orecast-core`.
//!
//! Each variant carries enough context to diagnose the problem without a
//! debugger. No variant ever includes a passphrase, a bearer token, a client
//! secret, or decrypted storage credentials.

use orecast_storage::StorageError;

/// Errors from the credential vault.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The plaintext could not be encrypted.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// The ciphertext could not be turned back into plaintext (bad hex,
    /// corruption, wrong passphrase or wrong cipher).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// The configured cipher name is not one the vault knows.
    #[error("unsupported cipher '{cipher}'")]
    UnsupportedCipher { cipher: String },
}

/// Errors from acquiring or validating the service bearer token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// No usable token could be obtained from the authorization service.
    #[error("token acquisition failed: {reason}")]
    Acquisition { reason: String },

    /// The token is not a well-formed JWT.
    #[error("malformed token: {reason}")]
    Malformed { reason: String },

    /// The token signature does not verify against the configured key.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token claims are not currently valid (expired, not yet valid).
    #[error("invalid token claims: {reason}")]
    InvalidClaims { reason: String },
}

/// Errors from calls to downstream services.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The bearer token could not be obtained, so no request was sent.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The request could not be built.
    #[error("invalid request to {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    /// The request did not complete (connection refused, reset, DNS).
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The service answered with a non-success status code.
    #[error("{url} returned HTTP {status}: {body}")]
    UnexpectedStatus { url: String, status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("unable to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// The service answered with a result envelope whose status is not `ok`.
    #[error("{url} rejected the request: {reason}")]
    Rejected { url: String, reason: String },
}

/// Errors from resolving or registering a site.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// The discovery service could not be queried.
    #[error("discovery service error: {0}")]
    Discovery(#[from] ClientError),

    /// No discovery record carries this exact name.
    #[error("site '{site}' not found")]
    NotFound { site: String },

    /// The stored access key or secret could not be decrypted.
    #[error("unable to decrypt credentials of site '{site}': {source}")]
    CredentialDecryption {
        site: String,
        #[source]
        source: CryptoError,
    },

    /// Credentials supplied for registration could not be encrypted.
    #[error("unable to encrypt credentials of site '{site}': {source}")]
    CredentialEncryption {
        site: String,
        #[source]
        source: CryptoError,
    },

    /// A storage session could not be opened.
    #[error("unable to open storage session for site '{site}': {source}")]
    StorageSession {
        site: String,
        #[source]
        source: StorageError,
    },

    /// Buckets or objects could not be enumerated.
    #[error("unable to list storage of site '{site}': {source}")]
    StorageListing {
        site: String,
        #[source]
        source: StorageError,
    },
}

/// Errors from login and user registration.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// The password could not be encrypted before sending.
    #[error("unable to encrypt user password: {0}")]
    Encryption(#[from] CryptoError),

    /// The authorization service could not be reached or answered badly.
    #[error("authorization service error: {0}")]
    Client(#[from] ClientError),

    /// The authorization service does not accept these credentials.
    #[error("user '{user}' was rejected by the authorization service")]
    Rejected { user: String },
}
