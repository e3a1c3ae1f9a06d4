use thiserror::Error;

/// Errors returned by the `validate` methods of configuration types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A numeric field violates its constraint.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A required URL is empty.
    #[error("`{0}` must not be empty")]
    EmptyUrl(String),
}
