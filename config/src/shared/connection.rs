use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;

/// Session settings applied to every connection of the document store.
const SESSION_OPTIONS: &[(&str, &str)] = &[
    ("datestyle", "ISO"),
    ("intervalstyle", "postgres"),
    ("client_encoding", "UTF8"),
];

/// Connection settings of a Postgres instance backing the document store.
///
/// Only [`Deserialize`] is implemented so that the password never ends up in serialized output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the server.
    pub host: String,
    /// Port the server listens on.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// Role used to authenticate.
    pub username: String,
    /// Password of [`PgConnectionConfig::username`], redacted in debug output.
    pub password: Option<SecretString>,
    /// TLS settings.
    #[serde(default)]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    /// Validates the connection settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.tls.validate()
    }
}

/// TLS settings of a Postgres connection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    /// Whether TLS is required.
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Fails with [`ValidationError::MissingTrustedRootCerts`] when TLS is enabled without
    /// certificates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts connection settings into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options that do not select a database, used for administrative statements.
    fn without_db(&self) -> Output;

    /// Options connecting to the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .options(SESSION_OPTIONS.iter().copied());

        if self.tls.enabled {
            options = options.ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());
        }

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}
