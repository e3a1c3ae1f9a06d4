use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Variable naming the environment a sync process runs in.
const ENVIRONMENT_VAR: &str = "APP_ENVIRONMENT";

/// Deployment a sync process runs in.
///
/// Picks the configuration file layered over `base` and the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local runs against a development store. Human readable logs.
    #[default]
    Dev,
    /// Scheduled runs against the production store. JSON logs.
    Prod,
}

/// `APP_ENVIRONMENT` names no known environment.
#[derive(Debug, Error)]
#[error("`{value}` is not a sync environment, expected one of: {expected}")]
pub struct EnvironmentError {
    value: String,
    expected: String,
}

impl Environment {
    const ALL: [Environment; 2] = [Environment::Dev, Environment::Prod];

    /// Reads `APP_ENVIRONMENT`. An unset variable selects [`Environment::Dev`].
    pub fn load() -> Result<Environment, EnvironmentError> {
        Self::from_variable(std::env::var(ENVIRONMENT_VAR).ok().as_deref())
    }

    fn from_variable(value: Option<&str>) -> Result<Environment, EnvironmentError> {
        match value.map(str::trim) {
            None | Some("") => Ok(Environment::default()),
            Some(value) => value.parse(),
        }
    }

    /// Stem of the configuration file of this environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn is_prod(&self) -> bool {
        *self == Environment::Prod
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = EnvironmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|environment| value.eq_ignore_ascii_case(environment.as_str()))
            .ok_or_else(|| EnvironmentError {
                value: value.to_string(),
                expected: Self::ALL.map(|environment| environment.as_str()).join(", "),
            })
    }
}
