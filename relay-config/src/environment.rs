use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable that selects the runtime environment.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// Error returned when an environment name cannot be parsed.
#[derive(Debug, Error)]
#[error("`{0}` is not a supported environment, use one of `prod`, `staging` or `dev`")]
pub struct ParseEnvironmentError(String);

/// Runtime environment of the service.
///
/// Drives which configuration file is layered on top of the base file and
/// how logs are formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment.
    Prod,
    /// Staging environment.
    Staging,
    /// Development environment.
    Dev,
}

impl Environment {
    /// Reads the environment from `APP_ENVIRONMENT`.
    ///
    /// Defaults to [`Environment::Prod`] when the variable is not set.
    pub fn load() -> Result<Environment, ParseEnvironmentError> {
        match std::env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::Prod),
        }
    }

    /// Returns whether this is a production-like environment.
    ///
    /// Staging runs with production behavior everywhere except its
    /// configuration file.
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod | Self::Staging)
    }

    /// Canonical lowercase name, as used in configuration file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Staging => "staging",
            Environment::Dev => "dev",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prod" => Ok(Self::Prod),
            "staging" => Ok(Self::Staging),
            "dev" => Ok(Self::Dev),
            other => Err(ParseEnvironmentError(other.to_owned())),
        }
    }
}
