use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::{Environment, EnvironmentError};

/// Directory, relative to the working directory, holding configuration files.
const CONFIGURATION_DIR: &str = "configuration";

/// Variable pointing at another configuration directory, e.g. one mounted into a job container.
const CONFIGURATION_DIR_VAR: &str = "SYNC_CONFIGURATION_DIR";

/// File extensions probed for each configuration file, in order.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix of environment variables overriding file settings.
const ENV_PREFIX: &str = "APP";

/// Separator between [`ENV_PREFIX`] and the first key segment.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator between nested key segments, e.g. `APP_BATCH__MAX_BATCH_SIZE`.
const ENV_SEPARATOR: &str = "__";

/// Separator for list values supplied through environment variables.
const LIST_SEPARATOR: &str = ",";

/// Implemented by top-level configuration structures.
pub trait Config {
    /// Keys whose environment variable values are split on [`LIST_SEPARATOR`].
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Which configuration file is being resolved.
#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    /// Settings shared by every environment.
    Base,
    /// Overrides for one environment.
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> &'static str {
        match self {
            ConfigFileKind::Base => "base",
            ConfigFileKind::Environment(env) => env.as_str(),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors raised while assembling a configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// The working directory could not be determined.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// The configuration directory is missing.
    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    /// None of the probed file names exist.
    #[error("could not locate {kind_description} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        kind_description: String,
        directory: PathBuf,
        attempted: String,
    },

    /// A file exists but could not be parsed.
    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    /// The merged configuration does not match the target type.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    /// `APP_ENVIRONMENT` holds an unsupported value.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// The builder failed to merge its sources.
    #[error("failed to build configuration: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),
}

/// Loads `T` for the environment named by `APP_ENVIRONMENT`.
///
/// Files are read from `SYNC_CONFIGURATION_DIR`, or `./configuration` when it is unset:
/// `base.*` first, then `{environment}.*`, then `APP_` environment variables. Nested keys use
/// `__` and list values are comma separated.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let working_dir = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let directory = configuration_directory(
        &working_dir,
        std::env::var_os(CONFIGURATION_DIR_VAR).map(PathBuf::from),
    );
    let environment = Environment::load()?;

    load_config_from_dir(&directory, environment)
}

/// Relative overrides are resolved against `working_dir`.
fn configuration_directory(working_dir: &Path, override_dir: Option<PathBuf>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.as_os_str().is_empty() => working_dir.join(dir),
        _ => working_dir.join(CONFIGURATION_DIR),
    }
}

/// Loads `T` from an explicit configuration directory and environment.
pub fn load_config_from_dir<T>(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !configuration_directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            configuration_directory.to_path_buf(),
        ));
    }

    let builder = rust_cli_config::Config::builder();
    let builder = add_file_source(builder, configuration_directory, ConfigFileKind::Base)?;
    let builder = add_file_source(
        builder,
        configuration_directory,
        ConfigFileKind::Environment(environment),
    )?;

    builder
        .add_source(environment_source::<T>())
        .build()
        .map_err(LoadConfigError::Builder)?
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// `APP_`-prefixed variables, with list splitting enabled for `T::LIST_PARSE_KEYS`.
fn environment_source<T: Config>() -> rust_cli_config::Environment {
    let source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if T::LIST_PARSE_KEYS.is_empty() {
        return source;
    }

    T::LIST_PARSE_KEYS.iter().fold(
        source.try_parsing(true).list_separator(LIST_SEPARATOR),
        |source, key| source.with_list_parse_key(key),
    )
}

/// Adds the file of `kind` found in `directory` and checks that it parses, so a broken file is
/// reported by name instead of as a merged build failure.
fn add_file_source(
    builder: ConfigBuilder<DefaultState>,
    directory: &Path,
    kind: ConfigFileKind,
) -> Result<ConfigBuilder<DefaultState>, LoadConfigError> {
    let path = find_configuration_file(directory, kind)?;
    let builder = builder.add_source(rust_cli_config::File::from(path.clone()));

    match builder.clone().build() {
        Ok(_) => Ok(builder),
        Err(source) => Err(LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path,
            source,
        }),
    }
}

/// Returns the first existing `{stem}.{extension}` file in `directory`.
fn find_configuration_file(
    directory: &Path,
    kind: ConfigFileKind,
) -> Result<PathBuf, LoadConfigError> {
    let stem = kind.stem();
    let candidates: Vec<PathBuf> = CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .collect();

    if let Some(path) = candidates.iter().find(|path| path.is_file()) {
        return Ok(path.clone());
    }

    Err(LoadConfigError::ConfigurationFileMissing {
        kind_description: kind.to_string(),
        directory: directory.to_path_buf(),
        attempted: candidates
            .iter()
            .map(|path| format!("`{}`", path.display()))
            .collect::<Vec<_>>()
            .join(", "),
    })
}
