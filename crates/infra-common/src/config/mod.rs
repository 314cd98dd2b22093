//! Layered configuration loading
//!
//! Sources are merged in order, later ones winning:
//!
//! 1. the `Default` impl of the target type (via `#[serde(default)]`)
//! 2. an optional TOML file
//! 3. environment variables with the given prefix, `__` separating nested keys
//!    (e.g. `CALLRELAY_LOGGING__LEVEL=debug`)

use crate::errors::types::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load a configuration struct from an optional file and the environment
pub fn load_layered<T: DeserializeOwned>(file: Option<&Path>, env_prefix: &str) -> Result<T> {
    let mut builder = Config::builder();

    if let Some(path) = file {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }

    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}

/// Load a configuration struct from a TOML string, for tests and embedded defaults
pub fn load_from_str<T: DeserializeOwned>(toml: &str) -> Result<T> {
    let config = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?;
    Ok(config.try_deserialize()?)
}
