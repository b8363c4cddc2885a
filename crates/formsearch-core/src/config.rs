//! Lightweight configuration loader.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `FORMSEARCH_*`
//! env vars (`__` separates nested keys, e.g. `FORMSEARCH_POOL__SIZE=8`).
//! Each crate owns the typed section it reads through [`Config::get`].

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::env;
use std::path::Path;

use crate::error::Error;

pub const ENV_PREFIX: &str = "FORMSEARCH_";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load from the TOML files found in `dir`, then the environment.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    /// Build from in-memory values; mainly for tests and embedding.
    pub fn from_serialized<T: serde::Serialize>(values: T) -> anyhow::Result<Self> {
        let config = Self { figment: Figment::from(Serialized::defaults(values)) };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed section, or `T::default()` when the section is missing entirely.
    pub fn section<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.figment.find_value(key).is_err() {
            return Ok(T::default());
        }
        self.get(key)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Ok(size) = self.figment.extract_inner::<u64>("pool.size") {
            if size == 0 {
                return Err(Error::InvalidConfig("pool.size must be at least 1".to_string()).into());
            }
        }
        Ok(())
    }
}
