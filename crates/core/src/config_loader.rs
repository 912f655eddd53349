use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads trading configuration by merging TOML and environment variables.
    ///
    /// Validation runs before the config is handed out; an unsound profile
    /// table aborts startup here rather than surfacing mid-trade.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be read, parsed, or fails
    /// validation.
    pub fn load() -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Env::prefixed("PERP_").split("__"))
            .extract()?;

        config.validate().context("configuration rejected")?;
        Ok(config)
    }

    /// Loads configuration with an environment-specific profile overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be read, parsed, or fails
    /// validation.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Env::prefixed("PERP_").split("__"))
            .extract()?;

        config.validate().context("configuration rejected")?;
        Ok(config)
    }
}
