use crate::config::TradingConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the trading configuration by layering TOML, environment
    /// variables, and an optional JSON override on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<TradingConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<TradingConfig> {
        let config: TradingConfig = Figment::from(Serialized::defaults(TradingConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PERP_PILOT_"))
            .join(Json::file("config/Config.json"))
            .extract()?;

        Ok(config)
    }
}
