use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by merging TOML, environment variables, and JSON.
    ///
    /// Nested keys are addressed with a double underscore, e.g.
    /// `APP_STORE__SERVICE_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Self::base(path).extract()?;
        Ok(config)
    }

    /// Loads application configuration with a specific profile.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Env::prefixed("APP_").split("__"))
            .join(Json::file("config/Config.json"))
            .extract()?;

        Ok(config)
    }

    fn base(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("APP_").split("__"))
            .join(Json::file("config/Config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RatioUnit;
    use figment::Jail;

    #[test]
    fn missing_files_fall_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::load().map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 8080);
            assert!(config.accounts.is_empty());
            Ok(())
        });
    }

    #[test]
    fn toml_and_env_layers_merge() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/Config.toml",
                r#"
                accounts = ["acc-1"]

                [store]
                url = "https://store.example.com"
                ratio_unit = "fraction"

                [engine]
                hedge_delay_ms = 4000
                "#,
            )?;
            jail.set_env("APP_SERVER__PORT", "9090");
            jail.set_env("APP_STORE__SERVICE_KEY", "from-env");

            let config = ConfigLoader::load().map_err(|e| e.to_string())?;
            assert_eq!(config.accounts, vec!["acc-1".to_string()]);
            assert_eq!(config.store.url, "https://store.example.com");
            assert_eq!(config.store.ratio_unit, RatioUnit::Fraction);
            assert_eq!(config.store.service_key, "from-env");
            assert_eq!(config.engine.hedge_delay_ms, 4000);
            assert_eq!(config.engine.reentry_delay_ms, 7000);
            assert_eq!(config.server.port, 9090);
            Ok(())
        });
    }

    #[test]
    fn profile_file_overrides_base() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file("config/Config.toml", "[okx]\nrest_url = \"https://www.okx.com\"")?;
            jail.create_file(
                "config/Config.demo.toml",
                "[okx]\nrest_url = \"https://demo.okx.com\"",
            )?;

            let config = ConfigLoader::load_with_profile("demo").map_err(|e| e.to_string())?;
            assert_eq!(config.okx.rest_url, "https://demo.okx.com");
            Ok(())
        });
    }
}
