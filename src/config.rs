use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,

    // Límites
    pub max_queue_size: usize,
    pub search_result_limit: usize,

    // MyInstants
    pub instants_base_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,

            // Límites
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            search_result_limit: std::env::var("SEARCH_RESULT_LIMIT")
                .unwrap_or_else(|_| "25".to_string())
                .parse()?,

            // MyInstants
            instants_base_url: std::env::var("INSTANTS_BASE_URL")
                .unwrap_or_else(|_| "https://www.myinstants.com".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores de configuración antes de arrancar.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.search_result_limit == 0 {
            anyhow::bail!("Search result limit must be greater than 0");
        }

        if !self.instants_base_url.starts_with("http") {
            anyhow::bail!(
                "Instants base URL must be absolute, got: {}",
                self.instants_base_url
            );
        }

        Ok(())
    }

    /// Resumen seguro para logging (sin token).
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol\n  \
            Limits: {} queue, {} search results\n  \
            MyInstants: {}",
            self.application_id,
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.search_result_limit,
            self.instants_base_url
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin defaults - deben proporcionarse)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio
            default_volume: 0.5,

            // Límites
            max_queue_size: 1000,
            search_result_limit: 25,

            // MyInstants
            instants_base_url: "https://www.myinstants.com".to_string(),
        }
    }
}
