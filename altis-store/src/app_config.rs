use altis_core::ProviderId;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::secret::Secret;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// Upper bound on any single (leg x provider) task.
    pub provider_deadline_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { provider_deadline_ms: 30_000 }
    }
}

impl SearchConfig {
    pub fn provider_deadline(&self) -> Duration {
        Duration::from_millis(self.provider_deadline_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    pub enabled: Vec<ProviderId>,
    pub sky_scrapper: SkyScrapperConfig,
    pub duffel: DuffelConfig,
    pub synthetic: SyntheticConfig,
    pub inventory: InventoryConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: ProviderId::ALL.to_vec(),
            sky_scrapper: SkyScrapperConfig::default(),
            duffel: DuffelConfig::default(),
            synthetic: SyntheticConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

impl ProvidersConfig {
    pub fn is_enabled(&self, id: ProviderId) -> bool {
        self.enabled.contains(&id)
    }
}

// ============================================================================
// Sky Scrapper (two-phase polling upstream)
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SkyScrapperConfig {
    pub api_key: Option<Secret<String>>,
    pub host: String,
    pub base_url: Option<String>,
    pub leg_timeout_ms: u64,
    pub initial_timeout_ms: u64,
    pub place_timeout_ms: u64,
    pub poll_budget_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub market: String,
    pub locale: String,
}

impl Default for SkyScrapperConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            host: "sky-scrapper.p.rapidapi.com".to_string(),
            base_url: None,
            leg_timeout_ms: 25_000,
            initial_timeout_ms: 15_000,
            place_timeout_ms: 8_000,
            poll_budget_ms: 6_000,
            poll_max_attempts: 3,
            poll_timeout_ms: 4_000,
            poll_interval_ms: 1_000,
            market: "US".to_string(),
            locale: "en-US".to_string(),
        }
    }
}

impl SkyScrapperConfig {
    /// The key, if one is configured and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose().as_str())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.host))
    }

    pub fn leg_timeout(&self) -> Duration { Duration::from_millis(self.leg_timeout_ms) }
    pub fn initial_timeout(&self) -> Duration { Duration::from_millis(self.initial_timeout_ms) }
    pub fn place_timeout(&self) -> Duration { Duration::from_millis(self.place_timeout_ms) }
    pub fn poll_budget(&self) -> Duration { Duration::from_millis(self.poll_budget_ms) }
    pub fn poll_timeout(&self) -> Duration { Duration::from_millis(self.poll_timeout_ms) }
    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
}

// ============================================================================
// Duffel (single-call upstream)
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DuffelConfig {
    pub access_token: Option<Secret<String>>,
    pub base_url: String,
    pub api_version: String,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for DuffelConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: "https://api.duffel.com".to_string(),
            api_version: "v2".to_string(),
            timeout_ms: 20_000,
            max_attempts: 3,
            backoff_base_ms: 500,
        }
    }
}

impl DuffelConfig {
    pub fn access_token(&self) -> Option<&str> {
        self.access_token
            .as_ref()
            .map(|t| t.expose().as_str())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
    pub fn backoff_base(&self) -> Duration { Duration::from_millis(self.backoff_base_ms) }
}

// ============================================================================
// Synthetic & Inventory
// ============================================================================

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AirlineEntry {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyntheticConfig {
    pub airlines: Vec<AirlineEntry>,
    pub hubs: Vec<String>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        let airlines = [
            ("TK", "Turkish Airlines"),
            ("IB", "Iberia"),
            ("AF", "Air France"),
            ("LH", "Lufthansa"),
            ("UX", "Air Europa"),
            ("CM", "Copa Airlines"),
            ("AA", "American Airlines"),
            ("BA", "British Airways"),
        ];
        Self {
            airlines: airlines
                .iter()
                .map(|(code, name)| AirlineEntry {
                    code: code.to_string(),
                    name: name.to_string(),
                })
                .collect(),
            hubs: ["MAD", "IST", "CDG", "FRA", "PTY", "MIA", "LHR", "AMS"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct InventoryConfig {
    /// JSON file of inventory rows. No path, no inventory provider.
    pub path: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = config::Config::builder()
            // Defaults live in the structs, so even the base file is optional
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false));

        Self::from_builder(builder, None)
    }

    /// Finish a builder with the `ALTIS__` environment layer and deserialize.
    /// `env_override` replaces the process environment (used by tests).
    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        env_override: Option<config::Map<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        // Eg.. `ALTIS__PROVIDERS__DUFFEL__ACCESS_TOKEN=...`
        let environment = config::Environment::with_prefix("ALTIS")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("providers.enabled")
            .try_parsing(true)
            .source(env_override);

        builder.add_source(environment).build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    #[test]
    fn test_empty_sources_yield_defaults() {
        let config = Config::from_builder(config::Config::builder(), Some(config::Map::new()))
            .expect("defaults should deserialize");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.providers.enabled, ProviderId::ALL.to_vec());
        assert!(config.providers.sky_scrapper.api_key().is_none());
        assert!(config.providers.duffel.access_token().is_none());
        assert_eq!(config.providers.sky_scrapper.poll_budget(), Duration::from_secs(6));
        assert_eq!(config.providers.sky_scrapper.base_url(), "https://sky-scrapper.p.rapidapi.com");
        assert_eq!(config.providers.synthetic.airlines.len(), 8);
    }

    #[test]
    fn test_file_and_environment_layers() {
        let toml = r#"
            [providers]
            enabled = ["synthetic", "duffel"]

            [providers.sky_scrapper]
            poll_max_attempts = 1
        "#;
        let mut env = config::Map::new();
        env.insert("ALTIS__PROVIDERS__DUFFEL__ACCESS_TOKEN".to_string(), "duffel_test_abc".to_string());
        env.insert("ALTIS__SERVER__PORT".to_string(), "9090".to_string());

        let builder = config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        let config = Config::from_builder(builder, Some(env)).expect("layered config");

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.providers.enabled, vec![ProviderId::Synthetic, ProviderId::Duffel]);
        assert!(config.providers.is_enabled(ProviderId::Duffel));
        assert!(!config.providers.is_enabled(ProviderId::SkyScrapper));
        assert_eq!(config.providers.sky_scrapper.poll_max_attempts, 1);
        assert_eq!(config.providers.duffel.access_token(), Some("duffel_test_abc"));
    }

    #[test]
    fn test_blank_credentials_count_as_missing() {
        let toml = r#"
            [providers.sky_scrapper]
            api_key = "   "
        "#;
        let builder = config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        let config = Config::from_builder(builder, Some(config::Map::new())).unwrap();
        assert!(config.providers.sky_scrapper.api_key().is_none());
    }

    #[test]
    fn test_debug_output_masks_credentials() {
        let toml = r#"
            [providers.duffel]
            access_token = "duffel_live_secret"
        "#;
        let builder = config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        let config = Config::from_builder(builder, Some(config::Map::new())).unwrap();
        let printed = format!("{:?}", config.providers.duffel);
        assert!(!printed.contains("duffel_live_secret"));
        assert!(printed.contains("********"));
    }
}
