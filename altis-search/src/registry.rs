use altis_core::{FlightProvider, InventoryStore, ProviderId};
use altis_store::{Config, JsonInventoryStore, StoreError};
use altis_supplier::{DuffelProvider, HttpTransport, InventoryProvider, SkyScrapperProvider, SyntheticProvider};
use std::sync::Arc;
use tracing::info;

/// Active providers keyed by id, in `ProviderId` order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn FlightProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any earlier one with the same id.
    pub fn register(&mut self, provider: Arc<dyn FlightProvider>) -> &mut Self {
        let id = provider.id();
        self.providers.retain(|p| p.id() != id);
        self.providers.push(provider);
        self.providers.sort_by_key(|p| p.id());
        self
    }

    /// Build the configured set. Providers that are disabled, or enabled but
    /// missing credentials, are left out.
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        inventory: Option<Arc<dyn InventoryStore>>,
    ) -> Self {
        let providers = &config.providers;
        let mut registry = Self::new();

        for id in ProviderId::ALL {
            if !providers.is_enabled(id) {
                info!(provider = %id, "Provider disabled by configuration");
                continue;
            }
            let provider: Option<Arc<dyn FlightProvider>> = match id {
                ProviderId::SkyScrapper => {
                    let p = SkyScrapperProvider::new(providers.sky_scrapper.clone(), transport.clone());
                    p.is_configured().then(|| Arc::new(p) as Arc<dyn FlightProvider>)
                }
                ProviderId::Duffel => {
                    let p = DuffelProvider::new(providers.duffel.clone(), transport.clone());
                    p.is_configured().then(|| Arc::new(p) as Arc<dyn FlightProvider>)
                }
                ProviderId::Synthetic => Some(Arc::new(SyntheticProvider::new(&providers.synthetic)) as Arc<dyn FlightProvider>),
                ProviderId::Inventory => inventory
                    .clone()
                    .map(|store| Arc::new(InventoryProvider::new(store)) as Arc<dyn FlightProvider>),
            };

            match provider {
                Some(provider) => {
                    registry.register(provider);
                }
                None => info!(provider = %id, "Provider enabled but not configured, skipping"),
            }
        }

        info!(providers = ?registry.ids(), "Provider registry ready");
        registry
    }

    /// Like `from_config`, loading the inventory file when one is configured.
    pub async fn build(config: &Config, transport: Arc<dyn HttpTransport>) -> Result<Self, StoreError> {
        let inventory = match (&config.providers.inventory.path, config.providers.is_enabled(ProviderId::Inventory)) {
            (Some(path), true) => {
                let store = JsonInventoryStore::load(path).await?;
                Some(Arc::new(store) as Arc<dyn InventoryStore>)
            }
            _ => None,
        };
        Ok(Self::from_config(config, transport, inventory))
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn FlightProvider>> {
        self.providers.iter().find(|p| p.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn providers(&self) -> &[Arc<dyn FlightProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
