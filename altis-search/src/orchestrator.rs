use altis_core::{CoreError, FlightProvider, LegResult, LegSearch, ProviderId, SearchRequest, SearchResponse};
use altis_store::app_config::SearchConfig;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::filters::merge_leg;
use crate::registry::ProviderRegistry;

/// Scatter-gather over (leg x provider). Stateless between searches.
pub struct SearchOrchestrator {
    providers: Vec<Arc<dyn FlightProvider>>,
    provider_deadline: Duration,
}

impl SearchOrchestrator {
    pub fn new(providers: Vec<Arc<dyn FlightProvider>>, provider_deadline: Duration) -> Self {
        Self { providers, provider_deadline }
    }

    pub fn from_registry(registry: &ProviderRegistry, config: &SearchConfig) -> Self {
        Self::new(registry.providers().to_vec(), config.provider_deadline())
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Run a search across every provider.
    ///
    /// Only a structurally invalid request is an error. Provider problems
    /// show up as fewer flights (or, for place resolution, a leg failure).
    /// Dropping the returned future cancels all outstanding provider work.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, CoreError> {
        request.validate()?;

        let request_id = Uuid::new_v4();
        let span = info_span!("search", %request_id, legs = request.legs.len());

        async move {
            let started = Instant::now();
            let cancel = CancellationToken::new();
            let _abandon = cancel.clone().drop_guard();

            let legs = join_all(
                request
                    .leg_searches()
                    .into_iter()
                    .map(|search| self.search_leg(search, &cancel)),
            )
            .await;

            info!(
                offers = legs.iter().map(|l| l.flights.len()).sum::<usize>(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Search complete"
            );
            Ok(SearchResponse { legs })
        }
        .instrument(span)
        .await
    }

    async fn search_leg(&self, search: LegSearch, cancel: &CancellationToken) -> LegResult {
        let leg_index = search.leg_index;
        let filters = search.filters.clone();

        let tasks: Vec<_> = self
            .providers
            .iter()
            .map(|provider| {
                let id = provider.id();
                let span = info_span!("provider", provider = %id, leg_index);
                let task = run_provider(provider.clone(), search.clone(), cancel.child_token(), self.provider_deadline);
                (id, tokio::spawn(task.instrument(span)))
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (id, handle) in tasks {
            match handle.await {
                Ok(result) => results.push(result),
                Err(err) if err.is_panic() => {
                    error!(provider = %id, leg_index, "Provider task panicked, treating as no offers");
                }
                Err(err) => {
                    warn!(provider = %id, leg_index, error = %err, "Provider task did not finish");
                }
            }
        }

        merge_leg(leg_index, results, filters.as_ref())
    }
}

async fn run_provider(
    provider: Arc<dyn FlightProvider>,
    search: LegSearch,
    cancel: CancellationToken,
    deadline: Duration,
) -> LegResult {
    let leg_index = search.leg_index;
    match tokio::time::timeout(deadline, provider.search_leg(search, cancel.clone())).await {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            warn!(deadline_ms = deadline.as_millis() as u64, "Provider exceeded search deadline");
            LegResult::empty(leg_index)
        }
    }
}
