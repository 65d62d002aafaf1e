use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::search::{LegResult, LegSearch, ProviderId, SearchRequest};

/// Contract every offer source implements.
///
/// A provider never fails a whole request: a leg it cannot search comes back
/// as a `LegResult` with no flights (and, for failures the caller must see,
/// a `LegFailure`). The orchestrator depends only on this trait.
#[async_trait]
pub trait FlightProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Search a single leg. Work must stop promptly once `cancel` fires.
    async fn search_leg(&self, search: LegSearch, cancel: CancellationToken) -> LegResult;

    /// Search every leg of a request concurrently.
    /// Returns exactly one result per leg, in request order.
    async fn search(&self, request: &SearchRequest, cancel: CancellationToken) -> Vec<LegResult> {
        let searches = request.leg_searches();
        join_all(
            searches
                .into_iter()
                .map(|search| self.search_leg(search, cancel.clone())),
        )
        .await
    }
}
