use std::sync::Arc;
use altis_search::SearchOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SearchOrchestrator>,
}
