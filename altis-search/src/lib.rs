//! Fan-out search across every configured offer source.

pub mod filters;
pub mod orchestrator;
pub mod registry;

pub use orchestrator::SearchOrchestrator;
pub use registry::ProviderRegistry;
