use std::sync::Arc;

use crate::db::RecommendationStore;
use crate::services::{AutoRecommendationPlanner, RecommendationAggregator, SummaryQueue};

/// Shared application state
///
/// Handlers depend on trait objects so integration tests can assemble a
/// state around in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecommendationStore>,
    pub aggregator: Arc<RecommendationAggregator>,
    pub planner: Arc<AutoRecommendationPlanner>,
    pub summary_queue: SummaryQueue,
}
