/// Place search provider abstraction
///
/// The planner and the submission flow never talk to an upstream search
/// API directly; they depend on this port so providers stay pluggable
/// and tests can substitute fakes.
use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{PlaceHit, Station},
};

pub mod kakao;

/// One keyword search around one station.
///
/// Returns a bounded, already-ranked list of candidate places carrying
/// optional enrichment. Implementations upsert sighted places as a side
/// effect so external ids stay resolvable for later submissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaceSearchPort: Send + Sync {
    async fn search(&self, station: &Station, keyword: &str) -> AppResult<Vec<PlaceHit>>;
}
