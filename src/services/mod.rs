pub mod aggregator;
pub mod category;
pub mod keywords;
pub mod planner;
pub mod providers;
pub mod summary;
pub mod summary_worker;

pub use aggregator::{RecommendationAggregator, SubmissionItem, SubmitResponse};
pub use keywords::{KeywordExtractor, OpenAiKeywordExtractor};
pub use planner::{clamp_count, AutoRecommendationPlanner};
pub use providers::kakao::KakaoPlaceSearch;
pub use providers::PlaceSearchPort;
pub use summary::{OpenAiSummaryEnricher, SummaryEnricher};
pub use summary_worker::{SummaryQueue, SummaryWorkerHandle};
